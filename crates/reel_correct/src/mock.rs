//! Scripted generation pipeline and preview for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{GenerationError, GenerationResult, PreviewError, PreviewResult};
use crate::pipeline::{GeneratedCode, GenerationPipeline, GenerationRequest, PreviewCompiler, StreamPhase};

/// Scripted answer to one generation.
#[derive(Debug, Clone)]
pub enum MockGeneration {
    /// Produce code immediately
    Code(GeneratedCode),
    /// Fail immediately
    Fail(GenerationError),
    /// Produce code after a delay, unless cancelled first
    Delayed(Duration, GeneratedCode),
}

impl MockGeneration {
    pub fn code(code: impl Into<String>) -> Self {
        Self::Code(GeneratedCode::new(code))
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(GenerationError::Failed(message.into()))
    }
}

/// Mock generation pipeline.
///
/// Generations consume the script in order; once it runs out the last entry
/// repeats. Every request is captured.
#[derive(Clone, Default)]
pub struct MockPipeline {
    script: Arc<RwLock<Vec<MockGeneration>>>,
    index: Arc<AtomicUsize>,
    requests: Arc<RwLock<Vec<GenerationRequest>>>,
}

impl MockPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(self, generation: MockGeneration) -> Self {
        self.script.write().push(generation);
        self
    }

    pub fn with_script(self, script: Vec<MockGeneration>) -> Self {
        *self.script.write() = script;
        self
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.read().clone()
    }

    /// Requests issued by the system rather than the user.
    pub fn silent_requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .read()
            .iter()
            .filter(|r| r.silent)
            .cloned()
            .collect()
    }

    fn next(&self) -> MockGeneration {
        let script = self.script.read();
        if script.is_empty() {
            return MockGeneration::code("");
        }
        let index = self.index.fetch_add(1, Ordering::SeqCst);
        script
            .get(index.min(script.len() - 1))
            .cloned()
            .unwrap_or_else(|| MockGeneration::code(""))
    }
}

#[async_trait]
impl GenerationPipeline for MockPipeline {
    async fn generate(
        &self,
        request: GenerationRequest,
        phases: mpsc::UnboundedSender<StreamPhase>,
        cancel: CancellationToken,
    ) -> GenerationResult<GeneratedCode> {
        self.requests.write().push(request);
        let _ = phases.send(StreamPhase::Reasoning);

        let generation = self.next();
        let _ = phases.send(StreamPhase::Generating);
        match generation {
            MockGeneration::Code(code) => Ok(code),
            MockGeneration::Fail(error) => Err(error),
            MockGeneration::Delayed(delay, code) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(GenerationError::Cancelled),
                    _ = tokio::time::sleep(delay) => Ok(code),
                }
            }
        }
    }
}

/// Mock preview compiler. Code compiles unless a rule says otherwise.
#[derive(Clone, Default)]
pub struct MockPreview {
    rules: Arc<RwLock<HashMap<String, PreviewError>>>,
    fallback: Arc<RwLock<Option<PreviewError>>>,
    compiled: Arc<RwLock<Vec<String>>>,
}

impl MockPreview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail compilation of exactly `code`.
    pub fn fail_on(self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules
            .write()
            .insert(code.into(), PreviewError::Compilation(message.into()));
        self
    }

    /// Compile `code` but throw when it is loaded.
    pub fn throw_on(self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules
            .write()
            .insert(code.into(), PreviewError::Runtime(message.into()));
        self
    }

    /// Fail compilation of any code without a specific rule.
    pub fn fail_all(self, message: impl Into<String>) -> Self {
        *self.fallback.write() = Some(PreviewError::Compilation(message.into()));
        self
    }

    /// Every code string compiled so far.
    pub fn compiled(&self) -> Vec<String> {
        self.compiled.read().clone()
    }
}

#[async_trait]
impl PreviewCompiler for MockPreview {
    async fn compile(&self, code: &str) -> PreviewResult<()> {
        self.compiled.write().push(code.to_string());
        let rule = self.rules.read().get(code).cloned();
        match rule.or_else(|| self.fallback.read().clone()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            silent: false,
            conversation_context: Vec::new(),
            current_code: String::new(),
            correction: None,
        }
    }

    #[tokio::test]
    async fn test_mock_pipeline_script_and_phases() {
        let pipeline = MockPipeline::new()
            .add(MockGeneration::code("a"))
            .add(MockGeneration::fail("model overloaded"));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = pipeline
            .generate(request("one"), tx.clone(), CancellationToken::new())
            .await;
        assert_eq!(first.unwrap().code, "a");
        assert_eq!(rx.recv().await, Some(StreamPhase::Reasoning));
        assert_eq!(rx.recv().await, Some(StreamPhase::Generating));

        let second = pipeline.generate(request("two"), tx, CancellationToken::new()).await;
        assert_eq!(second, Err(GenerationError::Failed("model overloaded".into())));
        assert_eq!(pipeline.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_pipeline_delayed_cancel() {
        let pipeline = MockPipeline::new().add(MockGeneration::Delayed(
            Duration::from_secs(30),
            GeneratedCode::new("late"),
        ));
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = pipeline.generate(request("p"), tx, cancel).await;
        assert_eq!(result, Err(GenerationError::Cancelled));
    }

    #[tokio::test]
    async fn test_mock_preview_rules() {
        let preview = MockPreview::new()
            .fail_on("bad", "X is not defined")
            .throw_on("throws", "boom");

        assert!(preview.compile("good").await.is_ok());
        assert_eq!(
            preview.compile("bad").await,
            Err(PreviewError::Compilation("X is not defined".into()))
        );
        assert_eq!(
            preview.compile("throws").await,
            Err(PreviewError::Runtime("boom".into()))
        );
        assert_eq!(preview.compiled(), vec!["good", "bad", "throws"]);
    }
}

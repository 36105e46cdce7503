//! Collaborator traits for code generation and the live preview.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::controller::CorrectionContext;
use crate::error::{GenerationResult, PreviewResult};
use crate::history::Message;

/// A targeted text replacement produced by the generation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOperation {
    pub old_text: String,
    pub new_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EditOperation {
    pub fn new(old_text: impl Into<String>, new_text: impl Into<String>) -> Self {
        Self {
            old_text: old_text.into(),
            new_text: new_text.into(),
            description: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Apply the edit to `code`. Returns `None` if `old_text` does not occur.
    pub fn apply(&self, code: &str) -> Option<String> {
        if self.old_text.is_empty() || !code.contains(&self.old_text) {
            return None;
        }
        Some(code.replacen(&self.old_text, &self.new_text, 1))
    }
}

/// Phase reported while a generation streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamPhase {
    Idle,
    Reasoning,
    Generating,
}

/// Input to one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    /// Triggered by the system; not shown as a user message
    pub silent: bool,
    pub conversation_context: Vec<Message>,
    pub current_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction: Option<CorrectionContext>,
}

/// Output of a successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub code: String,
    /// Short explanation for the conversation
    #[serde(default)]
    pub summary: Option<String>,
}

impl GeneratedCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: None,
        }
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// Produces composition code from a prompt.
#[async_trait]
pub trait GenerationPipeline: Send + Sync {
    /// Generate code, reporting stream phases on `phases`.
    ///
    /// Implementations should return [`GenerationError::Cancelled`](crate::GenerationError::Cancelled)
    /// promptly once `cancel` fires.
    async fn generate(
        &self,
        request: GenerationRequest,
        phases: mpsc::UnboundedSender<StreamPhase>,
        cancel: CancellationToken,
    ) -> GenerationResult<GeneratedCode>;
}

/// Compiles code for the live preview.
#[async_trait]
pub trait PreviewCompiler: Send + Sync {
    async fn compile(&self, code: &str) -> PreviewResult<()>;
}

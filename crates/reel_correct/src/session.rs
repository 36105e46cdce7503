//! Async driver for the correction cycle.
//!
//! [`CorrectionSession`] owns a [`CorrectionController`] and connects it to
//! the generation pipeline, the preview compiler and the conversation. It
//! runs as a single task: user input arrives on a channel, generations run
//! as spawned tasks, and the edit debounce and dispatch delay are timers in
//! the same `select!` loop. Results from generations started before the
//! most recent reset are discarded.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reel_core::CorrectionPolicy;

use crate::controller::{
    CorrectionController, CorrectionEvent, EditorSignal, GenerationOrigin,
};
use crate::error::{GenerationError, GenerationResult, PreviewError};
use crate::history::ConversationSink;
use crate::pipeline::{
    GeneratedCode, GenerationPipeline, GenerationRequest, PreviewCompiler, StreamPhase,
};

/// Input from the user or the preview.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// A new prompt typed by the user
    Prompt { text: String },
    /// The user edited the code by hand
    ManualEdit { code: String },
    /// The preview player threw while running the code
    RuntimeError { message: String },
}

/// Observable output of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Phase(StreamPhase),
    /// Generated code replaced the editor contents
    CodeUpdated { code: String },
    /// Preview compile finished; `error` holds the diagnostic on failure
    Compiled { error: Option<String> },
    Correction(CorrectionEvent),
}

struct InFlight {
    epoch: u64,
    origin: GenerationOrigin,
    cancel: CancellationToken,
    handle: JoinHandle<GenerationResult<GeneratedCode>>,
}

enum Step {
    Shutdown,
    Input(SessionInput),
    InputsClosed,
    Generated(Result<GenerationResult<GeneratedCode>, JoinError>),
    DebounceSettled,
    Dispatch,
}

/// Runs the generate / compile / correct cycle for one editor.
pub struct CorrectionSession {
    controller: CorrectionController,
    pipeline: Arc<dyn GenerationPipeline>,
    preview: Arc<dyn PreviewCompiler>,
    sink: Arc<dyn ConversationSink>,
    policy: CorrectionPolicy,
    events: mpsc::UnboundedSender<SessionEvent>,
    code: String,
    generation: Option<InFlight>,
    debounce_until: Option<Instant>,
    dispatch_at: Option<Instant>,
}

impl CorrectionSession {
    /// Create a session over `code`. Returns the session and its event stream.
    pub fn new(
        code: impl Into<String>,
        pipeline: Arc<dyn GenerationPipeline>,
        preview: Arc<dyn PreviewCompiler>,
        sink: Arc<dyn ConversationSink>,
        policy: CorrectionPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let code = code.into();
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            controller: CorrectionController::new(policy.max_attempts).with_code(code.clone()),
            pipeline,
            preview,
            sink,
            policy,
            events,
            code,
            generation: None,
            debounce_until: None,
            dispatch_at: None,
        };
        (session, rx)
    }

    /// Process input until `shutdown` fires, or until the input channel is
    /// closed and no work is left. Returns the controller for inspection.
    pub async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<SessionInput>,
        shutdown: CancellationToken,
    ) -> CorrectionController {
        let mut inputs_open = true;

        loop {
            if !inputs_open && self.is_idle() {
                debug!("Inputs closed and no work pending, stopping session");
                break;
            }

            let step = tokio::select! {
                _ = shutdown.cancelled() => Step::Shutdown,
                input = inputs.recv(), if inputs_open => match input {
                    Some(input) => Step::Input(input),
                    None => Step::InputsClosed,
                },
                result = join_generation(self.generation.as_mut()) => Step::Generated(result),
                _ = sleep_until_opt(self.debounce_until) => Step::DebounceSettled,
                _ = sleep_until_opt(self.dispatch_at) => Step::Dispatch,
            };

            match step {
                Step::Shutdown => {
                    if let Some(inflight) = self.generation.take() {
                        inflight.cancel.cancel();
                    }
                    info!("Correction session shut down");
                    break;
                }
                Step::InputsClosed => inputs_open = false,
                Step::Input(input) => self.handle_input(input, &shutdown),
                Step::Generated(result) => self.handle_generated(result).await,
                Step::DebounceSettled => {
                    self.debounce_until = None;
                    self.observe(EditorSignal::DebounceSettled);
                    self.compile().await;
                }
                Step::Dispatch => {
                    self.dispatch_at = None;
                    self.dispatch(&shutdown);
                }
            }
        }

        self.controller
    }

    fn is_idle(&self) -> bool {
        self.generation.is_none() && self.debounce_until.is_none() && self.dispatch_at.is_none()
    }

    fn handle_input(&mut self, input: SessionInput, shutdown: &CancellationToken) {
        match input {
            SessionInput::Prompt { text } => {
                info!("New prompt ({} chars)", text.len());
                self.sink.user_message(&text);
                self.dispatch_at = None;
                let request = GenerationRequest {
                    prompt: text,
                    silent: false,
                    conversation_context: self.sink.context(),
                    current_code: self.code.clone(),
                    correction: None,
                };
                self.start_generation(request, GenerationOrigin::UserPrompt, shutdown);
            }
            SessionInput::ManualEdit { code } => {
                if let Some(inflight) = self.generation.take() {
                    debug!("Manual edit cancels the running generation");
                    inflight.cancel.cancel();
                    self.observe(EditorSignal::GenerationCancelled);
                }
                self.dispatch_at = None;
                self.code = code.clone();
                self.observe(EditorSignal::ManualEdit { code });
                self.debounce_until = Some(Instant::now() + self.policy.edit_debounce());
            }
            SessionInput::RuntimeError { message } => {
                self.observe(EditorSignal::RuntimeError { message });
            }
        }
    }

    fn dispatch(&mut self, shutdown: &CancellationToken) {
        if shutdown.is_cancelled() {
            return;
        }
        let Some(request) = self.controller.dispatch() else {
            return;
        };
        self.emit(SessionEvent::Correction(CorrectionEvent::Requested(request.clone())));
        let request = GenerationRequest {
            prompt: request.prompt,
            silent: request.silent,
            conversation_context: self.sink.context(),
            current_code: self.code.clone(),
            correction: Some(request.context),
        };
        self.start_generation(request, GenerationOrigin::Correction, shutdown);
    }

    fn start_generation(
        &mut self,
        request: GenerationRequest,
        origin: GenerationOrigin,
        shutdown: &CancellationToken,
    ) {
        if let Some(previous) = self.generation.take() {
            debug!("Superseding running generation");
            previous.cancel.cancel();
        }
        self.observe(EditorSignal::GenerationStarted { origin });

        let cancel = shutdown.child_token();
        let (phase_tx, mut phase_rx) = mpsc::unbounded_channel();
        let pipeline = Arc::clone(&self.pipeline);
        let events = self.events.clone();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let forward = async {
                while let Some(phase) = phase_rx.recv().await {
                    let _ = events.send(SessionEvent::Phase(phase));
                }
            };
            let (result, ()) = tokio::join!(pipeline.generate(request, phase_tx, token), forward);
            result
        });

        self.generation = Some(InFlight {
            epoch: self.controller.epoch(),
            origin,
            cancel,
            handle,
        });
    }

    async fn handle_generated(&mut self, result: Result<GenerationResult<GeneratedCode>, JoinError>) {
        let Some(inflight) = self.generation.take() else {
            return;
        };
        self.emit(SessionEvent::Phase(StreamPhase::Idle));
        if inflight.epoch != self.controller.epoch() {
            debug!("Discarding result of a generation from an earlier epoch");
            return;
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Generation task failed: {}", e);
                Err(GenerationError::Failed(e.to_string()))
            }
        };

        match outcome {
            Ok(generated) => {
                info!("Generation finished ({:?})", inflight.origin);
                if let Some(summary) = &generated.summary {
                    self.sink.assistant_message(summary);
                }
                self.code = generated.code.clone();
                self.emit(SessionEvent::CodeUpdated {
                    code: generated.code.clone(),
                });
                self.observe(EditorSignal::GenerationFinished {
                    code: generated.code,
                });
                self.compile().await;
            }
            Err(GenerationError::Cancelled) => {
                debug!("Generation cancelled");
                self.observe(EditorSignal::GenerationCancelled);
            }
            Err(e) => {
                warn!("Generation failed: {}", e);
                let failed_edit = e.failed_edit().cloned();
                self.observe(EditorSignal::GenerationFailed {
                    message: e.to_string(),
                    failed_edit,
                    mid_stream: false,
                });
            }
        }
    }

    async fn compile(&mut self) {
        self.observe(EditorSignal::CompileStarted);
        match self.preview.compile(&self.code).await {
            Ok(()) => {
                self.emit(SessionEvent::Compiled { error: None });
                self.observe(EditorSignal::CompileSucceeded);
            }
            Err(PreviewError::Compilation(message)) => {
                self.emit(SessionEvent::Compiled {
                    error: Some(message.clone()),
                });
                self.observe(EditorSignal::CompileFailed { message });
            }
            Err(PreviewError::Runtime(message)) => {
                self.emit(SessionEvent::Compiled { error: None });
                self.observe(EditorSignal::CompileSucceeded);
                self.observe(EditorSignal::RuntimeError { message });
            }
        }
    }

    fn observe(&mut self, signal: EditorSignal) {
        for event in self.controller.observe(signal) {
            match &event {
                CorrectionEvent::ErrorMessage { text, kind } => {
                    self.sink.error_message(text, *kind);
                }
                CorrectionEvent::Scheduled(_) => {
                    self.dispatch_at = Some(Instant::now() + self.policy.dispatch_delay());
                }
                CorrectionEvent::Exhausted {
                    attempts,
                    kind,
                    message,
                } => {
                    self.sink.error_message(
                        &format!(
                            "Automatic fixes stopped after {} attempts. {}: {}",
                            attempts,
                            kind.label(),
                            message
                        ),
                        *kind,
                    );
                }
                CorrectionEvent::Reset { .. } => self.dispatch_at = None,
                CorrectionEvent::Requested(_) | CorrectionEvent::Recovered { .. } => {}
            }
            self.emit(SessionEvent::Correction(event));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

async fn join_generation(
    inflight: Option<&mut InFlight>,
) -> Result<GenerationResult<GeneratedCode>, JoinError> {
    match inflight {
        Some(inflight) => (&mut inflight.handle).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

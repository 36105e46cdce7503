//! Bounded self-correction state machine.
//!
//! [`CorrectionController`] watches what happens to the code in the editor
//! (generations, compiles, runtime errors, manual edits) and decides when an
//! automatic corrective regeneration should be requested. It never touches
//! the code itself and performs no I/O; the session feeds it
//! [`EditorSignal`]s and acts on the [`CorrectionEvent`]s it returns.
//!
//! ```text
//! Idle ──failure──▶ Pending ──dispatch──▶ Correcting ──clean compile──▶ Idle
//!                      ▲                      │
//!                      └──────failure─────────┤
//!                                             └──budget spent──▶ Exhausted
//!
//! manual edit / new user prompt: any state ──▶ Idle, counter 0
//! ```

use serde::Serialize;
use tracing::{debug, info, warn};

use reel_core::{classify, ErrorKind, FailureContext};

use crate::pipeline::EditOperation;

/// Number of automatic corrections made since the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptCounter {
    value: u32,
    max: u32,
}

impl AttemptCounter {
    pub fn new(max: u32) -> Self {
        Self { value: 0, max }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_exhausted(&self) -> bool {
        self.value >= self.max
    }

    /// Count one more attempt. Returns the new attempt number, or `None` if
    /// the budget is already spent.
    pub fn try_increment(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        self.value += 1;
        Some(self.value)
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }

    fn restore(&mut self, value: u32) {
        self.value = value.min(self.max);
    }
}

/// Everything a corrective regeneration needs to know about the failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionContext {
    pub failing_code: String,
    pub error_message: String,
    pub error_kind: ErrorKind,
    pub attempt_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_edit: Option<EditOperation>,
}

impl CorrectionContext {
    /// Message shown in the conversation before the correction runs.
    pub fn notice(&self) -> String {
        format!("{}: {}", self.error_kind.label(), self.error_message)
    }

    /// Prompt sent to the generation pipeline.
    pub fn prompt(&self, max_attempts: u32) -> String {
        let mut prompt = format!(
            "The current composition code failed with a {} error:\n\n{}\n\n\
             This is automatic correction attempt {} of {}. \
             Fix the cause of the error and return the complete corrected code.",
            self.error_kind.as_str(),
            self.error_message,
            self.attempt_number,
            max_attempts
        );
        if let Some(edit) = &self.failed_edit {
            prompt.push_str(&format!(
                "\n\nThe previous edit could not be applied because its old text was not found.\n\
                 Old text:\n{}\nNew text:\n{}",
                edit.old_text, edit.new_text
            ));
        }
        prompt
    }
}

/// Controller state.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionState {
    Idle,
    /// A failure was accepted; the request has not been dispatched yet
    Pending(CorrectionContext),
    /// The corrective generation is running or its result is being checked
    Correcting(CorrectionContext),
    /// Budget spent; waits for a manual edit or a new user prompt
    Exhausted,
}

impl CorrectionState {
    pub fn name(&self) -> &'static str {
        match self {
            CorrectionState::Idle => "idle",
            CorrectionState::Pending(_) => "pending",
            CorrectionState::Correcting(_) => "correcting",
            CorrectionState::Exhausted => "exhausted",
        }
    }

    pub fn context(&self) -> Option<&CorrectionContext> {
        match self {
            CorrectionState::Pending(ctx) | CorrectionState::Correcting(ctx) => Some(ctx),
            _ => None,
        }
    }
}

/// Who started a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOrigin {
    UserPrompt,
    Correction,
}

/// Something that happened to the code in the editor.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorSignal {
    GenerationStarted { origin: GenerationOrigin },
    GenerationFinished { code: String },
    GenerationFailed {
        message: String,
        failed_edit: Option<EditOperation>,
        mid_stream: bool,
    },
    GenerationCancelled,
    CompileStarted,
    CompileSucceeded,
    CompileFailed { message: String },
    RuntimeError { message: String },
    /// The user changed the code by hand
    ManualEdit { code: String },
    /// The edit debounce window closed
    DebounceSettled,
}

/// Why the budget was reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    ManualEdit,
    UserPrompt,
}

/// A silent regeneration request.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionRequest {
    pub prompt: String,
    pub silent: bool,
    pub context: CorrectionContext,
}

/// Transition or side effect produced by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionEvent {
    /// Post this to the conversation before anything is regenerated
    ErrorMessage { text: String, kind: ErrorKind },
    /// Entered `Pending`
    Scheduled(CorrectionContext),
    /// Entered `Correcting`
    Requested(CorrectionRequest),
    /// A clean compile ended the correction cycle
    Recovered { attempts: u32 },
    /// Entered `Exhausted`
    Exhausted {
        attempts: u32,
        kind: ErrorKind,
        message: String,
    },
    /// Budget and context cleared
    Reset { reason: ResetReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ObservedError {
    revision: u64,
    kind: ErrorKind,
    message: String,
}

/// Owns the attempt budget and the correction context.
#[derive(Debug)]
pub struct CorrectionController {
    state: CorrectionState,
    counter: AttemptCounter,
    code: String,
    /// Bumped whenever the code changes
    revision: u64,
    /// Bumped on every reset; in-flight results from older epochs are stale
    epoch: u64,
    streaming: bool,
    compiling: bool,
    debouncing: bool,
    awaiting_generation: bool,
    last_error: Option<ObservedError>,
    /// Counter value a clean compile reset, keyed by code revision
    recovered: Option<(u64, u32)>,
}

impl CorrectionController {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: CorrectionState::Idle,
            counter: AttemptCounter::new(max_attempts),
            code: String::new(),
            revision: 0,
            epoch: 0,
            streaming: false,
            compiling: false,
            debouncing: false,
            awaiting_generation: false,
            last_error: None,
            recovered: None,
        }
    }

    /// Start from existing code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn state(&self) -> &CorrectionState {
        &self.state
    }

    pub fn attempts(&self) -> u32 {
        self.counter.value()
    }

    pub fn max_attempts(&self) -> u32 {
        self.counter.max()
    }

    pub fn context(&self) -> Option<&CorrectionContext> {
        self.state.context()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Feed one signal. Returns the resulting events in emission order.
    pub fn observe(&mut self, signal: EditorSignal) -> Vec<CorrectionEvent> {
        debug!("Correction controller ({}) observed {:?}", self.state.name(), signal);
        match signal {
            EditorSignal::GenerationStarted { origin } => {
                self.streaming = true;
                match origin {
                    GenerationOrigin::UserPrompt => self.reset(ResetReason::UserPrompt),
                    GenerationOrigin::Correction => {
                        self.awaiting_generation = false;
                        Vec::new()
                    }
                }
            }
            EditorSignal::GenerationFinished { code } => {
                self.streaming = false;
                self.set_code(code);
                Vec::new()
            }
            EditorSignal::GenerationFailed {
                message,
                failed_edit,
                mid_stream,
            } => {
                self.streaming = false;
                self.awaiting_generation = false;
                let mut context = FailureContext::generation();
                if mid_stream {
                    context = context.mid_stream();
                }
                let kind = classify(&message, &context);
                self.on_failure(kind, message, failed_edit)
            }
            EditorSignal::GenerationCancelled => {
                self.streaming = false;
                self.awaiting_generation = false;
                Vec::new()
            }
            EditorSignal::CompileStarted => {
                self.compiling = true;
                Vec::new()
            }
            EditorSignal::CompileSucceeded => {
                self.compiling = false;
                self.on_clean_compile()
            }
            EditorSignal::CompileFailed { message } => {
                self.compiling = false;
                let kind = classify(&message, &FailureContext::compilation());
                self.on_failure(kind, message, None)
            }
            EditorSignal::RuntimeError { message } => {
                if let Some((revision, attempts)) = self.recovered.take() {
                    if revision == self.revision && attempts > self.counter.value() {
                        debug!("Runtime error on freshly compiled code, restoring {} attempts", attempts);
                        self.counter.restore(attempts);
                    }
                }
                let kind = classify(&message, &FailureContext::runtime());
                self.on_failure(kind, message, None)
            }
            EditorSignal::ManualEdit { code } => {
                self.set_code(code);
                self.debouncing = true;
                self.reset(ResetReason::ManualEdit)
            }
            EditorSignal::DebounceSettled => {
                self.debouncing = false;
                Vec::new()
            }
        }
    }

    /// Move `Pending` to `Correcting` and hand out the corrective request.
    pub fn dispatch(&mut self) -> Option<CorrectionRequest> {
        let context = match &self.state {
            CorrectionState::Pending(ctx) => ctx.clone(),
            _ => return None,
        };
        info!(
            "Dispatching correction attempt {}/{} for {} error",
            context.attempt_number,
            self.counter.max(),
            context.error_kind
        );
        self.state = CorrectionState::Correcting(context.clone());
        self.awaiting_generation = true;
        Some(CorrectionRequest {
            prompt: context.prompt(self.counter.max()),
            silent: true,
            context,
        })
    }

    fn set_code(&mut self, code: String) {
        self.code = code;
        self.revision += 1;
        self.last_error = None;
    }

    fn blocked_by(&self) -> Option<&'static str> {
        if self.streaming {
            Some("streaming")
        } else if self.compiling {
            Some("compiling")
        } else if self.debouncing {
            Some("debouncing an edit")
        } else if matches!(self.state, CorrectionState::Pending(_)) {
            Some("a correction is pending")
        } else if self.awaiting_generation {
            Some("awaiting the corrective generation")
        } else {
            None
        }
    }

    fn on_failure(
        &mut self,
        kind: ErrorKind,
        message: String,
        failed_edit: Option<EditOperation>,
    ) -> Vec<CorrectionEvent> {
        if !kind.is_correctable() {
            debug!("{} failure is not correctable", kind);
            return Vec::new();
        }
        if let Some(reason) = self.blocked_by() {
            debug!("Ignoring {} error while {}", kind, reason);
            return Vec::new();
        }

        let observed = ObservedError {
            revision: self.revision,
            kind,
            message,
        };
        if self.last_error.as_ref() == Some(&observed) {
            debug!("Same {} error already counted for this code", kind);
            return Vec::new();
        }
        self.last_error = Some(observed.clone());

        if self.state == CorrectionState::Exhausted {
            return Vec::new();
        }

        let Some(attempt) = self.counter.try_increment() else {
            warn!(
                "Correction budget of {} attempts spent, leaving {} error for the user",
                self.counter.max(),
                kind
            );
            self.state = CorrectionState::Exhausted;
            return vec![CorrectionEvent::Exhausted {
                attempts: self.counter.value(),
                kind,
                message: observed.message,
            }];
        };

        let context = CorrectionContext {
            failing_code: self.code.clone(),
            error_message: observed.message,
            error_kind: kind,
            attempt_number: attempt,
            failed_edit,
        };
        info!(
            "Scheduling correction attempt {}/{} for {} error",
            attempt,
            self.counter.max(),
            kind
        );
        self.state = CorrectionState::Pending(context.clone());
        vec![
            CorrectionEvent::ErrorMessage {
                text: context.notice(),
                kind,
            },
            CorrectionEvent::Scheduled(context),
        ]
    }

    fn on_clean_compile(&mut self) -> Vec<CorrectionEvent> {
        self.last_error = None;
        let correcting = matches!(self.state, CorrectionState::Correcting(_));
        if !correcting && self.counter.value() == 0 {
            return Vec::new();
        }
        let attempts = self.counter.value();
        info!("Code compiles again after {} correction attempt(s)", attempts);
        self.recovered = Some((self.revision, attempts));
        self.counter.reset();
        self.awaiting_generation = false;
        self.state = CorrectionState::Idle;
        vec![CorrectionEvent::Recovered { attempts }]
    }

    fn reset(&mut self, reason: ResetReason) -> Vec<CorrectionEvent> {
        self.epoch += 1;
        self.awaiting_generation = false;
        self.last_error = None;
        self.recovered = None;
        let dirty = self.state != CorrectionState::Idle || self.counter.value() > 0;
        self.counter.reset();
        self.state = CorrectionState::Idle;
        if dirty {
            info!("Correction budget reset ({:?})", reason);
            vec![CorrectionEvent::Reset { reason }]
        } else {
            Vec::new()
        }
    }
}

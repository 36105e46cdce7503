//! # reel_correct
//!
//! Bounded self-correction of generated composition code.
//!
//! When generated code fails to compile, throws in the preview, or the
//! generation itself fails, the session asks the generation pipeline to fix
//! it, silently, up to a fixed number of attempts. Manual edits and new
//! prompts reset the budget.
//!
//! # Features
//!
//! - **Correction Controller**: synchronous state machine owning the attempt
//!   budget and the correction context
//! - **Correction Session**: async driver with edit debounce, dispatch delay
//!   and stale-result discarding
//! - **Conversation History**: in-memory record of what the user sees
//! - **Mocks**: scripted pipeline and preview for testing
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reel_core::CorrectionPolicy;
//! use reel_correct::{ConversationHistory, CorrectionSession, MockPipeline, MockPreview, SessionInput};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (session, _events) = CorrectionSession::new(
//!         "",
//!         Arc::new(MockPipeline::new()),
//!         Arc::new(MockPreview::new()),
//!         Arc::new(ConversationHistory::new()),
//!         CorrectionPolicy::default(),
//!     );
//!     let (tx, rx) = mpsc::unbounded_channel();
//!     tx.send(SessionInput::Prompt { text: "a bouncing logo".into() }).unwrap();
//!     drop(tx);
//!     let controller = session.run(rx, CancellationToken::new()).await;
//!     println!("finished in state {}", controller.state().name());
//! }
//! ```

pub mod controller;
pub mod error;
pub mod history;
pub mod mock;
pub mod pipeline;
pub mod session;

pub use controller::{
    AttemptCounter, CorrectionContext, CorrectionController, CorrectionEvent, CorrectionRequest,
    CorrectionState, EditorSignal, GenerationOrigin, ResetReason,
};
pub use error::{GenerationError, GenerationResult, PreviewError, PreviewResult};
pub use history::{ConversationHistory, ConversationSink, Message, MessageRole};
pub use mock::{MockGeneration, MockPipeline, MockPreview};
pub use pipeline::{
    EditOperation, GeneratedCode, GenerationPipeline, GenerationRequest, PreviewCompiler,
    StreamPhase,
};
pub use session::{CorrectionSession, SessionEvent, SessionInput};

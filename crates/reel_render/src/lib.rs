//! # reel_render
//!
//! Render job orchestration for Reelsmith.
//!
//! This crate submits a composition to a remote render service, polls the
//! job until it finishes, and exposes the job as an observable state
//! machine that can be cancelled at any point.
//!
//! # Features
//!
//! - **Poll Loop**: interval polling with an overall deadline, a
//!   consecutive-failure ceiling and cooperative cancellation
//! - **Job Controller**: one job at a time, monotonic progress, stale
//!   results discarded after cancellation
//! - **HTTP Service**: client for the render API
//! - **Mock Service**: scripted service for testing without a backend
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reel_core::{CompositionProps, RenderPolicy, RenderRequest};
//! use reel_render::{HttpRenderService, RenderJobController, RenderJobState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = Arc::new(HttpRenderService::new("http://localhost:3000"));
//!     let controller = RenderJobController::new(service, &RenderPolicy::default());
//!
//!     let request = RenderRequest::new(CompositionProps::new("export const Comp = () => null;", 150, 30));
//!     match controller.submit(request).await {
//!         RenderJobState::Done { url, .. } => println!("Rendered to {}", url),
//!         RenderJobState::Error { error, .. } => eprintln!("{}", error),
//!         _ => {}
//!     }
//! }
//! ```

pub mod controller;
pub mod error;
pub mod http;
pub mod mock;
pub mod poll;
pub mod service;

pub use controller::{RenderArtifact, RenderEvent, RenderJobController, RenderJobState};
pub use error::{humanize, RenderFailure, ServiceError, ServiceResult, UNREACHABLE_MESSAGE};
pub use http::HttpRenderService;
pub use mock::{CapturedCall, MockCheck, MockRenderService};
pub use poll::{PollError, PollLoop, PollOutcome, PollStatus};
pub use service::{JobHandle, ProgressReport, RenderService};

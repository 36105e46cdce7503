//! # reel_core
//!
//! Shared building blocks for Reelsmith.
//!
//! This crate holds the pieces both controllers depend on:
//!
//! - **Classification**: the failure taxonomy and the pure classifier
//! - **Configuration**: polling and self-correction policy, loaded from TOML
//! - **Composition**: the render job payload and encoder options

pub mod classify;
pub mod composition;
pub mod config;
pub mod error;

pub use classify::{classify, is_unreachable_message, ErrorKind, FailureContext, TransportFailures};
pub use composition::{
    Codec, CompositionProps, ImageFormat, PixelFormat, ProresProfile, RenderOptions, RenderRequest,
};
pub use config::{CorrectionPolicy, ReelConfig, RenderPolicy, ServiceConfig};
pub use error::{ConfigError, ConfigResult};

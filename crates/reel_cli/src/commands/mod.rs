//! CLI command definitions.
//!
//! This module defines the command structure for the Reelsmith CLI.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use thiserror::Error;

use reel_core::ReelConfig;

pub mod classify;
pub mod config;
pub mod render;

/// Reelsmith - render and classify motion-graphics compositions
#[derive(Parser)]
#[command(name = "reel")]
#[command(version, about = "Reelsmith - render and classify motion-graphics compositions")]
#[command(long_about = r#"
Reelsmith submits generated motion-graphics compositions to a remote render
service and tracks them to completion.

COMMANDS:
  render    → Submit a composition and follow it until the video is ready
  classify  → Show how a failure message would be classified
  config    → Print the effective configuration

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Render failed
  4 - Render cancelled
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a composition on the render service
    Render(render::RenderArgs),

    /// Classify a failure message
    Classify(classify::ClassifyArgs),

    /// Show or initialize configuration
    Config(config::ConfigArgs),
}

/// Failures that map to specific exit codes.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgs(String),

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Render cancelled")]
    Cancelled,
}

/// Load configuration from `path`, or discover it in the working directory.
pub fn load_config(path: Option<&Path>) -> Result<ReelConfig> {
    let config = match path {
        Some(path) => ReelConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?
            .with_env_overrides()?,
        None => {
            let cwd = std::env::current_dir()?;
            ReelConfig::discover(&cwd)?
        }
    };
    Ok(config)
}

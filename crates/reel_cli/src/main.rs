//! Reelsmith CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Render failed
//! - 4: Render cancelled

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, CliError, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const RENDER_FAILED: u8 = 3;
    pub const CANCELLED: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "reel=debug"
    } else if cli.quiet {
        "reel=warn"
    } else {
        "reel=info"
    };
    let mut filter = EnvFilter::from_default_env();
    for directive in [level, "warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match cli.command {
        Commands::Render(args) => commands::render::execute(args, cli.quiet).await,
        Commands::Classify(args) => commands::classify::execute(args).await,
        Commands::Config(args) => commands::config::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(cli_error) = e.downcast_ref::<CliError>() {
        return match cli_error {
            CliError::InvalidArgs(_) => ExitCodes::INVALID_ARGS,
            CliError::RenderFailed(_) => ExitCodes::RENDER_FAILED,
            CliError::Cancelled => ExitCodes::CANCELLED,
        };
    }
    if e.downcast_ref::<reel_core::ConfigError>().is_some() {
        return ExitCodes::INVALID_ARGS;
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("argument") || msg.contains("option") || msg.contains("not found") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_cli_errors() {
        assert_eq!(
            categorize_error(&CliError::RenderFailed("boom".into()).into()),
            ExitCodes::RENDER_FAILED
        );
        assert_eq!(categorize_error(&CliError::Cancelled.into()), ExitCodes::CANCELLED);
        assert_eq!(
            categorize_error(&CliError::InvalidArgs("fps".into()).into()),
            ExitCodes::INVALID_ARGS
        );
    }

    #[test]
    fn test_categorize_other_errors() {
        let config_error: anyhow::Error =
            reel_core::ConfigError::invalid("render.deadline_secs", "must be greater than zero").into();
        assert_eq!(categorize_error(&config_error), ExitCodes::INVALID_ARGS);
        assert_eq!(
            categorize_error(&anyhow::anyhow!("disk on fire")),
            ExitCodes::GENERAL_ERROR
        );
    }
}

//! Config command - Show or initialize configuration.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use reel_core::ReelConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Configuration file (defaults to .reel/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the default configuration to .reel/config.toml
    #[arg(long)]
    init: bool,

    /// Overwrite an existing file when used with --init
    #[arg(long)]
    force: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: ConfigArgs) -> Result<()> {
    if args.init {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => ReelConfig::path_for(&std::env::current_dir()?),
        };
        if path.exists() && !args.force {
            anyhow::bail!(
                "Configuration already exists at {} (use --force to overwrite)",
                path.display()
            );
        }
        ReelConfig::default().save(&path)?;
        info!("Wrote default configuration to {}", path.display());
        println!("✅ Wrote {}", path.display());
        return Ok(());
    }

    let config = super::load_config(args.config.as_deref())?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", config.to_toml()?);
    }
    Ok(())
}

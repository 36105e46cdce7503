//! Render command - Submit a composition and follow it to completion.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use reel_core::{Codec, CompositionProps, RenderOptions, RenderRequest};
use reel_render::{HttpRenderService, RenderEvent, RenderJobController, RenderJobState};

use super::CliError;

#[derive(Args)]
pub struct RenderArgs {
    /// Path to the composition source file
    #[arg(short, long)]
    code: PathBuf,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Duration in frames
    #[arg(long, default_value_t = 150)]
    frames: u32,

    /// Output codec (h264, h265, vp8, vp9, prores, gif)
    #[arg(long, default_value = "h264")]
    codec: String,

    /// Constant rate factor (0-63)
    #[arg(long)]
    crf: Option<u8>,

    /// Configuration file (defaults to .reel/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Render service base URL
    #[arg(long)]
    service_url: Option<String>,
}

pub async fn execute(args: RenderArgs, quiet: bool) -> Result<()> {
    let code = std::fs::read_to_string(&args.code)
        .with_context(|| format!("Failed to read composition file: {}", args.code.display()))?;

    let codec = Codec::parse(&args.codec)
        .ok_or_else(|| CliError::InvalidArgs(format!("unknown codec '{}'", args.codec)))?;
    let mut options = RenderOptions::default().codec(codec);
    if let Some(crf) = args.crf {
        options = options.crf(crf);
    }
    let request = RenderRequest::new(CompositionProps::new(code, args.frames, args.fps))
        .with_options(options);
    request
        .validate()
        .map_err(|e| CliError::InvalidArgs(e.to_string()))?;

    let config = super::load_config(args.config.as_deref())?;
    let mut service_config = config.service.clone();
    if let Some(url) = args.service_url {
        service_config.base_url = url;
    }
    let service = HttpRenderService::from_config(&service_config)?;
    info!("Using render service at {}", service.base_url());

    let controller = RenderJobController::new(Arc::new(service), &config.render);
    let mut events = controller.subscribe();

    if !quiet {
        println!(
            "🎬 Rendering {} ({} frames @ {} fps, {:.1}s)",
            args.code.display(),
            args.frames,
            args.fps,
            request.input_props.duration_secs()
        );
    }

    let mut job = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit(request).await }
    });

    let state = loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if !quiet {
                    print_event(&event);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("⏹️  Cancelling render...");
                controller.cancel();
            }
            result = &mut job => break result?,
        }
    };
    while let Ok(event) = events.try_recv() {
        if !quiet {
            print_event(&event);
        }
    }

    match state {
        RenderJobState::Done { url, size_bytes } => {
            println!();
            println!("✅ Render complete: {} ({})", url, format_size(size_bytes));
            Ok(())
        }
        RenderJobState::Error { error, .. } => Err(CliError::RenderFailed(error.to_string()).into()),
        RenderJobState::Init => Err(CliError::Cancelled.into()),
        other => anyhow::bail!("Render stopped in unexpected state: {}", other.status()),
    }
}

fn print_event(event: &RenderEvent) {
    match event {
        RenderEvent::Invoking => println!("📤 Submitting job..."),
        RenderEvent::Accepted { job_id, bucket_ref } => {
            println!("   Job {} accepted (bucket {})", job_id, bucket_ref)
        }
        RenderEvent::Progress { progress, .. } => {
            println!("   ⏳ {:>3.0}%", progress * 100.0)
        }
        RenderEvent::Completed { .. } | RenderEvent::Failed { .. } | RenderEvent::Reset => {}
    }
}

/// Human-readable byte size.
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1_048_576), "1.0 MB");
        assert_eq!(format_size(1536), "1.5 KB");
    }

    #[tokio::test]
    async fn test_missing_code_file() {
        let args = RenderArgs {
            code: PathBuf::from("/nonexistent/comp.tsx"),
            fps: 30,
            frames: 150,
            codec: "h264".to_string(),
            crf: None,
            config: None,
            service_url: None,
        };
        let err = execute(args, true).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read composition file"));
    }

    #[tokio::test]
    async fn test_unknown_codec_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comp.tsx");
        std::fs::write(&path, "export const Comp = () => null;").unwrap();

        let args = RenderArgs {
            code: path,
            fps: 30,
            frames: 150,
            codec: "divx".to_string(),
            crf: None,
            config: None,
            service_url: None,
        };
        let err = execute(args, true).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::InvalidArgs(_))));
    }
}

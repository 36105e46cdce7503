//! Classify command - Show the taxonomy tag for a failure message.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use reel_core::{classify, ErrorKind, FailureContext};

#[derive(Args)]
pub struct ClassifyArgs {
    /// The failure message
    message: String,

    /// The preview compiler rejected the code
    #[arg(long)]
    compile: bool,

    /// The preview player raised an exception
    #[arg(long)]
    runtime: bool,

    /// The generation pipeline failed
    #[arg(long)]
    generation: bool,

    /// A generation was streaming when the failure happened
    #[arg(long)]
    mid_stream: bool,

    /// Consecutive transport failures seen while polling
    #[arg(long, value_name = "N")]
    transport_failures: Option<u32>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: ClassifyArgs) -> Result<()> {
    let ceiling = super::load_config(None)?.render.max_consecutive_failures;
    let kind = classify(&args.message, &failure_context(&args, ceiling));

    if args.json {
        let output = json!({
            "kind": kind,
            "correctable": kind.is_correctable(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", describe(kind));
    }
    Ok(())
}

fn failure_context(args: &ClassifyArgs, ceiling: u32) -> FailureContext {
    FailureContext {
        mid_stream: args.mid_stream,
        compilation_failed: args.compile,
        runtime_exception: args.runtime,
        generation_failed: args.generation,
        transport: args
            .transport_failures
            .map(|consecutive| reel_core::TransportFailures {
                consecutive,
                ceiling,
            }),
    }
}

fn describe(kind: ErrorKind) -> String {
    if kind.is_correctable() {
        format!("{} (correctable)", kind)
    } else {
        kind.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(message: &str) -> ClassifyArgs {
        ClassifyArgs {
            message: message.to_string(),
            compile: false,
            runtime: false,
            generation: false,
            mid_stream: false,
            transport_failures: None,
            json: false,
        }
    }

    #[test]
    fn test_flags_map_to_context() {
        let mut a = args("boom");
        a.transport_failures = Some(5);
        let kind = classify(&a.message, &failure_context(&a, 5));
        assert_eq!(kind, ErrorKind::NetworkFatal);

        let mut a = args("anything");
        a.compile = true;
        assert_eq!(
            classify(&a.message, &failure_context(&a, 5)),
            ErrorKind::Compilation
        );
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(ErrorKind::Runtime), "runtime (correctable)");
        assert_eq!(describe(ErrorKind::NetworkTransient), "network-transient");
    }
}

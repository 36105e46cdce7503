//! Failure taxonomy and classification.
//!
//! Every failure observed by the render orchestrator or the correction
//! controller is mapped onto a single [`ErrorKind`]. Only compilation,
//! runtime and generation failures are eligible for automatic correction;
//! network failures are retried by the poll loop or surfaced to the user.

use std::fmt;
use std::sync::OnceLock;

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Taxonomy tag for an observed failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Compiler or type-checker diagnostic on generated code
    Compilation,
    /// Exception raised while executing the code in the preview
    Runtime,
    /// The generation pipeline itself failed or produced unusable output
    Generation,
    /// Transport failure still inside the retry budget
    NetworkTransient,
    /// Transport failure once the retry budget is spent
    NetworkFatal,
}

impl ErrorKind {
    /// Whether this kind may drive an automatic corrective regeneration.
    pub fn is_correctable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Compilation | ErrorKind::Runtime | ErrorKind::Generation
        )
    }

    /// Stable tag used in logs and serialized contexts.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Compilation => "compilation",
            ErrorKind::Runtime => "runtime",
            ErrorKind::Generation => "generation",
            ErrorKind::NetworkTransient => "network-transient",
            ErrorKind::NetworkFatal => "network-fatal",
        }
    }

    /// Human-readable category name for conversation messages.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Compilation => "Compilation error",
            ErrorKind::Runtime => "Runtime error",
            ErrorKind::Generation => "Generation error",
            ErrorKind::NetworkTransient => "Network hiccup",
            ErrorKind::NetworkFatal => "Network failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consecutive transport failures seen by a poller, with its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportFailures {
    pub consecutive: u32,
    pub ceiling: u32,
}

/// Contextual flags describing where a failure was observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureContext {
    /// A generation was streaming when the failure occurred
    pub mid_stream: bool,
    /// The preview compiler rejected the code
    pub compilation_failed: bool,
    /// The preview player raised an exception
    pub runtime_exception: bool,
    /// The generation pipeline reported the failure
    pub generation_failed: bool,
    /// The failure came from the transport layer while polling
    pub transport: Option<TransportFailures>,
}

impl FailureContext {
    pub fn compilation() -> Self {
        Self {
            compilation_failed: true,
            ..Self::default()
        }
    }

    pub fn runtime() -> Self {
        Self {
            runtime_exception: true,
            ..Self::default()
        }
    }

    pub fn generation() -> Self {
        Self {
            generation_failed: true,
            ..Self::default()
        }
    }

    pub fn transport(consecutive: u32, ceiling: u32) -> Self {
        Self {
            transport: Some(TransportFailures {
                consecutive,
                ceiling,
            }),
            ..Self::default()
        }
    }

    pub fn mid_stream(mut self) -> Self {
        self.mid_stream = true;
        self
    }
}

/// Phrases produced by fetch/transport layers when the service is unreachable.
const UNREACHABLE_PATTERNS: &[&str] = &[
    r"Failed to fetch",
    r"NetworkError",
    r"(?i)connection (refused|reset|closed|aborted)",
    r"(?i)error sending request",
    r"(?i)operation timed out",
    r"(?i)dns error",
];

/// Shapes of compiler and type-checker diagnostics.
const COMPILER_PATTERNS: &[&str] = &[
    r"SyntaxError",
    r"Unexpected token",
    r"is not defined",
    r"Cannot find name",
    r"\bTS\d{4}\b",
    r"(?i)expected .+ but found",
    r"(?i)unterminated",
];

static UNREACHABLE_SET: OnceLock<RegexSet> = OnceLock::new();
static COMPILER_SET: OnceLock<RegexSet> = OnceLock::new();

fn pattern_set(cell: &'static OnceLock<RegexSet>, patterns: &[&str]) -> &'static RegexSet {
    cell.get_or_init(|| {
        RegexSet::new(patterns).unwrap_or_else(|e| {
            warn!("Classifier patterns failed to compile: {}", e);
            RegexSet::empty()
        })
    })
}

/// Whether a raw message is the literal signature of an unreachable service.
pub fn is_unreachable_message(message: &str) -> bool {
    pattern_set(&UNREACHABLE_SET, UNREACHABLE_PATTERNS).is_match(message)
}

/// Map a raw failure onto the taxonomy.
///
/// Context flags win over message heuristics. When the caller has no
/// context at all the message shape decides, defaulting to `runtime`.
pub fn classify(message: &str, context: &FailureContext) -> ErrorKind {
    if let Some(transport) = context.transport {
        return if transport.consecutive >= transport.ceiling {
            ErrorKind::NetworkFatal
        } else {
            ErrorKind::NetworkTransient
        };
    }
    if context.generation_failed || context.mid_stream {
        return ErrorKind::Generation;
    }
    if context.compilation_failed {
        return ErrorKind::Compilation;
    }
    if context.runtime_exception {
        return ErrorKind::Runtime;
    }

    if is_unreachable_message(message) {
        ErrorKind::NetworkTransient
    } else if pattern_set(&COMPILER_SET, COMPILER_PATTERNS).is_match(message) {
        ErrorKind::Compilation
    } else {
        ErrorKind::Runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        assert_eq!(
            RegexSet::new(UNREACHABLE_PATTERNS).unwrap().len(),
            UNREACHABLE_PATTERNS.len()
        );
        assert_eq!(
            RegexSet::new(COMPILER_PATTERNS).unwrap().len(),
            COMPILER_PATTERNS.len()
        );
        assert!(is_unreachable_message("TypeError: Failed to fetch"));
    }

    #[test]
    fn test_context_flags_take_priority() {
        let msg = "X is not defined";
        assert_eq!(classify(msg, &FailureContext::compilation()), ErrorKind::Compilation);
        assert_eq!(classify(msg, &FailureContext::runtime()), ErrorKind::Runtime);
        assert_eq!(classify(msg, &FailureContext::generation()), ErrorKind::Generation);
    }

    #[test]
    fn test_mid_stream_failure_is_generation() {
        let ctx = FailureContext::compilation().mid_stream();
        assert_eq!(classify("Unexpected token", &ctx), ErrorKind::Generation);
    }

    #[test]
    fn test_transport_failures_escalate_at_ceiling() {
        assert_eq!(
            classify("Failed to fetch", &FailureContext::transport(1, 5)),
            ErrorKind::NetworkTransient
        );
        assert_eq!(
            classify("Failed to fetch", &FailureContext::transport(4, 5)),
            ErrorKind::NetworkTransient
        );
        assert_eq!(
            classify("Failed to fetch", &FailureContext::transport(5, 5)),
            ErrorKind::NetworkFatal
        );
    }

    #[test]
    fn test_message_heuristics_without_context() {
        let none = FailureContext::default();
        assert_eq!(classify("TypeError: Failed to fetch", &none), ErrorKind::NetworkTransient);
        assert_eq!(classify("SyntaxError: Unexpected token '}'", &none), ErrorKind::Compilation);
        assert_eq!(
            classify("Cannot access 'frame' before initialization", &none),
            ErrorKind::Runtime
        );
    }

    #[test]
    fn test_correctable_kinds() {
        assert!(ErrorKind::Compilation.is_correctable());
        assert!(ErrorKind::Runtime.is_correctable());
        assert!(ErrorKind::Generation.is_correctable());
        assert!(!ErrorKind::NetworkTransient.is_correctable());
        assert!(!ErrorKind::NetworkFatal.is_correctable());
    }

    #[test]
    fn test_unreachable_detection() {
        assert!(is_unreachable_message("Failed to fetch"));
        assert!(is_unreachable_message("NetworkError when attempting to fetch resource."));
        assert!(!is_unreachable_message("Set up the render function first"));
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::NetworkTransient).unwrap();
        assert_eq!(json, "\"network-transient\"");
        assert_eq!(ErrorKind::Compilation.to_string(), "compilation");
    }
}

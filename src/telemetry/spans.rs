//! Span helpers for patch switches.

use tracing::{info_span, Span};

/// Extension trait for stamping an outcome onto a span.
pub trait SpanExt {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for patch switch spans.
pub struct SwitchSpan;

impl SwitchSpan {
    /// Span covering one switch. `status`, `error.message` and `duration_ms`
    /// are filled in when the switch settles.
    pub fn new(from: &str, to: &str) -> Span {
        info_span!(
            "patch_switch",
            from = %from,
            to = %to,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        )
    }
}

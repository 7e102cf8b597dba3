//! Telemetry for the mod host.
//!
//! Structured logging initialisation and span helpers. Output goes to
//! stderr or a local file.

mod logging;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use spans::{SpanExt, SwitchSpan};

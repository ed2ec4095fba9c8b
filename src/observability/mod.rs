//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connection tasks
//!     → access_log.rs (one record per connection, single writer task)
//!
//! All subsystems
//!     → logging.rs (structured `tracing` events → error log or stderr)
//! ```
//!
//! # Design Decisions
//! - Access records and diagnostics are separate streams
//! - The access log line format is fixed; diagnostics are free-form fields

pub mod access_log;
pub mod logging;

pub use access_log::{AccessLogSender, LogEntry};
pub use logging::init_logging;

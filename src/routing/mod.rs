//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request path (after path resolution and cascade)
//!     → redirect.rs (temporary rules, then permanent rules)
//!     → first match rewrites the path and ends the request
//!
//! Shared by certificate zones, MIME overrides and SCGI routes:
//!     → matcher.rs (regex compilation, prefix matching)
//! ```
//!
//! # Design Decisions
//! - Rule tables are ordered; the first matching redirect wins
//! - Invalid patterns are logged and treated as non-matching
//! - Deterministic: same input and config always yields the same result

pub mod matcher;
pub mod redirect;

pub use redirect::{apply_redirects, Redirect};

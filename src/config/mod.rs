//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → shared via Arc to every connection task
//!
//! Per request:
//!     resolved filesystem path
//!     → cascade.rs (walk ancestors up to the document root)
//!     → apply `.molly` override files root-most first
//!     → private ServerConfig copy for this request only
//! ```
//!
//! # Design Decisions
//! - Base config is immutable once loaded; overrides produce a fresh copy
//! - All fields have defaults to allow minimal configs
//! - Rule tables keep document order (rules.rs) so "first match" is stable

pub mod cascade;
pub mod loader;
pub mod rules;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use rules::RuleMap;
pub use schema::{LimitsConfig, OverrideFile, ServerConfig, SortKey};

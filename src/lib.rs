//! Gemini capsule server library.

pub mod config;
pub mod content;
pub mod gateway;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod routing;
pub mod security;

pub use config::ServerConfig;
pub use lifecycle::Shutdown;
pub use protocol::{GeminiServer, RequestHandler};

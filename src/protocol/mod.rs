//! Gemini protocol subsystem.
//!
//! # Data Flow
//! ```text
//! TLS stream
//!     → server.rs   (accept loop, handshake, per-connection task)
//!     → handler.rs  (request pipeline)
//!     → request.rs  (request line framing and URL parsing)
//!     → response.rs (single header, then body or relayed output)
//! ```
//!
//! # Design Decisions
//! - One request per connection; the connection closes after the response
//! - Every outcome is a [`status::Status`] plus meta string

pub mod handler;
pub mod request;
pub mod response;
pub mod server;
pub mod status;

pub use handler::RequestHandler;
pub use request::Request;
pub use response::Responder;
pub use server::GeminiServer;
pub use status::{Rejection, Status};

//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Request with client chain:
//!     → certificate.rs (chain parsed at handshake; validity windows)
//!     → path.rs (traversal refusal, `~user` mapping, symlink containment)
//!     → zones.rs (certificate zones matched against the request path)
//!     → Pass to gateways or static content
//! ```
//!
//! # Design Decisions
//! - Fail closed: an unparsable certificate rejects the request
//! - Not-found and forbidden are indistinguishable to clients
//! - No trust in client input: traversal is checked before normalisation

pub mod certificate;
pub mod path;
pub mod zones;

pub use certificate::{ClientCertificate, CertificateError};
pub use path::PathError;

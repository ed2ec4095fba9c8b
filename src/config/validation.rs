//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, port valid)
//! - Check every configured pattern compiles
//! - Check zone fingerprints are in the form comparisons expect
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system. Override files are not
//!   validated here; their bad patterns are skipped at request time.

use regex::Regex;

use crate::config::schema::ServerConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("hostname must not be empty")]
    EmptyHostname,

    #[error("port must not be zero")]
    ZeroPort,

    #[error("gemini_ext `{0}` must be non-empty and must not start with a dot")]
    BadExtension(String),

    #[error("home_doc_base `{0}` must be a single path component")]
    BadHomeDir(String),

    #[error("limit `{0}` must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("{table} pattern `{pattern}` is not a valid regex: {reason}")]
    BadPattern {
        table: &'static str,
        pattern: String,
        reason: String,
    },

    #[error("certificate zone `{zone}` fingerprint `{fingerprint}` is not 64 lowercase hex characters")]
    BadFingerprint { zone: String, fingerprint: String },
}

/// Validate a loaded configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.hostname.trim().is_empty() {
        errors.push(ValidationError::EmptyHostname);
    }
    if config.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }
    if config.gemini_ext.is_empty() || config.gemini_ext.starts_with('.') {
        errors.push(ValidationError::BadExtension(config.gemini_ext.clone()));
    }
    if config.home_doc_base.is_empty()
        || config.home_doc_base.contains('/')
        || config.home_doc_base == ".."
    {
        errors.push(ValidationError::BadHomeDir(config.home_doc_base.clone()));
    }

    let limits = &config.limits;
    for (name, value) in [
        ("max_connections", limits.max_connections as u64),
        ("request_timeout_secs", limits.request_timeout_secs),
        ("handshake_timeout_secs", limits.handshake_timeout_secs),
        ("cgi_timeout_secs", limits.cgi_timeout_secs),
        (
            "max_gateway_processes",
            limits.max_gateway_processes.unwrap_or(1) as u64,
        ),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroLimit(name));
        }
    }

    check_patterns(&mut errors, "temp_redirects", config.temp_redirects.keys());
    check_patterns(&mut errors, "perm_redirects", config.perm_redirects.keys());
    check_patterns(&mut errors, "mime_overrides", config.mime_overrides.keys());
    check_patterns(&mut errors, "certificate_zones", config.certificate_zones.keys());

    for (zone, fingerprints) in config.certificate_zones.iter() {
        for fingerprint in fingerprints {
            if !is_fingerprint(fingerprint) {
                errors.push(ValidationError::BadFingerprint {
                    zone: zone.to_string(),
                    fingerprint: fingerprint.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_patterns<'a>(
    errors: &mut Vec<ValidationError>,
    table: &'static str,
    patterns: impl Iterator<Item = &'a str>,
) {
    for pattern in patterns {
        if let Err(e) = Regex::new(pattern) {
            errors.push(ValidationError::BadPattern {
                table,
                pattern: pattern.to_string(),
                reason: e.to_string(),
            });
        }
    }
}

fn is_fingerprint(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

//! Certificate zone authorisation.
//!
//! Every zone whose pattern matches the request path must be satisfied by
//! at least one presented certificate. Zones are conjunctive: passing one
//! does not excuse failing another. A zone whose pattern does not compile
//! denies every request it is checked against.

use regex::Regex;

use crate::config::RuleMap;
use crate::protocol::status::{Rejection, Status};
use crate::security::certificate::ClientCertificate;

/// Check `path` against every matching zone.
pub fn authorize(
    zones: &RuleMap<Vec<String>>,
    path: &str,
    chain: &[ClientCertificate],
) -> Result<(), Rejection> {
    for (pattern, allowed) in zones.iter() {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                tracing::error!(zone = pattern, path, error = %e, "Invalid certificate zone pattern, denying access");
                return Err(denied(chain));
            }
        };
        if !regex.is_match(path) {
            continue;
        }

        let authorised = chain
            .iter()
            .any(|cert| allowed.iter().any(|fp| *fp == cert.fingerprint));
        if authorised {
            continue;
        }

        tracing::debug!(zone = pattern, path, certificates = chain.len(), "Certificate zone denied access");
        return Err(denied(chain));
    }
    Ok(())
}

fn denied(chain: &[ClientCertificate]) -> Rejection {
    if chain.is_empty() {
        Rejection::new(
            Status::ClientCertificateRequired,
            "A pre-authorised certificate is required to access this resource",
        )
    } else {
        Rejection::new(
            Status::CertificateNotAuthorised,
            "Provided certificate not authorised for this resource",
        )
    }
}

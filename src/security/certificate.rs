//! Client certificate identity and temporal validity.

use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::protocol::status::{Rejection, Status};

/// Error type for certificate parsing.
#[derive(Debug, thiserror::Error)]
#[error("unparsable client certificate: {0}")]
pub struct CertificateError(String);

/// The parts of a presented client certificate the server acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    /// Lowercase hex SHA-256 of the DER encoding.
    pub fingerprint: String,
    /// NotBefore as Unix seconds.
    pub not_before: i64,
    /// NotAfter as Unix seconds.
    pub not_after: i64,
    pub issuer: String,
    pub issuer_cn: String,
    pub subject: String,
    pub subject_cn: String,
}

impl ClientCertificate {
    /// Extract identity and validity from a DER certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| CertificateError(e.to_string()))?;
        let validity = cert.validity();

        Ok(Self {
            fingerprint: fingerprint(der),
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
            issuer: cert.issuer().to_string(),
            issuer_cn: common_name(cert.issuer()),
            subject: cert.subject().to_string(),
            subject_cn: common_name(cert.subject()),
        })
    }

    pub fn validity_at(&self, now: i64) -> Validity {
        if now < self.not_before {
            Validity::NotYetValid
        } else if now > self.not_after {
            Validity::Expired
        } else {
            Validity::Valid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    NotYetValid,
    Expired,
}

/// SHA-256 of raw certificate bytes, lowercase hex.
pub fn fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Reject the request if any certificate in the chain is outside its
/// validity window at `now`, not just the one used for authorisation.
pub fn enforce_validity(chain: &[ClientCertificate], now: i64) -> Result<(), Rejection> {
    for cert in chain {
        match cert.validity_at(now) {
            Validity::Valid => {}
            Validity::NotYetValid => {
                return Err(Rejection::new(
                    Status::CertificateNotYetValid,
                    "Client certificate not yet valid!",
                ));
            }
            Validity::Expired => {
                return Err(Rejection::new(
                    Status::CertificateExpired,
                    "Client certificate has expired!",
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_certificate(fingerprint: &str, not_before: i64, not_after: i64) -> ClientCertificate {
    ClientCertificate {
        fingerprint: fingerprint.to_string(),
        not_before,
        not_after,
        issuer: "CN=tester".to_string(),
        issuer_cn: "tester".to_string(),
        subject: "CN=tester".to_string(),
        subject_cn: "tester".to_string(),
    }
}

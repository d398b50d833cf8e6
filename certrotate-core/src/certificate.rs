//! Certificate records as exchanged with the identity registry.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Required length of a certificate id accepted for deactivation.
pub const CERTIFICATE_ID_LEN: usize = 64;

static CERTIFICATE_ID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new("^(0x)?[a-fA-F0-9]+$").ok());

/// Lifecycle status of a certificate in the registry.
///
/// Rotation creates certificates as [`CertificateStatus::PendingActivation`],
/// activates them once the device confirms receipt and deactivates the old
/// one once the device runs on the new one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    /// Issued but not yet usable for authentication.
    PendingActivation,
    /// Usable for authentication.
    Active,
    /// Not usable for authentication. Can be re-activated administratively.
    Inactive,
    /// Permanently unusable.
    Revoked,
    /// Being transferred to another account.
    PendingTransfer,
    /// Registered without a CA and not yet activated.
    RegisterInactive,
    /// A status this crate does not know about. Only produced when decoding
    /// a registry response.
    #[serde(other)]
    Unknown,
}

/// A certificate freshly created from a signing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCertificate {
    /// Registry-assigned identifier.
    pub certificate_id: String,
    /// Canonical handle used for binding operations.
    pub certificate_arn: String,
    /// PEM material. Only available at creation time.
    pub certificate_pem: String,
}

/// The registry's view of an existing certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDescription {
    /// Registry-assigned identifier.
    pub certificate_id: String,
    /// Canonical handle used for binding operations.
    pub certificate_arn: String,
    /// Current lifecycle status.
    pub status: CertificateStatus,
}

/// Whether `certificate_id` is syntactically a registry certificate id:
/// hexadecimal digits, optionally `0x` prefixed, exactly 64 characters in
/// total.
#[must_use]
pub fn is_valid_certificate_id(certificate_id: &str) -> bool {
    certificate_id.len() == CERTIFICATE_ID_LEN
        && CERTIFICATE_ID_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(certificate_id))
}

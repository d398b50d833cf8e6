//! Results of the rotation operations and the JSON published for them.

use serde::{Deserialize, Serialize};

use crate::error::RotationError;

/// The outcome of a successful rotation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationSuccess {
    /// A new certificate was issued and bound like the old one.
    Issued {
        /// Identifier of the new certificate.
        new_certificate_id: String,
        /// Canonical handle of the new certificate.
        new_certificate_arn: String,
        /// PEM of the new certificate, only ever available here.
        new_certificate_pem: String,
        /// The certificate the request authenticated with.
        old_certificate_id: String,
    },
    /// The new certificate is now active.
    Activated {
        /// The activated certificate.
        certificate_id: String,
    },
    /// The old certificate is now inactive.
    Deactivated {
        /// The deactivated certificate.
        certificate_id: String,
    },
}

/// JSON body published on a client's result channel.
///
/// Variants are untagged; each has a distinct shape so devices (and
/// [`Deserialize`]) can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Material for the newly issued certificate.
    #[serde(rename_all = "camelCase")]
    Issued {
        /// Canonical handle of the new certificate.
        new_certificate_arn: String,
        /// Identifier of the new certificate.
        new_certificate_id: String,
        /// PEM of the new certificate.
        new_certificate_pem: String,
        /// The certificate the request authenticated with.
        old_certificate_id: String,
    },
    /// A failure. `result` carries follow-up instructions when there are any.
    Failure {
        /// Description of the failure.
        error: String,
        /// Echo of the requesting client, set on self-lockout rejections.
        #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        /// What the device or an operator has to do next.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    /// A confirmation wrapped in an object.
    Result {
        /// Human-readable confirmation.
        result: String,
    },
    /// A bare confirmation string.
    Message(String),
}

impl ResponsePayload {
    /// A failure payload with only an error description.
    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
            client_id: None,
            result: None,
        }
    }

    /// A bare confirmation string.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Whether this payload reports a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

impl From<&RotationSuccess> for ResponsePayload {
    fn from(success: &RotationSuccess) -> Self {
        match success {
            RotationSuccess::Issued {
                new_certificate_id,
                new_certificate_arn,
                new_certificate_pem,
                old_certificate_id,
            } => Self::Issued {
                new_certificate_arn: new_certificate_arn.clone(),
                new_certificate_id: new_certificate_id.clone(),
                new_certificate_pem: new_certificate_pem.clone(),
                old_certificate_id: old_certificate_id.clone(),
            },
            RotationSuccess::Activated { certificate_id } => {
                Self::message(format!("certificate {certificate_id} was set as active"))
            }
            RotationSuccess::Deactivated { certificate_id } => Self::Result {
                result: format!("{certificate_id} was successfully set as inactive"),
            },
        }
    }
}

impl From<&RotationError> for ResponsePayload {
    fn from(error: &RotationError) -> Self {
        match error {
            RotationError::SelfLockout { client_id } => Self::Failure {
                error: error.to_string(),
                client_id: Some(client_id.clone()),
                result: None,
            },
            RotationError::BindingIncomplete {
                new_certificate_id, ..
            } => Self::Failure {
                error: error.to_string(),
                client_id: None,
                result: Some(format!(
                    "certificate {new_certificate_id} was left pending activation"
                )),
            },
            RotationError::DeactivationFailed { certificate_id, .. } => Self::Failure {
                error: error.to_string(),
                client_id: None,
                result: Some(format!(
                    "you must manually deactivate the certificate with id {certificate_id}"
                )),
            },
            RotationError::MissingField { .. }
            | RotationError::InvalidField { .. }
            | RotationError::InvalidCertificateId { .. }
            | RotationError::Registry(_) => Self::error(error.to_string()),
        }
    }
}

impl From<&Result<RotationSuccess, RotationError>> for ResponsePayload {
    fn from(outcome: &Result<RotationSuccess, RotationError>) -> Self {
        match outcome {
            Ok(success) => success.into(),
            Err(error) => error.into(),
        }
    }
}

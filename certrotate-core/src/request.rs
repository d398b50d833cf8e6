//! Inbound rotation requests.
//!
//! Requests arrive as JSON objects of the form
//! `{ "principal": ..., "clientId": ..., "response": { ... } }`, where
//! `principal` is the certificate id that authenticated the message and
//! `response` holds the operation specific field.

use serde_json::Value;

use crate::error::RotationError;

const CLIENT_ID: &str = "clientId";
const PRINCIPAL: &str = "principal";
const RESPONSE: &str = "response";

/// Request to issue a new certificate and bind it like the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    /// Channel correlation key of the requesting device.
    pub client_id: String,
    /// Certificate the request authenticated with; the one being replaced.
    pub principal: String,
    /// PEM encoded certificate signing request.
    pub csr: String,
}

/// Request to activate a certificate issued earlier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateRequest {
    /// Channel correlation key of the requesting device.
    pub client_id: String,
    /// Certificate to activate.
    pub new_certificate_id: String,
}

/// Request to deactivate the certificate a device rotated away from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeactivateRequest {
    /// Channel correlation key of the requesting device.
    pub client_id: String,
    /// Certificate the request authenticated with.
    pub principal: String,
    /// Certificate to deactivate.
    pub old_certificate_id: String,
}

impl IssueRequest {
    /// Reads the request from an inbound event.
    ///
    /// # Errors
    /// Returns [`RotationError::MissingField`] or [`RotationError::InvalidField`]
    /// naming the first unusable field.
    pub fn from_event(event: &Value) -> Result<Self, RotationError> {
        Ok(Self {
            client_id: client_id(event)?,
            principal: required_str(event, &[PRINCIPAL])?,
            csr: required_str(event, &[RESPONSE, "csr"])?,
        })
    }
}

impl ActivateRequest {
    /// Reads the request from an inbound event.
    ///
    /// # Errors
    /// Returns [`RotationError::MissingField`] or [`RotationError::InvalidField`]
    /// naming the first unusable field.
    pub fn from_event(event: &Value) -> Result<Self, RotationError> {
        Ok(Self {
            client_id: client_id(event)?,
            new_certificate_id: required_str(event, &[RESPONSE, "newCertificateId"])?,
        })
    }
}

impl DeactivateRequest {
    /// Reads the request from an inbound event.
    ///
    /// # Errors
    /// Returns [`RotationError::MissingField`] or [`RotationError::InvalidField`]
    /// naming the first unusable field.
    pub fn from_event(event: &Value) -> Result<Self, RotationError> {
        Ok(Self {
            client_id: client_id(event)?,
            principal: required_str(event, &[PRINCIPAL])?,
            old_certificate_id: required_str(event, &[RESPONSE, "oldCertificateId"])?,
        })
    }
}

/// The client id of an event, independent of whether the rest is well formed.
///
/// # Errors
/// Returns [`RotationError::MissingField`] or [`RotationError::InvalidField`]
/// for `clientId`.
pub fn client_id(event: &Value) -> Result<String, RotationError> {
    required_str(event, &[CLIENT_ID])
}

fn required_str(event: &Value, path: &[&str]) -> Result<String, RotationError> {
    let field = path.join(".");
    let value = path
        .iter()
        .try_fold(event, |value, key| value.get(key))
        .filter(|value| !value.is_null())
        .ok_or_else(|| RotationError::missing(&field))?;

    match value.as_str() {
        Some("") => Err(RotationError::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        }),
        Some(text) => Ok(text.to_string()),
        None => Err(RotationError::InvalidField {
            field,
            reason: "must be a string".to_string(),
        }),
    }
}

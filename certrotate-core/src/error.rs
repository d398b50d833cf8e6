use thiserror::Error;

use crate::certificate::CertificateStatus;

/// Errors returned by a [`Registry`](crate::registry::Registry) implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Network or HTTP failure talking to the registry. Transient failures have
    /// already been retried by the time this is returned.
    #[error("network_error: {error} (url: {url}, status: {status:?})")]
    Network {
        /// The URL of the failed request.
        url: String,
        /// The HTTP status code, if a response was received.
        status: Option<u16>,
        /// Description of the failure.
        error: String,
    },
    /// The registry answered with a body that could not be decoded.
    #[error("serialization_error: {error}")]
    Serialization {
        /// Description of the decoding failure.
        error: String,
    },
    /// The referenced certificate, policy or thing does not exist.
    #[error("not_found: {resource}")]
    NotFound {
        /// The resource that could not be found.
        resource: String,
    },
    /// The registry refuses the requested status change.
    #[error("invalid_transition: certificate {certificate_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The certificate being updated.
        certificate_id: String,
        /// Its current status.
        from: CertificateStatus,
        /// The requested status.
        to: CertificateStatus,
    },
    /// The registry rejected the request for any other reason.
    #[error("rejected: {error}")]
    Rejected {
        /// Description of the rejection.
        error: String,
    },
}

/// Errors returned by a [`Publisher`](crate::notifier::Publisher).
///
/// Kept apart from [`RegistryError`]: publish failures are logged and
/// swallowed, never surfaced to the device.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The publish request failed.
    #[error("network_error: {error} (url: {url}, status: {status:?})")]
    Network {
        /// The URL of the failed request.
        url: String,
        /// The HTTP status code, if a response was received.
        status: Option<u16>,
        /// Description of the failure.
        error: String,
    },
    /// The payload could not be serialized.
    #[error("serialization_error: {error}")]
    Serialization {
        /// Description of the serialization failure.
        error: String,
    },
}

/// Invalid client configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The endpoint is not a usable URL.
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// The endpoint as configured.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Only QoS 0 and 1 are supported for result delivery.
    #[error("invalid qos {0}, expected 0 or 1")]
    InvalidQos(u8),
    /// At least one attempt is required.
    #[error("invalid max attempts {0}, expected at least 1")]
    InvalidMaxAttempts(u32),
}

/// The outcome of a failed rotation step.
///
/// Variants map onto the three reportable classes of failure: validation
/// (`MissingField`, `InvalidField`, `InvalidCertificateId`), the self-lockout
/// guard (`SelfLockout`) and registry failures (`Registry`,
/// `BindingIncomplete`, `DeactivationFailed`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RotationError {
    /// A required field is absent from the inbound request.
    #[error("user failed to supply the {field}")]
    MissingField {
        /// Path of the missing field, e.g. `response.csr`.
        field: String,
    },
    /// A field is present but unusable.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Path of the offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The old certificate id is not a 64 character hexadecimal identifier.
    #[error("you have passed an invalid old certificate id")]
    InvalidCertificateId {
        /// The rejected value.
        certificate_id: String,
    },
    /// The caller asked to deactivate the certificate it is connected with.
    #[error("You must connect with your new certificate to deactivate")]
    SelfLockout {
        /// The client that made the request.
        client_id: String,
    },
    /// A registry call failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Replicating a binding onto the new certificate failed. The new
    /// certificate stays pending activation and is not cleaned up.
    #[error("{source}")]
    BindingIncomplete {
        /// The certificate created by this rotation attempt.
        new_certificate_id: String,
        /// The binding that could not be attached, e.g. `policy DevicePolicy`.
        binding: String,
        /// The registry failure.
        source: RegistryError,
    },
    /// Setting the old certificate inactive failed.
    #[error("{source}")]
    DeactivationFailed {
        /// The certificate that is still active.
        certificate_id: String,
        /// The registry failure.
        source: RegistryError,
    },
}

impl RotationError {
    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }

    /// Whether the request was rejected before any registry call was made.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::InvalidField { .. }
                | Self::InvalidCertificateId { .. }
                | Self::SelfLockout { .. }
        )
    }
}

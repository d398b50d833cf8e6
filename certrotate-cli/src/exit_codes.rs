//! Script-parseable exit codes.
//!
//! # Exit Code Categories
//!
//! - **0**: Success
//! - **1**: Configuration, I/O and other local failures
//! - **10-19**: Requests rejected before any state change
//! - **20-29**: Registry failures

use certrotate_core::RotationError;

/// Exit code constants.
pub mod codes {
    /// Success exit code.
    pub const SUCCESS: u8 = 0;

    /// Generic error (fallback for unmapped errors).
    pub const GENERIC_ERROR: u8 = 1;

    /// Validation error or self-lockout rejection.
    ///
    /// Returned when the request was refused before the registry was asked
    /// to change anything.
    pub const VALIDATION_ERROR: u8 = 10;

    /// Registry failure.
    ///
    /// Returned when a registry call failed after retries. The payload says
    /// whether a certificate was left pending or still needs deactivating.
    pub const REGISTRY_ERROR: u8 = 20;
}

/// Maps the outcome of a rotation phase to an exit code.
///
/// | Error | Exit Code |
/// |-------|-----------|
/// | `MissingField`, `InvalidField` | 10 (`VALIDATION_ERROR`) |
/// | `InvalidCertificateId`, `SelfLockout` | 10 (`VALIDATION_ERROR`) |
/// | `Registry`, `BindingIncomplete` | 20 (`REGISTRY_ERROR`) |
/// | `DeactivationFailed` | 20 (`REGISTRY_ERROR`) |
#[must_use]
pub const fn map_rotation_error(error: &RotationError) -> u8 {
    if error.is_rejection() {
        codes::VALIDATION_ERROR
    } else {
        codes::REGISTRY_ERROR
    }
}

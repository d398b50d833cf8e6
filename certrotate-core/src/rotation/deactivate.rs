use crate::certificate::{is_valid_certificate_id, CertificateStatus};
use crate::error::RotationError;
use crate::registry::Registry;
use crate::request::DeactivateRequest;
use crate::response::RotationSuccess;

/// Deactivates the certificate a device rotated away from.
///
/// The old certificate id must be a 64 character hexadecimal id, and it must
/// differ from the certificate the request authenticated with: deactivating
/// that one would cut the device off before it sees the result. Both checks
/// happen before the registry is contacted.
///
/// # Errors
/// Returns [`RotationError::InvalidCertificateId`] for a malformed id,
/// [`RotationError::SelfLockout`] when the device is still connected with the
/// old certificate and [`RotationError::DeactivationFailed`] if the registry
/// refuses the update.
pub async fn deactivate(
    registry: &dyn Registry,
    request: &DeactivateRequest,
) -> Result<RotationSuccess, RotationError> {
    let old_certificate_id = &request.old_certificate_id;
    if !is_valid_certificate_id(old_certificate_id) {
        return Err(RotationError::InvalidCertificateId {
            certificate_id: old_certificate_id.clone(),
        });
    }
    log::info!("the old certificate id is {old_certificate_id}");

    if request.principal == *old_certificate_id {
        return Err(RotationError::SelfLockout {
            client_id: request.client_id.clone(),
        });
    }

    registry
        .update_certificate_status(old_certificate_id, CertificateStatus::Inactive)
        .await
        .map_err(|source| RotationError::DeactivationFailed {
            certificate_id: old_certificate_id.clone(),
            source,
        })?;
    log::info!("{old_certificate_id} was successfully set as inactive");

    Ok(RotationSuccess::Deactivated {
        certificate_id: old_certificate_id.clone(),
    })
}

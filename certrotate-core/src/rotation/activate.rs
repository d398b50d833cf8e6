use crate::certificate::CertificateStatus;
use crate::error::RotationError;
use crate::registry::Registry;
use crate::request::ActivateRequest;
use crate::response::RotationSuccess;

/// Activates a certificate the device has received and is ready to use.
///
/// No precondition is checked beyond what the registry enforces, so
/// activating an already active certificate succeeds.
///
/// # Errors
/// Returns [`RotationError::Registry`] if the registry refuses the update.
pub async fn activate(
    registry: &dyn Registry,
    request: &ActivateRequest,
) -> Result<RotationSuccess, RotationError> {
    registry
        .update_certificate_status(&request.new_certificate_id, CertificateStatus::Active)
        .await?;
    log::info!(
        "certificate {} was set as active",
        request.new_certificate_id
    );

    Ok(RotationSuccess::Activated {
        certificate_id: request.new_certificate_id.clone(),
    })
}

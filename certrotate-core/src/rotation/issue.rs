use crate::error::{RegistryError, RotationError};
use crate::registry::{drain_pages, Registry};
use crate::request::IssueRequest;
use crate::response::RotationSuccess;

/// Every policy and thing a certificate is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    /// Names of attached policies.
    pub policies: Vec<String>,
    /// Names of attached things.
    pub things: Vec<String>,
}

/// Lists all bindings of a certificate, following continuation tokens until
/// both listings are exhausted.
///
/// # Errors
/// Returns the first [`RegistryError`]; a partial listing is never returned.
pub async fn list_bindings(
    registry: &dyn Registry,
    certificate_arn: &str,
) -> Result<Bindings, RegistryError> {
    let policies = drain_pages(|marker| async move {
        registry
            .list_attached_policies(certificate_arn, marker.as_deref())
            .await
    })
    .await?;
    log::info!("got {} attached policies", policies.len());

    let things = drain_pages(|next_token| async move {
        registry
            .list_principal_things(certificate_arn, next_token.as_deref())
            .await
    })
    .await?;
    log::info!("got {} attached things", things.len());

    Ok(Bindings { policies, things })
}

/// Attaches every binding of the old certificate to the new one.
///
/// The old certificate's bindings are read in full before the first attach.
/// Attaching is idempotent, so running this again for the same pair leaves
/// the same binding set.
///
/// # Errors
/// Returns [`RotationError::Registry`] if listing fails, and
/// [`RotationError::BindingIncomplete`] for the first attach that fails.
pub async fn replicate_bindings(
    registry: &dyn Registry,
    old_certificate_arn: &str,
    new_certificate_id: &str,
    new_certificate_arn: &str,
) -> Result<Bindings, RotationError> {
    let bindings = list_bindings(registry, old_certificate_arn).await?;

    let incomplete = |binding: String| {
        move |source: RegistryError| RotationError::BindingIncomplete {
            new_certificate_id: new_certificate_id.to_string(),
            binding,
            source,
        }
    };

    for policy in &bindings.policies {
        log::info!("attaching certificate {new_certificate_arn} to policy {policy}");
        registry
            .attach_policy(policy, new_certificate_arn)
            .await
            .map_err(incomplete(format!("policy {policy}")))?;
    }

    for thing in &bindings.things {
        log::info!("attaching certificate {new_certificate_arn} to thing {thing}");
        registry
            .attach_thing_principal(thing, new_certificate_arn)
            .await
            .map_err(incomplete(format!("thing {thing}")))?;
    }

    Ok(bindings)
}

/// Issues a certificate from the request's CSR and binds it to every policy
/// and thing the authenticating certificate is bound to.
///
/// The new certificate is created pending activation. If binding fails, the
/// new certificate keeps the bindings made so far and stays pending; nothing
/// deletes it. A retry issues another certificate and re-resolves the old
/// certificate's current bindings.
///
/// # Errors
/// Returns [`RotationError::Registry`] if creating the certificate, resolving
/// the old one or listing its bindings fails, and
/// [`RotationError::BindingIncomplete`] if an attach fails.
pub async fn issue_and_bind(
    registry: &dyn Registry,
    request: &IssueRequest,
) -> Result<RotationSuccess, RotationError> {
    let old_certificate_id = &request.principal;
    log::info!("the expired certificate id is {old_certificate_id}");

    let issued = registry.create_certificate_from_csr(&request.csr).await?;
    log::info!("created certificate with id {}", issued.certificate_id);

    let old_certificate_arn = registry
        .describe_certificate(old_certificate_id)
        .await?
        .certificate_arn;

    replicate_bindings(
        registry,
        &old_certificate_arn,
        &issued.certificate_id,
        &issued.certificate_arn,
    )
    .await?;

    Ok(RotationSuccess::Issued {
        new_certificate_id: issued.certificate_id,
        new_certificate_arn: issued.certificate_arn,
        new_certificate_pem: issued.certificate_pem,
        old_certificate_id: old_certificate_id.clone(),
    })
}

//! The identity registry that owns certificates and their bindings.
//!
//! [`Registry`] is the seam between the rotation operations and the
//! registry service. [`HttpRegistry`] talks to the registry's REST API and
//! retries transient failures; [`InMemoryRegistry`] keeps everything in
//! process for tests and dry runs.

use std::collections::HashSet;
use std::future::Future;

use async_trait::async_trait;

use crate::certificate::{CertificateDescription, CertificateStatus, IssuedCertificate};
use crate::error::RegistryError;

mod http;
mod memory;

pub use http::HttpRegistry;
pub use memory::InMemoryRegistry;

/// One page of a paged registry listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Continuation token for the next page, `None` on the last page.
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// A page with no continuation.
    #[must_use]
    pub const fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// Operations the rotation protocol needs from the identity registry.
///
/// Every call is individually idempotent to retry; attaching a binding that
/// already exists must succeed.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Creates a certificate from a signing request. The certificate is never
    /// activated at creation.
    ///
    /// # Errors
    /// Returns [`RegistryError`] if the registry refuses the request.
    async fn create_certificate_from_csr(
        &self,
        csr: &str,
    ) -> Result<IssuedCertificate, RegistryError>;

    /// Looks up an existing certificate.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] for unknown ids.
    async fn describe_certificate(
        &self,
        certificate_id: &str,
    ) -> Result<CertificateDescription, RegistryError>;

    /// Lists the names of policies attached to a certificate, one page at a time.
    ///
    /// # Errors
    /// Returns [`RegistryError`] if the page cannot be fetched.
    async fn list_attached_policies(
        &self,
        certificate_arn: &str,
        marker: Option<&str>,
    ) -> Result<Page<String>, RegistryError>;

    /// Lists the names of things attached to a certificate, one page at a time.
    ///
    /// # Errors
    /// Returns [`RegistryError`] if the page cannot be fetched.
    async fn list_principal_things(
        &self,
        certificate_arn: &str,
        next_token: Option<&str>,
    ) -> Result<Page<String>, RegistryError>;

    /// Attaches a policy to a certificate.
    ///
    /// # Errors
    /// Returns [`RegistryError`] if the policy or certificate is unknown.
    async fn attach_policy(
        &self,
        policy_name: &str,
        certificate_arn: &str,
    ) -> Result<(), RegistryError>;

    /// Attaches a certificate to a thing.
    ///
    /// # Errors
    /// Returns [`RegistryError`] if the thing or certificate is unknown.
    async fn attach_thing_principal(
        &self,
        thing_name: &str,
        certificate_arn: &str,
    ) -> Result<(), RegistryError>;

    /// Sets the status of a certificate.
    ///
    /// # Errors
    /// Returns [`RegistryError::InvalidTransition`] if the registry forbids
    /// the change.
    async fn update_certificate_status(
        &self,
        certificate_id: &str,
        status: CertificateStatus,
    ) -> Result<(), RegistryError>;
}

/// Follows continuation tokens until the listing is exhausted.
///
/// Every call starts again from the first page. A token the registry already
/// handed out aborts the listing instead of looping forever.
///
/// # Errors
/// Returns the first failure of `fetch`, or [`RegistryError::Rejected`] on a
/// repeated continuation token. No partial listing is returned.
pub async fn drain_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, RegistryError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, RegistryError>>,
{
    let mut items = Vec::new();
    let mut seen_tokens = HashSet::new();
    let mut token = None;

    loop {
        let page = fetch(token.take()).await?;
        items.extend(page.items);

        match page.next_token {
            None => return Ok(items),
            Some(next) => {
                if !seen_tokens.insert(next.clone()) {
                    return Err(RegistryError::Rejected {
                        error: format!("continuation token {next} was returned twice"),
                    });
                }
                token = Some(next);
            }
        }
    }
}

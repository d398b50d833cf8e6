//! In-memory identity registry for tests and dry runs.
//!
//! Mirrors the registry semantics the rotation protocol relies on: new
//! certificates start pending activation, listings are paged, re-attaching a
//! binding is a no-op and revoked certificates cannot be brought back.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

use super::{Page, Registry};
use crate::certificate::{CertificateDescription, CertificateStatus, IssuedCertificate};
use crate::error::RegistryError;

const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Clone)]
struct CertificateRecord {
    arn: String,
    status: CertificateStatus,
}

#[derive(Debug, Default)]
struct State {
    certificates: HashMap<String, CertificateRecord>,
    policies: BTreeMap<String, BTreeSet<String>>,
    things: BTreeMap<String, BTreeSet<String>>,
    known_policies: HashSet<String>,
    known_things: HashSet<String>,
    failing_operations: HashSet<String>,
    calls: Vec<String>,
    issued: u64,
}

/// A thread-safe registry held entirely in memory.
///
/// Certificate ids are SHA-256 fingerprints of the synthesized PEM, so they
/// pass the same syntactic checks as real registry ids.
#[derive(Debug)]
pub struct InMemoryRegistry {
    account: String,
    page_size: usize,
    state: Mutex<State>,
}

impl InMemoryRegistry {
    /// Creates an empty registry serving listings 25 items per page.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates an empty registry serving listings `page_size` items per page.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            account: "arn:aws:iot:local:000000000000".to_string(),
            page_size: page_size.max(1),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn arn_for(&self, certificate_id: &str) -> String {
        format!("{}:cert/{certificate_id}", self.account)
    }

    /// Registers an existing certificate, returning its ARN.
    pub fn register_certificate(&self, certificate_id: &str, status: CertificateStatus) -> String {
        let arn = self.arn_for(certificate_id);
        self.state().certificates.insert(
            certificate_id.to_string(),
            CertificateRecord {
                arn: arn.clone(),
                status,
            },
        );
        arn
    }

    /// Declares a policy so it can be attached.
    pub fn create_policy(&self, policy_name: &str) {
        self.state().known_policies.insert(policy_name.to_string());
    }

    /// Declares a thing so certificates can be attached to it.
    pub fn create_thing(&self, thing_name: &str) {
        self.state().known_things.insert(thing_name.to_string());
    }

    /// Current status of a certificate, if it exists.
    #[must_use]
    pub fn status(&self, certificate_id: &str) -> Option<CertificateStatus> {
        self.state()
            .certificates
            .get(certificate_id)
            .map(|record| record.status)
    }

    /// ARN of a certificate, if it exists.
    #[must_use]
    pub fn arn(&self, certificate_id: &str) -> Option<String> {
        self.state()
            .certificates
            .get(certificate_id)
            .map(|record| record.arn.clone())
    }

    /// Policies attached to the certificate with the given ARN.
    #[must_use]
    pub fn policies_of(&self, certificate_arn: &str) -> BTreeSet<String> {
        self.state()
            .policies
            .get(certificate_arn)
            .cloned()
            .unwrap_or_default()
    }

    /// Things attached to the certificate with the given ARN.
    #[must_use]
    pub fn things_of(&self, certificate_arn: &str) -> BTreeSet<String> {
        self.state()
            .things
            .get(certificate_arn)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of certificates known to the registry.
    #[must_use]
    pub fn certificate_count(&self) -> usize {
        self.state().certificates.len()
    }

    /// Names of the registry operations invoked so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Makes every subsequent call to `operation` (a [`Registry`] method
    /// name) fail with a server error until [`Self::clear_failures`].
    pub fn fail_operation(&self, operation: &str) {
        self.state().failing_operations.insert(operation.to_string());
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.state().failing_operations.clear();
    }

    /// Records the call and returns the state, or the injected failure.
    fn enter(&self, operation: &str) -> Result<MutexGuard<'_, State>, RegistryError> {
        let mut state = self.state();
        state.calls.push(operation.to_string());
        if state.failing_operations.contains(operation) {
            return Err(RegistryError::Network {
                url: format!("memory://registry/{operation}"),
                status: Some(500),
                error: "injected failure".to_string(),
            });
        }
        Ok(state)
    }

    fn page(
        &self,
        items: Option<&BTreeSet<String>>,
        token: Option<&str>,
    ) -> Result<Page<String>, RegistryError> {
        let offset = match token {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| RegistryError::Rejected {
                error: format!("invalid continuation token {token}"),
            })?,
        };
        let items: Vec<String> = items.into_iter().flatten().cloned().collect();
        let end = offset.saturating_add(self.page_size).min(items.len());
        let page_items = items
            .get(offset..end)
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let next_token = (end < items.len()).then(|| end.to_string());
        Ok(Page {
            items: page_items,
            next_token,
        })
    }

    fn require_certificate_arn(
        state: &State,
        certificate_arn: &str,
    ) -> Result<(), RegistryError> {
        if state
            .certificates
            .values()
            .any(|record| record.arn == certificate_arn)
        {
            Ok(())
        } else {
            Err(RegistryError::NotFound {
                resource: format!("certificate {certificate_arn}"),
            })
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn create_certificate_from_csr(
        &self,
        csr: &str,
    ) -> Result<IssuedCertificate, RegistryError> {
        let mut state = self.enter("create_certificate_from_csr")?;
        if !csr.contains("CERTIFICATE REQUEST") {
            return Err(RegistryError::Rejected {
                error: "the certificate signing request is not valid".to_string(),
            });
        }

        state.issued += 1;
        let body = STANDARD.encode(format!("{csr}#{}", state.issued));
        let certificate_pem =
            format!("-----BEGIN CERTIFICATE-----\n{body}\n-----END CERTIFICATE-----\n");
        let certificate_id = hex::encode(Sha256::digest(certificate_pem.as_bytes()));
        let certificate_arn = self.arn_for(&certificate_id);

        state.certificates.insert(
            certificate_id.clone(),
            CertificateRecord {
                arn: certificate_arn.clone(),
                status: CertificateStatus::PendingActivation,
            },
        );
        drop(state);

        Ok(IssuedCertificate {
            certificate_id,
            certificate_arn,
            certificate_pem,
        })
    }

    async fn describe_certificate(
        &self,
        certificate_id: &str,
    ) -> Result<CertificateDescription, RegistryError> {
        let state = self.enter("describe_certificate")?;
        state
            .certificates
            .get(certificate_id)
            .map(|record| CertificateDescription {
                certificate_id: certificate_id.to_string(),
                certificate_arn: record.arn.clone(),
                status: record.status,
            })
            .ok_or_else(|| RegistryError::NotFound {
                resource: format!("certificate {certificate_id}"),
            })
    }

    async fn list_attached_policies(
        &self,
        certificate_arn: &str,
        marker: Option<&str>,
    ) -> Result<Page<String>, RegistryError> {
        let state = self.enter("list_attached_policies")?;
        self.page(state.policies.get(certificate_arn), marker)
    }

    async fn list_principal_things(
        &self,
        certificate_arn: &str,
        next_token: Option<&str>,
    ) -> Result<Page<String>, RegistryError> {
        let state = self.enter("list_principal_things")?;
        self.page(state.things.get(certificate_arn), next_token)
    }

    async fn attach_policy(
        &self,
        policy_name: &str,
        certificate_arn: &str,
    ) -> Result<(), RegistryError> {
        let mut state = self.enter("attach_policy")?;
        Self::require_certificate_arn(&state, certificate_arn)?;
        if !state.known_policies.contains(policy_name) {
            return Err(RegistryError::NotFound {
                resource: format!("policy {policy_name}"),
            });
        }
        state
            .policies
            .entry(certificate_arn.to_string())
            .or_default()
            .insert(policy_name.to_string());
        Ok(())
    }

    async fn attach_thing_principal(
        &self,
        thing_name: &str,
        certificate_arn: &str,
    ) -> Result<(), RegistryError> {
        let mut state = self.enter("attach_thing_principal")?;
        Self::require_certificate_arn(&state, certificate_arn)?;
        if !state.known_things.contains(thing_name) {
            return Err(RegistryError::NotFound {
                resource: format!("thing {thing_name}"),
            });
        }
        state
            .things
            .entry(certificate_arn.to_string())
            .or_default()
            .insert(thing_name.to_string());
        Ok(())
    }

    async fn update_certificate_status(
        &self,
        certificate_id: &str,
        status: CertificateStatus,
    ) -> Result<(), RegistryError> {
        let mut state = self.enter("update_certificate_status")?;
        let record = state
            .certificates
            .get_mut(certificate_id)
            .ok_or_else(|| RegistryError::NotFound {
                resource: format!("certificate {certificate_id}"),
            })?;

        let from = record.status;
        let settable = matches!(
            status,
            CertificateStatus::Active | CertificateStatus::Inactive | CertificateStatus::Revoked
        );
        if from == CertificateStatus::Revoked || !settable {
            return Err(RegistryError::InvalidTransition {
                certificate_id: certificate_id.to_string(),
                from,
                to: status,
            });
        }
        record.status = status;
        Ok(())
    }
}

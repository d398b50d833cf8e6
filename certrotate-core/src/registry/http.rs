//! REST client for the identity registry control plane.
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{Page, Registry};
use crate::certificate::{CertificateDescription, CertificateStatus, IssuedCertificate};
use crate::config::RegistryConfig;
use crate::error::{ConfigError, RegistryError};
use crate::http_request::{Request, RequestFailure};

const PRINCIPAL_HEADER: &str = "x-amzn-principal";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeCertificateResponse {
    certificate_description: CertificateDescription,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachedPolicy {
    policy_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAttachedPoliciesResponse {
    #[serde(default)]
    policies: Vec<AttachedPolicy>,
    next_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPrincipalThingsResponse {
    #[serde(default)]
    things: Vec<String>,
    next_token: Option<String>,
}

impl From<RequestFailure> for RegistryError {
    fn from(value: RequestFailure) -> Self {
        Self::Network {
            url: value.url,
            status: value.status,
            error: value.error,
        }
    }
}

/// Identity registry client over HTTPS.
///
/// Every call is retried on throttling, server errors, timeouts and
/// connection failures, up to the configured number of attempts.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base_url: Url,
    request: Request,
}

impl HttpRegistry {
    /// Creates a client from validated configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: &RegistryConfig) -> Result<Self, ConfigError> {
        let base_url = config.validate()?;
        Ok(Self {
            base_url,
            request: Request::new(config.timeout, config.max_attempts),
        })
    }

    /// Builds `base/segment/segment...`, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RegistryError::Rejected {
                error: format!("registry endpoint {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request_builder: RequestBuilder) -> Result<Response, RegistryError> {
        let response = self.request.handle(request_builder).await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let error_body = response.text().await.unwrap_or_default();
        if status.as_u16() == 404 {
            return Err(RegistryError::NotFound {
                resource: format!("{url}: {error_body}"),
            });
        }
        Err(RegistryError::Network {
            url,
            status: Some(status.as_u16()),
            error: error_body,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<T, RegistryError> {
        self.send(request_builder)
            .await?
            .json()
            .await
            .map_err(|e| RegistryError::Serialization {
                error: format!("Failed to parse registry response: {e}"),
            })
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn create_certificate_from_csr(
        &self,
        csr: &str,
    ) -> Result<IssuedCertificate, RegistryError> {
        let mut url = self.url(&["certificates"])?;
        url.query_pairs_mut().append_pair("setAsActive", "false");

        let request_builder = self
            .request
            .req(Method::POST, url)
            .json(&json!({ "certificateSigningRequest": csr }));
        self.send_json(request_builder).await
    }

    async fn describe_certificate(
        &self,
        certificate_id: &str,
    ) -> Result<CertificateDescription, RegistryError> {
        let url = self.url(&["certificates", certificate_id])?;
        let response: DescribeCertificateResponse = self
            .send_json(self.request.req(Method::GET, url))
            .await?;
        Ok(response.certificate_description)
    }

    async fn list_attached_policies(
        &self,
        certificate_arn: &str,
        marker: Option<&str>,
    ) -> Result<Page<String>, RegistryError> {
        let mut url = self.url(&["attached-policies", certificate_arn])?;
        url.query_pairs_mut().append_pair("recursive", "false");
        if let Some(marker) = marker {
            url.query_pairs_mut().append_pair("marker", marker);
        }

        let response: ListAttachedPoliciesResponse = self
            .send_json(self.request.req(Method::POST, url))
            .await?;
        Ok(Page {
            items: response
                .policies
                .into_iter()
                .map(|policy| policy.policy_name)
                .collect(),
            next_token: response.next_marker,
        })
    }

    async fn list_principal_things(
        &self,
        certificate_arn: &str,
        next_token: Option<&str>,
    ) -> Result<Page<String>, RegistryError> {
        let mut url = self.url(&["principals", "things"])?;
        if let Some(next_token) = next_token {
            url.query_pairs_mut().append_pair("nextToken", next_token);
        }

        let request_builder = self
            .request
            .req(Method::GET, url)
            .header(PRINCIPAL_HEADER, certificate_arn);
        let response: ListPrincipalThingsResponse = self.send_json(request_builder).await?;
        Ok(Page {
            items: response.things,
            next_token: response.next_token,
        })
    }

    async fn attach_policy(
        &self,
        policy_name: &str,
        certificate_arn: &str,
    ) -> Result<(), RegistryError> {
        let url = self.url(&["target-policies", policy_name])?;
        let request_builder = self
            .request
            .req(Method::PUT, url)
            .json(&json!({ "target": certificate_arn }));
        self.send(request_builder).await?;
        Ok(())
    }

    async fn attach_thing_principal(
        &self,
        thing_name: &str,
        certificate_arn: &str,
    ) -> Result<(), RegistryError> {
        let url = self.url(&["things", thing_name, "principals"])?;
        let request_builder = self
            .request
            .req(Method::PUT, url)
            .header(PRINCIPAL_HEADER, certificate_arn);
        self.send(request_builder).await?;
        Ok(())
    }

    async fn update_certificate_status(
        &self,
        certificate_id: &str,
        status: CertificateStatus,
    ) -> Result<(), RegistryError> {
        let mut url = self.url(&["certificates", certificate_id])?;
        url.query_pairs_mut()
            .append_pair("newStatus", &status.to_string());
        self.send(self.request.req(Method::PUT, url)).await?;
        Ok(())
    }
}

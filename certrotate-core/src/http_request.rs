use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response, Url};

/// A thin wrapper on an HTTP client. Sets the timeout and user-agent on every
/// request and applies the retry policy for transient failures.
#[derive(Debug, Clone)]
pub(crate) struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_attempts: u32,
}

impl Request {
    /// `max_attempts` counts the first attempt, so 4 means up to 3 retries.
    pub(crate) fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Creates a request builder with defaults applied.
    pub(crate) fn req(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("certrotate-core/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Sends a request built by `req` with retries for transient failures.
    pub(crate) async fn handle(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, RequestFailure> {
        let Some(template) = request_builder.try_clone() else {
            return execute_request_builder(request_builder).await;
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(usize::try_from(self.max_attempts - 1).unwrap_or(usize::MAX));

        (|| async {
            let request_builder = template.try_clone().ok_or_else(|| {
                RequestFailure::permanent(
                    "<unknown>".to_string(),
                    None,
                    "request cannot be retried because it is not cloneable".to_string(),
                )
            })?;
            execute_request_builder(request_builder).await
        })
        .retry(backoff)
        .when(RequestFailure::is_retryable)
        .notify(|err: &RequestFailure, delay: Duration| {
            log::warn!(
                "retrying {} in {delay:?} after transient failure: {}",
                err.url,
                err.error
            );
        })
        .await
    }

    /// Sends a request exactly once, without retries.
    pub(crate) async fn send_once(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, RequestFailure> {
        execute_request_builder(request_builder).await
    }
}

/// A failed HTTP exchange, classified for the retry policy.
#[derive(Debug)]
pub(crate) struct RequestFailure {
    pub(crate) url: String,
    pub(crate) status: Option<u16>,
    pub(crate) error: String,
    retryable: bool,
}

impl RequestFailure {
    const fn retryable(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: true,
        }
    }

    const fn permanent(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: false,
        }
    }

    const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

async fn execute_request_builder(
    request_builder: RequestBuilder,
) -> Result<Response, RequestFailure> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| {
        RequestFailure::permanent(
            err.url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            None,
            format!("request build failed: {err}"),
        )
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(RequestFailure::retryable(
                    url,
                    Some(status),
                    format!("request error with bad status code {status}"),
                ));
            }
            Ok(resp)
        }
        Err(err) => {
            if err.is_timeout() || err.is_connect() {
                return Err(RequestFailure::retryable(
                    url,
                    None,
                    format!("request timeout/connect error: {err}"),
                ));
            }

            Err(RequestFailure::permanent(
                url,
                None,
                format!("request failed: {err}"),
            ))
        }
    }
}

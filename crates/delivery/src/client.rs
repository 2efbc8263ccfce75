//! Alertmanager v2 HTTP client

use crate::classify::{classify_transport, FailureKind};
use crate::context::CallContext;
use crate::error::{DeliveryError, MAX_ERROR_BODY_BYTES};
use crate::retry::RetryPolicy;
use alerting::Alert;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, warn};

/// Per-attempt request timeout when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Alert ingestion endpoint, relative to the base URL
pub const ALERTS_PATH: &str = "/api/v2/alerts";

/// Readiness endpoint, relative to the base URL
pub const READY_PATH: &str = "/-/ready";

/// Upstream credentials. Bearer takes precedence over basic auth.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UpstreamAuth {
    pub basic_username: String,
    pub basic_password: String,
    pub bearer_token: String,
}

impl UpstreamAuth {
    pub fn new(basic_username: &str, basic_password: &str, bearer_token: &str) -> Self {
        Self {
            basic_username: basic_username.trim().to_string(),
            basic_password: basic_password.trim().to_string(),
            bearer_token: bearer_token.trim().to_string(),
        }
    }

    pub fn bearer(token: &str) -> Self {
        Self::new("", "", token)
    }

    pub fn basic(username: &str, password: &str) -> Self {
        Self::new(username, password, "")
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        if !self.bearer_token.is_empty() {
            request.bearer_auth(&self.bearer_token)
        } else if !self.basic_username.is_empty() || !self.basic_password.is_empty() {
            request.basic_auth(&self.basic_username, Some(&self.basic_password))
        } else {
            request
        }
    }
}

impl std::fmt::Debug for UpstreamAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamAuth")
            .field("basic_username", &self.basic_username)
            .field("basic_password", &(!self.basic_password.is_empty()).then_some("<redacted>"))
            .field("bearer_token", &(!self.bearer_token.is_empty()).then_some("<redacted>"))
            .finish()
    }
}

/// Client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Per-attempt timeout; zero selects [`DEFAULT_TIMEOUT`]
    pub timeout: Duration,
    pub insecure_skip_verify: bool,
    pub auth: UpstreamAuth,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            insecure_skip_verify: false,
            auth: UpstreamAuth::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auth(mut self, auth: UpstreamAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }
}

/// Posts alert batches to Alertmanager and probes its readiness
#[derive(Debug, Clone)]
pub struct AlertClient {
    http: reqwest::Client,
    base_url: String,
    alerts_url: Url,
    ready_url: Url,
    auth: UpstreamAuth,
    retry: RetryPolicy,
}

impl AlertClient {
    pub fn new(config: ClientConfig) -> Result<Self, DeliveryError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(DeliveryError::InvalidConfiguration(
                "alertmanager url is required".to_string(),
            ));
        }

        let parsed = Url::parse(&base_url)
            .map_err(|err| DeliveryError::InvalidConfiguration(format!("parse url: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DeliveryError::InvalidConfiguration(format!(
                "url scheme must be http or https, got {:?}",
                parsed.scheme()
            )));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(DeliveryError::InvalidConfiguration(
                "url must include a host".to_string(),
            ));
        }

        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(DeliveryError::InvalidConfiguration(
                "url must not include a query or fragment".to_string(),
            ));
        }

        // Endpoints sit under the base path, so a route prefix is kept.
        let prefix = parsed.path().trim_end_matches('/').to_string();
        let endpoint = |path: &str| {
            let mut url = parsed.clone();
            url.set_path(&format!("{prefix}{path}"));
            url
        };
        let alerts_url = endpoint(ALERTS_PATH);
        let ready_url = endpoint(READY_PATH);

        let timeout = if config.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            config.timeout
        };

        if config.insecure_skip_verify {
            warn!("TLS certificate verification disabled for {}", base_url);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|err| DeliveryError::InvalidConfiguration(format!("build http client: {err}")))?;

        Ok(Self {
            http,
            base_url,
            alerts_url,
            ready_url,
            auth: config.auth,
            retry: config.retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn alerts_url(&self) -> &Url {
        &self.alerts_url
    }

    /// Post a batch of alerts, retrying transient failures.
    ///
    /// Returns the last error once the attempt budget is spent or a permanent
    /// failure is seen. Stops at once when `ctx` is cancelled or expires,
    /// including while waiting between attempts.
    pub async fn post_alerts(&self, alerts: &[Alert], ctx: &CallContext) -> Result<(), DeliveryError> {
        if let Some(reason) = ctx.check() {
            return Err(DeliveryError::Cancelled(reason));
        }

        let body = serde_json::to_vec(alerts)?;
        let attempts = self.retry.attempts();
        let mut attempt = 1;

        loop {
            let result = tokio::select! {
                reason = ctx.done() => Err(DeliveryError::Cancelled(reason)),
                result = self.send_alerts(&body) => result,
            };

            let err = match result {
                Ok(()) => {
                    debug!("Delivered {} alert(s) on attempt {}", alerts.len(), attempt);
                    return Ok(());
                }
                Err(err) => err,
            };

            if err.is_cancelled() {
                return Err(err);
            }
            if let Some(reason) = ctx.check() {
                return Err(DeliveryError::Cancelled(reason));
            }

            let kind = err.kind();
            if !kind.is_retryable() {
                debug!("Attempt {} failed permanently ({}): {}", attempt, kind, err);
                return Err(err);
            }
            if attempt >= attempts {
                warn!("Giving up after {} attempt(s) ({}): {}", attempt, kind, err);
                return Err(err);
            }

            let backoff = self.retry.backoff_for(attempt);
            warn!(
                "Attempt {}/{} failed ({}), retrying in {:?}: {}",
                attempt, attempts, kind, backoff, err
            );
            ctx.sleep(backoff).await.map_err(DeliveryError::Cancelled)?;
            attempt += 1;
        }
    }

    /// Probe the readiness endpoint once. Only `200 OK` counts as ready.
    pub async fn ready(&self, ctx: &CallContext) -> Result<(), DeliveryError> {
        if let Some(reason) = ctx.check() {
            return Err(DeliveryError::Cancelled(reason));
        }

        let request = self.auth.apply(self.http.get(self.ready_url.clone()));
        let response = tokio::select! {
            reason = ctx.done() => return Err(DeliveryError::Cancelled(reason)),
            response = request.send() => response.map_err(transport_error)?,
        };

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(DeliveryError::NotReady {
                status: status.as_u16(),
            }),
        }
    }

    async fn send_alerts(&self, body: &[u8]) -> Result<(), DeliveryError> {
        let request = self
            .http
            .post(self.alerts_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec());

        let response = self.auth.apply(request).send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        Err(DeliveryError::Status {
            status: status.as_u16(),
            body: error_body(response).await,
        })
    }
}

fn transport_error(source: reqwest::Error) -> DeliveryError {
    let kind = classify_transport(&source);
    if kind == FailureKind::Unknown {
        debug!("Unclassified transport error: {:?}", source);
    }
    DeliveryError::Transport { kind, source }
}

/// Read at most [`MAX_ERROR_BODY_BYTES`] of an error response.
///
/// A blank or unreadable body becomes the canonical status line. The status
/// already received is what callers act on, so read failures are not surfaced.
async fn error_body(mut response: Response) -> String {
    let status = response.status();
    let mut excerpt: Vec<u8> = Vec::new();

    while excerpt.len() < MAX_ERROR_BODY_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = MAX_ERROR_BODY_BYTES - excerpt.len();
                excerpt.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            Ok(None) => break,
            Err(err) => {
                debug!("Failed to read error body for status {}: {}", status, err);
                break;
            }
        }
    }

    let text = String::from_utf8_lossy(&excerpt);
    match text.trim() {
        "" => status_line(status),
        trimmed => trimmed.to_string(),
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

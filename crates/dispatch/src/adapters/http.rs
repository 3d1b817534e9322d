//! JSON push over HTTP with exponential backoff

use async_trait::async_trait;
use marshal_config::HttpConfig;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::{parse_options, to_options, Delivery, DispatchAdapter, HTTP};
use crate::{DispatchError, Options, Result, RetryPolicy, Signal};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
    Patch,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
        }
    }
}

/// Http options. `timeout` and `retry` fall back to the adapter's configured
/// defaults and are always present after validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpOptions {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone)]
pub struct HttpAdapter {
    client: Client,
    defaults: HttpConfig,
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new(HttpConfig::default())
    }
}

impl HttpAdapter {
    pub fn new(defaults: HttpConfig) -> Self {
        Self {
            client: Client::new(),
            defaults,
        }
    }

    /// Check the url and fill in configured defaults
    pub(crate) fn resolve(&self, adapter: &str, mut opts: HttpOptions) -> Result<HttpOptions> {
        let url = Url::parse(&opts.url)
            .map_err(|e| DispatchError::invalid(adapter, format!("url: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DispatchError::invalid(
                adapter,
                format!("url: unsupported scheme {}", url.scheme()),
            ));
        }

        let timeout = opts.timeout.unwrap_or(self.defaults.timeout_ms);
        if timeout == 0 {
            return Err(DispatchError::invalid(adapter, "timeout: must be positive"));
        }
        opts.timeout = Some(timeout);

        let retry = opts
            .retry
            .unwrap_or_else(|| RetryPolicy::from(&self.defaults.retry));
        if retry.max_attempts == 0 {
            return Err(DispatchError::invalid(
                adapter,
                "retry.max_attempts: must be at least 1",
            ));
        }
        opts.retry = Some(retry);

        for (name, value) in &opts.headers {
            check_header(adapter, name, Some(value))?;
        }

        Ok(opts)
    }

    /// One request. 2xx is success; any other status is an error.
    async fn send_once(
        &self,
        opts: &HttpOptions,
        body: &str,
        extra_headers: &[(String, String)],
    ) -> Result<()> {
        let timeout = Duration::from_millis(opts.timeout.unwrap_or(self.defaults.timeout_ms));

        let mut request = self
            .client
            .request(opts.method.into(), &opts.url)
            .timeout(timeout)
            .header("Content-Type", "application/json");
        for (name, value) in &opts.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        for (name, value) in extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.body(body.to_string()).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DispatchError::HttpStatus {
            status: status.as_u16(),
            body,
        })
    }

    /// Send `body`, retrying with backoff until an attempt succeeds or the
    /// policy runs out. The last error is returned.
    pub(crate) async fn send_with_retry(
        &self,
        opts: &HttpOptions,
        body: String,
        extra_headers: &[(String, String)],
    ) -> Result<Delivery> {
        let policy = opts
            .retry
            .unwrap_or_else(|| RetryPolicy::from(&self.defaults.retry));
        let attempts = policy.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            trace!("◆ HTTP {} ATTEMPT {}/{}", opts.url, attempt, attempts);
            match self.send_once(opts, &body, extra_headers).await {
                Ok(()) => {
                    debug!("◆ HTTP {} DELIVERED ON ATTEMPT {}", opts.url, attempt);
                    return Ok(Delivery::Delivered);
                }
                Err(err) if attempt >= attempts => {
                    warn!("◆ HTTP {} GAVE UP AFTER {} ATTEMPTS: {}", opts.url, attempt, err);
                    return Err(err);
                }
                Err(err) => {
                    let delay = policy.delay_for(attempt);
                    debug!(
                        "◆ HTTP {} ATTEMPT {} FAILED ({}), RETRYING IN {:?}",
                        opts.url, attempt, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Reject a header name (and value) reqwest would refuse at send time
pub(crate) fn check_header(adapter: &str, name: &str, value: Option<&str>) -> Result<()> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| DispatchError::invalid(adapter, format!("header name {:?} is invalid", name)))?;
    if let Some(value) = value {
        HeaderValue::from_str(value).map_err(|_| {
            DispatchError::invalid(adapter, format!("header {} has an invalid value", name))
        })?;
    }
    Ok(())
}

#[async_trait]
impl DispatchAdapter for HttpAdapter {
    fn adapter_type(&self) -> &str {
        HTTP
    }

    fn validate_opts(&self, options: &Options) -> Result<Options> {
        let typed: HttpOptions = parse_options(HTTP, options)?;
        let resolved = self.resolve(HTTP, typed)?;
        to_options(HTTP, &resolved)
    }

    async fn deliver(&self, signal: &Signal, options: &Options) -> Result<Delivery> {
        let opts: HttpOptions = parse_options(HTTP, options)?;
        let body = signal.to_json()?;
        self.send_with_retry(&opts, body, &[]).await
    }
}

//! Rate-limit aware HTTP client for the Discord REST API
//!
//! Every request is keyed by its endpoint path. A 429 response records a
//! window for that endpoint; later requests to the same endpoint wait for
//! the window to pass instead of failing, and the rejected request itself
//! is retried after the server-supplied delay. Transport errors are never
//! retried.

use crate::models::DiscordErrorBody;
use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota};
use guildbridge_common::{GuildBridgeError, Result};
use reqwest::{header::HeaderMap, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

/// Delay assumed when a 429 carries no usable `retry-after` header.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Configuration for the rate-limited HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL the endpoint paths are appended to
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Extra delay added to every rate-limit wait
    pub rate_limit_buffer: Duration,
    /// Proactive global quota in requests per second; 0 disables it
    pub global_requests_per_second: u32,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://discord.com/api/v10".to_string(),
            timeout: Duration::from_secs(15),
            rate_limit_buffer: Duration::from_millis(100),
            global_requests_per_second: 50,
        }
    }
}

impl HttpClientConfig {
    /// Create a configuration for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the buffer added to rate-limit waits
    pub fn with_rate_limit_buffer(mut self, buffer: Duration) -> Self {
        self.rate_limit_buffer = buffer;
        self
    }

    /// Set the global request quota (0 disables it)
    pub fn with_global_rate(mut self, requests_per_second: u32) -> Self {
        self.global_requests_per_second = requests_per_second;
        self
    }
}

/// Options for a single request
#[derive(Debug, Clone)]
pub struct RequestOptions {
    method: Method,
    token: Option<String>,
    body: Option<serde_json::Value>,
    query: Vec<(String, String)>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

impl RequestOptions {
    /// A GET request
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            token: None,
            body: None,
            query: Vec::new(),
        }
    }

    /// A POST request with a JSON body
    pub fn post(body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get()
        }
    }

    /// A DELETE request
    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            ..Self::get()
        }
    }

    /// Authenticate with a bot token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Append a query parameter
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// HTTP method of this request
    pub fn method(&self) -> &Method {
        &self.method
    }
}

/// HTTP client that defers requests while an endpoint is rate limited
#[derive(Debug, Clone)]
pub struct RateLimitedHttpClient {
    client: Client,
    config: Arc<HttpClientConfig>,
    base_url: Arc<Url>,
    windows: Arc<DashMap<String, Instant>>,
    global_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl RateLimitedHttpClient {
    /// Create a new client with the given configuration.
    ///
    /// Fails if `base_url` is not an absolute http(s) URL.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(
                "DiscordBot (https://github.com/guildbridge/guildbridge, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .map_err(|e| GuildBridgeError::network_with_source("Failed to create HTTP client", e))?;

        let global_limiter = NonZeroU32::new(config.global_requests_per_second)
            .map(|rate| Arc::new(DefaultDirectRateLimiter::direct(Quota::per_second(rate))));

        Ok(Self {
            client,
            config: Arc::new(config),
            base_url: Arc::new(base_url),
            windows: Arc::new(DashMap::new()),
            global_limiter,
        })
    }

    /// Client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Remaining rate-limit window for an endpoint, if one is active
    pub fn window_remaining(&self, endpoint: &str) -> Option<Duration> {
        let until = *self.windows.get(endpoint)?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    /// Record a rate-limit window for `endpoint` lasting `duration` from now
    pub fn record_window(&self, endpoint: &str, duration: Duration) -> Instant {
        let until = Instant::now() + duration;
        self.windows.insert(endpoint.to_string(), until);
        until
    }

    /// Wait until `endpoint` has no active window; expired windows are removed
    async fn wait_for_window(&self, endpoint: &str) {
        let until = match self.windows.get(endpoint) {
            Some(entry) => *entry,
            None => return,
        };

        if until > Instant::now() {
            warn!(
                endpoint,
                wait_ms = (until - Instant::now()).as_millis() as u64,
                "Endpoint is rate limited, deferring request"
            );
            tokio::time::sleep_until(until + self.config.rate_limit_buffer).await;
        }

        self.windows
            .remove_if(endpoint, |_, expiry| *expiry <= Instant::now());
    }

    fn build_url(&self, endpoint: &str) -> Result<Url> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| {
                GuildBridgeError::validation_field(format!("Invalid endpoint '{}': {}", endpoint, e), "endpoint")
            })
    }

    /// Send a request, waiting out rate limits.
    ///
    /// A 429 is retried once per response received, with no upper bound on
    /// the number of attempts. Any other status is returned to the caller
    /// as-is; transport errors propagate.
    #[instrument(skip(self, options), fields(method = %options.method))]
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        let url = self.build_url(endpoint)?;

        loop {
            self.wait_for_window(endpoint).await;
            if let Some(limiter) = &self.global_limiter {
                limiter.until_ready().await;
            }

            let mut request = self.client.request(options.method.clone(), url.clone());
            if let Some(token) = &options.token {
                request = request.header(reqwest::header::AUTHORIZATION, format!("Bot {}", token));
            }
            if !options.query.is_empty() {
                request = request.query(&options.query);
            }
            if let Some(body) = &options.body {
                request = request.json(body);
            }

            debug!(%url, "Sending request");
            let response = request.send().await?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                debug!(status = response.status().as_u16(), "Request completed");
                return Ok(response);
            }

            let retry_after = parse_retry_after(response.headers());
            self.record_window(endpoint, retry_after);
            warn!(
                endpoint,
                retry_after_ms = retry_after.as_millis() as u64,
                "Received 429, retrying after server-supplied delay"
            );
            tokio::time::sleep(retry_after + self.config.rate_limit_buffer).await;
        }
    }

    /// Send a request and decode a JSON body from a 2xx response
    pub async fn request_json<T>(&self, endpoint: &str, options: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.request(endpoint, options).await?;
        let response = ensure_success(response).await?;
        let text = response
            .text()
            .await
            .map_err(|e| GuildBridgeError::network_with_source("Failed to read response body", e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Send a request whose success response carries no body of interest
    pub async fn request_empty(&self, endpoint: &str, options: RequestOptions) -> Result<()> {
        let response = self.request(endpoint, options).await?;
        ensure_success(response).await.map(|_| ())
    }
}

/// Parse the API base URL. The returned path always ends in `/`.
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).map_err(|e| {
        GuildBridgeError::config_with_source(format!("Invalid API base URL '{}'", raw), e)
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(GuildBridgeError::config(format!(
            "Unsupported API base URL scheme '{}'",
            url.scheme()
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Parse `retry-after` as fractional seconds, falling back to one second
pub fn parse_retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Turn a non-2xx response into a Discord error carrying its status and message
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<DiscordErrorBody>(&body) {
        Ok(DiscordErrorBody {
            message,
            code: Some(code),
        }) => format!("{} (code {})", message, code),
        Ok(DiscordErrorBody { message, .. }) => message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Unexpected response")
            .to_string(),
    };

    Err(GuildBridgeError::discord_with_status(
        format!("HTTP {}: {}", status.as_u16(), message),
        status.as_u16(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, RETRY_AFTER};

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(&headers_with("2")), Duration::from_secs(2));
        assert_eq!(
            parse_retry_after(&headers_with("0.25")),
            Duration::from_millis(250)
        );
        assert_eq!(parse_retry_after(&headers_with("soon")), DEFAULT_RETRY_AFTER);
        assert_eq!(parse_retry_after(&headers_with("-3")), DEFAULT_RETRY_AFTER);
        assert_eq!(parse_retry_after(&HeaderMap::new()), DEFAULT_RETRY_AFTER);
    }

    #[test]
    fn test_build_url_joins_slashes() {
        let client =
            RateLimitedHttpClient::new(HttpClientConfig::new("http://localhost/api/v10/")).unwrap();
        assert_eq!(
            client.build_url("/users/@me").unwrap().as_str(),
            "http://localhost/api/v10/users/@me"
        );
        assert_eq!(
            client.build_url("guilds/1").unwrap().as_str(),
            "http://localhost/api/v10/guilds/1"
        );

        let client =
            RateLimitedHttpClient::new(HttpClientConfig::new("https://discord.com/api/v10")).unwrap();
        assert_eq!(
            client.build_url("/channels/7/messages").unwrap().as_str(),
            "https://discord.com/api/v10/channels/7/messages"
        );
    }

    #[test]
    fn test_malformed_base_url_is_rejected() {
        assert!(RateLimitedHttpClient::new(HttpClientConfig::new("not a url")).is_err());
        assert!(RateLimitedHttpClient::new(HttpClientConfig::new("ftp://discord.com/api")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_window_defers_until_expiry() {
        let client = RateLimitedHttpClient::new(
            HttpClientConfig::new("http://localhost").with_rate_limit_buffer(Duration::from_millis(100)),
        )
        .unwrap();

        client.record_window("/guilds/1/roles", Duration::from_secs(2));
        assert!(client.window_remaining("/guilds/1/roles").is_some());
        assert!(client.window_remaining("/guilds/2/roles").is_none());

        let start = Instant::now();
        client.wait_for_window("/guilds/1/roles").await;
        assert!(start.elapsed() >= Duration::from_millis(2100));
        assert!(client.window_remaining("/guilds/1/roles").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_windows() {
        let client = RateLimitedHttpClient::new(HttpClientConfig::new("http://localhost")).unwrap();
        let clone = client.clone();

        client.record_window("/users/@me", Duration::from_secs(1));
        assert!(clone.window_remaining("/users/@me").is_some());

        let other = RateLimitedHttpClient::new(HttpClientConfig::new("http://localhost")).unwrap();
        assert!(other.window_remaining("/users/@me").is_none());
    }
}

// src/http.rs

//! Authenticated requests against one provider's REST API, with retry.
//!
//! Every provider adapter owns one [`ApiClient`]. The client resolves paths
//! against the provider base URL, sends them through a [`Transport`], decodes
//! JSON bodies and applies the retry policy:
//!
//! - 5xx and 429 are retried with `2^attempt` second pauses, or exactly the
//!   `Retry-After` value when the policy honors it
//! - 404 means "no data" and is returned straight away
//! - any other 4xx, or a body that is not JSON, is logged and given up on

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A fully resolved request as handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// Status, headers and undecoded body of one HTTP exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// The network seam. Implementations must be shareable between scan workers.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &ApiRequest) -> Result<RawResponse>;

    /// Block before the next retry attempt
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: &ApiRequest) -> Result<RawResponse> {
        (**self).execute(request)
    }

    fn pause(&self, duration: Duration) {
        (**self).pause(duration)
    }
}

/// Blocking reqwest client with the provider's auth headers baked in
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(headers: HeaderMap) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("repo-contributors/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: &ApiRequest) -> Result<RawResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .query(&request.query);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .map_err(|e| Error::Transport(e.to_string()))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub respect_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 9,
            respect_retry_after: true,
        }
    }
}

impl RetryPolicy {
    /// Pause before retrying after the zero-based `attempt` failed
    pub fn delay(&self, attempt: u32, headers: Option<&HeaderMap>) -> Duration {
        if self.respect_retry_after {
            if let Some(delay) = headers.and_then(|h| retry_after(h, Utc::now())) {
                return delay;
            }
        }
        Duration::from_secs(2u64.saturating_pow(attempt))
    }
}

/// Parse `Retry-After` as delta-seconds or as an HTTP-date relative to `now`
pub fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Result of [`ApiClient::request`]
#[derive(Debug, Clone)]
pub enum Reply {
    Ok { body: Value, headers: HeaderMap },
    NotFound { headers: HeaderMap },
    /// Unrecoverable status, undecodable body, or retries exhausted (no status then)
    Failed {
        status: Option<StatusCode>,
        headers: Option<HeaderMap>,
    },
}

impl Reply {
    /// `(decoded body, response headers)`, either of which may be absent
    pub fn into_parts(self) -> (Option<Value>, Option<HeaderMap>) {
        match self {
            Reply::Ok { body, headers } => (Some(body), Some(headers)),
            Reply::NotFound { headers } => (None, Some(headers)),
            Reply::Failed { headers, .. } => (None, headers),
        }
    }
}

pub struct ApiClient {
    base_url: String,
    transport: Box<dyn Transport>,
    policy: RetryPolicy,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, headers: HeaderMap, policy: RetryPolicy) -> Result<Self> {
        Ok(Self::with_transport(
            base_url,
            ReqwestTransport::new(headers)?,
            policy,
        ))
    }

    pub fn with_transport(
        base_url: impl Into<String>,
        transport: impl Transport + 'static,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport: Box::new(transport),
            policy,
        }
    }

    fn resolve(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else {
            format!("{}{}", self.base_url, path_or_url)
        }
    }

    pub fn get(&self, path_or_url: &str, params: &[(&str, String)]) -> Reply {
        self.request(Method::GET, path_or_url, params, None)
    }

    pub fn request(
        &self,
        method: Method,
        path_or_url: &str,
        params: &[(&str, String)],
        json_body: Option<&Value>,
    ) -> Reply {
        let request = ApiRequest {
            method,
            url: self.resolve(path_or_url),
            query: params
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
            body: json_body.cloned(),
        };

        for attempt in 0..self.policy.max_attempts {
            debug!(method = %request.method, url = %request.url, attempt, "sending request");
            let last_attempt = attempt + 1 == self.policy.max_attempts;

            let response = match self.transport.execute(&request) {
                Ok(response) => response,
                Err(e) => {
                    warn!(url = %request.url, error = %e, "error making request");
                    if last_attempt {
                        break;
                    }
                    self.backoff(attempt, None);
                    continue;
                }
            };

            let status = response.status;
            if status.is_success() {
                return decode(&request, response);
            }
            if status == StatusCode::NOT_FOUND {
                debug!(url = %request.url, "resource not found");
                return Reply::NotFound {
                    headers: response.headers,
                };
            }
            if !is_transient(status) {
                error!(url = %request.url, %status, "unrecoverable error making request");
                return Reply::Failed {
                    status: Some(status),
                    headers: Some(response.headers),
                };
            }

            warn!(url = %request.url, %status, attempt, "transient error making request");
            if last_attempt {
                break;
            }
            self.backoff(attempt, Some(&response.headers));
        }

        error!(url = %request.url, attempts = self.policy.max_attempts, "giving up after repeated failures");
        Reply::Failed {
            status: None,
            headers: None,
        }
    }

    fn backoff(&self, attempt: u32, headers: Option<&HeaderMap>) {
        let delay = self.policy.delay(attempt, headers);
        info!("Sleeping for {} seconds.", delay.as_secs_f64());
        self.transport.pause(delay);
    }
}

fn decode(request: &ApiRequest, response: RawResponse) -> Reply {
    if response.body.trim().is_empty() {
        return Reply::Ok {
            body: Value::Null,
            headers: response.headers,
        };
    }
    match serde_json::from_str(&response.body) {
        Ok(body) => Reply::Ok {
            body,
            headers: response.headers,
        },
        Err(e) => {
            error!(url = %request.url, error = %e, "response body is not valid JSON");
            Reply::Failed {
                status: Some(response.status),
                headers: Some(response.headers),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{MockResponse, MockTransport};
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn client(transport: Arc<MockTransport>) -> ApiClient {
        ApiClient::with_transport("https://api.example.com/", transport, RetryPolicy::default())
    }

    #[test]
    fn honors_retry_after_exactly() {
        let transport = MockTransport::new()
            .get("/things", MockResponse::status(429).header("Retry-After", "3"))
            .get("/things", MockResponse::json(200, json!([1, 2])));

        let reply = client(transport.clone()).get("/things", &[]);

        assert_eq!(reply.into_parts().0, Some(json!([1, 2])));
        assert_eq!(transport.pauses(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn server_errors_back_off_exponentially() {
        let transport = MockTransport::new()
            .get("/things", MockResponse::status(500))
            .get("/things", MockResponse::status(502))
            .get("/things", MockResponse::status(503))
            .get("/things", MockResponse::json(200, json!({"ok": true})));

        let reply = client(transport.clone()).get("/things", &[]);

        assert!(matches!(reply, Reply::Ok { .. }));
        assert_eq!(
            transport.pauses(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn ignores_retry_after_when_policy_says_so() {
        let transport = MockTransport::new()
            .get("/things", MockResponse::status(429).header("Retry-After", "30"))
            .get("/things", MockResponse::json(200, json!([])));
        let policy = RetryPolicy {
            respect_retry_after: false,
            ..RetryPolicy::default()
        };

        ApiClient::with_transport("https://api.example.com", transport.clone(), policy)
            .get("/things", &[]);

        assert_eq!(transport.pauses(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn not_found_is_returned_without_retrying() {
        let transport = MockTransport::new();

        let reply = client(transport.clone()).get("/missing", &[]);

        assert!(matches!(reply, Reply::NotFound { .. }));
        let (body, headers) = reply.into_parts();
        assert!(body.is_none());
        assert!(headers.is_some());
        assert_eq!(transport.requests().len(), 1);
        assert!(transport.pauses().is_empty());
    }

    #[test]
    fn other_client_errors_are_not_retried() {
        let transport = MockTransport::new().get("/secret", MockResponse::status(401));

        let reply = client(transport.clone()).get("/secret", &[]);

        match reply {
            Reply::Failed { status, headers } => {
                assert_eq!(status, Some(StatusCode::UNAUTHORIZED));
                assert!(headers.is_some());
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn gives_up_after_nine_attempts() {
        let transport = MockTransport::new();
        for _ in 0..12 {
            transport.get("/flaky", MockResponse::status(503));
        }

        let reply = client(transport.clone()).get("/flaky", &[]);

        assert_eq!(reply.into_parts(), (None, None));
        assert_eq!(transport.requests().len(), 9);
        assert_eq!(transport.pauses().len(), 8);
        assert_eq!(transport.pauses()[7], Duration::from_secs(128));
    }

    #[test]
    fn transport_failures_are_retried() {
        let transport = MockTransport::new()
            .fail_next("connection reset by peer")
            .get("/things", MockResponse::json(200, json!([])));

        let reply = client(transport.clone()).get("/things", &[]);

        assert!(matches!(reply, Reply::Ok { .. }));
        assert_eq!(transport.pauses(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn malformed_json_is_unrecoverable() {
        let transport = MockTransport::new().get("/things", MockResponse::text(200, "<html>"));

        let reply = client(transport.clone()).get("/things", &[]);

        assert!(matches!(reply, Reply::Failed { status: Some(s), .. } if s == StatusCode::OK));
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn resolves_paths_and_passes_absolute_urls_through() {
        let transport = MockTransport::new();
        let api = client(transport.clone());

        api.get("/orgs/acme/repos", &[("per_page", "100".to_string())]);
        api.get("https://other.example.com/page/2", &[]);

        assert_eq!(
            transport.targets(),
            vec![
                "https://api.example.com/orgs/acme/repos?per_page=100".to_string(),
                "https://other.example.com/page/2".to_string(),
            ]
        );
    }

    #[test]
    fn sends_json_bodies() {
        let transport = MockTransport::new().on(
            Method::POST,
            "/batch",
            MockResponse::json(200, json!({"value": []})),
        );

        let body = json!({"fromDate": "2024-01-01T00:00:00Z"});
        client(transport.clone()).request(Method::POST, "/batch", &[], Some(&body));

        assert_eq!(transport.requests()[0].body, Some(body));
    }

    #[test]
    fn parses_retry_after_dates() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "Fri, 01 Mar 2024 12:00:10 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers, now), Some(Duration::from_secs(10)));

        headers.insert(RETRY_AFTER, "Fri, 01 Mar 2024 11:00:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers, now), Some(Duration::ZERO));

        headers.insert(RETRY_AFTER, "soon".parse().unwrap());
        assert_eq!(retry_after(&headers, now), None);
    }
}

use futures::StreamExt;
use reqwest::redirect::Policy;
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

use super::error::BackendError;
use crate::util::validate_project_url;

/// Whole-request timeout (connect through last body byte) for data and auth calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// Whole-request timeout for object uploads, which carry up to 80MB.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Handle to the hosted backend: data store, object storage and auth.
///
/// Cloning is cheap and clones share the session token, so a handle moved
/// into a background task sees sign-in and sign-out made elsewhere.
#[derive(Clone)]
pub struct Backend {
    http: reqwest::Client,
    base_url: Url,
    anon_key: Arc<SecretString>,
    session_token: Arc<RwLock<Option<SecretString>>>,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("base_url", &self.base_url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("has_session", &self.has_session())
            .finish()
    }
}

impl Backend {
    /// Connect to the project at `project_url` using the public anon key.
    ///
    /// # Errors
    ///
    /// - [`BackendError::InvalidUrl`] if the URL does not parse
    /// - [`BackendError::InsecureUrl`] if it is plain HTTP on a non-loopback host
    /// - [`BackendError::Network`] if the HTTP client cannot be built
    pub fn new(project_url: &str, anon_key: SecretString) -> Result<Self, BackendError> {
        Self::with_client(build_http_client()?, project_url, anon_key)
    }

    pub fn with_client(
        http: reqwest::Client,
        project_url: &str,
        anon_key: SecretString,
    ) -> Result<Self, BackendError> {
        let mut base_url = validate_project_url(project_url)?;
        // Keep a trailing slash so joins append instead of replacing the last segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        if base_url.scheme() == "http" {
            tracing::warn!(url = %base_url, "Using non-HTTPS project URL (localhost only)");
        }

        Ok(Self {
            http,
            base_url,
            anon_key: Arc::new(anon_key),
            session_token: Arc::new(RwLock::new(None)),
            request_timeout: REQUEST_TIMEOUT,
            upload_timeout: UPLOAD_TIMEOUT,
        })
    }

    /// Override the request and upload timeouts.
    pub fn with_timeouts(mut self, request: Duration, upload: Duration) -> Self {
        self.request_timeout = request;
        self.upload_timeout = upload;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Use `token` for subsequent requests; `None` falls back to the anon key.
    pub fn set_session_token(&self, token: Option<SecretString>) {
        let mut slot = self
            .session_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = token;
    }

    pub fn has_session(&self) -> bool {
        self.session_token
            .read()
            .map(|t| t.is_some())
            .unwrap_or(false)
    }

    // ========================================================================
    // Request building
    // ========================================================================

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// `<project>/rest/v1/<table>?<params>`.
    pub(crate) fn rest_url(&self, table: &str, params: &[(&str, &str)]) -> Result<Url, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    /// Start a request carrying the project key and the session (or anon) bearer.
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = {
            let token = self
                .session_token
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match token.as_ref() {
                Some(t) => t.expose_secret().to_string(),
                None => self.anon_key.expose_secret().to_string(),
            }
        };

        self.http
            .request(method, url)
            .timeout(self.request_timeout)
            .header("apikey", self.anon_key.expose_secret())
            .header("Authorization", format!("Bearer {bearer}"))
    }

    /// [`Backend::request`] with the longer upload timeout.
    pub(crate) fn upload_request(&self, method: Method, url: Url) -> RequestBuilder {
        self.request(method, url).timeout(self.upload_timeout)
    }

    /// Like [`Backend::request`] but always authenticated as the anonymous
    /// role (auth endpoints must not see a possibly expired session token).
    pub(crate) fn anon_request(&self, method: Method, url: Url) -> RequestBuilder {
        let key = self.anon_key.expose_secret();
        self.http
            .request(method, url)
            .timeout(self.request_timeout)
            .header("apikey", key)
            .header("Authorization", format!("Bearer {key}"))
    }

    /// Send `request` and return the body text of a 2xx response.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = read_limited_text(response, MAX_RESPONSE_SIZE)
                .await
                .unwrap_or_default();
            let message = error_message(&body).unwrap_or_else(|| {
                status.canonical_reason().unwrap_or("request failed").to_string()
            });
            tracing::debug!(status = status.as_u16(), message = %message, "Backend request failed");
            return Err(BackendError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        read_limited_text(response, MAX_RESPONSE_SIZE).await
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let body = self.send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Build the shared HTTP client used by [`Backend::new`].
pub fn build_http_client() -> Result<reqwest::Client, BackendError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("redeguara/", env!("CARGO_PKG_VERSION")))
        .redirect(create_redirect_policy())
        .build()?;
    Ok(client)
}

/// Follow at most 3 redirects and stop on loops.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(to = %url, hop = attempt.previous().len() + 1, "Following redirect");
        attempt.follow()
    })
}

/// The request timeout covers the body read too, so a stalled stream also
/// surfaces as `Timeout`.
fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Network(e)
    }
}

/// Pull a human-readable message out of an error body.
///
/// The data store says `message`, auth says `error_description` or `msg`.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error_description", "msg", "error"]
        .iter()
        .find_map(|key| value.get(key)?.as_str().map(str::to_string))
        .filter(|m| !m.trim().is_empty())
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, BackendError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(BackendError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(transport_error)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(BackendError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(uri: &str) -> Backend {
        Backend::new(uri, SecretString::from("anon-key".to_string())).unwrap()
    }

    #[test]
    fn test_http_project_url_rejected() {
        let err = Backend::new("http://example.supabase.co", SecretString::from("k".to_string())).unwrap_err();
        assert!(matches!(err, BackendError::InsecureUrl));
    }

    #[test]
    fn test_rest_url_keeps_project_path() {
        let b = backend("https://abc.supabase.co/base");
        let url = b.rest_url("posts", &[("id", "eq.1")]).unwrap();
        assert_eq!(url.as_str(), "https://abc.supabase.co/base/rest/v1/posts?id=eq.1");
    }

    #[test]
    fn test_debug_redacts_key() {
        let b = backend("https://abc.supabase.co");
        let debug = format!("{b:?}");
        assert!(!debug.contains("anon-key"));
        assert!(debug.contains("REDACTED"));
    }

    #[tokio::test]
    async fn test_requests_carry_anon_key_then_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/posts"))
            .and(header("apikey", "anon-key"))
            .and(header("Authorization", "Bearer anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/posts"))
            .and(header("Authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let b = backend(&server.uri());
        let url = b.rest_url("posts", &[]).unwrap();
        b.send(b.request(Method::GET, url.clone())).await.unwrap();

        b.clone().set_session_token(Some(SecretString::from("user-jwt".to_string())));
        assert!(b.has_session());
        b.send(b.request(Method::GET, url)).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_carries_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"code":"22P02","message":"invalid input syntax"}"#),
            )
            .mount(&server)
            .await;

        let b = backend(&server.uri());
        let url = b.rest_url("posts", &[]).unwrap();
        let err = b.send(b.request(Method::GET, url)).await.unwrap_err();
        match err {
            BackendError::HttpStatus { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "invalid input syntax");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_response_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(MAX_RESPONSE_SIZE + 1)))
            .mount(&server)
            .await;

        let b = backend(&server.uri());
        let url = b.rest_url("posts", &[]).unwrap();
        let err = b.send(b.request(Method::GET, url)).await.unwrap_err();
        assert!(matches!(err, BackendError::ResponseTooLarge(_)));
    }

    #[tokio::test]
    async fn test_slow_response_times_out_but_upload_waits() {
        let server = MockServer::start().await;
        let slow = ResponseTemplate::new(200)
            .set_body_string("[]")
            .set_delay(Duration::from_millis(500));
        Mock::given(method("GET"))
            .respond_with(slow.clone())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(slow)
            .mount(&server)
            .await;

        let b = backend(&server.uri())
            .with_timeouts(Duration::from_millis(100), Duration::from_secs(5));
        let url = b.rest_url("posts", &[]).unwrap();
        let err = b.send(b.request(Method::GET, url.clone())).await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout));

        b.send(b.upload_request(Method::POST, url)).await.unwrap();
    }

    #[test]
    fn test_error_message_keys() {
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            Some("Invalid login credentials".to_string())
        );
        assert_eq!(error_message("<html>"), None);
    }
}

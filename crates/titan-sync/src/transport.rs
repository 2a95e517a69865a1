//! # Live Transport
//!
//! The one place a request actually leaves the device.
//!
//! ## Request Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ResilientClient::dispatch(ApiRequest)                                 │
//! │       │  (reachable, or forced replay)                                  │
//! │       ▼                                                                 │
//! │  tokio::time::timeout(request_timeout, ...)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  dyn LiveTransport::send(&ApiRequest)                                  │
//! │       │                                                                 │
//! │       ├── HttpTransport   reqwest, base_url + endpoint                 │
//! │       └── test fakes      scripted responses, recorded calls           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  2xx ──► Ok(json)        4xx/5xx ──► TransportRejected{status,message} │
//! │  no response ──► Network                                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing outside `ResilientClient` holds a transport, so every backend
//! call goes through the cache/queue policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

use crate::error::{ApiError, ApiResult};

// =============================================================================
// Request Model
// =============================================================================

/// HTTP method of a request. Only GET is a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Reads are cached; everything else is a write and may be queued.
    pub fn is_read(&self) -> bool {
        matches!(self, HttpMethod::Get)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A backend request, independent of how it is delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    /// Path relative to the API base, query string included.
    pub endpoint: String,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        ApiRequest {
            endpoint: endpoint.into(),
            method,
            body: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, endpoint).with_body(body)
    }

    pub fn put(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, endpoint).with_body(body)
    }

    pub fn patch(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Patch, endpoint).with_body(body)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, endpoint)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_read(&self) -> bool {
        self.method.is_read()
    }
}

// =============================================================================
// Transport Trait
// =============================================================================

/// Delivers a request and returns the decoded JSON body.
///
/// Implementations do not apply a timeout; the client does.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> ApiResult<Value>;
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Creates a transport for the given API base URL.
    pub fn new(base_url: &str) -> ApiResult<Self> {
        let mut base_url = Url::parse(base_url)?;

        // Url::join replaces the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(HttpTransport {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    /// Resolves an endpoint against the base URL.
    pub fn url_for(&self, endpoint: &str) -> ApiResult<Url> {
        Ok(self.base_url.join(endpoint.trim_start_matches('/'))?)
    }
}

#[async_trait]
impl LiveTransport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> ApiResult<Value> {
        let url = self.url_for(&request.endpoint)?;
        debug!(method = %request.method, url = %url, "Sending live request");

        let mut builder = self.client.request(request.method.into(), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(ApiError::TransportRejected {
                status: status.as_u16(),
                message: rejection_message(&bytes, status),
            });
        }

        if bytes.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Prefers the server's `{"message": ..}` field, then the raw body, then the
/// status reason.
fn rejection_message(body: &[u8], status: reqwest::StatusCode) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
        if let Some(Value::String(message)) = map.get("message") {
            return message.clone();
        }
    }

    let text = String::from_utf8_lossy(body).trim().to_string();
    if !text.is_empty() {
        return text;
    }

    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_get_is_read() {
        assert!(ApiRequest::get("/things").is_read());
        assert!(!ApiRequest::post("/things", json!({})).is_read());
        assert!(!ApiRequest::delete("/things/1").is_read());
    }

    #[test]
    fn test_url_resolution_keeps_base_path() {
        let transport = HttpTransport::new("https://api.example.com/v1").unwrap();

        assert_eq!(
            transport.url_for("/things?page=2").unwrap().as_str(),
            "https://api.example.com/v1/things?page=2"
        );
        assert_eq!(
            transport.url_for("things").unwrap().as_str(),
            "https://api.example.com/v1/things"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpTransport::new("nope"),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_request_wire_format() {
        let request = ApiRequest::post("/things", json!({"name": "X"})).with_header("x-store", "7");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["method"], "POST");
        assert_eq!(value["body"]["name"], "X");
        assert_eq!(value["headers"]["x-store"], "7");

        let get = serde_json::to_value(ApiRequest::get("/things")).unwrap();
        assert!(get.get("body").is_none());
    }

    #[test]
    fn test_rejection_message_preference() {
        let status = reqwest::StatusCode::BAD_REQUEST;
        assert_eq!(rejection_message(br#"{"message":"SKU taken"}"#, status), "SKU taken");
        assert_eq!(rejection_message(b"plain failure", status), "plain failure");
        assert_eq!(rejection_message(b"", status), "Bad Request");
    }
}

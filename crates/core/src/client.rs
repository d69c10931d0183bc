//! Image host HTTP client

use crate::error::{Error, Result};
use crate::file::UploadFile;
use crate::format::Links;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where and as whom a task uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub domain: String,
    pub token: String,
    pub strategy_id: Option<String>,
}

impl UploadTarget {
    pub fn upload_url(&self) -> String {
        format!("{}/api/v1/upload", self.domain.trim_end_matches('/'))
    }
}

/// A successful upload as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub origin_name: String,
    pub links: Links,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_url: Option<String>,
}

/// Remaining request quota from `X-RateLimit-*` headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
}

/// One successful attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub result: UploadResult,
    pub rate_limit: Option<RateLimit>,
}

/// Network operations the upload engine depends on
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Perform one upload attempt
    async fn upload(&self, target: &UploadTarget, file: &UploadFile) -> Result<UploadOutcome>;

    /// Delete an uploaded image through its server-issued reference
    async fn delete(&self, delete_url: &str, token: Option<&str>) -> Result<()>;
}

/// Result of probing the host with the configured token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Profile endpoint accepted the token
    Verified,
    /// Host answered 401 on the profile endpoint
    Unauthorized,
    /// Host answered 403 on the profile endpoint
    Forbidden,
    /// Upload endpoint exists but the token could not be checked
    ReachableUnverified,
    /// Host answered 429
    RateLimited,
    /// Host answered with a 5xx status
    ServerError(u16),
    /// Anything else
    Failed(String),
}

impl ConnectionStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ConnectionStatus::Verified | ConnectionStatus::ReachableUnverified)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Verified => write!(f, "connection OK, token is valid"),
            ConnectionStatus::Unauthorized => {
                write!(f, "host reachable, but the token is invalid or unauthorized")
            }
            ConnectionStatus::Forbidden => {
                write!(f, "host reachable, but the endpoint is disabled or forbidden")
            }
            ConnectionStatus::ReachableUnverified => {
                write!(f, "host reachable, token could not be verified")
            }
            ConnectionStatus::RateLimited => {
                write!(f, "host reachable, but requests are rate limited (429)")
            }
            ConnectionStatus::ServerError(status) => write!(f, "server error ({})", status),
            ConnectionStatus::Failed(msg) => write!(f, "connection test failed: {}", msg),
        }
    }
}

/// reqwest-backed image host client
#[derive(Debug, Clone)]
pub struct HostClient {
    http_client: Client,
}

impl HostClient {
    /// Create a new client
    pub fn new() -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("imgpilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    /// Probe the host: profile first, then the upload endpoint
    pub async fn test_connection(&self, domain: &str, token: &str) -> ConnectionStatus {
        match self.probe(domain, token).await {
            Ok(status) => status,
            Err(e) => ConnectionStatus::Failed(e.to_string()),
        }
    }

    async fn probe(&self, domain: &str, token: &str) -> Result<ConnectionStatus> {
        let domain = domain.trim_end_matches('/');
        let upload_url = format!("{}/api/v1/upload", domain);

        let profile = self
            .authorized(Method::GET, &format!("{}/api/v1/profile", domain), token)
            .send()
            .await?;
        match profile.status().as_u16() {
            200..=299 => return Ok(ConnectionStatus::Verified),
            401 => return Ok(ConnectionStatus::Unauthorized),
            403 => return Ok(ConnectionStatus::Forbidden),
            status => debug!("Profile probe inconclusive ({}), probing upload endpoint", status),
        }

        let options = self.authorized(Method::OPTIONS, &upload_url, token).send().await?;
        if options.status().is_success() || options.status() == StatusCode::METHOD_NOT_ALLOWED {
            return Ok(ConnectionStatus::ReachableUnverified);
        }

        let get = self.authorized(Method::GET, &upload_url, token).send().await?;
        let status = get.status();
        Ok(match status.as_u16() {
            405 => ConnectionStatus::ReachableUnverified,
            429 => ConnectionStatus::RateLimited,
            s if s >= 500 => ConnectionStatus::ServerError(s),
            s => {
                let body = get.text().await.unwrap_or_default();
                let message = body_message(&body).unwrap_or_else(|| format!("HTTP {}", s));
                ConnectionStatus::Failed(message)
            }
        })
    }

    fn authorized(&self, method: Method, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
    }
}

#[async_trait]
impl ImageHost for HostClient {
    async fn upload(&self, target: &UploadTarget, file: &UploadFile) -> Result<UploadOutcome> {
        let bytes = file.read().await?;
        let part = Part::bytes(bytes)
            .file_name(file.name.clone())
            .mime_str(&file.mime)
            .map_err(|e| Error::InvalidInput(format!("Invalid MIME type {}: {}", file.mime, e)))?;

        let mut form = Form::new().part("file", part);
        if let Some(strategy_id) = &target.strategy_id {
            form = form.text("strategy_id", strategy_id.clone());
        }

        let response = self
            .authorized(Method::POST, &target.upload_url(), &target.token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let rate_limit = parse_rate_limit(response.headers());
        let body = response.text().await?;
        let result = interpret_upload_response(status, &body)?;

        Ok(UploadOutcome { result, rate_limit })
    }

    async fn delete(&self, delete_url: &str, token: Option<&str>) -> Result<()> {
        let mut request = self
            .http_client
            .delete(delete_url)
            .header(ACCEPT, "application/json");
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Http {
            status: status.as_u16(),
            message: body_message(&body).unwrap_or_else(|| status_reason(status)),
        })
    }
}

/// Upload response body
#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<UploadResult>,
}

/// Classify one upload response.
///
/// Non-2xx is `Error::Http`; a 2xx body without `status: true` and a data
/// payload is `Error::Protocol`.
pub fn interpret_upload_response(status: StatusCode, body: &str) -> Result<UploadResult> {
    if !status.is_success() {
        let message = describe_status(status)
            .map(str::to_string)
            .or_else(|| body_message(body))
            .unwrap_or_else(|| status_reason(status));
        return Err(Error::Http { status: status.as_u16(), message });
    }

    let parsed: UploadResponse = serde_json::from_str(body)
        .map_err(|e| Error::Protocol(format!("Unreadable response body: {}", e)))?;

    match parsed {
        UploadResponse { status: true, data: Some(data), .. } => Ok(data),
        UploadResponse { status: true, data: None, .. } => {
            Err(Error::Protocol("Response is missing upload data".to_string()))
        }
        UploadResponse { message, .. } => {
            Err(Error::Protocol(message.unwrap_or_else(|| "Upload failed".to_string())))
        }
    }
}

/// Fixed messages for statuses with a well-known meaning
fn describe_status(status: StatusCode) -> Option<&'static str> {
    match status.as_u16() {
        401 => Some("unauthorized or invalid token"),
        403 => Some("forbidden or endpoint disabled"),
        413 => Some("file too large, rejected by server"),
        415 => Some("unsupported media type"),
        429 => Some("too many requests, try again later"),
        s if s >= 500 => Some("server error"),
        _ => None,
    }
}

fn status_reason(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("unknown status").to_string()
}

fn body_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
}

/// Extract `X-RateLimit-Limit` / `X-RateLimit-Remaining` when both are present
pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimit> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };
    Some(RateLimit {
        limit: read("x-ratelimit-limit")?,
        remaining: read("x-ratelimit-remaining")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::LinkFormat;
    use reqwest::header::HeaderValue;

    const SUCCESS_BODY: &str = r#"{
        "status": true,
        "message": "ok",
        "data": {
            "origin_name": "cat.png",
            "links": {
                "url": "https://img.example.com/i/cat.png",
                "markdown": "![cat.png](https://img.example.com/i/cat.png)",
                "html": "<img src=\"https://img.example.com/i/cat.png\" />",
                "bbcode": "[img]https://img.example.com/i/cat.png[/img]",
                "thumbnail_url": "https://img.example.com/t/cat.png"
            },
            "delete_url": "https://img.example.com/api/v1/images/abc"
        }
    }"#;

    #[test]
    fn test_success_body() {
        let result = interpret_upload_response(StatusCode::OK, SUCCESS_BODY).unwrap();
        assert_eq!(result.origin_name, "cat.png");
        assert_eq!(result.links.get(LinkFormat::Thumbnail), "https://img.example.com/t/cat.png");
        assert_eq!(result.delete_url.as_deref(), Some("https://img.example.com/api/v1/images/abc"));
    }

    #[test]
    fn test_2xx_without_success_indicator_is_protocol_error() {
        let err = interpret_upload_response(
            StatusCode::OK,
            r#"{"status": false, "message": "storage quota exceeded"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Protocol(ref m) if m == "storage quota exceeded"));
        assert!(err.is_retryable());

        let err = interpret_upload_response(StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));

        let err = interpret_upload_response(StatusCode::OK, r#"{"status": true}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_non_2xx_messages() {
        let err = interpret_upload_response(StatusCode::UNAUTHORIZED, "").unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("invalid token"));

        let err = interpret_upload_response(StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert!(err.to_string().contains("server error"));

        let err = interpret_upload_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"status": false, "message": "strategy not found"}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 422: strategy not found");

        let err = interpret_upload_response(StatusCode::NOT_FOUND, "nope").unwrap_err();
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
    }

    #[test]
    fn test_parse_rate_limit() {
        let mut headers = HeaderMap::new();
        assert!(parse_rate_limit(&headers).is_none());

        headers.insert("X-RateLimit-Limit", HeaderValue::from_static("60"));
        assert!(parse_rate_limit(&headers).is_none());

        headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("57"));
        assert_eq!(parse_rate_limit(&headers), Some(RateLimit { limit: 60, remaining: 57 }));

        headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("many"));
        assert!(parse_rate_limit(&headers).is_none());
    }

    #[test]
    fn test_upload_url() {
        let target = UploadTarget {
            domain: "https://img.example.com/".to_string(),
            token: "t".to_string(),
            strategy_id: None,
        };
        assert_eq!(target.upload_url(), "https://img.example.com/api/v1/upload");
    }

    #[test]
    fn test_connection_status_display() {
        assert!(ConnectionStatus::Verified.is_ok());
        assert!(ConnectionStatus::ReachableUnverified.is_ok());
        assert!(!ConnectionStatus::Unauthorized.is_ok());
        assert_eq!(ConnectionStatus::ServerError(502).to_string(), "server error (502)");
    }

    mod http {
        use super::*;
        use httpmock::Method::{DELETE, GET, OPTIONS, POST};
        use httpmock::MockServer;
        use serde_json::json;

        const TOKEN: &str = "1|abcdefghijklmnop";

        fn image(dir: &tempfile::TempDir, name: &str) -> UploadFile {
            let path = dir.path().join(name);
            std::fs::write(&path, b"PNGDATA").unwrap();
            UploadFile::open(&path, 1024).unwrap()
        }

        fn target(server: &MockServer, strategy_id: Option<&str>) -> UploadTarget {
            UploadTarget {
                domain: server.base_url(),
                token: TOKEN.to_string(),
                strategy_id: strategy_id.map(str::to_string),
            }
        }

        fn success_json(name: &str) -> serde_json::Value {
            json!({
                "status": true,
                "data": {
                    "origin_name": name,
                    "links": { "url": format!("https://img.example.com/i/{}", name) },
                    "delete_url": "https://img.example.com/api/v1/images/1"
                }
            })
        }

        #[tokio::test]
        async fn test_upload_sends_multipart_with_auth() {
            let server = MockServer::start_async().await;
            let mock = server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/api/v1/upload")
                        .header("authorization", format!("Bearer {}", TOKEN))
                        .header("accept", "application/json")
                        .body_contains(r#"name="file"; filename="cat.png""#)
                        .body_contains("PNGDATA")
                        .body_contains(r#"name="strategy_id""#);
                    then.status(200)
                        .header("X-RateLimit-Limit", "60")
                        .header("X-RateLimit-Remaining", "59")
                        .json_body(success_json("cat.png"));
                })
                .await;

            let dir = tempfile::tempdir().unwrap();
            let client = HostClient::new().unwrap();
            let outcome = client
                .upload(&target(&server, Some("2")), &image(&dir, "cat.png"))
                .await
                .unwrap();

            mock.assert_async().await;
            assert_eq!(outcome.result.origin_name, "cat.png");
            assert_eq!(
                outcome.result.links.url.as_deref(),
                Some("https://img.example.com/i/cat.png")
            );
            assert_eq!(outcome.rate_limit, Some(RateLimit { limit: 60, remaining: 59 }));
        }

        #[tokio::test]
        async fn test_upload_without_rate_limit_headers() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/api/v1/upload");
                    then.status(200).json_body(success_json("dog.jpg"));
                })
                .await;

            let dir = tempfile::tempdir().unwrap();
            let outcome = HostClient::new()
                .unwrap()
                .upload(&target(&server, None), &image(&dir, "dog.jpg"))
                .await
                .unwrap();
            assert!(outcome.rate_limit.is_none());
        }

        #[tokio::test]
        async fn test_upload_error_statuses() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/api/v1/upload");
                    then.status(413).json_body(json!({ "message": "too big" }));
                })
                .await;

            let dir = tempfile::tempdir().unwrap();
            let err = HostClient::new()
                .unwrap()
                .upload(&target(&server, None), &image(&dir, "big.png"))
                .await
                .unwrap_err();
            assert_eq!(err.status(), Some(413));
            assert!(err.to_string().contains("file too large"));
            assert!(err.is_retryable());
        }

        #[tokio::test]
        async fn test_upload_unreachable_host_is_transport_error() {
            let dir = tempfile::tempdir().unwrap();
            let target = UploadTarget {
                domain: "http://127.0.0.1:1".to_string(),
                token: TOKEN.to_string(),
                strategy_id: None,
            };
            let err = HostClient::new()
                .unwrap()
                .upload(&target, &image(&dir, "cat.png"))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Transport(_)));
        }

        #[tokio::test]
        async fn test_delete_success_and_failure() {
            let server = MockServer::start_async().await;
            let ok = server
                .mock_async(|when, then| {
                    when.method(DELETE)
                        .path("/api/v1/images/1")
                        .header("authorization", format!("Bearer {}", TOKEN))
                        .header("accept", "application/json");
                    then.status(204);
                })
                .await;
            server
                .mock_async(|when, then| {
                    when.method(DELETE).path("/api/v1/images/2");
                    then.status(404).json_body(json!({ "message": "image not found" }));
                })
                .await;

            let client = HostClient::new().unwrap();
            client
                .delete(&server.url("/api/v1/images/1"), Some(TOKEN))
                .await
                .unwrap();
            ok.assert_async().await;

            let err = client
                .delete(&server.url("/api/v1/images/2"), None)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                Error::Http { status: 404, ref message } if message == "image not found"
            ));
        }

        #[tokio::test]
        async fn test_connection_profile_statuses() {
            for (status, expected) in [
                (200, ConnectionStatus::Verified),
                (401, ConnectionStatus::Unauthorized),
                (403, ConnectionStatus::Forbidden),
            ] {
                let server = MockServer::start_async().await;
                server
                    .mock_async(|when, then| {
                        when.method(GET)
                            .path("/api/v1/profile")
                            .header("authorization", format!("Bearer {}", TOKEN));
                        then.status(status);
                    })
                    .await;
                let upload = server
                    .mock_async(|when, then| {
                        when.path("/api/v1/upload");
                        then.status(204);
                    })
                    .await;

                let result = HostClient::new()
                    .unwrap()
                    .test_connection(&server.base_url(), TOKEN)
                    .await;
                assert_eq!(result, expected);
                assert_eq!(upload.hits_async().await, 0);
            }
        }

        #[tokio::test]
        async fn test_connection_falls_back_to_options() {
            for status in [204, 405] {
                let server = MockServer::start_async().await;
                let options = server
                    .mock_async(|when, then| {
                        when.method(OPTIONS).path("/api/v1/upload");
                        then.status(status);
                    })
                    .await;
                let get = server
                    .mock_async(|when, then| {
                        when.method(GET).path("/api/v1/upload");
                        then.status(500);
                    })
                    .await;

                let result = HostClient::new()
                    .unwrap()
                    .test_connection(&server.base_url(), TOKEN)
                    .await;
                assert_eq!(result, ConnectionStatus::ReachableUnverified);
                options.assert_async().await;
                assert_eq!(get.hits_async().await, 0);
            }
        }

        #[tokio::test]
        async fn test_connection_falls_back_to_get() {
            for (status, expected) in [
                (405, ConnectionStatus::ReachableUnverified),
                (429, ConnectionStatus::RateLimited),
                (503, ConnectionStatus::ServerError(503)),
            ] {
                let server = MockServer::start_async().await;
                let get = server
                    .mock_async(|when, then| {
                        when.method(GET).path("/api/v1/upload");
                        then.status(status);
                    })
                    .await;

                let result = HostClient::new()
                    .unwrap()
                    .test_connection(&server.base_url(), TOKEN)
                    .await;
                assert_eq!(result, expected);
                get.assert_async().await;
            }
        }

        #[tokio::test]
        async fn test_connection_reports_body_message() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/api/v1/upload");
                    then.status(400).json_body(json!({ "message": "uploads disabled" }));
                })
                .await;

            let result = HostClient::new()
                .unwrap()
                .test_connection(&server.base_url(), TOKEN)
                .await;
            assert_eq!(result, ConnectionStatus::Failed("uploads disabled".to_string()));
        }
    }
}

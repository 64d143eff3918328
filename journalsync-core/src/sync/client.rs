//! HTTP plumbing shared by every protocol client.
//!
//! [`Transport`] is the seam to the network: one call, one request, one
//! response. [`ApiClient`] sits on top and turns status codes into the
//! crate's error taxonomy.

use crate::config::ClientConfig;
use crate::sync::auth::AuthToken;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// HTTP method of a protocol request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// Request body.
#[derive(Clone, PartialEq, Eq)]
pub enum Body {
    Json(Vec<u8>),
    Form(Vec<(String, String)>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(bytes) => write!(f, "Json({} bytes)", bytes.len()),
            Self::Form(fields) => write!(f, "Form({} fields)", fields.len()),
        }
    }
}

/// A request relative to the server's base URL.
#[derive(Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the base URL, e.g. `api/v1/journals/`
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Value of the `Authorization` header
    pub authorization: Option<String>,
    pub body: Option<Body>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            authorization: None,
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn auth(mut self, token: &AuthToken) -> Self {
        self.authorization = Some(token.header_value());
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| Error::InvalidResponse(format!("Failed to encode request: {}", e)))?;
        self.body = Some(Body::Json(bytes));
        Ok(self)
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(Body::Form(fields));
        self
    }
}

// Never print the authorization header or the body contents.
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("authenticated", &self.authorization.is_some())
            .field("body", &self.body)
            .finish()
    }
}

/// Raw server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::InvalidResponse(format!("Malformed response body: {}", e)))
    }
}

/// Failure before any response was received (DNS, connect, timeout, TLS).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Executes one HTTP request synchronously.
///
/// Implementations must be safe to share between threads; the core never
/// issues more than one request per call.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// Production transport over a blocking `reqwest` client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    base_url: reqwest::Url,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url()?,
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let mut url = self
            .base_url
            .join(&request.path)
            .map_err(|e| TransportError(format!("Invalid request path: {}", e)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, url);
        if let Some(authorization) = &request.authorization {
            builder = builder.header(reqwest::header::AUTHORIZATION, authorization);
        }
        builder = match &request.body {
            Some(Body::Json(bytes)) => builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(bytes.clone()),
            Some(Body::Form(fields)) => builder.form(fields),
            None => builder,
        };

        let response = builder
            .send()
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

/// Executes requests and translates the outcome into [`crate::Error`]:
/// 2xx is success, 401 is [`Error::Unauthorized`], any other status is
/// [`Error::Http`], and a transport failure is
/// [`Error::ServiceUnavailable`].
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Client over the production `reqwest` transport.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(ReqwestTransport::new(config)?)))
    }

    pub fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method.as_str();
        let response = match self.transport.send(&request) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(method, path = %request.path, error = %e, "transport failure");
                return Err(Error::ServiceUnavailable(e.0));
            }
        };

        tracing::debug!(method, path = %request.path, status = response.status, "request completed");

        if response.is_success() {
            return Ok(response);
        }

        let message = error_message(&response);
        if response.status == 401 {
            tracing::warn!(path = %request.path, "credentials rejected");
            return Err(Error::Unauthorized {
                status: response.status,
                message,
            });
        }

        Err(Error::Http {
            status: response.status,
            message,
        })
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient").finish_non_exhaustive()
    }
}

/// Best-effort human readable message from an error response.
fn error_message(response: &HttpResponse) -> String {
    #[derive(serde::Deserialize)]
    struct Detail {
        detail: String,
    }

    if let Ok(detail) = serde_json::from_slice::<Detail>(&response.body) {
        return detail.detail;
    }

    let text = String::from_utf8_lossy(&response.body);
    let text = text.trim();
    if text.is_empty() {
        format!("HTTP status {}", response.status)
    } else {
        text.chars().take(200).collect()
    }
}

//! The attendance service API seam.
//!
//! [`Transport`] is the single point where requests leave the process. The
//! production implementation is [`http::HttpTransport`]; tests substitute a
//! scripted transport and count invocations. Transports never retry.
//!
//! [`response`] holds the documented response schema and the deterministic
//! mapping of failures onto the error taxonomy.

pub mod http;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use http::HttpTransport;
pub use response::FieldErrors;

/// HTTP method of an API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read.
    Get,
    /// Create.
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// A request to the attendance service, relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path below the base URL, e.g. `/attendances`.
    pub path: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// A `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// A `POST` request with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

/// Raw answer from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl ApiResponse {
    /// Build a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request that produced no response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response within the client timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other failure sending the request or reading the body.
    #[error("request failed: {0}")]
    Request(String),
}

/// Sends requests to the attendance service.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return whatever the server answered.
    ///
    /// Any HTTP status is a successful transport outcome; interpreting it is
    /// the caller's job.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response was received.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        (**self).send(request).await
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::MockTransport;
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = ApiRequest::get("/attendances").with_query("page", 2);
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.query, vec![("page".to_string(), "2".to_string())]);
        assert!(request.body.is_none());

        let request = ApiRequest::post("/attendances", json!({"a": 1}));
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body, Some(json!({"a": 1})));
    }

    #[test]
    fn test_response_is_success() {
        assert!(ApiResponse::new(200, "").is_success());
        assert!(ApiResponse::new(201, "").is_success());
        assert!(!ApiResponse::new(301, "").is_success());
        assert!(!ApiResponse::new(422, "").is_success());
    }

    #[test]
    fn test_method_display() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!(Method::Post.to_string(), "POST");
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Timeout(Duration::from_secs(10));
        assert!(err.to_string().contains("timed out"));
        let err = TransportError::Connect("refused".to_string());
        assert!(err.to_string().contains("refused"));
    }

    #[tokio::test]
    async fn test_arc_transport_delegates() {
        let mock = Arc::new(MockTransport::new().respond(200, "{}"));
        let shared: Arc<MockTransport> = Arc::clone(&mock);
        let response = shared.send(ApiRequest::get("/x")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(mock.calls(), 1);
    }
}

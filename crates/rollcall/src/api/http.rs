//! HTTP transport backed by reqwest.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, Url};
use tracing::{debug, warn};

use super::{ApiRequest, ApiResponse, Method, Transport, TransportError};
use crate::error::{Error, Result};
use crate::session::SessionStore;

/// Sends API requests over HTTPS with the session's bearer token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    timeout: Duration,
    session: Arc<SessionStore>,
}

impl HttpTransport {
    /// Create a transport for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not an absolute http(s) URL or the
    /// client cannot be built.
    pub fn new(base_url: &str, timeout: Duration, session: Arc<SessionStore>) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rollcall/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout,
            session,
        })
    }

    /// The session whose token is attached to requests.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// The API root, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for an API path.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the path can't be joined.
    pub fn endpoint(&self, path: &str) -> std::result::Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::Request(format!("invalid path {path:?}: {e}")))
    }

    fn map_error(&self, err: &reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Parse the base URL and make sure relative joins stay below its path.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|e| Error::BaseUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::BaseUrl {
            url: raw.to_string(),
            message: format!("unsupported scheme {:?}", url.scheme()),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> std::result::Result<ApiResponse, TransportError> {
        let url = self.endpoint(&request.path)?;
        debug!(method = %request.method, %url, "Sending request");

        let mut builder = match request.method {
            Method::Get => self.client.get(url.clone()),
            Method::Post => self.client.post(url.clone()),
        };
        builder = builder.header(ACCEPT, HeaderValue::from_static("application/json"));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        match self.session.token() {
            Some(token) => builder = builder.bearer_auth(token),
            None => warn!("No session token; sending unauthenticated request"),
        }

        let response = builder.send().await.map_err(|e| {
            warn!(%url, error = %e, "Request failed");
            self.map_error(&e)
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.map_error(&e))?;

        debug!(%url, status, bytes = body.len(), "Response received");
        Ok(ApiResponse { status, body })
    }
}

use crate::protocol::{EcpRequest, Method, Reply, CONTROL_PORT};
use async_trait::async_trait;
use thiserror::Error;

/// Raw transport failure, before classification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response within the request's timeout
    #[error("request timed out")]
    Timeout,

    /// TCP connect failed (refused, unreachable host, ...)
    #[error("connection failed: {0}")]
    Connect(String),

    /// The response body could not be read
    #[error("unreadable response body: {0}")]
    Body(String),

    /// Anything else reqwest reports
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Carries one control-port request to a device and returns its reply verbatim
///
/// Status codes are not interpreted here; that is the classifier's job, so the
/// direct and relayed paths are treated identically.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: EcpRequest) -> Result<Reply, TransportError>;
}

/// Talks to `http://{address}:{port}/{path}` directly
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    port: u16,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            port: CONTROL_PORT,
        }
    }

    /// Override the control port (test servers, port-forwarded devices)
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    fn url(&self, request: &EcpRequest) -> String {
        format!("http://{}:{}/{}", request.address, self.port, request.path)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: EcpRequest) -> Result<Reply, TransportError> {
        let url = self.url(&request);
        tracing::debug!("{} {}", request.method, url);
        send(&self.http, &url, &request).await
    }
}

/// Talks to a pass-through relay at `{base}/{address}/{path}`
///
/// The relay forwards the method and path to the device's control port and
/// returns status and body unchanged. Used when the client cannot reach the
/// device directly (e.g. a page served over HTTPS).
#[derive(Debug, Clone)]
pub struct RelayTransport {
    http: reqwest::Client,
    base_url: String,
}

impl RelayTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn url(&self, request: &EcpRequest) -> String {
        format!("{}/{}/{}", self.base_url, request.address, request.path)
    }
}

#[async_trait]
impl Transport for RelayTransport {
    async fn execute(&self, request: EcpRequest) -> Result<Reply, TransportError> {
        let url = self.url(&request);
        tracing::debug!("{} {} (relay)", request.method, url);
        send(&self.http, &url, &request).await
    }
}

async fn send(http: &reqwest::Client, url: &str, request: &EcpRequest) -> Result<Reply, TransportError> {
    let builder = match request.method {
        Method::Get => http.get(url),
        // The device expects an empty form body on POST
        Method::Post => http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(""),
    };

    let response = builder
        .header(reqwest::header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .timeout(request.timeout)
        .send()
        .await?;

    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok(Reply { status, body })
}

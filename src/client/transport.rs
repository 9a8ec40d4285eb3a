//! HTTP transport used to reach config servers.

use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use url::Url;

/// A GET request for one environment on one server.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRequest {
    /// Fully built request URL
    pub url: Url,
    /// Headers in the order they should be sent
    pub headers: Vec<(String, String)>,
}

impl ConfigRequest {
    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What came back from a server that could be reached.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Type header, if present
    pub content_type: Option<String>,
    /// Response body
    pub body: String,
}

impl HttpResponse {
    /// A 200 response with a JSON body.
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }

    /// A response with the given status and an empty body.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: String::new(),
        }
    }
}

/// Connection-level failure: the server was never heard from.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Capability to perform one GET round trip.
///
/// Implementations report any HTTP status as `Ok`; only failures to reach the
/// server at all (refused, timeout, DNS) are `Err`.
#[async_trait]
pub trait ConfigTransport: Send + Sync {
    /// Send the request and collect the response.
    async fn get(&self, request: &ConfigRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport.
///
/// # Examples
///
/// ```rust,no_run
/// use confhub::client::ReqwestTransport;
/// use std::time::Duration;
///
/// # fn example() -> confhub::error::Result<()> {
/// let transport = ReqwestTransport::new(Duration::from_secs(10), Duration::from_secs(185))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| ConfigError::LoadError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigTransport for ReqwestTransport {
    async fn get(&self, request: &ConfigRequest) -> std::result::Result<HttpResponse, TransportError> {
        let mut builder = self.client.get(request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(format!("Failed to read response body: {}", e)))?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = ConfigRequest {
            url: Url::parse("http://cfg-a:8888/app/default").unwrap(),
            headers: vec![("Accept".to_string(), "application/json".to_string())],
        };
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(request.header("Authorization"), None);
    }

    #[test]
    fn test_build_transport() {
        let transport = ReqwestTransport::new(Duration::from_secs(1), Duration::from_secs(5));
        assert!(transport.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let transport =
            ReqwestTransport::new(Duration::from_millis(200), Duration::from_millis(500)).unwrap();
        let request = ConfigRequest {
            url: Url::parse("http://127.0.0.1:1/app/default").unwrap(),
            headers: Vec::new(),
        };
        assert!(transport.get(&request).await.is_err());
    }
}

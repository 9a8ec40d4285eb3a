//! Narrow Vault HTTP surface used by the repository.

use super::properties::VaultEnvironmentProperties;
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use reqwest::{Certificate, Client, ClientBuilder, Identity, StatusCode};
use serde_json::Value as JsonValue;
use std::fs;
use tracing::warn;
use url::Url;

/// Header carrying the Vault token.
pub const TOKEN_HEADER: &str = "X-Vault-Token";

/// Header carrying the Vault Enterprise namespace.
pub const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

const PEM_CERTIFICATE_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_CERTIFICATE_END: &str = "-----END CERTIFICATE-----";

/// A request to a service outside Vault, such as an instance metadata endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRequest {
    /// Target URL
    pub url: String,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Request body; the request is a POST when present
    pub body: Option<String>,
}

impl ExternalRequest {
    /// A GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// A POST request with `body`.
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// The Vault operations the repository needs.
#[async_trait]
pub trait VaultOperations: Send + Sync {
    /// Read the `data` of the secret at `path`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if Vault cannot be reached or rejects the request.
    async fn read(&self, path: &str, token: &str) -> Result<Option<JsonValue>>;

    /// POST `body` to a login endpoint and return the issued client token.
    ///
    /// # Errors
    ///
    /// Returns an error if the login is rejected or the response has no token.
    async fn login(&self, path: &str, body: JsonValue, token: Option<&str>) -> Result<String>;

    /// Send a request outside Vault and return the response body.
    ///
    /// Cloud logins use this to collect instance identity material.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be reached or answers with a
    /// non-success status.
    async fn fetch(&self, request: &ExternalRequest) -> Result<String>;
}

/// [`VaultOperations`] over `reqwest`.
///
/// Requests to Vault carry the configured TLS identity and trust roots;
/// requests to external services use a plain client.
#[derive(Debug, Clone)]
pub struct VaultHttpClient {
    client: Client,
    external: Client,
    base: Url,
    namespace: Option<String>,
}

impl VaultHttpClient {
    /// Create a client for the Vault described by `properties`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid, a key store or trust store
    /// cannot be read, or the HTTP client cannot be built.
    pub fn new(properties: &VaultEnvironmentProperties) -> Result<Self> {
        let builder = Client::builder().timeout(properties.timeout());
        let client = configure_tls(builder, properties)?
            .build()
            .map_err(|e| ConfigError::Vault(format!("Failed to build HTTP client: {}", e)))?;
        let external = Client::builder()
            .timeout(properties.timeout())
            .build()
            .map_err(|e| ConfigError::Vault(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            external,
            base: properties.base_url()?,
            namespace: properties.namespace.clone(),
        })
    }

    /// Create a client from an existing `reqwest` client.
    pub fn with_client(client: Client, base: Url, namespace: Option<String>) -> Self {
        Self {
            external: client.clone(),
            client,
            base,
            namespace,
        }
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(&format!("v1/{}", path.trim_start_matches('/')))
            .map_err(|e| ConfigError::Vault(format!("Invalid secret path '{}': {}", path, e)))
    }

    fn request(&self, builder: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        let builder = match token {
            Some(token) => builder.header(TOKEN_HEADER, token),
            None => builder,
        };
        match &self.namespace {
            Some(namespace) => builder.header(NAMESPACE_HEADER, namespace),
            None => builder,
        }
    }
}

#[async_trait]
impl VaultOperations for VaultHttpClient {
    async fn read(&self, path: &str, token: &str) -> Result<Option<JsonValue>> {
        let response = self
            .request(self.client.get(self.url(path)?), Some(token))
            .send()
            .await
            .map_err(|e| ConfigError::Vault(format!("Failed to read '{}': {}", path, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ConfigError::Vault(format!(
                "Reading '{}' returned status {}",
                path,
                response.status()
            )));
        }

        let mut body: JsonValue = response
            .json()
            .await
            .map_err(|e| ConfigError::Vault(format!("Invalid response for '{}': {}", path, e)))?;
        Ok(body.get_mut("data").map(JsonValue::take))
    }

    async fn login(&self, path: &str, body: JsonValue, token: Option<&str>) -> Result<String> {
        let response = self
            .request(self.client.post(self.url(path)?).json(&body), token)
            .send()
            .await
            .map_err(|e| ConfigError::Vault(format!("Login at '{}' failed: {}", path, e)))?;

        if !response.status().is_success() {
            return Err(ConfigError::Vault(format!(
                "Login at '{}' returned status {}",
                path,
                response.status()
            )));
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| ConfigError::Vault(format!("Invalid login response from '{}': {}", path, e)))?;
        client_token(&body)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::Vault(format!("Login at '{}' returned no client token", path)))
    }

    async fn fetch(&self, request: &ExternalRequest) -> Result<String> {
        let builder = match &request.body {
            Some(body) => self.external.post(request.url.as_str()).body(body.clone()),
            None => self.external.get(request.url.as_str()),
        };
        let builder = request
            .headers
            .iter()
            .fold(builder, |builder, (name, value)| builder.header(name.as_str(), value.as_str()));

        let response = builder.send().await.map_err(|e| {
            ConfigError::Vault(format!("Request to '{}' failed: {}", request.url, e))
        })?;
        if !response.status().is_success() {
            return Err(ConfigError::Vault(format!(
                "Request to '{}' returned status {}",
                request.url,
                response.status()
            )));
        }
        response.text().await.map_err(|e| {
            ConfigError::Vault(format!("Failed to read response from '{}': {}", request.url, e))
        })
    }
}

/// Apply the key store, trust store and certificate validation settings.
fn configure_tls(
    mut builder: ClientBuilder,
    properties: &VaultEnvironmentProperties,
) -> Result<ClientBuilder> {
    let ssl = &properties.ssl;
    if let Some(path) = ssl.key_store.as_deref() {
        let archive = read_store(path, "key store")?;
        let password = ssl.key_store_password.as_deref().unwrap_or_default();
        let identity = Identity::from_pkcs12_der(&archive, password).map_err(|e| {
            ConfigError::InvalidConfiguration(format!("Invalid key store '{}': {}", path, e))
        })?;
        builder = builder.identity(identity);
    }

    if let Some(path) = ssl.trust_store.as_deref() {
        if ssl.trust_store_password.is_some() {
            warn!(trust_store = %path, "Trust store password is ignored for PEM trust stores");
        }
        let bundle = read_store(path, "trust store")?;
        let text = String::from_utf8_lossy(&bundle);
        let mut added = 0;
        for block in text
            .split_inclusive(PEM_CERTIFICATE_END)
            .filter(|block| block.contains(PEM_CERTIFICATE_BEGIN))
        {
            let certificate = Certificate::from_pem(block.trim().as_bytes()).map_err(|e| {
                ConfigError::InvalidConfiguration(format!("Invalid trust store '{}': {}", path, e))
            })?;
            builder = builder.add_root_certificate(certificate);
            added += 1;
        }
        if added == 0 {
            return Err(ConfigError::InvalidConfiguration(format!(
                "Trust store '{}' holds no PEM certificates",
                path
            )));
        }
    }

    if properties.skip_ssl_validation {
        warn!("TLS certificate validation is disabled for Vault");
        builder = builder.danger_accept_invalid_certs(true);
    }
    Ok(builder)
}

fn read_store(path: &str, kind: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        ConfigError::InvalidConfiguration(format!("Failed to read {} '{}': {}", kind, path, e))
    })
}

fn client_token(body: &JsonValue) -> Option<&str> {
    body.pointer("/auth/client_token").and_then(JsonValue::as_str)
}

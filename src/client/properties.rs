//! Client settings for talking to config servers.

use crate::error::{ConfigError, Result};
use config::{Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Header carrying the config server token.
pub const TOKEN_HEADER: &str = "X-Config-Token";

/// Header carrying the sticky state token.
pub const STATE_HEADER: &str = "X-Config-State";

/// Name of the default profile.
pub const DEFAULT_PROFILE: &str = "default";

/// Media type requesting the origin-tracking environment representation.
pub const DEFAULT_MEDIA_TYPE: &str = "application/vnd.spring-cloud.config-server.v2+json";

/// Environment variable prefix used by [`ClientProperties::load`].
pub const ENV_PREFIX: &str = "CONFIG_CLIENT";

/// How to walk a list of server URIs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MultipleUriStrategy {
    /// Stop at the first URI that answers with anything but 404 or a connection failure.
    #[default]
    #[serde(alias = "CONNECTION_TIMEOUT_ONLY", alias = "connection_timeout_only")]
    ConnectionTimeoutOnly,
    /// Move on after server errors too, as long as URIs remain.
    #[serde(alias = "ALWAYS")]
    Always,
}

/// Discovery-mode settings.
///
/// When enabled, server URIs and the shared credential come from the
/// discovered instance set in the load context instead of `uri`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiscoveryProperties {
    /// Resolve servers through discovery
    pub enabled: bool,
    /// Service id to look up
    pub service_id: String,
}

impl Default for DiscoveryProperties {
    fn default() -> Self {
        Self {
            enabled: false,
            service_id: "configserver".to_string(),
        }
    }
}

/// Config client settings.
///
/// # Examples
///
/// ```rust
/// use confhub::client::{ClientProperties, MultipleUriStrategy};
///
/// let properties = ClientProperties {
///     name: "billing".to_string(),
///     uri: vec!["http://cfg-a:8888".to_string(), "http://cfg-b:8888".to_string()],
///     multiple_uri_strategy: MultipleUriStrategy::Always,
///     ..Default::default()
/// };
/// assert_eq!(properties.profile, "default");
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientProperties {
    /// Application name used in the request path
    pub name: String,
    /// Comma-separated profiles used when no accepted profiles are supplied
    pub profile: String,
    /// Label, or comma-separated candidate labels
    pub label: Option<String>,
    /// Ordered list of server base URIs
    pub uri: Vec<String>,
    /// Username for basic authentication
    pub username: String,
    /// Password for basic authentication
    pub password: Option<String>,
    /// Token forwarded in `X-Config-Token`
    pub token: Option<String>,
    /// Accept header value
    pub media_type: String,
    /// Accept-Charset header value
    pub charset: String,
    /// Abort instead of proceeding without remote configuration
    pub fail_fast: bool,
    /// Send the state token when one is known
    pub send_state: bool,
    /// Send the raw label to the server instead of trying each candidate
    pub send_all_labels: bool,
    /// How to walk `uri`
    pub multiple_uri_strategy: MultipleUriStrategy,
    /// Discovery settings
    pub discovery: DiscoveryProperties,
    /// Extra request headers
    pub headers: HashMap<String, String>,
    /// Connect timeout in milliseconds
    pub request_connect_timeout: u64,
    /// Read timeout in milliseconds
    pub request_read_timeout: u64,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            name: "application".to_string(),
            profile: DEFAULT_PROFILE.to_string(),
            label: None,
            uri: vec!["http://localhost:8888".to_string()],
            username: "user".to_string(),
            password: None,
            token: None,
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            charset: "UTF-8".to_string(),
            fail_fast: false,
            send_state: true,
            send_all_labels: false,
            multiple_uri_strategy: MultipleUriStrategy::default(),
            discovery: DiscoveryProperties::default(),
            headers: HashMap::new(),
            request_connect_timeout: 10_000,
            request_read_timeout: 185_000,
        }
    }
}

/// Credentials resolved for one server URI.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    /// Base URL with any userinfo removed
    pub uri: Url,
    /// Username, if any
    pub username: Option<String>,
    /// Password, if any
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("uri", &self.uri.as_str())
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ClientProperties {
    /// Load client settings from an optional file and `CONFIG_CLIENT_*` variables.
    ///
    /// Environment variables override the file. Nested keys use `__`
    /// (`CONFIG_CLIENT_DISCOVERY__ENABLED=true`) and `CONFIG_CLIENT_URI` accepts a
    /// comma-separated list.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or a value has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Like [`ClientProperties::load`] with a custom environment prefix.
    pub fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let env_source = Environment::with_prefix(prefix)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("uri");

        builder
            .add_source(env_source)
            .build()
            .map_err(|e| ConfigError::LoadError(format!("Failed to load client settings: {}", e)))?
            .try_deserialize::<Self>()
            .map_err(|e| {
                ConfigError::DeserializationError(format!("Invalid client settings: {}", e))
            })
    }

    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.request_connect_timeout)
    }

    /// Read timeout as a duration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.request_read_timeout)
    }

    /// Resolve the credentials for the URI at `index`.
    ///
    /// An explicitly configured password wins over userinfo embedded in the
    /// URI. The returned URL never carries userinfo.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range or the URI does not parse.
    pub fn credentials(&self, index: usize) -> std::result::Result<Credentials, crate::error::FetchError> {
        let raw = self.uri.get(index).ok_or_else(|| {
            crate::error::FetchError::Configuration(format!(
                "no config server URI at index {} ({} configured)",
                index,
                self.uri.len()
            ))
        })?;
        extract_credentials(raw, Some(&self.username), self.password.as_deref())
    }

    /// Whether a non-empty label is configured.
    pub fn has_label(&self) -> bool {
        self.label.as_deref().is_some_and(has_text)
    }
}

/// Split a URI into a bare base URL and the credentials that apply to it.
pub(crate) fn extract_credentials(
    raw: &str,
    username: Option<&str>,
    password: Option<&str>,
) -> std::result::Result<Credentials, crate::error::FetchError> {
    let mut uri = Url::parse(raw.trim()).map_err(|e| crate::error::FetchError::InvalidUri {
        uri: raw.to_string(),
        reason: e.to_string(),
    })?;

    let embedded_user = uri.username().to_string();
    let embedded_password = uri.password().map(str::to_string);
    let has_userinfo = !embedded_user.is_empty() || embedded_password.as_deref().is_some_and(has_text);

    let mut credentials = Credentials {
        uri: uri.clone(),
        username: username.filter(|u| has_text(u)).map(str::to_string),
        password: password.filter(|p| has_text(p)).map(str::to_string),
    };
    if !has_userinfo {
        return Ok(credentials);
    }

    // Userinfo never travels in the request URL.
    let _ = uri.set_username("");
    let _ = uri.set_password(None);
    credentials.uri = uri;

    if credentials.password.is_none() {
        credentials.username = Some(embedded_user).filter(|u| !u.is_empty());
        credentials.password = embedded_password;
    }
    Ok(credentials)
}

pub(crate) fn has_text(value: &str) -> bool {
    !value.trim().is_empty()
}

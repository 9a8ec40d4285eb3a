//! Multi-URI fetch strategy.
//!
//! Walks an ordered list of config server URIs and decides, per failure,
//! whether to try the next one or give up. At most one request is in flight
//! at a time and each URI is tried once.

use super::context::DiscoveredInstances;
use super::properties::{
    ClientProperties, Credentials, MultipleUriStrategy, STATE_HEADER, TOKEN_HEADER,
    extract_credentials, has_text,
};
use super::transport::{ConfigRequest, ConfigTransport};
use crate::environment::{Environment, denormalize};
use crate::error::FetchError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{HeaderName, HeaderValue};
use tracing::{debug, info};
use url::Url;

const AUTHORIZATION: &str = "Authorization";

/// The coordinates of one environment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentRequest<'a> {
    /// Application name
    pub name: &'a str,
    /// Comma-joined profiles
    pub profiles: &'a str,
    /// Label; empty means the server default
    pub label: &'a str,
}

/// The server list to walk, with its credential rule.
#[derive(Debug, Clone, Copy)]
pub enum ServerTargets<'a> {
    /// Statically configured URIs, credentials resolved per index
    Static(&'a ClientProperties),
    /// Discovered instances sharing one credential
    Discovered(&'a DiscoveredInstances),
}

impl ServerTargets<'_> {
    /// Number of candidate URIs.
    pub fn len(&self) -> usize {
        match self {
            Self::Static(properties) => properties.uri.len(),
            Self::Discovered(instances) => instances.uris.len(),
        }
    }

    /// Whether there is nothing to try.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured form of the URI at `index`, for diagnostics.
    pub fn raw_uri(&self, index: usize) -> &str {
        let uris = match self {
            Self::Static(properties) => &properties.uri,
            Self::Discovered(instances) => &instances.uris,
        };
        uris.get(index).map(String::as_str).unwrap_or_default()
    }

    /// Resolve the base URL and credential for the URI at `index`.
    pub fn credentials(&self, index: usize) -> Result<Credentials, FetchError> {
        match self {
            Self::Static(properties) => properties.credentials(index),
            Self::Discovered(instances) => {
                let raw = instances.uris.get(index).ok_or_else(|| {
                    FetchError::Configuration(format!("no discovered instance at index {}", index))
                })?;
                let mut credentials = extract_credentials(raw, None, None)?;
                credentials.username = instances.username.clone();
                credentials.password = instances.password.clone();
                Ok(credentials)
            }
        }
    }
}

/// Fetch one environment, walking `targets` in order.
///
/// * 200: the parsed environment is returned and no further URI is tried.
/// * 404: the next URI is tried, under any strategy.
/// * any other status (or an unparseable 200 body): the next URI is tried only
///   under [`MultipleUriStrategy::Always`] and only if one remains.
/// * connection failure: the next URI is tried if one remains.
///
/// Running out of URIs after 404s yields `Ok(None)`.
///
/// # Errors
///
/// Returns the failure that stopped the walk.
pub async fn fetch_environment(
    transport: &dyn ConfigTransport,
    properties: &ClientProperties,
    targets: ServerTargets<'_>,
    request: EnvironmentRequest<'_>,
    state: Option<&str>,
) -> Result<Option<Environment>, FetchError> {
    let count = targets.len();
    let headers = base_headers(properties, state)?;

    for index in 0..count {
        let last = index + 1 == count;
        let credentials = targets.credentials(index)?;
        let url = environment_url(&credentials.uri, request)?;

        let mut request_headers = headers.clone();
        if let Some(authorization) = authorization(properties, &credentials)? {
            request_headers.push((AUTHORIZATION.to_string(), authorization));
        }
        let config_request = ConfigRequest {
            url,
            headers: request_headers,
        };
        let uri = config_request.url.to_string();
        debug!(uri = %uri, "Fetching environment");

        let error = match transport.get(&config_request).await {
            Ok(response) if response.status == 200 => {
                match serde_json::from_str::<Environment>(&response.body) {
                    Ok(environment) => return Ok(Some(environment)),
                    Err(e) => FetchError::MalformedResponse {
                        uri,
                        reason: e.to_string(),
                    },
                }
            }
            Ok(response) if response.status == 404 => FetchError::NotFound { uri },
            Ok(response) => FetchError::ServerError {
                uri,
                status: response.status,
                content_type: response.content_type,
                body: response.body,
            },
            Err(e) => FetchError::Transport {
                uri,
                reason: e.0,
            },
        };

        if let FetchError::NotFound { .. } = error {
            info!(
                uri = %targets.raw_uri(index),
                "Failed to fetch configs from server. Will try next URL if available."
            );
            continue;
        }
        if !last && try_next(&error, properties.multiple_uri_strategy) {
            info!(
                uri = %targets.raw_uri(index),
                error = %error,
                "Failed to fetch configs from server. Will try next URL if available."
            );
            continue;
        }
        return Err(error);
    }

    Ok(None)
}

/// Whether a failure other than 404 lets the walk move on to a remaining URI.
fn try_next(error: &FetchError, strategy: MultipleUriStrategy) -> bool {
    match error {
        FetchError::Transport { .. } => true,
        error if error.is_server_error() => strategy == MultipleUriStrategy::Always,
        _ => false,
    }
}

/// Build `{base}/{name}/{profiles}[/{label}]` with each part as one encoded segment.
pub fn environment_url(base: &Url, request: EnvironmentRequest<'_>) -> Result<Url, FetchError> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|_| FetchError::InvalidUri {
            uri: base.to_string(),
            reason: "URI cannot be used as a base".to_string(),
        })?;
        segments.pop_if_empty().push(request.name).push(request.profiles);
        if has_text(request.label) {
            segments.push(&denormalize(request.label));
        }
    }
    Ok(url)
}

/// Headers shared by every URI of one fetch.
///
/// Every header is validated here; a malformed one is a configuration error
/// raised before any URI is tried.
fn base_headers(
    properties: &ClientProperties,
    state: Option<&str>,
) -> Result<Vec<(String, String)>, FetchError> {
    let mut headers = vec![
        ("Accept".to_string(), properties.media_type.clone()),
        ("Accept-Charset".to_string(), properties.charset.clone()),
    ];
    if let Some(token) = properties.token.as_deref().filter(|t| has_text(t)) {
        headers.push((TOKEN_HEADER.to_string(), token.to_string()));
    }
    if properties.send_state {
        if let Some(state) = state.filter(|s| has_text(s)) {
            headers.push((STATE_HEADER.to_string(), state.to_string()));
        }
    }

    let mut custom: Vec<_> = properties
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    custom.sort();
    for (name, value) in headers.iter().chain(&custom) {
        validate_header(name, value)?;
    }
    headers.extend(
        custom
            .into_iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(AUTHORIZATION)),
    );
    Ok(headers)
}

fn validate_header(name: &str, value: &str) -> Result<(), FetchError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        FetchError::Configuration(format!("Invalid header name '{}': {}", name, e))
    })?;
    HeaderValue::from_str(value).map_err(|e| {
        FetchError::Configuration(format!("Invalid value for header '{}': {}", name, e))
    })?;
    Ok(())
}

/// The Authorization header for one URI, if any.
///
/// A password produces basic authentication. Without one, a custom
/// `Authorization` header is sent as-is.
fn authorization(
    properties: &ClientProperties,
    credentials: &Credentials,
) -> Result<Option<String>, FetchError> {
    let custom = properties
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION))
        .map(|(_, value)| value.clone());

    match (&credentials.password, custom) {
        (Some(_), Some(_)) => Err(FetchError::Configuration(
            "You must set either 'password' or 'authorization'".to_string(),
        )),
        (Some(password), None) => {
            let username = credentials.username.as_deref().unwrap_or_default();
            let token = STANDARD.encode(format!("{}:{}", username, password));
            Ok(Some(format!("Basic {}", token)))
        }
        (None, custom) => Ok(custom),
    }
}

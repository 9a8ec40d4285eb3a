//! Error types for confhub.

/// Result type alias for confhub operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when resolving or serving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to load configuration from a source.
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    /// Failed to deserialize configuration.
    #[error("Failed to deserialize configuration: {0}")]
    DeserializationError(String),

    /// A remote fetch failed and was not absorbed by the failure policy.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// No configuration could be located and the client must not proceed.
    ///
    /// Raised when the client is configured to fail fast or the requested
    /// resource is not optional.
    #[error("{message}")]
    FailFast {
        /// Human-readable reason, including any JSON error body from the server
        message: String,
        /// The last fetch error, if one was encountered
        #[source]
        cause: Option<FetchError>,
    },

    /// Interaction with a Vault server failed.
    #[error("Vault error: {0}")]
    Vault(String),

    /// Settings are missing or contradictory.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Generic error for other cases.
    #[error("Configuration error: {0}")]
    Other(String),
}

/// Failure of a single round trip to a config server.
///
/// The fetch strategy classifies every non-200 outcome into one of these and
/// decides whether to move on to the next URI or stop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// The server does not know the requested environment (HTTP 404).
    #[error("No environment found at {uri}")]
    NotFound {
        /// URL that was requested
        uri: String,
    },

    /// The server answered with a status other than 200 or 404.
    #[error("Config server at {uri} responded with status {status}")]
    ServerError {
        /// URL that was requested
        uri: String,
        /// HTTP status code
        status: u16,
        /// Content type of the error body, if the server sent one
        content_type: Option<String>,
        /// Raw error body
        body: String,
    },

    /// The server could not be reached (refused, timed out, DNS).
    #[error("Connection to {uri} failed: {reason}")]
    Transport {
        /// URL that was requested
        uri: String,
        /// Underlying transport failure
        reason: String,
    },

    /// The server answered 200 with a body that is not an environment.
    #[error("Malformed environment from {uri}: {reason}")]
    MalformedResponse {
        /// URL that was requested
        uri: String,
        /// Parse failure
        reason: String,
    },

    /// A configured server URI could not be turned into a request URL.
    #[error("Invalid config server URI '{uri}': {reason}")]
    InvalidUri {
        /// The configured URI
        uri: String,
        /// Why it was rejected
        reason: String,
    },

    /// Request settings contradict each other.
    #[error("Invalid client configuration: {0}")]
    Configuration(String),
}

impl FetchError {
    /// Whether this failure is treated like an HTTP-level server error.
    ///
    /// Malformed bodies count as server errors.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ServerError { .. } | Self::MalformedResponse { .. })
    }

    /// The response body of a 5xx error, when the server declared it as JSON.
    pub fn json_body(&self) -> Option<&str> {
        match self {
            Self::ServerError {
                status,
                content_type: Some(content_type),
                body,
                ..
            } if (500..600).contains(status) && is_json(content_type) => Some(body),
            _ => None,
        }
    }
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error(status: u16, content_type: Option<&str>) -> FetchError {
        FetchError::ServerError {
            uri: "http://a/app/default".to_string(),
            status,
            content_type: content_type.map(str::to_string),
            body: r#"{"error":"boom"}"#.to_string(),
        }
    }

    #[test]
    fn test_json_body_only_for_json_server_errors() {
        assert_eq!(
            server_error(500, Some("application/json;charset=UTF-8")).json_body(),
            Some(r#"{"error":"boom"}"#)
        );
        assert_eq!(server_error(500, Some("text/html")).json_body(), None);
        assert_eq!(server_error(500, None).json_body(), None);
        assert_eq!(server_error(400, Some("application/json")).json_body(), None);
    }

    #[test]
    fn test_malformed_counts_as_server_error() {
        let err = FetchError::MalformedResponse {
            uri: "http://a".to_string(),
            reason: "expected value".to_string(),
        };
        assert!(err.is_server_error());
        assert!(
            !FetchError::Transport {
                uri: "http://a".to_string(),
                reason: "refused".to_string()
            }
            .is_server_error()
        );
    }
}

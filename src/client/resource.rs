//! Config server import resources.

use super::properties::{ClientProperties, DEFAULT_PROFILE};
use crate::environment::split_list;
use crate::error::{ConfigError, Result};
use std::fmt;

const OPTIONAL_PREFIX: &str = "optional:";
const CONFIGSERVER_PREFIX: &str = "configserver:";

/// One request for remote configuration.
///
/// # Examples
///
/// ```rust
/// use confhub::client::{ClientProperties, ConfigServerResource};
///
/// # fn example() -> confhub::error::Result<()> {
/// let resource = ConfigServerResource::from_location(
///     "optional:configserver:http://cfg-a:8888,http://cfg-b:8888",
///     ClientProperties::default(),
///     vec!["prod".to_string()],
/// )?;
/// assert!(resource.is_optional());
/// assert_eq!(resource.properties().uri.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigServerResource {
    properties: ClientProperties,
    accepted_profiles: Vec<String>,
    optional: bool,
}

impl ConfigServerResource {
    /// Create a required resource.
    pub fn new(properties: ClientProperties, accepted_profiles: Vec<String>) -> Self {
        Self {
            properties,
            accepted_profiles,
            optional: false,
        }
    }

    /// Mark the resource optional or required.
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Parse `[optional:]configserver:[uri1,uri2,...]`.
    ///
    /// URIs in the location replace those in `properties`; an empty list keeps them.
    ///
    /// # Errors
    ///
    /// Returns an error if the location does not use the `configserver:` prefix.
    pub fn from_location(
        location: &str,
        mut properties: ClientProperties,
        accepted_profiles: Vec<String>,
    ) -> Result<Self> {
        let (optional, rest) = match location.strip_prefix(OPTIONAL_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, location),
        };
        let uris = rest.strip_prefix(CONFIGSERVER_PREFIX).ok_or_else(|| {
            ConfigError::InvalidConfiguration(format!(
                "'{}' is not a config server location",
                location
            ))
        })?;

        let uris = split_list(uris);
        if !uris.is_empty() {
            properties.uri = uris;
        }
        Ok(Self::new(properties, accepted_profiles).with_optional(optional))
    }

    /// Client settings for this resource.
    pub fn properties(&self) -> &ClientProperties {
        &self.properties
    }

    /// Profiles accepted by the caller, most specific first.
    pub fn accepted_profiles(&self) -> &[String] {
        &self.accepted_profiles
    }

    /// Whether failing to locate configuration is acceptable.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// The profile segment of the request path.
    ///
    /// The accepted profiles joined by commas, or the configured profile when
    /// none were accepted.
    pub fn profiles(&self) -> String {
        if self.accepted_profiles.is_empty() {
            let configured = self.properties.profile.trim();
            if configured.is_empty() {
                DEFAULT_PROFILE.to_string()
            } else {
                configured.to_string()
            }
        } else {
            self.accepted_profiles.join(",")
        }
    }
}

impl fmt::Display for ConfigServerResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConfigServerResource{{uris=[{}], optional={}, profiles=[{}]}}",
            self.properties.uri.join(", "),
            self.optional,
            self.accepted_profiles.join(", ")
        )
    }
}

//! Layered configuration assembled from a located environment.

use crate::environment::{Environment, PropertyValue, translate_origins};
use crate::error::{ConfigError, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::properties::DEFAULT_PROFILE;

/// Name of the marker layer present on every successful resolution.
pub const CONFIG_CLIENT_SOURCE_NAME: &str = "configClient";

/// Prefix applied to the name of every layer received from a server.
pub const SOURCE_NAME_PREFIX: &str = "configserver:";

/// Layer name of server-side overrides, always treated as profile specific.
pub const OVERRIDES_NAME: &str = "configserver:overrides";

/// Key of the state token in the marker layer.
pub const STATE_KEY: &str = "config.client.state";

/// Key of the backend version in the marker layer.
pub const VERSION_KEY: &str = "config.client.version";

/// How a layer participates in the surrounding layered merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precedence {
    /// Visible for every profile
    General,
    /// Visible only for a matching profile, above general layers
    ProfileSpecific,
}

/// One named layer of resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    name: String,
    properties: BTreeMap<String, PropertyValue>,
    precedence: Precedence,
}

impl Layer {
    /// Layer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a property.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// All properties.
    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    /// Precedence classification.
    pub fn precedence(&self) -> Precedence {
        self.precedence
    }

    /// Shorthand for `precedence() == Precedence::ProfileSpecific`.
    pub fn is_profile_specific(&self) -> bool {
        self.precedence == Precedence::ProfileSpecific
    }
}

/// Configuration resolved from a config server.
///
/// Layers are kept in ascending priority: the first layer is the
/// `configClient` marker and the last one is the server's highest-precedence
/// property source.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigData {
    layers: Vec<Layer>,
}

impl ConfigData {
    /// Layers in ascending priority.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Layers from the highest priority down.
    pub fn layers_by_precedence(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().rev()
    }

    /// Look up a layer by name.
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Look up a property the way the layered merge would.
    ///
    /// Profile-specific layers are consulted before general ones; within each
    /// group higher-priority layers win.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        let profile_specific = self.layers_by_precedence().filter(|l| l.is_profile_specific());
        let general = self.layers_by_precedence().filter(|l| !l.is_profile_specific());
        profile_specific.chain(general).find_map(|l| l.get(key))
    }

    /// The state token the server returned, if any.
    pub fn state(&self) -> Option<&str> {
        self.marker_value(STATE_KEY)
    }

    /// The backend version the server returned, if any.
    pub fn version(&self) -> Option<&str> {
        self.marker_value(VERSION_KEY)
    }

    fn marker_value(&self, key: &str) -> Option<&str> {
        self.layer(CONFIG_CLIENT_SOURCE_NAME)
            .and_then(|l| l.get(key))
            .and_then(PropertyValue::as_str)
    }

    /// Merge all layers and deserialize them into `T`.
    ///
    /// General layers are applied first, then profile-specific ones, each in
    /// ascending priority, so later layers override earlier ones.
    ///
    /// # Errors
    ///
    /// Returns an error if a key cannot be merged or deserialization fails.
    pub fn try_deserialize<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let general = self.layers.iter().filter(|l| !l.is_profile_specific());
        let profile_specific = self.layers.iter().filter(|l| l.is_profile_specific());

        let mut builder = config::Config::builder();
        for layer in general.chain(profile_specific) {
            for (key, value) in &layer.properties {
                builder = builder
                    .set_override(key.as_str(), to_config_value(value.value(), &layer.name))
                    .map_err(|e| {
                        ConfigError::LoadError(format!(
                            "Failed to merge layer '{}': {}",
                            layer.name, e
                        ))
                    })?;
            }
        }

        let config = builder
            .build()
            .map_err(|e| ConfigError::LoadError(format!("Failed to build configuration: {}", e)))?;

        config.try_deserialize::<T>().map_err(|e| {
            ConfigError::DeserializationError(format!("Failed to deserialize configuration: {}", e))
        })
    }
}

/// Turn a located environment into layered configuration.
///
/// Each property source is inserted at the head of the list as it is
/// processed, then the marker layer is inserted ahead of everything, so the
/// server's first source ends up with the highest priority.
pub fn assemble(environment: &Environment, accepted_profiles: &[String]) -> ConfigData {
    let matchers = ProfileMatchers::new(accepted_profiles);
    let mut layers = Vec::with_capacity(environment.property_sources.len() + 1);

    for source in &environment.property_sources {
        let name = format!("{}{}", SOURCE_NAME_PREFIX, source.name);
        let precedence = matchers.classify(&name);
        layers.insert(
            0,
            Layer {
                properties: translate_origins(&source.name, source.source.clone()),
                name,
                precedence,
            },
        );
    }

    let mut marker = BTreeMap::new();
    for (key, value) in [(STATE_KEY, &environment.state), (VERSION_KEY, &environment.version)] {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            marker.insert(key.to_string(), PropertyValue::Raw(JsonValue::String(value.to_string())));
        }
    }
    // The marker layer is what tells callers the fetch succeeded.
    layers.insert(
        0,
        Layer {
            name: CONFIG_CLIENT_SOURCE_NAME.to_string(),
            properties: marker,
            precedence: Precedence::General,
        },
    );

    ConfigData { layers }
}

/// Profile-name matchers for the accepted, non-default profiles.
struct ProfileMatchers {
    patterns: Vec<Regex>,
}

impl ProfileMatchers {
    fn new(accepted_profiles: &[String]) -> Self {
        let patterns = accepted_profiles
            .iter()
            .filter(|p| p.as_str() != DEFAULT_PROFILE)
            // Profile text is spliced into the pattern as-is.
            .filter_map(|p| match Regex::new(&format!(r"^.*[-,]{}\b.*$", p)) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    debug!(profile = %p, error = %e, "Profile is not a valid pattern; never matches");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    fn classify(&self, layer_name: &str) -> Precedence {
        if layer_name == OVERRIDES_NAME || self.patterns.iter().any(|re| re.is_match(layer_name)) {
            Precedence::ProfileSpecific
        } else {
            Precedence::General
        }
    }
}

/// Classify a layer name against the accepted profiles.
pub fn classify(layer_name: &str, accepted_profiles: &[String]) -> Precedence {
    ProfileMatchers::new(accepted_profiles).classify(layer_name)
}

/// Convert a JSON value to a config::Value tagged with its layer.
fn to_config_value(value: &JsonValue, layer: &str) -> config::Value {
    let origin = layer.to_string();
    let kind = match value {
        JsonValue::Null => config::ValueKind::Nil,
        JsonValue::Bool(b) => config::ValueKind::Boolean(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                config::ValueKind::I64(i)
            } else if let Some(u) = n.as_u64() {
                config::ValueKind::U64(u)
            } else {
                config::ValueKind::Float(n.as_f64().unwrap_or_default())
            }
        }
        JsonValue::String(s) => config::ValueKind::String(s.clone()),
        JsonValue::Array(items) => {
            config::ValueKind::Array(items.iter().map(|item| to_config_value(item, layer)).collect())
        }
        JsonValue::Object(map) => {
            let table: HashMap<String, config::Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), to_config_value(v, layer)))
                .collect();
            config::ValueKind::Table(table)
        }
    };
    config::Value::new(Some(&origin), kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::PropertySource;
    use serde::Deserialize;
    use serde_json::{Map, json};

    fn source(name: &str, value: JsonValue) -> PropertySource {
        let map: Map<String, JsonValue> = match value {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        PropertySource::new(name, map)
    }

    fn profiles(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn environment() -> Environment {
        let mut env = Environment::new("app", profiles(&["dev"]));
        env.version = Some("abc123".to_string());
        env.state = Some("s1".to_string());
        env.add(source("file:app-dev.yml", json!({"server.port": 9090})));
        env.add(source("file:app.yml", json!({"server.port": 8080, "server.host": "localhost"})));
        env
    }

    #[test]
    fn test_layer_order_and_marker() {
        let data = assemble(&environment(), &profiles(&["dev"]));
        let names: Vec<_> = data.layers().iter().map(Layer::name).collect();

        assert_eq!(
            names,
            vec!["configClient", "configserver:file:app.yml", "configserver:file:app-dev.yml"]
        );
        assert_eq!(data.state(), Some("s1"));
        assert_eq!(data.version(), Some("abc123"));
    }

    #[test]
    fn test_marker_omits_empty_values() {
        let mut env = environment();
        env.state = Some("  ".to_string());
        env.version = None;

        let data = assemble(&env, &[]);
        let marker = data.layer(CONFIG_CLIENT_SOURCE_NAME).unwrap();
        assert!(marker.properties().is_empty());
        assert_eq!(data.state(), None);
    }

    #[test]
    fn test_empty_environment_still_has_marker() {
        let data = assemble(&Environment::new("app", vec![]), &[]);
        assert_eq!(data.layers().len(), 1);
        assert_eq!(data.layers()[0].name(), CONFIG_CLIENT_SOURCE_NAME);
    }

    #[test]
    fn test_profile_specific_classification() {
        let accepted = profiles(&["dev"]);
        assert_eq!(classify("configserver:file:app-dev.yml", &accepted), Precedence::ProfileSpecific);
        assert_eq!(classify("configserver:vault:app,dev", &accepted), Precedence::ProfileSpecific);
        assert_eq!(classify("configserver:file:app.yml", &accepted), Precedence::General);
        assert_eq!(classify("configserver:file:app-devops.yml", &accepted), Precedence::General);
        assert_eq!(classify("configserver:file:dev.yml", &accepted), Precedence::General);
    }

    #[test]
    fn test_default_profile_never_matches() {
        let accepted = profiles(&["default"]);
        assert_eq!(classify("configserver:file:app-default.yml", &accepted), Precedence::General);
    }

    #[test]
    fn test_overrides_always_profile_specific() {
        assert_eq!(classify(OVERRIDES_NAME, &[]), Precedence::ProfileSpecific);
        assert_eq!(classify(OVERRIDES_NAME, &profiles(&["default"])), Precedence::ProfileSpecific);
    }

    #[test]
    fn test_invalid_profile_pattern_never_matches() {
        let accepted = profiles(&["dev("]);
        assert_eq!(classify("configserver:app-dev(", &accepted), Precedence::General);
    }

    #[test]
    fn test_get_prefers_profile_specific_layers() {
        let data = assemble(&environment(), &profiles(&["dev"]));

        assert_eq!(data.get("server.port").unwrap().value(), &json!(9090));
        assert_eq!(data.get("server.host").unwrap().value(), &json!("localhost"));
        assert!(data.get("missing").is_none());
    }

    #[test]
    fn test_origins_are_translated() {
        let mut env = Environment::new("app", vec![]);
        env.add(source(
            "app.yml",
            json!({"a": {"origin": "app.yml:1:4", "value": "x"}}),
        ));

        let data = assemble(&env, &[]);
        let origin = data.get("a").unwrap().origin().unwrap();
        assert_eq!(origin.source_name, "app.yml");
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct ServerConfig {
        port: u16,
        host: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct AppConfig {
        server: ServerConfig,
    }

    #[test]
    fn test_try_deserialize_applies_precedence() {
        let data = assemble(&environment(), &profiles(&["dev"]));
        let config: AppConfig = data.try_deserialize().unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "localhost");
    }

    #[test]
    fn test_try_deserialize_without_profile_match() {
        let data = assemble(&environment(), &[]);
        let config: AppConfig = data.try_deserialize().unwrap();

        // Without an accepted profile both layers are general and the server's
        // first source still has the highest priority.
        assert_eq!(config.server.port, 9090);
    }
}

//! The environment model exchanged between config servers and clients.
//!
//! An [`Environment`] is one snapshot of configuration for an application,
//! a set of profiles and a label. Its property sources are ordered from the
//! highest precedence to the lowest.

mod origin;

pub use origin::{Origin, OriginTrackedValue, PropertyValue, translate_origins};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Token used on the wire in place of `/` inside a label.
const SLASH_PLACEHOLDER: &str = "(_)";

/// A configuration snapshot as served by a config server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Application name
    pub name: String,
    /// Profiles the snapshot was resolved for
    #[serde(default, deserialize_with = "null_as_default")]
    pub profiles: Vec<String>,
    /// Label (branch, tag or commit) the snapshot was resolved from
    #[serde(default)]
    pub label: Option<String>,
    /// Backend revision identifier
    #[serde(default)]
    pub version: Option<String>,
    /// Opaque state token for sticky resolution
    #[serde(default)]
    pub state: Option<String>,
    /// Property sources, highest precedence first
    #[serde(default, deserialize_with = "null_as_default")]
    pub property_sources: Vec<PropertySource>,
}

impl Environment {
    /// Create an empty environment for an application and profiles.
    pub fn new(name: impl Into<String>, profiles: Vec<String>) -> Self {
        Self {
            name: name.into(),
            profiles,
            label: None,
            version: None,
            state: None,
            property_sources: Vec::new(),
        }
    }

    /// Set the label.
    pub fn with_label(mut self, label: Option<&str>) -> Self {
        self.label = label.map(str::to_string);
        self
    }

    /// Append a property source with lower precedence than the existing ones.
    pub fn add(&mut self, source: PropertySource) {
        self.property_sources.push(source);
    }

    /// Append several property sources, keeping their order.
    pub fn add_all(&mut self, sources: impl IntoIterator<Item = PropertySource>) {
        self.property_sources.extend(sources);
    }

    /// Insert a property source ahead of all existing ones.
    pub fn add_first(&mut self, source: PropertySource) {
        self.property_sources.insert(0, source);
    }

    /// Total number of properties across all sources.
    pub fn property_count(&self) -> usize {
        self.property_sources.iter().map(|s| s.source.len()).sum()
    }
}

/// One named group of properties, e.g. one file or one Vault path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySource {
    /// Source name
    pub name: String,
    /// Raw key/value pairs
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: Map<String, JsonValue>,
}

impl PropertySource {
    /// Create a property source.
    pub fn new(name: impl Into<String>, source: Map<String, JsonValue>) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

/// Replace the wire placeholder `(_)` with `/` in a label.
pub fn normalize(label: &str) -> String {
    label.replace(SLASH_PLACEHOLDER, "/")
}

/// Replace `/` with the wire placeholder `(_)` so a label fits in one path segment.
pub fn denormalize(label: &str) -> String {
    label.replace('/', SLASH_PLACEHOLDER)
}

/// Split a comma-delimited list, trimming entries and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Flatten a nested JSON document into dotted keys.
///
/// Objects contribute `parent.child` keys and arrays `parent[index]` keys.
/// Scalars at the root are stored under an empty key.
pub fn flatten(value: JsonValue) -> Map<String, JsonValue> {
    let mut out = Map::new();
    flatten_into(&mut out, String::new(), value);
    out
}

fn flatten_into(out: &mut Map<String, JsonValue>, prefix: String, value: JsonValue) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(out, path, child);
            }
        }
        JsonValue::Array(items) if !items.is_empty() => {
            for (index, child) in items.into_iter().enumerate() {
                flatten_into(out, format!("{}[{}]", prefix, index), child);
            }
        }
        other => {
            out.insert(prefix, other);
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_wire_shape() {
        let env: Environment = serde_json::from_value(json!({
            "name": "app",
            "profiles": ["dev"],
            "label": "main",
            "version": "abc123",
            "state": null,
            "propertySources": [
                {"name": "app-dev.yml", "source": {"server.port": 8080}},
                {"name": "app.yml", "source": {"server.port": 80, "debug": true}}
            ]
        }))
        .unwrap();

        assert_eq!(env.name, "app");
        assert_eq!(env.label.as_deref(), Some("main"));
        assert_eq!(env.version.as_deref(), Some("abc123"));
        assert_eq!(env.state, None);
        assert_eq!(env.property_sources.len(), 2);
        assert_eq!(env.property_sources[0].name, "app-dev.yml");
        assert_eq!(env.property_count(), 3);
    }

    #[test]
    fn test_null_property_sources_read_as_empty() {
        let env: Environment = serde_json::from_value(json!({
            "name": "app",
            "profiles": null,
            "propertySources": null
        }))
        .unwrap();

        assert!(env.profiles.is_empty());
        assert!(env.property_sources.is_empty());
    }

    #[test]
    fn test_label_normalization() {
        assert_eq!(denormalize("feature/login"), "feature(_)login");
        assert_eq!(normalize("feature(_)login"), "feature/login");
        assert_eq!(denormalize("main"), "main");
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" dev, prod ,,"), vec!["dev", "prod"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_flatten_nested_document() {
        let flat = flatten(json!({
            "server": {"port": 8080, "hosts": ["a", "b"]},
            "debug": true,
            "empty": []
        }));

        assert_eq!(flat["server.port"], json!(8080));
        assert_eq!(flat["server.hosts[0]"], json!("a"));
        assert_eq!(flat["server.hosts[1]"], json!("b"));
        assert_eq!(flat["debug"], json!(true));
        assert_eq!(flat["empty"], json!([]));
    }

    #[test]
    fn test_add_first_takes_precedence() {
        let mut env = Environment::new("app", vec![]);
        env.add(PropertySource::new("b", Map::new()));
        env.add_first(PropertySource::new("a", Map::new()));

        let names: Vec<_> = env.property_sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}

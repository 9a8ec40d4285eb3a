//! Origin tracking for property values served by a config server.

use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

const ORIGIN_KEY: &str = "origin";
const VALUE_KEY: &str = "value";

/// Where a served value came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    /// Name of the property source on the server
    pub source_name: String,
    /// Server-provided locator, e.g. `"application.yml:3:9"`
    pub locator: JsonValue,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.locator {
            JsonValue::String(locator) => write!(f, "Config Server {}:{}", self.source_name, locator),
            other => write!(f, "Config Server {}:{}", self.source_name, other),
        }
    }
}

/// A value paired with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginTrackedValue {
    /// The payload
    pub value: JsonValue,
    /// Where it came from
    pub origin: Origin,
}

/// A property value as held by a resolved layer.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Passed through from the wire unchanged
    Raw(JsonValue),
    /// Unwrapped from an `{origin, value}` pair
    Tracked(OriginTrackedValue),
}

impl PropertyValue {
    /// The payload, regardless of tracking.
    pub fn value(&self) -> &JsonValue {
        match self {
            Self::Raw(value) => value,
            Self::Tracked(tracked) => &tracked.value,
        }
    }

    /// The origin, if the server reported one.
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            Self::Raw(_) => None,
            Self::Tracked(tracked) => Some(&tracked.origin),
        }
    }

    /// The payload as a string slice, if it is a JSON string.
    pub fn as_str(&self) -> Option<&str> {
        self.value().as_str()
    }
}

impl From<JsonValue> for PropertyValue {
    fn from(value: JsonValue) -> Self {
        Self::Raw(value)
    }
}

/// Unwrap `{origin, value}` pairs in a property source into origin-tracked values.
///
/// An entry is unwrapped only when its value is an object with exactly the two
/// keys `origin` and `value`. Every other entry passes through untouched, so a
/// user map that happens to have that shape is unwrapped as well.
pub fn translate_origins(name: &str, source: Map<String, JsonValue>) -> BTreeMap<String, PropertyValue> {
    source
        .into_iter()
        .map(|(key, value)| (key, tag(name, value)))
        .collect()
}

fn tag(name: &str, value: JsonValue) -> PropertyValue {
    match value {
        JsonValue::Object(mut map)
            if map.len() == 2 && map.contains_key(ORIGIN_KEY) && map.contains_key(VALUE_KEY) =>
        {
            let locator = map.remove(ORIGIN_KEY).unwrap_or(JsonValue::Null);
            let value = map.remove(VALUE_KEY).unwrap_or(JsonValue::Null);
            PropertyValue::Tracked(OriginTrackedValue {
                value,
                origin: Origin {
                    source_name: name.to_string(),
                    locator,
                },
            })
        }
        other => PropertyValue::Raw(other),
    }
}

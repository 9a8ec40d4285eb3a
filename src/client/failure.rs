//! What to do when no configuration could be located.

use super::resource::ConfigServerResource;
use crate::error::{ConfigError, FetchError};
use tracing::warn;

/// Terminal outcome of a resolution that did not succeed.
#[derive(Debug)]
pub enum Failure {
    /// Proceed without remote configuration; the warning has been logged.
    Soft,
    /// Abort.
    Fatal(ConfigError),
}

/// Why the label loop ended without a result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unresolved {
    /// Last fetch error, if the loop was stopped by one
    pub error: Option<FetchError>,
    /// Diagnostic body: a JSON error body or the list of labels tried
    pub body: Option<String>,
}

impl Unresolved {
    /// Every label was tried and none produced an environment.
    pub fn exhausted(labels: &[String]) -> Self {
        Self {
            error: None,
            body: Some(format!("None of labels [{}] found", labels.join(", "))),
        }
    }

    /// The loop was stopped by a fetch error.
    pub fn failed(error: FetchError) -> Self {
        Self {
            body: error.json_body().map(str::to_string),
            error: Some(error),
        }
    }

    /// Decide between soft and fatal failure.
    ///
    /// Only the fail-fast flag and the resource's optionality matter; the
    /// error is carried along as detail either way.
    pub fn into_failure(self, resource: &ConfigServerResource) -> Failure {
        let fail_fast = resource.properties().fail_fast;
        if fail_fast || !resource.is_optional() {
            let reason = if fail_fast {
                "the fail fast property is set"
            } else {
                "the resource is not optional"
            };
            let detail = self.body.map(|b| format!(": {}", b)).unwrap_or_default();
            return Failure::Fatal(ConfigError::FailFast {
                message: format!(
                    "Could not locate PropertySource and {}, failing{}",
                    reason, detail
                ),
                cause: self.error,
            });
        }

        let detail = match (&self.error, &self.body) {
            (Some(error), _) => error.to_string(),
            (None, Some(body)) => body.clone(),
            (None, None) => String::new(),
        };
        warn!("Could not locate PropertySource ({}): {}", resource, detail);
        Failure::Soft
    }
}

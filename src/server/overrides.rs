//! Fixed properties served ahead of everything else.

use super::EnvironmentRepository;
use crate::environment::{Environment, PropertySource};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

/// Name of the property source carrying server-side overrides.
///
/// Clients see it as `configserver:overrides`.
pub const OVERRIDES_SOURCE_NAME: &str = "overrides";

/// Wraps a repository and prepends a fixed `overrides` property source.
pub struct OverridesEnvironmentRepository<R> {
    delegate: R,
    overrides: Map<String, JsonValue>,
}

impl<R: EnvironmentRepository> OverridesEnvironmentRepository<R> {
    /// Wrap `delegate` with `overrides`.
    pub fn new(delegate: R, overrides: Map<String, JsonValue>) -> Self {
        Self {
            delegate,
            overrides,
        }
    }
}

#[async_trait]
impl<R: EnvironmentRepository> EnvironmentRepository for OverridesEnvironmentRepository<R> {
    async fn find_one(
        &self,
        application: &str,
        profile: &str,
        label: Option<&str>,
    ) -> Result<Environment> {
        let mut environment = self.delegate.find_one(application, profile, label).await?;
        if !self.overrides.is_empty() {
            environment.add_first(PropertySource::new(
                OVERRIDES_SOURCE_NAME,
                self.overrides.clone(),
            ));
        }
        Ok(environment)
    }

    fn name(&self) -> String {
        format!("overrides({})", self.delegate.name())
    }

    fn order(&self) -> i32 {
        self.delegate.order()
    }
}

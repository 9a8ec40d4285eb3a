//! Repository that merges several repositories.

use super::EnvironmentRepository;
use crate::environment::{Environment, split_list};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Merges the property sources of several repositories.
///
/// Repositories are consulted in ascending [`order`](EnvironmentRepository::order),
/// so the sources of a lower-order repository take precedence. With a single
/// repository its version and state pass through unchanged.
///
/// # Examples
///
/// ```rust,no_run
/// use confhub::server::{CompositeEnvironmentRepository, EnvironmentRepository, NativeEnvironmentRepository};
///
/// # async fn example() -> confhub::error::Result<()> {
/// let mut composite = CompositeEnvironmentRepository::new(true);
/// composite.add_repository(Box::new(NativeEnvironmentRepository::new(vec!["config".into()])));
///
/// let environment = composite.find_one("billing", "prod", None).await?;
/// println!("{} sources", environment.property_sources.len());
/// # Ok(())
/// # }
/// ```
pub struct CompositeEnvironmentRepository {
    repositories: Vec<Box<dyn EnvironmentRepository>>,
    fail_on_error: bool,
}

impl CompositeEnvironmentRepository {
    /// Create an empty composite.
    ///
    /// With `fail_on_error` a failing repository fails the whole lookup;
    /// otherwise it is skipped with a warning.
    pub fn new(fail_on_error: bool) -> Self {
        Self {
            repositories: Vec::new(),
            fail_on_error,
        }
    }

    /// Add a repository.
    pub fn add_repository(&mut self, repository: Box<dyn EnvironmentRepository>) {
        self.repositories.push(repository);
        self.repositories.sort_by_key(|r| r.order());
    }

    /// Add a repository, builder style.
    pub fn with_repository(mut self, repository: Box<dyn EnvironmentRepository>) -> Self {
        self.add_repository(repository);
        self
    }

    /// Names of the repositories in the order they are consulted.
    pub fn repository_names(&self) -> Vec<String> {
        self.repositories.iter().map(|r| r.name()).collect()
    }
}

#[async_trait]
impl EnvironmentRepository for CompositeEnvironmentRepository {
    async fn find_one(
        &self,
        application: &str,
        profile: &str,
        label: Option<&str>,
    ) -> Result<Environment> {
        if self.repositories.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "No environment repositories configured".to_string(),
            ));
        }

        let mut environment = Environment::new(application, split_list(profile)).with_label(label);

        if let [only] = self.repositories.as_slice() {
            let found = only.find_one(application, profile, label).await?;
            environment.add_all(found.property_sources);
            environment.version = found.version;
            environment.state = found.state;
            return Ok(environment);
        }

        for repository in &self.repositories {
            match repository.find_one(application, profile, label).await {
                Ok(found) => {
                    debug!(
                        repository = %repository.name(),
                        sources = found.property_sources.len(),
                        "Merged repository"
                    );
                    environment.add_all(found.property_sources);
                }
                Err(e) if self.fail_on_error => {
                    return Err(ConfigError::LoadError(format!(
                        "Failed to load repository '{}': {}",
                        repository.name(),
                        e
                    )));
                }
                Err(e) => {
                    warn!(repository = %repository.name(), error = %e, "Skipping failed repository");
                }
            }
        }
        Ok(environment)
    }

    fn name(&self) -> String {
        format!("composite[{}]", self.repository_names().join(", "))
    }

    fn order(&self) -> i32 {
        self.repositories
            .first()
            .map(|r| r.order())
            .unwrap_or(super::DEFAULT_ORDER)
    }
}

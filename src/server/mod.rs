//! Server-side environment repositories.
//!
//! A repository answers `find_one(application, profile, label)` with an
//! [`Environment`] whose property sources are ordered highest precedence
//! first. Repositories compose: [`CompositeEnvironmentRepository`] merges
//! several by order and [`OverridesEnvironmentRepository`] puts fixed
//! properties in front of another repository's answer.

use crate::environment::Environment;
use crate::error::Result;
use async_trait::async_trait;

mod composite;
#[cfg(feature = "native")]
mod native;
mod overrides;
#[cfg(feature = "vault")]
pub mod vault;

pub use composite::CompositeEnvironmentRepository;
#[cfg(feature = "native")]
pub use native::NativeEnvironmentRepository;
pub use overrides::{OVERRIDES_SOURCE_NAME, OverridesEnvironmentRepository};

/// Order of a repository that does not set one. Lowest precedence.
pub const DEFAULT_ORDER: i32 = i32::MAX;

/// Source of environments for the config server.
///
/// Implement this trait to serve configuration from a new backend.
#[async_trait]
pub trait EnvironmentRepository: Send + Sync {
    /// Locate the environment for `application` under the comma-separated
    /// `profile` list and an optional `label`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn find_one(
        &self,
        application: &str,
        profile: &str,
        label: Option<&str>,
    ) -> Result<Environment>;

    /// Human-readable name for logging.
    fn name(&self) -> String;

    /// Precedence among repositories; lower wins.
    fn order(&self) -> i32 {
        DEFAULT_ORDER
    }
}

#[async_trait]
impl<R: EnvironmentRepository + ?Sized> EnvironmentRepository for Box<R> {
    async fn find_one(
        &self,
        application: &str,
        profile: &str,
        label: Option<&str>,
    ) -> Result<Environment> {
        (**self).find_one(application, profile, label).await
    }

    fn name(&self) -> String {
        (**self).name()
    }

    fn order(&self) -> i32 {
        (**self).order()
    }
}

//! HashiCorp Vault repository.
//!
//! Secrets are read from a KV backend (version 1 or 2) at one path per key,
//! where keys combine the shared default key and the requested applications
//! with each profile. The Vault token is obtained once per repository through
//! the configured [`AuthenticationMethod`], or supplied per request.
//!
//! The HTTP client presents the configured key store to Vault and trusts the
//! roots of the configured trust store. Cloud logins (AWS, Azure, GCP, Cloud
//! Foundry) collect their identity material through
//! [`VaultOperations::fetch`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use confhub::server::EnvironmentRepository;
//! use confhub::server::vault::{VaultEnvironmentProperties, VaultEnvironmentRepository};
//!
//! # async fn example() -> confhub::error::Result<()> {
//! let properties = VaultEnvironmentProperties {
//!     kv_version: 2,
//!     token: Some("s.root".to_string()),
//!     ..Default::default()
//! };
//! let repository = VaultEnvironmentRepository::from_properties(properties)?;
//! let environment = repository.find_one("billing", "prod", None).await?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod cloud;
mod properties;
mod repository;
mod signing;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthenticationMethod, acquire_token};
pub use client::{
    ExternalRequest, NAMESPACE_HEADER, TOKEN_HEADER, VaultHttpClient, VaultOperations,
};
pub use properties::{
    AppRoleProperties, AwsEc2Properties, AwsIamProperties, AzureMsiProperties, GcpCredentials,
    GcpGceProperties, GcpIamProperties, KubernetesProperties, PcfProperties, SslProperties,
    VAULT_ENV_PREFIX, VaultEnvironmentProperties,
};
pub use repository::VaultEnvironmentRepository;

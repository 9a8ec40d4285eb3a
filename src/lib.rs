//! # confhub
//!
//! Client and server building blocks for centralized configuration.
//!
//! ## Overview
//!
//! `confhub` fetches externalized configuration from one or more config
//! servers and turns the answer into a layered, queryable model:
//! - Ordered server URIs with a configurable fallback strategy
//! - Candidate labels tried in order until one resolves
//! - Profile-specific vs. general precedence for every property source
//! - Origin tracking for values the server annotated
//! - Soft or fatal failure, decided by `fail_fast` and resource optionality
//!
//! The server side provides the repositories that answer those requests:
//! local files, HashiCorp Vault, and composites of both.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use confhub::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct AppConfig {
//!     server: ServerConfig,
//! }
//!
//! #[derive(Debug, Deserialize)]
//! struct ServerConfig {
//!     port: u16,
//! }
//!
//! # async fn example() -> confhub::error::Result<()> {
//! // File and CONFIG_CLIENT_* settings
//! let properties = ClientProperties::load(None)?;
//! let loader = ConfigServerLoader::for_properties(&properties)?;
//! let state = ClientState::new();
//!
//! let resource = ConfigServerResource::new(properties, vec!["prod".to_string()]);
//! if let Some(data) = loader.load(resource, state.snapshot()).await? {
//!     state.record(&data);
//!     let config: AppConfig = data.try_deserialize()?;
//!     println!("Server port: {}", config.server.port);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `native` (default): file-based [`server::NativeEnvironmentRepository`]
//! - `vault` (default): [`server::vault`] repository
//! - `metrics`: OpenTelemetry resolution metrics
//!
//! ```toml
//! [dependencies]
//! confhub = { version = "0.1", features = ["metrics"] }
//! ```

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod client;
pub mod environment;
pub mod error;
pub mod server;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::client::{
        ClientProperties, ClientState, ConfigData, ConfigServerLoader, ConfigServerResource,
        LoadContext, MultipleUriStrategy,
    };
    pub use crate::environment::{Environment, PropertySource, PropertyValue};
    pub use crate::error::{ConfigError, FetchError, Result};
    pub use crate::server::EnvironmentRepository;
}

//! Config server client.
//!
//! Resolves remote configuration from one or more config servers, walking
//! candidate labels and server URIs in order and applying the failure policy
//! when nothing is found.
//!
//! # Examples
//!
//! ```rust,no_run
//! use confhub::client::{ClientProperties, ConfigServerLoader, ConfigServerResource, LoadContext};
//!
//! # async fn example() -> confhub::error::Result<()> {
//! let properties = ClientProperties {
//!     name: "billing".to_string(),
//!     uri: vec!["http://cfg-a:8888".to_string(), "http://cfg-b:8888".to_string()],
//!     label: Some("release,main".to_string()),
//!     ..Default::default()
//! };
//!
//! let loader = ConfigServerLoader::for_properties(&properties)?;
//! let resource = ConfigServerResource::new(properties, vec!["prod".to_string()]);
//!
//! if let Some(data) = loader.load(resource, LoadContext::new()).await? {
//!     for layer in data.layers_by_precedence() {
//!         println!("{} ({} keys)", layer.name(), layer.properties().len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod assembly;
mod context;
mod failure;
mod fetch;
mod loader;
mod properties;
mod resource;
mod transport;

pub use assembly::{
    CONFIG_CLIENT_SOURCE_NAME, ConfigData, Layer, OVERRIDES_NAME, Precedence, SOURCE_NAME_PREFIX,
    STATE_KEY, VERSION_KEY,
    assemble, classify,
};
pub use context::{ClientState, DiscoveredInstances, LoadContext};
pub use failure::{Failure, Unresolved};
pub use fetch::{EnvironmentRequest, ServerTargets, environment_url, fetch_environment};
pub use loader::{
    ConfigServerLoader, ConfigServerLoaderBuilder, LoadRequest, ResolveFn, ResolveFuture,
    candidate_labels,
};
pub use properties::{
    ClientProperties, Credentials, DEFAULT_MEDIA_TYPE, DEFAULT_PROFILE, DiscoveryProperties,
    ENV_PREFIX, MultipleUriStrategy, STATE_HEADER, TOKEN_HEADER,
};
pub use resource::ConfigServerResource;
pub use transport::{ConfigRequest, ConfigTransport, HttpResponse, ReqwestTransport, TransportError};

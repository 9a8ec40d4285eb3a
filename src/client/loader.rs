//! Multi-label resolution against config servers.

use super::assembly::{ConfigData, assemble};
use super::context::{DiscoveredInstances, LoadContext};
use super::failure::{Failure, Unresolved};
use super::fetch::{EnvironmentRequest, ServerTargets, fetch_environment};
use super::properties::ClientProperties;
use super::resource::ConfigServerResource;
use super::transport::{ConfigTransport, ReqwestTransport};
use crate::environment::Environment;
use crate::error::{FetchError, Result};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(feature = "metrics")]
use crate::metrics::ClientMetrics;

/// Future returned by a [`ResolveFn`].
pub type ResolveFuture = Pin<Box<dyn Future<Output = Result<Option<ConfigData>>> + Send>>;

/// A complete resolution step, possibly wrapped by interceptors.
pub type ResolveFn = Arc<dyn Fn(LoadRequest) -> ResolveFuture + Send + Sync>;

type Interceptor = Box<dyn FnOnce(ResolveFn) -> ResolveFn + Send>;

/// Inputs of one resolution call.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// What to resolve
    pub resource: Arc<ConfigServerResource>,
    /// State token and discovered servers
    pub context: LoadContext,
}

/// Resolves remote configuration for config server resources.
///
/// # Examples
///
/// ```rust,no_run
/// use confhub::client::{ClientProperties, ClientState, ConfigServerLoader, ConfigServerResource};
///
/// # async fn example() -> confhub::error::Result<()> {
/// let properties = ClientProperties::load(None)?;
/// let loader = ConfigServerLoader::for_properties(&properties)?;
/// let state = ClientState::new();
///
/// let resource = ConfigServerResource::new(properties, vec!["prod".to_string()]);
/// if let Some(data) = loader.load(resource, state.snapshot()).await? {
///     state.record(&data);
///     println!("port = {:?}", data.get("server.port"));
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConfigServerLoader {
    core: Arc<LoaderCore>,
    resolve: ResolveFn,
}

impl ConfigServerLoader {
    /// Create a new builder.
    pub fn builder() -> ConfigServerLoaderBuilder {
        ConfigServerLoaderBuilder::new()
    }

    /// Create a loader over a transport, without interceptors.
    pub fn new<T: ConfigTransport + 'static>(transport: T) -> Self {
        Self::builder().with_transport(transport).build_with_default()
    }

    /// Create a loader with a `reqwest` transport using the timeouts in `properties`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn for_properties(properties: &ClientProperties) -> Result<Self> {
        let transport = ReqwestTransport::new(properties.connect_timeout(), properties.read_timeout())?;
        Ok(Self::new(transport))
    }

    /// Resolve a resource through the interceptor chain.
    ///
    /// Returns `Ok(None)` on a soft failure.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ConfigError::FailFast`] when nothing could be
    /// located and the client fails fast or the resource is required.
    pub async fn load(
        &self,
        resource: ConfigServerResource,
        context: LoadContext,
    ) -> Result<Option<ConfigData>> {
        (self.resolve)(LoadRequest {
            resource: Arc::new(resource),
            context,
        })
        .await
    }

    /// Resolve a resource, bypassing interceptors.
    pub async fn resolve(
        &self,
        resource: &ConfigServerResource,
        context: &LoadContext,
    ) -> Result<Option<ConfigData>> {
        self.core.resolve(resource, context).await
    }
}

impl fmt::Debug for ConfigServerLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigServerLoader").finish_non_exhaustive()
    }
}

/// Builder for [`ConfigServerLoader`].
pub struct ConfigServerLoaderBuilder {
    transport: Option<Arc<dyn ConfigTransport>>,
    interceptors: Vec<Interceptor>,
    #[cfg(feature = "metrics")]
    metrics: Option<ClientMetrics>,
}

impl ConfigServerLoaderBuilder {
    /// Create a builder with no transport and no interceptors.
    pub fn new() -> Self {
        Self {
            transport: None,
            interceptors: Vec::new(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Use `transport` for every request.
    pub fn with_transport<T: ConfigTransport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use a shared transport for every request.
    pub fn with_shared_transport(mut self, transport: Arc<dyn ConfigTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Wrap the resolution step.
    ///
    /// `wrap` receives the next step and returns the step to run in its place.
    /// Interceptors are composed once, in [`build`](Self::build); the first one
    /// registered sits closest to the actual resolution.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use confhub::client::{ConfigServerLoader, LoadRequest, ResolveFn, ResolveFuture};
    /// use std::sync::Arc;
    ///
    /// let builder = ConfigServerLoader::builder().with_interceptor(|next: ResolveFn| -> ResolveFn {
    ///     Arc::new(move |request: LoadRequest| -> ResolveFuture {
    ///         let next = Arc::clone(&next);
    ///         Box::pin(async move {
    ///             println!("resolving {}", request.resource);
    ///             next(request).await
    ///         })
    ///     })
    /// });
    /// ```
    pub fn with_interceptor<F>(mut self, wrap: F) -> Self
    where
        F: FnOnce(ResolveFn) -> ResolveFn + Send + 'static,
    {
        self.interceptors.push(Box::new(wrap));
        self
    }

    /// Record resolution metrics.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: ClientMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the loader.
    ///
    /// Without an explicit transport a `reqwest` transport with the default
    /// client timeouts is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the default transport cannot be constructed.
    pub fn build(mut self) -> Result<ConfigServerLoader> {
        if self.transport.is_none() {
            let defaults = ClientProperties::default();
            let transport = ReqwestTransport::new(defaults.connect_timeout(), defaults.read_timeout())?;
            self.transport = Some(Arc::new(transport));
        }
        Ok(self.build_with_default())
    }

    fn build_with_default(self) -> ConfigServerLoader {
        let transport: Arc<dyn ConfigTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_client(reqwest::Client::new())),
        };
        let core = Arc::new(LoaderCore {
            transport,
            #[cfg(feature = "metrics")]
            metrics: self.metrics,
        });

        let base_core = Arc::clone(&core);
        let base: ResolveFn = Arc::new(move |request: LoadRequest| -> ResolveFuture {
            let core = Arc::clone(&base_core);
            Box::pin(async move { core.resolve(&request.resource, &request.context).await })
        });
        let resolve = self
            .interceptors
            .into_iter()
            .fold(base, |next, wrap| wrap(next));

        ConfigServerLoader { core, resolve }
    }
}

impl Default for ConfigServerLoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct LoaderCore {
    transport: Arc<dyn ConfigTransport>,
    #[cfg(feature = "metrics")]
    metrics: Option<ClientMetrics>,
}

impl LoaderCore {
    async fn resolve(
        &self,
        resource: &ConfigServerResource,
        context: &LoadContext,
    ) -> Result<Option<ConfigData>> {
        #[cfg(feature = "metrics")]
        let timer = self.metrics.as_ref().map(ClientMetrics::start_resolution);

        let result = self.resolve_labels(resource, context).await;

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
            match &result {
                Ok(Some(_)) => metrics.record_success(timer),
                Ok(None) => metrics.record_soft_failure(timer),
                Err(_) => metrics.record_fatal_failure(timer),
            }
        }

        result
    }

    async fn resolve_labels(
        &self,
        resource: &ConfigServerResource,
        context: &LoadContext,
    ) -> Result<Option<ConfigData>> {
        let labels = candidate_labels(resource.properties());

        let unresolved = match self.locate(resource, context, &labels).await {
            Ok(Some(environment)) => {
                log_environment(&environment);
                return Ok(Some(assemble(&environment, resource.accepted_profiles())));
            }
            Ok(None) => Unresolved::exhausted(&labels),
            Err(error) => Unresolved::failed(error),
        };

        match unresolved.into_failure(resource) {
            Failure::Soft => Ok(None),
            Failure::Fatal(error) => Err(error),
        }
    }

    /// Try each candidate label until one yields an environment.
    async fn locate(
        &self,
        resource: &ConfigServerResource,
        context: &LoadContext,
        labels: &[String],
    ) -> std::result::Result<Option<Environment>, FetchError> {
        let properties = resource.properties();
        let profiles = resource.profiles();

        let shared;
        let targets = if properties.discovery.enabled {
            match &context.discovered {
                Some(discovered) => ServerTargets::Discovered(discovered),
                None => {
                    debug!("Discovery enabled without discovered instances; using configured URIs");
                    shared = DiscoveredInstances {
                        uris: properties.uri.clone(),
                        username: Some(properties.username.clone()),
                        password: properties.password.clone(),
                    };
                    ServerTargets::Discovered(&shared)
                }
            }
        } else {
            ServerTargets::Static(properties)
        };

        for label in labels {
            let request = EnvironmentRequest {
                name: &properties.name,
                profiles: &profiles,
                label: label.trim(),
            };
            let environment = fetch_environment(
                self.transport.as_ref(),
                properties,
                targets,
                request,
                context.state(),
            )
            .await?;
            if environment.is_some() {
                return Ok(environment);
            }
        }
        Ok(None)
    }
}

/// The labels to try, in order.
///
/// A configured label is split on commas unless `send_all_labels` is set, in
/// which case the raw label goes to the server as a single candidate.
pub fn candidate_labels(properties: &ClientProperties) -> Vec<String> {
    match properties.label.as_deref() {
        Some(label) if !properties.send_all_labels && properties.has_label() => {
            label.split(',').map(str::to_string).collect()
        }
        Some(label) if properties.has_label() => vec![label.to_string()],
        _ => vec![String::new()],
    }
}

fn log_environment(environment: &Environment) {
    info!(
        "Located environment: name={}, profiles=[{}], label={}, version={}, state={}",
        environment.name,
        environment.profiles.join(", "),
        environment.label.as_deref().unwrap_or("null"),
        environment.version.as_deref().unwrap_or("null"),
        environment.state.as_deref().unwrap_or("null"),
    );
    debug!(
        "Environment {} has {} property sources with {} properties.",
        environment.name,
        environment.property_sources.len(),
        environment.property_count()
    );
}

//! Built-in metrics for config server resolution.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Resolution attempts
//! - Successful, soft-failed and fatal resolutions
//! - Resolution duration
//!
//! # Examples
//!
//! ```rust,no_run
//! use confhub::client::ConfigServerLoader;
//! use confhub::metrics::ClientMetrics;
//! use opentelemetry::global;
//!
//! # fn example() -> confhub::error::Result<()> {
//! let loader = ConfigServerLoader::builder()
//!     .with_metrics(ClientMetrics::new(global::meter("my-app")))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod client_metrics;

pub use client_metrics::ClientMetrics;

//! Resolution metrics using OpenTelemetry.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use std::time::Instant;

/// Metrics collector for config server resolutions.
///
/// # Examples
///
/// ```rust,no_run
/// use confhub::metrics::ClientMetrics;
/// use opentelemetry::global;
///
/// let metrics = ClientMetrics::new(global::meter("confhub"));
///
/// let timer = metrics.start_resolution();
/// // ... resolve ...
/// metrics.record_success(timer);
/// ```
#[derive(Clone)]
pub struct ClientMetrics {
    attempts: Counter<u64>,
    outcomes: Counter<u64>,
    duration: Histogram<f64>,
}

impl ClientMetrics {
    /// Create a collector on `meter`.
    pub fn new(meter: Meter) -> Self {
        let attempts = meter
            .u64_counter("confhub.resolution.attempts")
            .with_description("Total number of resolution attempts")
            .build();

        let outcomes = meter
            .u64_counter("confhub.resolution.outcomes")
            .with_description("Resolutions by outcome: success, soft_failure or fatal")
            .build();

        let duration = meter
            .f64_histogram("confhub.resolution.duration")
            .with_description("Duration of resolutions in seconds")
            .with_unit("s")
            .build();

        Self {
            attempts,
            outcomes,
            duration,
        }
    }

    /// Count an attempt and start its timer.
    pub fn start_resolution(&self) -> Instant {
        self.attempts.add(1, &[]);
        Instant::now()
    }

    /// Record a resolution that produced configuration.
    pub fn record_success(&self, start: Instant) {
        self.finish(start, "success");
    }

    /// Record a resolution that proceeded without configuration.
    pub fn record_soft_failure(&self, start: Instant) {
        self.finish(start, "soft_failure");
    }

    /// Record a resolution that aborted.
    pub fn record_fatal_failure(&self, start: Instant) {
        self.finish(start, "fatal");
    }

    fn finish(&self, start: Instant, outcome: &'static str) {
        let attributes = [KeyValue::new("outcome", outcome)];
        self.outcomes.add(1, &attributes);
        self.duration.record(start.elapsed().as_secs_f64(), &attributes);
    }
}

impl std::fmt::Debug for ClientMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::global;

    #[test]
    fn test_record_outcomes() {
        let metrics = ClientMetrics::new(global::meter("test"));

        let timer = metrics.start_resolution();
        metrics.record_success(timer);

        let timer = metrics.start_resolution();
        metrics.record_soft_failure(timer);

        let timer = metrics.start_resolution();
        metrics.record_fatal_failure(timer);
    }

    #[test]
    fn test_clones_record_independently() {
        let metrics = ClientMetrics::new(global::meter("test"));
        let other = metrics.clone();

        let first = metrics.start_resolution();
        let second = other.start_resolution();
        metrics.record_success(first);
        other.record_soft_failure(second);
    }
}

//! Metrics collection for observability

use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_with_registry, Counter, CounterVec, Histogram, Opts, Registry,
};
use std::sync::Arc;
use once_cell::sync::Lazy;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Turn metrics
    pub turns: CounterVec,
    pub clarifications: Counter,
    pub clarification_resolutions: Counter,
    pub understanding_fallbacks: Counter,

    // Token budget metrics
    pub effective_tokens: Histogram,
    pub summarizations: Counter,
    pub summarization_failures: Counter,

    // Persistence metrics
    pub persistence_failures: Counter,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let turns = register_counter_vec_with_registry!(
            Opts::new("session_turns_total", "Total inbound turns by outcome"),
            &["outcome"],
            registry
        )?;

        let clarifications = register_counter_with_registry!(
            Opts::new("session_clarifications_total", "Turns answered with clarifying questions"),
            registry
        )?;

        let clarification_resolutions = register_counter_with_registry!(
            Opts::new(
                "session_clarification_resolutions_total",
                "Clarification answers merged with the pending query"
            ),
            registry
        )?;

        let understanding_fallbacks = register_counter_with_registry!(
            Opts::new(
                "query_understanding_fallbacks_total",
                "Understanding results replaced by the pass-through fallback"
            ),
            registry
        )?;

        let effective_tokens = register_histogram_with_registry!(
            "session_effective_tokens",
            "Effective token count after each turn",
            vec![250.0, 500.0, 1000.0, 2000.0, 3000.0, 4000.0, 6000.0, 8000.0],
            registry
        )?;

        let summarizations = register_counter_with_registry!(
            Opts::new("session_summarizations_total", "Total summarizations performed"),
            registry
        )?;

        let summarization_failures = register_counter_with_registry!(
            Opts::new("session_summarization_failures_total", "Summarizations that kept the previous summary"),
            registry
        )?;

        let persistence_failures = register_counter_with_registry!(
            Opts::new("session_persistence_failures_total", "Failed session writes"),
            registry
        )?;

        Ok(Self {
            registry,
            turns,
            clarifications,
            clarification_resolutions,
            understanding_fallbacks,
            effective_tokens,
            summarizations,
            summarization_failures,
            persistence_failures,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a finished turn; `outcome` is `reply`, `clarification` or `error`
    pub fn record_turn(&self, outcome: &str) {
        self.turns.with_label_values(&[outcome]).inc();
    }

    pub fn record_clarification(&self) {
        self.clarifications.inc();
    }

    pub fn record_clarification_resolved(&self) {
        self.clarification_resolutions.inc();
    }

    pub fn record_understanding_fallback(&self) {
        self.understanding_fallbacks.inc();
    }

    pub fn record_effective_tokens(&self, tokens: usize) {
        self.effective_tokens.observe(tokens as f64);
    }

    /// Record a summarization attempt
    pub fn record_summarization(&self, success: bool) {
        if success {
            self.summarizations.inc();
        } else {
            self.summarization_failures.inc();
        }
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }
}

/*!
Observability infrastructure for snapgraph.

This module provides:
- Structured logging setup through `tracing-subscriber`
- Prometheus counters for saves and loads (behind the `metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, SnapshotError};

/// Directive applied on top of `RUST_LOG`.
pub const DEFAULT_LOG_DIRECTIVE: &str = "snapgraph=info";

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<SnapshotMetrics>> = OnceLock::new();

/// Counters for snapshot operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct SnapshotMetrics {
    pub saves_total: Counter,
    pub loads_total: Counter,
    pub templates_skipped_total: Counter,
    pub unresolved_references_total: Counter,
    pub components_loaded_total: Counter,
    pub snapshot_size_bytes: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| SnapshotError::validation(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| SnapshotError::validation(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
impl SnapshotMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let saves_total = counter(&registry, "snapgraph_saves_total", "Snapshots written")?;
        let loads_total = counter(&registry, "snapgraph_loads_total", "Snapshots read")?;
        let templates_skipped_total = counter(
            &registry,
            "snapgraph_templates_skipped_total",
            "Template entries skipped on save or load",
        )?;
        let unresolved_references_total = counter(
            &registry,
            "snapgraph_unresolved_references_total",
            "References that resolved to null on load",
        )?;
        let components_loaded_total = counter(
            &registry,
            "snapgraph_components_loaded_total",
            "Components whose fields were restored",
        )?;

        let snapshot_size_bytes = Histogram::with_opts(prometheus::HistogramOpts::new(
            "snapgraph_snapshot_size_bytes",
            "Size of encoded snapshots in bytes",
        ))
        .map_err(|e| {
            SnapshotError::validation(format!("Failed to create snapshot_size_bytes metric: {e}"))
        })?;
        registry
            .register(Box::new(snapshot_size_bytes.clone()))
            .map_err(|e| {
                SnapshotError::validation(format!("Failed to register snapshot_size_bytes: {e}"))
            })?;

        Ok(Self {
            saves_total,
            loads_total,
            templates_skipped_total,
            unresolved_references_total,
            components_loaded_total,
            snapshot_size_bytes,
            registry,
        })
    }

    /// Global metrics instance, `None` if the registry could not be built
    pub fn global() -> Option<&'static SnapshotMetrics> {
        METRICS
            .get_or_init(|| match Self::new() {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    tracing::warn!(error = %e, "metrics disabled");
                    None
                }
            })
            .as_ref()
    }

    pub fn record_save(&self, report: &crate::SnapshotReport) {
        self.saves_total.inc();
        self.templates_skipped_total
            .inc_by(report.templates_skipped as f64);
        self.snapshot_size_bytes.observe(report.size_bytes as f64);
    }

    pub fn record_load(&self, report: &crate::LoadReport, size_bytes: usize) {
        self.loads_total.inc();
        self.templates_skipped_total
            .inc_by(report.templates_skipped as f64);
        self.unresolved_references_total
            .inc_by(report.unresolved_references as f64);
        self.components_loaded_total
            .inc_by(report.components_loaded as f64);
        self.snapshot_size_bytes.observe(size_bytes as f64);
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| SnapshotError::validation(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer).map_err(|e| {
            SnapshotError::validation(format!("Failed to convert metrics to string: {e}"))
        })
    }
}

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` with [`DEFAULT_LOG_DIRECTIVE`] added on top.
/// `json` switches the fmt layer to one JSON object per event.
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    SnapshotMetrics::global();

    let directive = DEFAULT_LOG_DIRECTIVE
        .parse()
        .map_err(|e| SnapshotError::validation(format!("Invalid log directive: {e}")))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let result = if json {
        let subscriber = TracingRegistry::default().with(filter).with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_current_span(false),
        );
        set_global_default(subscriber)
    } else {
        let subscriber = TracingRegistry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false));
        set_global_default(subscriber)
    };
    result.map_err(|e| {
        SnapshotError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("snapgraph observability initialized");
    Ok(())
}

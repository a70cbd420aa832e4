//! Observability hooks.
//!
//! `tracing` spans wrap connection, transaction and statement work plus every ledger
//! operation (feature `tracing`). Prometheus counters for postings, rejections and
//! statement latency sit behind feature `metrics`.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{LedgerMetrics, METRICS};

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn acquire_connection_span() -> Span {
        info_span!("safeledger.acquire_connection")
    }

    pub fn execute_query_span(query: &str) -> Span {
        let statement = query.split_whitespace().next().unwrap_or("");
        info_span!("safeledger.execute_query", db.statement = statement)
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("safeledger.begin_transaction")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("safeledger.commit_transaction")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("safeledger.rollback_transaction")
    }

    /// Span around one ledger operation, e.g. `("vouchers", "apply")`.
    pub fn ledger_op_span(component: &'static str, operation: &'static str) -> Span {
        info_span!("safeledger.op", component, operation)
    }
}

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider};
    use opentelemetry::{global, KeyValue};
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<LedgerMetrics> = Lazy::new(LedgerMetrics::init);

    pub struct LedgerMetrics {
        /// Scrape target. Empty if the exporter could not be registered; the counters
        /// still accept updates.
        pub registry: Registry,
        pub postings_total: Counter<u64>,
        pub rejections_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
    }

    impl LedgerMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let meter = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => {
                    let provider = SdkMeterProvider::builder().with_reader(exporter).build();
                    let meter = provider.meter("safeledger");
                    global::set_meter_provider(provider);
                    meter
                }
                Err(e) => {
                    log::warn!("prometheus exporter unavailable: {e}");
                    global::meter("safeledger")
                }
            };
            Self::with_meter(registry, &meter)
        }

        fn with_meter(registry: Registry, meter: &Meter) -> Self {
            Self {
                registry,
                postings_total: meter
                    .u64_counter("safeledger_postings_total")
                    .with_description("Committed ledger mutations")
                    .build(),
                rejections_total: meter
                    .u64_counter("safeledger_rejections_total")
                    .with_description("Operations rejected by a ledger rule")
                    .build(),
                query_errors_total: meter
                    .u64_counter("safeledger_query_errors_total")
                    .with_description("Failed SQL statements")
                    .build(),
                query_duration: meter
                    .f64_histogram("safeledger_query_duration_seconds")
                    .with_description("SQL statement latency")
                    .build(),
            }
        }

        pub fn record_posting(&self, operation: &'static str) {
            self.postings_total
                .add(1, &[KeyValue::new("operation", operation)]);
        }

        pub fn record_rejection(&self, operation: &'static str) {
            self.rejections_total
                .add(1, &[KeyValue::new("operation", operation)]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        /// Current values in the Prometheus text format.
        pub fn render(&self) -> String {
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
                log::warn!("cannot encode metrics: {e}");
            }
            String::from_utf8_lossy(&buffer).into_owned()
        }
    }
}

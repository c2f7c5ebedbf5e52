// Observability: metrics recording and the Prometheus exporter

pub mod metrics;

pub use metrics::{init, MetricName};

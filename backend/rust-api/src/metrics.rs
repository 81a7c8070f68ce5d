use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    // Notification Metrics
    pub static ref NOTIFICATIONS_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        "notifications_sent_total",
        "Total number of notification emails attempted",
        &["kind", "status"]
    )
    .unwrap();

    pub static ref DISPATCH_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "dispatch_duration_seconds",
        "Duration of one dispatch run over all targeted users",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]
    )
    .unwrap();

    // Scheduler Metrics
    pub static ref SCHEDULER_TICKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "scheduler_ticks_total",
        "Total number of scheduler ticks",
        &["status"]
    )
    .unwrap();

    pub static ref SCHEDULER_TRIGGER_FIRES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "scheduler_trigger_fires_total",
        "Total number of scheduled trigger firings",
        &["action"]
    )
    .unwrap();

    // Database Metrics (MongoDB)
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

/// Counts one delivery attempt for `kind`.
pub fn record_delivery(kind: &str, delivered: bool) {
    let status = if delivered { "sent" } else { "failed" };
    NOTIFICATIONS_SENT_TOTAL
        .with_label_values(&[kind, status])
        .inc();
}

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Content store
    pub static ref STORE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "store_operations_total",
        "Total number of content store operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "store_operation_duration_seconds",
        "Content store operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // In-flight guard (Redis)
    pub static ref GUARD_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "guard_operations_total",
        "In-flight guard acquisitions by outcome",
        &["outcome"]
    )
    .unwrap();

    // Quiz sessions
    pub static ref QUIZ_SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_sessions_total",
        "Quiz session lifecycle events",
        &["event"]
    )
    .unwrap();

    pub static ref QUIZ_SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "quiz_sessions_active",
        "Number of quiz sessions held in memory"
    )
    .unwrap();

    pub static ref QUIZ_ANSWERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_answers_total",
        "Answers recorded on finished quiz attempts",
        &["correct"]
    )
    .unwrap();

    // Engagement
    pub static ref ENGAGEMENT_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "engagement_events_total",
        "Likes, unlikes, views and shares",
        &["event"]
    )
    .unwrap();

    pub static ref SSE_CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sse_connections_active",
        "Number of active SSE connections"
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

/// Helper: track a content store operation with metrics
pub async fn track_store_operation<F, T, E>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

pub fn record_engagement(event: &str) {
    ENGAGEMENT_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

pub fn record_quiz_event(event: &str) {
    QUIZ_SESSIONS_TOTAL.with_label_values(&[event]).inc();
}

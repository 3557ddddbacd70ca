use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

use crate::services::{ai_error::AiError, question_bank::BankError};

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
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();

    // Generative model calls
    pub static ref AI_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ai_requests_total",
        "Total number of generative model calls",
        &["operation", "outcome"]
    )
    .unwrap();

    pub static ref AI_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "ai_request_duration_seconds",
        "Generative model call duration in seconds",
        &["operation"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]
    )
    .unwrap();

    // Question bank
    pub static ref BANK_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "question_bank_operations_total",
        "Total number of question bank operations",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref BANK_QUESTIONS: IntGauge = register_int_gauge!(
        "question_bank_questions",
        "Number of questions currently stored in the question bank"
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

/// Helper: track a generative model call, labelling the outcome with the failure kind
pub async fn track_ai_call<F, T>(operation: &str, future: F) -> Result<T, AiError>
where
    F: std::future::Future<Output = Result<T, AiError>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let outcome = match &result {
        Ok(_) => "success",
        Err(err) => err.kind(),
    };

    AI_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();

    AI_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);

    result
}

/// Helper: track question bank operation with metrics
pub async fn track_bank_operation<F, T>(operation: &str, future: F) -> Result<T, BankError>
where
    F: std::future::Future<Output = Result<T, BankError>>,
{
    let result = future.await;
    let status = if result.is_ok() { "success" } else { "error" };

    BANK_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();

    result
}

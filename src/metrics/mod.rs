use crate::errors::ServiceError;
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};
use tracing::error;

lazy_static! {
    static ref ORDER_OPERATIONS: IntCounterVec = register_int_counter_vec!(
        "order_lifecycle_operations_total",
        "Total number of accepted order lifecycle operations",
        &["operation"]
    )
    .expect("metric can be created");
    static ref ORDER_OPERATION_FAILURES: IntCounterVec = register_int_counter_vec!(
        "order_lifecycle_operation_failures_total",
        "Total number of rejected or failed order lifecycle operations",
        &["operation", "error_type"]
    )
    .expect("metric can be created");
}

pub fn record_success(operation: &str) {
    ORDER_OPERATIONS.with_label_values(&[operation]).inc();
}

pub fn record_failure(operation: &str, err: &ServiceError) {
    ORDER_OPERATION_FAILURES
        .with_label_values(&[operation, err.kind()])
        .inc();
}

/// Counts the outcome of one operation and hands the result back unchanged.
pub fn observe<T>(operation: &str, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
    match &result {
        Ok(_) => record_success(operation),
        Err(e) => record_failure(operation, e),
    }
    result
}

pub fn success_count(operation: &str) -> u64 {
    ORDER_OPERATIONS.with_label_values(&[operation]).get()
}

pub fn failure_count(operation: &str, error_type: &str) -> u64 {
    ORDER_OPERATION_FAILURES
        .with_label_values(&[operation, error_type])
        .get()
}

/// Renders the default registry in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_counts_both_outcomes() {
        let ok_before = success_count("metrics_test");
        let err_before = failure_count("metrics_test", "conflict");

        let _ = observe("metrics_test", Ok::<_, ServiceError>(()));
        let _ = observe::<()>("metrics_test", Err(ServiceError::Conflict("stale".into())));

        assert_eq!(success_count("metrics_test"), ok_before + 1);
        assert_eq!(failure_count("metrics_test", "conflict"), err_before + 1);
        assert!(render().contains("order_lifecycle_operations_total"));
    }
}

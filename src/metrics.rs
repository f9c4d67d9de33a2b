use prometheus::{Encoder, IntCounter, IntCounterVec, HistogramVec, Opts, Registry, TextEncoder};
use lazy_static::lazy_static;
use actix_web::{HttpResponse, Responder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Request metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        ),
        &["method", "endpoint"]
    ).unwrap();

    // Authentication & authorization
    pub static ref AUTH_ATTEMPTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("auth_attempts_total", "Total authentication attempts"),
        &["result"] // "success" or "failure"
    ).unwrap();

    pub static ref AUTHORIZATION_DENIALS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authorization_denials_total", "Authenticated requests refused for insufficient role"),
        &["endpoint"]
    ).unwrap();

    // Persistence
    pub static ref AUDIT_ENTRIES_WRITTEN: IntCounter = IntCounter::new(
        "audit_entries_written_total",
        "Total audit log rows written"
    ).unwrap();

    pub static ref PATIENT_RECORDS_SAVED: IntCounter = IntCounter::new(
        "patient_records_saved_total",
        "Total patient records saved"
    ).unwrap();
}

/// Register all collectors with [`REGISTRY`]. Call once at startup.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    REGISTRY.register(Box::new(AUTH_ATTEMPTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AUTHORIZATION_DENIALS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AUDIT_ENTRIES_WRITTEN.clone()))?;
    REGISTRY.register(Box::new(PATIENT_RECORDS_SAVED.clone()))?;

    Ok(())
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler() -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("Failed to encode metrics: {}", e));
    }

    match String::from_utf8(buffer) {
        Ok(metrics) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(metrics),
        Err(e) => HttpResponse::InternalServerError().body(format!("Failed to convert metrics: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let result = init_metrics();
        assert!(result.is_ok());
    }

    #[test]
    fn test_auth_attempts_counter() {
        AUTH_ATTEMPTS_TOTAL.with_label_values(&["failure"]).inc();

        let metric = AUTH_ATTEMPTS_TOTAL.with_label_values(&["failure"]).get();

        assert!(metric >= 1);
    }
}

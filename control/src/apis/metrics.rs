//! Informer metrics
//!
//! Counters for list/watch traffic and cache events, exported in Prometheus
//! text format.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

lazy_static! {
    /// Informer metrics registry
    pub static ref INFORMER_METRICS_REGISTRY: Registry = Registry::new();

    /// LIST requests issued by informers
    static ref LIST_REQUESTS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "informer_list_requests_total",
            "Total number of list requests issued by informers",
        );
        let counter = IntCounterVec::new(opts, &["resource", "result"])
            .expect("Failed to create counter");
        INFORMER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// WATCH requests issued by informers
    static ref WATCH_REQUESTS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "informer_watch_requests_total",
            "Total number of watch requests issued by informers",
        );
        let counter = IntCounterVec::new(opts, &["resource", "result"])
            .expect("Failed to create counter");
        INFORMER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Cache events delivered to handlers
    static ref EVENTS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "informer_events_total",
            "Total number of cache events delivered to handlers",
        );
        let counter = IntCounterVec::new(opts, &["resource", "event"])
            .expect("Failed to create counter");
        INFORMER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Errors surfaced by the list/watch stream
    static ref STREAM_ERRORS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "informer_stream_errors_total",
            "Total number of list/watch stream errors",
        );
        let counter = IntCounterVec::new(opts, &["resource"])
            .expect("Failed to create counter");
        INFORMER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Objects currently held in the informer cache
    static ref STORE_OBJECTS: IntGaugeVec = {
        let opts = Opts::new(
            "informer_store_objects",
            "Number of objects in the informer cache",
        );
        let gauge = IntGaugeVec::new(opts, &["resource"])
            .expect("Failed to create gauge");
        INFORMER_METRICS_REGISTRY
            .register(Box::new(gauge.clone()))
            .expect("Failed to register gauge");
        gauge
    };
}

fn result_label(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "error"
    }
}

/// Record a LIST request
pub fn record_list_request(resource: &str, ok: bool) {
    LIST_REQUESTS_TOTAL
        .with_label_values(&[resource, result_label(ok)])
        .inc();
}

/// Record a WATCH request
pub fn record_watch_request(resource: &str, ok: bool) {
    WATCH_REQUESTS_TOTAL
        .with_label_values(&[resource, result_label(ok)])
        .inc();
}

/// Record a cache event (add, update, delete, resync)
pub fn record_informer_event(resource: &str, event: &str) {
    EVENTS_TOTAL.with_label_values(&[resource, event]).inc();
}

pub fn record_stream_error(resource: &str) {
    STREAM_ERRORS_TOTAL.with_label_values(&[resource]).inc();
}

/// Set the cache size gauge
pub fn set_store_objects(resource: &str, count: usize) {
    STORE_OBJECTS
        .with_label_values(&[resource])
        .set(count as i64);
}

/// Gather informer metrics
pub fn gather_informer_metrics() -> Result<String, String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = INFORMER_METRICS_REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert to UTF-8: {}", e))
}

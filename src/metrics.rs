use actix_web::{http::header, HttpResponse};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

pub static ONLINE_USERS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "live_chat_online_users",
        "Users with at least one live connection on this instance",
    )
    .expect("failed to create live_chat_online_users");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register live_chat_online_users");
    gauge
});

pub static OPEN_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "live_chat_open_connections",
        "Open WebSocket connections on this instance",
    )
    .expect("failed to create live_chat_open_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register live_chat_open_connections");
    gauge
});

pub static MESSAGES_INGESTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "live_chat_messages_ingested_total",
        "Messages persisted by the ingestion pipeline",
    )
    .expect("failed to create live_chat_messages_ingested_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register live_chat_messages_ingested_total");
    counter
});

pub static DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "live_chat_deliveries_total",
            "Frames handed to live connections, by event kind",
        ),
        &["kind"],
    )
    .expect("failed to create live_chat_deliveries_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register live_chat_deliveries_total");
    counter
});

pub static PRESENCE_WRITE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "live_chat_presence_write_failures_total",
        "last_seen writes that failed and were skipped",
    )
    .expect("failed to create live_chat_presence_write_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register live_chat_presence_write_failures_total");
    counter
});

/// Registers every collector up front so scrapes see zeroed series before
/// the first connection arrives.
pub fn init() {
    Lazy::force(&ONLINE_USERS);
    Lazy::force(&OPEN_CONNECTIONS);
    Lazy::force(&MESSAGES_INGESTED_TOTAL);
    Lazy::force(&DELIVERIES_TOTAL);
    Lazy::force(&PRESENCE_WRITE_FAILURES_TOTAL);
}

pub fn record_deliveries(kind: &str, delivered: usize) {
    DELIVERIES_TOTAL
        .with_label_values(&[kind])
        .inc_by(delivered as u64);
}

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, encoder.format_type()))
        .body(buffer)
}

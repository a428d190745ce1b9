//! eventgate service library logic.
//!
//! Two independent paths share one [`EventLog`] handle:
//!
//! - **ingress** ([`ingress::Relay`], served by [`api`]): HTTP body to typed
//!   payload to envelope to log, answering with the record's placement;
//! - **egress** ([`egress::Dispatcher`]): one tail loop per topic, each
//!   handing decoded envelopes to its [`egress::EventHandler`].

pub mod api;
pub mod config;
pub mod egress;
pub mod ingress;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use config::{BrokerBackend, BrokerConfig};
use eventgate_log::{EventLog, KafkaLog, LogError, MemoryLog, TimeoutLog};
use ingress::Relay;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Publishes ingested events to the shared log.
    pub relay: Relay,
}

impl AppState {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self {
            relay: Relay::new(log),
        }
    }
}

/// Maximum request body size (1 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/events/health", get(api::health_handler))
        .route("/api/events/movie", post(api::movie_event_handler))
        .route("/api/events/user", post(api::user_event_handler))
        .route("/api/events/payment", post(api::payment_event_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}

/// Creates the configured log backend.
///
/// When `publish_timeout_ms` is set, the backend is wrapped in a
/// [`TimeoutLog`].
///
/// # Errors
///
/// Returns [`LogError::Connect`] if the Kafka cluster cannot be reached.
pub async fn connect_log(config: &BrokerConfig) -> Result<Arc<dyn EventLog>, LogError> {
    let log: Arc<dyn EventLog> = match config.backend {
        BrokerBackend::Kafka => Arc::new(KafkaLog::connect(config.kafka_settings()).await?),
        BrokerBackend::Memory => {
            tracing::warn!("using the in-memory event log, records will not survive a restart");
            Arc::new(MemoryLog::new())
        }
    };

    Ok(match config.publish_timeout_ms {
        Some(ms) => {
            tracing::info!(timeout_ms = ms, "bounding publish acknowledgment wait");
            Arc::new(TimeoutLog::new(log, Duration::from_millis(ms)))
        }
        None => log,
    })
}

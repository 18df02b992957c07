// server.rs
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::Json,
    routing::{any, get},
    Router,
};
use chrono::{DateTime, Utc};
use http_body_util::LengthLimitError;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::webhook::WebhookHandler;
use crate::WebhookError;

pub const HEALTH_PATH: &str = "/health";

/// An authenticated delivery, body untouched.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub body: Bytes,
}

/// Receives deliveries whose signature checked out.
pub trait DeliverySink: Send + Sync {
    fn accept(&self, delivery: Delivery);
}

/// Logs accepted deliveries without interpreting them.
#[derive(Debug, Default)]
pub struct LogSink;

impl DeliverySink for LogSink {
    fn accept(&self, delivery: Delivery) {
        info!(
            delivery_id = %delivery.id,
            bytes = delivery.body.len(),
            "Accepted webhook delivery"
        );

        match serde_json::from_slice::<serde_json::Value>(&delivery.body) {
            Ok(serde_json::Value::Object(fields)) => {
                let keys: Vec<&String> = fields.keys().collect();
                debug!(delivery_id = %delivery.id, ?keys, "JSON object payload");
            }
            Ok(_) => debug!(delivery_id = %delivery.id, "JSON payload is not an object"),
            Err(_) => debug!(delivery_id = %delivery.id, "Payload is not JSON"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub webhook_handler: WebhookHandler,
    pub max_body_bytes: usize,
    pub sink: Arc<dyn DeliverySink>,
}

impl AppState {
    pub fn new(config: &Config, sink: Arc<dyn DeliverySink>) -> Self {
        Self {
            webhook_handler: WebhookHandler::new(config.verifier.clone()),
            max_body_bytes: config.max_body_bytes,
            sink,
        }
    }
}

pub fn app(config: &Config, sink: Arc<dyn DeliverySink>) -> Router {
    router(AppState::new(config, sink), &config.webhook_path)
}

pub fn router(state: AppState, webhook_path: &str) -> Router {
    Router::new()
        // Every method is routed here so the rejection is ours, not axum's.
        .route(webhook_path, any(handle_webhook))
        .route(HEALTH_PATH, get(health_check))
        .with_state(Arc::new(state))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, WebhookError> {
    let delivery_id = Uuid::new_v4();
    let span = info_span!("webhook", %delivery_id, %method);

    receive(&state, delivery_id, method, headers, body)
        .instrument(span)
        .await
}

async fn receive(
    state: &AppState,
    delivery_id: Uuid,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, WebhookError> {
    if method != Method::POST {
        warn!("Received a {} request but expecting only POST", method);
        return Err(WebhookError::UnsupportedMethod(method));
    }

    let body = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|err| body_error(err, state.max_body_bytes))
        .inspect_err(|err| match err {
            WebhookError::BodyTooLarge { .. } => warn!("{}", err),
            _ => error!("{}", err),
        })?;

    if !state.webhook_handler.verify_request(&headers, &body).is_valid() {
        warn!("Bad webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    state.sink.accept(Delivery {
        id: delivery_id,
        received_at: Utc::now(),
        body,
    });

    Ok(StatusCode::NO_CONTENT)
}

fn body_error(err: axum::Error, limit: usize) -> WebhookError {
    let inner = err.into_inner();
    if inner.downcast_ref::<LengthLimitError>().is_some() {
        WebhookError::BodyTooLarge { limit }
    } else {
        WebhookError::BodyRead(inner.to_string())
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "scheme": state.webhook_handler.scheme().as_str(),
    }))
}

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, RawQuery, State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    routing::get,
};
use bytes::Bytes;
use mqtt_handler::publisher::{MqttPublisher, PublishError};
use serde::Serialize;
use utils::time_getter::TimeGetter;

use crate::payload::{Payload, PayloadError, RequestParts, build_payload};

/// Everything a request handler needs; built once at startup and shared by all requests
#[derive(Clone)]
pub struct BridgeContext {
    publisher: Arc<dyn MqttPublisher>,
    time_getter: TimeGetter,
}

impl BridgeContext {
    pub fn new(publisher: Arc<dyn MqttPublisher>, time_getter: TimeGetter) -> Self {
        Self {
            publisher,
            time_getter,
        }
    }
}

/// The JSON document returned for every bridged request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusDocument {
    Success { topic: String, payload: Payload },
    Error { message: String },
}

#[derive(thiserror::Error, Debug)]
enum BridgeError {
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Routes `GET` and `POST` on every non-root path to the broker. Bodies larger than
/// `max_body_size` bytes are refused with 413.
pub fn make_router(context: BridgeContext, max_body_size: usize) -> Router {
    Router::new()
        .route("/{*topic}", get(forward_to_mqtt).post(forward_to_mqtt))
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(context)
}

async fn forward_to_mqtt(
    State(context): State<BridgeContext>,
    Path(topic): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> (StatusCode, Json<StatusDocument>) {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::error!("Error reading request body for topic {topic}: {rejection}");
            let document = StatusDocument::Error {
                message: rejection.body_text(),
            };
            return (rejection.status(), Json(document));
        }
    };

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);

    let request = RequestParts {
        query,
        content_type,
        body,
    };

    let (status, document) = handle(&context, topic, &request).await;
    (status, Json(document))
}

/// Publishes the request's payload on `topic`. Failures are reported to the caller
/// and never retried.
pub async fn handle(
    context: &BridgeContext,
    topic: String,
    request: &RequestParts,
) -> (StatusCode, StatusDocument) {
    match publish_request(context, &topic, request).await {
        Ok(payload) => (StatusCode::OK, StatusDocument::Success { topic, payload }),
        Err(e) => {
            tracing::error!("Error publishing message to topic {topic}: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusDocument::Error {
                    message: e.to_string(),
                },
            )
        }
    }
}

async fn publish_request(
    context: &BridgeContext,
    topic: &str,
    request: &RequestParts,
) -> Result<Payload, BridgeError> {
    let payload = build_payload(request, context.time_getter.get_time()).await?;
    let mqtt_payload = serde_json::to_string(&payload)?;

    context
        .publisher
        .publish(topic, mqtt_payload.clone().into_bytes())
        .await?;

    tracing::info!("Published message to topic: {topic}, payload: {mqtt_payload}");

    Ok(payload)
}

//! HTTP gateway for cardwire.
//!
//! Exposes the event ingress that feeds the dispatcher, the proactive
//! notice endpoint, and health checks.
//!
//! Built on Axum.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use cardwire_config::AppConfig;
use cardwire_core::card::CreateOptions;
use cardwire_core::event::{Ack, EventEnvelope};
use cardwire_core::message::IncomingMessage;
use cardwire_core::params::to_param_map;
use cardwire_core::service::CardService;
use cardwire_stream::EventDispatcher;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub dispatcher: Arc<EventDispatcher>,
    pub cards: Arc<dyn CardService>,
    /// Recipient of proactive notice cards.
    pub notice_user_id: Option<String>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Request bodies are capped at 1 MB.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/ping", get(ping_handler))
        .route("/stream/events", post(events_handler))
        .route("/api/notice/card", post(notice_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server on the configured address.
pub async fn start(config: &AppConfig, state: SharedState) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ping_handler() -> Json<Value> {
    Json(serde_json::json!({ "pong": true }))
}

/// Hand one event to the dispatcher and answer with its ack frame.
async fn events_handler(
    State(state): State<SharedState>,
    Json(event): Json<EventEnvelope>,
) -> Json<Ack> {
    debug!(topic = event.topic(), message_id = event.message_id(), "Event received over HTTP");
    Json(state.dispatcher.dispatch(&event).await)
}

#[derive(Deserialize)]
struct NoticeRequest {
    template_id: String,
    #[serde(default)]
    card_data: Map<String, Value>,
    /// Preview shown in the conversation list
    #[serde(default)]
    last_message: Option<String>,
}

#[derive(Debug, Serialize)]
struct NoticeResponse {
    success: bool,
    err_msg: String,
}

impl NoticeResponse {
    fn failed(err_msg: impl Into<String>) -> Self {
        Self {
            success: false,
            err_msg: err_msg.into(),
        }
    }
}

/// Deliver a card into the notice user's direct chat.
async fn notice_handler(
    State(state): State<SharedState>,
    Json(request): Json<NoticeRequest>,
) -> (StatusCode, Json<NoticeResponse>) {
    let Some(user_id) = state.notice_user_id.as_deref() else {
        warn!("Notice requested but no notice user is configured");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(NoticeResponse::failed("notice.user_id is not configured")),
        );
    };
    if request.template_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(NoticeResponse::failed("template_id must not be empty")),
        );
    }

    let target = IncomingMessage::direct_to(user_id);
    // Notices are addressed to one person and must not be forwarded.
    let options = CreateOptions {
        support_forward: false,
        last_message: request.last_message.clone(),
        ..CreateOptions::default()
    };
    let result = state
        .cards
        .create_and_deliver(
            &request.template_id,
            to_param_map(&request.card_data),
            &target,
            options,
        )
        .await;

    match result {
        Ok(instance_id) => {
            info!(instance_id = %instance_id, user_id, template_id = %request.template_id, "Notice card delivered");
            (
                StatusCode::OK,
                Json(NoticeResponse {
                    success: true,
                    err_msg: String::new(),
                }),
            )
        }
        Err(e) => {
            warn!(user_id, error = %e, "Notice card delivery failed");
            (StatusCode::OK, Json(NoticeResponse::failed(e.to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use cardwire_core::card::{
        CardInstanceId, PrivateDataPatch, StreamingUpdate, UpdateOptions, UserProfile,
    };
    use cardwire_core::error::{CardError, Result as CoreResult};
    use cardwire_core::event::{AckPayload, EventHandler};
    use cardwire_core::params::CardParamMap;
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Records notice deliveries; fails for the template "broken".
    #[derive(Default)]
    struct NoticeCards {
        delivered: Mutex<Vec<(String, CardParamMap, String, CreateOptions)>>,
    }

    #[async_trait]
    impl CardService for NoticeCards {
        async fn create_and_deliver(
            &self,
            template_id: &str,
            public_data: CardParamMap,
            target: &IncomingMessage,
            options: CreateOptions,
        ) -> Result<CardInstanceId, CardError> {
            if template_id == "broken" {
                return Err(CardError::Rejected {
                    operation: "create_and_deliver",
                    body: "template not found".into(),
                });
            }
            self.delivered.lock().unwrap().push((
                template_id.to_string(),
                public_data,
                target.sender_staff_id.clone(),
                options,
            ));
            Ok(CardInstanceId::from("notice-1"))
        }

        async fn update(
            &self,
            _instance_id: &CardInstanceId,
            _public_patch: Option<CardParamMap>,
            _private_patch: Option<PrivateDataPatch>,
            _options: UpdateOptions,
        ) -> Result<(), CardError> {
            Ok(())
        }

        async fn stream_update(
            &self,
            _instance_id: &CardInstanceId,
            _update: StreamingUpdate,
        ) -> Result<(), CardError> {
            Ok(())
        }

        async fn user_profile(&self, _user_id: &str) -> Result<UserProfile, CardError> {
            Ok(UserProfile::default())
        }
    }

    struct Echo;

    #[async_trait]
    impl EventHandler for Echo {
        async fn handle(&self, event: &EventEnvelope) -> CoreResult<AckPayload> {
            Ok(AckPayload::Response(json!({ "seen": event.message_id() })))
        }
    }

    fn test_state(notice_user_id: Option<&str>) -> (SharedState, Arc<NoticeCards>) {
        let cards = Arc::new(NoticeCards::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register("/echo", Arc::new(Echo));
        let state = Arc::new(GatewayState {
            dispatcher: Arc::new(dispatcher),
            cards: cards.clone(),
            notice_user_id: notice_user_id.map(str::to_string),
        });
        (state, cards)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (state, _) = test_state(None);
        let app = build_router(state);

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn ping_endpoint() {
        let (state, _) = test_state(None);
        let req = Request::builder()
            .uri("/api/ping")
            .body(Body::empty())
            .unwrap();
        let response = build_router(state).oneshot(req).await.unwrap();
        assert_eq!(body_json(response).await, json!({ "pong": true }));
    }

    #[tokio::test]
    async fn events_are_dispatched_and_acked() {
        let (state, _) = test_state(None);
        let event = EventEnvelope::new("/echo", "m-7", &json!({})).unwrap();

        let response = build_router(state)
            .oneshot(post_json("/stream/events", &serde_json::to_value(&event).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let frame = body_json(response).await;
        assert_eq!(frame["headers"]["messageId"], "m-7");
        let data: Value = serde_json::from_str(frame["data"].as_str().unwrap()).unwrap();
        assert_eq!(data, json!({ "response": { "seen": "m-7" } }));
    }

    #[tokio::test]
    async fn unknown_topic_event_acks_success() {
        let (state, _) = test_state(None);
        let event = EventEnvelope::new("/nobody", "m-8", &json!({})).unwrap();
        let response = build_router(state)
            .oneshot(post_json("/stream/events", &serde_json::to_value(&event).unwrap()))
            .await
            .unwrap();
        let frame = body_json(response).await;
        assert_eq!(frame["data"], json!({ "status": "SUCCESS" }).to_string());
    }

    #[tokio::test]
    async fn notice_without_user_is_unavailable() {
        let (state, cards) = test_state(None);
        let response = build_router(state)
            .oneshot(post_json("/api/notice/card", &json!({ "template_id": "t1", "card_data": {} })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["success"], false);
        assert!(cards.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notice_delivers_to_configured_user() {
        let (state, cards) = test_state(Some("manager1"));
        let response = build_router(state)
            .oneshot(post_json(
                "/api/notice/card",
                &json!({
                    "template_id": "t1",
                    "card_data": { "title": "Launch", "count": 3, "skip": null },
                    "last_message": "Launch reminder"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "success": true, "err_msg": "" }));

        let delivered = cards.delivered.lock().unwrap();
        let (template, data, user, options) = &delivered[0];
        assert_eq!(template, "t1");
        assert_eq!(user, "manager1");
        assert_eq!(data.get("title").map(String::as_str), Some("Launch"));
        assert_eq!(data.get("count").map(String::as_str), Some("3"));
        assert!(!data.contains_key("skip"));
        assert!(!options.support_forward);
        assert_eq!(options.last_message.as_deref(), Some("Launch reminder"));
    }

    #[tokio::test]
    async fn notice_failure_is_reported_in_body() {
        let (state, _) = test_state(Some("manager1"));
        let response = build_router(state)
            .oneshot(post_json("/api/notice/card", &json!({ "template_id": "broken" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["err_msg"].as_str().unwrap().contains("template not found"));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let (state, _) = test_state(Some("manager1"));
        let big = "x".repeat(2 * 1024 * 1024);
        let response = build_router(state)
            .oneshot(post_json(
                "/api/notice/card",
                &json!({ "template_id": "t1", "card_data": { "blob": big } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}

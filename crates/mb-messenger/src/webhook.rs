//! Webhook server for Messenger
//!
//! Handles the subscription handshake, signed event deliveries and the
//! on-demand profile setup endpoint.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Router,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::api::GraphApi;
use crate::error::{MessengerError, Result};
use crate::handler::MessengerHandler;
use crate::profile::{Profile, SetupMode};
use crate::types::WebhookPayload;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Webhook server state
#[derive(Clone)]
pub struct WebhookState {
    pub app_secret: String,
    pub api: GraphApi,
    pub handler: Arc<MessengerHandler>,
    pub profile: Arc<Profile>,
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileQuery {
    mode: Option<String>,
    verify_token: Option<String>,
}

/// Create webhook router
pub fn create_webhook_router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", get(verify_webhook).post(handle_webhook))
        .route("/profile", get(setup_profile))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn health() -> &'static str {
    "OK"
}

/// Subscription handshake
async fn verify_webhook(
    State(state): State<Arc<WebhookState>>,
    Query(query): Query<VerifyQuery>,
) -> std::result::Result<String, StatusCode> {
    let mode = query.mode.unwrap_or_default();
    let token = query.verify_token.unwrap_or_default();
    let challenge = state
        .api
        .verify_webhook(&mode, &token, query.challenge.as_deref().unwrap_or_default())
        .map_err(|_| StatusCode::FORBIDDEN)?;

    if challenge.is_empty() {
        warn!("Webhook handshake without hub.challenge");
        return Err(StatusCode::BAD_REQUEST);
    }

    Ok(challenge)
}

/// Handle an event delivery.
///
/// Replies as soon as the body is accepted; processing continues in the
/// background.
async fn handle_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<&'static str, StatusCode> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    check_signature(&state.app_secret, &body, signature).map_err(|e| {
        warn!("Rejected webhook: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        error!("Failed to parse webhook body: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    if payload.object != "page" {
        warn!("Ignoring webhook for object {}", payload.object);
        return Err(StatusCode::NOT_FOUND);
    }

    debug!("Received webhook with {} entries", payload.entry.len());

    let handler = state.handler.clone();
    tokio::spawn(async move {
        if let Err(e) = handler.process_webhook(&payload).await {
            error!("Error processing webhook: {}", e);
        }
    });

    Ok("EVENT_RECEIVED")
}

/// Run profile setup on demand: `GET /profile?mode=all&verify_token=...`
async fn setup_profile(
    State(state): State<Arc<WebhookState>>,
    Query(query): Query<ProfileQuery>,
) -> std::result::Result<String, (StatusCode, String)> {
    let token = query.verify_token.unwrap_or_default();
    if !state.api.is_verify_token(&token) {
        return Err((StatusCode::FORBIDDEN, "Invalid verify token".to_string()));
    }

    let mode_name = query.mode.unwrap_or_else(|| "all".to_string());
    let mode: SetupMode = mode_name
        .parse()
        .map_err(|e: MessengerError| (StatusCode::BAD_REQUEST, e.to_string()))?;

    state.profile.apply(mode).await.map_err(|e| {
        error!("Profile setup failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(format!("Profile setup complete: {}", mode_name))
}

/// Require a valid signature header for the raw body
pub fn check_signature(app_secret: &str, body: &[u8], signature: Option<&str>) -> Result<()> {
    match signature {
        Some(signature) if verify_signature(app_secret, body, signature) => Ok(()),
        _ => Err(MessengerError::InvalidSignature),
    }
}

/// Verify the `sha256=<hex>` HMAC of the raw body
pub fn verify_signature(app_secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(hex_signature) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };

    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Start webhook server and serve until `shutdown` fires
pub async fn start_webhook_server(
    state: WebhookState,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = create_webhook_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MessengerError::Server(e.to_string()))?;

    info!("Messenger webhook server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("Webhook server shutting down");
        })
        .await
        .map_err(|e| MessengerError::Server(e.to_string()))?;

    Ok(())
}

//! HTTP handlers. Each one parses a JSON body and calls into the relay.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kasflows_core::{AnnounceOutcome, DisconnectOutcome, Relay, RelayError, VERSION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

/// A relay error rendered as a JSON status body.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RelayError::InvalidPayload(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RelayError::InvalidPayload(_) | RelayError::ClientNotFound(_) => {
                StatusCode::BAD_REQUEST
            }
            RelayError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            RelayError::Config(_) | RelayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "status": "error", "message": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Debug, Deserialize)]
struct NameRequest {
    name: String,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    event: String,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct QueueRequest {
    name: String,
    message: Value,
}

/// Decode the body as `T`, keeping the raw value for event payloads.
fn parse<T: DeserializeOwned>(body: Result<Json<Value>, JsonRejection>) -> Result<(T, Value), ApiError> {
    let Json(raw) = body?;
    let parsed = serde_json::from_value(raw.clone())
        .map_err(|e| RelayError::InvalidPayload(e.to_string()))?;
    Ok((parsed, raw))
}

/// GET /
pub async fn describe() -> Json<Value> {
    Json(json!({
        "name": "Kasflows",
        "version": VERSION,
        "api": {
            "/statusws": "POST - connect a client or refresh its status",
            "/disconnect": "POST - disconnect a client",
            "/getmessage": "POST - fetch the pending message for a client",
            "/sendmessage": "POST - send an event to the server",
            "/sendmessagetoclient": "POST - queue a message for a specific client",
            "/getclients": "GET - list connected clients",
        }
    }))
}

/// POST /statusws
pub async fn announce(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let (req, raw) = parse::<NameRequest>(body)?;
    let receipt = state.relay.announce(&req.name, req.token.as_deref(), &raw)?;
    let status = match receipt.outcome {
        AnnounceOutcome::Connected => "connected",
        AnnounceOutcome::AlreadyConnected => "already connected",
    };
    let mut body = json!({ "status": status });
    if let Some(token) = receipt.token {
        body["token"] = Value::String(token);
    }
    Ok(Json(body))
}

/// POST /disconnect
pub async fn disconnect(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let (req, raw) = parse::<NameRequest>(body)?;
    let status = match state
        .relay
        .disconnect(&req.name, req.token.as_deref(), &raw)?
    {
        DisconnectOutcome::Disconnected => "disconnected",
        DisconnectOutcome::NotConnected => "not connected",
    };
    Ok(Json(json!({ "status": status })))
}

/// POST /getmessage
pub async fn get_message(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let (req, _) = parse::<NameRequest>(body)?;
    match state.relay.poll(&req.name, req.token.as_deref())? {
        Some(message) => Ok(Json(json!({ "status": "success", "message": message }))),
        None => Ok(Json(json!({ "status": "no message" }))),
    }
}

/// POST /sendmessage
pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let (req, _) = parse::<SendRequest>(body)?;
    state.relay.send_event(&req.event, &req.data)?;
    Ok(Json(json!({ "status": "success" })))
}

/// POST /sendmessagetoclient
pub async fn send_message_to_client(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let (req, _) = parse::<QueueRequest>(body)?;
    state.relay.queue_for_client(&req.name, req.message)?;
    Ok(Json(json!({ "status": "success" })))
}

/// GET /getclients
pub async fn get_clients(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "clients": state.relay.clients() }))
}

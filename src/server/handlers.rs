//! Request handlers wrapping the Orchestrator Facade's three operations.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};

use crate::error::FacadeError;

use super::AppState;

/// Owner identity, taken from a header since real auth is out of scope (§1).
const OWNER_HEADER: &str = "x-owner";

fn owner_from(headers: &HeaderMap) -> String {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string()
}

fn facade_error_status(err: &FacadeError) -> StatusCode {
    match err {
        FacadeError::InvalidQuery => StatusCode::BAD_REQUEST,
        FacadeError::TooManyProcesses => StatusCode::TOO_MANY_REQUESTS,
        FacadeError::Unauthorized => StatusCode::UNAUTHORIZED,
        FacadeError::NotFound => StatusCode::NOT_FOUND,
        FacadeError::Forbidden => StatusCode::FORBIDDEN,
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(err: FacadeError) -> axum::response::Response {
    let status = facade_error_status(&err);
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct StartProcessRequest {
    pub query: String,
    /// Optional owner override; the `x-owner` header takes precedence when both are set,
    /// mirroring the header-first auth story this surface stands in for.
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartProcessResponse {
    pub process_id: String,
}

/// `POST /processes` — wraps `StartProcess`.
pub async fn start_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StartProcessRequest>,
) -> axum::response::Response {
    let owner = body.owner.unwrap_or_else(|| owner_from(&headers));
    match state.orchestrator.start_process(&body.query, &owner).await {
        Ok(process_id) => Json(StartProcessResponse { process_id }).into_response(),
        Err(err) => error_response(err),
    }
}

/// `GET /processes/:id/events` — wraps `Subscribe`, returning a Server-Sent Events stream
/// of the JSON envelope described in SPEC_FULL §6. Attaching detaches any prior subscriber
/// per the exclusivity rule (§4.1/§8 property 10).
pub async fn subscribe(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
    headers: HeaderMap,
) -> axum::response::Response {
    let owner = owner_from(&headers);
    let subscription = match state.orchestrator.subscribe(&process_id, &owner).await {
        Ok(sub) => sub,
        Err(err) => return error_response(err),
    };

    // `unfold` state: `Some((sub, process_id))` while still receiving, `None` once `DONE`
    // has been yielded — the spec requires the stream terminate after `DONE` (§6), so the
    // *next* poll must end the stream rather than block forever on another `recv`.
    let stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> =
        Box::pin(stream::unfold(
            Some((subscription, process_id)),
            move |state| async move {
                let (mut sub, process_id) = state?;
                let (seq, event) = sub.recv_with_seq().await?;
                let is_done = matches!(event, crate::models::ExecutionEvent::Done);
                let wire = event.to_wire(&process_id, seq);
                let sse_event = Event::default().json_data(wire).unwrap_or_else(|_| {
                    Event::default().data("{\"type\":\"ERROR\",\"content\":{}}")
                });
                let next_state = if is_done { None } else { Some((sub, process_id)) };
                Some((Ok(sse_event), next_state))
            },
        ));

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

/// `POST /processes/:id/cancel` — wraps `Cancel`.
pub async fn cancel(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
    headers: HeaderMap,
) -> axum::response::Response {
    let owner = owner_from(&headers);
    match state.orchestrator.cancel(&process_id, &owner).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => error_response(err),
    }
}

/// `GET /processes/:id/status` — lightweight polling endpoint alongside the SSE stream,
/// useful for a client that reconnected and wants to know if it missed the terminal event.
pub async fn status(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
    headers: HeaderMap,
) -> axum::response::Response {
    let owner = owner_from(&headers);
    match state.orchestrator.status(&process_id, &owner).await {
        Ok(status) => Json(serde_json::json!({ "status": status })).into_response(),
        Err(err) => error_response(err),
    }
}

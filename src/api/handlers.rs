//! REST API handlers.
//!
//! Every handler resolves the caller's session from the request cookies
//! and returns the response headers alongside its body, so a newly issued
//! session cookie always reaches the client.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use super::types::{
    ActionResponse, ErrorResponse, SessionResponse, SetValueRequest, ValueResponse,
};
use crate::error::SessionError;
use crate::session::{SessionManager, Value};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

impl AppState {
    pub fn new(manager: SessionManager) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }
}

type ApiResult<T> = Result<(HeaderMap, Json<T>), (StatusCode, HeaderMap, Json<ErrorResponse>)>;

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// API information endpoint.
pub async fn api_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.manager.config();
    Json(serde_json::json!({
        "name": "cookie-sessions",
        "version": env!("CARGO_PKG_VERSION"),
        "cookie": config.cookie_name,
        "ttl_secs": config.expires.as_secs(),
        "sessions": state.manager.len(),
    }))
}

/// Return every value in the caller's session.
pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (HeaderMap, Json<SessionResponse>) {
    let mut response = HeaderMap::new();
    let session = state.manager.start(&headers, &mut response);
    (response, Json(SessionResponse::from_session(&session)))
}

/// Merge a JSON object into the caller's session.
pub async fn merge_values(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<SessionResponse> {
    let mut response = HeaderMap::new();
    let session = state.manager.start(&headers, &mut response);

    let serde_json::Value::Object(entries) = body else {
        return Err((
            StatusCode::BAD_REQUEST,
            response,
            Json(ErrorResponse::bad_request("expected a JSON object")),
        ));
    };
    for (key, value) in entries {
        session.set(key, Value::from(value));
    }

    Ok((response, Json(SessionResponse::from_session(&session))))
}

/// Read one value.
pub async fn get_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> ApiResult<ValueResponse> {
    let mut response = HeaderMap::new();
    let session = state.manager.start(&headers, &mut response);

    match session.get(&key) {
        Some(value) => Ok((
            response,
            Json(ValueResponse {
                value: value.to_json(),
                key,
            }),
        )),
        None => Err((
            StatusCode::NOT_FOUND,
            response,
            Json(ErrorResponse::value_not_found(&key)),
        )),
    }
}

/// Store one value.
pub async fn put_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SetValueRequest>,
) -> (HeaderMap, Json<ValueResponse>) {
    let mut response = HeaderMap::new();
    let session = state.manager.start(&headers, &mut response);

    let value = Value::from(req.value.clone());
    if req.immutable {
        session.set_immutable(key.clone(), value);
    } else {
        session.set(key.clone(), value);
    }

    (
        response,
        Json(ValueResponse {
            key,
            value: req.value,
        }),
    )
}

/// Remove one value.
pub async fn delete_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> (HeaderMap, Json<ActionResponse>) {
    let mut response = HeaderMap::new();
    let session = state.manager.start(&headers, &mut response);
    let deleted = session.delete(&key);
    (
        response,
        Json(ActionResponse::new(session.id().as_str(), "deleted", deleted)),
    )
}

/// Remove every value but keep the session.
pub async fn clear_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (HeaderMap, Json<ActionResponse>) {
    let mut response = HeaderMap::new();
    let session = state.manager.start(&headers, &mut response);
    let changed = !session.is_empty();
    session.clear();
    (
        response,
        Json(ActionResponse::new(session.id().as_str(), "cleared", changed)),
    )
}

/// Destroy the caller's session and expire its cookie.
pub async fn destroy_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (HeaderMap, Json<ActionResponse>) {
    let mut response = HeaderMap::new();
    let id = state.manager.session_id(&headers).unwrap_or_default();
    let existed = state.manager.contains(id.as_str());
    state.manager.destroy(&headers, &mut response);
    (
        response,
        Json(ActionResponse::new(id.as_str(), "destroyed", existed)),
    )
}

/// Extend the caller's session by the configured TTL.
pub async fn shift_expiration(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<ActionResponse> {
    let mut response = HeaderMap::new();
    match state.manager.shift_expiration(&headers, &mut response) {
        Ok(()) => {
            let id = state.manager.session_id(&headers).unwrap_or_default();
            Ok((
                response,
                Json(ActionResponse::new(id.as_str(), "shifted", true)),
            ))
        }
        Err(SessionError::NoSession) => Err((
            StatusCode::NOT_FOUND,
            response,
            Json(ErrorResponse::no_session()),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            response,
            Json(ErrorResponse::internal_error(e.to_string())),
        )),
    }
}

/// Queue a flash message for the next read.
pub async fn set_flash(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(value): Json<serde_json::Value>,
) -> (HeaderMap, Json<ActionResponse>) {
    let mut response = HeaderMap::new();
    let session = state.manager.start(&headers, &mut response);
    session.set_flash(key, Value::from(value));
    (
        response,
        Json(ActionResponse::new(session.id().as_str(), "flashed", true)),
    )
}

/// Consume a flash message.
pub async fn get_flash(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> ApiResult<ValueResponse> {
    let mut response = HeaderMap::new();
    let session = state.manager.start(&headers, &mut response);

    match session.get_flash(&key) {
        Some(value) => Ok((
            response,
            Json(ValueResponse {
                value: value.to_json(),
                key,
            }),
        )),
        None => Err((
            StatusCode::NOT_FOUND,
            response,
            Json(ErrorResponse::flash_not_found(&key)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = health().await;
        assert_eq!(response, "OK");
    }

    #[tokio::test]
    async fn test_api_info_endpoint() {
        let state = AppState::new(SessionManager::new(SessionConfig::default()).unwrap());
        let Json(json) = api_info(State(state)).await;
        assert_eq!(json["name"], "cookie-sessions");
        assert_eq!(json["cookie"], "sessionid");
        assert_eq!(json["sessions"], 0);
    }

    #[tokio::test]
    async fn test_get_session_issues_cookie() {
        let state = AppState::new(SessionManager::new(SessionConfig::default()).unwrap());
        let (headers, Json(body)) = get_session(State(state.clone()), HeaderMap::new()).await;
        assert!(headers.contains_key(axum::http::header::SET_COOKIE));
        assert_eq!(body.count, 0);
        assert!(state.manager.contains(&body.session_id));
    }
}

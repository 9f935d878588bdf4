//! Tessera Server
//!
//! HTTP surface of an extension node:
//!
//! | route                          | behavior                                   |
//! |--------------------------------|--------------------------------------------|
//! | `GET /`                        | health check, `OK`                         |
//! | `POST /operator/{operator_id}` | queue an invocation and answer `"Ok"`      |
//!
//! The invocation response never carries a result. Outputs and errors
//! reach the dispatcher through its callbacks once a worker has run the
//! operator.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tessera_runtime::{ExtensionRuntime, InvocationBody, InvocationSender};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
  runtime: Arc<ExtensionRuntime>,
  sender: InvocationSender,
}

impl AppState {
  pub fn new(runtime: Arc<ExtensionRuntime>, sender: InvocationSender) -> Self {
    Self { runtime, sender }
  }
}

/// Build the router with tracing and permissive CORS.
pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/", get(health))
    .route("/operator/{operator_id}", post(invoke))
    .with_state(state)
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
}

async fn health() -> &'static str {
  "OK"
}

async fn invoke(
  State(state): State<AppState>,
  Path(operator_id): Path<String>,
  body: Result<Json<InvocationBody>, JsonRejection>,
) -> Response {
  let Json(body) = match body {
    Ok(body) => body,
    Err(rejection) => {
      warn!(operator_id = %operator_id, error = %rejection, "malformed invocation body");
      return (rejection.status(), rejection.body_text()).into_response();
    }
  };

  let request = match state.runtime.request(&operator_id, body) {
    Ok(request) => request,
    Err(e) => {
      warn!(operator_id = %operator_id, error = %e, "invocation rejected");
      return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
  };

  let node_id = request.node_id.clone();
  match state.sender.try_submit(request) {
    Ok(()) => {
      debug!(operator_id = %operator_id, node_id = %node_id, "invocation queued");
      (StatusCode::OK, Json("Ok")).into_response()
    }
    Err(e) => {
      warn!(operator_id = %operator_id, node_id = %node_id, error = %e, "invocation not queued");
      (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
    }
  }
}

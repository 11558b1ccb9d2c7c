use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::StreamExt;
use lifeos_core::Error;
use lifeos_orchestrator::{Orchestrator, TurnRequest};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::build_orchestrator;

#[derive(Clone)]
struct GatewayState {
    orchestrator: Arc<Orchestrator>,
    api_token: Option<String>,
    model: String,
    started_at: Instant,
}

fn secure_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (&x, &y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

async fn auth_middleware(
    State(state): State<GatewayState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match &state.api_token {
        Some(t) if !t.is_empty() => t.clone(),
        _ => return next.run(req).await,
    };

    if req.uri().path() == "/api/health" {
        return next.run(req).await;
    }

    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let authorized = match auth_header {
        Some(h) if h.starts_with("Bearer ") => secure_eq(&h[7..], &token),
        _ => false,
    };

    if authorized {
        next.run(req).await
    } else {
        let _ = state.orchestrator.audit().log_authentication(
            None,
            false,
            None,
            None,
            Some("invalid or missing bearer token"),
        );
        (
            StatusCode::UNAUTHORIZED,
            "Unauthorized: invalid or missing Bearer token",
        )
            .into_response()
    }
}

fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::Session(_) => StatusCode::NOT_FOUND,
        Error::UnknownAgent(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!({"success": false, "error": err.to_string()})),
    )
        .into_response()
}

async fn handle_chat(
    State(state): State<GatewayState>,
    Json(request): Json<TurnRequest>,
) -> Response {
    match state.orchestrator.handle_message(request).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => {
            warn!(error = %err, "Chat turn failed");
            error_response(err)
        }
    }
}

async fn handle_chat_stream(
    State(state): State<GatewayState>,
    Json(request): Json<TurnRequest>,
) -> Response {
    match state.orchestrator.handle_message_stream(request).await {
        Ok(rx) => {
            let stream = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|frame| (frame, rx))
            })
            .map(|frame| Event::default().json_data(&frame));
            Sse::new(stream)
                .keep_alive(KeepAlive::default())
                .into_response()
        }
        Err(err) => {
            warn!(error = %err, "Stream turn failed to start");
            error_response(err)
        }
    }
}

async fn handle_agents() -> impl IntoResponse {
    Json(serde_json::json!({"agents": Orchestrator::available_agents()}))
}

#[derive(Deserialize)]
struct SessionsQuery {
    user_id: Option<String>,
}

async fn handle_sessions(
    State(state): State<GatewayState>,
    Query(query): Query<SessionsQuery>,
) -> Response {
    match state.orchestrator.db().list_sessions(query.user_id.as_deref()) {
        Ok(sessions) => Json(serde_json::json!({"sessions": sessions})).into_response(),
        Err(err) => error_response(err),
    }
}

async fn handle_session_messages(
    State(state): State<GatewayState>,
    AxumPath(session_id): AxumPath<String>,
) -> Response {
    let db = state.orchestrator.db();
    match db.get_session(&session_id) {
        Ok(Some(_)) => match db.list_messages(&session_id) {
            Ok(messages) => Json(serde_json::json!({"messages": messages})).into_response(),
            Err(err) => error_response(err),
        },
        Ok(None) => error_response(Error::Session(format!("Session not found: {}", session_id))),
        Err(err) => error_response(err),
    }
}

async fn handle_delete_session(
    State(state): State<GatewayState>,
    AxumPath(session_id): AxumPath<String>,
) -> Response {
    match state.orchestrator.delete_session(&session_id) {
        Ok(true) => Json(serde_json::json!({"deleted": true})).into_response(),
        Ok(false) => error_response(Error::Session(format!("Session not found: {}", session_id))),
        Err(err) => error_response(err),
    }
}

async fn handle_health(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "model": state.model,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn run(cli_host: Option<String>, cli_port: Option<u16>) -> anyhow::Result<()> {
    let (config, orchestrator) = build_orchestrator()?;

    let state = GatewayState {
        orchestrator,
        api_token: config.gateway.api_token.clone(),
        model: config.provider.model.clone(),
        started_at: Instant::now(),
    };

    let app = Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/chat/stream", post(handle_chat_stream))
        .route("/api/agents", get(handle_agents))
        .route("/api/sessions", get(handle_sessions))
        .route("/api/sessions/:id/messages", get(handle_session_messages))
        .route("/api/sessions/:id", delete(handle_delete_session))
        .route("/api/health", get(handle_health))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let host = cli_host.unwrap_or_else(|| config.gateway.host.clone());
    let port = cli_port.unwrap_or(config.gateway.port);
    let bind_addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

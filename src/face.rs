use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::dispatcher::DispatcherHandle;
use crate::types::{CallerEvent, StartRequest};

/// Number of consecutive ports tried when the preferred one is taken.
pub const PORT_ATTEMPTS: u16 = 10;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: DispatcherHandle,
}

pub fn router(dispatcher: DispatcherHandle) -> Router {
    let state = Arc::new(AppState { dispatcher });
    Router::new()
        .route("/start-process", post(start_process_handler))
        .route("/sessions", get(sessions_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Bind `port`, falling back through the next few ports if it is in use.
pub async fn bind(port: u16) -> std::io::Result<(TcpListener, u16)> {
    let mut last_err = None;
    for p in port..port.saturating_add(PORT_ATTEMPTS) {
        match TcpListener::bind(format!("127.0.0.1:{}", p)).await {
            Ok(listener) => {
                let bound = listener.local_addr()?.port();
                return Ok((listener, bound));
            }
            Err(e) => {
                warn!("Port {} unavailable: {}", p, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| std::io::Error::other("no port to bind")))
}

fn to_sse_event(event: &CallerEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".into());
    Event::default().event(event.name()).data(data)
}

/// Opens a session and streams its reply channel back as SSE.
async fn start_process_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> Response {
    info!("Start requested for tab {}", request.tab_id);
    let (reply, events) = mpsc::unbounded_channel();

    match state.dispatcher.start_process(request, reply).await {
        Ok(work_id) => {
            let stream = tokio_stream::once(CallerEvent::Started { work_id })
                .chain(UnboundedReceiverStream::new(events))
                .map(|event| Ok::<_, Infallible>(to_sse_event(&event)));
            Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
        }
        Err(e) => {
            let body = CallerEvent::ProcessError {
                error: e.to_string(),
                details: None,
            };
            (StatusCode::BAD_GATEWAY, Json(body)).into_response()
        }
    }
}

async fn sessions_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.dispatcher.list_sessions().await {
        Ok(ids) => Json(ids).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

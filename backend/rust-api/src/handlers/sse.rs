use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension,
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::{error::RecvError, Receiver};

use crate::{
    error::ApiError,
    metrics::SSE_CONNECTIONS_ACTIVE,
    middlewares::auth::JwtClaims,
    models::quiz_event::QuizEvent,
    services::AppState,
};

/// SSE endpoint for the countdown of a timed quiz session
/// GET /api/v1/quiz-sessions/{id}/stream
pub async fn quiz_session_stream(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Client connected to SSE stream: session={}", session_id);

    let requester = claims.as_ref().map(|Extension(c)| c.sub.as_str());
    let receiver = state.quizzes.subscribe(&session_id, requester).await?;

    Ok(Sse::new(session_event_stream(session_id, receiver)).keep_alive(KeepAlive::default()))
}

/// Decrements the connection gauge when the stream is dropped
struct ConnectionGuard;

impl ConnectionGuard {
    fn open() -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        ConnectionGuard
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
    }
}

fn to_sse_event(event: &QuizEvent) -> Event {
    let sse = Event::default().event(event.name());
    match serde_json::to_string(event) {
        Ok(data) => sse.data(data),
        Err(e) => {
            tracing::warn!("Failed to encode quiz event: {}", e);
            sse.data("{}")
        }
    }
}

/// Relays registry events until a closing event has been sent or the
/// session is gone.
fn session_event_stream(
    session_id: String,
    receiver: Receiver<QuizEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let guard = ConnectionGuard::open();

    stream::unfold(
        (session_id, receiver, false, guard),
        |(sid, mut rx, closed, guard)| async move {
            if closed {
                return None;
            }

            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let closing = event.is_closing();
                        if closing {
                            tracing::info!("Closing SSE stream ({}): session={}", event.name(), sid);
                        }
                        return Some((Ok(to_sse_event(&event)), (sid, rx, closing, guard)));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("SSE client lagged by {} events: session={}", skipped, sid);
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Quiz event channel closed: session={}", sid);
                        return None;
                    }
                }
            }
        },
    )
}

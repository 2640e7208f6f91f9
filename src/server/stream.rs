//! Server-Sent Events
//!
//! Read-only mirror of the event bus for clients that cannot hold a
//! WebSocket. Each SSE event is named after the network event's `type`.

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use super::health::AppState;

/// GET /api/events - every network event as it happens
pub async fn stream_events(State(state): State<AppState>) -> Response {
    let rx = state.network.events().subscribe();

    let stream = BroadcastStream::new(rx).map(|result| {
        Ok::<_, std::convert::Infallible>(match result {
            Ok(event) => Event::default()
                .event(event.kind())
                .data(serde_json::to_string(&event).unwrap_or_default()),
            Err(_) => Event::default()
                .event("warning")
                .data(r#"{"message":"Some events were skipped"}"#),
        })
    });

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(30))
                .text("heartbeat"),
        )
        .into_response()
}

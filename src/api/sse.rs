//! Server-Sent Events support

use crate::studio::{StudioEvent, StudioSnapshot};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert broadcast stream to SSE stream
pub fn sse_stream(
    init: StudioSnapshot,
    broadcast_rx: tokio::sync::broadcast::Receiver<StudioEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Start with the full snapshot, then live changes
    let init = futures::stream::once(async move { Ok(init_event(&init)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(studio_event_to_axum(&event))),
        Err(e) => {
            tracing::debug!(error = %e, "SSE subscriber lagged");
            None
        }
    });

    let combined = init.chain(broadcasts);

    Sse::new(combined).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn init_event(snapshot: &StudioSnapshot) -> Event {
    let data = json!({
        "type": "init",
        "state": snapshot,
    });
    Event::default().event("init").data(data.to_string())
}

fn studio_event_to_axum(event: &StudioEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize studio event");
        json!({ "type": "error", "message": e.to_string() }).to_string()
    });
    Event::default().event(event.name()).data(data)
}

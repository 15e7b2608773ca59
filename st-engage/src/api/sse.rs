//! SSE bridge for engagement events
//!
//! Streams every EngageEvent to connected view bindings so they can mirror
//! reconciled state without polling.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use super::AppState;

/// GET /events - SSE stream of engagement events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.engine.subscribe();
    info!(
        "New SSE client connected, total clients: {}",
        state.engine.subscriber_count()
    );

    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(engage_event) => {
                let event = Event::default()
                    .event(engage_event.event_type())
                    .json_data(&engage_event)
                    .ok();
                event.map(Ok)
            }
            Err(err) => {
                // Lagged subscriber; skip and keep streaming
                warn!("SSE client error: {:?}", err);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

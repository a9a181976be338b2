//! SSE event stream for the presentation layer

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::AppState;

/// GET /events
///
/// Streams every CodaEvent as an SSE event named after the event type.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(
        clients = state.event_bus.subscriber_count() + 1,
        "New SSE client connected"
    );

    let rx = state.event_bus.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(coda_event) => {
                let value = serde_json::to_value(&coda_event).ok()?;
                let name = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("event")
                    .to_string();
                Event::default()
                    .event(name)
                    .json_data(&coda_event)
                    .ok()
                    .map(Ok)
            }
            Err(e) => {
                // BroadcastStream wraps RecvError; a lagged subscriber just
                // misses events
                warn!("SSE client lagged: {:?}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

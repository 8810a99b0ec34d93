use crate::events::Event;
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;

/// Operation steps, rebalance progress and completions as server-sent events.
pub(crate) async fn event_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = BroadcastStream::new(state.event_hub.subscribe()).filter_map(|received| {
        let event: Event = match received {
            Ok(event) => event,
            Err(e) => {
                debug!("SSE subscriber skipped events: {}", e);
                return None;
            }
        };
        serde_json::to_string(&event)
            .ok()
            .map(|json| Ok(SseEvent::default().event(event.event_type()).data(json)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

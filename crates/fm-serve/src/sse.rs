use crate::routes::error::map_error;
use crate::{AppState, build_foreman};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use fm_events::types::EventRecord;
use futures::stream::{self, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

fn to_sse_event(record: &EventRecord) -> Event {
    let json = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
    // The SSE id is the event seq so Last-Event-ID maps onto ?after=.
    Event::default().id(record.seq.to_string()).data(json)
}

/// Replays history from `after` and then follows the live bus. A client that
/// reconnects with its last seen seq misses nothing.
pub async fn subscribe(state: AppState, after: Option<i64>) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, None).into_response(),
    };
    let history = match foreman.events().list(after, None) {
        Ok(events) => events,
        Err(err) => return map_error(&err, None).into_response(),
    };
    let history_stream = stream::iter(
        history
            .into_iter()
            .map(|record| Ok::<Event, std::convert::Infallible>(to_sse_event(&record))),
    );

    let live_stream = BroadcastStream::new(state.event_bus.subscribe()).filter_map(|item| async {
        match item {
            Ok(record) => Some(Ok(to_sse_event(&record))),
            // A lagged receiver dropped events; the client re-syncs by
            // reconnecting with its last id.
            Err(_) => None,
        }
    });

    let stream = history_stream.chain(live_stream);
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

//! Server-sent change stream.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;

use crate::AppState;

/// GET /api/changes - Stream every committed change as a `change` event.
///
/// A subscriber that falls behind the buffer receives a `lagged` event and
/// should refetch the snapshot.
pub async fn stream_changes(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.changes.subscribe();
    tracing::debug!(subscribers = state.changes.subscriber_count(), "Change stream opened");

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(notification) => match Event::default()
            .event("change")
            .id(notification.revision_id.to_string())
            .json_data(&notification.event)
        {
            Ok(event) => Some(Ok::<_, Infallible>(event)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode change event");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "Change stream subscriber lagged");
            Some(Ok(Event::default()
                .event("lagged")
                .data(format!("{{\"skipped\":{}}}", skipped))))
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

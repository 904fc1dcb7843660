//! Server-sent progress events.
//!
//! `GET /api/v1/events` subscribes the caller to the project's event bus and
//! streams every workflow's events as `event: <name>\ndata: <json>\n\n`
//! frames. Subscribers that fall a full mailbox behind are dropped rather
//! than stalling the publisher; clients filter by workflow ID themselves.

use std::convert::Infallible;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures_util::Stream;
use tokio::sync::broadcast::error::RecvError;

use crate::project::Scope;

/// GET /api/v1/events - upgrade to an SSE stream of workflow progress.
pub async fn stream_events(
    scope: Scope,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let project = scope.0.id.clone();
    let mut rx = scope.0.bus.subscribe();
    tracing::debug!(project = project.as_str(), "SSE subscriber attached");

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = serde_json::to_string(&event)
                        .unwrap_or_else(|_| "{}".to_string());
                    yield Ok(SseEvent::default().event(event.name()).data(data));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        project = project.as_str(),
                        skipped,
                        "dropping slow SSE subscriber"
                    );
                    break;
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

//! Server-Sent Events for session progress streaming
//!
//! Re-subscribing replays the latest event per stage before tailing the
//! live bus, so a late subscriber sees a consistent prefix. The stream
//! is finite: it ends after the session's terminal event.

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::ApiResult;
use crate::AppState;

/// GET /sessions/:id/events — SSE progress stream for one session
pub async fn session_event_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let registry = state.orchestrator.registry();
    // Subscribe before replay so no live event slips between the two
    let mut rx = state.orchestrator.bus().subscribe();
    let replayed = registry.replay(id).await?;

    info!(session_id = %id, replayed = replayed.len(), "SSE subscriber connected");

    let stream = async_stream::stream! {
        let mut finished = false;
        for event in replayed {
            let terminal = event.is_terminal();
            if let Ok(json) = serde_json::to_string(&event) {
                yield Ok(Event::default().event(event.event_type()).data(json));
            }
            if terminal {
                finished = true;
            }
        }

        while !finished {
            tokio::select! {
                // Heartbeat keeps intermediaries from closing the stream
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!(session_id = %id, "SSE heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    match received {
                        Ok(event) if event.session_id() == id => {
                            let terminal = event.is_terminal();
                            match serde_json::to_string(&event) {
                                Ok(json) => {
                                    yield Ok(Event::default()
                                        .event(event.event_type())
                                        .data(json));
                                }
                                Err(e) => {
                                    warn!(session_id = %id, error = %e, "SSE serialization failed");
                                }
                            }
                            if terminal {
                                finished = true;
                            }
                        }
                        Ok(_) => {
                            // Another session's event
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            // Slow subscriber dropped events; order is preserved
                            warn!(session_id = %id, skipped, "SSE subscriber lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            finished = true;
                        }
                    }
                }
            }
        }

        info!(session_id = %id, "SSE stream finished");
    };

    Ok(Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

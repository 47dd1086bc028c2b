//! The SSE endpoint.
//!
//! Each subscriber drains its hub queue into an `axum` SSE response.
//! Heartbeats ride on the keep-alive comment frame; the hub guard inside
//! the stream unregisters the subscriber the moment the stream drops.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Deserialize;

use super::error::ApiError;
use crate::sse::{SseHub, Subscriber, SubscriberFilter};
use crate::state::AppState;

/// Optional per-client filters on the live stream.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    agent_type: Option<String>,
    event_type: Option<String>,
}

/// GET /api/stream
pub async fn stream_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let filter = SubscriberFilter {
        agent_type: query.agent_type,
        event_type: query.event_type,
    };

    let subscriber = SseHub::subscribe(&state.hub, filter).ok_or(ApiError::Saturated {
        max_clients: state.hub.max_clients(),
    })?;

    let stream = frames(subscriber);
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_millis(state.config.sse_heartbeat_ms))
            .text("heartbeat"),
    ))
}

/// Drain the subscriber queue into SSE data frames. The subscriber (and
/// with it the registry guard) lives inside the stream state.
fn frames(subscriber: Subscriber) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold(subscriber, |mut subscriber| async move {
        let message = subscriber.rx.recv().await?;
        Some((Ok(Event::default().data(message)), subscriber))
    })
}

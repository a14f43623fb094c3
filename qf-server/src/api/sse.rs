//! Server-Sent Events transport for one session room
//!
//! The stream joins the room when opened and leaves it when the client goes
//! away and the stream is dropped.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use qf_common::rooms::Subscription;
use qf_common::RoomBroadcaster;
use tracing::{debug, info, warn};

use super::ApiError;
use crate::AppState;

/// Leaves every room when the owning stream is dropped
struct RoomGuard {
    rooms: Arc<RoomBroadcaster>,
    connection_id: String,
}

impl Drop for RoomGuard {
    fn drop(&mut self) {
        self.rooms.disconnect(&self.connection_id);
        debug!(conn_id = %self.connection_id, "SSE client disconnected");
    }
}

/// GET /api/sessions/:id/events
pub async fn session_event_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = state.sessions.get(&id).await?;

    let Subscription {
        connection_id,
        mut receiver,
    } = state.rooms.connect();
    let guard = RoomGuard {
        rooms: Arc::clone(&state.rooms),
        connection_id: connection_id.clone(),
    };
    state.rooms.join(&connection_id, &session.id)?;
    info!(conn_id = %connection_id, session_id = %session.id, "SSE client connected");

    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(message) = receiver.recv().await {
            match Event::default().event(message.event).json_data(&message.data) {
                Ok(event) => yield Ok::<Event, Infallible>(event),
                Err(e) => warn!("SSE: Failed to encode event {}: {}", message.event, e),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

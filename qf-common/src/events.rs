//! Realtime event types for session rooms
//!
//! Every state change made by the doubt ledger or confusion aggregator is
//! published to the owning session's room as one of these events. The wire
//! name is what clients subscribe to; the payload is the JSON body.

use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{ConfusionSnapshot, Doubt};

/// Events delivered to the members of a session room
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new canonical doubt was created
    NewDoubt(Doubt),

    /// A submission was folded into an existing canonical doubt
    DoubtMerged { doubt: Doubt, merged_count: i64 },

    /// The instructor answered a doubt
    DoubtAnswered(Doubt),

    /// A student toggled their upvote on a doubt
    DoubtUpvoted(Doubt),

    /// The sliding-window confusion distribution changed
    ConfusionUpdated(ConfusionSnapshot),

    /// Another connection joined the room
    UserJoined { socket_id: String },
}

impl SessionEvent {
    /// Wire name of the event
    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::NewDoubt(_) => "new-doubt",
            SessionEvent::DoubtMerged { .. } => "doubt-merged",
            SessionEvent::DoubtAnswered(_) => "doubt-answered",
            SessionEvent::DoubtUpvoted(_) => "doubt-upvoted",
            SessionEvent::ConfusionUpdated(_) => "confusion-updated",
            SessionEvent::UserJoined { .. } => "user-joined",
        }
    }

    /// JSON payload of the event
    pub fn payload(&self) -> serde_json::Result<Value> {
        match self {
            SessionEvent::NewDoubt(doubt)
            | SessionEvent::DoubtAnswered(doubt)
            | SessionEvent::DoubtUpvoted(doubt) => serde_json::to_value(doubt),
            SessionEvent::DoubtMerged { doubt, merged_count } => Ok(json!({
                "doubt": serde_json::to_value(doubt)?,
                "mergedCount": merged_count,
            })),
            SessionEvent::ConfusionUpdated(snapshot) => serde_json::to_value(snapshot),
            SessionEvent::UserJoined { socket_id } => Ok(json!({ "socketId": socket_id })),
        }
    }
}

/// Serialized event as handed to a connection's outbound queue
#[derive(Debug, Clone, Serialize)]
pub struct RoomMessage {
    /// Room (session identity) the event was published to
    #[serde(skip)]
    pub session_id: String,

    /// Event name
    pub event: &'static str,

    /// Event payload
    pub data: Value,
}

impl RoomMessage {
    pub fn from_event(session_id: &str, event: &SessionEvent) -> serde_json::Result<Self> {
        Ok(Self {
            session_id: session_id.to_string(),
            event: event.event_name(),
            data: event.payload()?,
        })
    }

    /// Frame sent over message-oriented transports: `{"event": ..., "data": ...}`
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

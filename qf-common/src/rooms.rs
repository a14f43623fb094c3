//! Session room broadcaster
//!
//! Explicit mapping from session identity to the set of connections subscribed
//! to it. Join, leave and disconnect are pure mutations of that map; a
//! transport (WebSocket, SSE) only owns the receiving half of a connection's
//! outbound queue.
//!
//! Every connection has its own bounded FIFO queue and all mutations and fan-out
//! iterations happen under one mutex, so events published to a room reach each
//! member in emission order. A member whose queue is full is evicted instead of
//! skipping events.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{RoomMessage, SessionEvent};
use crate::{Error, Result};

/// Opaque handle identifying one realtime connection
pub type ConnectionId = String;

/// Receiving half handed to the transport when a connection registers
pub struct Subscription {
    pub connection_id: ConnectionId,
    pub receiver: mpsc::Receiver<Arc<RoomMessage>>,
}

struct Connection {
    tx: mpsc::Sender<Arc<RoomMessage>>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct Registry {
    rooms: HashMap<String, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, Connection>,
}

impl Registry {
    fn remove_from_room(&mut self, connection_id: &str, session_id: &str) -> bool {
        let removed = match self.rooms.get_mut(session_id) {
            Some(members) => members.remove(connection_id),
            None => false,
        };
        if self.rooms.get(session_id).is_some_and(|m| m.is_empty()) {
            self.rooms.remove(session_id);
        }
        if let Some(conn) = self.connections.get_mut(connection_id) {
            conn.rooms.remove(session_id);
        }
        removed
    }

    fn remove_connection(&mut self, connection_id: &str) -> Vec<String> {
        let Some(conn) = self.connections.remove(connection_id) else {
            return Vec::new();
        };
        let mut left: Vec<String> = conn.rooms.into_iter().collect();
        left.sort();
        for session_id in &left {
            if let Some(members) = self.rooms.get_mut(session_id) {
                members.remove(connection_id);
                if members.is_empty() {
                    self.rooms.remove(session_id);
                }
            }
        }
        left
    }

    /// Queue a message for every member of `session_id` except `exclude`
    ///
    /// Members whose queue is full or closed are evicted from all rooms.
    fn deliver(&mut self, session_id: &str, message: Arc<RoomMessage>, exclude: Option<&str>) -> usize {
        let Some(members) = self.rooms.get(session_id) else {
            return 0;
        };

        let mut delivered = 0;
        let mut evicted = Vec::new();
        for member in members {
            if exclude == Some(member.as_str()) {
                continue;
            }
            let Some(conn) = self.connections.get(member) else {
                continue;
            };
            match conn.tx.try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(conn_id = %member, session_id, event = message.event, "evicting slow client (queue full)");
                    evicted.push(member.clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(conn_id = %member, session_id, "dropping closed connection");
                    evicted.push(member.clone());
                }
            }
        }

        for id in evicted {
            self.remove_connection(&id);
        }
        delivered
    }
}

/// Delivers session events to exactly the connections joined to that session
pub struct RoomBroadcaster {
    registry: Mutex<Registry>,
    buffer: usize,
}

impl RoomBroadcaster {
    /// Create a broadcaster
    ///
    /// # Arguments
    ///
    /// * `buffer` - Outbound queue depth per connection (minimum 1)
    pub fn new(buffer: usize) -> Self {
        info!("Room broadcaster initialized with per-connection buffer {}", buffer);
        Self {
            registry: Mutex::new(Registry::default()),
            buffer: buffer.max(1),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new connection that is not yet in any room
    pub fn connect(&self) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.buffer);
        let connection_id = Uuid::new_v4().to_string();
        self.registry().connections.insert(
            connection_id.clone(),
            Connection {
                tx,
                rooms: HashSet::new(),
            },
        );
        debug!(conn_id = %connection_id, "connection registered");
        Subscription {
            connection_id,
            receiver,
        }
    }

    /// Add a connection to a session room and tell the other members
    ///
    /// Joining a room the connection is already in is a no-op and sends no
    /// notification. Returns the room size after the join.
    pub fn join(&self, connection_id: &str, session_id: &str) -> Result<usize> {
        let mut registry = self.registry();
        let Some(conn) = registry.connections.get_mut(connection_id) else {
            return Err(Error::NotFound(format!("Connection {}", connection_id)));
        };
        let newly_joined = conn.rooms.insert(session_id.to_string());
        registry
            .rooms
            .entry(session_id.to_string())
            .or_default()
            .insert(connection_id.to_string());

        if newly_joined {
            info!(conn_id = %connection_id, session_id, "joined session room");
            let event = SessionEvent::UserJoined {
                socket_id: connection_id.to_string(),
            };
            match RoomMessage::from_event(session_id, &event) {
                Ok(message) => {
                    registry.deliver(session_id, Arc::new(message), Some(connection_id));
                }
                Err(e) => warn!(error = %e, "failed to serialize user-joined event"),
            }
        }

        Ok(registry.rooms.get(session_id).map_or(0, |m| m.len()))
    }

    /// Remove a connection from a session room; returns whether it was a member
    pub fn leave(&self, connection_id: &str, session_id: &str) -> bool {
        let removed = self.registry().remove_from_room(connection_id, session_id);
        if removed {
            info!(conn_id = %connection_id, session_id, "left session room");
        }
        removed
    }

    /// Forget a connection entirely, leaving every room it was in
    ///
    /// Returns the rooms that were left. The connection's receiver observes
    /// end-of-stream once queued messages are drained.
    pub fn disconnect(&self, connection_id: &str) -> Vec<String> {
        let left = self.registry().remove_connection(connection_id);
        debug!(conn_id = %connection_id, rooms = left.len(), "connection closed");
        left
    }

    /// Publish an event to every connection currently joined to `session_id`
    ///
    /// Fire-and-forget: returns the number of connections the event was queued
    /// for.
    pub fn broadcast(&self, session_id: &str, event: &SessionEvent) -> usize {
        let message = match RoomMessage::from_event(session_id, event) {
            Ok(message) => Arc::new(message),
            Err(e) => {
                warn!(event = event.event_name(), error = %e, "failed to serialize event");
                return 0;
            }
        };
        let delivered = self.registry().deliver(session_id, message, None);
        debug!(event = event.event_name(), session_id, recipients = delivered, "broadcast event");
        delivered
    }

    /// Connections currently joined to a room
    pub fn members(&self, session_id: &str) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .registry()
            .rooms
            .get(session_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Rooms a connection is currently joined to, sorted
    pub fn rooms_of(&self, connection_id: &str) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .registry()
            .connections
            .get(connection_id)
            .map(|conn| conn.rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.registry().connections.len()
    }

    /// Number of non-empty rooms
    pub fn room_count(&self) -> usize {
        self.registry().rooms.len()
    }
}

impl Default for RoomBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

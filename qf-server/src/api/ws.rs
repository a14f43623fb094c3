//! WebSocket transport for session rooms
//!
//! Clients send `{"type":"join-session","sessionId":..}` and
//! `{"type":"leave-session","sessionId":..}`; the server pushes every room
//! event as `{"event":..,"data":..}`. Closing the socket leaves all rooms.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use qf_common::models::session_code;
use qf_common::rooms::Subscription;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::AppState;

/// Direct replies (errors) queued for one socket
const REPLY_BUFFER: usize = 16;

/// Commands a client may send
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ClientCommand {
    JoinSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    LeaveSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let Subscription {
        connection_id,
        mut receiver,
    } = state.rooms.connect();
    info!(conn_id = %connection_id, "WebSocket client connected");

    let (mut sink, mut stream) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(REPLY_BUFFER);

    let mut send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                message = receiver.recv() => match message {
                    Some(message) => message.to_frame(),
                    // disconnected or evicted
                    None => break,
                },
                Some(reply) = reply_rx.recv() => reply,
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader_state = state.clone();
    let reader_conn = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    handle_command(&reader_state, &reader_conn, &text, &reply_tx).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(conn_id = %reader_conn, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let left = state.rooms.disconnect(&connection_id);
    info!(conn_id = %connection_id, rooms = left.len(), "WebSocket client disconnected");
}

async fn handle_command(state: &AppState, connection_id: &str, text: &str, replies: &mpsc::Sender<String>) {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            send_error(replies, format!("Invalid message: {}", e)).await;
            return;
        }
    };

    match command {
        ClientCommand::JoinSession { session_id } => match state.sessions.get(&session_id).await {
            Ok(session) => {
                if let Err(e) = state.rooms.join(connection_id, &session.id) {
                    warn!(conn_id = %connection_id, error = %e, "join after disconnect");
                }
            }
            Err(e) => send_error(replies, e.to_string()).await,
        },
        ClientCommand::LeaveSession { session_id } => {
            let left = leave_matching(state, connection_id, &session_id);
            if left == 0 {
                debug!(conn_id = %connection_id, session = %session_id, "leave for a room not joined ignored");
            }
        }
    }
}

/// Leave every joined room named by `id_or_code`
///
/// Matches against the connection's own rooms so a code still works after
/// its session has ended and dropped out of the code index.
fn leave_matching(state: &AppState, connection_id: &str, id_or_code: &str) -> usize {
    let wanted = id_or_code.trim();
    let mut left = 0;
    for room in state.rooms.rooms_of(connection_id) {
        let named = room == wanted || session_code(&room).eq_ignore_ascii_case(wanted);
        if named && state.rooms.leave(connection_id, &room) {
            left += 1;
        }
    }
    left
}

async fn send_error(replies: &mpsc::Sender<String>, message: String) {
    let frame = json!({ "event": "error", "data": { "message": message } }).to_string();
    if replies.send(frame).await.is_err() {
        debug!("socket writer gone, dropping error frame");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qf_common::config::ServerConfig;
    use qf_common::db::init_memory_database;
    use qf_common::models::Session;
    use serde_json::Value;

    use crate::services::{DoubtSubmission, NewSession};

    async fn setup() -> (AppState, Session) {
        let db = init_memory_database().await.unwrap();
        let state = AppState::new(db, ServerConfig::default()).await.unwrap();
        let session = state
            .sessions
            .create(NewSession {
                title: "Networks".to_string(),
                ..NewSession::default()
            })
            .await
            .unwrap();
        (state, session)
    }

    fn command(kind: &str, session: &str) -> String {
        json!({ "type": kind, "sessionId": session }).to_string()
    }

    #[tokio::test]
    async fn test_join_by_code_receives_room_events() {
        let (state, session) = setup().await;
        let Subscription {
            connection_id,
            mut receiver,
        } = state.rooms.connect();
        let (replies, mut reply_rx) = mpsc::channel(4);

        handle_command(&state, &connection_id, &command("join-session", &session.code().to_lowercase()), &replies).await;
        assert_eq!(state.rooms.members(&session.id), vec![connection_id.clone()]);

        state
            .doubts
            .submit(
                &session.id,
                DoubtSubmission {
                    question: "How does TCP slow start work?".to_string(),
                    student_id: "alice".to_string(),
                    student_name: Some("Alice".to_string()),
                    is_anonymous: false,
                    confusion_level: None,
                },
            )
            .await
            .unwrap();

        let frame: Value = serde_json::from_str(&receiver.try_recv().unwrap().to_frame()).unwrap();
        assert_eq!(frame["event"], "new-doubt");
        assert_eq!(frame["data"]["question"], "How does TCP slow start work?");
        assert!(reply_rx.try_recv().is_err(), "no error reply expected");
    }

    #[tokio::test]
    async fn test_leave_by_code_after_session_ended() {
        let (state, session) = setup().await;
        let subscription = state.rooms.connect();
        let connection_id = subscription.connection_id.clone();
        let (replies, _reply_rx) = mpsc::channel(4);

        handle_command(&state, &connection_id, &command("join-session", &session.code()), &replies).await;
        state.sessions.end(&session.code()).await.unwrap();

        handle_command(&state, &connection_id, &command("leave-session", &session.code()), &replies).await;
        assert!(state.rooms.members(&session.id).is_empty());
        assert!(state.rooms.rooms_of(&connection_id).is_empty());
    }

    #[tokio::test]
    async fn test_leave_by_full_identity() {
        let (state, session) = setup().await;
        let subscription = state.rooms.connect();
        let connection_id = subscription.connection_id.clone();
        let (replies, _reply_rx) = mpsc::channel(4);

        handle_command(&state, &connection_id, &command("join-session", &session.id), &replies).await;
        handle_command(&state, &connection_id, &command("leave-session", &session.id), &replies).await;
        assert!(state.rooms.members(&session.id).is_empty());
    }

    #[tokio::test]
    async fn test_join_unknown_session_replies_with_error() {
        let (state, _session) = setup().await;
        let subscription = state.rooms.connect();
        let (replies, mut reply_rx) = mpsc::channel(4);

        handle_command(&state, &subscription.connection_id, &command("join-session", "ZZZZZZ"), &replies).await;
        let frame: Value = serde_json::from_str(&reply_rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "error");
        assert!(state.rooms.rooms_of(&subscription.connection_id).is_empty());

        handle_command(&state, &subscription.connection_id, "not json", &replies).await;
        let frame: Value = serde_json::from_str(&reply_rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "error");
    }

    #[test]
    fn test_parse_commands() {
        let join: ClientCommand =
            serde_json::from_str(r#"{"type":"join-session","sessionId":"AB12CD"}"#).unwrap();
        assert!(matches!(join, ClientCommand::JoinSession { session_id } if session_id == "AB12CD"));

        let leave: ClientCommand =
            serde_json::from_str(r#"{"type":"leave-session","sessionId":"s1"}"#).unwrap();
        assert!(matches!(leave, ClientCommand::LeaveSession { session_id } if session_id == "s1"));
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"shout","sessionId":"s1"}"#).is_err());
    }
}

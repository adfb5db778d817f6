//! Protocol Messages
//!
//! JSON envelopes exchanged over the WebSocket: `{"type": ..., "payload": ...}`.
//!
//! Inbound decoding happens in two steps. The envelope is parsed first so an
//! unknown `type` can be told apart from a bad payload, then the payload is
//! parsed for the specific message. Each failure maps to the reply text
//! existing clients expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::game::board::Mark;
use crate::game::state::{ChatRecord, GameSession, PlayerId, SessionId, SessionStatus};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Enter matchmaking.
    JoinQueue,
    /// Leave matchmaking.
    LeaveQueue,
    /// Place a mark.
    Move {
        /// Target session.
        game_id: SessionId,
        /// Requested cell.
        position: i64,
    },
    /// Post a chat line.
    Chat {
        /// Target session.
        game_id: SessionId,
        /// Raw message text.
        message: String,
    },
    /// Concede.
    Resign {
        /// Target session.
        game_id: SessionId,
    },
    /// Offer a draw.
    DrawOffer {
        /// Target session.
        game_id: SessionId,
    },
    /// Accept the pending draw offer.
    DrawAccept {
        /// Target session.
        game_id: SessionId,
    },
    /// Decline the pending draw offer.
    DrawDecline {
        /// Target session.
        game_id: SessionId,
    },
    /// Request a snapshot of the caller's active sessions.
    Sync,
}

/// Why an inbound frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not a JSON envelope.
    #[error("invalid message")]
    Malformed,
    /// Envelope `type` not recognised.
    #[error("unknown message type")]
    UnknownType(String),
    /// Payload missing or of the wrong shape.
    #[error("invalid payload")]
    InvalidPayload,
    /// `game_id` is not a UUID.
    #[error("invalid game_id")]
    InvalidGameId,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct MoveRequest {
    #[serde(default)]
    game_id: String,
    position: i64,
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    game_id: String,
    message: String,
}

#[derive(Deserialize)]
struct GameIdRequest {
    #[serde(default)]
    game_id: String,
}

impl ClientMessage {
    /// Decode one inbound text frame.
    pub fn from_json(s: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(s).map_err(|_| DecodeError::Malformed)?;

        let msg = match envelope.kind.as_str() {
            "join_queue" => ClientMessage::JoinQueue,
            "leave_queue" => ClientMessage::LeaveQueue,
            "sync" => ClientMessage::Sync,
            "move" => {
                let req: MoveRequest = payload(envelope.payload)?;
                ClientMessage::Move { game_id: parse_game_id(&req.game_id)?, position: req.position }
            }
            "chat" => {
                let req: ChatRequest = payload(envelope.payload)?;
                ClientMessage::Chat { game_id: parse_game_id(&req.game_id)?, message: req.message }
            }
            "resign" => ClientMessage::Resign { game_id: game_id_payload(envelope.payload)? },
            "draw_offer" => ClientMessage::DrawOffer { game_id: game_id_payload(envelope.payload)? },
            "draw_accept" => ClientMessage::DrawAccept { game_id: game_id_payload(envelope.payload)? },
            "draw_decline" => ClientMessage::DrawDecline { game_id: game_id_payload(envelope.payload)? },
            _ => return Err(DecodeError::UnknownType(envelope.kind)),
        };

        Ok(msg)
    }

    /// Wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinQueue => "join_queue",
            ClientMessage::LeaveQueue => "leave_queue",
            ClientMessage::Move { .. } => "move",
            ClientMessage::Chat { .. } => "chat",
            ClientMessage::Resign { .. } => "resign",
            ClientMessage::DrawOffer { .. } => "draw_offer",
            ClientMessage::DrawAccept { .. } => "draw_accept",
            ClientMessage::DrawDecline { .. } => "draw_decline",
            ClientMessage::Sync => "sync",
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|_| DecodeError::InvalidPayload)
}

fn game_id_payload(value: Value) -> Result<SessionId, DecodeError> {
    let req: GameIdRequest = payload(value)?;
    parse_game_id(&req.game_id)
}

fn parse_game_id(s: &str) -> Result<SessionId, DecodeError> {
    SessionId::from_uuid_str(s).ok_or(DecodeError::InvalidGameId)
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Caller is waiting for an opponent.
    QueueJoined {
        /// Always `"waiting"`.
        status: String,
    },
    /// Caller left the queue.
    QueueLeft {
        /// Always `"left"`.
        status: String,
    },
    /// A new session was created for the recipient.
    GameFound {
        /// The new session.
        game: GameView,
    },
    /// A session the recipient plays in changed.
    GameUpdate {
        /// Updated session.
        game: GameView,
    },
    /// Chat line in one of the recipient's sessions.
    Chat(ChatPayload),
    /// Snapshot of the recipient's active sessions.
    Sync {
        /// Active sessions, oldest first.
        games: Vec<GameView>,
    },
    /// Request failed.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerMessage {
    /// `queue_joined` reply.
    pub fn queue_joined() -> Self {
        ServerMessage::QueueJoined { status: "waiting".into() }
    }

    /// `queue_left` reply.
    pub fn queue_left() -> Self {
        ServerMessage::QueueLeft { status: "left".into() }
    }

    /// `game_found` push.
    pub fn game_found(session: &GameSession) -> Self {
        ServerMessage::GameFound { game: GameView::from(session) }
    }

    /// `game_update` push.
    pub fn game_update(session: &GameSession) -> Self {
        ServerMessage::GameUpdate { game: GameView::from(session) }
    }

    /// `chat` push.
    pub fn chat(record: &ChatRecord) -> Self {
        ServerMessage::Chat(ChatPayload::from(record))
    }

    /// `sync` reply.
    pub fn sync(sessions: &[GameSession]) -> Self {
        ServerMessage::Sync { games: sessions.iter().map(GameView::from).collect() }
    }

    /// `error` reply.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into() }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Session as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameView {
    /// Session id.
    pub id: SessionId,
    /// Player with `X`.
    pub player_x: PlayerId,
    /// Player with `O`.
    pub player_o: PlayerId,
    /// Nine characters, `.` for empty.
    pub board: String,
    /// Mark to move.
    pub next_turn: Mark,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Winner, if any.
    pub winner_user_id: Option<PlayerId>,
    /// Holder of the pending draw offer.
    pub draw_offered_by: Option<PlayerId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl From<&GameSession> for GameView {
    fn from(s: &GameSession) -> Self {
        Self {
            id: s.id,
            player_x: s.player_x,
            player_o: s.player_o,
            board: s.board.to_string(),
            next_turn: s.next_turn,
            status: s.status,
            winner_user_id: s.winner,
            draw_offered_by: s.draw_offered_by,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// Chat line as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    /// Session the line belongs to.
    pub game_id: SessionId,
    /// Author.
    pub user_id: PlayerId,
    /// Text.
    pub message: String,
    /// When posted.
    pub at: DateTime<Utc>,
}

impl From<&ChatRecord> for ChatPayload {
    fn from(r: &ChatRecord) -> Self {
        Self {
            game_id: r.session_id,
            user_id: r.player_id,
            message: r.text.clone(),
            at: r.created_at,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_bare_types() {
        assert_eq!(ClientMessage::from_json(r#"{"type":"join_queue"}"#), Ok(ClientMessage::JoinQueue));
        assert_eq!(ClientMessage::from_json(r#"{"type":"leave_queue"}"#), Ok(ClientMessage::LeaveQueue));
        assert_eq!(ClientMessage::from_json(r#"{"type":"sync","payload":{}}"#), Ok(ClientMessage::Sync));
    }

    #[test]
    fn test_decode_move() {
        let id = SessionId::random();
        let text = json!({"type": "move", "payload": {"game_id": id.to_string(), "position": 4}}).to_string();
        assert_eq!(ClientMessage::from_json(&text), Ok(ClientMessage::Move { game_id: id, position: 4 }));
    }

    #[test]
    fn test_decode_out_of_range_position_passes_through() {
        let id = SessionId::random();
        let text = json!({"type": "move", "payload": {"game_id": id.to_string(), "position": -3}}).to_string();
        assert_eq!(ClientMessage::from_json(&text), Ok(ClientMessage::Move { game_id: id, position: -3 }));
    }

    #[test]
    fn test_decode_chat_and_game_id_messages() {
        let id = SessionId::random();
        let chat = json!({"type": "chat", "payload": {"game_id": id.to_string(), "message": "hi"}}).to_string();
        assert_eq!(
            ClientMessage::from_json(&chat),
            Ok(ClientMessage::Chat { game_id: id, message: "hi".into() })
        );

        for (kind, expected) in [
            ("resign", ClientMessage::Resign { game_id: id }),
            ("draw_offer", ClientMessage::DrawOffer { game_id: id }),
            ("draw_accept", ClientMessage::DrawAccept { game_id: id }),
            ("draw_decline", ClientMessage::DrawDecline { game_id: id }),
        ] {
            let text = json!({"type": kind, "payload": {"game_id": id.to_string()}}).to_string();
            let decoded = ClientMessage::from_json(&text).unwrap();
            assert_eq!(decoded.kind(), kind);
            assert_eq!(decoded, expected);
        }
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(ClientMessage::from_json("not json"), Err(DecodeError::Malformed));
        assert_eq!(ClientMessage::from_json(r#"{"payload":{}}"#), Err(DecodeError::Malformed));
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"teleport"}"#),
            Err(DecodeError::UnknownType("teleport".into()))
        );
        assert_eq!(ClientMessage::from_json(r#"{"type":"move"}"#), Err(DecodeError::InvalidPayload));
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"move","payload":{"game_id":"x","position":"a"}}"#),
            Err(DecodeError::InvalidPayload)
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"resign","payload":{"game_id":"nope"}}"#),
            Err(DecodeError::InvalidGameId)
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"resign","payload":{}}"#),
            Err(DecodeError::InvalidGameId)
        );
    }

    #[test]
    fn test_decode_error_messages() {
        assert_eq!(DecodeError::UnknownType("x".into()).to_string(), "unknown message type");
        assert_eq!(DecodeError::InvalidPayload.to_string(), "invalid payload");
        assert_eq!(DecodeError::InvalidGameId.to_string(), "invalid game_id");
    }

    #[test]
    fn test_queue_joined_shape() {
        let value: Value = serde_json::from_str(&ServerMessage::queue_joined().to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "queue_joined", "payload": {"status": "waiting"}}));
    }

    #[test]
    fn test_error_shape() {
        let value: Value = serde_json::from_str(&ServerMessage::error("not your turn").to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "error", "payload": {"message": "not your turn"}}));
    }

    #[test]
    fn test_game_view_shape() {
        let x = PlayerId::random();
        let o = PlayerId::random();
        let mut session = GameSession::new(SessionId::random(), x, o, Utc::now());
        session.board = "X.O......".parse().unwrap();

        let value: Value = serde_json::from_str(&ServerMessage::game_update(&session).to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "game_update");

        let game = &value["payload"]["game"];
        assert_eq!(game["id"], session.id.to_string());
        assert_eq!(game["player_x"], x.to_string());
        assert_eq!(game["player_o"], o.to_string());
        assert_eq!(game["board"], "X.O......");
        assert_eq!(game["next_turn"], "X");
        assert_eq!(game["status"], "in_progress");
        assert!(game["winner_user_id"].is_null());
        assert!(game["draw_offered_by"].is_null());
        assert!(game["created_at"].is_string());
    }

    #[test]
    fn test_chat_shape() {
        let record = ChatRecord {
            session_id: SessionId::random(),
            player_id: PlayerId::random(),
            text: "gg".into(),
            created_at: Utc::now(),
        };
        let value: Value = serde_json::from_str(&ServerMessage::chat(&record).to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "chat");
        assert_eq!(value["payload"]["game_id"], record.session_id.to_string());
        assert_eq!(value["payload"]["user_id"], record.player_id.to_string());
        assert_eq!(value["payload"]["message"], "gg");
    }

    #[test]
    fn test_sync_parses_back() {
        let session = GameSession::new(SessionId::random(), PlayerId::random(), PlayerId::random(), Utc::now());
        let json = ServerMessage::sync(&[session.clone()]).to_json().unwrap();

        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::Sync { games } => assert_eq!(games, vec![GameView::from(&session)]),
            other => panic!("unexpected {:?}", other),
        }
    }
}

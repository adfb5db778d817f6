//! Session Gateway
//!
//! Per-connection dispatch: decodes inbound envelopes, routes them to the
//! matchmaking queue or the session coordinator, and pushes results through
//! the connection hub.
//!
//! Replies to the caller (errors, `queue_joined`, `sync`) go straight to the
//! caller's own channel. Session changes go to both participants through
//! the hub, after the coordinator has released the session lock.

use std::sync::Arc;

use tracing::{debug, error};

use crate::game::error::GameError;
use crate::game::state::{GameSession, Identity, PlayerId};
use crate::network::coordinator::SessionCoordinator;
use crate::network::hub::{ClientChannel, ConnectionHub, ConnectionId, Delivery, Frame};
use crate::network::matchmaking::{JoinOutcome, MatchmakingQueue};
use crate::network::protocol::{ClientMessage, ServerMessage};

/// Routes decoded client messages to the core components.
pub struct SessionGateway {
    hub: Arc<ConnectionHub>,
    matchmaking: Arc<MatchmakingQueue>,
    coordinator: Arc<SessionCoordinator>,
}

impl SessionGateway {
    /// Gateway over shared components.
    pub fn new(
        hub: Arc<ConnectionHub>,
        matchmaking: Arc<MatchmakingQueue>,
        coordinator: Arc<SessionCoordinator>,
    ) -> Self {
        Self { hub, matchmaking, coordinator }
    }

    /// Connection hub.
    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Matchmaking queue.
    pub fn matchmaking(&self) -> &Arc<MatchmakingQueue> {
        &self.matchmaking
    }

    /// Session coordinator.
    pub fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    /// Register a freshly authenticated connection and push its `sync` snapshot.
    pub async fn connect(&self, identity: &Identity, channel: &ClientChannel) {
        self.hub.register(identity.id, channel.clone());
        self.send_sync(identity.id, channel).await;
    }

    /// Drop the registration for a closed connection.
    ///
    /// Queue entries are kept; a reconnecting player stays matchable.
    pub fn disconnect(&self, player: &PlayerId, connection: ConnectionId) -> bool {
        self.hub.unregister(player, connection)
    }

    /// Handle one inbound text frame from `identity`'s connection.
    pub async fn handle_text(&self, identity: &Identity, reply: &ClientChannel, text: &str) {
        let msg = match ClientMessage::from_json(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Undecodable frame from {}: {:?}", identity.id, e);
                reply_to(reply, &ServerMessage::error(e.to_string()));
                return;
            }
        };

        debug!("{} from {}", msg.kind(), identity.id);

        if let Err(e) = self.dispatch(identity.id, reply, msg).await {
            reply_to(reply, &ServerMessage::error(e.client_message()));
        }
    }

    async fn dispatch(&self, player: PlayerId, reply: &ClientChannel, msg: ClientMessage) -> Result<(), GameError> {
        match msg {
            ClientMessage::JoinQueue => match self.matchmaking.join(player).await? {
                JoinOutcome::Waiting => {
                    reply_to(reply, &ServerMessage::queue_joined());
                }
                JoinOutcome::Matched(session) => {
                    self.push_to_participants(&session, &ServerMessage::game_found(&session));
                }
            },
            ClientMessage::LeaveQueue => {
                self.matchmaking.leave(&player).await;
                reply_to(reply, &ServerMessage::queue_left());
            }
            ClientMessage::Move { game_id, position } => {
                let session = self.coordinator.make_move(game_id, player, position).await?;
                self.push_update(&session);
            }
            ClientMessage::Resign { game_id } => {
                let session = self.coordinator.resign(game_id, player).await?;
                self.push_update(&session);
            }
            ClientMessage::DrawOffer { game_id } => {
                let session = self.coordinator.offer_draw(game_id, player).await?;
                self.push_update(&session);
            }
            ClientMessage::DrawAccept { game_id } => {
                let session = self.coordinator.accept_draw(game_id, player).await?;
                self.push_update(&session);
            }
            ClientMessage::DrawDecline { game_id } => {
                let session = self.coordinator.decline_draw(game_id, player).await?;
                self.push_update(&session);
            }
            ClientMessage::Chat { game_id, message } => {
                let posted = self.coordinator.add_chat(game_id, player, &message).await?;
                if let Some(frame) = encode(&ServerMessage::chat(&posted.record)) {
                    self.hub.broadcast(&posted.participants, &frame);
                }
            }
            ClientMessage::Sync => {
                let sessions = self.coordinator.active_sessions(player).await?;
                reply_to(reply, &ServerMessage::sync(&sessions));
            }
        }
        Ok(())
    }

    async fn send_sync(&self, player: PlayerId, channel: &ClientChannel) {
        // A failed initial snapshot is not fatal; the client can ask again.
        if let Ok(sessions) = self.coordinator.active_sessions(player).await {
            reply_to(channel, &ServerMessage::sync(&sessions));
        }
    }

    fn push_update(&self, session: &GameSession) {
        self.push_to_participants(session, &ServerMessage::game_update(session));
    }

    fn push_to_participants(&self, session: &GameSession, msg: &ServerMessage) -> Vec<Delivery> {
        match encode(msg) {
            Some(frame) => self.hub.broadcast(&session.participants(), &frame),
            None => Vec::new(),
        }
    }
}

fn encode(msg: &ServerMessage) -> Option<Frame> {
    match msg.to_json() {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            None
        }
    }
}

fn reply_to(channel: &ClientChannel, msg: &ServerMessage) -> Delivery {
    match encode(msg) {
        Some(frame) => channel.try_deliver(frame),
        None => Delivery::NoConnection,
    }
}

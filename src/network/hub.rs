//! Connection Hub
//!
//! Process-wide registry of live connections, keyed by player. Delivery is
//! best-effort and never blocks: a missing registration or a full outbound
//! buffer drops the frame and says so in the returned [`Delivery`].
//!
//! At most one registration per player. Registering again replaces the old
//! channel and closes it (last connection wins). Unregister only removes the
//! entry if it still belongs to the caller's channel, so a slow disconnect
//! cannot evict a newer connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::game::state::PlayerId;

/// Serialized outbound envelope.
pub type Frame = String;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Outcome of a single delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the recipient's outbound buffer.
    Delivered,
    /// Recipient has no live registration.
    NoConnection,
    /// Recipient's outbound buffer is full.
    Backpressure,
}

/// Sending half of one connection's outbound buffer, plus its close signal.
#[derive(Clone, Debug)]
pub struct ClientChannel {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
    close: Arc<Notify>,
}

impl ClientChannel {
    /// New channel with room for `capacity` frames.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let channel = Self {
            id: ConnectionId::next(),
            tx,
            close: Arc::new(Notify::new()),
        };
        (channel, rx)
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame without waiting.
    pub fn try_deliver(&self, frame: Frame) -> Delivery {
        match self.tx.try_send(frame) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Backpressure,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::NoConnection,
        }
    }

    /// Ask the owning connection to shut down.
    pub fn close(&self) {
        self.close.notify_one();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.close.notified().await;
    }
}

/// Registry of live connections.
#[derive(Default)]
pub struct ConnectionHub {
    clients: RwLock<HashMap<PlayerId, ClientChannel>>,
}

impl ConnectionHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` for `player`, closing and returning any previous one.
    pub fn register(&self, player: PlayerId, channel: ClientChannel) -> Option<ClientChannel> {
        let previous = self.clients.write().insert(player, channel);
        if let Some(ref old) = previous {
            warn!("Player {} reconnected, closing connection {:?}", player, old.id);
            old.close();
        }
        previous
    }

    /// Remove `player`'s registration if it is still `connection`.
    pub fn unregister(&self, player: &PlayerId, connection: ConnectionId) -> bool {
        let mut clients = self.clients.write();
        match clients.get(player) {
            Some(current) if current.id == connection => {
                clients.remove(player);
                true
            }
            _ => false,
        }
    }

    /// Best-effort delivery to one player.
    pub fn send(&self, player: &PlayerId, frame: Frame) -> Delivery {
        let channel = self.clients.read().get(player).cloned();
        let delivery = match channel {
            Some(channel) => channel.try_deliver(frame),
            None => Delivery::NoConnection,
        };
        if delivery != Delivery::Delivered {
            debug!("Dropped frame for {}: {:?}", player, delivery);
        }
        delivery
    }

    /// [`send`](Self::send) to each player in order.
    pub fn broadcast(&self, players: &[PlayerId], frame: &Frame) -> Vec<Delivery> {
        players.iter().map(|p| self.send(p, frame.clone())).collect()
    }

    /// Whether `player` has a live registration.
    pub fn is_connected(&self, player: &PlayerId) -> bool {
        self.clients.read().contains_key(player)
    }

    /// Number of registered players.
    pub fn connection_count(&self) -> usize {
        self.clients.read().len()
    }
}

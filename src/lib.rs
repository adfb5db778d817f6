//! # Tictac Game Server
//!
//! Real-time coordination for two-player tic-tac-toe: matchmaking,
//! authoritative session state and push updates over WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TICTAC SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/             - Rules (pure, no I/O)                    │
//! │  ├── board.rs      - Marks, 3x3 grid, winning lines          │
//! │  ├── state.rs      - Ids, session snapshot, records          │
//! │  ├── engine.rs     - Move / resign / draw transitions        │
//! │  └── error.rs      - Error taxonomy                          │
//! │                                                              │
//! │  store/            - Persistence                             │
//! │  ├── mod.rs        - SessionStore trait                      │
//! │  └── memory.rs     - In-memory store                         │
//! │                                                              │
//! │  network/          - Connections and shared state            │
//! │  ├── auth.rs       - JWT token provider                      │
//! │  ├── hub.rs        - Connection registry, delivery           │
//! │  ├── matchmaking.rs- FIFO pairing                            │
//! │  ├── coordinator.rs- Per-session serialized mutations        │
//! │  ├── protocol.rs   - JSON envelopes                          │
//! │  ├── gateway.rs    - Message dispatch                        │
//! │  └── server.rs     - WebSocket listener                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! Mutations of one session are totally ordered by a per-session lock in
//! the coordinator. Matchmaking is serialized by its own lock. Pushes are
//! sent after locks are released and are best-effort; a `sync` request
//! recovers current state.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use game::board::{Board, Mark};
pub use game::error::GameError;
pub use game::state::{GameSession, Identity, PlayerId, SessionId, SessionStatus};
pub use network::server::{GameServer, ServerConfig};
pub use store::{MemorySessionStore, SessionStore, StoreError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

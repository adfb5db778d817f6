//! Network Layer
//!
//! Everything that touches connections, shared state or the clock.
//! Game rules live in `game/`; this layer only sequences them.

pub mod auth;
pub mod coordinator;
pub mod gateway;
pub mod hub;
pub mod matchmaking;
pub mod protocol;
pub mod server;

pub use auth::{AuthConfig, AuthError, JwtTokenProvider, TokenClaims, TokenProvider};
pub use coordinator::{ChatPosted, SessionCoordinator};
pub use gateway::SessionGateway;
pub use hub::{ClientChannel, ConnectionHub, ConnectionId, Delivery, Frame};
pub use matchmaking::{JoinOutcome, MatchmakingQueue};
pub use protocol::{ChatPayload, ClientMessage, DecodeError, GameView, ServerMessage};
pub use server::{GameServer, GameServerError, ServerConfig};

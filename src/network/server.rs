//! WebSocket Game Server
//!
//! Accepts WebSocket upgrades on `/ws?token=...`, authenticates once per
//! connection, then runs two tasks per client: a reader that feeds the
//! [`SessionGateway`] and a writer that drains the client's outbound buffer
//! and sends keep-alive pings. A plain `GET /health` is answered with 200
//! before any upgrade is attempted.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{interval, timeout};
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

use crate::game::state::{Identity, PlayerId};
use crate::network::auth::TokenProvider;
use crate::network::coordinator::{SessionCoordinator, DEFAULT_CHAT_MAX_LEN};
use crate::network::gateway::SessionGateway;
use crate::network::hub::{ClientChannel, ConnectionHub, ConnectionId};
use crate::network::matchmaking::MatchmakingQueue;
use crate::network::protocol::ServerMessage;
use crate::store::SessionStore;

/// Path accepting WebSocket upgrades.
pub const WS_PATH: &str = "/ws";

/// Path answering plain HTTP liveness checks.
pub const HEALTH_PATH: &str = "/health";

const HEALTH_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";

/// Upper bound on a single outbound write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound frames buffered per connection before drops.
    pub outbound_buffer: usize,
    /// Largest accepted inbound message, in bytes.
    pub max_message_size: usize,
    /// Interval between keep-alive pings.
    pub ping_interval: Duration,
    /// Close a connection after this long without inbound traffic.
    pub idle_timeout: Duration,
    /// Longest accepted chat line, in characters.
    pub chat_max_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            outbound_buffer: 256,
            max_message_size: 4096,
            ping_interval: Duration::from_secs(54),
            idle_timeout: Duration::from_secs(60),
            chat_max_len: DEFAULT_CHAT_MAX_LEN,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `TICTAC_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("TICTAC_BIND_ADDR", defaults.bind_addr),
            max_connections: env_or("TICTAC_MAX_CONNECTIONS", defaults.max_connections),
            outbound_buffer: env_or("TICTAC_OUTBOUND_BUFFER", defaults.outbound_buffer),
            max_message_size: env_or("TICTAC_MAX_MESSAGE_SIZE", defaults.max_message_size),
            ping_interval: Duration::from_secs(env_or(
                "TICTAC_PING_INTERVAL_SECS",
                defaults.ping_interval.as_secs(),
            )),
            idle_timeout: Duration::from_secs(env_or(
                "TICTAC_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )),
            chat_max_len: defaults.chat_max_len,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid {}={:?}, using default", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

// =============================================================================
// SERVER
// =============================================================================

/// The game server.
pub struct GameServer {
    config: ServerConfig,
    gateway: Arc<SessionGateway>,
    auth: Arc<dyn TokenProvider>,
    active: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server over `store`, authenticating with `auth`.
    pub fn new(config: ServerConfig, auth: Arc<dyn TokenProvider>, store: Arc<dyn SessionStore>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let gateway = SessionGateway::new(
            Arc::new(ConnectionHub::new()),
            Arc::new(MatchmakingQueue::new(store.clone())),
            Arc::new(SessionCoordinator::with_chat_limit(store, config.chat_max_len)),
        );

        Self {
            config,
            gateway: Arc::new(gateway),
            auth,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Gateway shared by all connections.
    pub fn gateway(&self) -> &Arc<SessionGateway> {
        &self.gateway
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Signal the accept loop and every connection to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Connections currently open.
    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let gateway = self.gateway.clone();
        let auth = self.auth.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let slot = ActiveSlot::acquire(self.active.clone());

        tokio::spawn(async move {
            let _slot = slot;
            let mut stream = stream;

            if is_health_check(&stream).await {
                debug!("Health check from {}", addr);
                let _ = stream.write_all(HEALTH_RESPONSE).await;
                let _ = stream.shutdown().await;
                return;
            }

            let mut ws_config = WebSocketConfig::default();
            ws_config.max_message_size = Some(config.max_message_size);
            ws_config.max_frame_size = Some(config.max_message_size);

            let mut authenticated: Option<Identity> = None;
            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let identity = authenticate(req, auth.as_ref())?;
                authenticated = Some(identity);
                Ok(resp)
            };

            let ws_stream = match accept_hdr_async_with_config(stream, callback, Some(ws_config)).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake rejected for {}: {}", addr, e);
                    return;
                }
            };
            let identity = match authenticated {
                Some(identity) => identity,
                None => return,
            };

            info!("Player {} ({}) connected from {}", identity.id, identity.name, addr);

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (channel, mut outbound) = ClientChannel::new(config.outbound_buffer);
            let registration = Registration::new(gateway.clone(), identity.id, channel.id());

            gateway.connect(&identity, &channel).await;

            // Writer: outbound buffer and keep-alive pings.
            let ping_interval = config.ping_interval;
            let mut writer = tokio::spawn(async move {
                let mut ticker = interval(ping_interval);
                ticker.tick().await;

                loop {
                    let message = tokio::select! {
                        frame = outbound.recv() => match frame {
                            Some(text) => Message::Text(text),
                            None => break,
                        },
                        _ = ticker.tick() => Message::Ping(Vec::new()),
                    };

                    match timeout(WRITE_TIMEOUT, ws_sender.send(message)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!("Write failed: {}", e);
                            break;
                        }
                        Err(_) => {
                            debug!("Write timed out");
                            break;
                        }
                    }
                }

                let _ = ws_sender.close().await;
            });

            // Reader: inbound frames into the gateway.
            loop {
                tokio::select! {
                    msg = timeout(config.idle_timeout, ws_receiver.next()) => {
                        match msg {
                            Ok(Some(Ok(Message::Text(text)))) => {
                                gateway.handle_text(&identity, &channel, &text).await;
                            }
                            Ok(Some(Ok(Message::Binary(data)))) => match String::from_utf8(data) {
                                Ok(text) => gateway.handle_text(&identity, &channel, &text).await,
                                Err(_) => {
                                    if let Ok(frame) = ServerMessage::error("invalid message").to_json() {
                                        channel.try_deliver(frame);
                                    }
                                }
                            },
                            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                                debug!("Player {} closed connection", identity.id);
                                break;
                            }
                            Ok(Some(Ok(_))) => {}
                            Ok(Some(Err(e))) => {
                                debug!("WebSocket error for {}: {}", identity.id, e);
                                break;
                            }
                            Err(_) => {
                                info!("Player {} idle for {:?}, closing", identity.id, config.idle_timeout);
                                break;
                            }
                        }
                    }
                    _ = channel.closed() => {
                        debug!("Connection for {} replaced", identity.id);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Let the writer flush what is already queued, then stop it.
            drop(registration);
            drop(channel);
            if timeout(WRITE_TIMEOUT, &mut writer).await.is_err() {
                writer.abort();
            }

            info!("Player {} disconnected", identity.id);
        });
    }
}

/// Peek at the request line without consuming it.
async fn is_health_check(stream: &TcpStream) -> bool {
    let mut head = [0u8; 64];
    match stream.peek(&mut head).await {
        Ok(n) => is_health_request(&head[..n]),
        Err(_) => false,
    }
}

/// Whether a request head starts with `GET /health`.
fn is_health_request(head: &[u8]) -> bool {
    let line = head.split(|b| *b == b'\r' || *b == b'\n').next().unwrap_or_default();
    let mut parts = line.split(|b| *b == b' ');
    let method = parts.next();
    let path = parts.next().and_then(|target| target.split(|b| *b == b'?').next());
    method == Some(&b"GET"[..]) && path == Some(HEALTH_PATH.as_bytes())
}

/// Resolve the upgrade request to an identity or an HTTP error.
fn authenticate(req: &Request, auth: &dyn TokenProvider) -> Result<Identity, ErrorResponse> {
    if req.uri().path() != WS_PATH {
        return Err(error_response(StatusCode::NOT_FOUND, "not found"));
    }

    let token = match query_param(req.uri().query(), "token") {
        Some(token) => token,
        None => return Err(error_response(StatusCode::UNAUTHORIZED, "missing token")),
    };

    auth.parse_token(token).map_err(|e| {
        warn!("Rejected token: {}", e);
        error_response(StatusCode::UNAUTHORIZED, "invalid token")
    })
}

fn error_response(status: StatusCode, body: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = status;
    response
}

/// First non-empty value of `name` in a raw query string.
fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

/// Counts one open connection for as long as it lives.
struct ActiveSlot(Arc<AtomicUsize>);

impl ActiveSlot {
    fn acquire(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Unregisters from the hub when the connection task ends, including on panic.
struct Registration {
    gateway: Arc<SessionGateway>,
    player: PlayerId,
    connection: ConnectionId,
}

impl Registration {
    fn new(gateway: Arc<SessionGateway>, player: PlayerId, connection: ConnectionId) -> Self {
        Self { gateway, player, connection }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.gateway.disconnect(&self.player, self.connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::auth::AuthError;
    use crate::store::MemorySessionStore;

    struct StaticTokens;

    impl TokenProvider for StaticTokens {
        fn parse_token(&self, token: &str) -> Result<Identity, AuthError> {
            match token {
                "good" => Ok(Identity::new(PlayerId::random(), "tester")),
                _ => Err(AuthError::InvalidFormat),
            }
        }
    }

    fn server() -> GameServer {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        GameServer::new(config, Arc::new(StaticTokens), Arc::new(MemorySessionStore::new()))
    }

    fn request(uri: &str) -> Request {
        Request::builder().uri(uri).body(()).unwrap()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.outbound_buffer, 256);
        assert_eq!(config.max_message_size, 4096);
        assert_eq!(config.ping_interval, Duration::from_secs(54));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.chat_max_len, 500);
    }

    #[test]
    fn test_env_or_falls_back() {
        std::env::set_var("TICTAC_TEST_ENV_OR_GOOD", "42");
        std::env::set_var("TICTAC_TEST_ENV_OR_BAD", "forty-two");

        assert_eq!(env_or("TICTAC_TEST_ENV_OR_GOOD", 7usize), 42);
        assert_eq!(env_or("TICTAC_TEST_ENV_OR_BAD", 7usize), 7);
        assert_eq!(env_or("TICTAC_TEST_ENV_OR_UNSET", 7usize), 7);
    }

    #[test]
    fn test_query_param() {
        assert_eq!(query_param(Some("token=abc"), "token"), Some("abc"));
        assert_eq!(query_param(Some("a=1&token=x.y.z"), "token"), Some("x.y.z"));
        assert_eq!(query_param(Some("token="), "token"), None);
        assert_eq!(query_param(Some("tokens=abc"), "token"), None);
        assert_eq!(query_param(None, "token"), None);
    }

    #[test]
    fn test_authenticate() {
        let auth = StaticTokens;

        assert!(authenticate(&request("/ws?token=good"), &auth).is_ok());

        let missing = authenticate(&request("/ws"), &auth).unwrap_err();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let bad = authenticate(&request("/ws?token=bad"), &auth).unwrap_err();
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);

        let wrong_path = authenticate(&request("/other?token=good"), &auth).unwrap_err();
        assert_eq!(wrong_path.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_is_health_request() {
        assert!(is_health_request(b"GET /health HTTP/1.1\r\nHost: x\r\n\r\n"));
        assert!(is_health_request(b"GET /health?check=lb HTTP/1.1\r\n"));
        assert!(!is_health_request(b"POST /health HTTP/1.1\r\n"));
        assert!(!is_health_request(b"GET /healthz HTTP/1.1\r\n"));
        assert!(!is_health_request(b"GET /ws?token=good HTTP/1.1\r\n"));
        assert!(!is_health_request(b""));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = server();
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.gateway().hub().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = Arc::new(server());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let running = server.clone();
        let mut handle = tokio::spawn(async move { running.serve(listener).await });

        // The accept loop subscribes on start; keep signalling until it exits.
        loop {
            server.shutdown();
            if let Ok(result) = timeout(Duration::from_millis(50), &mut handle).await {
                assert!(result.unwrap().is_ok());
                break;
            }
        }
    }
}

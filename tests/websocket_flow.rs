//! End-to-end tests over a loopback WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use tictac::network::auth::{AuthConfig, JwtTokenProvider};
use tictac::{GameServer, Identity, MemorySessionStore, PlayerId, ServerConfig};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Harness {
    addr: SocketAddr,
    tokens: JwtTokenProvider,
    server: Arc<GameServer>,
}

impl Harness {
    async fn start() -> Self {
        let auth = AuthConfig { secret: Some("integration-secret".into()), ..Default::default() };
        let tokens = JwtTokenProvider::new(auth).unwrap();

        let server = Arc::new(GameServer::new(
            ServerConfig::default(),
            Arc::new(tokens.clone()),
            Arc::new(MemorySessionStore::new()),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });

        Self { addr, tokens, server }
    }

    async fn connect(&self, identity: &Identity) -> Socket {
        let token = self.tokens.issue_token(identity).unwrap();
        let url = format!("ws://{}/ws?token={}", self.addr, token);
        let (socket, _) = connect_async(url).await.unwrap();
        socket
    }

    /// Connect and consume the initial sync.
    async fn join(&self, name: &str) -> (Identity, Socket) {
        let identity = Identity::new(PlayerId::random(), name);
        let mut socket = self.connect(&identity).await;
        let sync = recv(&mut socket).await;
        assert_eq!(sync["type"], "sync");
        (identity, socket)
    }
}

async fn recv(socket: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send(socket: &mut Socket, value: Value) {
    socket.send(Message::Text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_rejects_bad_token() {
    let h = Harness::start().await;

    let url = format!("ws://{}/ws?token=garbage", h.addr);
    match connect_async(url).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 401),
        other => panic!("expected 401, got {:?}", other.map(|_| ())),
    }

    let url = format!("ws://{}/ws", h.addr);
    match connect_async(url).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 401),
        other => panic!("expected 401, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_rejects_wrong_path() {
    let h = Harness::start().await;
    let identity = Identity::new(PlayerId::random(), "alice");
    let token = h.tokens.issue_token(&identity).unwrap();

    let url = format!("ws://{}/lobby?token={}", h.addr, token);
    match connect_async(url).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 404),
        other => panic!("expected 404, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = Harness::start().await;

    let mut stream = TcpStream::connect(h.addr).await.unwrap();
    stream.write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .expect("timed out waiting for health response")
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.ends_with("ok"));
}

#[tokio::test]
async fn test_match_and_play_to_win() {
    let h = Harness::start().await;
    let (alice, mut a) = h.join("alice").await;
    let (_bob, mut b) = h.join("bob").await;

    send(&mut a, json!({"type": "join_queue"})).await;
    assert_eq!(recv(&mut a).await, json!({"type": "queue_joined", "payload": {"status": "waiting"}}));

    send(&mut b, json!({"type": "join_queue"})).await;
    let found_a = recv(&mut a).await;
    let found_b = recv(&mut b).await;
    assert_eq!(found_a["type"], "game_found");
    assert_eq!(found_a, found_b);

    let game = &found_a["payload"]["game"];
    let game_id = game["id"].as_str().unwrap().to_string();
    assert_eq!(game["player_x"], alice.id.to_string());
    assert_eq!(game["board"], ".........");
    assert_eq!(game["next_turn"], "X");
    assert_eq!(game["status"], "in_progress");

    // Out of turn: only bob hears about it.
    send(&mut b, json!({"type": "move", "payload": {"game_id": game_id, "position": 0}})).await;
    assert_eq!(recv(&mut b).await, json!({"type": "error", "payload": {"message": "not your turn"}}));

    let moves = [(true, 0), (false, 3), (true, 1), (false, 4), (true, 2)];
    let mut last = Value::Null;
    for (alice_moves, position) in moves {
        let mover = if alice_moves { &mut a } else { &mut b };
        send(mover, json!({"type": "move", "payload": {"game_id": game_id, "position": position}})).await;

        let update_a = recv(&mut a).await;
        let update_b = recv(&mut b).await;
        assert_eq!(update_a["type"], "game_update");
        assert_eq!(update_a, update_b);
        last = update_a;
    }

    let game = &last["payload"]["game"];
    assert_eq!(game["board"], "XXXOO....");
    assert_eq!(game["status"], "finished");
    assert_eq!(game["winner_user_id"], alice.id.to_string());

    send(&mut a, json!({"type": "move", "payload": {"game_id": game_id, "position": 8}})).await;
    assert_eq!(recv(&mut a).await["payload"]["message"], "game not active");
}

#[tokio::test]
async fn test_malformed_input_keeps_connection() {
    let h = Harness::start().await;
    let (_alice, mut a) = h.join("alice").await;

    a.send(Message::Text("{{{".into())).await.unwrap();
    assert_eq!(recv(&mut a).await["payload"]["message"], "invalid message");

    send(&mut a, json!({"type": "teleport"})).await;
    assert_eq!(recv(&mut a).await["payload"]["message"], "unknown message type");

    send(&mut a, json!({"type": "resign", "payload": {"game_id": "nope"}})).await;
    assert_eq!(recv(&mut a).await["payload"]["message"], "invalid game_id");

    send(&mut a, json!({"type": "sync"})).await;
    assert_eq!(recv(&mut a).await, json!({"type": "sync", "payload": {"games": []}}));
}

#[tokio::test]
async fn test_reconnect_syncs_and_replaces() {
    let h = Harness::start().await;
    let (alice, mut a) = h.join("alice").await;
    let (_bob, mut b) = h.join("bob").await;

    send(&mut a, json!({"type": "join_queue"})).await;
    recv(&mut a).await;
    send(&mut b, json!({"type": "join_queue"})).await;
    let game_id = recv(&mut a).await["payload"]["game"]["id"].clone();
    recv(&mut b).await;

    // Second connection for alice gets the live game and takes over.
    let mut a2 = h.connect(&alice).await;
    let sync = recv(&mut a2).await;
    assert_eq!(sync["type"], "sync");
    assert_eq!(sync["payload"]["games"][0]["id"], game_id);

    send(&mut a2, json!({"type": "move", "payload": {"game_id": game_id, "position": 4}})).await;
    assert_eq!(recv(&mut a2).await["payload"]["game"]["board"], "....X....");
    assert_eq!(recv(&mut b).await["payload"]["game"]["board"], "....X....");

    // The replaced connection is closed by the server.
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match a.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert!(h.server.gateway().hub().is_connected(&alice.id));
}

//! End-to-end lobby play over real websockets on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use suika_arena::config::{LobbyConfig, ServerConfig, SimConfig, WellConfig};
use suika_arena::core::fixed::from_int;
use suika_arena::network::{
    ClientMessage, ClientTransport, CodecError, GameServer, LobbyRoute, ServerMessage, TransportError,
};
use suika_arena::physics::WellWorld;
use suika_arena::render::HeadlessRenderer;
use suika_arena::{BoardState, ColliderHandle, Fruit, Simulation};

async fn start_server(lobby: LobbyConfig) -> (Arc<GameServer>, String) {
    start_configured(ServerConfig { lobby, ..Default::default() }).await
}

async fn start_configured(config: ServerConfig) -> (Arc<GameServer>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(GameServer::new(ServerConfig { bind_addr: addr, ..config }));

    let running = server.clone();
    tokio::spawn(async move { running.run_with_listener(listener).await });
    (server, format!("ws://{}", addr))
}

async fn next(transport: &mut ClientTransport) -> ServerMessage {
    timeout(Duration::from_secs(5), transport.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("connection closed")
}

fn joined(name: &str) -> ServerMessage {
    ServerMessage::PlayerJoined { name: name.to_string() }
}

async fn closed(transport: &mut ClientTransport) -> bool {
    timeout(Duration::from_secs(5), transport.recv())
        .await
        .expect("timed out waiting for close")
        .is_none()
}

async fn connections_drain(server: &GameServer) {
    for _ in 0..100 {
        if server.connection_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("connections still registered");
}

async fn started_pair(base: &str) -> (ClientTransport, ClientTransport) {
    let mut ann = ClientTransport::connect(base, &LobbyRoute::Create { name: "Ann".into() })
        .await
        .unwrap();
    let code = ann.info().code.clone();
    assert_eq!(next(&mut ann).await, joined("Ann"));

    let mut bob = ClientTransport::connect(base, &LobbyRoute::Join { code, name: "Bob".into() })
        .await
        .unwrap();
    assert_eq!(bob.info().players, vec!["Ann".to_string(), "Bob".to_string()]);
    assert_eq!(next(&mut bob).await, joined("Ann"));
    assert_eq!(next(&mut bob).await, joined("Bob"));
    assert_eq!(next(&mut ann).await, joined("Bob"));

    ann.send(ClientMessage::Ready).await.unwrap();
    bob.send(ClientMessage::Ready).await.unwrap();
    assert_eq!(next(&mut ann).await, ServerMessage::GameStart);
    assert_eq!(next(&mut bob).await, ServerMessage::GameStart);

    (ann, bob)
}

#[tokio::test]
async fn test_drop_is_relayed_to_opponent() {
    let (server, base) = start_server(LobbyConfig::default()).await;
    let (mut ann, mut bob) = started_pair(&base).await;

    let mut sim = Simulation::new(
        WellWorld::new(&WellConfig::default()),
        HeadlessRenderer::new(),
        SimConfig::default(),
    );
    sim.on_pointer_release(from_int(250)).unwrap();
    for _ in 0..30 {
        sim.tick();
    }
    let board = sim.capture().unwrap();

    ann.send(ClientMessage::Drop { board: board.clone() }).await.unwrap();
    assert_eq!(
        next(&mut bob).await,
        ServerMessage::BoardUpdate { player: "Ann".into(), board }
    );
    assert_eq!(server.connection_count().await, 2);

    // Ann never hears her own drop; her next message is Bob leaving
    bob.close().await;
    assert_eq!(next(&mut ann).await, ServerMessage::PlayerLeft { name: "Bob".into() });
    assert_eq!(next(&mut ann).await, ServerMessage::GameEnd);

    server.shutdown();
}

#[tokio::test]
async fn test_drop_limit_ends_game() {
    let (server, base) = start_server(LobbyConfig { max_drops: 1, ..Default::default() }).await;
    let (mut ann, mut bob) = started_pair(&base).await;

    bob.send(ClientMessage::Drop { board: Default::default() }).await.unwrap();

    assert!(matches!(next(&mut ann).await, ServerMessage::BoardUpdate { .. }));
    assert_eq!(next(&mut ann).await, ServerMessage::GameEnd);
    assert_eq!(next(&mut bob).await, ServerMessage::GameEnd);

    server.shutdown();
}

#[tokio::test]
async fn test_join_errors_are_reported() {
    let (server, base) = start_server(LobbyConfig::default()).await;

    let missing = ClientTransport::connect(
        &base,
        &LobbyRoute::Join { code: "NOSUCHLB".into(), name: "Ann".into() },
    )
    .await;
    assert!(matches!(missing, Err(TransportError::Rejected(ref e)) if e == "Lobby not found"));

    let ann = ClientTransport::connect(&base, &LobbyRoute::Find { name: "Ann".into() })
        .await
        .unwrap();
    let code = ann.info().code.clone();

    let taken = ClientTransport::connect(&base, &LobbyRoute::Join { code: code.clone(), name: "Ann".into() }).await;
    assert!(matches!(taken, Err(TransportError::Rejected(ref e)) if e == "Name already taken"));

    let bob = ClientTransport::connect(&base, &LobbyRoute::Find { name: "Bob".into() })
        .await
        .unwrap();
    assert_eq!(bob.info().code, code);

    let full = ClientTransport::connect(&base, &LobbyRoute::Join { code, name: "Cid".into() }).await;
    assert!(matches!(full, Err(TransportError::Rejected(ref e)) if e == "Lobby full"));

    server.shutdown();
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() {
    let (server, base) = start_server(LobbyConfig::default()).await;

    let url = LobbyRoute::Create { name: "Raw".into() }.url(&base).unwrap();
    let (mut raw, _) = connect_async(url.as_str()).await.unwrap();
    let reply = match raw.next().await {
        Some(Ok(Message::Text(text))) => text,
        other => panic!("expected handshake reply, got {:?}", other),
    };
    let code = serde_json::from_str::<serde_json::Value>(&reply).unwrap()["code"]
        .as_str()
        .unwrap()
        .to_string();

    raw.send(Message::Binary(vec![9, 1, 2])).await.unwrap();
    raw.send(Message::Binary(vec![0, 200, 0, 0])).await.unwrap();
    raw.send(Message::Binary(ClientMessage::Ready.encode().unwrap())).await.unwrap();

    let mut bob = ClientTransport::connect(&base, &LobbyRoute::Join { code, name: "Bob".into() })
        .await
        .unwrap();
    bob.send(ClientMessage::Ready).await.unwrap();

    assert_eq!(next(&mut bob).await, joined("Raw"));
    assert_eq!(next(&mut bob).await, joined("Bob"));
    assert_eq!(next(&mut bob).await, ServerMessage::GameStart);

    let mut seen = Vec::new();
    while seen.last() != Some(&ServerMessage::GameStart) {
        match timeout(Duration::from_secs(5), raw.next()).await.unwrap() {
            Some(Ok(Message::Binary(data))) => seen.push(ServerMessage::decode(&data).unwrap()),
            Some(Ok(_)) => {}
            other => panic!("connection ended early: {:?}", other),
        }
    }
    assert_eq!(seen, vec![joined("Raw"), joined("Bob"), ServerMessage::GameStart]);

    server.shutdown();
}

#[tokio::test]
async fn test_idle_client_told_and_disconnected() {
    let (server, base) = start_configured(ServerConfig {
        idle_timeout: Duration::ZERO,
        ..Default::default()
    })
    .await;

    let mut ann = ClientTransport::connect(&base, &LobbyRoute::Create { name: "Ann".into() })
        .await
        .unwrap();
    assert_eq!(next(&mut ann).await, joined("Ann"));
    assert_eq!(server.lobby_count().await, 1);

    tokio::time::sleep(Duration::from_millis(10)).await;
    server.sweep().await;

    assert_eq!(next(&mut ann).await, ServerMessage::GameEnd);
    assert!(closed(&mut ann).await);
    connections_drain(&server).await;
    assert_eq!(server.lobby_count().await, 0);

    server.shutdown();
}

#[tokio::test]
async fn test_stale_lobby_players_told_and_disconnected() {
    let (server, base) = start_server(LobbyConfig {
        stale_after: Duration::ZERO,
        ..Default::default()
    })
    .await;

    let mut ann = ClientTransport::connect(&base, &LobbyRoute::Create { name: "Ann".into() })
        .await
        .unwrap();
    let code = ann.info().code.clone();
    assert_eq!(next(&mut ann).await, joined("Ann"));
    let mut bob = ClientTransport::connect(&base, &LobbyRoute::Join { code, name: "Bob".into() })
        .await
        .unwrap();
    assert_eq!(next(&mut bob).await, joined("Ann"));
    assert_eq!(next(&mut bob).await, joined("Bob"));
    assert_eq!(next(&mut ann).await, joined("Bob"));

    tokio::time::sleep(Duration::from_millis(10)).await;
    server.sweep().await;
    assert_eq!(server.lobby_count().await, 0);

    for player in [&mut ann, &mut bob] {
        assert_eq!(next(player).await, ServerMessage::GameEnd);
        assert!(closed(player).await);
    }
    connections_drain(&server).await;

    server.shutdown();
}

#[tokio::test]
async fn test_sweep_keeps_active_clients() {
    let (server, base) = start_server(LobbyConfig::default()).await;
    let (mut ann, mut bob) = started_pair(&base).await;

    server.sweep().await;
    assert_eq!(server.connection_count().await, 2);
    assert_eq!(server.lobby_count().await, 1);

    bob.send(ClientMessage::Drop { board: Default::default() }).await.unwrap();
    assert!(matches!(next(&mut ann).await, ServerMessage::BoardUpdate { .. }));
    assert!(ann.drain().is_empty());
    assert!(!bob.is_closed());

    server.shutdown();
}

#[tokio::test]
async fn test_unencodable_drop_reported_to_sender() {
    let (server, base) = start_server(LobbyConfig::default()).await;
    let (mut ann, mut bob) = started_pair(&base).await;

    let mut board = BoardState::default();
    board.piece_table.insert(ColliderHandle::from_raw(1 << 60), Fruit::Cherry);
    let result = ann.send(ClientMessage::Drop { board }).await;
    assert!(matches!(result, Err(TransportError::Codec(CodecError::HandleOutOfRange(_)))));

    // Nothing went out, and the connection still works
    ann.send(ClientMessage::Drop { board: BoardState::default() }).await.unwrap();
    assert_eq!(
        next(&mut bob).await,
        ServerMessage::BoardUpdate { player: "Ann".into(), board: BoardState::default() }
    );
    assert!(ann.drain().is_empty());

    server.shutdown();
}

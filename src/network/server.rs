//! WebSocket Lobby Server
//!
//! Async WebSocket server for lobby play. The request path picks the
//! lobby operation; the first frame sent back is a JSON handshake reply,
//! everything after that is the binary board-sync protocol.
//!
//! ```text
//! GET /lobby/create?name=Ann          -> {"code":"QWERTYUP","players":["Ann"]}
//! GET /lobby/join?code=QWERTYUP&name=Bob
//! GET /lobby/find?name=Cid
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::Utc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio::time::interval_at;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::config::ServerConfig;
use crate::network::codec::{ClientMessage, ServerMessage};
use crate::network::lobby::{HandshakeReply, LobbyError, LobbyManager};

/// How often idle clients and stale lobbies are swept.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// How long an evicted connection gets to flush its queue.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Request path is not a lobby operation.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Lobby error.
    #[error("{0}")]
    Lobby(#[from] LobbyError),
}

/// Lobby operation requested by the connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyRoute {
    /// Open a new lobby.
    Create { name: String },
    /// Join a lobby by code.
    Join { code: String, name: String },
    /// Join any open lobby or open a new one.
    Find { name: String },
}

impl LobbyRoute {
    /// Parse a request path and query string.
    pub fn parse(path: &str, query: Option<&str>) -> Result<Self, GameServerError> {
        let params: BTreeMap<String, String> = url::form_urlencoded::parse(query.unwrap_or("").as_bytes())
            .into_owned()
            .collect();
        let param = |key: &str| -> Result<String, GameServerError> {
            match params.get(key).map(|v| v.trim()) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(GameServerError::BadRequest(format!("missing {}", key))),
            }
        };

        match path.trim_end_matches('/') {
            "/lobby/create" => Ok(LobbyRoute::Create { name: param("name")? }),
            "/lobby/join" => Ok(LobbyRoute::Join {
                code: param("code")?.to_uppercase(),
                name: param("name")?,
            }),
            "/lobby/find" => Ok(LobbyRoute::Find { name: param("name")? }),
            other => Err(GameServerError::BadRequest(format!("unknown path {}", other))),
        }
    }

    /// Build the connection URL for this route on `base` (`ws://host:port`).
    pub fn url(&self, base: &str) -> Result<url::Url, url::ParseError> {
        let mut url = url::Url::parse(base)?;
        let (path, code) = match self {
            LobbyRoute::Create { .. } => ("/lobby/create", None),
            LobbyRoute::Join { code, .. } => ("/lobby/join", Some(code)),
            LobbyRoute::Find { .. } => ("/lobby/find", None),
        };
        url.set_path(path);
        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            if let Some(code) = code {
                query.append_pair("code", code);
            }
            query.append_pair("name", self.name());
        }
        Ok(url)
    }

    /// Player name carried by the route.
    pub fn name(&self) -> &str {
        match self {
            LobbyRoute::Create { name } | LobbyRoute::Join { name, .. } | LobbyRoute::Find { name } => name,
        }
    }
}

/// Why the sweep is closing a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Eviction {
    /// No inbound frame within the idle timeout.
    Idle,
    /// The client's lobby was closed as stale.
    LobbySwept,
}

type ClientMap = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// Connected client state.
struct ConnectedClient {
    /// Lobby the client is in.
    code: String,
    /// Player name.
    name: String,
    /// Connection time.
    connected_at: Instant,
    /// Last inbound frame.
    last_activity: Instant,
    /// Tells the connection task to close.
    evict: broadcast::Sender<Eviction>,
}

/// The lobby server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Lobby manager.
    lobbies: Arc<RwLock<LobbyManager>>,
    /// Connected clients.
    clients: ClientMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            lobbies: Arc::new(RwLock::new(LobbyManager::new(config.lobby.clone()))),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            config,
            shutdown_tx,
        }
    }

    /// Bind the configured address and run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Lobby server listening on {}", self.config.bind_addr);
        self.run_with_listener(listener).await
    }

    /// Run on an already bound listener until shutdown.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let cleanup_clients = self.clients.clone();
        let cleanup_lobbies = self.lobbies.clone();
        let idle_timeout = self.config.idle_timeout;

        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, cleanup_lobbies, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
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

        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let lobbies = self.lobbies.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut target: Option<(String, Option<String>)> = None;
            let capture_target = |req: &Request, resp: Response| {
                target = Some((req.uri().path().to_string(), req.uri().query().map(str::to_string)));
                Ok::<Response, ErrorResponse>(resp)
            };

            let ws_stream = match accept_hdr_async(stream, capture_target).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            let joined = match target {
                Some((path, query)) => match LobbyRoute::parse(&path, query.as_deref()) {
                    Ok(route) => Self::enter_lobby(&lobbies, &route, msg_tx.clone())
                        .await
                        .map(|info| (route.name().to_string(), info)),
                    Err(e) => Err(e),
                },
                None => Err(GameServerError::BadRequest("missing request target".to_string())),
            };

            let (name, info) = match joined {
                Ok(joined) => joined,
                Err(e) => {
                    debug!("Rejecting {}: {}", addr, e);
                    let reply = HandshakeReply::Rejected { error: e.to_string() };
                    if let Ok(text) = serde_json::to_string(&reply) {
                        let _ = ws_sender.send(Message::Text(text)).await;
                    }
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return;
                }
            };
            let code = info.code.clone();

            let reply = match serde_json::to_string(&HandshakeReply::Joined(info)) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize handshake reply: {}", e);
                    let _ = lobbies.write().await.leave(&code, &name);
                    return;
                }
            };
            if ws_sender.send(Message::Text(reply)).await.is_err() {
                let _ = lobbies.write().await.leave(&code, &name);
                return;
            }

            // Register client
            let (evict_tx, mut evict_rx) = broadcast::channel(1);
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    code: code.clone(),
                    name: name.clone(),
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                    evict: evict_tx,
                });
            }

            // Spawn message sender task; the socket closes once every
            // sender (ours and the lobby's) is gone
            let mut sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let bytes = match msg.encode() {
                        Ok(b) => b,
                        Err(e) => {
                            error!("Failed to encode {}: {}", msg.kind(), e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Binary(bytes)).await.is_err() {
                        return;
                    }
                }
                let _ = ws_sender.send(Message::Close(None)).await;
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        if let Some(Ok(_)) = msg {
                            let mut clients = clients.write().await;
                            if let Some(client) = clients.get_mut(&addr) {
                                client.last_activity = Instant::now();
                            }
                        }

                        match msg {
                            Some(Ok(Message::Binary(data))) => {
                                match ClientMessage::decode(&data) {
                                    Ok(client_msg) => {
                                        Self::handle_client_message(&lobbies, &code, &name, client_msg).await;
                                    }
                                    Err(e) => {
                                        warn!("Dropping malformed frame from {} ({} bytes): {}", addr, data.len(), e);
                                    }
                                }
                            }
                            Some(Ok(Message::Text(_))) => {
                                debug!("Ignoring text frame from {}", addr);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    reason = evict_rx.recv() => {
                        info!("Evicting {} ({}): {:?}", addr, name, reason);
                        // A swept lobby has already told its players
                        if let Ok(Eviction::Idle) = reason {
                            if msg_tx.try_send(ServerMessage::GameEnd).is_err() {
                                debug!("Queue full, {} evicted without GameEnd", addr);
                            }
                        }
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            if let Err(e) = lobbies.write().await.leave(&code, &name) {
                debug!("{} was already out of lobby {}: {}", name, code, e);
            }

            drop(msg_tx);
            if tokio::time::timeout(FLUSH_TIMEOUT, &mut sender_task).await.is_err() {
                debug!("Writer for {} did not flush in time", addr);
                sender_task.abort();
            }

            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    "Client {} ({}) cleaned up after {:?}",
                    addr, client.name, client.connected_at.elapsed()
                );
            }
        });
    }

    async fn enter_lobby(
        lobbies: &Arc<RwLock<LobbyManager>>,
        route: &LobbyRoute,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<crate::network::lobby::JoinInfo, GameServerError> {
        let mut lobbies = lobbies.write().await;
        let info = match route {
            LobbyRoute::Create { name } => lobbies.create(name, sender),
            LobbyRoute::Join { code, name } => lobbies.join(code, name, sender)?,
            LobbyRoute::Find { name } => lobbies.find(name, sender),
        };
        Ok(info)
    }

    /// Handle a decoded client message.
    async fn handle_client_message(
        lobbies: &Arc<RwLock<LobbyManager>>,
        code: &str,
        name: &str,
        msg: ClientMessage,
    ) {
        let mut lobbies = lobbies.write().await;
        match msg {
            ClientMessage::Ready => match lobbies.handle_ready(code, name) {
                Ok(started) => debug!("{} ready in {} (started: {})", name, code, started),
                Err(e) => warn!("Ready from {} in {} rejected: {}", name, code, e),
            },
            ClientMessage::Drop { board } => match lobbies.handle_drop(code, name, board) {
                Ok(outcome) => debug!("Drop #{} from {} relayed to {}", outcome.drops, name, outcome.relayed_to),
                Err(e) => warn!("Drop from {} in {} rejected: {}", name, code, e),
            },
        }
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(clients: ClientMap, lobbies: Arc<RwLock<LobbyManager>>, idle_timeout: Duration) {
        let start = tokio::time::Instant::now() + CLEANUP_INTERVAL;
        let mut interval = interval_at(start, CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            Self::sweep_once(&clients, &lobbies, idle_timeout).await;
        }
    }

    /// One pass of the cleanup loop: evict idle clients and close stale
    /// lobbies. Evicted players are told `GameEnd` and their sockets are
    /// closed; the connection task does the lobby bookkeeping.
    pub async fn sweep(&self) {
        Self::sweep_once(&self.clients, &self.lobbies, self.config.idle_timeout).await;
    }

    async fn sweep_once(clients: &ClientMap, lobbies: &Arc<RwLock<LobbyManager>>, idle_timeout: Duration) {
        // Cleanup idle connections
        let now = Instant::now();
        {
            let clients = clients.read().await;
            for (addr, client) in clients.iter() {
                if now.duration_since(client.last_activity) > idle_timeout {
                    info!("Client {} idle, evicting", addr);
                    if client.evict.send(Eviction::Idle).is_err() {
                        debug!("Client {} already closing", addr);
                    }
                }
            }
        }

        // Cleanup stale lobbies
        let swept = lobbies.write().await.cleanup_stale(Utc::now());
        if swept.is_empty() {
            return;
        }
        debug!("Swept {} stale lobbies", swept.len());

        let clients = clients.read().await;
        for client in clients.values() {
            let in_swept = swept
                .iter()
                .any(|lobby| lobby.code == client.code && lobby.players.contains(&client.name));
            if in_swept && client.evict.send(Eviction::LobbySwept).is_err() {
                debug!("{} already closing", client.name);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get open lobby count.
    pub async fn lobby_count(&self) -> usize {
        self.lobbies.read().await.lobby_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_routes() {
        assert_eq!(
            LobbyRoute::parse("/lobby/create", Some("name=Ann")).unwrap(),
            LobbyRoute::Create { name: "Ann".into() }
        );
        assert_eq!(
            LobbyRoute::parse("/lobby/join/", Some("code=abcdefgh&name=Bob%20B")).unwrap(),
            LobbyRoute::Join { code: "ABCDEFGH".into(), name: "Bob B".into() }
        );
        assert_eq!(
            LobbyRoute::parse("/lobby/find", Some("name=Cid+C")).unwrap().name(),
            "Cid C"
        );
    }

    #[test]
    fn test_route_url_parses_back() {
        let route = LobbyRoute::Join { code: "QWERTYUP".into(), name: "Bob B".into() };
        let url = route.url("ws://127.0.0.1:8080").unwrap();

        assert_eq!(url.path(), "/lobby/join");
        assert_eq!(LobbyRoute::parse(url.path(), url.query()).unwrap(), route);
    }

    #[test]
    fn test_parse_route_errors() {
        assert!(matches!(
            LobbyRoute::parse("/lobby/create", None),
            Err(GameServerError::BadRequest(_))
        ));
        assert!(matches!(
            LobbyRoute::parse("/lobby/join", Some("name=Bob")),
            Err(GameServerError::BadRequest(_))
        ));
        assert!(matches!(
            LobbyRoute::parse("/lobby/find", Some("name=%20")),
            Err(GameServerError::BadRequest(_))
        ));
        assert!(matches!(
            LobbyRoute::parse("/", Some("name=Ann")),
            Err(GameServerError::BadRequest(_))
        ));
    }

    #[test]
    fn test_lobby_error_message_passthrough() {
        let err = GameServerError::from(LobbyError::LobbyFull);
        assert_eq!(err.to_string(), "Lobby full");
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = GameServer::new(config);

        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.lobby_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Arc::new(GameServer::new(ServerConfig::default()));

        let running = server.clone();
        let handle = tokio::spawn(async move { running.run_with_listener(listener).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}

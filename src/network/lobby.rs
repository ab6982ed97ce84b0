//! Lobby Management
//!
//! Two-player lobbies addressed by 8-letter codes. The manager owns every
//! lobby and the outbound channel of every player in one; all routing of
//! server messages happens here.
//!
//! ```text
//! WaitingForPlayers ──(lobby full)──► WaitingForReady ──(all ready)──► Playing
//!        ▲                                   │                          │
//!        └──────────(player leaves)──────────┘      (drop limit / leave)│
//!                                                                       ▼
//!                                                                     Ended
//! ```

use std::collections::{BTreeMap, BTreeSet};
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::LobbyConfig;
use crate::core::rng::DeterministicRng;
use crate::game::board::BoardState;
use crate::network::codec::ServerMessage;

/// Characters lobby codes are drawn from (no I or O).
pub const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Lobby code length.
pub const CODE_LENGTH: usize = 8;

/// Lobby errors, reported to the client in the handshake reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    /// Lobby already has the maximum number of players.
    #[error("Lobby full")]
    LobbyFull,

    /// Another player in the lobby has this name.
    #[error("Name already taken")]
    NameTaken,

    /// No lobby with this code.
    #[error("Lobby not found")]
    LobbyNotFound,

    /// The player is not in this lobby.
    #[error("Player not in lobby")]
    NotInLobby,

    /// Action not allowed in the lobby's current phase.
    #[error("Action not allowed in current lobby phase")]
    InvalidPhase,
}

/// Why a game ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The configured number of drops was reached.
    DropLimit,
    /// A player disconnected mid-game.
    PlayerLeft(String),
}

/// Lobby phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyPhase {
    /// Not full yet. Players may already be ready.
    WaitingForPlayers {
        /// Names that sent Ready.
        ready: BTreeSet<String>,
    },
    /// Full; waiting for everyone to be ready.
    WaitingForReady {
        /// Names that sent Ready.
        ready: BTreeSet<String>,
    },
    /// Game in progress.
    Playing {
        /// Most recent board received.
        board: Option<BoardState>,
        /// Drops so far.
        drops: u32,
    },
    /// Game over.
    Ended {
        /// Why.
        reason: EndReason,
    },
}

/// Handshake reply sent as the first (JSON) frame of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinInfo {
    /// Lobby code.
    pub code: String,
    /// Players in join order, including the caller.
    pub players: Vec<String>,
}

/// Either a lobby to play in or the reason there is none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandshakeReply {
    /// Joined or created a lobby.
    Joined(JoinInfo),
    /// Refused; the connection is closed after this frame.
    Rejected {
        /// Human-readable reason.
        error: String,
    },
}

/// A lobby closed by the stale sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweptLobby {
    /// Its code.
    pub code: String,
    /// Players that were still in it.
    pub players: Vec<String>,
}

/// Result of a relayed drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropOutcome {
    /// Drops in this game so far.
    pub drops: u32,
    /// Players the board was relayed to.
    pub relayed_to: usize,
    /// Whether this drop ended the game.
    pub ended: bool,
}

struct LobbyPlayer {
    name: String,
    sender: mpsc::Sender<ServerMessage>,
}

/// One lobby.
pub struct Lobby {
    code: String,
    players: Vec<LobbyPlayer>,
    phase: LobbyPhase,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl Lobby {
    fn new(code: String) -> Self {
        let now = Utc::now();
        Self {
            code,
            players: Vec::new(),
            phase: LobbyPhase::WaitingForPlayers { ready: BTreeSet::new() },
            created_at: now,
            last_activity: now,
        }
    }

    /// Lobby code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Current phase.
    pub fn phase(&self) -> &LobbyPhase {
        &self.phase
    }

    /// Player names in join order.
    pub fn player_names(&self) -> Vec<String> {
        self.players.iter().map(|p| p.name.clone()).collect()
    }

    /// Number of players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last join, ready, drop or leave.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    fn contains(&self, name: &str) -> bool {
        self.players.iter().any(|p| p.name == name)
    }

    fn is_joinable(&self) -> bool {
        matches!(
            self.phase,
            LobbyPhase::WaitingForPlayers { .. } | LobbyPhase::WaitingForReady { .. }
        )
    }

    fn info(&self) -> JoinInfo {
        JoinInfo {
            code: self.code.clone(),
            players: self.player_names(),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    fn deliver(&self, player: &LobbyPlayer, message: ServerMessage) -> bool {
        match player.sender.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                warn!("Lobby {}: could not deliver to {}: {}", self.code, player.name, e);
                false
            }
        }
    }

    fn broadcast(&self, message: ServerMessage) {
        for player in &self.players {
            self.deliver(player, message.clone());
        }
    }

    fn broadcast_except(&self, name: &str, message: ServerMessage) -> usize {
        self.players
            .iter()
            .filter(|p| p.name != name)
            .filter(|p| self.deliver(p, message.clone()))
            .count()
    }
}

/// Owner of every lobby.
pub struct LobbyManager {
    lobbies: BTreeMap<String, Lobby>,
    rng: DeterministicRng,
    config: LobbyConfig,
}

impl LobbyManager {
    /// Create a manager with a random code sequence.
    pub fn new(config: LobbyConfig) -> Self {
        let (seed, _) = uuid::Uuid::new_v4().as_u64_pair();
        Self::with_seed(config, seed)
    }

    /// Create a manager with a fixed code sequence.
    pub fn with_seed(config: LobbyConfig, seed: u64) -> Self {
        Self {
            lobbies: BTreeMap::new(),
            rng: DeterministicRng::new(seed),
            config,
        }
    }

    /// Look up a lobby.
    pub fn lobby(&self, code: &str) -> Option<&Lobby> {
        self.lobbies.get(code)
    }

    /// Number of open lobbies.
    pub fn lobby_count(&self) -> usize {
        self.lobbies.len()
    }

    fn generate_code(&mut self) -> String {
        loop {
            let code: String = (0..CODE_LENGTH)
                .map(|_| CODE_CHARSET[self.rng.next_int(CODE_CHARSET.len() as u32) as usize] as char)
                .collect();
            if !self.lobbies.contains_key(&code) {
                return code;
            }
        }
    }

    /// Open a new lobby with `name` as its only player.
    pub fn create(&mut self, name: &str, sender: mpsc::Sender<ServerMessage>) -> JoinInfo {
        let code = self.generate_code();
        let mut lobby = Lobby::new(code.clone());
        lobby.players.push(LobbyPlayer { name: name.to_string(), sender });
        lobby.broadcast(ServerMessage::PlayerJoined { name: name.to_string() });

        info!("Lobby {} created by {}", code, name);
        let info = lobby.info();
        self.lobbies.insert(code, lobby);
        info
    }

    /// Join an existing lobby by code.
    pub fn join(
        &mut self,
        code: &str,
        name: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<JoinInfo, LobbyError> {
        let max_players = self.config.max_players;
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::LobbyNotFound)?;

        if lobby.players.len() >= max_players {
            return Err(LobbyError::LobbyFull);
        }
        if lobby.contains(name) {
            return Err(LobbyError::NameTaken);
        }
        if !lobby.is_joinable() {
            return Err(LobbyError::InvalidPhase);
        }

        // Roster first, then everybody (newcomer included) hears about the newcomer
        let newcomer = LobbyPlayer { name: name.to_string(), sender };
        for existing in &lobby.players {
            lobby.deliver(&newcomer, ServerMessage::PlayerJoined { name: existing.name.clone() });
        }
        lobby.players.push(newcomer);
        lobby.broadcast(ServerMessage::PlayerJoined { name: name.to_string() });
        lobby.touch();

        info!("{} joined lobby {} ({}/{})", name, code, lobby.players.len(), max_players);

        if lobby.players.len() >= max_players {
            if let LobbyPhase::WaitingForPlayers { ready } = &mut lobby.phase {
                let ready = std::mem::take(ready);
                lobby.phase = LobbyPhase::WaitingForReady { ready };
            }
        }
        let info = lobby.info();
        self.maybe_start(code);
        Ok(info)
    }

    /// Join the first open lobby that does not already hold `name`, or
    /// create one.
    pub fn find(&mut self, name: &str, sender: mpsc::Sender<ServerMessage>) -> JoinInfo {
        let max_players = self.config.max_players;
        let open = self
            .lobbies
            .values()
            .find(|l| l.players.len() < max_players && l.is_joinable() && !l.contains(name))
            .map(|l| l.code.clone());

        if let Some(code) = open {
            match self.join(&code, name, sender.clone()) {
                Ok(info) => return info,
                Err(e) => warn!("Find: join of {} failed: {}", code, e),
            }
        }
        self.create(name, sender)
    }

    /// Remove a player. The others hear `PlayerLeft`; mid-game they also
    /// get `GameEnd`. Empty lobbies are closed.
    pub fn leave(&mut self, code: &str, name: &str) -> Result<(), LobbyError> {
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::LobbyNotFound)?;
        let before = lobby.players.len();
        lobby.players.retain(|p| p.name != name);
        if lobby.players.len() == before {
            return Err(LobbyError::NotInLobby);
        }
        lobby.touch();

        lobby.broadcast(ServerMessage::PlayerLeft { name: name.to_string() });
        match &mut lobby.phase {
            LobbyPhase::WaitingForPlayers { ready } | LobbyPhase::WaitingForReady { ready } => {
                ready.remove(name);
                let ready = std::mem::take(ready);
                lobby.phase = LobbyPhase::WaitingForPlayers { ready };
            }
            LobbyPhase::Playing { .. } => {
                lobby.broadcast(ServerMessage::GameEnd);
                lobby.phase = LobbyPhase::Ended { reason: EndReason::PlayerLeft(name.to_string()) };
                info!("Lobby {}: game ended, {} left", code, name);
            }
            LobbyPhase::Ended { .. } => {}
        }

        info!("{} left lobby {}", name, code);
        if lobby.players.is_empty() {
            self.lobbies.remove(code);
            info!("Lobby {} closed", code);
        }
        Ok(())
    }

    /// Mark a player ready. Returns `true` if this started the game.
    pub fn handle_ready(&mut self, code: &str, name: &str) -> Result<bool, LobbyError> {
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::LobbyNotFound)?;
        if !lobby.contains(name) {
            return Err(LobbyError::NotInLobby);
        }
        match &mut lobby.phase {
            LobbyPhase::WaitingForPlayers { ready } | LobbyPhase::WaitingForReady { ready } => {
                ready.insert(name.to_string());
            }
            _ => return Err(LobbyError::InvalidPhase),
        }
        lobby.touch();
        debug!("{} ready in lobby {}", name, code);

        Ok(self.maybe_start(code))
    }

    fn maybe_start(&mut self, code: &str) -> bool {
        let min_players = self.config.min_players;
        let Some(lobby) = self.lobbies.get_mut(code) else { return false };

        let all_ready = match &lobby.phase {
            LobbyPhase::WaitingForReady { ready } => {
                lobby.players.len() >= min_players
                    && lobby.players.iter().all(|p| ready.contains(&p.name))
            }
            _ => false,
        };
        if !all_ready {
            return false;
        }

        lobby.phase = LobbyPhase::Playing { board: None, drops: 0 };
        lobby.broadcast(ServerMessage::GameStart);
        info!("Lobby {}: game started with {:?}", code, lobby.player_names());
        true
    }

    /// Store a player's board and relay it to everyone else.
    pub fn handle_drop(
        &mut self,
        code: &str,
        name: &str,
        board: BoardState,
    ) -> Result<DropOutcome, LobbyError> {
        let max_drops = self.config.max_drops;
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::LobbyNotFound)?;
        if !lobby.contains(name) {
            return Err(LobbyError::NotInLobby);
        }

        let drops = match &mut lobby.phase {
            LobbyPhase::Playing { board: latest, drops } => {
                *drops += 1;
                *latest = Some(board.clone());
                *drops
            }
            _ => return Err(LobbyError::InvalidPhase),
        };
        lobby.touch();

        debug!(
            "Lobby {}: drop #{} by {} ({} pieces, score {})",
            code, drops, name, board.piece_count(), board.score()
        );
        let relayed_to = lobby.broadcast_except(name, ServerMessage::BoardUpdate {
            player: name.to_string(),
            board,
        });

        let ended = max_drops > 0 && drops >= max_drops;
        if ended {
            lobby.broadcast(ServerMessage::GameEnd);
            lobby.phase = LobbyPhase::Ended { reason: EndReason::DropLimit };
            info!("Lobby {}: game ended after {} drops", code, drops);
        }

        Ok(DropOutcome { drops, relayed_to, ended })
    }

    /// Close lobbies idle since before `now - stale_after`.
    ///
    /// Every player still in a closed lobby receives `GameEnd`; the caller
    /// is expected to disconnect the returned players.
    pub fn cleanup_stale(&mut self, now: DateTime<Utc>) -> Vec<SweptLobby> {
        let max_idle = chrono::Duration::from_std(self.config.stale_after)
            .unwrap_or_else(|_| chrono::Duration::days(365));

        let stale: Vec<String> = self
            .lobbies
            .values()
            .filter(|l| now - l.last_activity > max_idle)
            .map(|l| l.code.clone())
            .collect();

        let mut swept = Vec::with_capacity(stale.len());
        for code in stale {
            if let Some(lobby) = self.lobbies.remove(&code) {
                lobby.broadcast(ServerMessage::GameEnd);
                info!("Removed stale lobby {} ({} players evicted)", code, lobby.players.len());
                swept.push(SweptLobby { players: lobby.player_names(), code });
            }
        }
        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::game::catalog::Fruit;
    use crate::physics::ColliderHandle;

    type Inbox = mpsc::Receiver<ServerMessage>;

    fn manager(max_drops: u32) -> LobbyManager {
        LobbyManager::with_seed(LobbyConfig { max_drops, ..Default::default() }, 7)
    }

    fn channel() -> (mpsc::Sender<ServerMessage>, Inbox) {
        mpsc::channel(32)
    }

    fn drain(inbox: &mut Inbox) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = inbox.try_recv() {
            out.push(msg);
        }
        out
    }

    fn joined(name: &str) -> ServerMessage {
        ServerMessage::PlayerJoined { name: name.to_string() }
    }

    fn sample_board() -> BoardState {
        let mut board = BoardState { physics_snapshot: vec![1, 2, 3], ..Default::default() };
        board.piece_table.insert(ColliderHandle::from_raw(3), Fruit::Grape);
        board
    }

    fn started_lobby(max_drops: u32) -> (LobbyManager, String, Inbox, Inbox) {
        let mut lobbies = manager(max_drops);
        let (ann_tx, mut ann) = channel();
        let (bob_tx, mut bob) = channel();
        let code = lobbies.create("Ann", ann_tx).code;
        lobbies.join(&code, "Bob", bob_tx).unwrap();
        lobbies.handle_ready(&code, "Ann").unwrap();
        assert!(lobbies.handle_ready(&code, "Bob").unwrap());
        drain(&mut ann);
        drain(&mut bob);
        (lobbies, code, ann, bob)
    }

    #[test]
    fn test_code_format() {
        let mut lobbies = manager(0);
        let (tx, _rx) = channel();
        let info = lobbies.create("Ann", tx);

        assert_eq!(info.code.len(), CODE_LENGTH);
        assert!(info.code.bytes().all(|b| CODE_CHARSET.contains(&b)));
        assert_eq!(info.players, vec!["Ann".to_string()]);
    }

    #[test]
    fn test_join_roster_messages() {
        let mut lobbies = manager(0);
        let (ann_tx, mut ann) = channel();
        let (bob_tx, mut bob) = channel();

        let code = lobbies.create("Ann", ann_tx).code;
        let info = lobbies.join(&code, "Bob", bob_tx).unwrap();

        assert_eq!(info.players, vec!["Ann".to_string(), "Bob".to_string()]);
        assert_eq!(drain(&mut ann), vec![joined("Ann"), joined("Bob")]);
        assert_eq!(drain(&mut bob), vec![joined("Ann"), joined("Bob")]);
        assert!(matches!(
            lobbies.lobby(&code).unwrap().phase(),
            LobbyPhase::WaitingForReady { .. }
        ));
    }

    #[test]
    fn test_join_errors() {
        let mut lobbies = manager(0);
        let (tx, _rx) = channel();

        assert_eq!(lobbies.join("NOPE", "Ann", tx.clone()), Err(LobbyError::LobbyNotFound));

        let code = lobbies.create("Ann", tx.clone()).code;
        assert_eq!(lobbies.join(&code, "Ann", tx.clone()), Err(LobbyError::NameTaken));

        lobbies.join(&code, "Bob", tx.clone()).unwrap();
        assert_eq!(lobbies.join(&code, "Cid", tx), Err(LobbyError::LobbyFull));
    }

    #[test]
    fn test_find_reuses_open_lobby() {
        let mut lobbies = manager(0);
        let (tx, _rx) = channel();

        let first = lobbies.find("Ann", tx.clone());
        let same_name = lobbies.find("Ann", tx.clone());
        assert_ne!(first.code, same_name.code);

        let second = lobbies.find("Bob", tx.clone());
        assert!(second.code == first.code || second.code == same_name.code);
        assert_eq!(second.players, vec!["Ann".to_string(), "Bob".to_string()]);
        assert_eq!(lobbies.lobby_count(), 2);

        let third = lobbies.find("Bob", tx);
        assert_eq!(third.players, vec!["Ann".to_string(), "Bob".to_string()]);
        assert_ne!(third.code, second.code);
        assert_eq!(lobbies.lobby_count(), 2);
    }

    #[test]
    fn test_ready_starts_game_when_full() {
        let mut lobbies = manager(0);
        let (ann_tx, mut ann) = channel();
        let (bob_tx, mut bob) = channel();
        let code = lobbies.create("Ann", ann_tx).code;

        // Ready before the lobby is full is remembered
        assert!(!lobbies.handle_ready(&code, "Ann").unwrap());
        lobbies.join(&code, "Bob", bob_tx).unwrap();
        assert!(lobbies.handle_ready(&code, "Bob").unwrap());

        assert_eq!(drain(&mut ann).last(), Some(&ServerMessage::GameStart));
        assert_eq!(drain(&mut bob).last(), Some(&ServerMessage::GameStart));
        assert_eq!(lobbies.handle_ready(&code, "Bob"), Err(LobbyError::InvalidPhase));
        assert_eq!(lobbies.handle_ready(&code, "Zed"), Err(LobbyError::NotInLobby));
    }

    #[test]
    fn test_drop_relayed_to_others() {
        let (mut lobbies, code, mut ann, mut bob) = started_lobby(0);

        let outcome = lobbies.handle_drop(&code, "Ann", sample_board()).unwrap();

        assert_eq!(outcome, DropOutcome { drops: 1, relayed_to: 1, ended: false });
        assert!(drain(&mut ann).is_empty());
        assert_eq!(
            drain(&mut bob),
            vec![ServerMessage::BoardUpdate { player: "Ann".into(), board: sample_board() }]
        );
    }

    #[test]
    fn test_drop_before_start_rejected() {
        let mut lobbies = manager(0);
        let (tx, _rx) = channel();
        let code = lobbies.create("Ann", tx).code;
        assert_eq!(
            lobbies.handle_drop(&code, "Ann", sample_board()),
            Err(LobbyError::InvalidPhase)
        );
    }

    #[test]
    fn test_drop_limit_ends_game() {
        let (mut lobbies, code, mut ann, mut bob) = started_lobby(2);

        lobbies.handle_drop(&code, "Ann", sample_board()).unwrap();
        let outcome = lobbies.handle_drop(&code, "Bob", sample_board()).unwrap();

        assert!(outcome.ended);
        assert_eq!(drain(&mut ann).last(), Some(&ServerMessage::GameEnd));
        assert_eq!(drain(&mut bob).last(), Some(&ServerMessage::GameEnd));
        assert_eq!(
            lobbies.lobby(&code).unwrap().phase(),
            &LobbyPhase::Ended { reason: EndReason::DropLimit }
        );
    }

    #[test]
    fn test_leave_mid_game_ends_it() {
        let (mut lobbies, code, _ann, mut bob) = started_lobby(0);

        lobbies.leave(&code, "Ann").unwrap();

        assert_eq!(
            drain(&mut bob),
            vec![ServerMessage::PlayerLeft { name: "Ann".into() }, ServerMessage::GameEnd]
        );
        assert_eq!(lobbies.leave(&code, "Ann"), Err(LobbyError::NotInLobby));

        lobbies.leave(&code, "Bob").unwrap();
        assert!(lobbies.lobby(&code).is_none());
    }

    #[test]
    fn test_leave_while_waiting_reopens_lobby() {
        let mut lobbies = manager(0);
        let (tx, _rx) = channel();
        let code = lobbies.create("Ann", tx.clone()).code;
        lobbies.join(&code, "Bob", tx.clone()).unwrap();
        lobbies.handle_ready(&code, "Bob").unwrap();

        lobbies.leave(&code, "Bob").unwrap();
        assert_eq!(
            lobbies.lobby(&code).unwrap().phase(),
            &LobbyPhase::WaitingForPlayers { ready: BTreeSet::new() }
        );
        lobbies.join(&code, "Cid", tx).unwrap();
    }

    #[test]
    fn test_handshake_reply_json() {
        let joined = HandshakeReply::Joined(JoinInfo {
            code: "ABCDEFGH".into(),
            players: vec!["Ann".into()],
        });
        let json = serde_json::to_string(&joined).unwrap();
        assert_eq!(json, r#"{"code":"ABCDEFGH","players":["Ann"]}"#);

        let rejected: HandshakeReply = serde_json::from_str(r#"{"error":"Lobby full"}"#).unwrap();
        assert_eq!(rejected, HandshakeReply::Rejected { error: "Lobby full".into() });
        assert_eq!(serde_json::from_str::<HandshakeReply>(&json).unwrap(), joined);
    }

    #[test]
    fn test_cleanup_stale() {
        let mut lobbies = LobbyManager::with_seed(
            LobbyConfig { stale_after: Duration::from_secs(60), ..Default::default() },
            1,
        );
        let (tx, mut ann) = channel();
        let code = lobbies.create("Ann", tx).code;
        drain(&mut ann);

        assert!(lobbies.cleanup_stale(Utc::now()).is_empty());
        assert!(drain(&mut ann).is_empty());

        let later = Utc::now() + chrono::Duration::seconds(120);
        let swept = lobbies.cleanup_stale(later);

        assert_eq!(swept, vec![SweptLobby { code: code.clone(), players: vec!["Ann".into()] }]);
        assert_eq!(drain(&mut ann), vec![ServerMessage::GameEnd]);
        assert_eq!(lobbies.lobby_count(), 0);
        assert_eq!(lobbies.handle_ready(&code, "Ann"), Err(LobbyError::LobbyNotFound));
    }

    #[test]
    fn test_cleanup_keeps_active_lobby() {
        let mut lobbies = LobbyManager::with_seed(
            LobbyConfig { stale_after: Duration::from_secs(60), ..Default::default() },
            2,
        );
        let (tx, _rx) = channel();
        let code = lobbies.create("Ann", tx.clone()).code;
        lobbies.join(&code, "Bob", tx).unwrap();

        let soon = Utc::now() + chrono::Duration::seconds(30);
        assert!(lobbies.cleanup_stale(soon).is_empty());
        assert!(lobbies.lobby(&code).is_some());
    }
}

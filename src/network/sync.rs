//! Session Synchronizer
//!
//! Client-side state machine for networked play:
//!
//! ```text
//! Connecting ──(handshake)──► Lobby ──(GameStart)──► Playing ──(GameEnd)──► Ended
//!                                                       │                    ▲
//!                                                       └─(restore failed)───┘
//! ```
//!
//! Inbound messages are queued and applied at one point per frame, before
//! the simulation steps. A `BoardUpdate` replaces the whole local board.

use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

use crate::core::fixed::Fixed;
use crate::core::rng::derive_drop_seed;
use crate::game::board::BoardError;
use crate::game::simulation::Simulation;
use crate::network::codec::{ClientMessage, CodecError, ServerMessage};
use crate::network::lobby::JoinInfo;
use crate::physics::PhysicsBackend;
use crate::render::Renderer;

/// Synchronizer state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Waiting for the lobby handshake.
    Connecting,
    /// In a lobby, game not started.
    Lobby,
    /// Game running.
    Playing,
    /// Game over or session broken.
    Ended,
}

/// Synchronizer errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Action not allowed in the current state.
    #[error("{action} not allowed while {state:?}")]
    InvalidState {
        action: &'static str,
        state: SyncState,
    },

    /// Inbound frame could not be decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Board operation failed.
    #[error("Board error: {0}")]
    Board(#[from] BoardError),
}

/// One client's view of a lobby session.
#[derive(Debug)]
pub struct SessionSynchronizer {
    name: String,
    code: Option<String>,
    state: SyncState,
    roster: Vec<String>,
    inbound: VecDeque<ServerMessage>,
    last_update_from: Option<String>,
    updates_applied: u64,
    needs_redial: bool,
}

impl SessionSynchronizer {
    /// Create a synchronizer for player `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: None,
            state: SyncState::Connecting,
            roster: Vec::new(),
            inbound: VecDeque::new(),
            last_update_from: None,
            updates_applied: 0,
            needs_redial: false,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lobby code once connected.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Players currently in the lobby, in join order.
    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    /// Player whose board was most recently applied.
    pub fn last_update_from(&self) -> Option<&str> {
        self.last_update_from.as_deref()
    }

    /// Boards applied so far.
    pub fn updates_applied(&self) -> u64 {
        self.updates_applied
    }

    /// Set when the session broke and the client should reconnect.
    pub fn needs_redial(&self) -> bool {
        self.needs_redial
    }

    /// Whether the simulation loop should advance this frame.
    pub fn should_advance(&self) -> bool {
        self.state == SyncState::Playing
    }

    /// Drop seed for this player in this lobby.
    pub fn drop_seed(&self) -> u64 {
        derive_drop_seed(self.code.as_deref().unwrap_or(""), &self.name)
    }

    /// Apply the lobby handshake reply.
    pub fn on_connected(&mut self, info: &JoinInfo) -> Result<(), SyncError> {
        if self.state != SyncState::Connecting {
            return Err(SyncError::InvalidState { action: "handshake", state: self.state });
        }
        self.code = Some(info.code.clone());
        self.roster = info.players.clone();
        self.state = SyncState::Lobby;
        info!("{} in lobby {} with {:?}", self.name, info.code, self.roster);
        Ok(())
    }

    /// Queue a decoded message for the next frame.
    pub fn push_inbound(&mut self, msg: ServerMessage) {
        self.inbound.push_back(msg);
    }

    /// Decode and queue a raw frame.
    pub fn push_frame(&mut self, frame: &[u8]) -> Result<(), SyncError> {
        let msg = ServerMessage::decode(frame)?;
        self.push_inbound(msg);
        Ok(())
    }

    /// Messages waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    /// Apply every queued message in arrival order. Returns how many were
    /// applied.
    ///
    /// A board that cannot be restored ends the session: the queue is
    /// discarded, the state becomes `Ended` and `needs_redial` is set.
    pub fn drain_inbound<P: PhysicsBackend, R: Renderer>(
        &mut self,
        sim: &mut Simulation<P, R>,
    ) -> Result<usize, SyncError> {
        let mut applied = 0;
        while let Some(msg) = self.inbound.pop_front() {
            if let Err(e) = self.apply(sim, msg) {
                self.inbound.clear();
                return Err(e);
            }
            applied += 1;
        }
        Ok(applied)
    }

    fn apply<P: PhysicsBackend, R: Renderer>(
        &mut self,
        sim: &mut Simulation<P, R>,
        msg: ServerMessage,
    ) -> Result<(), SyncError> {
        match msg {
            ServerMessage::PlayerJoined { name } => {
                if !self.roster.contains(&name) {
                    debug!("{} joined", name);
                    self.roster.push(name);
                }
            }
            ServerMessage::PlayerLeft { name } => {
                debug!("{} left", name);
                self.roster.retain(|n| *n != name);
            }
            ServerMessage::GameStart => {
                if self.state != SyncState::Lobby {
                    warn!("GameStart ignored while {:?}", self.state);
                    return Ok(());
                }
                sim.reset(self.drop_seed())?;
                self.last_update_from = None;
                self.state = SyncState::Playing;
                info!("Game started for {}", self.name);
            }
            ServerMessage::BoardUpdate { player, board } => {
                if self.state != SyncState::Playing {
                    debug!("Board from {} ignored while {:?}", player, self.state);
                    return Ok(());
                }
                if let Err(e) = sim.restore(&board) {
                    error!("Could not restore board from {}: {}", player, e);
                    self.state = SyncState::Ended;
                    self.needs_redial = true;
                    return Err(e.into());
                }
                debug!("Applied board from {} ({} pieces)", player, board.piece_count());
                self.last_update_from = Some(player);
                self.updates_applied += 1;
            }
            ServerMessage::GameEnd => {
                if self.state != SyncState::Ended {
                    info!("Game ended for {}", self.name);
                    self.state = SyncState::Ended;
                }
            }
        }
        Ok(())
    }

    /// Ready signal for the lobby.
    pub fn ready(&self) -> Result<ClientMessage, SyncError> {
        if self.state != SyncState::Lobby {
            return Err(SyncError::InvalidState { action: "ready", state: self.state });
        }
        Ok(ClientMessage::Ready)
    }

    /// Drop a piece locally and capture the resulting board for the peers.
    pub fn drop_at<P: PhysicsBackend, R: Renderer>(
        &mut self,
        sim: &mut Simulation<P, R>,
        x: Fixed,
    ) -> Result<ClientMessage, SyncError> {
        if self.state != SyncState::Playing {
            return Err(SyncError::InvalidState { action: "drop", state: self.state });
        }
        sim.on_pointer_release(x)?;
        let board = sim.capture()?;
        Ok(ClientMessage::Drop { board })
    }
}

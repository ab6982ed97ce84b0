//! Runtime Configuration
//!
//! Server, lobby, well and local simulation settings. Every struct has a
//! `Default` matching the shipped game; the server settings can be
//! overridden from the environment.

use std::net::SocketAddr;
use std::time::Duration;
use serde::{Serialize, Deserialize};
use tracing::warn;

use crate::core::fixed::{Fixed, from_int, GRAVITY};
use crate::core::vec2::FixedVec2;

// =============================================================================
// SERVER
// =============================================================================

/// Lobby server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Connections silent for longer than this are dropped.
    pub idle_timeout: Duration,
    /// Client tick rate (Hz), advertised to bots.
    pub tick_rate: u32,
    /// Lobby rules.
    pub lobby: LobbyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            tick_rate: 60,
            lobby: LobbyConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Build from defaults, overridden by `SUIKA_BIND_ADDR`,
    /// `SUIKA_MAX_CONNECTIONS` and `SUIKA_MAX_DROPS`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = env_parse::<SocketAddr>("SUIKA_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(max) = env_parse::<usize>("SUIKA_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(drops) = env_parse::<u32>("SUIKA_MAX_DROPS") {
            config.lobby.max_drops = drops;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

/// Lobby rules.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Maximum players per lobby.
    pub max_players: usize,
    /// Players required before the game can start.
    pub min_players: usize,
    /// Drops per game before the server ends it (0 = unlimited).
    pub max_drops: u32,
    /// Lobbies idle for longer than this are swept.
    pub stale_after: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            max_players: 2,
            min_players: 2,
            max_drops: 0,
            stale_after: Duration::from_secs(600),
        }
    }
}

// =============================================================================
// SIMULATION
// =============================================================================

/// Geometry of the well the pieces fall into.
///
/// ```text
///   origin ─►┌──┐                 ┌──┐
///            │  │                 │  │
///            │  │     interior    │  │  height
///            │  │                 │  │
///            └──┴─────────────────┴──┘
///            └──────── width ────────┘
/// ```
///
/// The floor sits below `origin.y + height`, the walls are `wall_thickness`
/// wide and lie inside `width`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellConfig {
    /// Downward acceleration (units/s²).
    pub gravity: Fixed,
    /// Top-left corner of the well.
    pub origin: FixedVec2,
    /// Outer width including both walls.
    pub width: Fixed,
    /// Wall height; the floor top is at `origin.y + height`.
    pub height: Fixed,
    /// Thickness of walls and floor.
    pub wall_thickness: Fixed,
}

impl Default for WellConfig {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            origin: FixedVec2::from_ints(100, 50),
            width: from_int(313),
            height: from_int(351),
            wall_thickness: from_int(20),
        }
    }
}

impl WellConfig {
    /// Horizontal extent of the interior (inner faces of the walls).
    pub fn interior_x(&self) -> (Fixed, Fixed) {
        (
            self.origin.x + self.wall_thickness,
            self.origin.x + self.width - self.wall_thickness,
        )
    }

    /// Y coordinate of the floor's top face.
    pub fn floor_y(&self) -> Fixed {
        self.origin.y + self.height
    }
}

/// Local simulation settings.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Y coordinate new pieces are dropped from.
    pub drop_height: Fixed,
    /// Highest tier a drop can produce (drops pick uniformly from 0..=this).
    pub max_drop_tier: u8,
    /// Seed for the drop sequence.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            drop_height: from_int(50),
            max_drop_tier: 4,
            seed: 0,
        }
    }
}

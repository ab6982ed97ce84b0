//! Bot Client
//!
//! Headless player: joins a lobby, readies up and drops a piece at a random
//! x once per drop interval while the game runs.

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::{SimConfig, WellConfig};
use crate::core::fixed::Fixed;
use crate::core::hash::StateHash;
use crate::core::rng::DeterministicRng;
use crate::game::simulation::Simulation;
use crate::network::server::LobbyRoute;
use crate::network::sync::{SessionSynchronizer, SyncError, SyncState};
use crate::network::transport::{ClientTransport, TransportError};
use crate::physics::{init_engine, PhysicsError};
use crate::render::HeadlessRenderer;

/// Bot errors.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Engine error: {0}")]
    Engine(#[from] PhysicsError),
}

/// Bot settings.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Server base URL (`ws://host:port`).
    pub server_url: String,
    /// Lobby to enter.
    pub route: LobbyRoute,
    /// Frames per second.
    pub tick_rate: u32,
    /// Time between drops.
    pub drop_interval: Duration,
    /// Stop after this many frames (0 = until the game ends).
    pub max_frames: u64,
}

impl BotConfig {
    /// Bot that finds any open lobby.
    pub fn find(server_url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            route: LobbyRoute::Find { name: name.into() },
            tick_rate: 60,
            drop_interval: Duration::from_secs(1),
            max_frames: 0,
        }
    }
}

/// What a bot session did.
#[derive(Debug, Clone)]
pub struct BotReport {
    pub code: String,
    pub final_state: SyncState,
    pub drops: u32,
    pub score: u64,
    pub updates_applied: u64,
    pub frames: u64,
    pub board_hash: StateHash,
}

/// Play one session.
pub async fn run_bot(config: BotConfig) -> Result<BotReport, BotError> {
    let mut transport = ClientTransport::connect(&config.server_url, &config.route).await?;
    let mut sync = SessionSynchronizer::new(config.route.name());
    sync.on_connected(transport.info())?;

    let well = WellConfig::default();
    let (left, right) = well.interior_x();
    let engine = init_engine(&well).await?;
    let seed = sync.drop_seed();
    let mut sim = Simulation::new(engine, HeadlessRenderer::new(), SimConfig { seed, ..Default::default() });
    let mut aim = DeterministicRng::new(seed.rotate_left(17));

    transport.send(sync.ready()?).await?;

    let tick_rate = config.tick_rate.max(1);
    let drop_every = (config.drop_interval.as_secs_f64() * tick_rate as f64).round().max(1.0) as u64;
    let mut ticker = interval(Duration::from_micros(1_000_000 / tick_rate as u64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut frames: u64 = 0;
    let mut playing_frames: u64 = 0;

    loop {
        ticker.tick().await;
        frames += 1;

        for msg in transport.drain() {
            sync.push_inbound(msg);
        }
        if let Err(e) = sync.drain_inbound(&mut sim) {
            warn!("{}: session broken: {}", sync.name(), e);
        }

        if sync.state() == SyncState::Ended || transport.is_closed() {
            break;
        }
        if config.max_frames > 0 && frames >= config.max_frames {
            break;
        }
        if !sync.should_advance() {
            continue;
        }

        playing_frames += 1;
        if playing_frames % drop_every == 0 {
            let x = left + aim.next_int((right - left) as u32) as Fixed;
            let msg = sync.drop_at(&mut sim, x)?;
            transport.send(msg).await?;
        }
        sim.tick();
    }

    let report = BotReport {
        code: sync.code().unwrap_or_default().to_string(),
        final_state: sync.state(),
        drops: sim.drops(),
        score: sim.score(),
        updates_applied: sync.updates_applied(),
        frames,
        board_hash: sim.compute_hash(),
    };
    info!(
        "Bot {} done in lobby {}: {} drops, score {}, {} boards applied",
        sync.name(), report.code, report.drops, report.score, report.updates_applied
    );

    transport.close().await;
    Ok(report)
}

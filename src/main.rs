//! Suika Arena
//!
//! `suika-arena [serve]`          run the lobby server
//! `suika-arena demo`             play an offline board twice and compare hashes
//! `suika-arena bot <url> [name] [code]`  join a lobby as a bot

use std::collections::BTreeMap;
use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use suika_arena::{
    TICK_RATE, VERSION,
    config::{ServerConfig, SimConfig, WellConfig},
    core::fixed::{Fixed, from_int},
    core::rng::DeterministicRng,
    game::Simulation,
    network::{run_bot, BotConfig, GameServer, LobbyRoute},
    physics::init_engine,
    render::HeadlessRenderer,
};

/// Ticks in the offline demo (90 seconds).
const DEMO_TICKS: u32 = 90 * TICK_RATE;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Suika Arena v{}", VERSION);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("serve") => serve().await,
        Some("demo") => demo().await,
        Some("bot") => {
            let url = args.get(1).context("usage: suika-arena bot <url> [name] [code]")?;
            let name = args.get(2).cloned().unwrap_or_else(|| "bot".to_string());
            bot(url, name, args.get(3).cloned()).await
        }
        Some(other) => bail!("unknown command {:?} (expected serve, demo or bot)", other),
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    info!(
        "Max connections: {}, max drops per game: {}",
        config.max_connections, config.lobby.max_drops
    );

    let server = std::sync::Arc::new(GameServer::new(config));
    let running = server.clone();
    let handle = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = handle => result?.context("server stopped")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received");
            server.shutdown();
        }
    }
    Ok(())
}

async fn bot(url: &str, name: String, code: Option<String>) -> anyhow::Result<()> {
    let mut config = BotConfig::find(url, name.clone());
    if let Some(code) = code {
        config.route = LobbyRoute::Join { code, name };
    }

    let report = run_bot(config).await?;
    info!("Final state: {:?}", report.final_state);
    info!("Board hash: {}", hex::encode(report.board_hash));
    Ok(())
}

/// Play a scripted offline board and replay it to check determinism.
async fn demo() -> anyhow::Result<()> {
    info!("=== Starting Demo Board ===");

    let well = WellConfig::default();
    let seed = 12345u64;
    info!("Drop seed: {}", seed);

    // One drop every 40 ticks at a pseudo-random x
    let (left, right) = well.interior_x();
    let mut aim = DeterministicRng::new(seed ^ 0x5eed);
    let drops: BTreeMap<u32, Fixed> = (0..DEMO_TICKS)
        .step_by(40)
        .map(|t| (t, left + aim.next_int((right - left) as u32) as Fixed))
        .collect();

    let config = SimConfig { seed, ..Default::default() };
    let mut sim = Simulation::new(init_engine(&well).await?, HeadlessRenderer::new(), config.clone());

    info!("Running {} ticks with {} drops...", DEMO_TICKS, drops.len());
    let merges = sim.play_script(&drops, DEMO_TICKS)?;

    // Print final results
    info!("=== Board Results ===");
    let hash = sim.compute_hash();
    info!("Merges: {}, score: {}, pieces left: {}", merges, sim.score(), sim.board().registry().len());
    info!("Final Board Hash: {}", hex::encode(hash));

    let board = sim.capture()?;
    info!("Snapshot: {} bytes, {} pieces", board.physics_snapshot.len(), board.piece_count());

    // Verify determinism by replaying
    info!("=== Verifying Determinism ===");
    let mut replay = Simulation::new(init_engine(&well).await?, HeadlessRenderer::new(), config);
    replay.play_script(&drops, DEMO_TICKS)?;
    let replay_hash = replay.compute_hash();

    info!("Replay Board Hash: {}", hex::encode(replay_hash));

    if hash != replay_hash {
        bail!("DETERMINISM FAILURE: Hashes differ!");
    }
    info!("DETERMINISM VERIFIED: Hashes match!");

    // Spot check a drop well outside the walls
    let mut edge_sim = Simulation::new(init_engine(&well).await?, HeadlessRenderer::new(), SimConfig::default());
    let handle = edge_sim.on_pointer_release(from_int(-500))?;
    info!("Out-of-range drop clamped to {}", edge_sim.board().position(handle)?);
    Ok(())
}

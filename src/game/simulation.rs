//! Local Simulation Loop
//!
//! The per-frame driver. Idle until the first drop, then every tick:
//!
//! 1. step the physics world
//! 2. drain collision events into the merge resolver
//! 3. push body poses into the renderer
//! 4. redraw the debug overlay
//!
//! A pointer release is the only spawn trigger besides merges.

use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::config::SimConfig;
use crate::core::fixed::{Fixed, fixed_clamp};
use crate::core::hash::{compute_state_hash, StateHash};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;
use crate::game::board::{BoardContext, BoardError, BoardState};
use crate::game::catalog::entry;
use crate::game::merge::{resolve_merges, MergeOutcome};
use crate::physics::{ColliderHandle, CollisionEvent, PhysicsBackend};
use crate::render::Renderer;

/// Loop state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the first drop.
    Idle,
    /// Stepping every tick.
    Running,
}

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Tick counter after this call.
    pub tick: u32,
    /// Whether the world was stepped.
    pub advanced: bool,
    /// Merges performed this tick, in order.
    pub merges: Vec<MergeOutcome>,
    /// Points earned this tick.
    pub points: u64,
}

/// One board plus its driver state.
pub struct Simulation<P: PhysicsBackend, R: Renderer> {
    ctx: BoardContext<P, R>,
    state: LoopState,
    rng: DeterministicRng,
    config: SimConfig,
    tick: u32,
    score: u64,
    drops: u32,
}

impl<P: PhysicsBackend, R: Renderer> Simulation<P, R> {
    /// Build a simulation around a resolved engine.
    pub fn new(engine: P, renderer: R, config: SimConfig) -> Self {
        Self {
            ctx: BoardContext::new(engine, renderer),
            state: LoopState::Idle,
            rng: DeterministicRng::new(config.seed),
            config,
            tick: 0,
            score: 0,
            drops: 0,
        }
    }

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Ticks advanced so far.
    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    /// Points earned from merges.
    pub fn score(&self) -> u64 {
        self.score
    }

    /// Pieces dropped so far.
    pub fn drops(&self) -> u32 {
        self.drops
    }

    /// The board.
    pub fn board(&self) -> &BoardContext<P, R> {
        &self.ctx
    }

    /// Drop a random low-tier piece at horizontal position `x`.
    ///
    /// `x` is clamped so the piece fits between the walls; the piece
    /// appears at the configured drop height.
    pub fn on_pointer_release(&mut self, x: Fixed) -> Result<ColliderHandle, BoardError> {
        let tier = self.rng.next_int(self.config.max_drop_tier as u32 + 1) as u8;
        let fruit = entry(tier)?;

        let radius = fruit.radius();
        let (left, right) = self.ctx.world().horizontal_bounds();
        let x = if right - left > 2 * radius {
            fixed_clamp(x, left + radius, right - radius)
        } else {
            left + (right - left) / 2
        };

        let handle = self.ctx.spawn(fruit, FixedVec2::new(x, self.config.drop_height))?;
        self.drops += 1;

        if self.state == LoopState::Idle {
            info!("First drop, simulation running");
            self.state = LoopState::Running;
        }
        debug!("Drop #{}: {:?} at x={}", self.drops, fruit, x);

        Ok(handle)
    }

    /// Advance one tick. No-op while idle.
    pub fn tick(&mut self) -> TickResult {
        if self.state == LoopState::Idle {
            return TickResult { tick: self.tick, ..Default::default() };
        }

        self.ctx.world_mut().step();
        let events: Vec<CollisionEvent> = self.ctx.world_mut().drain_collision_events().collect();
        let merges = resolve_merges(&mut self.ctx, events);

        let points: u64 = merges.iter().map(MergeOutcome::points).sum();
        self.score += points;

        if let Err(e) = self.ctx.sync_visuals() {
            error!("Visual sync failed at tick {}: {}", self.tick, e);
        }
        self.ctx.refresh_debug();
        self.tick += 1;

        TickResult {
            tick: self.tick,
            advanced: true,
            merges,
            points,
        }
    }

    /// Run `ticks` ticks, dropping at the x positions scheduled in `drops`
    /// (keyed by the tick before which the drop happens). Returns the
    /// number of merges.
    pub fn play_script(&mut self, drops: &BTreeMap<u32, Fixed>, ticks: u32) -> Result<usize, BoardError> {
        let mut merges = 0;
        for t in 0..ticks {
            if let Some(&x) = drops.get(&t) {
                self.on_pointer_release(x)?;
            }
            merges += self.tick().merges.len();
        }
        Ok(merges)
    }

    /// Clear the board and return to idle with a fresh drop sequence.
    pub fn reset(&mut self, seed: u64) -> Result<(), BoardError> {
        self.ctx.clear()?;
        self.state = LoopState::Idle;
        self.rng = DeterministicRng::new(seed);
        self.config.seed = seed;
        self.tick = 0;
        self.score = 0;
        self.drops = 0;
        Ok(())
    }

    /// Capture the board for synchronization.
    pub fn capture(&self) -> Result<BoardState, BoardError> {
        self.ctx.capture()
    }

    /// Replace the board with a received one and keep running.
    pub fn restore(&mut self, board: &BoardState) -> Result<(), BoardError> {
        self.ctx.restore(board)?;
        self.state = LoopState::Running;
        Ok(())
    }

    /// Hash of tick, score and every piece (handle, tier, pose) in handle
    /// order.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.tick, self.score, |hasher| {
            let world = self.ctx.world();
            for entity in self.ctx.registry().iter() {
                hasher.update_u64(entity.handle.to_raw());
                hasher.update_u8(entity.fruit.index());
                hasher.update_vec2(world.body_translation(entity.body).unwrap_or_default());
                hasher.update_fixed(world.body_rotation(entity.body).unwrap_or_default());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use crate::config::WellConfig;
    use crate::core::fixed::from_int;
    use crate::game::catalog::Fruit;
    use crate::physics::WellWorld;
    use crate::render::HeadlessRenderer;

    type LocalSim = Simulation<WellWorld, HeadlessRenderer>;

    fn sim(seed: u64) -> LocalSim {
        Simulation::new(
            WellWorld::new(&WellConfig::default()),
            HeadlessRenderer::new(),
            SimConfig { seed, ..Default::default() },
        )
    }

    fn script(seed: u64, drops: u32) -> BTreeMap<u32, Fixed> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..drops)
            .map(|i| (i * 45, from_int(rng.gen_range(100..420))))
            .collect()
    }

    #[test]
    fn test_idle_until_first_drop() {
        let mut sim = sim(1);
        let result = sim.tick();

        assert!(!result.advanced);
        assert_eq!(sim.tick_count(), 0);
        assert_eq!(sim.state(), LoopState::Idle);
        assert_eq!(sim.board().world().step_count(), 0);
    }

    #[test]
    fn test_drop_position_clamped() {
        let mut sim = sim(2);
        let handle = sim.on_pointer_release(0).unwrap();

        let fruit = sim.board().registry().lookup(handle).unwrap().fruit;
        assert!(fruit <= Fruit::Persimmon);

        let position = sim.board().position(handle).unwrap();
        assert_eq!(position, FixedVec2::new(from_int(120) + fruit.radius(), from_int(50)));
        assert_eq!(sim.state(), LoopState::Running);

        assert!(sim.tick().advanced);
        assert_eq!(sim.tick_count(), 1);
    }

    #[test]
    fn test_merge_awards_points() {
        let mut sim = sim(3);
        sim.ctx.spawn(Fruit::Cherry, FixedVec2::from_ints(200, 389)).unwrap();
        sim.ctx.spawn(Fruit::Cherry, FixedVec2::from_ints(222, 389)).unwrap();
        sim.state = LoopState::Running;

        let result = sim.tick();

        assert_eq!(result.merges.len(), 1);
        assert_eq!(result.points, Fruit::Strawberry.points());
        assert_eq!(sim.score(), 3);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let drops = script(42, 20);

        let mut first = sim(7);
        first.play_script(&drops, 1200).unwrap();
        let mut second = sim(7);
        second.play_script(&drops, 1200).unwrap();

        assert_eq!(first.compute_hash(), second.compute_hash());
        assert_eq!(first.score(), second.score());
        assert_eq!(first.capture().unwrap(), second.capture().unwrap());

        let mut other_seed = sim(8);
        other_seed.play_script(&drops, 1200).unwrap();
        assert_ne!(first.compute_hash(), other_seed.compute_hash());
    }

    #[test]
    fn test_registry_matches_world_every_tick() {
        let mut sim = sim(11);
        let mut rng = StdRng::seed_from_u64(99);

        for t in 0..900 {
            if t % 30 == 0 {
                sim.on_pointer_release(from_int(rng.gen_range(120..400))).unwrap();
            }
            sim.tick();

            let keys: BTreeSet<_> = sim.board().registry().handles().collect();
            assert_eq!(keys, sim.board().world().live_dynamic_colliders(), "tick {}", t);
            assert_eq!(sim.board().renderer().sprite_count(), keys.len());
        }
    }

    #[test]
    fn test_reset() {
        let mut sim = sim(5);
        sim.play_script(&script(1, 3), 100).unwrap();
        sim.reset(6).unwrap();

        assert_eq!(sim.state(), LoopState::Idle);
        assert_eq!(sim.tick_count(), 0);
        assert_eq!(sim.score(), 0);
        assert!(sim.board().registry().is_empty());
    }

    #[test]
    fn test_corrupt_board_rejected_and_drops_still_work() {
        let mut sim = sim(12);
        let empty = sim.capture().unwrap();

        // Body arena claiming a free slot that does not exist
        let bytes = &empty.physics_snapshot;
        let mut forged = bytes[..32].to_vec();
        forged.extend_from_slice(&1u64.to_le_bytes());
        forged.extend_from_slice(&99u32.to_le_bytes());
        forged.extend_from_slice(&bytes[40..]);
        let board = BoardState { physics_snapshot: forged, ..Default::default() };

        assert!(sim.restore(&board).is_err());
        assert_eq!(sim.state(), LoopState::Idle);

        let handle = sim.on_pointer_release(from_int(200)).unwrap();
        assert!(sim.board().registry().lookup(handle).is_some());
        assert_eq!(sim.board().world().live_dynamic_colliders().len(), 1);
    }

    #[test]
    fn test_restore_starts_running() {
        let mut source = sim(9);
        source.play_script(&script(2, 3), 120).unwrap();
        let board = source.capture().unwrap();

        let mut target = sim(10);
        target.restore(&board).unwrap();
        assert_eq!(target.state(), LoopState::Running);
        assert_eq!(target.capture().unwrap(), board);
    }
}

//! Board Context
//!
//! Owns the physics world, the entity registry and the renderer for one
//! board. Every mutation that touches more than one of them goes through
//! here as a single operation, so a handle is never live in one store and
//! gone from another.

use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::core::fixed::Fixed;
use crate::core::vec2::FixedVec2;
use crate::game::catalog::{CatalogError, Fruit};
use crate::game::registry::{Entity, EntityRegistry, RegistryError};
use crate::physics::{BodyHandle, ColliderHandle, PhysicsBackend, PhysicsError};
use crate::render::Renderer;

/// Board errors.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// Registry invariant violated.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Physics engine error (including malformed snapshots).
    #[error("Physics error: {0}")]
    Physics(#[from] PhysicsError),

    /// Bad tier.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Restored world's pieces differ from the piece table.
    #[error("Snapshot holds {found} pieces, piece table lists {expected}")]
    SnapshotMismatch {
        /// Entries in the piece table.
        expected: usize,
        /// Dynamic colliders in the snapshot.
        found: usize,
    },
}

/// Full board for synchronization: opaque physics snapshot plus the tier
/// of every live piece.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoardState {
    /// Physics world bytes, produced and consumed only by the engine.
    pub physics_snapshot: Vec<u8>,
    /// Tier of every live piece, by collider handle.
    pub piece_table: BTreeMap<ColliderHandle, Fruit>,
}

impl BoardState {
    /// Sum of the merge value of every piece on the board.
    pub fn score(&self) -> u64 {
        self.piece_table.values().map(|fruit| fruit.points()).sum()
    }

    /// Number of pieces.
    pub fn piece_count(&self) -> usize {
        self.piece_table.len()
    }
}

/// World + registry + renderer for one board.
pub struct BoardContext<P: PhysicsBackend, R: Renderer> {
    world: P,
    registry: EntityRegistry,
    renderer: R,
}

impl<P: PhysicsBackend, R: Renderer> BoardContext<P, R> {
    /// Wrap a resolved engine and a renderer. The world should hold no
    /// dynamic bodies yet.
    pub fn new(world: P, renderer: R) -> Self {
        Self {
            world,
            registry: EntityRegistry::new(),
            renderer,
        }
    }

    /// Physics world.
    pub fn world(&self) -> &P {
        &self.world
    }

    /// Physics world, mutably. Only stepping and event draining belong
    /// here; bodies are created and removed through `spawn`/`despawn`.
    pub fn world_mut(&mut self) -> &mut P {
        &mut self.world
    }

    /// Entity registry.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Create a piece: body, collider, proxy and registry entry.
    ///
    /// If registration fails the body and proxy are removed again.
    pub fn spawn(&mut self, fruit: Fruit, position: FixedVec2) -> Result<ColliderHandle, BoardError> {
        let (body, handle) = self.world.create_ball(position, fruit.radius());
        let proxy = self.renderer.create_proxy(fruit, position);

        let entity = Entity { handle, fruit, body, proxy };
        if let Err(e) = self.registry.register(handle, entity) {
            self.renderer.destroy_proxy(proxy);
            if let Err(rollback) = self.world.remove_body(body) {
                error!("Rollback of {:?} failed: {}", body, rollback);
            }
            return Err(e.into());
        }

        debug!("Spawned {:?} as {:?} at {}", fruit, handle, position);
        Ok(handle)
    }

    /// Remove a piece from registry, world and renderer.
    ///
    /// The world removal happens first; if it fails the registry is left
    /// untouched.
    pub fn despawn(&mut self, handle: ColliderHandle) -> Result<Entity, BoardError> {
        let body = self
            .registry
            .lookup(handle)
            .map(|entity| entity.body)
            .ok_or(RegistryError::NotFound(handle))?;

        self.world.remove_body(body)?;
        let entity = self.registry.remove(handle)?;
        self.renderer.destroy_proxy(entity.proxy);
        Ok(entity)
    }

    /// Remove every piece.
    pub fn clear(&mut self) -> Result<(), BoardError> {
        let handles: Vec<ColliderHandle> = self.registry.handles().collect();
        for handle in handles {
            self.despawn(handle)?;
        }
        Ok(())
    }

    /// Current position of a registered piece.
    pub fn position(&self, handle: ColliderHandle) -> Result<FixedVec2, BoardError> {
        let entity = self.registry.lookup(handle).ok_or(RegistryError::NotFound(handle))?;
        Ok(self.world.body_translation(entity.body)?)
    }

    /// Copy every body's pose into its proxy.
    pub fn sync_visuals(&mut self) -> Result<(), BoardError> {
        for entity in self.registry.iter() {
            let position = self.world.body_translation(entity.body)?;
            let rotation = self.world.body_rotation(entity.body)?;
            self.renderer.set_transform(entity.proxy, position, rotation);
        }
        Ok(())
    }

    /// Redraw the debug overlay from the world's geometry.
    pub fn refresh_debug(&mut self) {
        let lines = self.world.debug_lines();
        self.renderer.draw_debug(&lines);
    }

    /// Capture the board for synchronization.
    pub fn capture(&self) -> Result<BoardState, BoardError> {
        Ok(BoardState {
            physics_snapshot: self.world.take_snapshot()?,
            piece_table: self.registry.iter().map(|e| (e.handle, e.fruit)).collect(),
        })
    }

    /// Replace the whole board with `board`.
    ///
    /// The snapshot is decoded and checked against the piece table before
    /// anything is touched; on error the current board is left as it was.
    pub fn restore(&mut self, board: &BoardState) -> Result<(), BoardError> {
        let world = P::from_snapshot(&board.physics_snapshot)?;

        let live = world.live_dynamic_colliders();
        if !live.iter().eq(board.piece_table.keys()) {
            return Err(BoardError::SnapshotMismatch {
                expected: board.piece_table.len(),
                found: live.len(),
            });
        }

        let mut placements: Vec<(ColliderHandle, Fruit, BodyHandle, FixedVec2, Fixed)> =
            Vec::with_capacity(board.piece_table.len());
        for (&handle, &fruit) in &board.piece_table {
            let body = world
                .collider_parent(handle)
                .ok_or(PhysicsError::UnknownCollider(handle))?;
            let position = world.body_translation(body)?;
            let rotation = world.body_rotation(body)?;
            placements.push((handle, fruit, body, position, rotation));
        }

        for entity in self.registry.iter() {
            self.renderer.destroy_proxy(entity.proxy);
        }
        self.registry.clear();
        self.world = world;

        for (handle, fruit, body, position, rotation) in placements {
            let proxy = self.renderer.create_proxy(fruit, position);
            self.renderer.set_transform(proxy, position, rotation);
            self.registry.register(handle, Entity { handle, fruit, body, proxy })?;
        }

        debug!("Restored board with {} pieces", self.registry.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use crate::config::WellConfig;
    use crate::core::fixed::from_int;
    use crate::physics::{CollisionEvent, DebugLine, WellWorld};
    use crate::render::HeadlessRenderer;

    fn board() -> BoardContext<WellWorld, HeadlessRenderer> {
        BoardContext::new(WellWorld::new(&WellConfig::default()), HeadlessRenderer::new())
    }

    #[test]
    fn test_spawn_and_despawn_keep_stores_coherent() {
        let mut ctx = board();
        let a = ctx.spawn(Fruit::Cherry, FixedVec2::from_ints(200, 100)).unwrap();
        let b = ctx.spawn(Fruit::Grape, FixedVec2::from_ints(300, 100)).unwrap();

        assert_eq!(ctx.registry().len(), 2);
        assert_eq!(ctx.renderer().sprite_count(), 2);
        assert_eq!(ctx.world().live_dynamic_colliders(), BTreeSet::from([a, b]));

        let removed = ctx.despawn(a).unwrap();
        assert_eq!(removed.fruit, Fruit::Cherry);
        assert_eq!(ctx.world().live_dynamic_colliders(), BTreeSet::from([b]));
        assert_eq!(ctx.renderer().sprite_count(), 1);
        assert!(ctx.renderer().sprite(removed.proxy).is_none());
    }

    #[test]
    fn test_despawn_unknown_handle() {
        let mut ctx = board();
        let a = ctx.spawn(Fruit::Cherry, FixedVec2::from_ints(200, 100)).unwrap();
        ctx.despawn(a).unwrap();

        assert!(matches!(
            ctx.despawn(a),
            Err(BoardError::Registry(RegistryError::NotFound(_)))
        ));
    }

    #[test]
    fn test_capture_restore_into_fresh_board() {
        let mut source = board();
        source.spawn(Fruit::Cherry, FixedVec2::from_ints(200, 300)).unwrap();
        source.spawn(Fruit::Orange, FixedVec2::from_ints(260, 200)).unwrap();
        for _ in 0..30 {
            source.world_mut().step();
        }
        let state = source.capture().unwrap();
        assert_eq!(state.piece_count(), 2);

        let mut target = board();
        target.spawn(Fruit::Watermelon, FixedVec2::from_ints(250, 100)).unwrap();
        target.restore(&state).unwrap();

        assert_eq!(target.capture().unwrap(), state);
        assert_eq!(target.renderer().sprite_count(), 2);
        for handle in state.piece_table.keys() {
            assert_eq!(target.position(*handle).unwrap(), source.position(*handle).unwrap());
        }
    }

    #[test]
    fn test_restore_rejects_mismatched_table() {
        let mut source = board();
        let a = source.spawn(Fruit::Cherry, FixedVec2::from_ints(200, 300)).unwrap();
        let mut state = source.capture().unwrap();
        state.piece_table.remove(&a);
        state.piece_table.insert(ColliderHandle::from_raw(99), Fruit::Cherry);

        let mut target = board();
        let kept = target.spawn(Fruit::Apple, FixedVec2::from_ints(250, 100)).unwrap();

        assert!(matches!(
            target.restore(&state),
            Err(BoardError::SnapshotMismatch { expected: 1, found: 1 })
        ));
        assert_eq!(target.registry().lookup(kept).unwrap().fruit, Fruit::Apple);
        assert_eq!(target.renderer().sprite_count(), 1);
    }

    #[test]
    fn test_restore_rejects_corrupt_snapshot() {
        let mut target = board();
        target.spawn(Fruit::Apple, FixedVec2::from_ints(250, 100)).unwrap();

        let state = BoardState {
            physics_snapshot: vec![0xFF; 7],
            piece_table: BTreeMap::new(),
        };
        assert!(matches!(target.restore(&state), Err(BoardError::Physics(_))));
        assert_eq!(target.registry().len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut ctx = board();
        for x in [150, 200, 250] {
            ctx.spawn(Fruit::Cherry, FixedVec2::from_ints(x, 100)).unwrap();
        }
        ctx.clear().unwrap();

        assert!(ctx.registry().is_empty());
        assert!(ctx.world().live_dynamic_colliders().is_empty());
        assert_eq!(ctx.renderer().sprite_count(), 0);
    }

    #[test]
    fn test_sync_visuals_follows_bodies() {
        let mut ctx = board();
        let a = ctx.spawn(Fruit::Grape, FixedVec2::from_ints(200, 100)).unwrap();
        for _ in 0..20 {
            ctx.world_mut().step();
        }
        ctx.sync_visuals().unwrap();
        ctx.refresh_debug();

        let proxy = ctx.registry().lookup(a).unwrap().proxy;
        let position = ctx.position(a).unwrap();
        assert_eq!(ctx.renderer().sprite(proxy).unwrap().position, position.to_floats());
        assert_eq!(ctx.renderer().debug_lines().len(), 12 + 9);
    }

    #[test]
    fn test_board_score() {
        let mut state = BoardState::default();
        state.piece_table.insert(ColliderHandle::from_raw(3), Fruit::Cherry);
        state.piece_table.insert(ColliderHandle::from_raw(4), Fruit::Grape);
        assert_eq!(state.score(), 1 + 6);
    }

    /// World that hands out the same collider handle for every ball.
    struct AliasingWorld {
        inner: WellWorld,
        alias: Option<ColliderHandle>,
        removed: Vec<BodyHandle>,
    }

    impl PhysicsBackend for AliasingWorld {
        fn create_ball(&mut self, position: FixedVec2, radius: Fixed) -> (BodyHandle, ColliderHandle) {
            let (body, collider) = self.inner.create_ball(position, radius);
            (body, *self.alias.get_or_insert(collider))
        }
        fn remove_body(&mut self, body: BodyHandle) -> Result<(), PhysicsError> {
            self.removed.push(body);
            self.inner.remove_body(body)
        }
        fn body_translation(&self, body: BodyHandle) -> Result<FixedVec2, PhysicsError> {
            self.inner.body_translation(body)
        }
        fn body_rotation(&self, body: BodyHandle) -> Result<Fixed, PhysicsError> {
            self.inner.body_rotation(body)
        }
        fn collider_parent(&self, collider: ColliderHandle) -> Option<BodyHandle> {
            self.inner.collider_parent(collider)
        }
        fn live_dynamic_colliders(&self) -> BTreeSet<ColliderHandle> {
            self.inner.live_dynamic_colliders()
        }
        fn horizontal_bounds(&self) -> (Fixed, Fixed) {
            self.inner.horizontal_bounds()
        }
        fn step(&mut self) {
            self.inner.step()
        }
        fn drain_collision_events(&mut self) -> std::vec::Drain<'_, CollisionEvent> {
            self.inner.drain_collision_events()
        }
        fn debug_lines(&self) -> Vec<DebugLine> {
            self.inner.debug_lines()
        }
        fn take_snapshot(&self) -> Result<Vec<u8>, PhysicsError> {
            self.inner.take_snapshot()
        }
        fn from_snapshot(bytes: &[u8]) -> Result<Self, PhysicsError> {
            Ok(Self { inner: WellWorld::from_snapshot(bytes)?, alias: None, removed: Vec::new() })
        }
    }

    #[test]
    fn test_spawn_rolls_back_on_duplicate_handle() {
        let world = AliasingWorld {
            inner: WellWorld::new(&WellConfig::default()),
            alias: None,
            removed: Vec::new(),
        };
        let mut ctx = BoardContext::new(world, HeadlessRenderer::new());

        ctx.spawn(Fruit::Cherry, FixedVec2::from_ints(200, 100)).unwrap();
        let err = ctx.spawn(Fruit::Grape, FixedVec2::new(from_int(300), from_int(100)));

        assert!(matches!(err, Err(BoardError::Registry(RegistryError::DuplicateHandle(_)))));
        assert_eq!(ctx.registry().len(), 1);
        assert_eq!(ctx.renderer().sprite_count(), 1);
        assert_eq!(ctx.world().removed.len(), 1);
        assert_eq!(ctx.world().inner.body_count(), 1);
    }
}

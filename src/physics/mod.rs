//! Physics Collaborator
//!
//! The board logic talks to the rigid-body engine only through
//! [`PhysicsBackend`]. [`WellWorld`] is the built-in deterministic engine:
//! a rectangular well (floor + two walls) that balls fall into.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  init_engine()  ──►  WellWorld  (resolved once, async)    │
//! │                                                           │
//! │  per step:                                                │
//! │    integrate ─► solve contacts ─► clamp to well ─► roll   │
//! │        └─► diff contact pairs ─► CollisionEvent queue     │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod arena;
pub mod contact;
pub mod world;

use std::collections::BTreeSet;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::config::WellConfig;
use crate::core::fixed::Fixed;
use crate::core::vec2::FixedVec2;
use arena::Index;

pub use world::WellWorld;

/// Handle to a rigid body.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyHandle(pub Index);

/// Handle to a collider. This is the join key between physics and the
/// entity registry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColliderHandle(pub Index);

impl ColliderHandle {
    /// Packed integer form (see [`Index::to_raw`]).
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0.to_raw()
    }

    /// Rebuild from the packed integer form.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(Index::from_raw(raw))
    }
}

impl fmt::Debug for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Body({}v{})", self.0.index, self.0.generation)
    }
}

impl fmt::Debug for ColliderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Collider({}v{})", self.0.index, self.0.generation)
    }
}

impl fmt::Display for ColliderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_raw())
    }
}

/// Begin or end of contact between two colliders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollisionEvent {
    /// First collider.
    pub collider_a: ColliderHandle,
    /// Second collider.
    pub collider_b: ColliderHandle,
    /// `true` on the first step of contact, `false` when contact ends.
    pub started: bool,
}

/// Line segment of the debug overlay, in render units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DebugLine {
    /// Segment start.
    pub start: (f32, f32),
    /// Segment end.
    pub end: (f32, f32),
}

/// Physics errors.
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    /// Snapshot could not be produced or parsed.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),

    /// No live body with this handle.
    #[error("Unknown body {0:?}")]
    UnknownBody(BodyHandle),

    /// No live collider with this handle.
    #[error("Unknown collider {0:?}")]
    UnknownCollider(ColliderHandle),

    /// Well geometry cannot hold a ball.
    #[error("Invalid well configuration: {0}")]
    InvalidConfig(String),

    /// Engine initialization task failed.
    #[error("Engine initialization failed: {0}")]
    Init(#[from] tokio::task::JoinError),
}

/// Rigid-body engine as seen by the board.
pub trait PhysicsBackend: Sized {
    /// Create a dynamic body at `position` with a ball collider.
    fn create_ball(&mut self, position: FixedVec2, radius: Fixed) -> (BodyHandle, ColliderHandle);

    /// Remove a body and every collider attached to it.
    fn remove_body(&mut self, body: BodyHandle) -> Result<(), PhysicsError>;

    /// Current position of a body.
    fn body_translation(&self, body: BodyHandle) -> Result<FixedVec2, PhysicsError>;

    /// Current rotation of a body (radians, Q16.16).
    fn body_rotation(&self, body: BodyHandle) -> Result<Fixed, PhysicsError>;

    /// Body a collider is attached to; `None` for static colliders.
    fn collider_parent(&self, collider: ColliderHandle) -> Option<BodyHandle>;

    /// Every collider attached to a dynamic body.
    fn live_dynamic_colliders(&self) -> BTreeSet<ColliderHandle>;

    /// Horizontal extent a ball may be dropped into.
    fn horizontal_bounds(&self) -> (Fixed, Fixed);

    /// Advance by one fixed step, queueing collision events.
    fn step(&mut self);

    /// Events queued since the last drain, in order.
    fn drain_collision_events(&mut self) -> std::vec::Drain<'_, CollisionEvent>;

    /// Outline of every collider.
    fn debug_lines(&self) -> Vec<DebugLine>;

    /// Serialize the whole world.
    fn take_snapshot(&self) -> Result<Vec<u8>, PhysicsError>;

    /// Rebuild a world from [`PhysicsBackend::take_snapshot`] output.
    fn from_snapshot(bytes: &[u8]) -> Result<Self, PhysicsError>;
}

/// Resolve the physics engine.
///
/// World construction runs on the blocking pool once; callers await it
/// before the first tick.
pub async fn init_engine(config: &WellConfig) -> Result<WellWorld, PhysicsError> {
    let (left, right) = config.interior_x();
    if right <= left || config.height <= 0 || config.wall_thickness <= 0 {
        return Err(PhysicsError::InvalidConfig(format!(
            "interior {}..{} height {}",
            left, right, config.height
        )));
    }

    let config = config.clone();
    let world = tokio::task::spawn_blocking(move || WellWorld::new(&config)).await?;
    tracing::info!("Physics engine ready ({} static colliders)", world.static_collider_count());
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::from_int;

    #[tokio::test]
    async fn test_init_engine() {
        let world = init_engine(&WellConfig::default()).await.unwrap();
        assert_eq!(world.static_collider_count(), 3);
        assert!(world.live_dynamic_colliders().is_empty());
    }

    #[tokio::test]
    async fn test_init_engine_rejects_degenerate_well() {
        let config = WellConfig {
            width: from_int(30),
            ..Default::default()
        };
        let result = init_engine(&config).await;
        assert!(matches!(result, Err(PhysicsError::InvalidConfig(_))));
    }

    #[test]
    fn test_collider_handle_raw() {
        let handle = ColliderHandle::from_raw(5);
        assert_eq!(handle.to_raw(), 5);
        assert_eq!(format!("{:?}", handle), "Collider(5v0)");
    }
}

//! Merge Resolution
//!
//! Turns one step's collision events into merges. Two touching pieces of
//! the same tier are replaced by one piece of the next tier at their
//! midpoint.
//!
//! Events are processed strictly in arrival order. When one piece touches
//! several partners in the same step, the first event that still finds
//! both pieces registered wins; later events naming a consumed piece fall
//! through the lookup and are ignored.

use tracing::{debug, error};
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::core::vec2::FixedVec2;
use crate::game::board::{BoardContext, BoardError};
use crate::game::catalog::Fruit;
use crate::game::registry::Entity;
use crate::physics::{ColliderHandle, CollisionEvent, PhysicsBackend};
use crate::render::Renderer;

/// One performed merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The two consumed pieces, in event order.
    pub consumed: (ColliderHandle, ColliderHandle),
    /// Tier of the consumed pieces.
    pub from: Fruit,
    /// Tier of the new piece.
    pub into: Fruit,
    /// Handle of the new piece.
    pub handle: ColliderHandle,
    /// Where the new piece was placed.
    pub position: FixedVec2,
}

impl MergeOutcome {
    /// Points awarded for this merge.
    pub fn points(&self) -> u64 {
        self.into.points()
    }
}

/// Apply every merge implied by `events`.
///
/// Missing handles, tier mismatches and terminal tiers are ordinary
/// no-ops. A failure while applying a merge is a board invariant violation:
/// the pair is put back, the failure logged and the event skipped.
pub fn resolve_merges<P, R, I>(ctx: &mut BoardContext<P, R>, events: I) -> Vec<MergeOutcome>
where
    P: PhysicsBackend,
    R: Renderer,
    I: IntoIterator<Item = CollisionEvent>,
{
    let mut outcomes = Vec::new();

    for event in events {
        #[cfg(feature = "debug-tracing")]
        trace!(
            "collision {:?} {:?} started={}",
            event.collider_a, event.collider_b, event.started
        );

        if !event.started || event.collider_a == event.collider_b {
            continue;
        }

        let (a, b) = match (
            ctx.registry().lookup(event.collider_a),
            ctx.registry().lookup(event.collider_b),
        ) {
            (Some(a), Some(b)) => (a.clone(), b.clone()),
            _ => continue,
        };

        if a.fruit != b.fruit {
            continue;
        }

        let Some(into) = a.fruit.next() else { continue };

        match merge_pair(ctx, &a, &b, into) {
            Ok(outcome) => {
                debug!(
                    "Merged {:?}+{:?} ({:?}) into {:?} ({:?}) at {}",
                    a.handle, b.handle, a.fruit, outcome.handle, into, outcome.position
                );
                outcomes.push(outcome);
            }
            Err(e) => {
                error!("Merge of {:?} and {:?} failed: {}", a.handle, b.handle, e);
            }
        }
    }

    outcomes
}

fn merge_pair<P: PhysicsBackend, R: Renderer>(
    ctx: &mut BoardContext<P, R>,
    a: &Entity,
    b: &Entity,
    into: Fruit,
) -> Result<MergeOutcome, BoardError> {
    // Read both positions before mutating anything
    let pos_a = ctx.position(a.handle)?;
    let pos_b = ctx.position(b.handle)?;
    let midpoint = pos_a.midpoint(pos_b);

    ctx.despawn(a.handle)?;
    if let Err(e) = ctx.despawn(b.handle) {
        restore(ctx, &[(a.fruit, pos_a)]);
        return Err(e);
    }
    let handle = match ctx.spawn(into, midpoint) {
        Ok(handle) => handle,
        Err(e) => {
            restore(ctx, &[(a.fruit, pos_a), (b.fruit, pos_b)]);
            return Err(e);
        }
    };

    Ok(MergeOutcome {
        consumed: (a.handle, b.handle),
        from: a.fruit,
        into,
        handle,
        position: midpoint,
    })
}

/// Put consumed pieces back where they were. The pieces get fresh handles.
fn restore<P: PhysicsBackend, R: Renderer>(ctx: &mut BoardContext<P, R>, pieces: &[(Fruit, FixedVec2)]) {
    for &(fruit, position) in pieces {
        if let Err(e) = ctx.spawn(fruit, position) {
            error!("Could not put back {:?} at {}: {}", fruit, position, e);
        }
    }
}

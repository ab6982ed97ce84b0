//! Game Logic Module
//!
//! Board rules on top of the physics and render collaborators. 100%
//! deterministic.
//!
//! ## Module Structure
//!
//! - `catalog`: Fruit tiers, radii, successor lookup
//! - `registry`: Collider handle to entity map
//! - `board`: Board context, atomic spawn/despawn, capture/restore
//! - `merge`: Collision events to merges
//! - `simulation`: Local per-frame loop and scoring

pub mod catalog;
pub mod registry;
pub mod board;
pub mod merge;
pub mod simulation;

// Re-export key types
pub use catalog::{Fruit, CatalogError};
pub use registry::{Entity, EntityRegistry, RegistryError};
pub use board::{BoardContext, BoardState, BoardError};
pub use merge::{resolve_merges, MergeOutcome};
pub use simulation::{Simulation, LoopState, TickResult};

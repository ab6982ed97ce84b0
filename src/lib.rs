//! # Suika Arena
//!
//! Deterministic fruit-merge board, binary board-sync protocol and a
//! two-player lobby server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SUIKA ARENA                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Q16.16 fixed-point arithmetic             │
//! │  ├── vec2.rs     - 2D vector with fixed-point                │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - Board hashing for verification            │
//! │                                                              │
//! │  physics/        - Physics collaborator                      │
//! │  ├── arena.rs    - Generational handle arena                 │
//! │  ├── contact.rs  - Circle/box contact tests                  │
//! │  └── world.rs    - Deterministic well world                  │
//! │                                                              │
//! │  render/         - Renderer collaborator (headless)          │
//! │                                                              │
//! │  game/           - Board logic (deterministic)               │
//! │  ├── catalog.rs  - Fruit tiers                               │
//! │  ├── registry.rs - Handle to entity map                      │
//! │  ├── board.rs    - Board context and snapshots               │
//! │  ├── merge.rs    - Merge resolution                          │
//! │  └── simulation.rs - Local loop                              │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── codec.rs    - Binary wire format                        │
//! │  ├── lobby.rs    - Lobby management                          │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── transport.rs- WebSocket client                          │
//! │  ├── sync.rs     - Client session state machine              │
//! │  └── bot.rs      - Headless bot player                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/`, `physics/` and `game/` modules are **100% deterministic**:
//! - No floating-point arithmetic in board logic
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from seeded Xorshift128+
//!
//! The same drops at the same ticks produce the same board hash on any
//! platform.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod config;
pub mod physics;
pub mod render;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use core::vec2::FixedVec2;
pub use core::rng::DeterministicRng;
pub use config::{ServerConfig, LobbyConfig, WellConfig, SimConfig};
pub use game::{Fruit, BoardState, Simulation};
pub use physics::{PhysicsBackend, WellWorld, ColliderHandle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;

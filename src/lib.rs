//! # Coinfight Simulation Core
//!
//! Deterministic lockstep simulation for Coinfight, a real-time strategy game
//! played with a conserved currency.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    COINFIGHT SIM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── codec.rs    - Big-endian wire codec                     │
//! │  ├── coins.rs    - Conserved currency ledger                 │
//! │  ├── vec2.rs     - 2D f32 vector                             │
//! │  └── hash.rs     - State hashing for desync detection        │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── entity.rs   - Entity table records and type tags        │
//! │  ├── world.rs    - Game state, genesis, death, snapshots     │
//! │  ├── command.rs  - Player commands and validation            │
//! │  ├── tick.rs     - Frame loop and replay                     │
//! │  ├── prime.rs    - Worker unit: gold transfer, building      │
//! │  ├── fighter.rs  - Combat unit                               │
//! │  ├── gateway.rs  - Unit factory                              │
//! │  └── view.rs     - Serializable presentation view            │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── protocol.rs - Frame packets and node messages           │
//! │  ├── transport.rs- Length-prefixed async framing             │
//! │  └── session.rs  - Authority / replica lockstep              │
//! │                                                              │
//! │  config.rs       - Node configuration                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! Given the same starting snapshot and the same sequence of frame packets,
//! every participant reaches a byte-identical world:
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - No randomness
//! - Fixed iteration order: commands in packet order, entities in table order
//!
//! Coins are never created or destroyed outside genesis: the sum over every
//! pile, unit, held balance and player credit is constant.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::NodeConfig;
pub use core::coins::{Coins, CoinsInt};
pub use core::vec2::Vec2;
pub use game::{BalanceUpdate, Command, Game, GameError, PlayerCommand, PlayerId, TickResult};
pub use network::{Authority, FramePacket, Replica};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Game Logic Module
//!
//! All simulation code. Deterministic given the same frame packets.
//!
//! ## Module Structure
//!
//! - `entity`: Entity record, type tag registry, wire dispatch
//! - `unit`: Unit, Building and MobileUnit layers, movement
//! - `gold_pile`, `prime`, `fighter`, `gateway`: concrete kinds
//! - `target`: Point or entity targets
//! - `player`: Roster entries, free credit, external balance updates
//! - `world`: The `Game` table, genesis, death, snapshots
//! - `command`: Player commands, validation, rejections
//! - `tick`: The frame loop and replay
//! - `events`: Events emitted per frame
//! - `view`: Serializable presentation view
//! - `rules`: Per-kind constants

pub mod command;
pub mod entity;
pub mod events;
pub mod fighter;
pub mod gateway;
pub mod gold_pile;
pub mod player;
pub mod prime;
pub mod rules;
pub mod target;
pub mod tick;
pub mod unit;
pub mod view;
pub mod world;

// Re-export key types
pub use command::{Command, CommandError, CommandKind, CommandRejection, PlayerCommand};
pub use entity::{Entity, EntityKind, EntityRef, TypeTag};
pub use events::{GameEvent, GameEventData};
pub use player::{BalanceRejection, BalanceUpdate, Player, PlayerId};
pub use target::Target;
pub use tick::{replay_frames, TickResult};
pub use view::{Alliance, EntityView, WorldView};
pub use world::{Game, GameError};

//! Core deterministic primitives.
//!
//! Everything the simulation builds on: the wire codec, the vector type,
//! the currency ledger and state hashing. Nothing in here knows about
//! entities or players.

pub mod codec;
pub mod coins;
pub mod hash;
pub mod vec2;

// Re-export core types
pub use codec::{CodecError, Packer, Unpacker, prepend_size};
pub use coins::{Coins, CoinsInt, LedgerError};
pub use hash::{StateHash, compute_state_hash};
pub use vec2::Vec2;

//! Network Layer
//!
//! Frame packets, length-prefixed transport and lockstep sessions.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod protocol;
pub mod session;
pub mod transport;

pub use protocol::{FramePacket, NodeMessage};
pub use session::{run_replica, Authority, Replica, SessionError};
pub use transport::{read_message, write_message, TransportError, DEFAULT_MAX_MESSAGE_BYTES};

//! Protocol Messages
//!
//! Frame packets and the messages an authority sends its replicas.
//!
//! ## Frame Packet
//!
//! ```text
//! u64 frame
//! u32 balance update count | (address slot | u32 amount | u8 is_deposit)*
//! u32 command count        | (u16 player | u8 kind | payload)*
//! ```
//!
//! A packet is decoded in full, trailing-bytes check included, before any of
//! it touches the world. Balance updates apply before commands.
//!
//! ## Node Messages
//!
//! Every message on the wire is one length-prefixed body starting with a
//! one-byte kind:
//!
//! ```text
//! 1 Snapshot    packed world (late join)
//! 2 Frame       frame packet
//! 3 Checkpoint  u64 frame | 32-byte state hash
//! ```

use crate::core::codec::{CodecError, Packer, Unpacker};
use crate::core::hash::{hash_with_domain, StateHash, FRAME_PACKET_DOMAIN};
use crate::game::command::PlayerCommand;
use crate::game::player::BalanceUpdate;
use crate::game::tick::TickResult;
use crate::game::world::{Game, GameError};

// =============================================================================
// FRAME PACKET
// =============================================================================

/// Every input for one frame, in application order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FramePacket {
    /// Frame the packet applies to
    pub frame: u64,
    /// External deposits and withdrawals, in order
    pub balance_updates: Vec<BalanceUpdate>,
    /// Commands, in order
    pub commands: Vec<PlayerCommand>,
}

impl FramePacket {
    /// A packet for `frame` with no balance updates.
    pub fn new(frame: u64, commands: Vec<PlayerCommand>) -> Self {
        Self {
            frame,
            balance_updates: Vec::new(),
            commands,
        }
    }

    /// Attach balance updates.
    pub fn with_balance_updates(mut self, balance_updates: Vec<BalanceUpdate>) -> Self {
        self.balance_updates = balance_updates;
        self
    }

    /// Encode into an existing buffer.
    pub fn pack_into(&self, p: &mut Packer) -> Result<(), CodecError> {
        p.put_u64(self.frame);
        p.put_u32(count_u32(self.balance_updates.len())?);
        for update in &self.balance_updates {
            update.pack(p)?;
        }
        p.put_u32(count_u32(self.commands.len())?);
        for cmd in &self.commands {
            cmd.pack(p);
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn pack(&self) -> Result<Vec<u8>, CodecError> {
        let mut p = Packer::new();
        self.pack_into(&mut p)?;
        Ok(p.into_bytes())
    }

    /// Decode from a cursor.
    pub fn unpack_from(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        let frame = u.get_u64()?;
        let count = u.get_count()?;
        let mut balance_updates = Vec::with_capacity(count.min(u.remaining()));
        for _ in 0..count {
            balance_updates.push(BalanceUpdate::unpack(u)?);
        }
        let count = u.get_count()?;
        let mut commands = Vec::with_capacity(count.min(u.remaining()));
        for _ in 0..count {
            commands.push(PlayerCommand::unpack(u)?);
        }
        Ok(Self {
            frame,
            balance_updates,
            commands,
        })
    }

    /// Decode a packet that must fill `bytes` exactly.
    pub fn unpack(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut u = Unpacker::new(bytes);
        let packet = Self::unpack_from(&mut u)?;
        u.finish()?;
        Ok(packet)
    }

    /// Digest of the encoded packet.
    pub fn hash(&self) -> Result<StateHash, CodecError> {
        Ok(hash_with_domain(FRAME_PACKET_DOMAIN, &self.pack()?))
    }
}

impl Game {
    /// Apply a frame packet: its balance updates, its commands, then one
    /// frame of simulation.
    ///
    /// The packet must be for the world's current frame.
    pub fn apply_frame(&mut self, packet: &FramePacket) -> Result<TickResult, GameError> {
        if packet.frame != self.frame {
            return Err(GameError::FrameMismatch {
                expected: self.frame,
                got: packet.frame,
            });
        }
        self.apply_balance_updates(&packet.balance_updates);
        self.step(&packet.commands)
    }

    /// Decode and apply one encoded frame packet.
    pub fn apply_frame_bytes(&mut self, bytes: &[u8]) -> Result<TickResult, GameError> {
        let packet = FramePacket::unpack(bytes)?;
        self.apply_frame(&packet)
    }
}

fn count_u32(n: usize) -> Result<u32, CodecError> {
    u32::try_from(n).map_err(|_| CodecError::CountTooLarge(n as u64))
}

// =============================================================================
// NODE MESSAGES
// =============================================================================

const MSG_SNAPSHOT: u8 = 1;
const MSG_FRAME: u8 = 2;
const MSG_CHECKPOINT: u8 = 3;

/// One message from an authority to a replica.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeMessage {
    /// Packed world to start from
    Snapshot(Vec<u8>),
    /// Next frame's commands
    Frame(FramePacket),
    /// State hash after `frame`, for desync detection
    Checkpoint {
        /// Frame the hash was taken at
        frame: u64,
        /// Hash of the packed world
        hash: StateHash,
    },
}

impl NodeMessage {
    /// Encode kind and body.
    pub fn pack(&self) -> Result<Vec<u8>, CodecError> {
        let mut p = Packer::new();
        match self {
            NodeMessage::Snapshot(bytes) => {
                p.put_tag(MSG_SNAPSHOT);
                let mut body = p.into_bytes();
                body.extend_from_slice(bytes);
                return Ok(body);
            }
            NodeMessage::Frame(packet) => {
                p.put_tag(MSG_FRAME);
                packet.pack_into(&mut p)?;
            }
            NodeMessage::Checkpoint { frame, hash } => {
                p.put_tag(MSG_CHECKPOINT);
                p.put_u64(*frame);
                for b in hash {
                    p.put_u8(*b);
                }
            }
        }
        Ok(p.into_bytes())
    }

    /// Decode one message body.
    pub fn unpack(bytes: &[u8]) -> Result<Self, CodecError> {
        let Some((&kind, body)) = bytes.split_first() else {
            return Err(CodecError::UnexpectedEof {
                needed: 1,
                remaining: 0,
            });
        };
        match kind {
            MSG_SNAPSHOT => Ok(NodeMessage::Snapshot(body.to_vec())),
            MSG_FRAME => Ok(NodeMessage::Frame(FramePacket::unpack(body)?)),
            MSG_CHECKPOINT => {
                let mut u = Unpacker::new(body);
                let frame = u.get_u64()?;
                let mut hash = [0u8; 32];
                for b in &mut hash {
                    *b = u.get_u8()?;
                }
                u.finish()?;
                Ok(NodeMessage::Checkpoint { frame, hash })
            }
            other => Err(CodecError::InvalidEnum {
                field: "message kind",
                value: other,
            }),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! Lockstep Sessions
//!
//! An [`Authority`] owns the reference world. It batches submitted commands
//! and external balance updates into one frame packet per frame, applies the packet locally and ships it
//! to replicas. A [`Replica`] starts from a snapshot and applies the same
//! packets in order; periodic checkpoints carry the authority's state hash so
//! a diverged replica stops instead of drifting.
//!
//! ```text
//! Authority                               Replica
//!   submit()* ─┐
//!   serve_frame() ── Frame(packet) ─────►  apply_frame
//!              └──── Checkpoint(hash) ──►  compare, stop on mismatch
//! ```
//!
//! Any error tears the session down. There is no resynchronisation.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument, warn};

use crate::core::codec::CodecError;
use crate::core::hash::StateHash;
use crate::game::command::{Command, PlayerCommand};
use crate::game::player::{BalanceUpdate, PlayerId};
use crate::game::tick::TickResult;
use crate::game::world::{Game, GameError};
use crate::network::protocol::{FramePacket, NodeMessage};
use crate::network::transport::{read_message, write_message, TransportError};

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connection failed
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// Malformed message
    #[error("protocol: {0}")]
    Codec(#[from] CodecError),

    /// Simulation failed
    #[error("game: {0}")]
    Game(#[from] GameError),

    /// A frame arrived before any snapshot
    #[error("frame {0} received before a snapshot")]
    NoSnapshot(u64),

    /// Replica state differs from the authority's
    #[error("desync at frame {frame}: expected {expected}, got {actual}")]
    Desync {
        /// Frame of the checkpoint
        frame: u64,
        /// Authority hash, hex
        expected: String,
        /// Local hash, hex
        actual: String,
    },
}

// =============================================================================
// AUTHORITY
// =============================================================================

/// Owner of the reference world.
pub struct Authority {
    game: Game,
    pending: Vec<PlayerCommand>,
    pending_balance_updates: Vec<BalanceUpdate>,
    checkpoint_interval: u64,
}

impl Authority {
    /// Wrap a world. A checkpoint follows every `checkpoint_interval`
    /// frames; 0 disables them.
    pub fn new(game: Game, checkpoint_interval: u64) -> Self {
        Self {
            game,
            pending: Vec::new(),
            pending_balance_updates: Vec::new(),
            checkpoint_interval,
        }
    }

    /// The reference world.
    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Queue a command for the next frame.
    pub fn submit(&mut self, player: PlayerId, command: Command) {
        self.pending.push(PlayerCommand::new(player, command));
    }

    /// Queue an external deposit or withdrawal for the next frame.
    pub fn submit_balance_update(&mut self, update: BalanceUpdate) {
        self.pending_balance_updates.push(update);
    }

    /// Snapshot message for a late joiner.
    pub fn snapshot(&self) -> Result<NodeMessage, CodecError> {
        Ok(NodeMessage::Snapshot(self.game.pack()?))
    }

    /// Seal the queued commands into the next frame packet and apply it.
    pub fn advance(&mut self) -> Result<(FramePacket, TickResult), GameError> {
        let packet = FramePacket::new(self.game.frame, std::mem::take(&mut self.pending))
            .with_balance_updates(std::mem::take(&mut self.pending_balance_updates));
        let result = self.game.apply_frame(&packet)?;
        Ok((packet, result))
    }

    fn checkpoint_due(&self) -> bool {
        self.checkpoint_interval > 0 && self.game.frame % self.checkpoint_interval == 0
    }

    /// Send the current world to a replica.
    #[instrument(skip_all, fields(frame = self.game.frame))]
    pub async fn send_snapshot<W>(&self, writer: &mut W) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        let body = self.snapshot()?.pack()?;
        info!(bytes = body.len(), "sending snapshot");
        write_message(writer, &body).await?;
        Ok(())
    }

    /// Advance one frame and ship its packet, plus a checkpoint when due.
    pub async fn serve_frame<W>(&mut self, writer: &mut W) -> Result<TickResult, SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        let (packet, result) = self.advance()?;
        write_message(writer, &NodeMessage::Frame(packet).pack()?).await?;
        if self.checkpoint_due() {
            let hash = self.game.compute_hash()?;
            debug!(frame = self.game.frame, hash = %hex::encode(hash), "checkpoint");
            let msg = NodeMessage::Checkpoint {
                frame: self.game.frame,
                hash,
            };
            write_message(writer, &msg.pack()?).await?;
        }
        Ok(result)
    }
}

// =============================================================================
// REPLICA
// =============================================================================

/// Follower that mirrors the authority's world.
#[derive(Default)]
pub struct Replica {
    game: Option<Game>,
    checkpoints_verified: u64,
}

impl Replica {
    /// A replica waiting for its snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The mirrored world, once a snapshot has arrived.
    pub fn game(&self) -> Option<&Game> {
        self.game.as_ref()
    }

    /// Consume the replica, returning its world.
    pub fn into_game(self) -> Option<Game> {
        self.game
    }

    /// Number of checkpoints that matched.
    pub fn checkpoints_verified(&self) -> u64 {
        self.checkpoints_verified
    }

    /// Handle one message. Returns the frame result for frame packets.
    pub fn handle(&mut self, msg: NodeMessage) -> Result<Option<TickResult>, SessionError> {
        match msg {
            NodeMessage::Snapshot(bytes) => {
                let game = Game::unpack(&bytes)?;
                info!(frame = game.frame, entities = game.entity_count(), "joined from snapshot");
                self.game = Some(game);
                Ok(None)
            }
            NodeMessage::Frame(packet) => {
                let game = self.game.as_mut().ok_or(SessionError::NoSnapshot(packet.frame))?;
                Ok(Some(game.apply_frame(&packet)?))
            }
            NodeMessage::Checkpoint { frame, hash } => {
                let game = self.game.as_ref().ok_or(SessionError::NoSnapshot(frame))?;
                verify_checkpoint(game, frame, hash)?;
                self.checkpoints_verified += 1;
                Ok(None)
            }
        }
    }
}

fn verify_checkpoint(game: &Game, frame: u64, expected: StateHash) -> Result<(), SessionError> {
    let actual = game.compute_hash()?;
    if game.frame != frame || actual != expected {
        warn!(frame, local_frame = game.frame, "checkpoint mismatch");
        return Err(SessionError::Desync {
            frame,
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        });
    }
    Ok(())
}

/// Run a replica until the authority closes the stream.
///
/// Returns the replica in its final state.
#[instrument(skip_all, fields(max_message_bytes = max_len))]
pub async fn run_replica<R>(reader: &mut R, max_len: u64) -> Result<Replica, SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut replica = Replica::new();
    while let Some(body) = read_message(reader, max_len).await? {
        let msg = NodeMessage::unpack(&body)?;
        replica.handle(msg)?;
    }
    info!(
        frame = ?replica.game().map(|g| g.frame),
        checkpoints = replica.checkpoints_verified(),
        "authority closed the stream"
    );
    Ok(replica)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coins::Coins;
    use crate::core::vec2::Vec2;
    use crate::network::transport::DEFAULT_MAX_MESSAGE_BYTES;

    fn authority() -> Authority {
        let mut game = Game::with_roster(["alice", "bob"]).unwrap();
        game.start_match(400, Vec2::new(30.0, 30.0), 300).unwrap();
        Authority::new(game, 10)
    }

    #[tokio::test]
    async fn test_late_joiner_matches_authority() {
        let mut auth = authority();
        // Frames before the replica joins.
        for _ in 0..5 {
            auth.advance().unwrap();
        }

        let (mut tx, mut rx) = tokio::io::duplex(64 * 1024);
        let replica = tokio::spawn(async move { run_replica(&mut rx, DEFAULT_MAX_MESSAGE_BYTES).await });

        auth.send_snapshot(&mut tx).await.unwrap();
        for f in 0..40 {
            if f == 3 {
                auth.submit(0, Command::Kill { unit: 1 });
                auth.submit_balance_update(BalanceUpdate::deposit("bob", 75));
            }
            auth.serve_frame(&mut tx).await.unwrap();
        }
        drop(tx);

        let replica = replica.await.unwrap().unwrap();
        assert_eq!(replica.checkpoints_verified(), 4);
        let game = replica.into_game().unwrap();
        assert_eq!(game.frame, 45);
        assert_eq!(game.pack().unwrap(), auth.game().pack().unwrap());
        assert_eq!(game.player(1).unwrap().credit.balance(), 375);
    }

    #[test]
    fn test_frame_before_snapshot() {
        let mut replica = Replica::new();
        let result = replica.handle(NodeMessage::Frame(FramePacket::new(0, vec![])));
        assert!(matches!(result, Err(SessionError::NoSnapshot(0))));
    }

    #[test]
    fn test_desync_detected() {
        let mut auth = authority();
        let mut replica = Replica::new();
        replica.handle(auth.snapshot().unwrap()).unwrap();
        let (packet, _) = auth.advance().unwrap();
        replica.handle(NodeMessage::Frame(packet)).unwrap();
        // Credit that never went through a frame packet.
        auth.game.players[0].credit.deposit(Coins::mint(1)).unwrap();

        let hash = auth.game().compute_hash().unwrap();
        let result = replica.handle(NodeMessage::Checkpoint { frame: 1, hash });
        assert!(matches!(result, Err(SessionError::Desync { frame: 1, .. })));
    }
}

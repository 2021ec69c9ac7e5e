//! Frame Loop
//!
//! One frame, in order:
//!
//! ```text
//! 1. apply the frame's commands, in packet order
//! 2. frame += 1
//! 3. tick every entity that was in the table when the loop started,
//!    in table order (spawns made during the loop tick next frame)
//! 4. compact: drop dead entities and every reference to them
//! ```
//!
//! Deaths take effect the moment they happen: an entity killed earlier in
//! the loop is skipped, and is invisible to target resolution for the rest
//! of the frame.

#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::game::command::PlayerCommand;
use crate::game::entity::{EntityRef, TypeTag};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::world::{Game, GameError};
use crate::game::{fighter, gateway, gold_pile, prime};

/// Result of a frame.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Frame number after the step
    pub frame: u64,
    /// Events generated this frame, in simulation order
    pub events: Vec<GameEvent>,
}

impl TickResult {
    /// Entities spawned this frame.
    pub fn spawned(&self) -> impl Iterator<Item = (EntityRef, TypeTag)> + '_ {
        self.events.iter().filter_map(|e| match e.data {
            GameEventData::EntitySpawned { entity, kind } => Some((entity, kind)),
            _ => None,
        })
    }

    /// Entities that died this frame.
    pub fn died(&self) -> impl Iterator<Item = (EntityRef, TypeTag)> + '_ {
        self.events.iter().filter_map(|e| match e.data {
            GameEventData::EntityDied { entity, kind, .. } => Some((entity, kind)),
            _ => None,
        })
    }
}

impl Game {
    /// Advance one frame with no commands.
    pub fn iterate(&mut self) -> Result<TickResult, GameError> {
        self.frame += 1;

        let count = self.entities.len();
        for idx in 0..count {
            let entity = &self.entities[idx];
            if entity.dead || !entity.is_active() {
                continue;
            }
            #[cfg(feature = "debug-tracing")]
            trace!(frame = self.frame, entity = entity.id, kind = entity.type_name(), "tick");
            match entity.type_tag() {
                TypeTag::GoldPile => gold_pile::tick(self, idx)?,
                TypeTag::Prime => prime::tick(self, idx)?,
                TypeTag::Fighter => fighter::tick(self, idx)?,
                TypeTag::Gateway => gateway::tick(self, idx)?,
            }
        }

        self.compact();

        Ok(TickResult {
            frame: self.frame,
            events: self.take_events(),
        })
    }

    /// Apply one frame's commands, then advance.
    pub fn step(&mut self, commands: &[PlayerCommand]) -> Result<TickResult, GameError> {
        self.apply_commands(commands)?;
        self.iterate()
    }
}

/// Replay frames from a starting world.
///
/// Returns the final world and every event produced along the way.
pub fn replay_frames<'a, I>(initial: Game, frames: I) -> Result<(Game, Vec<GameEvent>), GameError>
where
    I: IntoIterator<Item = &'a [PlayerCommand]>,
{
    let mut game = initial;
    let mut all_events = Vec::new();
    for commands in frames {
        let result = game.step(commands)?;
        all_events.extend(result.events);
    }
    Ok((game, all_events))
}

// =============================================================================
// TESTS
// =============================================================================

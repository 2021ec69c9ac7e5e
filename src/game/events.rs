//! Game Events
//!
//! Events are emitted in simulation order and returned from each frame. They
//! never feed back into state; replicas produce the same list for the same
//! frame, which makes them handy for logs and for asserting on behaviour.

use serde::Serialize;

use crate::core::coins::CoinsInt;
use crate::game::command::CommandRejection;
use crate::game::entity::{EntityRef, TypeTag};
use crate::game::player::{BalanceRejection, PlayerId};

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum GameEventData {
    /// An entity was added to the world
    EntitySpawned {
        /// New entity
        entity: EntityRef,
        /// Its kind
        kind: TypeTag,
    },

    /// A Gateway finished producing a unit
    UnitCompleted {
        /// Finished unit
        entity: EntityRef,
        /// Its owner
        owner: PlayerId,
    },

    /// An entity died
    EntityDied {
        /// Dead entity
        entity: EntityRef,
        /// Its kind
        kind: TypeTag,
        /// Coins dropped into a new gold pile
        dropped: CoinsInt,
    },

    /// A command was ignored
    CommandRejected {
        /// Issuing player
        player: PlayerId,
        /// Why
        reason: CommandRejection,
    },

    /// An external deposit or withdrawal changed a player's credit
    BalanceUpdated {
        /// Credited or debited player
        player: PlayerId,
        /// Amount moved
        amount: CoinsInt,
        /// Deposit if true
        deposit: bool,
    },

    /// An external deposit or withdrawal was ignored
    BalanceUpdateRejected {
        /// Why
        reason: BalanceRejection,
    },
}

/// A game event stamped with the frame it happened in.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GameEvent {
    /// Frame during which the event occurred
    pub frame: u64,

    /// Player involved, if any
    pub player_id: Option<PlayerId>,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(frame: u64, data: GameEventData) -> Self {
        let player_id = match &data {
            GameEventData::UnitCompleted { owner, .. } => Some(*owner),
            GameEventData::CommandRejected { player, .. }
            | GameEventData::BalanceUpdated { player, .. } => Some(*player),
            GameEventData::BalanceUpdateRejected {
                reason:
                    BalanceRejection::InsufficientFunds { player, .. }
                    | BalanceRejection::Overflow { player, .. },
            } => Some(*player),
            _ => None,
        };

        Self {
            frame,
            player_id,
            data,
        }
    }
}

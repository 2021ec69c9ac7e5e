//! Presentation View
//!
//! A read-only, serializable picture of the world for renderers and logs.
//! Nothing here feeds back into the simulation, so it is free to use
//! non-deterministic math such as `atan2` for facing.

use serde::Serialize;

use crate::core::coins::CoinsInt;
use crate::core::vec2::Vec2;
use crate::game::entity::{Entity, EntityKind, EntityRef, TypeTag};
use crate::game::player::PlayerId;
use crate::game::world::Game;

/// How an entity relates to the viewing player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Alliance {
    /// Owned by the viewer
    Ally,
    /// Owned by someone else
    Enemy,
    /// Unowned, or no viewer
    Neutral,
}

/// Alliance of `entity` as seen by `viewer`.
pub fn alliance(viewer: Option<PlayerId>, entity: &Entity) -> Alliance {
    match (viewer, entity.owner()) {
        (Some(v), Some(owner)) if v == owner => Alliance::Ally,
        (Some(_), Some(_)) => Alliance::Enemy,
        _ => Alliance::Neutral,
    }
}

/// One player, for display.
#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    /// Roster index
    pub id: PlayerId,
    /// Address
    pub address: String,
    /// Free credit in smallest units
    pub credit: CoinsInt,
    /// Free credit as `$D.CC`
    pub credit_display: String,
}

/// One entity, for display.
#[derive(Clone, Debug, Serialize)]
pub struct EntityView {
    /// Entity ref
    pub id: EntityRef,
    /// Kind
    pub kind: TypeTag,
    /// Position
    pub position: Vec2,
    /// Facing in radians
    pub rotation: f32,
    /// Owner, for units
    pub owner: Option<PlayerId>,
    /// Relation to the viewer
    pub alliance: Alliance,
    /// Health, for units
    pub health: Option<u16>,
    /// Construction progress in `[0, 1]`, for units
    pub built_ratio: Option<f32>,
    /// Coins in a pile, or carried by a Prime
    pub gold: Option<CoinsInt>,
}

impl EntityView {
    fn new(viewer: Option<PlayerId>, entity: &Entity) -> Self {
        let unit = entity.unit();
        let gold = match &entity.kind {
            EntityKind::GoldPile(g) => Some(g.gold.balance()),
            EntityKind::Prime(p) => Some(p.held_gold.balance()),
            _ => None,
        };
        Self {
            id: entity.id,
            kind: entity.type_tag(),
            position: entity.pos,
            rotation: entity.rotation(),
            owner: entity.owner(),
            alliance: alliance(viewer, entity),
            health: unit.map(|u| u.health()),
            built_ratio: unit.map(|u| u.built_ratio()),
            gold,
        }
    }
}

/// The whole world, for display.
#[derive(Clone, Debug, Serialize)]
pub struct WorldView {
    /// Frame
    pub frame: u64,
    /// Roster
    pub players: Vec<PlayerView>,
    /// Live entities in table order
    pub entities: Vec<EntityView>,
}

impl Game {
    /// View with no viewing player; every entity is neutral.
    pub fn view(&self) -> WorldView {
        self.view_for(None)
    }

    /// View from `viewer`'s side.
    pub fn view_for(&self, viewer: Option<PlayerId>) -> WorldView {
        let players = self
            .players()
            .iter()
            .zip(0..)
            .map(|(p, id)| PlayerView {
                id,
                address: p.address().to_owned(),
                credit: p.credit.balance(),
                credit_display: p.credit.to_string(),
            })
            .collect();
        WorldView {
            frame: self.frame,
            players,
            entities: self.entities().map(|e| EntityView::new(viewer, e)).collect(),
        }
    }
}

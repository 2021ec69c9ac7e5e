//! Entity Model
//!
//! Entities are a flat tagged variant instead of a class hierarchy. Each
//! concrete kind embeds the structural layers it shares with its siblings:
//!
//! ```text
//! Entity { id, pos, dead }                 base
//! ├── GoldPile { gold }
//! ├── Prime   { MobileUnit { Unit }, held_gold, state, ... }
//! ├── Fighter { MobileUnit { Unit }, state, cooldown, ... }
//! └── Gateway { Building   { Unit }, building_unit }
//! ```
//!
//! ## Wire Layout
//!
//! `u8 type tag | base | unit | building or mobile | kind fields`. Each layer
//! packs the layer below it first, so shared fields are written by exactly
//! one routine. [`Entity::unpack`] is the only place that decides which kind
//! to build, by looking up the tag in [`TypeTag`].

use std::collections::BTreeSet;
use serde::Serialize;

use crate::core::codec::{CodecError, Packer, Unpacker};
use crate::core::coins::{Coins, CoinsInt, LedgerError};
use crate::core::vec2::Vec2;
use crate::game::fighter::Fighter;
use crate::game::gateway::Gateway;
use crate::game::gold_pile::GoldPile;
use crate::game::player::PlayerId;
use crate::game::prime::Prime;
use crate::game::rules::{
    FIGHTER_COST, FIGHTER_MAX_HEALTH, GATEWAY_COST, GATEWAY_MAX_HEALTH, PRIME_COST,
    PRIME_MAX_HEALTH,
};
use crate::game::unit::{MobileUnit, Unit};

/// Identifier of an entity within one world. Zero is the null reference.
pub type EntityRef = u16;

/// The null entity reference.
pub const NULL_ENTITY_REF: EntityRef = 0;

// =============================================================================
// TYPE TAG REGISTRY
// =============================================================================

/// One-byte tag identifying a concrete entity kind on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum TypeTag {
    /// Unowned pile of coins
    GoldPile = 1,
    /// Worker unit
    Prime = 2,
    /// Combat unit
    Fighter = 3,
    /// Unit-producing building
    Gateway = 4,
}

impl TypeTag {
    /// Every registered tag.
    pub const ALL: [TypeTag; 4] = [
        TypeTag::GoldPile,
        TypeTag::Prime,
        TypeTag::Fighter,
        TypeTag::Gateway,
    ];

    /// Look a raw byte up in the registry.
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            1 => Ok(TypeTag::GoldPile),
            2 => Ok(TypeTag::Prime),
            3 => Ok(TypeTag::Fighter),
            4 => Ok(TypeTag::Gateway),
            other => Err(CodecError::UnknownTypeTag(other)),
        }
    }

    /// Human-readable kind name.
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::GoldPile => "GoldPile",
            TypeTag::Prime => "Prime",
            TypeTag::Fighter => "Fighter",
            TypeTag::Gateway => "Gateway",
        }
    }

    /// Construction cost, for unit kinds.
    pub fn cost(self) -> Option<CoinsInt> {
        match self {
            TypeTag::GoldPile => None,
            TypeTag::Prime => Some(PRIME_COST),
            TypeTag::Fighter => Some(FIGHTER_COST),
            TypeTag::Gateway => Some(GATEWAY_COST),
        }
    }

    /// Max health, for unit kinds.
    pub fn max_health(self) -> Option<u16> {
        match self {
            TypeTag::GoldPile => None,
            TypeTag::Prime => Some(PRIME_MAX_HEALTH),
            TypeTag::Fighter => Some(FIGHTER_MAX_HEALTH),
            TypeTag::Gateway => Some(GATEWAY_MAX_HEALTH),
        }
    }

    /// Kinds a Prime can place.
    pub fn is_building(self) -> bool {
        matches!(self, TypeTag::Gateway)
    }

    /// Kinds a Gateway can produce.
    pub fn is_mobile_unit(self) -> bool {
        matches!(self, TypeTag::Prime | TypeTag::Fighter)
    }

    /// Reconstruct the kind-specific part of an entity from the wire.
    fn unpack_kind(self, u: &mut Unpacker<'_>) -> Result<EntityKind, CodecError> {
        Ok(match self {
            TypeTag::GoldPile => EntityKind::GoldPile(GoldPile::unpack(u)?),
            TypeTag::Prime => EntityKind::Prime(Prime::unpack(u)?),
            TypeTag::Fighter => EntityKind::Fighter(Fighter::unpack(u)?),
            TypeTag::Gateway => EntityKind::Gateway(Gateway::unpack(u)?),
        })
    }
}

// =============================================================================
// ENTITY
// =============================================================================

/// Kind-specific state of an entity.
#[derive(Debug, PartialEq)]
pub enum EntityKind {
    /// Unowned pile of coins
    GoldPile(GoldPile),
    /// Worker unit
    Prime(Prime),
    /// Combat unit
    Fighter(Fighter),
    /// Unit-producing building
    Gateway(Gateway),
}

impl EntityKind {
    /// A fresh, unbuilt unit of the given kind.
    pub fn new_unit(tag: TypeTag, owner_id: PlayerId) -> Option<Self> {
        match tag {
            TypeTag::GoldPile => None,
            TypeTag::Prime => Some(EntityKind::Prime(Prime::new(owner_id))),
            TypeTag::Fighter => Some(EntityKind::Fighter(Fighter::new(owner_id))),
            TypeTag::Gateway => Some(EntityKind::Gateway(Gateway::new(owner_id))),
        }
    }
}

/// A live (or just-died) object in the world.
#[derive(Debug, PartialEq)]
pub struct Entity {
    /// Reference other entities use to reach this one
    pub id: EntityRef,
    /// World position
    pub pos: Vec2,
    /// Set on death; the entity is removed at the end of the frame
    pub dead: bool,
    /// Kind-specific state
    pub kind: EntityKind,
}

impl Entity {
    /// Create a live entity.
    pub fn new(id: EntityRef, pos: Vec2, kind: EntityKind) -> Self {
        Self {
            id,
            pos,
            dead: false,
            kind,
        }
    }

    /// Registry tag of this entity's kind.
    pub fn type_tag(&self) -> TypeTag {
        match self.kind {
            EntityKind::GoldPile(_) => TypeTag::GoldPile,
            EntityKind::Prime(_) => TypeTag::Prime,
            EntityKind::Fighter(_) => TypeTag::Fighter,
            EntityKind::Gateway(_) => TypeTag::Gateway,
        }
    }

    /// Human-readable kind name.
    pub fn type_name(&self) -> &'static str {
        self.type_tag().name()
    }

    /// The unit layer, if this is a unit.
    pub fn unit(&self) -> Option<&Unit> {
        match &self.kind {
            EntityKind::GoldPile(_) => None,
            EntityKind::Prime(p) => Some(&p.mobile.unit),
            EntityKind::Fighter(f) => Some(&f.mobile.unit),
            EntityKind::Gateway(g) => Some(&g.building.unit),
        }
    }

    /// The unit layer, mutably.
    pub fn unit_mut(&mut self) -> Option<&mut Unit> {
        match &mut self.kind {
            EntityKind::GoldPile(_) => None,
            EntityKind::Prime(p) => Some(&mut p.mobile.unit),
            EntityKind::Fighter(f) => Some(&mut f.mobile.unit),
            EntityKind::Gateway(g) => Some(&mut g.building.unit),
        }
    }

    /// The mobile-unit layer, if this unit moves.
    pub fn mobile(&self) -> Option<&MobileUnit> {
        match &self.kind {
            EntityKind::Prime(p) => Some(&p.mobile),
            EntityKind::Fighter(f) => Some(&f.mobile),
            _ => None,
        }
    }

    /// The mobile-unit layer, mutably.
    pub fn mobile_mut(&mut self) -> Option<&mut MobileUnit> {
        match &mut self.kind {
            EntityKind::Prime(p) => Some(&mut p.mobile),
            EntityKind::Fighter(f) => Some(&mut f.mobile),
            _ => None,
        }
    }

    /// Owning player, if this is a unit.
    pub fn owner(&self) -> Option<PlayerId> {
        self.unit().map(|u| u.owner_id)
    }

    /// False while a unit is under construction.
    pub fn is_active(&self) -> bool {
        self.unit().map_or(true, Unit::is_active)
    }

    /// Facing angle in radians. Presentation only.
    pub fn rotation(&self) -> f32 {
        self.mobile().map_or(0.0, MobileUnit::rotation)
    }

    /// Empty every ledger this entity holds into one amount.
    ///
    /// Used on death so the entity's value can be dropped into the world.
    pub fn take_droppable_coins(&mut self) -> Result<Coins, LedgerError> {
        match &mut self.kind {
            EntityKind::GoldPile(g) => Ok(g.gold.withdraw_all()),
            EntityKind::Prime(p) => Coins::add(
                p.mobile.unit.gold_invested.withdraw_all(),
                p.held_gold.withdraw_all(),
            ),
            EntityKind::Fighter(f) => Ok(f.mobile.unit.gold_invested.withdraw_all()),
            EntityKind::Gateway(g) => Ok(g.building.unit.gold_invested.withdraw_all()),
        }
    }

    /// Total coins held by this entity across all of its ledgers.
    pub fn coins_held(&self) -> u64 {
        match &self.kind {
            EntityKind::GoldPile(g) => g.gold.balance() as u64,
            EntityKind::Prime(p) => {
                p.mobile.unit.gold_invested.balance() as u64 + p.held_gold.balance() as u64
            }
            EntityKind::Fighter(f) => f.mobile.unit.gold_invested.balance() as u64,
            EntityKind::Gateway(g) => g.building.unit.gold_invested.balance() as u64,
        }
    }

    /// Drop every stored reference to an entity in `removed`.
    ///
    /// Called when dead entities leave the table so that a recycled ref can
    /// never be reached through a stale link.
    pub(crate) fn forget_refs(&mut self, removed: &BTreeSet<EntityRef>) {
        match &mut self.kind {
            EntityKind::GoldPile(_) => {}
            EntityKind::Prime(p) => {
                if p.mobile.targets_any(removed) {
                    p.go_idle();
                }
            }
            EntityKind::Fighter(f) => {
                if f.mobile.targets_any(removed) {
                    f.go_idle();
                }
            }
            EntityKind::Gateway(g) => {
                if g.building_unit.is_some_and(|r| removed.contains(&r)) {
                    g.building_unit = None;
                }
            }
        }
    }

    /// Encode this entity, type tag first.
    pub fn pack(&self, p: &mut Packer) {
        p.put_tag(self.type_tag() as u8);
        self.pack_base(p);
        match &self.kind {
            EntityKind::GoldPile(g) => g.pack(p),
            EntityKind::Prime(prime) => prime.pack(p),
            EntityKind::Fighter(f) => f.pack(p),
            EntityKind::Gateway(g) => g.pack(p),
        }
    }

    fn pack_base(&self, p: &mut Packer) {
        p.put_u16(self.id);
        self.pos.pack(p);
    }

    /// Decode one entity, dispatching on its type tag.
    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        let tag = TypeTag::from_u8(u.get_tag()?)?;
        let id = u.get_u16()?;
        let pos = Vec2::unpack(u)?;
        let kind = tag.unpack_kind(u)?;
        Ok(Self::new(id, pos, kind))
    }
}

// =============================================================================
// TESTS
// =============================================================================

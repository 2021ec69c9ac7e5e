//! Targets
//!
//! A target is either a fixed point or a reference to another entity. Entity
//! targets are resolved against the live table every time they are used, so
//! a target whose entity died simply stops resolving.

use crate::core::codec::{CodecError, Packer, Unpacker};
use crate::core::vec2::Vec2;
use crate::game::entity::{Entity, EntityRef};
use crate::game::world::Game;

/// Wire kind for "no target" inside an optional target.
const KIND_NONE: u8 = 0;
/// Wire kind for a point target.
const KIND_POINT: u8 = 1;
/// Wire kind for an entity target.
const KIND_ENTITY: u8 = 2;

/// Where a unit is headed or what it is acting on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Target {
    /// Fixed world position
    Point(Vec2),
    /// Another entity, by reference
    Entity(EntityRef),
}

impl Target {
    /// Current position of the target, or `None` if its entity is gone.
    pub fn resolve_point(&self, game: &Game) -> Option<Vec2> {
        match *self {
            Target::Point(p) => Some(p),
            Target::Entity(r) => game.entity(r).map(|e| e.pos),
        }
    }

    /// The targeted entity, if it is still alive.
    pub fn resolve_entity<'a>(&self, game: &'a Game) -> Option<&'a Entity> {
        self.as_entity_ref().and_then(|r| game.entity(r))
    }

    /// Entity reference, if this targets an entity.
    pub fn as_entity_ref(&self) -> Option<EntityRef> {
        match *self {
            Target::Entity(r) => Some(r),
            Target::Point(_) => None,
        }
    }

    /// Point, if this targets a fixed point.
    pub fn as_point(&self) -> Option<Vec2> {
        match *self {
            Target::Point(p) => Some(p),
            Target::Entity(_) => None,
        }
    }

    /// Encode a target that must be present.
    pub fn pack(&self, p: &mut Packer) {
        match *self {
            Target::Point(point) => {
                p.put_u8(KIND_POINT);
                point.pack(p);
            }
            Target::Entity(r) => {
                p.put_u8(KIND_ENTITY);
                p.put_u16(r);
            }
        }
    }

    /// Decode a target that must be present.
    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        match u.get_u8()? {
            KIND_NONE => Err(CodecError::UnknownTargetKind(KIND_NONE)),
            kind => Self::unpack_kind(kind, u),
        }
    }

    /// Encode an optional target; kind 0 means none.
    pub fn pack_optional(target: Option<&Target>, p: &mut Packer) {
        match target {
            Some(t) => t.pack(p),
            None => p.put_u8(KIND_NONE),
        }
    }

    /// Decode an optional target.
    pub fn unpack_optional(u: &mut Unpacker<'_>) -> Result<Option<Self>, CodecError> {
        match u.get_u8()? {
            KIND_NONE => Ok(None),
            kind => Self::unpack_kind(kind, u).map(Some),
        }
    }

    fn unpack_kind(kind: u8, u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        match kind {
            KIND_POINT => Ok(Target::Point(Vec2::unpack(u)?)),
            KIND_ENTITY => Ok(Target::Entity(u.get_u16()?)),
            other => Err(CodecError::UnknownTargetKind(other)),
        }
    }
}

impl From<&Entity> for Target {
    fn from(entity: &Entity) -> Self {
        Target::Entity(entity.id)
    }
}

impl From<Vec2> for Target {
    fn from(point: Vec2) -> Self {
        Target::Point(point)
    }
}

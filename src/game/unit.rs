//! Unit Layers
//!
//! Shared structure embedded by every owned entity:
//!
//! - [`Unit`]: owner, construction ledger, health
//! - [`Building`]: a stationary unit
//! - [`MobileUnit`]: a unit with a target and a heading
//!
//! A unit is under construction until `gold_invested` reaches its cost.
//! Under-construction units neither tick nor accept commands, but can be
//! damaged and killed.

use std::collections::BTreeSet;

use crate::core::codec::{CodecError, Packer, Unpacker};
use crate::core::coins::{Coins, CoinsInt, LedgerError};
use crate::core::vec2::Vec2;
use crate::game::entity::EntityRef;
use crate::game::player::PlayerId;
use crate::game::target::Target;
use crate::game::world::Game;

// =============================================================================
// UNIT
// =============================================================================

/// Owned, buildable, damageable entity layer.
#[derive(Debug, PartialEq)]
pub struct Unit {
    /// Owning player
    pub owner_id: PlayerId,
    /// Coins invested into construction so far
    pub gold_invested: Coins,
    health: u16,
    total_cost: CoinsInt,
    max_health: u16,
}

impl Unit {
    /// A unit with nothing invested and full health.
    pub fn new(owner_id: PlayerId, total_cost: CoinsInt, max_health: u16) -> Self {
        Self {
            owner_id,
            gold_invested: Coins::zero(),
            health: max_health,
            total_cost,
            max_health,
        }
    }

    /// Full construction cost.
    pub fn total_cost(&self) -> CoinsInt {
        self.total_cost
    }

    /// Health when undamaged.
    pub fn max_health(&self) -> u16 {
        self.max_health
    }

    /// Remaining health.
    pub fn health(&self) -> u16 {
        self.health
    }

    pub(crate) fn set_health(&mut self, health: u16) {
        self.health = health;
    }

    /// Coins still needed to finish construction.
    pub fn remaining_cost(&self) -> CoinsInt {
        self.total_cost.saturating_sub(self.gold_invested.balance())
    }

    /// Fraction of construction done, in `[0, 1]`. Presentation only.
    pub fn built_ratio(&self) -> f32 {
        if self.total_cost == 0 {
            return 1.0;
        }
        let invested = self.gold_invested.balance().min(self.total_cost);
        invested as f32 / self.total_cost as f32
    }

    /// True once construction is complete.
    pub fn is_active(&self) -> bool {
        self.gold_invested.balance() >= self.total_cost
    }

    /// Move up to `attempted` coins from `from` into construction, never past
    /// the total cost. Returns the amount moved.
    pub fn build(&mut self, attempted: CoinsInt, from: &mut Coins) -> Result<CoinsInt, LedgerError> {
        let amount = attempted.min(self.remaining_cost());
        Coins::transfer_up_to(from, &mut self.gold_invested, amount)
    }

    /// Apply damage. Returns true if health reached zero.
    pub fn take_hit(&mut self, damage: u16) -> bool {
        self.health = self.health.saturating_sub(damage);
        self.health == 0
    }

    /// Encode: owner, invested, health.
    pub fn pack(&self, p: &mut Packer) {
        p.put_u16(self.owner_id);
        self.gold_invested.pack(p);
        p.put_u16(self.health);
    }

    /// Decode; cost and max health come from the kind, not the wire.
    pub fn unpack(
        u: &mut Unpacker<'_>,
        total_cost: CoinsInt,
        max_health: u16,
    ) -> Result<Self, CodecError> {
        let owner_id = u.get_u16()?;
        let gold_invested = Coins::unpack(u)?;
        let health = u.get_u16()?;
        Ok(Self {
            owner_id,
            gold_invested,
            health,
            total_cost,
            max_health,
        })
    }
}

// =============================================================================
// BUILDING
// =============================================================================

/// Stationary unit layer.
#[derive(Debug, PartialEq)]
pub struct Building {
    /// Unit layer
    pub unit: Unit,
}

impl Building {
    /// A new, unbuilt building.
    pub fn new(owner_id: PlayerId, total_cost: CoinsInt, max_health: u16) -> Self {
        Self {
            unit: Unit::new(owner_id, total_cost, max_health),
        }
    }

    /// Encode the unit layer.
    pub fn pack(&self, p: &mut Packer) {
        self.unit.pack(p);
    }

    /// Decode the unit layer.
    pub fn unpack(
        u: &mut Unpacker<'_>,
        total_cost: CoinsInt,
        max_health: u16,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            unit: Unit::unpack(u, total_cost, max_health)?,
        })
    }
}

// =============================================================================
// MOBILE UNIT
// =============================================================================

/// Unit layer that moves towards a target.
#[derive(Debug, PartialEq)]
pub struct MobileUnit {
    /// Unit layer
    pub unit: Unit,
    target: Option<Target>,
    target_range: f32,
    heading: Vec2,
}

impl MobileUnit {
    /// A new, unbuilt mobile unit facing +Y.
    pub fn new(owner_id: PlayerId, total_cost: CoinsInt, max_health: u16) -> Self {
        Self {
            unit: Unit::new(owner_id, total_cost, max_health),
            target: None,
            target_range: 0.0,
            heading: Vec2::new(0.0, 1.0),
        }
    }

    /// Current target.
    pub fn target(&self) -> Option<Target> {
        self.target
    }

    /// Distance from the target at which movement stops.
    pub fn target_range(&self) -> f32 {
        self.target_range
    }

    /// Unit direction of the last movement step.
    pub fn heading(&self) -> Vec2 {
        self.heading
    }

    /// Facing angle in radians. Presentation only.
    pub fn rotation(&self) -> f32 {
        self.heading.angle()
    }

    /// Head for `target` and stop within `range` of it.
    pub fn set_target(&mut self, target: Target, range: f32) {
        self.target = Some(target);
        self.target_range = range;
    }

    /// Stop moving.
    pub fn clear_target(&mut self) {
        self.target = None;
        self.target_range = 0.0;
    }

    pub(crate) fn targets_any(&self, refs: &BTreeSet<EntityRef>) -> bool {
        self.target
            .and_then(|t| t.as_entity_ref())
            .is_some_and(|r| refs.contains(&r))
    }

    pub(crate) fn restore_motion(&mut self, target: Option<Target>, range: f32, heading: Vec2) {
        self.target = target;
        self.target_range = range;
        self.heading = heading;
    }

    /// Encode: unit, optional target, range, heading.
    pub fn pack(&self, p: &mut Packer) {
        self.unit.pack(p);
        Target::pack_optional(self.target.as_ref(), p);
        p.put_f32(self.target_range);
        self.heading.pack(p);
    }

    /// Decode the mobile layer.
    pub fn unpack(
        u: &mut Unpacker<'_>,
        total_cost: CoinsInt,
        max_health: u16,
    ) -> Result<Self, CodecError> {
        let unit = Unit::unpack(u, total_cost, max_health)?;
        let target = Target::unpack_optional(u)?;
        let target_range = u.get_f32()?;
        let heading = Vec2::unpack(u)?;
        Ok(Self {
            unit,
            target,
            target_range,
            heading,
        })
    }
}

/// Step the mobile entity at `idx` towards its target.
///
/// Stops once within `target_range`, and never overshoots the target point.
/// A target that no longer resolves is cleared.
pub(crate) fn tick_movement(game: &mut Game, idx: usize, speed: f32) {
    let entity = &game.entities[idx];
    let pos = entity.pos;
    let Some((target, range)) = entity.mobile().and_then(|m| m.target().map(|t| (t, m.target_range())))
    else {
        return;
    };
    let resolved = target.resolve_point(game);

    let entity = &mut game.entities[idx];
    let Some(point) = resolved else {
        if let Some(mobile) = entity.mobile_mut() {
            mobile.clear_target();
        }
        return;
    };

    let to_point = point - pos;
    let distance = to_point.length();
    if distance <= range {
        return;
    }
    let heading = to_point.normalize();
    entity.pos = if distance <= speed {
        point
    } else {
        pos + heading * speed
    };
    if let Some(mobile) = entity.mobile_mut() {
        mobile.heading = heading;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_stops_at_cost() {
        let mut unit = Unit::new(0, 5, 3);
        let mut purse = Coins::mint(100);
        assert!(!unit.is_active());
        assert_eq!(unit.build(3, &mut purse).unwrap(), 3);
        assert_eq!(unit.build(3, &mut purse).unwrap(), 2);
        assert_eq!(unit.build(3, &mut purse).unwrap(), 0);
        assert!(unit.is_active());
        assert_eq!(purse.balance(), 95);
        assert_eq!(unit.built_ratio(), 1.0);
    }

    #[test]
    fn test_build_limited_by_source() {
        let mut unit = Unit::new(0, 50, 3);
        let mut purse = Coins::mint(2);
        assert_eq!(unit.build(10, &mut purse).unwrap(), 2);
        assert!(purse.is_empty());
        assert_eq!(unit.remaining_cost(), 48);
    }

    #[test]
    fn test_take_hit_saturates() {
        let mut unit = Unit::new(0, 5, 2);
        assert!(!unit.take_hit(1));
        assert!(unit.take_hit(5));
        assert_eq!(unit.health(), 0);
    }

    #[test]
    fn test_mobile_layer_roundtrip_includes_unit() {
        let mut m = MobileUnit::new(3, 50, 10);
        m.unit.gold_invested = Coins::mint(20);
        m.set_target(Target::Entity(4), 10.0);
        let mut p = Packer::new();
        m.pack(&mut p);
        let bytes = p.into_bytes();
        // unit (2+4+2) + target (1+2) + range (4) + heading (8)
        assert_eq!(bytes.len(), 8 + 3 + 4 + 8);
        let back = MobileUnit::unpack(&mut Unpacker::new(&bytes), 50, 10).unwrap();
        assert_eq!(back, m);
    }
}

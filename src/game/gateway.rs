//! Gateway (unit-producing building)
//!
//! A Gateway builds one mobile unit at a time, funding it from its owner's
//! free credit at [`GATEWAY_BUILD_RATE`] coins per frame.

use crate::core::codec::{CodecError, Packer, Unpacker};
use crate::game::entity::{EntityKind, EntityRef, NULL_ENTITY_REF};
use crate::game::events::GameEventData;
use crate::game::player::PlayerId;
use crate::game::rules::{GATEWAY_BUILD_RATE, GATEWAY_COST, GATEWAY_MAX_HEALTH};
use crate::game::unit::Building;
use crate::game::world::{Game, GameError};

/// Unit-producing building.
#[derive(Debug, PartialEq)]
pub struct Gateway {
    /// Building layer
    pub building: Building,
    /// Unit currently being produced
    pub building_unit: Option<EntityRef>,
}

impl Gateway {
    /// A new, unbuilt Gateway.
    pub fn new(owner_id: PlayerId) -> Self {
        Self {
            building: Building::new(owner_id, GATEWAY_COST, GATEWAY_MAX_HEALTH),
            building_unit: None,
        }
    }

    /// Encode all layers; no unit in production is written as ref 0.
    pub fn pack(&self, p: &mut Packer) {
        self.building.pack(p);
        p.put_u16(self.building_unit.unwrap_or(NULL_ENTITY_REF));
    }

    /// Decode all layers.
    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        let building = Building::unpack(u, GATEWAY_COST, GATEWAY_MAX_HEALTH)?;
        let building_unit = match u.get_u16()? {
            NULL_ENTITY_REF => None,
            r => Some(r),
        };
        Ok(Self {
            building,
            building_unit,
        })
    }
}

fn gateway_mut(game: &mut Game, idx: usize) -> Option<&mut Gateway> {
    match &mut game.entities[idx].kind {
        EntityKind::Gateway(g) => Some(g),
        _ => None,
    }
}

/// Advance the Gateway at `idx` by one frame.
pub(crate) fn tick(game: &mut Game, idx: usize) -> Result<(), GameError> {
    let Some(gateway) = gateway_mut(game, idx) else {
        return Ok(());
    };
    let Some(unit_ref) = gateway.building_unit else {
        return Ok(());
    };
    let owner = gateway.building.unit.owner_id;

    let Some(uidx) = game
        .live_index(unit_ref)
        .filter(|&u| game.entities[u].unit().is_some())
    else {
        if let Some(gateway) = gateway_mut(game, idx) {
            gateway.building_unit = None;
        }
        return Ok(());
    };

    let Some(player) = game.players.get_mut(owner as usize) else {
        return Ok(());
    };
    let Some(unit) = game.entities[uidx].unit_mut() else {
        return Ok(());
    };
    unit.build(GATEWAY_BUILD_RATE, &mut player.credit)?;
    if !unit.is_active() {
        return Ok(());
    }

    if let Some(gateway) = gateway_mut(game, idx) {
        gateway.building_unit = None;
    }
    game.push_event(GameEventData::UnitCompleted {
        entity: unit_ref,
        owner,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coins::Coins;
    use crate::core::vec2::Vec2;
    use crate::game::rules::PRIME_COST;
    use crate::game::prime::Prime;

    #[test]
    fn test_gateway_funds_unit_from_owner_credit() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        game.mint_to_player(0, 60).unwrap();
        let mut gateway = Gateway::new(0);
        gateway.building.unit.gold_invested = Coins::mint(GATEWAY_COST);
        gateway.building_unit = Some(2);
        game.spawn(Vec2::ZERO, EntityKind::Gateway(gateway)).unwrap();
        game.spawn(Vec2::new(0.0, 15.0), EntityKind::Prime(Prime::new(0))).unwrap();

        for _ in 0..PRIME_COST - 1 {
            game.iterate().unwrap();
        }
        assert!(!game.entity(2).unwrap().is_active());
        let result = game.iterate().unwrap();
        assert!(game.entity(2).unwrap().is_active());
        assert!(result
            .events
            .iter()
            .any(|e| e.data == GameEventData::UnitCompleted { entity: 2, owner: 0 }));
        assert_eq!(game.player(0).unwrap().credit.balance(), 10);

        match &game.entity(1).unwrap().kind {
            EntityKind::Gateway(g) => assert_eq!(g.building_unit, None),
            _ => panic!("not a gateway"),
        }
    }

    #[test]
    fn test_gateway_stalls_without_credit() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        game.mint_to_player(0, 3).unwrap();
        let mut gateway = Gateway::new(0);
        gateway.building.unit.gold_invested = Coins::mint(GATEWAY_COST);
        gateway.building_unit = Some(2);
        game.spawn(Vec2::ZERO, EntityKind::Gateway(gateway)).unwrap();
        game.spawn(Vec2::new(0.0, 15.0), EntityKind::Prime(Prime::new(0))).unwrap();

        for _ in 0..10 {
            game.iterate().unwrap();
        }
        assert_eq!(game.entity(2).unwrap().unit().unwrap().gold_invested.balance(), 3);
        assert!(game.player(0).unwrap().credit.is_empty());
    }
}

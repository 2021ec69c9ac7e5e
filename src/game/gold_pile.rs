//! Gold piles: unowned coins lying in the world.
//!
//! A pile that runs dry is removed at its next tick, unless some unit is
//! still headed for it.

use crate::core::codec::{CodecError, Packer, Unpacker};
use crate::core::coins::Coins;
use crate::game::entity::EntityKind;
use crate::game::world::{Game, GameError};

/// A pile of coins. Primes pick from and drop onto these.
#[derive(Debug, Default, PartialEq)]
pub struct GoldPile {
    /// Coins in the pile
    pub gold: Coins,
}

impl GoldPile {
    /// A pile holding `gold`.
    pub fn new(gold: Coins) -> Self {
        Self { gold }
    }

    /// Encode the pile's balance.
    pub fn pack(&self, p: &mut Packer) {
        self.gold.pack(p);
    }

    /// Decode the pile's balance.
    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            gold: Coins::unpack(u)?,
        })
    }
}

/// Remove the pile at `idx` if it is empty and untargeted.
pub(crate) fn tick(game: &mut Game, idx: usize) -> Result<(), GameError> {
    let entity = &game.entities[idx];
    let EntityKind::GoldPile(pile) = &entity.kind else {
        return Ok(());
    };
    if !pile.gold.is_empty() {
        return Ok(());
    }
    let id = entity.id;
    let targeted = game.entities().any(|e| {
        e.mobile()
            .and_then(|m| m.target())
            .and_then(|t| t.as_entity_ref())
            == Some(id)
    });
    if targeted {
        return Ok(());
    }
    game.kill_at(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;
    use crate::game::command::{Command, PlayerCommand};
    use crate::game::entity::TypeTag;
    use crate::game::prime::Prime;
    use crate::game::rules::PRIME_COST;
    use crate::game::target::Target;

    fn built_prime(held: u32) -> EntityKind {
        let mut prime = Prime::new(0);
        prime.mobile.unit.gold_invested = Coins::mint(PRIME_COST);
        prime.held_gold = Coins::mint(held);
        EntityKind::Prime(prime)
    }

    fn piles(game: &Game) -> Vec<u32> {
        game.entities()
            .filter(|e| e.type_tag() == TypeTag::GoldPile)
            .map(|e| e.coins_held() as u32)
            .collect()
    }

    #[test]
    fn test_repeated_putdown_does_not_grow_table() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        let prime = game.spawn(Vec2::ZERO, built_prime(1)).unwrap();
        let total = game.total_coins();
        let putdown = [PlayerCommand::new(
            0,
            Command::Putdown { prime, target: Target::Point(Vec2::new(5.0, 0.0)) },
        )];

        for _ in 0..500 {
            game.step(&putdown).unwrap();
            assert!(game.entity_count() <= 2);
        }
        assert_eq!(game.total_coins(), total);

        // Left alone, the Prime drops its coin on the last pile.
        game.iterate().unwrap();
        assert_eq!(piles(&game), vec![1]);
        assert_eq!(game.total_coins(), total);
    }

    #[test]
    fn test_drained_pile_is_removed() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        let pile = game.mint_gold_pile(Vec2::new(5.0, 0.0), 2).unwrap();
        let prime = game.spawn(Vec2::ZERO, built_prime(0)).unwrap();
        game.apply_command(0, &Command::Pickup { prime, target: Target::Entity(pile) })
            .unwrap();

        game.iterate().unwrap();
        game.iterate().unwrap();
        assert_eq!(game.entity(pile).unwrap().coins_held(), 0);

        let result = game.iterate().unwrap();
        assert!(result.died().any(|(r, tag)| r == pile && tag == TypeTag::GoldPile));
        assert!(game.entity(pile).is_none());
        assert!(piles(&game).is_empty());
    }

    #[test]
    fn test_targeted_empty_pile_survives() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        let pile = game.mint_gold_pile(Vec2::new(500.0, 0.0), 0).unwrap();
        let prime = game.spawn(Vec2::ZERO, built_prime(3)).unwrap();
        game.apply_command(0, &Command::Putdown { prime, target: Target::Entity(pile) })
            .unwrap();

        for _ in 0..20 {
            game.iterate().unwrap();
        }
        assert!(game.entity(pile).is_some());
    }
}

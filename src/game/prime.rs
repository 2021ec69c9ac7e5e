//! Prime (worker unit)
//!
//! Primes are the only way coins move between gold piles and construction.
//!
//! ```text
//!            cmd_pickup            cmd_putdown             cmd_build
//!   Idle ───────────────► PickupGold   PutdownGold ◄──  Build ──► (spawns site)
//!    ▲                         │            │              │
//!    └─────── pile empty / hold full / hold empty / target gone / built ──┘
//! ```
//!
//! Each frame a Prime in range moves at most [`PRIME_TRANSFER_RATE`] coins.

use crate::core::codec::{CodecError, Packer, Unpacker};
use crate::core::coins::{Coins, CoinsInt};
use crate::core::vec2::Vec2;
use crate::game::entity::{EntityKind, TypeTag};
use crate::game::gold_pile::GoldPile;
use crate::game::player::PlayerId;
use crate::game::rules::{
    PRIME_COST, PRIME_MAX_HEALTH, PRIME_MAX_HELD_GOLD, PRIME_RANGE, PRIME_SPEED,
    PRIME_TRANSFER_RATE,
};
use crate::game::target::Target;
use crate::game::unit::{self, MobileUnit};
use crate::game::world::{Game, GameError};

/// What a Prime is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PrimeState {
    /// Nothing, or just moving
    Idle = 0,
    /// Pulling coins from a gold pile
    PickupGold = 1,
    /// Dropping held coins on a point, pile or unit
    PutdownGold = 2,
    /// Placing and funding a building
    Build = 3,
}

impl PrimeState {
    /// Decode from the wire.
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(PrimeState::Idle),
            1 => Ok(PrimeState::PickupGold),
            2 => Ok(PrimeState::PutdownGold),
            3 => Ok(PrimeState::Build),
            value => Err(CodecError::InvalidEnum {
                field: "prime state",
                value,
            }),
        }
    }
}

/// Direction of this frame's coin transfer. Presentation only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum GoldTransferState {
    /// No coins moved
    None = 0,
    /// Coins moved out of the Prime
    Pushing = 1,
    /// Coins moved into the Prime
    Pulling = 2,
}

impl GoldTransferState {
    /// Decode from the wire.
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(GoldTransferState::None),
            1 => Ok(GoldTransferState::Pushing),
            2 => Ok(GoldTransferState::Pulling),
            value => Err(CodecError::InvalidEnum {
                field: "gold transfer state",
                value,
            }),
        }
    }
}

/// Worker unit.
#[derive(Debug, PartialEq)]
pub struct Prime {
    /// Mobile unit layer
    pub mobile: MobileUnit,
    /// Coins carried
    pub held_gold: Coins,
    /// Current activity
    pub state: PrimeState,
    /// Last frame's transfer direction
    pub gold_transfer_state: GoldTransferState,
    /// Kind to place on arrival, while in [`PrimeState::Build`]
    pub build_tag: Option<TypeTag>,
}

impl Prime {
    /// A new, unbuilt Prime.
    pub fn new(owner_id: PlayerId) -> Self {
        Self {
            mobile: MobileUnit::new(owner_id, PRIME_COST, PRIME_MAX_HEALTH),
            held_gold: Coins::zero(),
            state: PrimeState::Idle,
            gold_transfer_state: GoldTransferState::None,
            build_tag: None,
        }
    }

    /// Walk to a point.
    pub fn cmd_move(&mut self, point: Vec2) {
        self.go_idle();
        self.mobile.set_target(Target::Point(point), 0.0);
    }

    /// Pull coins from a gold pile.
    pub fn cmd_pickup(&mut self, target: Target) {
        self.build_tag = None;
        self.state = PrimeState::PickupGold;
        self.mobile.set_target(target, PRIME_RANGE);
    }

    /// Drop coins on a point, a gold pile or an unfinished unit.
    pub fn cmd_putdown(&mut self, target: Target) {
        self.build_tag = None;
        self.state = PrimeState::PutdownGold;
        self.mobile.set_target(target, PRIME_RANGE);
    }

    /// Place a building of kind `tag` at `point` and fund it.
    pub fn cmd_build(&mut self, tag: TypeTag, point: Vec2) {
        self.build_tag = Some(tag);
        self.state = PrimeState::Build;
        self.mobile.set_target(Target::Point(point), PRIME_RANGE);
    }

    /// Stop whatever the Prime is doing.
    pub fn go_idle(&mut self) {
        self.state = PrimeState::Idle;
        self.build_tag = None;
        self.mobile.clear_target();
    }

    /// Room left in the hold.
    pub fn hold_room(&self) -> CoinsInt {
        PRIME_MAX_HELD_GOLD.saturating_sub(self.held_gold.balance())
    }

    /// Encode all layers.
    pub fn pack(&self, p: &mut Packer) {
        self.mobile.pack(p);
        self.held_gold.pack(p);
        p.put_u8(self.state as u8);
        p.put_u8(self.gold_transfer_state as u8);
        p.put_u8(self.build_tag.map_or(0, |t| t as u8));
    }

    /// Decode all layers.
    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        let mobile = MobileUnit::unpack(u, PRIME_COST, PRIME_MAX_HEALTH)?;
        let held_gold = Coins::unpack(u)?;
        let state = PrimeState::from_u8(u.get_u8()?)?;
        let gold_transfer_state = GoldTransferState::from_u8(u.get_u8()?)?;
        let build_tag = match u.get_u8()? {
            0 => None,
            tag => Some(TypeTag::from_u8(tag)?),
        };
        Ok(Self {
            mobile,
            held_gold,
            state,
            gold_transfer_state,
            build_tag,
        })
    }
}

// =============================================================================
// TICK
// =============================================================================

fn prime_mut(game: &mut Game, idx: usize) -> Option<&mut Prime> {
    match &mut game.entities[idx].kind {
        EntityKind::Prime(p) => Some(p),
        _ => None,
    }
}

fn go_idle(game: &mut Game, idx: usize) -> Result<(), GameError> {
    if let Some(prime) = prime_mut(game, idx) {
        prime.go_idle();
    }
    Ok(())
}

/// Advance the Prime at `idx` by one frame.
pub(crate) fn tick(game: &mut Game, idx: usize) -> Result<(), GameError> {
    let Some(prime) = prime_mut(game, idx) else {
        return Ok(());
    };
    prime.gold_transfer_state = GoldTransferState::None;
    let state = prime.state;
    match state {
        PrimeState::Idle => {}
        PrimeState::PickupGold => pickup(game, idx)?,
        PrimeState::PutdownGold => putdown(game, idx)?,
        PrimeState::Build => build(game, idx)?,
    }
    unit::tick_movement(game, idx, PRIME_SPEED);
    Ok(())
}

/// Where the Prime's entity target stands relative to it.
enum Reach {
    /// Target is dead, missing, or not an entity
    Gone,
    /// Still walking
    OutOfRange,
    /// Live table index of a target within [`PRIME_RANGE`]
    InRange(usize),
}

fn entity_target_reach(game: &Game, idx: usize) -> Reach {
    let me = &game.entities[idx];
    let Some(tidx) = me
        .mobile()
        .and_then(|m| m.target())
        .and_then(|t| t.as_entity_ref())
        .and_then(|r| game.live_index(r))
        .filter(|&tidx| tidx != idx)
    else {
        return Reach::Gone;
    };
    if me.pos.distance(game.entities[tidx].pos) > PRIME_RANGE {
        return Reach::OutOfRange;
    }
    Reach::InRange(tidx)
}

fn pickup(game: &mut Game, idx: usize) -> Result<(), GameError> {
    let tidx = match entity_target_reach(game, idx) {
        Reach::Gone => return go_idle(game, idx),
        Reach::OutOfRange => return Ok(()),
        Reach::InRange(tidx) => tidx,
    };
    if !matches!(game.entities[tidx].kind, EntityKind::GoldPile(_)) {
        return go_idle(game, idx);
    }
    let (me, other) = game.pair_mut(idx, tidx);
    let (EntityKind::Prime(prime), EntityKind::GoldPile(pile)) = (&mut me.kind, &mut other.kind)
    else {
        return Ok(());
    };
    let amount = PRIME_TRANSFER_RATE.min(prime.hold_room());
    let moved = Coins::transfer_up_to(&mut pile.gold, &mut prime.held_gold, amount)?;
    if moved > 0 {
        prime.gold_transfer_state = GoldTransferState::Pulling;
    }
    if pile.gold.is_empty() || prime.hold_room() == 0 {
        prime.go_idle();
    }
    Ok(())
}

fn putdown(game: &mut Game, idx: usize) -> Result<(), GameError> {
    let Some(target) = game.entities[idx].mobile().and_then(|m| m.target()) else {
        return go_idle(game, idx);
    };
    match target {
        Target::Point(point) => place_pile(game, idx, point),
        Target::Entity(_) => match entity_target_reach(game, idx) {
            Reach::Gone => go_idle(game, idx),
            Reach::OutOfRange => Ok(()),
            Reach::InRange(tidx) => deposit(game, idx, tidx),
        },
    }
}

/// On arrival at a putdown point, start an empty pile there and retarget it.
fn place_pile(game: &mut Game, idx: usize, point: Vec2) -> Result<(), GameError> {
    let me = &game.entities[idx];
    if me.pos.distance(point) > PRIME_RANGE {
        return Ok(());
    }
    let held_nothing = matches!(&me.kind, EntityKind::Prime(p) if p.held_gold.is_empty());
    if held_nothing {
        return go_idle(game, idx);
    }
    match game.spawn(point, EntityKind::GoldPile(GoldPile::default())) {
        Some(pile) => {
            if let Some(prime) = prime_mut(game, idx) {
                prime.mobile.set_target(Target::Entity(pile), PRIME_RANGE);
            }
            Ok(())
        }
        None => go_idle(game, idx),
    }
}

/// Move held coins into a gold pile or an unfinished unit.
fn deposit(game: &mut Game, idx: usize, tidx: usize) -> Result<(), GameError> {
    let (me, other) = game.pair_mut(idx, tidx);
    let EntityKind::Prime(prime) = &mut me.kind else {
        return Ok(());
    };
    let (moved, finished) = if let EntityKind::GoldPile(pile) = &mut other.kind {
        let moved = Coins::transfer_up_to(&mut prime.held_gold, &mut pile.gold, PRIME_TRANSFER_RATE)?;
        (moved, false)
    } else if let Some(target_unit) = other.unit_mut() {
        let moved = target_unit.build(PRIME_TRANSFER_RATE, &mut prime.held_gold)?;
        (moved, target_unit.is_active())
    } else {
        (0, true)
    };
    if moved > 0 {
        prime.gold_transfer_state = GoldTransferState::Pushing;
    }
    if finished || prime.held_gold.is_empty() {
        prime.go_idle();
    }
    Ok(())
}

fn build(game: &mut Game, idx: usize) -> Result<(), GameError> {
    let Some(target) = game.entities[idx].mobile().and_then(|m| m.target()) else {
        return go_idle(game, idx);
    };
    match target {
        Target::Point(point) => place_building(game, idx, point),
        Target::Entity(_) => match entity_target_reach(game, idx) {
            Reach::Gone => go_idle(game, idx),
            Reach::OutOfRange => Ok(()),
            Reach::InRange(tidx) => {
                if game.entities[tidx].unit().is_none() {
                    return go_idle(game, idx);
                }
                deposit(game, idx, tidx)
            }
        },
    }
}

/// On arrival at the build site, spawn the building unbuilt and start funding it.
fn place_building(game: &mut Game, idx: usize, point: Vec2) -> Result<(), GameError> {
    let me = &game.entities[idx];
    if me.pos.distance(point) > PRIME_RANGE {
        return Ok(());
    }
    let (Some(owner), EntityKind::Prime(prime)) = (me.owner(), &me.kind) else {
        return Ok(());
    };
    let Some(kind) = prime.build_tag.and_then(|tag| EntityKind::new_unit(tag, owner)) else {
        return go_idle(game, idx);
    };
    match game.spawn(point, kind) {
        Some(site) => {
            if let Some(prime) = prime_mut(game, idx) {
                prime.build_tag = None;
                prime.mobile.set_target(Target::Entity(site), PRIME_RANGE);
            }
            Ok(())
        }
        None => go_idle(game, idx),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::rules::GATEWAY_COST;

    fn world_with_prime(held: CoinsInt) -> (Game, u16) {
        let mut game = Game::with_roster(["alice"]).unwrap();
        let mut prime = Prime::new(0);
        prime.mobile.unit.gold_invested = Coins::mint(PRIME_COST);
        prime.held_gold = Coins::mint(held);
        let id = game.spawn(Vec2::ZERO, EntityKind::Prime(prime)).unwrap();
        (game, id)
    }

    fn prime(game: &Game, id: u16) -> &Prime {
        match &game.entity(id).unwrap().kind {
            EntityKind::Prime(p) => p,
            _ => panic!("not a prime"),
        }
    }

    fn prime_cmd(game: &mut Game, id: u16, f: impl FnOnce(&mut Prime)) {
        match &mut game.entity_mut(id).unwrap().kind {
            EntityKind::Prime(p) => f(p),
            _ => panic!("not a prime"),
        }
    }

    #[test]
    fn test_pickup_walks_then_pulls_until_pile_empty() {
        let (mut game, id) = world_with_prime(0);
        let pile = game.mint_gold_pile(Vec2::new(30.0, 0.0), 3).unwrap();
        let total = game.total_coins();
        prime_cmd(&mut game, id, |p| p.cmd_pickup(Target::Entity(pile)));

        // 20 units to close at speed 2.
        for _ in 0..10 {
            game.iterate().unwrap();
        }
        assert_eq!(game.entity(id).unwrap().pos, Vec2::new(20.0, 0.0));
        assert!(prime(&game, id).held_gold.is_empty());

        for _ in 0..3 {
            game.iterate().unwrap();
        }
        assert_eq!(prime(&game, id).held_gold.balance(), 3);
        assert_eq!(prime(&game, id).state, PrimeState::Idle);
        assert_eq!(game.total_coins(), total);
        // The drained pile is gone.
        game.iterate().unwrap();
        assert!(game.entity(pile).is_none());
    }

    #[test]
    fn test_putdown_on_point_creates_pile() {
        let (mut game, id) = world_with_prime(4);
        prime_cmd(&mut game, id, |p| p.cmd_putdown(Target::Point(Vec2::new(5.0, 0.0))));

        let result = game.iterate().unwrap();
        assert_eq!(result.spawned().count(), 1);
        let pile = prime(&game, id).mobile.target().unwrap().as_entity_ref().unwrap();

        for _ in 0..4 {
            game.iterate().unwrap();
        }
        match &game.entity(pile).unwrap().kind {
            EntityKind::GoldPile(g) => assert_eq!(g.gold.balance(), 4),
            _ => panic!("not a pile"),
        }
        assert_eq!(prime(&game, id).state, PrimeState::Idle);
        assert_eq!(prime(&game, id).mobile.target(), None);
    }

    #[test]
    fn test_build_places_site_and_funds_it() {
        let (mut game, id) = world_with_prime(GATEWAY_COST + 5);
        prime_cmd(&mut game, id, |p| p.cmd_build(TypeTag::Gateway, Vec2::new(0.0, 5.0)));

        game.iterate().unwrap();
        let site = prime(&game, id).mobile.target().unwrap().as_entity_ref().unwrap();
        let site_entity = game.entity(site).unwrap();
        assert_eq!(site_entity.type_tag(), TypeTag::Gateway);
        assert_eq!(site_entity.owner(), Some(0));
        assert!(!site_entity.is_active());

        for _ in 0..GATEWAY_COST {
            game.iterate().unwrap();
        }
        assert!(game.entity(site).unwrap().is_active());
        assert_eq!(prime(&game, id).held_gold.balance(), 5);
        assert_eq!(prime(&game, id).state, PrimeState::Idle);
    }

    #[test]
    fn test_target_death_idles_prime() {
        let (mut game, id) = world_with_prime(0);
        let pile = game.mint_gold_pile(Vec2::new(100.0, 0.0), 3).unwrap();
        prime_cmd(&mut game, id, |p| p.cmd_pickup(Target::Entity(pile)));
        game.iterate().unwrap();
        assert!(game.kill(pile).unwrap());
        game.iterate().unwrap();
        assert_eq!(prime(&game, id).state, PrimeState::Idle);
        assert_eq!(prime(&game, id).mobile.target(), None);
    }

    #[test]
    fn test_invalid_state_byte_rejected() {
        assert_eq!(
            PrimeState::from_u8(4),
            Err(CodecError::InvalidEnum {
                field: "prime state",
                value: 4
            })
        );
    }
}

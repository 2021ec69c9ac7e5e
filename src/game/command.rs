//! Player Commands
//!
//! Commands are the only input to the simulation. Each one names the entity
//! it acts on; it is validated against the world at the moment it is applied
//! and either takes effect or is rejected without touching state.
//!
//! ## Wire Format
//!
//! ```text
//! u16 player | u8 kind | payload
//!
//! MoveTo    (1): u16 unit    | f32 x | f32 y
//! Pickup    (2): u16 prime   | target
//! Putdown   (3): u16 prime   | target
//! Build     (4): u16 prime   | u8 type tag | f32 x | f32 y
//! BuildUnit (5): u16 gateway | u8 type tag
//! Attack    (6): u16 fighter | u16 target
//! Kill      (7): u16 unit
//! ```

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::core::codec::{CodecError, Packer, Unpacker};
use crate::core::coins::CoinsInt;
use crate::core::vec2::Vec2;
use crate::game::entity::{Entity, EntityKind, EntityRef, TypeTag};
use crate::game::events::GameEventData;
use crate::game::player::PlayerId;
use crate::game::rules::GATEWAY_SPAWN_OFFSET;
use crate::game::target::Target;
use crate::game::world::{Game, GameError};

/// Wire kind of a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandKind {
    /// Walk somewhere
    MoveTo = 1,
    /// Pull coins from a pile
    Pickup = 2,
    /// Drop coins
    Putdown = 3,
    /// Place a building
    Build = 4,
    /// Produce a unit
    BuildUnit = 5,
    /// Shoot a unit
    Attack = 6,
    /// Destroy own unit
    Kill = 7,
}

impl CommandKind {
    /// Decode from the wire.
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            1 => Ok(CommandKind::MoveTo),
            2 => Ok(CommandKind::Pickup),
            3 => Ok(CommandKind::Putdown),
            4 => Ok(CommandKind::Build),
            5 => Ok(CommandKind::BuildUnit),
            6 => Ok(CommandKind::Attack),
            7 => Ok(CommandKind::Kill),
            other => Err(CodecError::UnknownCommandKind(other)),
        }
    }
}

/// An order for one entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Move a Prime or Fighter to a point
    MoveTo {
        /// Mobile unit
        unit: EntityRef,
        /// Destination
        point: Vec2,
    },
    /// Pull coins from a gold pile
    Pickup {
        /// Acting Prime
        prime: EntityRef,
        /// Gold pile
        target: Target,
    },
    /// Drop coins on a point, a pile or an unfinished unit
    Putdown {
        /// Acting Prime
        prime: EntityRef,
        /// Where to drop
        target: Target,
    },
    /// Place a building and fund it
    Build {
        /// Acting Prime
        prime: EntityRef,
        /// Building kind
        building: TypeTag,
        /// Site
        point: Vec2,
    },
    /// Produce a mobile unit from owner credit
    BuildUnit {
        /// Acting Gateway
        gateway: EntityRef,
        /// Unit kind
        unit: TypeTag,
    },
    /// Shoot an enemy unit
    Attack {
        /// Acting Fighter
        fighter: EntityRef,
        /// Victim
        target: EntityRef,
    },
    /// Destroy one of your own units
    Kill {
        /// Unit to destroy
        unit: EntityRef,
    },
}

impl Command {
    /// Wire kind.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::MoveTo { .. } => CommandKind::MoveTo,
            Command::Pickup { .. } => CommandKind::Pickup,
            Command::Putdown { .. } => CommandKind::Putdown,
            Command::Build { .. } => CommandKind::Build,
            Command::BuildUnit { .. } => CommandKind::BuildUnit,
            Command::Attack { .. } => CommandKind::Attack,
            Command::Kill { .. } => CommandKind::Kill,
        }
    }

    /// The entity the command acts on.
    pub fn actor(&self) -> EntityRef {
        match *self {
            Command::MoveTo { unit, .. } | Command::Kill { unit } => unit,
            Command::Pickup { prime, .. }
            | Command::Putdown { prime, .. }
            | Command::Build { prime, .. } => prime,
            Command::BuildUnit { gateway, .. } => gateway,
            Command::Attack { fighter, .. } => fighter,
        }
    }

    /// The world position the command names, if any.
    pub fn point(&self) -> Option<Vec2> {
        match *self {
            Command::MoveTo { point, .. } | Command::Build { point, .. } => Some(point),
            Command::Pickup { target, .. } | Command::Putdown { target, .. } => target.as_point(),
            Command::BuildUnit { .. } | Command::Attack { .. } | Command::Kill { .. } => None,
        }
    }

    /// Encode kind and payload.
    pub fn pack(&self, p: &mut Packer) {
        p.put_u8(self.kind() as u8);
        p.put_u16(self.actor());
        match self {
            Command::MoveTo { point, .. } => point.pack(p),
            Command::Pickup { target, .. } | Command::Putdown { target, .. } => target.pack(p),
            Command::Build { building, point, .. } => {
                p.put_tag(*building as u8);
                point.pack(p);
            }
            Command::BuildUnit { unit, .. } => p.put_tag(*unit as u8),
            Command::Attack { target, .. } => p.put_u16(*target),
            Command::Kill { .. } => {}
        }
    }

    /// Decode kind and payload.
    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        let kind = CommandKind::from_u8(u.get_u8()?)?;
        let actor = u.get_u16()?;
        Ok(match kind {
            CommandKind::MoveTo => Command::MoveTo {
                unit: actor,
                point: Vec2::unpack(u)?,
            },
            CommandKind::Pickup => Command::Pickup {
                prime: actor,
                target: Target::unpack(u)?,
            },
            CommandKind::Putdown => Command::Putdown {
                prime: actor,
                target: Target::unpack(u)?,
            },
            CommandKind::Build => Command::Build {
                prime: actor,
                building: TypeTag::from_u8(u.get_tag()?)?,
                point: Vec2::unpack(u)?,
            },
            CommandKind::BuildUnit => Command::BuildUnit {
                gateway: actor,
                unit: TypeTag::from_u8(u.get_tag()?)?,
            },
            CommandKind::Attack => Command::Attack {
                fighter: actor,
                target: u.get_u16()?,
            },
            CommandKind::Kill => Command::Kill { unit: actor },
        })
    }
}

/// A command with its issuing player.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerCommand {
    /// Issuer
    pub player: PlayerId,
    /// Order
    pub command: Command,
}

impl PlayerCommand {
    /// Pair a command with its issuer.
    pub fn new(player: PlayerId, command: Command) -> Self {
        Self { player, command }
    }

    /// Encode: player, then command.
    pub fn pack(&self, p: &mut Packer) {
        p.put_u16(self.player);
        self.command.pack(p);
    }

    /// Decode one player command.
    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        let player = u.get_u16()?;
        let command = Command::unpack(u)?;
        Ok(Self { player, command })
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Why a command was ignored. Rejections never change state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error, Serialize)]
pub enum CommandRejection {
    /// Issuer is not in the roster
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    /// Named entity is not alive
    #[error("no live entity {0}")]
    NoSuchEntity(EntityRef),

    /// Named entity belongs to someone else
    #[error("entity {entity} is not owned by player {player}")]
    NotOwner {
        /// Entity
        entity: EntityRef,
        /// Issuer
        player: PlayerId,
    },

    /// Named entity cannot perform this command
    #[error("entity {entity} is a {actual}, not a {expected}")]
    WrongKind {
        /// Entity
        entity: EntityRef,
        /// Kind required by the command
        expected: &'static str,
        /// Kind found
        actual: &'static str,
    },

    /// Named entity is still being built
    #[error("entity {0} is under construction")]
    UnderConstruction(EntityRef),

    /// Gateway is already producing a unit
    #[error("gateway {0} is already building a unit")]
    Busy(EntityRef),

    /// Owner cannot pay the full cost up front
    #[error("insufficient credit: need {needed}, have {available}")]
    InsufficientFunds {
        /// Cost
        needed: CoinsInt,
        /// Free credit
        available: CoinsInt,
    },

    /// Type tag cannot be produced by this command
    #[error("{0:?} cannot be built this way")]
    NotBuildable(TypeTag),

    /// Target is missing, friendly, or not a unit
    #[error("invalid target {0}")]
    InvalidTarget(EntityRef),

    /// Every entity ref is in use
    #[error("no free entity ref")]
    NoFreeEntityRef,

    /// Point has a NaN or infinite coordinate
    #[error("point is not finite")]
    NonFinitePoint,
}

/// Outcome of applying a command that did not take effect.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Ignored, state unchanged
    #[error(transparent)]
    Rejected(#[from] CommandRejection),

    /// Simulation cannot continue
    #[error(transparent)]
    Fatal(#[from] GameError),
}

/// Resolve the acting entity: alive, owned by `player`, construction done.
fn owned_active(
    game: &Game,
    player: PlayerId,
    r: EntityRef,
) -> Result<&Entity, CommandRejection> {
    let entity = owned(game, player, r)?;
    if !entity.is_active() {
        return Err(CommandRejection::UnderConstruction(r));
    }
    Ok(entity)
}

fn owned(game: &Game, player: PlayerId, r: EntityRef) -> Result<&Entity, CommandRejection> {
    let entity = game.entity(r).ok_or(CommandRejection::NoSuchEntity(r))?;
    if entity.owner() != Some(player) {
        return Err(CommandRejection::NotOwner { entity: r, player });
    }
    Ok(entity)
}

fn wrong_kind(entity: &Entity, expected: &'static str) -> CommandRejection {
    CommandRejection::WrongKind {
        entity: entity.id,
        expected,
        actual: entity.type_name(),
    }
}

impl Game {
    /// Apply one command from `player`.
    pub fn apply_command(&mut self, player: PlayerId, command: &Command) -> Result<(), CommandError> {
        if self.player(player).is_none() {
            return Err(CommandRejection::UnknownPlayer(player).into());
        }
        if command.point().is_some_and(|p| !p.is_finite()) {
            return Err(CommandRejection::NonFinitePoint.into());
        }
        match *command {
            Command::MoveTo { unit, point } => {
                let entity = owned_active(self, player, unit)?;
                if entity.mobile().is_none() {
                    return Err(wrong_kind(entity, "mobile unit").into());
                }
                match self.entity_mut(unit).map(|e| &mut e.kind) {
                    Some(EntityKind::Prime(p)) => p.cmd_move(point),
                    Some(EntityKind::Fighter(f)) => f.cmd_move(point),
                    _ => {}
                }
            }
            Command::Pickup { prime, target } | Command::Putdown { prime, target } => {
                let pickup = matches!(command, Command::Pickup { .. });
                let entity = owned_active(self, player, prime)?;
                let EntityKind::Prime(_) = entity.kind else {
                    return Err(wrong_kind(entity, "Prime").into());
                };
                if let Target::Entity(r) = target {
                    let target_entity = self.entity(r).ok_or(CommandRejection::InvalidTarget(r))?;
                    let is_pile = matches!(target_entity.kind, EntityKind::GoldPile(_));
                    if r == prime || (pickup && !is_pile) || (!is_pile && target_entity.unit().is_none()) {
                        return Err(CommandRejection::InvalidTarget(r).into());
                    }
                } else if pickup {
                    return Err(CommandRejection::InvalidTarget(0).into());
                }
                if let Some(EntityKind::Prime(p)) = self.entity_mut(prime).map(|e| &mut e.kind) {
                    if pickup {
                        p.cmd_pickup(target);
                    } else {
                        p.cmd_putdown(target);
                    }
                }
            }
            Command::Build { prime, building, point } => {
                let entity = owned_active(self, player, prime)?;
                let EntityKind::Prime(_) = entity.kind else {
                    return Err(wrong_kind(entity, "Prime").into());
                };
                if !building.is_building() {
                    return Err(CommandRejection::NotBuildable(building).into());
                }
                if let Some(EntityKind::Prime(p)) = self.entity_mut(prime).map(|e| &mut e.kind) {
                    p.cmd_build(building, point);
                }
            }
            Command::BuildUnit { gateway, unit } => self.build_unit(player, gateway, unit)?,
            Command::Attack { fighter, target } => {
                let entity = owned_active(self, player, fighter)?;
                let EntityKind::Fighter(_) = entity.kind else {
                    return Err(wrong_kind(entity, "Fighter").into());
                };
                let valid = self
                    .entity(target)
                    .and_then(Entity::owner)
                    .is_some_and(|owner| owner != player);
                if !valid {
                    return Err(CommandRejection::InvalidTarget(target).into());
                }
                if let Some(EntityKind::Fighter(f)) = self.entity_mut(fighter).map(|e| &mut e.kind) {
                    f.cmd_attack(target);
                }
            }
            Command::Kill { unit } => {
                owned(self, player, unit)?;
                self.kill(unit)?;
            }
        }
        Ok(())
    }

    fn build_unit(&mut self, player: PlayerId, gateway: EntityRef, tag: TypeTag) -> Result<(), CommandError> {
        let entity = owned_active(self, player, gateway)?;
        let EntityKind::Gateway(g) = &entity.kind else {
            return Err(wrong_kind(entity, "Gateway").into());
        };
        if g.building_unit.is_some_and(|r| self.entity(r).is_some()) {
            return Err(CommandRejection::Busy(gateway).into());
        }
        if !tag.is_mobile_unit() {
            return Err(CommandRejection::NotBuildable(tag).into());
        }
        let Some(cost) = tag.cost() else {
            return Err(CommandRejection::NotBuildable(tag).into());
        };
        let available = self.player(player).map_or(0, |p| p.credit.balance());
        if available < cost {
            return Err(CommandRejection::InsufficientFunds { needed: cost, available }.into());
        }
        let spawn_pos = entity.pos + Vec2::new(GATEWAY_SPAWN_OFFSET.0, GATEWAY_SPAWN_OFFSET.1);
        let kind = EntityKind::new_unit(tag, player).ok_or(CommandRejection::NotBuildable(tag))?;
        let unit = self.spawn(spawn_pos, kind).ok_or(CommandRejection::NoFreeEntityRef)?;
        if let Some(EntityKind::Gateway(g)) = self.entity_mut(gateway).map(|e| &mut e.kind) {
            g.building_unit = Some(unit);
        }
        Ok(())
    }

    /// Apply a frame's commands in order. Rejections are logged and recorded
    /// as events; anything fatal stops the frame.
    pub fn apply_commands(&mut self, commands: &[PlayerCommand]) -> Result<(), GameError> {
        for cmd in commands {
            match self.apply_command(cmd.player, &cmd.command) {
                Ok(()) => {}
                Err(CommandError::Rejected(reason)) => {
                    debug!(frame = self.frame, player = cmd.player, command = ?cmd.command, %reason, "command rejected");
                    self.push_event(GameEventData::CommandRejected {
                        player: cmd.player,
                        reason,
                    });
                }
                Err(CommandError::Fatal(e)) => return Err(e),
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coins::Coins;
    use crate::game::fighter::Fighter;
    use crate::game::gateway::Gateway;
    use crate::game::prime::{Prime, PrimeState};
    use crate::game::rules::{GATEWAY_COST, PRIME_COST};

    fn built_gateway(owner: PlayerId) -> EntityKind {
        let mut g = Gateway::new(owner);
        g.building.unit.gold_invested = Coins::mint(GATEWAY_COST);
        EntityKind::Gateway(g)
    }

    fn built_prime(owner: PlayerId) -> EntityKind {
        let mut p = Prime::new(owner);
        p.mobile.unit.gold_invested = Coins::mint(PRIME_COST);
        EntityKind::Prime(p)
    }

    fn rejection(result: Result<(), CommandError>) -> CommandRejection {
        match result {
            Err(CommandError::Rejected(r)) => r,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_command_wire_layout() {
        let cmd = PlayerCommand::new(
            1,
            Command::Build {
                prime: 0x0203,
                building: TypeTag::Gateway,
                point: Vec2::new(1.0, 2.0),
            },
        );
        let mut p = Packer::new();
        cmd.pack(&mut p);
        let bytes = p.into_bytes();
        assert_eq!(&bytes[..6], &[0, 1, 4, 2, 3, 4]);
        assert_eq!(bytes.len(), 2 + 1 + 2 + 1 + 8);

        let mut u = Unpacker::new(&bytes);
        assert_eq!(PlayerCommand::unpack(&mut u).unwrap(), cmd);
        u.finish().unwrap();
    }

    #[test]
    fn test_unknown_command_kind_is_fatal() {
        let bytes = [0, 0, 99, 0, 1];
        assert_eq!(
            PlayerCommand::unpack(&mut Unpacker::new(&bytes)),
            Err(CodecError::UnknownCommandKind(99))
        );
    }

    #[test]
    fn test_build_unit_spawns_at_offset() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        game.mint_to_player(0, 100).unwrap();
        let gw = game.spawn(Vec2::new(10.0, 10.0), built_gateway(0)).unwrap();

        game.apply_command(0, &Command::BuildUnit { gateway: gw, unit: TypeTag::Prime })
            .unwrap();
        let unit = game.entity(2).unwrap();
        assert_eq!(unit.pos, Vec2::new(10.0, 25.0));
        assert_eq!(unit.owner(), Some(0));
        assert!(!unit.is_active());

        // Busy while the first unit is in production.
        assert_eq!(
            rejection(game.apply_command(0, &Command::BuildUnit { gateway: gw, unit: TypeTag::Prime })),
            CommandRejection::Busy(gw)
        );
        // Under-construction units take no orders.
        assert_eq!(
            rejection(game.apply_command(0, &Command::MoveTo { unit: 2, point: Vec2::ZERO })),
            CommandRejection::UnderConstruction(2)
        );
    }

    #[test]
    fn test_build_unit_requires_full_credit() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        game.mint_to_player(0, PRIME_COST - 1).unwrap();
        let gw = game.spawn(Vec2::ZERO, built_gateway(0)).unwrap();
        let before = game.pack().unwrap();

        assert_eq!(
            rejection(game.apply_command(0, &Command::BuildUnit { gateway: gw, unit: TypeTag::Prime })),
            CommandRejection::InsufficientFunds {
                needed: PRIME_COST,
                available: PRIME_COST - 1
            }
        );
        assert_eq!(
            rejection(game.apply_command(0, &Command::BuildUnit { gateway: gw, unit: TypeTag::Gateway })),
            CommandRejection::NotBuildable(TypeTag::Gateway)
        );
        assert_eq!(game.pack().unwrap(), before);
    }

    #[test]
    fn test_ownership_and_friendly_fire() {
        let mut game = Game::with_roster(["alice", "bob"]).unwrap();
        let prime = game.spawn(Vec2::ZERO, built_prime(0)).unwrap();
        let mut f = Fighter::new(0);
        f.mobile.unit.gold_invested = Coins::mint(f.mobile.unit.total_cost());
        let fighter = game.spawn(Vec2::ZERO, EntityKind::Fighter(f)).unwrap();

        assert_eq!(
            rejection(game.apply_command(1, &Command::Kill { unit: prime })),
            CommandRejection::NotOwner { entity: prime, player: 1 }
        );
        assert_eq!(
            rejection(game.apply_command(0, &Command::Attack { fighter, target: prime })),
            CommandRejection::InvalidTarget(prime)
        );
        assert_eq!(
            rejection(game.apply_command(0, &Command::Attack { fighter: prime, target: fighter })),
            CommandRejection::WrongKind { entity: prime, expected: "Fighter", actual: "Prime" }
        );
        assert_eq!(
            rejection(game.apply_command(7, &Command::Kill { unit: prime })),
            CommandRejection::UnknownPlayer(7)
        );
    }

    #[test]
    fn test_pickup_sets_state() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        let prime = game.spawn(Vec2::ZERO, built_prime(0)).unwrap();
        let pile = game.mint_gold_pile(Vec2::new(50.0, 0.0), 10).unwrap();
        assert_eq!(
            rejection(game.apply_command(0, &Command::Pickup { prime, target: Target::Entity(prime) })),
            CommandRejection::InvalidTarget(prime)
        );
        game.apply_command(0, &Command::Pickup { prime, target: Target::Entity(pile) })
            .unwrap();
        match &game.entity(prime).unwrap().kind {
            EntityKind::Prime(p) => assert_eq!(p.state, PrimeState::PickupGold),
            _ => panic!("not a prime"),
        }
    }

    #[test]
    fn test_non_finite_points_rejected() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        let prime = game.spawn(Vec2::ZERO, built_prime(0)).unwrap();
        let before = game.pack().unwrap();

        let bad = [
            Command::MoveTo { unit: prime, point: Vec2::new(f32::NAN, 0.0) },
            Command::Build { prime, building: TypeTag::Gateway, point: Vec2::new(0.0, f32::INFINITY) },
            Command::Putdown { prime, target: Target::Point(Vec2::new(f32::NEG_INFINITY, 1.0)) },
            Command::Pickup { prime, target: Target::Point(Vec2::new(f32::NAN, f32::NAN)) },
        ];
        for cmd in &bad {
            assert_eq!(rejection(game.apply_command(0, cmd)), CommandRejection::NonFinitePoint);
        }
        assert_eq!(game.pack().unwrap(), before);
    }

    #[test]
    fn test_rejections_become_events() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        game.apply_commands(&[PlayerCommand::new(0, Command::Kill { unit: 42 })])
            .unwrap();
        let events = game.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].data,
            GameEventData::CommandRejected {
                player: 0,
                reason: CommandRejection::NoSuchEntity(42)
            }
        );
    }
}

//! Fighter (combat unit)
//!
//! A Fighter chases its target to within [`FIGHTER_RANGE`] and fires once
//! every [`FIGHTER_SHOT_COOLDOWN`] frames. A target reduced to zero health
//! dies on the spot, in the same frame.

use crate::core::codec::{CodecError, Packer, Unpacker};
use crate::core::vec2::Vec2;
use crate::game::entity::{EntityKind, EntityRef};
use crate::game::player::PlayerId;
use crate::game::rules::{
    FIGHTER_COST, FIGHTER_DAMAGE, FIGHTER_MAX_HEALTH, FIGHTER_RANGE, FIGHTER_SHOT_COOLDOWN,
    FIGHTER_SPEED,
};
use crate::game::target::Target;
use crate::game::unit::{self, MobileUnit};
use crate::game::world::{Game, GameError};

/// What a Fighter is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FighterState {
    /// Nothing, or just moving
    Idle = 0,
    /// Chasing and shooting a unit
    AttackingUnit = 1,
}

impl FighterState {
    /// Decode from the wire.
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(FighterState::Idle),
            1 => Ok(FighterState::AttackingUnit),
            value => Err(CodecError::InvalidEnum {
                field: "fighter state",
                value,
            }),
        }
    }
}

/// Which side a shot came from. Presentation only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ShotSide {
    /// No shot
    None = 0,
    /// Right cannon
    Right = 1,
    /// Left cannon
    Left = 2,
}

impl ShotSide {
    /// Decode from the wire.
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(ShotSide::None),
            1 => Ok(ShotSide::Right),
            2 => Ok(ShotSide::Left),
            value => Err(CodecError::InvalidEnum {
                field: "shot side",
                value,
            }),
        }
    }

    fn alternate(self) -> Self {
        match self {
            ShotSide::Left => ShotSide::Right,
            ShotSide::None | ShotSide::Right => ShotSide::Left,
        }
    }
}

/// Combat unit.
#[derive(Debug, PartialEq)]
pub struct Fighter {
    /// Mobile unit layer
    pub mobile: MobileUnit,
    /// Current activity
    pub state: FighterState,
    /// Frames until the next shot is allowed
    pub shoot_cooldown: u16,
    /// Side that fired this frame, if any
    pub animate_shot: ShotSide,
    /// Side that fired last
    pub last_shot: ShotSide,
}

impl Fighter {
    /// A new, unbuilt Fighter.
    pub fn new(owner_id: PlayerId) -> Self {
        Self {
            mobile: MobileUnit::new(owner_id, FIGHTER_COST, FIGHTER_MAX_HEALTH),
            state: FighterState::Idle,
            shoot_cooldown: 0,
            animate_shot: ShotSide::None,
            last_shot: ShotSide::None,
        }
    }

    /// Walk to a point.
    pub fn cmd_move(&mut self, point: Vec2) {
        self.go_idle();
        self.mobile.set_target(Target::Point(point), 0.0);
    }

    /// Chase and shoot the unit `target`.
    pub fn cmd_attack(&mut self, target: EntityRef) {
        self.state = FighterState::AttackingUnit;
        self.mobile.set_target(Target::Entity(target), FIGHTER_RANGE);
    }

    /// Stop whatever the Fighter is doing.
    pub fn go_idle(&mut self) {
        self.state = FighterState::Idle;
        self.mobile.clear_target();
    }

    /// Encode all layers.
    pub fn pack(&self, p: &mut Packer) {
        self.mobile.pack(p);
        p.put_u8(self.state as u8);
        p.put_u16(self.shoot_cooldown);
        p.put_u8(self.animate_shot as u8);
        p.put_u8(self.last_shot as u8);
    }

    /// Decode all layers.
    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        let mobile = MobileUnit::unpack(u, FIGHTER_COST, FIGHTER_MAX_HEALTH)?;
        let state = FighterState::from_u8(u.get_u8()?)?;
        let shoot_cooldown = u.get_u16()?;
        let animate_shot = ShotSide::from_u8(u.get_u8()?)?;
        let last_shot = ShotSide::from_u8(u.get_u8()?)?;
        Ok(Self {
            mobile,
            state,
            shoot_cooldown,
            animate_shot,
            last_shot,
        })
    }
}

fn fighter_mut(game: &mut Game, idx: usize) -> Option<&mut Fighter> {
    match &mut game.entities[idx].kind {
        EntityKind::Fighter(f) => Some(f),
        _ => None,
    }
}

/// Advance the Fighter at `idx` by one frame.
pub(crate) fn tick(game: &mut Game, idx: usize) -> Result<(), GameError> {
    let Some(fighter) = fighter_mut(game, idx) else {
        return Ok(());
    };
    fighter.animate_shot = ShotSide::None;
    fighter.shoot_cooldown = fighter.shoot_cooldown.saturating_sub(1);

    if fighter.state == FighterState::AttackingUnit {
        let ready = fighter.shoot_cooldown == 0;
        let target = fighter
            .mobile
            .target()
            .and_then(|t| t.as_entity_ref())
            .and_then(|r| game.live_index(r))
            .filter(|&t| t != idx && game.entities[t].unit().is_some());
        match target {
            None => {
                if let Some(fighter) = fighter_mut(game, idx) {
                    fighter.go_idle();
                }
            }
            Some(t) => {
                let in_range = game.entities[idx].pos.distance(game.entities[t].pos) <= FIGHTER_RANGE;
                if ready && in_range {
                    shoot(game, idx, t)?;
                }
            }
        }
    }

    unit::tick_movement(game, idx, FIGHTER_SPEED);
    Ok(())
}

fn shoot(game: &mut Game, idx: usize, target: usize) -> Result<(), GameError> {
    if let Some(fighter) = fighter_mut(game, idx) {
        let side = fighter.last_shot.alternate();
        fighter.animate_shot = side;
        fighter.last_shot = side;
        fighter.shoot_cooldown = FIGHTER_SHOT_COOLDOWN;
    }
    let destroyed = game.entities[target]
        .unit_mut()
        .is_some_and(|u| u.take_hit(FIGHTER_DAMAGE));
    if destroyed {
        game.kill_at(target)?;
    }
    Ok(())
}

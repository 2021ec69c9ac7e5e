//! Game Rules
//!
//! Per-kind stats and rates. Every participant must use the same table, so
//! these are compile-time constants rather than configuration.

use crate::core::coins::CoinsInt;

// =============================================================================
// PLAYERS
// =============================================================================

/// Slot size of a player address on the wire.
pub const ADDRESS_SLOT_LEN: usize = 50;

// =============================================================================
// PRIME (worker)
// =============================================================================

/// Construction cost of a Prime.
pub const PRIME_COST: CoinsInt = 50;

/// Max health of a Prime.
pub const PRIME_MAX_HEALTH: u16 = 10;

/// Distance a Prime moves per frame.
pub const PRIME_SPEED: f32 = 2.0;

/// Distance at which a Prime can pick up, put down and build.
pub const PRIME_RANGE: f32 = 10.0;

/// Coins moved per frame by pickup, putdown and build.
pub const PRIME_TRANSFER_RATE: CoinsInt = 1;

/// Coins a Prime can carry.
pub const PRIME_MAX_HELD_GOLD: CoinsInt = 500;

// =============================================================================
// FIGHTER
// =============================================================================

/// Construction cost of a Fighter.
pub const FIGHTER_COST: CoinsInt = 100;

/// Max health of a Fighter.
pub const FIGHTER_MAX_HEALTH: u16 = 15;

/// Distance a Fighter moves per frame.
pub const FIGHTER_SPEED: f32 = 2.0;

/// Firing range of a Fighter.
pub const FIGHTER_RANGE: f32 = 40.0;

/// Damage per shot.
pub const FIGHTER_DAMAGE: u16 = 1;

/// Frames between shots.
pub const FIGHTER_SHOT_COOLDOWN: u16 = 20;

// =============================================================================
// GATEWAY
// =============================================================================

/// Construction cost of a Gateway.
pub const GATEWAY_COST: CoinsInt = 200;

/// Max health of a Gateway.
pub const GATEWAY_MAX_HEALTH: u16 = 30;

/// Coins per frame a Gateway invests into the unit it is building.
pub const GATEWAY_BUILD_RATE: CoinsInt = 1;

/// Offset from the Gateway at which new units appear.
pub const GATEWAY_SPAWN_OFFSET: (f32, f32) = (0.0, 15.0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_costs_are_reachable_by_build_rates() {
        // Construction completes in a whole number of frames.
        assert_eq!(PRIME_COST % GATEWAY_BUILD_RATE, 0);
        assert_eq!(FIGHTER_COST % GATEWAY_BUILD_RATE, 0);
        assert_eq!(GATEWAY_COST % PRIME_TRANSFER_RATE, 0);
        assert!(PRIME_MAX_HELD_GOLD >= PRIME_TRANSFER_RATE);
    }
}

//! Players
//!
//! A player is identified on the wire by its index in the roster. The
//! address is an opaque string that fits a fixed slot.

use serde::Serialize;
use thiserror::Error;

use crate::core::codec::{CodecError, Packer, Unpacker};
use crate::core::coins::{Coins, CoinsInt};
use crate::game::rules::ADDRESS_SLOT_LEN;

/// Index of a player in the roster.
pub type PlayerId = u16;

/// A participant and their free credit.
#[derive(Debug, PartialEq)]
pub struct Player {
    address: String,
    /// Coins not invested in anything; Gateways build from this
    pub credit: Coins,
}

impl Player {
    /// Create a player with no credit.
    ///
    /// Fails if the address does not fit the wire slot or contains NUL.
    pub fn new(address: impl Into<String>) -> Result<Self, CodecError> {
        let address = address.into();
        if address.len() > ADDRESS_SLOT_LEN {
            return Err(CodecError::StringTooLong {
                len: address.len(),
                max: ADDRESS_SLOT_LEN,
            });
        }
        if address.contains('\0') {
            return Err(CodecError::InvalidString);
        }
        Ok(Self {
            address,
            credit: Coins::zero(),
        })
    }

    /// The player's address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Encode: address slot, credit.
    pub fn pack(&self, p: &mut Packer) -> Result<(), CodecError> {
        p.put_str(&self.address, ADDRESS_SLOT_LEN)?;
        self.credit.pack(p);
        Ok(())
    }

    /// Decode one player.
    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        let address = u.get_str(ADDRESS_SLOT_LEN)?;
        let credit = Coins::unpack(u)?;
        Ok(Self { address, credit })
    }
}

// =============================================================================
// BALANCE UPDATES
// =============================================================================

/// An external deposit into, or withdrawal from, a player's credit.
///
/// ```text
/// address (50-byte slot) | u32 amount | u8 is_deposit
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceUpdate {
    /// Player address
    pub address: String,
    /// Amount in smallest units
    pub amount: CoinsInt,
    /// Deposit if true, withdrawal otherwise
    pub is_deposit: bool,
}

impl BalanceUpdate {
    /// Credit `amount` to `address`.
    pub fn deposit(address: impl Into<String>, amount: CoinsInt) -> Self {
        Self {
            address: address.into(),
            amount,
            is_deposit: true,
        }
    }

    /// Debit `amount` from `address`.
    pub fn withdrawal(address: impl Into<String>, amount: CoinsInt) -> Self {
        Self {
            address: address.into(),
            amount,
            is_deposit: false,
        }
    }

    /// Encode: address slot, amount, direction.
    pub fn pack(&self, p: &mut Packer) -> Result<(), CodecError> {
        p.put_str(&self.address, ADDRESS_SLOT_LEN)?;
        p.put_u32(self.amount);
        p.put_bool(self.is_deposit);
        Ok(())
    }

    /// Decode one update.
    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            address: u.get_str(ADDRESS_SLOT_LEN)?,
            amount: u.get_u32()?,
            is_deposit: u.get_bool("is_deposit")?,
        })
    }
}

/// Why a balance update was ignored.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
pub enum BalanceRejection {
    /// No player has this address
    #[error("unknown address {0:?}")]
    UnknownAddress(String),

    /// Withdrawal larger than the player's credit
    #[error("player {player} cannot withdraw {amount}, has {available}")]
    InsufficientFunds {
        /// Player
        player: PlayerId,
        /// Requested
        amount: CoinsInt,
        /// Free credit
        available: CoinsInt,
    },

    /// Deposit would overflow the player's credit
    #[error("player {player} cannot receive {amount} on top of {available}")]
    Overflow {
        /// Player
        player: PlayerId,
        /// Requested
        amount: CoinsInt,
        /// Free credit
        available: CoinsInt,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_must_fit_slot() {
        let long = "x".repeat(ADDRESS_SLOT_LEN + 1);
        assert!(matches!(Player::new(long), Err(CodecError::StringTooLong { .. })));
        assert!(Player::new("x".repeat(ADDRESS_SLOT_LEN)).is_ok());
        assert_eq!(Player::new("a\0b"), Err(CodecError::InvalidString));
    }

    #[test]
    fn test_player_wire_size() {
        let mut player = Player::new("0xabc").unwrap();
        player.credit = Coins::mint(1234);
        let mut p = Packer::new();
        player.pack(&mut p).unwrap();
        let bytes = p.into_bytes();
        assert_eq!(bytes.len(), ADDRESS_SLOT_LEN + 4);

        let mut u = Unpacker::new(&bytes);
        assert_eq!(Player::unpack(&mut u).unwrap(), player);
        u.finish().unwrap();
    }

    #[test]
    fn test_balance_update_wire_layout() {
        let update = BalanceUpdate::withdrawal("0xabc", 0x0102);
        let mut p = Packer::new();
        update.pack(&mut p).unwrap();
        let bytes = p.into_bytes();
        assert_eq!(bytes.len(), ADDRESS_SLOT_LEN + 5);
        assert_eq!(&bytes[..5], b"0xabc");
        assert_eq!(&bytes[ADDRESS_SLOT_LEN..], &[0, 0, 1, 2, 0]);

        let mut u = Unpacker::new(&bytes);
        assert_eq!(BalanceUpdate::unpack(&mut u).unwrap(), update);
        u.finish().unwrap();

        let mut bad = bytes.clone();
        bad[ADDRESS_SLOT_LEN + 4] = 2;
        assert!(matches!(
            BalanceUpdate::unpack(&mut Unpacker::new(&bad)),
            Err(CodecError::InvalidEnum { field: "is_deposit", value: 2 })
        ));
    }
}

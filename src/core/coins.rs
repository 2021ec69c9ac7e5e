//! Currency Ledger
//!
//! `Coins` is the only representation of value in the simulation.
//!
//! ## Rules
//!
//! - A `Coins` is not `Copy` or `Clone`. Value moves, it is never duplicated.
//! - The only way to take value out of a ledger is a withdraw, which hands
//!   back a `Coins` that must be deposited somewhere else.
//! - Arithmetic never wraps. Overflow is an error, not a clamp.
//! - New value only comes from [`Coins::mint`], which is crate-private and
//!   called from the world's genesis operations and external deposits.
//!   Value only leaves through [`Coins::burn`], for external withdrawals.

use std::fmt;
use thiserror::Error;

use super::codec::{CodecError, Packer, Unpacker};

/// Raw amount in the smallest denomination (cents).
pub type CoinsInt = u32;

/// Smallest units per displayed dollar.
pub const UNITS_PER_DOLLAR: CoinsInt = 100;

/// Ledger arithmetic errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Sum exceeds the representable maximum.
    #[error("coin overflow: {balance} + {amount} exceeds u32::MAX")]
    Overflow {
        /// Balance before the failed operation.
        balance: CoinsInt,
        /// Amount that could not be added.
        amount: CoinsInt,
    },

    /// Exact withdraw requested more than the ledger holds.
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Amount requested.
        requested: CoinsInt,
        /// Amount held.
        available: CoinsInt,
    },
}

/// An amount of value, either held by a ledger or in flight between two.
#[derive(Debug, Default, PartialEq, Eq)]
#[must_use = "coins that are dropped are destroyed value"]
pub struct Coins {
    balance: CoinsInt,
}

impl Coins {
    /// An empty ledger.
    pub const fn zero() -> Self {
        Self { balance: 0 }
    }

    /// Create value out of nothing.
    pub(crate) const fn mint(amount: CoinsInt) -> Self {
        Self { balance: amount }
    }

    /// Destroy an in-flight amount, returning how much was destroyed.
    pub(crate) fn burn(self) -> CoinsInt {
        self.balance
    }

    /// Current balance.
    #[inline]
    pub fn balance(&self) -> CoinsInt {
        self.balance
    }

    /// True if the balance is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.balance == 0
    }

    /// Merge two amounts. Fails rather than wrapping.
    pub fn add(a: Coins, b: Coins) -> Result<Coins, LedgerError> {
        let balance = a.balance.checked_add(b.balance).ok_or(LedgerError::Overflow {
            balance: a.balance,
            amount: b.balance,
        })?;
        Ok(Coins { balance })
    }

    /// Remove up to `amount`, returning what was actually removed.
    pub fn try_withdraw(&mut self, amount: CoinsInt) -> Coins {
        let taken = amount.min(self.balance);
        self.balance -= taken;
        Coins { balance: taken }
    }

    /// Remove exactly `amount` or nothing.
    pub fn withdraw_exact(&mut self, amount: CoinsInt) -> Result<Coins, LedgerError> {
        if amount > self.balance {
            return Err(LedgerError::InsufficientFunds {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(Coins { balance: amount })
    }

    /// Remove everything.
    pub fn withdraw_all(&mut self) -> Coins {
        std::mem::take(self)
    }

    /// Absorb an in-flight amount.
    ///
    /// On overflow the ledger is left unchanged and the error is fatal for
    /// the caller: the in-flight value cannot be placed anywhere.
    pub fn deposit(&mut self, coins: Coins) -> Result<(), LedgerError> {
        self.balance = self
            .balance
            .checked_add(coins.balance)
            .ok_or(LedgerError::Overflow {
                balance: self.balance,
                amount: coins.balance,
            })?;
        Ok(())
    }

    /// Move up to `amount` from `from` into `to`; returns the amount moved.
    pub fn transfer_up_to(
        from: &mut Coins,
        to: &mut Coins,
        amount: CoinsInt,
    ) -> Result<CoinsInt, LedgerError> {
        let headroom = CoinsInt::MAX - to.balance;
        let in_flight = from.try_withdraw(amount.min(headroom));
        let moved = in_flight.balance();
        to.deposit(in_flight)?;
        Ok(moved)
    }

    /// Encode as a u32.
    pub fn pack(&self, p: &mut Packer) {
        p.put_u32(self.balance);
    }

    /// Restore a ledger that was packed by a peer.
    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        Ok(Self::mint(u.get_u32()?))
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${}.{:02}",
            self.balance / UNITS_PER_DOLLAR,
            self.balance % UNITS_PER_DOLLAR
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_checked() {
        let sum = Coins::add(Coins::mint(40), Coins::mint(2)).unwrap();
        assert_eq!(sum.balance(), 42);
    }

    #[test]
    fn test_add_overflow_fails() {
        let result = Coins::add(Coins::mint(CoinsInt::MAX), Coins::mint(1));
        assert_eq!(
            result,
            Err(LedgerError::Overflow { balance: CoinsInt::MAX, amount: 1 })
        );
    }

    #[test]
    fn test_partial_withdraw() {
        let mut pile = Coins::mint(30);
        let taken = pile.try_withdraw(50);
        assert_eq!(taken.balance(), 30);
        assert!(pile.is_empty());

        let nothing = pile.try_withdraw(5);
        assert_eq!(nothing.balance(), 0);
    }

    #[test]
    fn test_exact_withdraw() {
        let mut credit = Coins::mint(10);
        assert_eq!(
            credit.withdraw_exact(11),
            Err(LedgerError::InsufficientFunds { requested: 11, available: 10 })
        );
        assert_eq!(credit.balance(), 10);
        assert_eq!(credit.withdraw_exact(10).unwrap().balance(), 10);
        assert!(credit.is_empty());
    }

    #[test]
    fn test_deposit_overflow_leaves_ledger_unchanged() {
        let mut full = Coins::mint(CoinsInt::MAX - 1);
        assert!(full.deposit(Coins::mint(2)).is_err());
        assert_eq!(full.balance(), CoinsInt::MAX - 1);
    }

    #[test]
    fn test_transfer_conserves() {
        let mut a = Coins::mint(100);
        let mut b = Coins::mint(5);
        let moved = Coins::transfer_up_to(&mut a, &mut b, 30).unwrap();
        assert_eq!(moved, 30);
        assert_eq!(a.balance() + b.balance(), 105);

        let moved = Coins::transfer_up_to(&mut a, &mut b, 500).unwrap();
        assert_eq!(moved, 70);
        assert!(a.is_empty());
        assert_eq!(b.balance(), 105);
    }

    #[test]
    fn test_transfer_respects_destination_headroom() {
        let mut a = Coins::mint(10);
        let mut b = Coins::mint(CoinsInt::MAX - 3);
        let moved = Coins::transfer_up_to(&mut a, &mut b, 10).unwrap();
        assert_eq!(moved, 3);
        assert_eq!(a.balance(), 7);
        assert_eq!(b.balance(), CoinsInt::MAX);
    }

    #[test]
    fn test_display_as_dollars() {
        assert_eq!(Coins::mint(0).to_string(), "$0.00");
        assert_eq!(Coins::mint(5).to_string(), "$0.05");
        assert_eq!(Coins::mint(12_345).to_string(), "$123.45");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - ACCOUNTS
//
// Plain balance accounts. An account is created lazily on first reference
// and never deleted. Escrow delay and multisign requirements are mutually
// exclusive, enforced at modification time.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use sgy_core::{Address, TxHash};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub balance: i64,
    pub address: Address,
    /// Escrow mode: > 0 means every outgoing transaction waits this many
    /// blocks past its target height before execution.
    pub transaction_delay: i64,
    /// Multisign mode: > 0 means outgoing transactions need this many
    /// distinct approvals from `multi_sign_addresses`.
    pub multi_sign_number: u8,
    pub multi_sign_addresses: Vec<Address>,
    pub sent_tx_hashes: Vec<TxHash>,
    pub received_tx_hashes: Vec<TxHash>,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self {
            balance: 0,
            address,
            transaction_delay: 0,
            multi_sign_number: 0,
            multi_sign_addresses: Vec::new(),
            sent_tx_hashes: Vec::new(),
            received_tx_hashes: Vec::new(),
        }
    }

    pub fn is_escrow(&self) -> bool {
        self.transaction_delay > 0
    }

    pub fn is_multi_sign(&self) -> bool {
        self.multi_sign_number > 0
    }

    /// Enter (or leave, with 0) escrow mode. Rejected while multisign is
    /// configured — an account is one or the other, never both.
    pub fn set_transaction_delay(&mut self, delay: i64) -> Result<(), LedgerError> {
        if delay < 0 {
            return Err(LedgerError::InvalidAmountSign {
                op: "set_transaction_delay",
                amount: delay,
            });
        }
        if delay > 0 && self.is_multi_sign() {
            return Err(LedgerError::EscrowMultisignConflict(self.address));
        }
        self.transaction_delay = delay;
        Ok(())
    }

    /// Configure (or clear, with number 0) multisign mode. Rejected while
    /// an escrow delay is active.
    pub fn set_multi_sign(
        &mut self,
        number: u8,
        addresses: Vec<Address>,
    ) -> Result<(), LedgerError> {
        if number > 0 && self.is_escrow() {
            return Err(LedgerError::EscrowMultisignConflict(self.address));
        }
        if number as usize > addresses.len() {
            return Err(LedgerError::InvalidAmountSign {
                op: "set_multi_sign",
                amount: number as i64,
            });
        }
        self.multi_sign_number = number;
        self.multi_sign_addresses = if number > 0 { addresses } else { Vec::new() };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    #[test]
    fn test_new_account_is_plain() {
        let acct = Account::new(addr(1));
        assert_eq!(acct.balance, 0);
        assert!(!acct.is_escrow());
        assert!(!acct.is_multi_sign());
    }

    #[test]
    fn test_escrow_and_multisign_are_mutually_exclusive() {
        let mut acct = Account::new(addr(1));
        acct.set_transaction_delay(50).unwrap();
        assert!(acct.set_multi_sign(2, vec![addr(2), addr(3)]).is_err());

        // Clearing the delay unlocks multisign
        acct.set_transaction_delay(0).unwrap();
        acct.set_multi_sign(2, vec![addr(2), addr(3)]).unwrap();
        assert!(acct.set_transaction_delay(10).is_err());
    }

    #[test]
    fn test_multisign_needs_enough_cosigners() {
        let mut acct = Account::new(addr(1));
        assert!(acct.set_multi_sign(3, vec![addr(2)]).is_err());
    }

    #[test]
    fn test_negative_delay_rejected() {
        let mut acct = Account::new(addr(1));
        assert!(acct.set_transaction_delay(-1).is_err());
    }
}

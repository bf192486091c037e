use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use escrow_types::{Address, Amount, LoanId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// One leg of a settlement batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "direction", rename_all = "snake_case")]
pub enum TransferLeg {
    /// Payment attached to the call, moving from the payer into escrow.
    Inbound { from: Address, amount: Amount },
    /// Payment out of escrow to a recipient.
    Outbound { to: Address, amount: Amount },
}

impl TransferLeg {
    pub fn amount(&self) -> Amount {
        match self {
            TransferLeg::Inbound { amount, .. } | TransferLeg::Outbound { amount, .. } => *amount,
        }
    }

    /// The leg that undoes this one.
    pub fn reversed(&self) -> TransferLeg {
        match *self {
            TransferLeg::Inbound { from, amount } => TransferLeg::Outbound { to: from, amount },
            TransferLeg::Outbound { to, amount } => TransferLeg::Inbound { from: to, amount },
        }
    }
}

impl SettlementReceipt {
    /// Legs that return every balance this batch touched, last leg first.
    pub fn reversal(&self) -> Vec<TransferLeg> {
        self.legs.iter().rev().map(TransferLeg::reversed).collect()
    }
}

/// Record of a batch that settled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub settlement_id: Uuid,
    pub loan_id: LoanId,
    pub legs: Vec<TransferLeg>,
    /// Escrow balance once every leg applied.
    pub escrow_balance: Amount,
}

/// Errors from the custody platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("payer {payer} cannot cover {needed} (balance {available})")]
    InsufficientFunds {
        payer: Address,
        needed: Amount,
        available: Amount,
    },

    #[error("escrow for loan {loan_id} cannot cover {needed} (balance {available})")]
    EscrowShortfall {
        loan_id: LoanId,
        needed: Amount,
        available: Amount,
    },

    #[error("recipient {0} refused the payment")]
    RecipientRejected(Address),

    #[error("payments to the zero address are not deliverable")]
    ZeroRecipient,

    #[error("balance overflow while crediting {0}")]
    Overflow(String),

    #[error("custody unavailable: {0}")]
    Unavailable(String),
}

/// Money-movement capability provided by the host platform.
///
/// `settle` is all-or-nothing: either every leg of the batch applies, or
/// none does and an error is returned.
pub trait Custody: Send + Sync {
    /// Funds currently held in escrow for `loan_id`.
    fn escrow_balance(&self, loan_id: &LoanId) -> Result<Amount, CustodyError>;

    fn settle(
        &self,
        loan_id: &LoanId,
        legs: &[TransferLeg],
    ) -> Result<SettlementReceipt, CustodyError>;
}

#[derive(Clone, Debug, Default)]
struct Balances {
    wallets: HashMap<Address, Amount>,
    escrows: HashMap<LoanId, Amount>,
}

/// In-process custody: wallet balances plus one escrow balance per loan.
///
/// Batches are applied to a scratch copy and published only when every leg
/// succeeds. Recipients can be told to refuse payments, which makes the
/// failure path testable.
#[derive(Debug, Default)]
pub struct InMemoryCustody {
    balances: RwLock<Balances>,
    refusing: RwLock<HashSet<Address>>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add funds to a wallet out of thin air.
    pub fn mint(&self, wallet: Address, amount: Amount) -> Result<Amount, CustodyError> {
        let mut balances = self.write_balances()?;
        let entry = balances.wallets.entry(wallet).or_default();
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| CustodyError::Overflow(wallet.to_string()))?;
        Ok(*entry)
    }

    pub fn wallet_balance(&self, wallet: &Address) -> Result<Amount, CustodyError> {
        let balances = self.read_balances()?;
        Ok(balances.wallets.get(wallet).copied().unwrap_or(0))
    }

    /// Make every future payment to `wallet` fail.
    pub fn refuse_payments(&self, wallet: Address) -> Result<(), CustodyError> {
        self.write_refusing()?.insert(wallet);
        Ok(())
    }

    pub fn accept_payments(&self, wallet: &Address) -> Result<(), CustodyError> {
        self.write_refusing()?.remove(wallet);
        Ok(())
    }

    /// Sum of every wallet and escrow balance.
    pub fn total_supply(&self) -> Result<Amount, CustodyError> {
        let balances = self.read_balances()?;
        let wallets = balances.wallets.values().fold(0u128, |a, b| a.saturating_add(*b));
        let escrows = balances.escrows.values().fold(0u128, |a, b| a.saturating_add(*b));
        Ok(wallets.saturating_add(escrows))
    }

    fn read_balances(&self) -> Result<std::sync::RwLockReadGuard<'_, Balances>, CustodyError> {
        self.balances
            .read()
            .map_err(|e| CustodyError::Unavailable(e.to_string()))
    }

    fn write_balances(&self) -> Result<std::sync::RwLockWriteGuard<'_, Balances>, CustodyError> {
        self.balances
            .write()
            .map_err(|e| CustodyError::Unavailable(e.to_string()))
    }

    fn write_refusing(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashSet<Address>>, CustodyError> {
        self.refusing
            .write()
            .map_err(|e| CustodyError::Unavailable(e.to_string()))
    }
}

impl Custody for InMemoryCustody {
    fn escrow_balance(&self, loan_id: &LoanId) -> Result<Amount, CustodyError> {
        let balances = self.read_balances()?;
        Ok(balances.escrows.get(loan_id).copied().unwrap_or(0))
    }

    fn settle(
        &self,
        loan_id: &LoanId,
        legs: &[TransferLeg],
    ) -> Result<SettlementReceipt, CustodyError> {
        let refusing = self
            .refusing
            .read()
            .map_err(|e| CustodyError::Unavailable(e.to_string()))?;
        let mut balances = self.write_balances()?;

        let mut scratch = balances.clone();
        for leg in legs {
            if let Err(err) = apply_leg(&mut scratch, &refusing, loan_id, leg) {
                warn!(loan_id = %loan_id, leg = ?leg, error = %err, "Settlement rejected");
                return Err(err);
            }
        }

        let escrow_balance = scratch.escrows.get(loan_id).copied().unwrap_or(0);
        *balances = scratch;

        let receipt = SettlementReceipt {
            settlement_id: Uuid::new_v4(),
            loan_id: *loan_id,
            legs: legs.to_vec(),
            escrow_balance,
        };
        debug!(
            settlement_id = %receipt.settlement_id,
            loan_id = %loan_id,
            legs = legs.len(),
            escrow_balance = escrow_balance,
            "Settlement applied"
        );
        Ok(receipt)
    }
}

fn apply_leg(
    balances: &mut Balances,
    refusing: &HashSet<Address>,
    loan_id: &LoanId,
    leg: &TransferLeg,
) -> Result<(), CustodyError> {
    match *leg {
        TransferLeg::Inbound { from, amount } => {
            let available = balances.wallets.get(&from).copied().unwrap_or(0);
            if available < amount {
                return Err(CustodyError::InsufficientFunds {
                    payer: from,
                    needed: amount,
                    available,
                });
            }
            balances.wallets.insert(from, available - amount);
            let escrow = balances.escrows.entry(*loan_id).or_default();
            *escrow = escrow
                .checked_add(amount)
                .ok_or_else(|| CustodyError::Overflow(loan_id.to_string()))?;
        }
        TransferLeg::Outbound { to, amount } => {
            if to.is_zero() {
                return Err(CustodyError::ZeroRecipient);
            }
            if refusing.contains(&to) {
                return Err(CustodyError::RecipientRejected(to));
            }
            let available = balances.escrows.get(loan_id).copied().unwrap_or(0);
            if available < amount {
                return Err(CustodyError::EscrowShortfall {
                    loan_id: *loan_id,
                    needed: amount,
                    available,
                });
            }
            balances.escrows.insert(*loan_id, available - amount);
            let wallet = balances.wallets.entry(to).or_default();
            *wallet = wallet
                .checked_add(amount)
                .ok_or_else(|| CustodyError::Overflow(to.to_string()))?;
        }
    }
    Ok(())
}

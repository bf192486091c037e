use escrow_types::{Address, Amount};
use thiserror::Error;

use crate::position::PayoutPath;

/// Errors from ledger bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("contribution must be greater than zero")]
    ZeroContribution,

    #[error("contribution overflow: {current} + {added} exceeds the representable amount")]
    Overflow { current: Amount, added: Amount },

    #[error("cannot distribute {pool} across an empty ledger")]
    EmptyLedger { pool: Amount },

    #[error("cannot distribute {pool}: positions carry no contributions")]
    NoContributions { pool: Amount },

    #[error("lender not found in ledger: {0}")]
    UnknownLender(Address),

    #[error("lender appears twice in ledger record: {0}")]
    DuplicateLender(Address),

    #[error("position {lender} already settled as {existing:?}, cannot pay out as {attempted:?}")]
    AlreadySettled {
        lender: Address,
        existing: PayoutPath,
        attempted: PayoutPath,
    },
}

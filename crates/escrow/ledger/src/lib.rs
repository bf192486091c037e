//! # escrow-ledger
//!
//! Per-lender bookkeeping for a pooled loan:
//!
//! - [`FundLedger`]: insertion-ordered, address-keyed lender positions with
//!   both positional (`lender_at`) and keyed (`lender_by`) lookup. A repeat
//!   deposit merges into the existing position.
//! - [`distribute_proportionally`]: splits a pool across positions in
//!   proportion to contribution size. Truncation dust goes to the last
//!   position so `sum(payouts) == pool` exactly.
//!
//! The ledger never moves money; it only computes and records payouts.

#![deny(unsafe_code)]

pub mod distribution;
pub mod error;
pub mod ledger;
pub mod position;

pub use distribution::{distribute_proportionally, mul_div_floor, Payout};
pub use error::LedgerError;
pub use ledger::FundLedger;
pub use position::{LenderPosition, PayoutPath};

//! # escrow-core
//!
//! The multi-lender loan escrow state machine.
//!
//! - **LifecyclePolicy**: the transition table. Validates guards (state,
//!   role, timing, value) against an [`EscrowAccount`] and produces a
//!   [`Transition`]: the next account state, the money legs to settle and
//!   the notification to emit. Pure: it never touches custody.
//! - **TimeGate**: pluggable three-predicate capability answering "is this
//!   time-sensitive transition allowed now". [`ImmediateGate`] never waits;
//!   [`TimeSecuredGate`] enforces withdrawal, distribution and default
//!   delays. Chosen once per account via [`TimePolicy`].
//! - **Custody**: the money-movement capability of the host platform.
//!   Settles a batch of legs all-or-nothing.
//! - **EscrowContract**: the transaction boundary. Plans on a working copy,
//!   settles legs, then commits state and publishes the notification. A failed
//!   call leaves account, custody and observers untouched.
//! - **EscrowHost**: many accounts behind one serializer, backed by an
//!   [`AccountStore`].
//!
//! ## Invariants
//!
//! - `ownedAmount <= requestedAmount` while Funding; equal once Funded,
//!   FundWithdrawn, Repaid or Closed.
//! - Proportional payouts sum to exactly the distributed pool.
//! - A lender position is paid out through one terminal path only.
//! - Refunded, Cancelled and Closed accounts reject every mutating
//!   operation. Defaulted still accepts `recover` and
//!   `refund_after_defaulted`.

#![deny(unsafe_code)]

pub mod account;
pub mod clock;
pub mod command;
pub mod contract;
pub mod custody;
pub mod error;
pub mod events;
pub mod gate;
pub mod host;
pub mod policy;

pub use account::EscrowAccount;
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Call, Command};
pub use contract::{EscrowContract, Platform};
pub use custody::{Custody, CustodyError, InMemoryCustody, SettlementReceipt, TransferLeg};
pub use error::{ErrorKind, EscrowError, EscrowResult};
pub use events::{EventLog, EventSink};
pub use gate::{GateView, ImmediateGate, TimeGate, TimePolicy, TimeSecuredGate, TimeSecuredParams};
pub use host::{AccountStore, EscrowHost, HostError, InMemoryAccountStore, StoreResult};
pub use policy::{LifecyclePolicy, Transition};

pub use escrow_ledger::{FundLedger, LenderPosition, Payout};
pub use escrow_types::{
    days, ether, Address, Amount, EscrowEvent, LenderView, LoanId, LoanInfo, LoanStatus,
    Timestamp,
};

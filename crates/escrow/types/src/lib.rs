//! # escrow-types
//!
//! Shared vocabulary for the multi-lender loan escrow:
//!
//! - **Address**: 20-byte account identifier with a distinguished zero address
//! - **LoanId**: identity of one escrow account
//! - **Timestamp**: platform time in Unix seconds
//! - **LoanStatus**: the nine lifecycle states
//! - **EscrowEvent**: notifications emitted once per successful transition
//! - **LenderView / LoanInfo**: read-only query shapes
//!
//! Amounts are plain `u128` base units (wei-like). See [`ether`].

pub mod address;
pub mod amount;
pub mod events;
pub mod ids;
pub mod status;
pub mod time;
pub mod view;

pub use address::{Address, AddressParseError};
pub use amount::{ether, format_amount, Amount, WEI_PER_ETHER};
pub use events::EscrowEvent;
pub use ids::LoanId;
pub use status::LoanStatus;
pub use time::{days, Timestamp, SECONDS_PER_DAY};
pub use view::{LenderView, LoanInfo};

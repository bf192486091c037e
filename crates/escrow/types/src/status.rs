use serde::{Deserialize, Serialize};

/// Lifecycle state of an escrow account.
///
/// Happy path: Requesting → Funding → Funded → FundWithdrawn → Repaid → Closed.
/// Side exits: Defaulted, Refunded, Cancelled. The discriminants are stable
/// and match the numbering dashboards already render.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LoanStatus {
    Requesting = 0,
    Funding = 1,
    Funded = 2,
    FundWithdrawn = 3,
    Repaid = 4,
    Defaulted = 5,
    Refunded = 6,
    Cancelled = 7,
    Closed = 8,
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 9] = [
        LoanStatus::Requesting,
        LoanStatus::Funding,
        LoanStatus::Funded,
        LoanStatus::FundWithdrawn,
        LoanStatus::Repaid,
        LoanStatus::Defaulted,
        LoanStatus::Refunded,
        LoanStatus::Cancelled,
        LoanStatus::Closed,
    ];

    /// Archival states.
    ///
    /// Refunded, Cancelled and Closed reject every mutating operation.
    /// Defaulted is listed as terminal for lifecycle purposes; recovery and
    /// the post-default refund are its only exits.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Defaulted
                | LoanStatus::Refunded
                | LoanStatus::Cancelled
                | LoanStatus::Closed
        )
    }

    /// States in which the full requested amount is committed by lenders.
    pub fn is_fully_funded(&self) -> bool {
        matches!(
            self,
            LoanStatus::Funded | LoanStatus::FundWithdrawn | LoanStatus::Repaid | LoanStatus::Closed
        )
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoanStatus::Requesting => "Requesting",
            LoanStatus::Funding => "Funding",
            LoanStatus::Funded => "Funded",
            LoanStatus::FundWithdrawn => "FundWithdrawn",
            LoanStatus::Repaid => "Repaid",
            LoanStatus::Defaulted => "Defaulted",
            LoanStatus::Refunded => "Refunded",
            LoanStatus::Cancelled => "Cancelled",
            LoanStatus::Closed => "Closed",
        };
        f.write_str(name)
    }
}

use escrow_ledger::LedgerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::custody::CustodyError;

/// Failure of an escrow operation.
///
/// Every failure aborts the whole operation with zero mutation. The reason
/// string is meant for humans; branch on [`EscrowError::kind`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// The caller lacks the role the operation requires.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// The operation was invoked outside its required precondition state.
    #[error("invalid state: {0}")]
    State(String),

    /// A time gate is not yet satisfied.
    #[error("too early: {0}")]
    Timing(String),

    /// Zero or invalid amount, zero address, or mismatched payment.
    #[error("invalid value: {0}")]
    Value(String),

    /// An outgoing payment failed to deliver.
    #[error("transfer failed: {0}")]
    Transfer(String),
}

/// Category of an [`EscrowError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authorization,
    State,
    Timing,
    Value,
    Transfer,
}

impl EscrowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EscrowError::Authorization(_) => ErrorKind::Authorization,
            EscrowError::State(_) => ErrorKind::State,
            EscrowError::Timing(_) => ErrorKind::Timing,
            EscrowError::Value(_) => ErrorKind::Value,
            EscrowError::Transfer(_) => ErrorKind::Transfer,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            EscrowError::Authorization(r)
            | EscrowError::State(r)
            | EscrowError::Timing(r)
            | EscrowError::Value(r)
            | EscrowError::Transfer(r) => r,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Authorization => "authorization",
            ErrorKind::State => "state",
            ErrorKind::Timing => "timing",
            ErrorKind::Value => "value",
            ErrorKind::Transfer => "transfer",
        };
        f.write_str(name)
    }
}

impl From<LedgerError> for EscrowError {
    fn from(err: LedgerError) -> Self {
        EscrowError::Value(err.to_string())
    }
}

impl From<CustodyError> for EscrowError {
    fn from(err: CustodyError) -> Self {
        EscrowError::Transfer(err.to_string())
    }
}

pub type EscrowResult<T> = Result<T, EscrowError>;

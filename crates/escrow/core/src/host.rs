//! Many escrow accounts behind one serializer.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use escrow_types::{Address, Amount, LenderView, LoanId, LoanInfo};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::account::EscrowAccount;
use crate::command::{Call, Command};
use crate::contract::{EscrowContract, Platform};
use crate::error::EscrowError;
use crate::gate::TimePolicy;

/// Result type for storage operations
pub type StoreResult<T> = Result<T, HostError>;

/// Host-level failures.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("unknown loan: {0}")]
    UnknownLoan(LoanId),

    #[error("loan already exists: {0}")]
    DuplicateLoan(LoanId),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error("loan {loan_id} was not saved ({store}) and settlement {settlement_id} could not be reversed: {reversal}")]
    Unreconciled {
        loan_id: LoanId,
        settlement_id: Uuid,
        store: Box<HostError>,
        reversal: EscrowError,
    },
}

impl HostError {
    /// The escrow rejection behind this failure, if any.
    pub fn as_escrow(&self) -> Option<&EscrowError> {
        match self {
            HostError::Escrow(err) => Some(err),
            _ => None,
        }
    }
}

/// Durable home of escrow accounts.
pub trait AccountStore: Send + Sync {
    /// Get an account by ID
    fn load(&self, id: &LoanId) -> StoreResult<Option<EscrowAccount>>;

    /// Create or update an account
    fn save(&self, account: EscrowAccount) -> StoreResult<()>;

    /// All account IDs, in creation order
    fn ids(&self) -> StoreResult<Vec<LoanId>>;
}

#[derive(Debug, Default)]
struct Accounts {
    by_id: HashMap<LoanId, EscrowAccount>,
    order: Vec<LoanId>,
}

/// In-memory store for development and testing
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<Accounts>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn load(&self, id: &LoanId) -> StoreResult<Option<EscrowAccount>> {
        let accounts = self
            .accounts
            .read()
            .map_err(|e| HostError::Store(e.to_string()))?;
        Ok(accounts.by_id.get(id).cloned())
    }

    fn save(&self, account: EscrowAccount) -> StoreResult<()> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|e| HostError::Store(e.to_string()))?;
        let id = account.id;
        if accounts.by_id.insert(id, account).is_none() {
            accounts.order.push(id);
        }
        Ok(())
    }

    fn ids(&self) -> StoreResult<Vec<LoanId>> {
        let accounts = self
            .accounts
            .read()
            .map_err(|e| HostError::Store(e.to_string()))?;
        Ok(accounts.order.clone())
    }
}

/// Runs escrow operations for any number of accounts.
///
/// Calls are applied one at a time in arrival order across all accounts.
/// An account is loaded and its transition planned and settled. The new
/// state is saved before the notification goes out; a failed save reverses
/// the settlement so money never moves without the account advancing.
pub struct EscrowHost<S: AccountStore = InMemoryAccountStore> {
    platform: Platform,
    store: S,
    serializer: Mutex<()>,
}

impl EscrowHost<InMemoryAccountStore> {
    pub fn in_memory(platform: Platform) -> Self {
        Self::new(platform, InMemoryAccountStore::new())
    }
}

impl<S: AccountStore> EscrowHost<S> {
    pub fn new(platform: Platform, store: S) -> Self {
        Self {
            platform,
            store,
            serializer: Mutex::new(()),
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Create a new account in Requesting owned by `owner`.
    pub fn open(&self, owner: Address, time_policy: TimePolicy) -> Result<LoanId, HostError> {
        let _guard = self.lock()?;
        let contract = EscrowContract::create(owner, time_policy, &self.platform);
        let id = contract.id();
        if self.store.load(&id)?.is_some() {
            return Err(HostError::DuplicateLoan(id));
        }
        self.store.save(contract.into_account())?;
        Ok(id)
    }

    /// Apply one operation to one account.
    pub fn execute(&self, loan_id: &LoanId, call: &Call, command: Command) -> Result<(), HostError> {
        let _guard = self.lock()?;
        let mut contract = self.contract(loan_id)?;
        let transition = contract.prepare(call, &command)?;
        let receipt = contract.settle(&command, &transition)?;

        if let Err(store) = self.store.save(transition.next.clone()) {
            error!(loan_id = %loan_id, op = command.name(), error = %store, "Account save failed");
            let Some(receipt) = receipt else {
                return Err(store);
            };
            return match contract.reverse(&receipt) {
                Ok(_) => Err(store),
                Err(reversal) => {
                    error!(
                        loan_id = %loan_id,
                        settlement_id = %receipt.settlement_id,
                        error = %reversal,
                        "Settlement reversal failed"
                    );
                    Err(HostError::Unreconciled {
                        loan_id: *loan_id,
                        settlement_id: receipt.settlement_id,
                        store: Box::new(store),
                        reversal,
                    })
                }
            };
        }
        debug!(loan_id = %loan_id, op = command.name(), "Account saved");

        contract.commit(call, &command, transition);
        Ok(())
    }

    pub fn snapshot(&self, loan_id: &LoanId) -> Result<EscrowAccount, HostError> {
        self.store
            .load(loan_id)?
            .ok_or(HostError::UnknownLoan(*loan_id))
    }

    pub fn info(&self, loan_id: &LoanId) -> Result<LoanInfo, HostError> {
        Ok(self.contract(loan_id)?.info())
    }

    pub fn lenders(&self, loan_id: &LoanId) -> Result<Vec<LenderView>, HostError> {
        Ok(self.snapshot(loan_id)?.ledger.views())
    }

    pub fn balance(&self, loan_id: &LoanId) -> Result<Amount, HostError> {
        Ok(self.contract(loan_id)?.balance()?)
    }

    pub fn loans(&self) -> Result<Vec<LoanId>, HostError> {
        self.store.ids()
    }

    fn contract(&self, loan_id: &LoanId) -> Result<EscrowContract, HostError> {
        let account = self.snapshot(loan_id)?;
        Ok(EscrowContract::load(account, &self.platform))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, HostError> {
        self.serializer.lock().map_err(|e| {
            warn!(error = %e, "Serializer poisoned");
            HostError::Store(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::custody::InMemoryCustody;
    use crate::error::ErrorKind;
    use crate::events::EventLog;
    use escrow_types::{ether, LoanStatus, Timestamp};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn host() -> (EscrowHost, Arc<InMemoryCustody>) {
        let custody = Arc::new(InMemoryCustody::new());
        for n in 1..=20 {
            custody.mint(addr(n), ether(50)).unwrap();
        }
        let platform = Platform::new(
            custody.clone(),
            Arc::new(ManualClock::new(Timestamp(1_700_000_000))),
            Arc::new(EventLog::new()),
        );
        (EscrowHost::in_memory(platform), custody)
    }

    #[test]
    fn unknown_loan_is_reported() {
        let (host, _) = host();
        let id = LoanId::new();
        assert!(matches!(host.info(&id), Err(HostError::UnknownLoan(x)) if x == id));
        assert!(matches!(
            host.execute(&id, &Call::new(addr(1)), Command::Cancel),
            Err(HostError::UnknownLoan(_))
        ));
    }

    #[test]
    fn accounts_are_independent() {
        let (host, custody) = host();
        let a = host.open(addr(1), TimePolicy::Immediate).unwrap();
        let b = host.open(addr(1), TimePolicy::Immediate).unwrap();
        assert_eq!(host.loans().unwrap(), vec![a, b]);

        host.execute(&a, &Call::new(addr(1)), Command::Request { borrower: addr(2), amount: ether(2) })
            .unwrap();
        host.execute(&b, &Call::new(addr(1)), Command::Request { borrower: addr(3), amount: ether(4) })
            .unwrap();
        host.execute(&a, &Call::new(addr(10)).paying(ether(2)), Command::DepositFund { rate: 0 })
            .unwrap();

        assert_eq!(host.info(&a).unwrap().status, LoanStatus::Funded);
        assert_eq!(host.info(&b).unwrap().status, LoanStatus::Funding);
        assert_eq!(host.balance(&a).unwrap(), ether(2));
        assert_eq!(host.balance(&b).unwrap(), 0);
        assert_eq!(custody.wallet_balance(&addr(10)).unwrap(), ether(48));
    }

    #[test]
    fn failed_operation_is_not_saved() {
        let (host, _) = host();
        let id = host.open(addr(1), TimePolicy::Immediate).unwrap();
        let before = host.snapshot(&id).unwrap();

        let err = host
            .execute(&id, &Call::new(addr(9)), Command::Request { borrower: addr(2), amount: 1 })
            .unwrap_err();
        assert_eq!(err.as_escrow().map(|e| e.kind()), Some(ErrorKind::Authorization));
        assert_eq!(host.snapshot(&id).unwrap(), before);
    }

    /// Store whose saves can be switched off, optionally making a wallet
    /// refuse payments at the moment a save fails.
    struct FlakyStore {
        inner: InMemoryAccountStore,
        failing: AtomicBool,
        refuse_on_failure: Option<(Arc<InMemoryCustody>, Address)>,
    }

    impl AccountStore for FlakyStore {
        fn load(&self, id: &LoanId) -> StoreResult<Option<EscrowAccount>> {
            self.inner.load(id)
        }

        fn save(&self, account: EscrowAccount) -> StoreResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                if let Some((custody, wallet)) = &self.refuse_on_failure {
                    custody.refuse_payments(*wallet).unwrap();
                }
                return Err(HostError::Store("disk full".into()));
            }
            self.inner.save(account)
        }

        fn ids(&self) -> StoreResult<Vec<LoanId>> {
            self.inner.ids()
        }
    }

    struct FlakyHost {
        host: EscrowHost<FlakyStore>,
        custody: Arc<InMemoryCustody>,
        events: Arc<EventLog>,
        loan: LoanId,
    }

    fn flaky_host(refuse_lender_on_failure: bool) -> FlakyHost {
        let custody = Arc::new(InMemoryCustody::new());
        custody.mint(addr(10), ether(10)).unwrap();
        let events = Arc::new(EventLog::new());
        let platform = Platform::new(
            custody.clone(),
            Arc::new(ManualClock::new(Timestamp(1_700_000_000))),
            events.clone(),
        );
        let store = FlakyStore {
            inner: InMemoryAccountStore::new(),
            failing: AtomicBool::new(false),
            refuse_on_failure: refuse_lender_on_failure.then(|| (custody.clone(), addr(10))),
        };
        let host = EscrowHost::new(platform, store);
        let loan = host.open(addr(1), TimePolicy::Immediate).unwrap();
        host.execute(&loan, &Call::new(addr(1)), Command::Request { borrower: addr(2), amount: ether(6) })
            .unwrap();
        host.store.failing.store(true, Ordering::SeqCst);
        FlakyHost {
            host,
            custody,
            events,
            loan,
        }
    }

    #[test]
    fn failed_save_reverses_settlement_and_stays_silent() {
        let FlakyHost { host, custody, events, loan } = flaky_host(false);
        let published = events.len();

        let err = host
            .execute(&loan, &Call::new(addr(10)).paying(ether(3)), Command::DepositFund { rate: 0 })
            .unwrap_err();
        assert!(matches!(err, HostError::Store(_)));

        let account = host.snapshot(&loan).unwrap();
        assert_eq!(account.status, LoanStatus::Funding);
        assert_eq!(account.owned_amount(), 0);
        assert_eq!(host.balance(&loan).unwrap(), 0);
        assert_eq!(custody.wallet_balance(&addr(10)).unwrap(), ether(10));
        assert_eq!(events.len(), published);
    }

    #[test]
    fn failed_save_without_legs_publishes_nothing() {
        let FlakyHost { host, events, loan, .. } = flaky_host(false);
        let published = events.len();

        let err = host.execute(&loan, &Call::new(addr(1)), Command::Cancel).unwrap_err();
        assert!(matches!(err, HostError::Store(_)));
        assert_eq!(host.snapshot(&loan).unwrap().status, LoanStatus::Funding);
        assert_eq!(events.len(), published);
    }

    #[test]
    fn irreversible_settlement_is_reported() {
        let FlakyHost { host, custody, loan, .. } = flaky_host(true);

        let err = host
            .execute(&loan, &Call::new(addr(10)).paying(ether(3)), Command::DepositFund { rate: 0 })
            .unwrap_err();
        match err {
            HostError::Unreconciled { loan_id, store, reversal, .. } => {
                assert_eq!(loan_id, loan);
                assert!(matches!(*store, HostError::Store(_)));
                assert_eq!(reversal.kind(), ErrorKind::Transfer);
            }
            other => panic!("expected Unreconciled, got {other:?}"),
        }
        assert_eq!(host.balance(&loan).unwrap(), ether(3));
    }

    #[test]
    fn concurrent_deposits_never_overfund() {
        let (host, _) = host();
        let host = Arc::new(host);
        let id = host.open(addr(1), TimePolicy::Immediate).unwrap();
        host.execute(&id, &Call::new(addr(1)), Command::Request { borrower: addr(2), amount: ether(5) })
            .unwrap();

        let handles: Vec<_> = (10..20)
            .map(|n| {
                let host = host.clone();
                std::thread::spawn(move || {
                    host.execute(&id, &Call::new(addr(n)).paying(ether(1)), Command::DepositFund { rate: 0 })
                        .is_ok()
                })
            })
            .collect();
        let accepted = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|ok| *ok)
            .count();

        assert_eq!(accepted, 5);
        let account = host.snapshot(&id).unwrap();
        assert_eq!(account.status, LoanStatus::Funded);
        assert_eq!(account.owned_amount(), ether(5));
        assert_eq!(host.lenders(&id).unwrap().len(), 5);
    }
}

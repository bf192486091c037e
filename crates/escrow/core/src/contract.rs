use std::sync::Arc;

use escrow_types::{Address, Amount, LenderView, LoanId, LoanInfo, LoanStatus, Timestamp};
use tracing::{info, warn};

use crate::account::EscrowAccount;
use crate::clock::Clock;
use crate::command::{Call, Command};
use crate::custody::{Custody, SettlementReceipt};
use crate::error::EscrowResult;
use crate::events::EventSink;
use crate::gate::TimePolicy;
use crate::policy::{LifecyclePolicy, Transition};

/// Host capabilities an escrow runs against: money movement, time and
/// notification delivery.
#[derive(Clone)]
pub struct Platform {
    pub custody: Arc<dyn Custody>,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<dyn EventSink>,
}

impl Platform {
    pub fn new(
        custody: Arc<dyn Custody>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            custody,
            clock,
            events,
        }
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}

/// One loan escrow bound to its platform.
///
/// Each call is a single transaction: the policy plans on a copy of the
/// account, custody settles the resulting legs all-or-nothing, and only then
/// is the new state committed and the notification published. Any failure
/// leaves the account, custody balances and observers as they were.
///
/// [`execute`](Self::execute) runs all three steps. Hosts that persist the
/// account drive [`prepare`](Self::prepare), [`settle`](Self::settle) and
/// [`commit`](Self::commit) themselves so the save happens before commit.
pub struct EscrowContract {
    account: EscrowAccount,
    policy: LifecyclePolicy,
    platform: Platform,
}

impl EscrowContract {
    /// Open a fresh account in Requesting, owned by `owner`.
    pub fn create(owner: Address, time_policy: TimePolicy, platform: &Platform) -> Self {
        let account = EscrowAccount::new(LoanId::new(), owner, time_policy, platform.clock.now());
        info!(
            loan_id = %account.id,
            owner = %owner,
            gate = time_policy.gate().name(),
            "Escrow account created"
        );
        Self::load(account, platform)
    }

    /// Rebind a previously stored account.
    pub fn load(account: EscrowAccount, platform: &Platform) -> Self {
        let policy = LifecyclePolicy::new(account.time_policy.gate());
        Self {
            account,
            policy,
            platform: platform.clone(),
        }
    }

    /// Run one lifecycle operation as a transaction.
    pub fn execute(&mut self, call: &Call, command: Command) -> EscrowResult<()> {
        let transition = self.prepare(call, &command)?;
        self.settle(&command, &transition)?;
        self.commit(call, &command, transition);
        Ok(())
    }

    /// Validate `command` and plan its transition without side effects.
    pub fn prepare(&self, call: &Call, command: &Command) -> EscrowResult<Transition> {
        let loan_id = self.account.id;
        let now = self.platform.clock.now();
        let custodied = self.platform.custody.escrow_balance(&loan_id)?;

        self.policy
            .plan(&self.account, call, command, now, custodied)
            .map_err(|err| {
                warn!(
                    loan_id = %loan_id,
                    op = command.name(),
                    caller = %call.caller,
                    kind = %err.kind(),
                    error = %err,
                    "Operation rejected"
                );
                err
            })
    }

    /// Move the money of a prepared transition, all legs or none.
    ///
    /// Returns `None` when the transition carries no legs.
    pub fn settle(
        &self,
        command: &Command,
        transition: &Transition,
    ) -> EscrowResult<Option<SettlementReceipt>> {
        if transition.legs.is_empty() {
            return Ok(None);
        }
        let loan_id = self.account.id;
        let receipt = self
            .platform
            .custody
            .settle(&loan_id, &transition.legs)
            .map_err(|err| {
                warn!(
                    loan_id = %loan_id,
                    op = command.name(),
                    error = %err,
                    "Settlement failed; operation rolled back"
                );
                err
            })?;
        Ok(Some(receipt))
    }

    /// Undo a settlement whose transition was never committed.
    pub fn reverse(&self, receipt: &SettlementReceipt) -> EscrowResult<SettlementReceipt> {
        let reversal = self.platform.custody.settle(&receipt.loan_id, &receipt.reversal())?;
        warn!(
            loan_id = %receipt.loan_id,
            settlement_id = %receipt.settlement_id,
            reversal_id = %reversal.settlement_id,
            "Settlement reversed"
        );
        Ok(reversal)
    }

    /// Adopt the planned state and publish its notification.
    pub fn commit(&mut self, call: &Call, command: &Command, transition: Transition) {
        let from = self.account.status;
        self.account = transition.next;

        if let Some(event) = &transition.event {
            self.platform.events.publish(event);
        }

        info!(
            loan_id = %self.account.id,
            op = command.name(),
            caller = %call.caller,
            value = call.value,
            from = %from,
            to = %self.account.status,
            "Operation applied"
        );
    }

    pub fn request(&mut self, call: &Call, borrower: Address, amount: Amount) -> EscrowResult<()> {
        self.execute(call, Command::Request { borrower, amount })
    }

    pub fn deposit_fund(&mut self, call: &Call, rate: Amount) -> EscrowResult<()> {
        self.execute(call, Command::DepositFund { rate })
    }

    pub fn refund(&mut self, call: &Call) -> EscrowResult<()> {
        self.execute(call, Command::Refund)
    }

    pub fn cancel(&mut self, call: &Call) -> EscrowResult<()> {
        self.execute(call, Command::Cancel)
    }

    pub fn withdraw_to_borrower(&mut self, call: &Call) -> EscrowResult<()> {
        self.execute(call, Command::WithdrawToBorrower)
    }

    pub fn repay(&mut self, call: &Call) -> EscrowResult<()> {
        self.execute(call, Command::Repay)
    }

    pub fn withdraw_to_lenders(&mut self, call: &Call) -> EscrowResult<()> {
        self.execute(call, Command::WithdrawToLenders)
    }

    pub fn to_default(&mut self, call: &Call) -> EscrowResult<()> {
        self.execute(call, Command::ToDefault)
    }

    pub fn recover(&mut self, call: &Call) -> EscrowResult<()> {
        self.execute(call, Command::Recover)
    }

    pub fn refund_after_defaulted(&mut self, call: &Call) -> EscrowResult<()> {
        self.execute(call, Command::RefundAfterDefaulted)
    }

    // Queries

    pub fn id(&self) -> LoanId {
        self.account.id
    }

    pub fn status(&self) -> LoanStatus {
        self.account.status
    }

    pub fn owner(&self) -> Address {
        self.account.owner
    }

    pub fn borrower(&self) -> Address {
        self.account.borrower
    }

    pub fn loan_amount(&self) -> Amount {
        self.account.requested_amount
    }

    pub fn owned_amount(&self) -> Amount {
        self.account.owned_amount()
    }

    /// Value currently held in escrow for this loan.
    pub fn balance(&self) -> EscrowResult<Amount> {
        Ok(self.platform.custody.escrow_balance(&self.account.id)?)
    }

    pub fn lender_count(&self) -> usize {
        self.account.lender_count()
    }

    pub fn lender_at(&self, index: usize) -> Option<LenderView> {
        self.account.lender_at(index)
    }

    pub fn lender_by(&self, lender: &Address) -> Option<LenderView> {
        self.account.lender_by(lender)
    }

    pub fn due_date(&self) -> Option<Timestamp> {
        self.policy.gate().due_date(&self.account.gate_view())
    }

    pub fn info(&self) -> LoanInfo {
        LoanInfo {
            owner: self.account.owner,
            borrower: self.account.borrower,
            loan_amount: self.account.requested_amount,
            status: self.account.status,
            lender_count: self.account.lender_count(),
            due_date: self.due_date(),
            now: self.platform.clock.now(),
        }
    }

    pub fn account(&self) -> &EscrowAccount {
        &self.account
    }

    pub fn into_account(self) -> EscrowAccount {
        self.account
    }
}

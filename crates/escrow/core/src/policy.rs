use std::sync::Arc;

use escrow_ledger::{Payout, PayoutPath};
use escrow_types::{Address, Amount, EscrowEvent, LoanStatus, Timestamp};
use tracing::debug;

use crate::account::EscrowAccount;
use crate::command::{Call, Command};
use crate::custody::TransferLeg;
use crate::error::{EscrowError, EscrowResult};
use crate::gate::TimeGate;

/// The outcome of a validated operation, not yet applied.
///
/// `next` is the account as it will be once `legs` have settled; `event` is
/// published only after both are committed.
#[derive(Clone, Debug)]
pub struct Transition {
    pub next: EscrowAccount,
    pub legs: Vec<TransferLeg>,
    pub event: Option<EscrowEvent>,
}

impl Transition {
    fn new(next: EscrowAccount) -> Self {
        Self {
            next,
            legs: Vec::new(),
            event: None,
        }
    }

    fn with_legs(mut self, legs: Vec<TransferLeg>) -> Self {
        self.legs = legs;
        self
    }

    fn with_event(mut self, event: EscrowEvent) -> Self {
        self.event = Some(event);
        self
    }
}

/// The loan transition table.
///
/// Every operation checks its guards in a fixed order (state, role, timing,
/// value) against the current account and returns a [`Transition`] built
/// on a copy. Nothing here moves money or mutates the caller's account.
#[derive(Clone, Debug)]
pub struct LifecyclePolicy {
    gate: Arc<dyn TimeGate>,
}

impl LifecyclePolicy {
    pub fn new(gate: Arc<dyn TimeGate>) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &dyn TimeGate {
        self.gate.as_ref()
    }

    /// Validate `command` and compute its transition.
    ///
    /// `custodied` is the escrow balance the custody platform reports for
    /// this account before the call.
    pub fn plan(
        &self,
        account: &EscrowAccount,
        call: &Call,
        command: &Command,
        now: Timestamp,
        custodied: Amount,
    ) -> EscrowResult<Transition> {
        if !command.is_payable() && call.value > 0 {
            return Err(EscrowError::Value(format!(
                "{} does not accept an attached payment",
                command.name()
            )));
        }

        match *command {
            Command::Request { borrower, amount } => self.request(account, call, borrower, amount),
            Command::DepositFund { rate } => self.deposit_fund(account, call, rate, now),
            Command::Refund => self.refund(account, call),
            Command::Cancel => self.cancel(account, call),
            Command::WithdrawToBorrower => self.withdraw_to_borrower(account, call, now, custodied),
            Command::Repay => self.repay(account, call, now),
            Command::WithdrawToLenders => self.withdraw_to_lenders(account, call, now, custodied),
            Command::ToDefault => self.to_default(account, call, now),
            Command::Recover => self.recover(account, call),
            Command::RefundAfterDefaulted => self.refund_after_defaulted(account, call, custodied),
        }
    }

    /// Requesting → Funding. Owner publishes borrower and amount.
    pub fn request(
        &self,
        account: &EscrowAccount,
        call: &Call,
        borrower: Address,
        amount: Amount,
    ) -> EscrowResult<Transition> {
        require_status(account, &[LoanStatus::Requesting])?;
        require_owner(account, call)?;
        if amount == 0 {
            return Err(EscrowError::Value("loan amount must be greater than zero".into()));
        }
        if borrower.is_zero() {
            return Err(EscrowError::Value("borrower cannot be the zero address".into()));
        }

        let mut next = account.clone();
        next.borrower = borrower;
        next.requested_amount = amount;
        next.status = LoanStatus::Funding;

        Ok(Transition::new(next).with_event(EscrowEvent::Requesting {
            loan_id: account.id,
            borrower,
        }))
    }

    /// Funding → Funding | Funded. Any caller contributes the attached value.
    ///
    /// A deposit that would exceed the requested amount is rejected; the
    /// account becomes Funded exactly when contributions reach it.
    pub fn deposit_fund(
        &self,
        account: &EscrowAccount,
        call: &Call,
        rate: Amount,
        now: Timestamp,
    ) -> EscrowResult<Transition> {
        require_status(account, &[LoanStatus::Funding])?;
        if call.value == 0 {
            return Err(EscrowError::Value("deposit must carry a positive value".into()));
        }
        if call.caller.is_zero() {
            return Err(EscrowError::Value("lender cannot be the zero address".into()));
        }
        let capacity = account.remaining_capacity();
        if call.value > capacity {
            return Err(EscrowError::Value(format!(
                "deposit of {} exceeds remaining capacity {}",
                call.value, capacity
            )));
        }

        let mut next = account.clone();
        let total = next.ledger.add_contribution(call.caller, call.value, rate)?;
        if total >= next.requested_amount {
            next.status = LoanStatus::Funded;
            next.fully_funded_at = Some(now);
            debug!(loan_id = %account.id, total = total, "Loan fully funded");
        }

        Ok(Transition::new(next).with_legs(vec![TransferLeg::Inbound {
            from: call.caller,
            amount: call.value,
        }]))
    }

    /// Funding | Funded → Refunded. Owner returns every contribution.
    pub fn refund(&self, account: &EscrowAccount, call: &Call) -> EscrowResult<Transition> {
        require_status(account, &[LoanStatus::Funding, LoanStatus::Funded])?;
        require_owner(account, call)?;

        let mut next = account.clone();
        let refunds = next.ledger.full_refund();
        next.ledger.record_payouts(&refunds, PayoutPath::Refund)?;
        next.status = LoanStatus::Refunded;

        Ok(Transition::new(next).with_legs(outbound(&refunds)))
    }

    /// Requesting | Funding → Cancelled, only while nothing was contributed.
    pub fn cancel(&self, account: &EscrowAccount, call: &Call) -> EscrowResult<Transition> {
        if account.ledger.total_contributed() > 0 {
            return Err(EscrowError::State(
                "cannot cancel once funds were provided; use refund".into(),
            ));
        }
        require_status(account, &[LoanStatus::Requesting, LoanStatus::Funding])?;
        require_party(account, call)?;

        let mut next = account.clone();
        next.status = LoanStatus::Cancelled;

        Ok(Transition::new(next).with_event(EscrowEvent::Cancelled {
            loan_id: account.id,
        }))
    }

    /// Funded → FundWithdrawn. Borrower receives the whole custodied balance.
    pub fn withdraw_to_borrower(
        &self,
        account: &EscrowAccount,
        call: &Call,
        now: Timestamp,
        custodied: Amount,
    ) -> EscrowResult<Transition> {
        require_status(account, &[LoanStatus::Funded])?;
        require_borrower(account, call)?;
        let view = account.gate_view();
        if !self.gate.can_withdraw(&view, now) {
            return Err(too_early(
                "withdrawal",
                self.gate.withdraw_opens_at(&view),
                now,
            ));
        }

        let mut next = account.clone();
        next.status = LoanStatus::FundWithdrawn;
        next.withdrawn_at = Some(now);

        let legs = if custodied > 0 {
            vec![TransferLeg::Outbound {
                to: account.borrower,
                amount: custodied,
            }]
        } else {
            Vec::new()
        };
        Ok(Transition::new(next).with_legs(legs))
    }

    /// FundWithdrawn → Repaid. Borrower pays back exactly the principal owed.
    pub fn repay(
        &self,
        account: &EscrowAccount,
        call: &Call,
        now: Timestamp,
    ) -> EscrowResult<Transition> {
        require_status(account, &[LoanStatus::FundWithdrawn])?;
        require_borrower(account, call)?;
        let owed = account.owned_amount();
        if call.value != owed {
            return Err(EscrowError::Value(format!(
                "repayment must equal the amount owed {} (got {})",
                owed, call.value
            )));
        }

        let mut next = account.clone();
        next.status = LoanStatus::Repaid;
        next.repaid_at = Some(now);
        next.repaid_amount = call.value;

        Ok(Transition::new(next)
            .with_legs(vec![TransferLeg::Inbound {
                from: call.caller,
                amount: call.value,
            }])
            .with_event(EscrowEvent::Repaid {
                loan_id: account.id,
                amount: call.value,
            }))
    }

    /// Repaid → Closed. Owner splits the custodied pool across lenders pro rata.
    pub fn withdraw_to_lenders(
        &self,
        account: &EscrowAccount,
        call: &Call,
        now: Timestamp,
        custodied: Amount,
    ) -> EscrowResult<Transition> {
        require_status(account, &[LoanStatus::Repaid])?;
        require_owner(account, call)?;
        let view = account.gate_view();
        if !self.gate.can_distribute(&view, now) {
            return Err(too_early(
                "distribution to lenders",
                self.gate.distribute_opens_at(&view),
                now,
            ));
        }

        let mut next = account.clone();
        let payouts = next.ledger.distribute(custodied)?;
        next.ledger.record_payouts(&payouts, PayoutPath::Repayment)?;
        next.status = LoanStatus::Closed;

        Ok(Transition::new(next)
            .with_legs(outbound(&payouts))
            .with_event(EscrowEvent::Closed {
                loan_id: account.id,
            }))
    }

    /// FundWithdrawn → Defaulted. Owner or borrower freezes the ledger.
    pub fn to_default(
        &self,
        account: &EscrowAccount,
        call: &Call,
        now: Timestamp,
    ) -> EscrowResult<Transition> {
        require_status(account, &[LoanStatus::FundWithdrawn])?;
        require_party(account, call)?;
        let view = account.gate_view();
        if !self.gate.can_default(&view, now) {
            return Err(too_early(
                "default",
                self.gate.default_opens_at(&view),
                now,
            ));
        }

        let mut next = account.clone();
        next.status = LoanStatus::Defaulted;

        Ok(Transition::new(next).with_event(EscrowEvent::Defaulted {
            loan_id: account.id,
            borrower: account.borrower,
            defaulted_amount: account.owned_amount(),
            loan_amount: account.requested_amount,
        }))
    }

    /// Defaulted → Defaulted. Anyone pays recovered funds into escrow.
    pub fn recover(&self, account: &EscrowAccount, call: &Call) -> EscrowResult<Transition> {
        require_status(account, &[LoanStatus::Defaulted])?;
        if call.value == 0 {
            return Err(EscrowError::Value("recovery must carry a positive value".into()));
        }

        let mut next = account.clone();
        next.recovered_amount = next
            .recovered_amount
            .checked_add(call.value)
            .ok_or_else(|| EscrowError::Value("recovered amount overflow".into()))?;

        Ok(Transition::new(next).with_legs(vec![TransferLeg::Inbound {
            from: call.caller,
            amount: call.value,
        }]))
    }

    /// Defaulted → Refunded. Owner distributes whatever was recovered.
    pub fn refund_after_defaulted(
        &self,
        account: &EscrowAccount,
        call: &Call,
        custodied: Amount,
    ) -> EscrowResult<Transition> {
        require_status(account, &[LoanStatus::Defaulted])?;
        require_owner(account, call)?;

        let mut next = account.clone();
        let payouts = next.ledger.distribute(custodied)?;
        next.ledger.record_payouts(&payouts, PayoutPath::Refund)?;
        next.status = LoanStatus::Refunded;

        Ok(Transition::new(next).with_legs(outbound(&payouts)))
    }
}

fn require_status(account: &EscrowAccount, allowed: &[LoanStatus]) -> EscrowResult<()> {
    if allowed.contains(&account.status) {
        return Ok(());
    }
    let names: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
    Err(EscrowError::State(format!(
        "required status {}, loan is {}",
        names.join(" or "),
        account.status
    )))
}

fn require_owner(account: &EscrowAccount, call: &Call) -> EscrowResult<()> {
    if call.caller == account.owner {
        Ok(())
    } else {
        Err(EscrowError::Authorization(format!(
            "{} is not the owner",
            call.caller
        )))
    }
}

fn require_borrower(account: &EscrowAccount, call: &Call) -> EscrowResult<()> {
    if !account.borrower.is_zero() && call.caller == account.borrower {
        Ok(())
    } else {
        Err(EscrowError::Authorization(format!(
            "{} is not the borrower",
            call.caller
        )))
    }
}

fn require_party(account: &EscrowAccount, call: &Call) -> EscrowResult<()> {
    if account.is_party(&call.caller) {
        Ok(())
    } else {
        Err(EscrowError::Authorization(format!(
            "{} is neither owner nor borrower",
            call.caller
        )))
    }
}

fn too_early(what: &str, opens_at: Option<Timestamp>, now: Timestamp) -> EscrowError {
    match opens_at {
        Some(at) => EscrowError::Timing(format!(
            "{} opens at {} ({}s from now)",
            what,
            at,
            at.since(now)
        )),
        None => EscrowError::Timing(format!("{} is not yet allowed", what)),
    }
}

fn outbound(payouts: &[Payout]) -> Vec<TransferLeg> {
    payouts
        .iter()
        .filter(|p| p.amount > 0)
        .map(|p| TransferLeg::Outbound {
            to: p.lender,
            amount: p.amount,
        })
        .collect()
}

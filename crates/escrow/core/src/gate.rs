use std::fmt;
use std::sync::Arc;

use escrow_types::{days, LoanStatus, Timestamp};
use serde::{Deserialize, Serialize};

/// Read-only slice of an account that time gates may inspect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateView {
    pub status: LoanStatus,
    pub created_at: Timestamp,
    pub fully_funded_at: Option<Timestamp>,
    pub repaid_at: Option<Timestamp>,
}

/// Predicate set gating the time-sensitive transitions.
///
/// The lifecycle depends only on this capability, never on which
/// implementation is installed. Implementations must be pure functions of
/// the view and the supplied time.
pub trait TimeGate: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// May the borrower withdraw the pooled funds now?
    fn can_withdraw(&self, view: &GateView, now: Timestamp) -> bool;

    /// May the repaid pool be distributed to lenders now?
    fn can_distribute(&self, view: &GateView, now: Timestamp) -> bool;

    /// May the loan be declared in default now?
    fn can_default(&self, view: &GateView, now: Timestamp) -> bool;

    /// Agreed repayment date, once the loan has been fully funded.
    fn due_date(&self, view: &GateView) -> Option<Timestamp>;

    /// Earliest instant `can_withdraw` may hold, when known. Used only to
    /// word rejections.
    fn withdraw_opens_at(&self, _view: &GateView) -> Option<Timestamp> {
        None
    }

    fn distribute_opens_at(&self, _view: &GateView) -> Option<Timestamp> {
        None
    }

    fn default_opens_at(&self, _view: &GateView) -> Option<Timestamp> {
        None
    }
}

/// Base policy: nothing waits.
///
/// The loan is due on demand, so the due date is the moment it was fully
/// funded.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateGate;

impl TimeGate for ImmediateGate {
    fn name(&self) -> &'static str {
        "immediate"
    }

    fn can_withdraw(&self, _view: &GateView, _now: Timestamp) -> bool {
        true
    }

    fn can_distribute(&self, _view: &GateView, _now: Timestamp) -> bool {
        true
    }

    fn can_default(&self, _view: &GateView, _now: Timestamp) -> bool {
        true
    }

    fn due_date(&self, view: &GateView) -> Option<Timestamp> {
        view.fully_funded_at
    }
}

/// Delays applied by [`TimeSecuredGate`], in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSecuredParams {
    /// Wait between full funding and borrower withdrawal.
    pub withdraw_delay: u64,
    /// Wait between repayment and distribution to lenders.
    pub distribute_delay: u64,
    /// Minimum account age before a default may be declared.
    pub default_grace: u64,
    /// Loan term, counted from full funding; sets the due date.
    ///
    /// Default also waits for the due date, so the 30-day default keeps a
    /// funded loan out of default for a month even once `default_grace` has
    /// passed. Set it to zero to gate default on account age alone.
    pub loan_term: u64,
}

impl Default for TimeSecuredParams {
    fn default() -> Self {
        Self {
            withdraw_delay: days(1),
            distribute_delay: days(2),
            default_grace: days(5),
            loan_term: days(30),
        }
    }
}

/// Time-secured policy.
///
/// - withdraw: `now >= fullyFundedAt + withdraw_delay`
/// - distribute: `now >= repaidAt + distribute_delay`
/// - default: `now >= createdAt + default_grace`, status is FundWithdrawn,
///   and `now >= fullyFundedAt + loan_term`
///
/// A missing timestamp keeps the corresponding gate closed.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeSecuredGate {
    params: TimeSecuredParams,
}

impl TimeSecuredGate {
    pub fn new(params: TimeSecuredParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TimeSecuredParams {
        &self.params
    }
}

impl TimeGate for TimeSecuredGate {
    fn name(&self) -> &'static str {
        "time-secured"
    }

    fn can_withdraw(&self, view: &GateView, now: Timestamp) -> bool {
        self.withdraw_opens_at(view).is_some_and(|at| now >= at)
    }

    fn can_distribute(&self, view: &GateView, now: Timestamp) -> bool {
        self.distribute_opens_at(view).is_some_and(|at| now >= at)
    }

    fn can_default(&self, view: &GateView, now: Timestamp) -> bool {
        view.status == LoanStatus::FundWithdrawn
            && self.default_opens_at(view).is_some_and(|at| now >= at)
    }

    fn due_date(&self, view: &GateView) -> Option<Timestamp> {
        view.fully_funded_at.map(|t| t.plus(self.params.loan_term))
    }

    fn withdraw_opens_at(&self, view: &GateView) -> Option<Timestamp> {
        view.fully_funded_at
            .map(|t| t.plus(self.params.withdraw_delay))
    }

    fn distribute_opens_at(&self, view: &GateView) -> Option<Timestamp> {
        view.repaid_at.map(|t| t.plus(self.params.distribute_delay))
    }

    fn default_opens_at(&self, view: &GateView) -> Option<Timestamp> {
        let grace_ends = view.created_at.plus(self.params.default_grace);
        self.due_date(view).map(|due| due.max(grace_ends))
    }
}

/// Which time gate an account is constructed with.
///
/// Stored with the account so a reloaded account resolves the same gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimePolicy {
    #[default]
    Immediate,
    TimeSecured(TimeSecuredParams),
}

impl TimePolicy {
    /// Time-secured policy with the default delays.
    pub fn time_secured() -> Self {
        TimePolicy::TimeSecured(TimeSecuredParams::default())
    }

    pub fn gate(&self) -> Arc<dyn TimeGate> {
        match self {
            TimePolicy::Immediate => Arc::new(ImmediateGate),
            TimePolicy::TimeSecured(params) => Arc::new(TimeSecuredGate::new(*params)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000;

    fn view(status: LoanStatus) -> GateView {
        GateView {
            status,
            created_at: Timestamp(T0),
            fully_funded_at: Some(Timestamp(T0 + 100)),
            repaid_at: Some(Timestamp(T0 + 200)),
        }
    }

    #[test]
    fn immediate_gate_is_always_open() {
        let gate = ImmediateGate;
        let v = view(LoanStatus::Funded);
        let now = Timestamp(0);
        assert!(gate.can_withdraw(&v, now));
        assert!(gate.can_distribute(&v, now));
        assert!(gate.can_default(&v, now));
        assert_eq!(gate.due_date(&v), Some(Timestamp(T0 + 100)));
    }

    #[test]
    fn withdraw_boundary_is_exact() {
        let gate = TimeSecuredGate::default();
        let v = view(LoanStatus::Funded);
        let opens = Timestamp(T0 + 100 + days(1));
        assert!(!gate.can_withdraw(&v, Timestamp(opens.as_secs() - 1)));
        assert!(gate.can_withdraw(&v, opens));
        assert!(gate.can_withdraw(&v, opens.plus(1)));
    }

    #[test]
    fn distribute_boundary_is_exact() {
        let gate = TimeSecuredGate::default();
        let v = view(LoanStatus::Repaid);
        let opens = Timestamp(T0 + 200 + days(2));
        assert!(!gate.can_distribute(&v, Timestamp(opens.as_secs() - 1)));
        assert!(gate.can_distribute(&v, opens));
    }

    #[test]
    fn missing_timestamps_keep_gates_closed() {
        let gate = TimeSecuredGate::default();
        let v = GateView {
            status: LoanStatus::Funding,
            created_at: Timestamp(T0),
            fully_funded_at: None,
            repaid_at: None,
        };
        let far = Timestamp(u64::MAX);
        assert!(!gate.can_withdraw(&v, far));
        assert!(!gate.can_distribute(&v, far));
        assert!(!gate.can_default(&v, far));
        assert_eq!(gate.due_date(&v), None);
    }

    #[test]
    fn default_needs_grace_due_date_and_withdrawn_status() {
        let gate = TimeSecuredGate::new(TimeSecuredParams {
            loan_term: days(10),
            ..TimeSecuredParams::default()
        });
        let v = view(LoanStatus::FundWithdrawn);
        let due = Timestamp(T0 + 100 + days(10));

        assert!(!gate.can_default(&v, Timestamp(T0 + days(5))));
        assert!(!gate.can_default(&v, Timestamp(due.as_secs() - 1)));
        assert!(gate.can_default(&v, due));
        assert!(!gate.can_default(&view(LoanStatus::Repaid), due));
    }

    #[test]
    fn grace_dominates_short_terms() {
        let gate = TimeSecuredGate::new(TimeSecuredParams {
            loan_term: days(1),
            ..TimeSecuredParams::default()
        });
        let v = view(LoanStatus::FundWithdrawn);
        let grace_ends = Timestamp(T0 + days(5));
        assert_eq!(gate.default_opens_at(&v), Some(grace_ends));
        assert!(!gate.can_default(&v, Timestamp(grace_ends.as_secs() - 1)));
        assert!(gate.can_default(&v, grace_ends));
    }

    #[test]
    fn policy_resolves_gate() {
        assert_eq!(TimePolicy::Immediate.gate().name(), "immediate");
        assert_eq!(TimePolicy::time_secured().gate().name(), "time-secured");
    }

    #[test]
    fn policy_serialization_is_tagged() {
        let json = serde_json::to_value(TimePolicy::time_secured()).unwrap();
        assert_eq!(json["kind"], "time_secured");
        assert_eq!(json["withdraw_delay"], days(1));
        let restored: TimePolicy = serde_json::from_value(json).unwrap();
        assert_eq!(restored, TimePolicy::time_secured());
    }
}

use std::sync::Arc;

use escrow_core::{
    days, ether, Address, Call, Clock, ErrorKind, EscrowContract, EscrowEvent, EventLog,
    InMemoryCustody, LoanStatus, ManualClock, Platform, TimePolicy, TimeSecuredParams, Timestamp,
};

const OWNER: u64 = 1;
const BORROWER: u64 = 2;
const LENDERS: [u64; 3] = [11, 12, 13];

struct World {
    custody: Arc<InMemoryCustody>,
    clock: Arc<ManualClock>,
    events: Arc<EventLog>,
    platform: Platform,
}

impl World {
    fn new() -> Self {
        let custody = Arc::new(InMemoryCustody::new());
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(1_735_689_600)));
        let events = Arc::new(EventLog::new());
        for who in [OWNER, BORROWER].iter().chain(LENDERS.iter()) {
            custody
                .mint(addr(*who), ether(10))
                .expect("mint should succeed");
        }
        let platform = Platform::new(custody.clone(), clock.clone(), events.clone());
        Self {
            custody,
            clock,
            events,
            platform,
        }
    }

    fn wallet(&self, who: u64) -> u128 {
        self.custody
            .wallet_balance(&addr(who))
            .expect("balance should be readable")
    }

    fn funded_loan(&self, policy: TimePolicy) -> EscrowContract {
        let mut loan = EscrowContract::create(addr(OWNER), policy, &self.platform);
        loan.request(&Call::new(addr(OWNER)), addr(BORROWER), ether(6))
            .expect("request should succeed");
        for (lender, amount) in LENDERS.iter().zip([3, 2, 1]) {
            loan.deposit_fund(&Call::new(addr(*lender)).paying(ether(amount)), 0)
                .expect("deposit should succeed");
        }
        loan
    }
}

fn addr(n: u64) -> Address {
    Address::from_low_u64(n)
}

#[test]
fn funding_then_refund_returns_each_contribution() {
    let world = World::new();
    let mut loan = world.funded_loan(TimePolicy::Immediate);

    assert_eq!(loan.owned_amount(), ether(6));
    assert_eq!(loan.status(), LoanStatus::Funded);
    assert_eq!(loan.balance().expect("balance"), ether(6));

    let before: Vec<u128> = LENDERS.iter().map(|l| world.wallet(*l)).collect();
    loan.refund(&Call::new(addr(OWNER))).expect("refund should succeed");

    for ((lender, was), amount) in LENDERS.iter().zip(before).zip([3, 2, 1]) {
        assert_eq!(world.wallet(*lender), was + ether(amount));
        let view = loan.lender_by(&addr(*lender)).expect("position kept");
        assert_eq!(view.refunded_amount, ether(amount));
        assert_eq!(view.repaid_amount, 0);
    }
    assert_eq!(loan.status(), LoanStatus::Refunded);
    assert_eq!(loan.owned_amount(), 0);
    assert_eq!(loan.balance().expect("balance"), 0);

    let err = loan
        .refund(&Call::new(addr(OWNER)))
        .expect_err("second refund must fail");
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn repaid_loan_closes_with_full_returns() {
    let world = World::new();
    let mut loan = world.funded_loan(TimePolicy::Immediate);

    loan.withdraw_to_borrower(&Call::new(addr(BORROWER)))
        .expect("withdraw should succeed");
    assert_eq!(world.wallet(BORROWER), ether(16));
    assert_eq!(loan.balance().expect("balance"), 0);

    loan.repay(&Call::new(addr(BORROWER)).paying(ether(6)))
        .expect("repay should succeed");
    loan.withdraw_to_lenders(&Call::new(addr(OWNER)))
        .expect("distribution should succeed");

    assert_eq!(loan.status(), LoanStatus::Closed);
    for (i, lender) in LENDERS.iter().enumerate() {
        let view = loan.lender_at(i).expect("indexed lookup");
        assert_eq!(view.address, addr(*lender));
        assert_eq!(view.repaid_amount, view.contributed_amount);
        assert_eq!(world.wallet(*lender), ether(10));
    }

    let events = world.events.events_for(&loan.id());
    assert_eq!(
        events,
        vec![
            EscrowEvent::Requesting {
                loan_id: loan.id(),
                borrower: addr(BORROWER)
            },
            EscrowEvent::Repaid {
                loan_id: loan.id(),
                amount: ether(6)
            },
            EscrowEvent::Closed { loan_id: loan.id() },
        ]
    );
}

#[test]
fn time_secured_withdrawal_opens_exactly_one_day_after_funding() {
    let world = World::new();
    let mut loan = world.funded_loan(TimePolicy::time_secured());
    let funded_at = world.clock.now().as_secs();

    world.clock.set(Timestamp::from_unix_secs(funded_at + days(1) - 1));
    let err = loan
        .withdraw_to_borrower(&Call::new(addr(BORROWER)))
        .expect_err("one second early");
    assert_eq!(err.kind(), ErrorKind::Timing);
    assert_eq!(loan.status(), LoanStatus::Funded);

    world.clock.advance(1);
    loan.withdraw_to_borrower(&Call::new(addr(BORROWER)))
        .expect("withdraw at the boundary");
    assert_eq!(loan.status(), LoanStatus::FundWithdrawn);
}

#[test]
fn time_secured_distribution_waits_two_days_after_repayment() {
    let world = World::new();
    let mut loan = world.funded_loan(TimePolicy::time_secured());
    world.clock.advance(days(1));
    loan.withdraw_to_borrower(&Call::new(addr(BORROWER))).expect("withdraw");
    loan.repay(&Call::new(addr(BORROWER)).paying(ether(6))).expect("repay");

    world.clock.advance(days(2) - 1);
    let err = loan
        .withdraw_to_lenders(&Call::new(addr(OWNER)))
        .expect_err("too early");
    assert_eq!(err.kind(), ErrorKind::Timing);

    world.clock.advance(1);
    loan.withdraw_to_lenders(&Call::new(addr(OWNER)))
        .expect("distribution at the boundary");
    assert_eq!(loan.status(), LoanStatus::Closed);
}

#[test]
fn cancel_only_before_any_contribution() {
    let world = World::new();

    let mut untouched = EscrowContract::create(addr(OWNER), TimePolicy::Immediate, &world.platform);
    untouched.cancel(&Call::new(addr(OWNER))).expect("cancel in Requesting");
    assert_eq!(untouched.status(), LoanStatus::Cancelled);

    let mut requested = EscrowContract::create(addr(OWNER), TimePolicy::Immediate, &world.platform);
    requested
        .request(&Call::new(addr(OWNER)), addr(BORROWER), ether(6))
        .expect("request");
    requested
        .deposit_fund(&Call::new(addr(11)).paying(ether(1)), 0)
        .expect("deposit");
    let err = requested
        .cancel(&Call::new(addr(BORROWER)))
        .expect_err("cancel after deposit");
    assert_eq!(err.kind(), ErrorKind::State);
    assert_eq!(requested.status(), LoanStatus::Funding);

    let cancelled: Vec<_> = world
        .events
        .events()
        .into_iter()
        .filter(|e| matches!(e, EscrowEvent::Cancelled { .. }))
        .collect();
    assert_eq!(cancelled.len(), 1);
}

#[test]
fn failed_transfer_rolls_back_everything() {
    let world = World::new();
    let mut loan = world.funded_loan(TimePolicy::Immediate);
    loan.withdraw_to_borrower(&Call::new(addr(BORROWER))).expect("withdraw");
    loan.repay(&Call::new(addr(BORROWER)).paying(ether(6))).expect("repay");

    world
        .custody
        .refuse_payments(addr(13))
        .expect("refusal registered");
    let published = world.events.len();
    let snapshot = loan.account().clone();

    let err = loan
        .withdraw_to_lenders(&Call::new(addr(OWNER)))
        .expect_err("payout refused");
    assert_eq!(err.kind(), ErrorKind::Transfer);
    assert_eq!(loan.account(), &snapshot);
    assert_eq!(world.events.len(), published);
    assert_eq!(loan.balance().expect("balance"), ether(6));
    assert_eq!(world.wallet(11), ether(7));
}

#[test]
fn default_recovery_is_shared_pro_rata() {
    let world = World::new();
    let mut loan = world.funded_loan(TimePolicy::Immediate);
    loan.withdraw_to_borrower(&Call::new(addr(BORROWER))).expect("withdraw");

    let err = loan
        .to_default(&Call::new(addr(11)))
        .expect_err("lenders cannot default");
    assert_eq!(err.kind(), ErrorKind::Authorization);

    loan.to_default(&Call::new(addr(OWNER))).expect("default");
    assert_eq!(loan.status(), LoanStatus::Defaulted);

    let err = loan
        .repay(&Call::new(addr(BORROWER)).paying(ether(6)))
        .expect_err("no repay after default");
    assert_eq!(err.kind(), ErrorKind::State);

    loan.recover(&Call::new(addr(BORROWER)).paying(ether(3)))
        .expect("recovery");
    loan.refund_after_defaulted(&Call::new(addr(OWNER)))
        .expect("refund after default");

    assert_eq!(loan.status(), LoanStatus::Refunded);
    let shares: Vec<u128> = (0..3)
        .map(|i| loan.lender_at(i).expect("position").refunded_amount)
        .collect();
    assert_eq!(shares, vec![ether(3) / 2, ether(1), ether(1) / 2]);
    assert_eq!(loan.balance().expect("balance"), 0);
}

#[test]
fn borrower_defaults_five_days_after_creation_with_short_term() {
    let world = World::new();
    let short_term = TimePolicy::TimeSecured(TimeSecuredParams {
        loan_term: days(1),
        ..TimeSecuredParams::default()
    });
    let mut loan = world.funded_loan(short_term);
    let mut standard = world.funded_loan(TimePolicy::time_secured());

    world.clock.advance(days(1));
    loan.withdraw_to_borrower(&Call::new(addr(BORROWER))).expect("withdraw");
    standard
        .withdraw_to_borrower(&Call::new(addr(BORROWER)))
        .expect("withdraw");

    let err = loan
        .to_default(&Call::new(addr(BORROWER)))
        .expect_err("account younger than five days");
    assert_eq!(err.kind(), ErrorKind::Timing);

    world.clock.advance(days(4));
    loan.to_default(&Call::new(addr(BORROWER))).expect("default");
    assert_eq!(loan.status(), LoanStatus::Defaulted);

    let err = standard
        .to_default(&Call::new(addr(BORROWER)))
        .expect_err("thirty-day term still running");
    assert_eq!(err.kind(), ErrorKind::Timing);
}

#[test]
fn info_reports_due_date_once_funded() {
    let world = World::new();
    let loan = world.funded_loan(TimePolicy::time_secured());
    let info = loan.info();
    assert_eq!(info.owner, addr(OWNER));
    assert_eq!(info.borrower, addr(BORROWER));
    assert_eq!(info.loan_amount, ether(6));
    assert_eq!(info.lender_count, 3);
    assert_eq!(
        info.due_date,
        Some(Timestamp::from_unix_secs(world.clock.now().as_secs() + days(30)))
    );
}

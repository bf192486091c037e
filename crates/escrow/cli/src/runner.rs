//! Replays a [`Scenario`] against an in-memory escrow host.

use std::collections::HashMap;
use std::sync::Arc;

use escrow_core::{
    Address, Amount, Call, Clock, ErrorKind, EscrowEvent, EscrowHost, EventLog, HostError,
    InMemoryCustody, LenderView, LoanId, LoanInfo, ManualClock, Platform, Timestamp,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::TimeConfig;
use crate::scenario::{Scenario, ScenarioError, StepSpec};

/// Default scenario start: 2025-01-01T00:00:00Z.
const DEFAULT_START: u64 = 1_735_689_600;

/// Result of a single call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Rejected { kind: ErrorKind, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub at: Timestamp,
    pub action: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<ErrorKind>,
    pub matched: bool,
    pub events: Vec<EscrowEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanReport {
    pub name: String,
    pub id: LoanId,
    pub info: LoanInfo,
    pub balance: Amount,
    pub lenders: Vec<LenderView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletReport {
    pub name: String,
    pub address: Address,
    pub balance: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    pub steps: Vec<StepReport>,
    pub loans: Vec<LoanReport>,
    pub wallets: Vec<WalletReport>,
}

impl RunReport {
    /// Steps whose outcome differed from what the scenario expected.
    pub fn mismatches(&self) -> usize {
        self.steps.iter().filter(|s| !s.matched).count()
    }
}

/// Scenario replay state.
pub struct Runner {
    host: EscrowHost,
    custody: Arc<InMemoryCustody>,
    clock: Arc<ManualClock>,
    events: Arc<EventLog>,
    time: TimeConfig,
    wallets: Vec<(String, Address)>,
    loans: Vec<(String, LoanId)>,
}

impl Runner {
    pub fn new(time: TimeConfig, start: Option<u64>) -> Self {
        let custody = Arc::new(InMemoryCustody::new());
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(
            start.unwrap_or(DEFAULT_START),
        )));
        let events = Arc::new(EventLog::new());
        let platform = Platform::new(custody.clone(), clock.clone(), events.clone());
        Self {
            host: EscrowHost::in_memory(platform),
            custody,
            clock,
            events,
            time,
            wallets: Vec::new(),
            loans: Vec::new(),
        }
    }

    /// Set up wallets and loans, replay every step and collect the report.
    pub fn run(mut self, scenario: &Scenario) -> Result<RunReport, ScenarioError> {
        for wallet in &scenario.wallets {
            let balance = match &wallet.balance {
                Some(text) => text.amount()?,
                None => 0,
            };
            self.add_wallet(&wallet.name, balance)?;
        }

        for loan in &scenario.loans {
            if self.loans.iter().any(|(name, _)| name == &loan.name) {
                return Err(ScenarioError::DuplicateName(loan.name.clone()));
            }
            let owner = self.resolve(&loan.owner)?;
            let policy = self.time.time_policy(loan.policy);
            let id = self.host.open(owner, policy).map_err(host_failure)?;
            info!(loan = %loan.name, loan_id = %id, "Loan opened");
            self.loans.push((loan.name.clone(), id));
        }

        let mut steps = Vec::with_capacity(scenario.steps.len());
        for (i, step) in scenario.steps.iter().enumerate() {
            steps.push(self.step(i + 1, step)?);
        }

        let mut loans = Vec::with_capacity(self.loans.len());
        for (name, id) in &self.loans {
            loans.push(LoanReport {
                name: name.clone(),
                id: *id,
                info: self.host.info(id).map_err(host_failure)?,
                balance: self.host.balance(id).map_err(host_failure)?,
                lenders: self.host.lenders(id).map_err(host_failure)?,
            });
        }

        let mut wallets = Vec::with_capacity(self.wallets.len());
        for (name, address) in &self.wallets {
            wallets.push(WalletReport {
                name: name.clone(),
                address: *address,
                balance: self
                    .custody
                    .wallet_balance(address)
                    .map_err(|e| ScenarioError::Host(e.to_string()))?,
            });
        }

        Ok(RunReport {
            scenario: scenario.name.clone(),
            steps,
            loans,
            wallets,
        })
    }

    fn add_wallet(&mut self, name: &str, balance: Amount) -> Result<(), ScenarioError> {
        if self.wallets.iter().any(|(n, _)| n == name) {
            return Err(ScenarioError::DuplicateName(name.to_string()));
        }
        let address = Address::from_low_u64(self.wallets.len() as u64 + 1);
        if balance > 0 {
            self.custody
                .mint(address, balance)
                .map_err(|e| ScenarioError::Host(e.to_string()))?;
        }
        debug!(wallet = name, address = %address, balance = balance, "Wallet funded");
        self.wallets.push((name.to_string(), address));
        Ok(())
    }

    /// A wallet name, or a literal `0x` address.
    fn resolve(&self, who: &str) -> Result<Address, ScenarioError> {
        if let Some((_, address)) = self.wallets.iter().find(|(name, _)| name == who) {
            return Ok(*address);
        }
        who.parse()
            .map_err(|_| ScenarioError::UnknownWallet(who.to_string()))
    }

    fn loan(&self, name: &str) -> Result<LoanId, ScenarioError> {
        self.loans
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
            .ok_or_else(|| ScenarioError::UnknownLoan(name.to_string()))
    }

    fn step(&mut self, index: usize, step: &StepSpec) -> Result<StepReport, ScenarioError> {
        if step.advance.is_none() && step.call.is_none() {
            return Err(ScenarioError::EmptyStep(index));
        }
        if step.call.is_none() && step.expect_error.is_some() {
            return Err(ScenarioError::ExpectationWithoutCall(index));
        }

        let mut action = Vec::new();
        if let Some(secs) = step.advance {
            let now = self.clock.advance(secs);
            action.push(format!("advance {}s", secs));
            debug!(step = index, now = %now, "Clock advanced");
        }

        let published = self.events.len();
        let outcome = match &step.call {
            None => Outcome::Ok,
            Some(spec) => {
                let loan_id = self.loan(&spec.loan)?;
                let caller = self.resolve(&spec.from)?;
                let value = match &spec.value {
                    Some(text) => text.amount()?,
                    None => 0,
                };
                let command = spec.op.to_command(|who| self.resolve(who))?;
                action.push(format!("{} {} by {}", command.name(), spec.loan, spec.from));

                match self
                    .host
                    .execute(&loan_id, &Call::new(caller).paying(value), command)
                {
                    Ok(()) => Outcome::Ok,
                    Err(HostError::Escrow(err)) => Outcome::Rejected {
                        kind: err.kind(),
                        reason: err.to_string(),
                    },
                    Err(other) => return Err(host_failure(other)),
                }
            }
        };

        let matched = match (&step.expect_error, &outcome) {
            (None, Outcome::Ok) => true,
            (Some(expected), Outcome::Rejected { kind, .. }) => expected == kind,
            _ => false,
        };

        let events = self
            .events
            .events()
            .into_iter()
            .skip(published)
            .collect();

        Ok(StepReport {
            index,
            at: self.clock.now(),
            action: action.join(", "),
            outcome,
            expected: step.expect_error,
            matched,
            events,
        })
    }
}

fn host_failure(err: HostError) -> ScenarioError {
    ScenarioError::Host(err.to_string())
}

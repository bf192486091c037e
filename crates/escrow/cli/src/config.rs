//! Configuration for escrowctl

use escrow_core::{TimePolicy, TimeSecuredParams};
use serde::{Deserialize, Serialize};

/// Main escrowctl configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscrowCtlConfig {
    /// Time policy applied to new loans
    #[serde(default)]
    pub time: TimeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which time gate a loan is opened with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Immediate,
    TimeSecured,
}

/// Time policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Policy for loans that do not name one
    #[serde(default)]
    pub policy: PolicyKind,

    /// Seconds between full funding and borrower withdrawal
    #[serde(default = "default_withdraw_delay")]
    pub withdraw_delay_secs: u64,

    /// Seconds between repayment and distribution to lenders
    #[serde(default = "default_distribute_delay")]
    pub distribute_delay_secs: u64,

    /// Seconds after creation before a default may be declared
    #[serde(default = "default_default_grace")]
    pub default_grace_secs: u64,

    /// Agreed loan term, counted from full funding
    #[serde(default = "default_loan_term")]
    pub loan_term_secs: u64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        let params = TimeSecuredParams::default();
        Self {
            policy: PolicyKind::default(),
            withdraw_delay_secs: params.withdraw_delay,
            distribute_delay_secs: params.distribute_delay,
            default_grace_secs: params.default_grace,
            loan_term_secs: params.loan_term,
        }
    }
}

impl TimeConfig {
    pub fn params(&self) -> TimeSecuredParams {
        TimeSecuredParams {
            withdraw_delay: self.withdraw_delay_secs,
            distribute_delay: self.distribute_delay_secs,
            default_grace: self.default_grace_secs,
            loan_term: self.loan_term_secs,
        }
    }

    /// Resolve `kind` (or the configured default) to a concrete policy.
    pub fn time_policy(&self, kind: Option<PolicyKind>) -> TimePolicy {
        match kind.unwrap_or(self.policy) {
            PolicyKind::Immediate => TimePolicy::Immediate,
            PolicyKind::TimeSecured => TimePolicy::TimeSecured(self.params()),
        }
    }
}

fn default_withdraw_delay() -> u64 {
    TimeSecuredParams::default().withdraw_delay
}

fn default_distribute_delay() -> u64 {
    TimeSecuredParams::default().distribute_delay
}

fn default_default_grace() -> u64 {
    TimeSecuredParams::default().default_grace
}

fn default_loan_term() -> u64 {
    TimeSecuredParams::default().loan_term
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl EscrowCtlConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `ESCROW_`-prefixed environment variables (`ESCROW_TIME__POLICY`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&EscrowCtlConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ESCROW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

//! Run configuration: environment selector, resolution modes, actor accounts
//! and ledger gateway settings, read from `DEPLOY_*` environment variables.
//!
//! Callers load `.env` first (`dotenv::dotenv()`); this module only reads the
//! process environment, or any lookup function in tests.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use frax_deploy_protocol::topology::{CollateralSpec, ProtocolPlan};
use frax_deploy_protocol::{ActorRole, Address, Environment, ResolutionMode};

use crate::errors::DeployError;

pub const ENVIRONMENT_VAR: &str = "DEPLOY_ENVIRONMENT";
pub const MODE_VAR: &str = "DEPLOY_MODE";
pub const MODE_OVERRIDES_VAR: &str = "DEPLOY_MODE_OVERRIDES";
pub const REGISTRY_PATH_VAR: &str = "DEPLOY_REGISTRY_PATH";
pub const LEDGER_URL_VAR: &str = "DEPLOY_LEDGER_URL";
pub const CONFIRMATION_TIMEOUT_VAR: &str = "DEPLOY_CONFIRMATION_TIMEOUT_SECS";
pub const POLL_INTERVAL_VAR: &str = "DEPLOY_POLL_INTERVAL_MS";
pub const REQUEST_TIMEOUT_VAR: &str = "DEPLOY_REQUEST_TIMEOUT_SECS";
pub const COLLATERALS_VAR: &str = "DEPLOY_COLLATERALS";

pub const DEFAULT_REGISTRY_PATH: &str = "deployments/addresses.json";
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Addresses of the accounts allowed to act on the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Actors {
    accounts: BTreeMap<ActorRole, Address>,
}

impl Actors {
    /// Assign `accounts` to the roles in `ActorRole::ALL` order.
    pub fn from_accounts(accounts: &[Address]) -> Self {
        Self {
            accounts: ActorRole::ALL
                .iter()
                .copied()
                .zip(accounts.iter().cloned())
                .collect(),
        }
    }

    pub fn from_env() -> Result<Self, DeployError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Every role must be configured.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DeployError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut accounts = BTreeMap::new();
        for role in ActorRole::ALL {
            let value = lookup(role.env_key()).ok_or_else(|| {
                DeployError::Config(format!(
                    "{} is not set (address of the {} account)",
                    role.env_key(),
                    role
                ))
            })?;
            accounts.insert(role, Address::parse(value.trim())?);
        }
        Ok(Self { accounts })
    }

    pub fn get(&self, role: ActorRole) -> Result<&Address, DeployError> {
        self.accounts
            .get(&role)
            .ok_or_else(|| DeployError::Config(format!("no account configured for actor `{}`", role)))
    }
}

/// Resolution mode for the run, with per-component overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModePolicy {
    default: ResolutionMode,
    overrides: BTreeMap<String, ResolutionMode>,
}

impl ModePolicy {
    pub fn new(default: ResolutionMode) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, component: impl Into<String>, mode: ResolutionMode) -> Self {
        self.overrides.insert(component.into(), mode);
        self
    }

    pub fn default_mode(&self) -> ResolutionMode {
        self.default
    }

    pub fn mode_for(&self, component: &str) -> ResolutionMode {
        self.overrides.get(component).copied().unwrap_or(self.default)
    }

    pub fn overrides(&self) -> impl Iterator<Item = (&String, &ResolutionMode)> {
        self.overrides.iter()
    }

    /// Parse `component=mode` pairs separated by commas.
    pub fn parse_overrides(list: &str) -> Result<Vec<(String, ResolutionMode)>, DeployError> {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                let (component, mode) = item.split_once('=').ok_or_else(|| {
                    DeployError::Config(format!(
                        "mode override `{}` is not of the form component=mode",
                        item
                    ))
                })?;
                Ok((component.trim().to_string(), mode.trim().parse()?))
            })
            .collect()
    }
}

/// Settings read from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub environment: Option<Environment>,
    pub mode: Option<ResolutionMode>,
    pub mode_overrides: Vec<(String, ResolutionMode)>,
    pub registry_path: PathBuf,
    pub ledger_url: Option<String>,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub collaterals: Option<Vec<CollateralSpec>>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            environment: None,
            mode: None,
            mode_overrides: Vec::new(),
            registry_path: PathBuf::from(DEFAULT_REGISTRY_PATH),
            ledger_url: None,
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            collaterals: None,
        }
    }
}

impl DeployConfig {
    pub fn from_env() -> Result<Self, DeployError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, DeployError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let environment = non_empty(ENVIRONMENT_VAR)
            .map(|value| value.trim().parse::<Environment>())
            .transpose()?;
        let mode = non_empty(MODE_VAR)
            .map(|value| value.trim().parse::<ResolutionMode>())
            .transpose()?;
        let mode_overrides = match non_empty(MODE_OVERRIDES_VAR) {
            Some(list) => ModePolicy::parse_overrides(&list)?,
            None => Vec::new(),
        };
        let collaterals = non_empty(COLLATERALS_VAR)
            .map(|list| parse_collaterals(&list))
            .transpose()?;

        Ok(Self {
            environment,
            mode,
            mode_overrides,
            registry_path: non_empty(REGISTRY_PATH_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.registry_path),
            ledger_url: non_empty(LEDGER_URL_VAR),
            confirmation_timeout: parse_u64(&non_empty, CONFIRMATION_TIMEOUT_VAR)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.confirmation_timeout),
            poll_interval: parse_u64(&non_empty, POLL_INTERVAL_VAR)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            request_timeout: parse_u64(&non_empty, REQUEST_TIMEOUT_VAR)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            collaterals,
        })
    }

    /// Mode policy for `environment`: configured mode, else the
    /// environment's default, plus configured overrides.
    pub fn mode_policy(&self, environment: Environment) -> ModePolicy {
        let default = self.mode.unwrap_or_else(|| environment.default_mode());
        self.mode_overrides
            .iter()
            .fold(ModePolicy::new(default), |policy, (component, mode)| {
                policy.with_override(component.clone(), *mode)
            })
    }

    /// Protocol plan with configured collaterals, default staking pairs.
    pub fn protocol_plan(&self) -> ProtocolPlan {
        let mut plan = ProtocolPlan::default();
        if let Some(collaterals) = &self.collaterals {
            plan.collaterals = collaterals.clone();
        }
        plan
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>, DeployError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| DeployError::Config(format!("{} must be an integer, got `{}`", key, value)))
        })
        .transpose()
}

/// Parse `SYMBOL:decimals` pairs separated by commas.
fn parse_collaterals(list: &str) -> Result<Vec<CollateralSpec>, DeployError> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (symbol, decimals) = item.split_once(':').ok_or_else(|| {
                DeployError::Config(format!("collateral `{}` is not of the form SYMBOL:decimals", item))
            })?;
            let decimals = decimals.trim().parse::<u8>().map_err(|_| {
                DeployError::Config(format!("collateral `{}` has invalid decimals", item))
            })?;
            Ok(CollateralSpec::new(symbol.trim(), decimals))
        })
        .collect()
}

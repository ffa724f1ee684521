//! Deployment error definitions.

use std::io;
use std::path::PathBuf;

use frax_deploy_protocol::{Environment, LedgerError, ManifestPath, ParseError};
use thiserror::Error;

/// Invalid component topology. Always a programming error in the topology
/// definition, never a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("component `{name}` is declared more than once")]
    DuplicateComponent { name: String },

    #[error("wiring step `{id}` is declared more than once")]
    DuplicateStep { id: String },

    #[error("`{node}` depends on undeclared component `{dependency}`")]
    UnknownDependency { node: String, dependency: String },

    #[error("dependency cycle: {}", .members.join(" -> "))]
    Cycle { members: Vec<String> },

    #[error("`{node}` needs `{dependency}` before it has been resolved")]
    Unresolved { node: String, dependency: String },
}

/// Address registry file failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no manifest recorded for environment `{environment}` in {}", .path.display())]
    NotFound {
        environment: Environment,
        path: PathBuf,
    },

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed registry {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
}

/// Why a wiring step did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WiringFailure {
    /// The configuration call reverted or was not confirmed.
    #[error("transaction rejected: {0}")]
    Rejected(LedgerError),

    /// The already-applied probe could not be read.
    #[error("probe read failed: {0}")]
    Probe(LedgerError),

    /// Probe answered with a value of the wrong shape.
    #[error("unexpected probe result `{0}`")]
    UnexpectedProbe(String),

    #[error("`{component}` resolved to the zero address")]
    ZeroAddress { component: String },
}

/// Deployment run errors.
///
/// Every variant is fatal for the run. Codes are grouped by origin:
/// 1xx input, 2xx registry, 3xx topology, 4xx deployment, 5xx wiring.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("configuration: {0}")]
    Config(String),

    #[error("no manifest recorded for environment `{environment}`")]
    NotFound { environment: Environment },

    #[error("component `{component}` has no address at `{path}`")]
    MissingAddress {
        component: String,
        path: ManifestPath,
    },

    #[error("component `{component}` has invalid address `{value}`")]
    InvalidAddress { component: String, value: String },

    #[error("factory has no liquidity pair for `{component}`")]
    PairNotFound { component: String },

    #[error(transparent)]
    Registry(RegistryError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("deployment of `{component}` failed: {source}")]
    Deployment {
        component: String,
        #[source]
        source: LedgerError,
    },

    #[error("wiring step `{step}` on `{target}` failed: {reason}")]
    Wiring {
        step: String,
        target: String,
        reason: WiringFailure,
    },
}

impl DeployError {
    pub const fn code(&self) -> u16 {
        match self {
            // Input
            DeployError::Parse(ParseError::UnknownEnvironment { .. }) => 100,
            DeployError::Parse(_) | DeployError::Config(_) => 101,

            // Registry
            DeployError::NotFound { .. } => 200,
            DeployError::MissingAddress { .. } => 201,
            DeployError::InvalidAddress { .. } => 202,
            DeployError::PairNotFound { .. } => 203,
            DeployError::Registry(_) => 210,

            // Topology
            DeployError::Topology(_) => 300,

            // Deployment
            DeployError::Deployment { .. } => 400,

            // Wiring
            DeployError::Wiring { .. } => 500,
        }
    }

    /// Process exit status for this error: the code's hundreds digit.
    pub const fn exit_status(&self) -> u8 {
        (self.code() / 100) as u8
    }
}

impl From<RegistryError> for DeployError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound { environment, .. } => DeployError::NotFound { environment },
            other => DeployError::Registry(other),
        }
    }
}

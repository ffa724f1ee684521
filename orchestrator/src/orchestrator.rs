//! Run state machine: resolve every component, apply the wiring, persist the
//! manifest.
//!
//! ```text
//! Resolving -> Wiring -> Manifesting -> Done
//!     \           \            \
//!      +-----------+------------+--> Failed
//! ```
//!
//! Wiring steps are probed before they are submitted. A step whose probe
//! already reports the desired state is recorded as `AlreadyApplied` and
//! no transaction is sent, so re-running against a wired environment issues
//! no state-mutating transactions.

use std::fmt;

use frax_deploy_protocol::topology::{ComponentDescriptor, Expectation, Provision, Topology, WiringPhase, WiringStep};
use frax_deploy_protocol::{Environment, Ledger, ResolutionMode, Value};
use serde_json::{json, Value as Json};
use tracing::{error, info, warn};

use crate::config::{Actors, ModePolicy};
use crate::errors::{DeployError, RegistryError, WiringFailure};
use crate::graph;
use crate::manifest::Manifest;
use crate::registry::AddressRegistry;
use crate::resolver::{bind_args, recorded_address, resolved_address, ResolvedSet, Resolver};
use crate::writer::ManifestWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Resolving,
    Wiring,
    Manifesting,
    Done,
    Failed,
}

impl RunState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RunState::Resolving => "resolving",
            RunState::Wiring => "wiring",
            RunState::Manifesting => "manifesting",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Submitted and confirmed in this run
    Applied { tx_hash: String, block: u64 },
    /// Probe showed the step already in effect
    AlreadyApplied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiringOutcome {
    pub step: String,
    pub phase: WiringPhase,
    pub status: StepStatus,
}

impl WiringOutcome {
    fn to_json(&self) -> Json {
        match &self.status {
            StepStatus::Applied { tx_hash, block } => json!({
                "step": self.step,
                "phase": self.phase.as_str(),
                "status": "applied",
                "tx_hash": tx_hash,
                "block": block,
            }),
            StepStatus::AlreadyApplied => json!({
                "step": self.step,
                "phase": self.phase.as_str(),
                "status": "already_applied",
            }),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub environment: Environment,
    pub resolved: ResolvedSet,
    pub wiring: Vec<WiringOutcome>,
    /// Manifest as persisted
    pub manifest: Manifest,
}

impl RunReport {
    /// Wiring transactions submitted by this run.
    pub fn applied_count(&self) -> usize {
        self.wiring
            .iter()
            .filter(|outcome| matches!(outcome.status, StepStatus::Applied { .. }))
            .count()
    }
}

pub struct Orchestrator<'a, L: Ledger> {
    ledger: &'a mut L,
    registry: &'a AddressRegistry,
    topology: &'a Topology,
    actors: &'a Actors,
    environment: Environment,
    modes: ModePolicy,
    state: RunState,
    prior: Option<Manifest>,
    resolved: ResolvedSet,
    outcomes: Vec<WiringOutcome>,
}

impl<'a, L: Ledger> Orchestrator<'a, L> {
    pub fn new(
        ledger: &'a mut L,
        registry: &'a AddressRegistry,
        topology: &'a Topology,
        actors: &'a Actors,
        environment: Environment,
        modes: ModePolicy,
    ) -> Self {
        Self {
            ledger,
            registry,
            topology,
            actors,
            environment,
            modes,
            state: RunState::Resolving,
            prior: None,
            resolved: ResolvedSet::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Components resolved so far.
    pub fn resolved(&self) -> &ResolvedSet {
        &self.resolved
    }

    pub fn run(&mut self) -> Result<RunReport, DeployError> {
        self.state = RunState::Resolving;
        self.prior = None;
        self.resolved = ResolvedSet::new();
        self.outcomes.clear();

        let result = self.execute();
        if let Err(err) = &result {
            self.fail(err);
        }
        result
    }

    fn execute(&mut self) -> Result<RunReport, DeployError> {
        // Everything that can be checked without the ledger is checked first.
        let order = graph::resolution_order(self.topology)?;
        let wiring = graph::wiring_order(self.topology)?;
        self.check_overrides()?;
        self.prior = self.load_prior()?;
        self.preflight(&order)?;

        info!(
            environment = %self.environment,
            mode = %self.modes.default_mode(),
            components = order.len(),
            "resolving components"
        );
        for descriptor in order {
            let mode = self.modes.mode_for(&descriptor.name);
            let component = Resolver::new(&mut *self.ledger, self.actors, self.prior.as_ref())
                .resolve(descriptor, &self.resolved, mode)?;
            info!(
                component = %component.name,
                address = %component.address,
                origin = %component.origin,
                "component resolved"
            );
            self.resolved.insert(component)?;
        }

        self.state = RunState::Wiring;
        info!(steps = wiring.len(), "wiring components");
        for step in wiring {
            let outcome = self.wire(step)?;
            self.outcomes.push(outcome);
        }

        self.state = RunState::Manifesting;
        let writer = ManifestWriter::new(self.topology);
        let manifest = writer.build(&self.resolved, self.prior.as_ref());
        let manifest = writer.write(self.registry, self.environment, &manifest)?;

        self.state = RunState::Done;
        info!(
            environment = %self.environment,
            components = self.resolved.len(),
            "deployment complete"
        );
        Ok(RunReport {
            environment: self.environment,
            resolved: self.resolved.clone(),
            wiring: self.outcomes.clone(),
            manifest,
        })
    }

    fn check_overrides(&self) -> Result<(), DeployError> {
        match self
            .modes
            .overrides()
            .find(|(name, _)| self.topology.component(name).is_none())
        {
            Some((name, _)) => Err(DeployError::Config(format!(
                "mode override names unknown component `{}`",
                name
            ))),
            None => Ok(()),
        }
    }

    fn attaches(&self, descriptor: &ComponentDescriptor) -> bool {
        matches!(descriptor.provision, Provision::Deploy { .. })
            && self.modes.mode_for(&descriptor.name) == ResolutionMode::Attach
    }

    /// The stored manifest. Missing is fatal only if something attaches.
    fn load_prior(&self) -> Result<Option<Manifest>, DeployError> {
        match self.registry.load(self.environment) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(RegistryError::NotFound { .. })
                if !self.topology.components().iter().any(|c| self.attaches(c)) =>
            {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Every attached slot must hold a usable address before the first
    /// transaction goes out.
    fn preflight(&self, order: &[&ComponentDescriptor]) -> Result<(), DeployError> {
        for descriptor in order.iter().filter(|d| self.attaches(d)) {
            recorded_address(self.prior.as_ref(), descriptor)?;
        }
        Ok(())
    }

    fn wire(&mut self, step: &WiringStep) -> Result<WiringOutcome, DeployError> {
        let failure = |reason| DeployError::Wiring {
            step: step.id.clone(),
            target: step.target.clone(),
            reason,
        };

        for name in step.components() {
            if resolved_address(&step.id, name, &self.resolved)?.is_zero() {
                return Err(failure(WiringFailure::ZeroAddress {
                    component: name.to_string(),
                }));
            }
        }
        let target = resolved_address(&step.id, &step.target, &self.resolved)?.clone();
        let args = bind_args(&step.id, &step.args, self.actors, &self.resolved)?;
        let probe_args = bind_args(&step.id, &step.probe.args, self.actors, &self.resolved)?;
        let actor = self.actors.get(step.actor)?.clone();

        let observed = self
            .ledger
            .read(&target, &step.probe.method, &probe_args)
            .map_err(|e| failure(WiringFailure::Probe(e)))?;
        if self.probe_satisfied(step, &observed).map_err(failure)? {
            info!(step = %step.id, target = %step.target, "wiring already applied");
            return Ok(WiringOutcome {
                step: step.id.clone(),
                phase: step.phase,
                status: StepStatus::AlreadyApplied,
            });
        }

        let receipt = self
            .ledger
            .call(&target, &step.method, &args, &actor)
            .map_err(|e| failure(WiringFailure::Rejected(e)))?;
        info!(
            step = %step.id,
            target = %step.target,
            actor = %step.actor,
            tx_hash = %receipt.tx_hash,
            block = receipt.block,
            "wiring applied"
        );
        Ok(WiringOutcome {
            step: step.id.clone(),
            phase: step.phase,
            status: StepStatus::Applied {
                tx_hash: receipt.tx_hash,
                block: receipt.block,
            },
        })
    }

    fn probe_satisfied(&self, step: &WiringStep, observed: &Value) -> Result<bool, WiringFailure> {
        let unexpected = || WiringFailure::UnexpectedProbe(observed.to_string());
        match &step.probe.expect {
            Expectation::True => observed.as_bool().ok_or_else(unexpected),
            Expectation::EqualsComponent(name) => {
                let actual = observed.as_address().ok_or_else(unexpected)?;
                Ok(self.resolved.address(name) == Some(actual))
            }
        }
    }

    fn fail(&mut self, err: &DeployError) {
        let failed_in = self.state;
        self.state = RunState::Failed;
        error!(state = %failed_in, code = err.code(), error = %err, "deployment failed");

        // Only failures that may have left on-chain changes get a report.
        if !matches!(err, DeployError::Deployment { .. } | DeployError::Wiring { .. }) {
            return;
        }
        let report = self.diagnostics(failed_in, err);
        match self.registry.write_diagnostics(self.environment, &report) {
            Ok(path) => warn!(path = %path.display(), "diagnostics written"),
            Err(write_err) => warn!(error = %write_err, "failed to write diagnostics"),
        }
    }

    /// Addresses resolved so far (as they would appear in the manifest), step
    /// outcomes and the error.
    fn diagnostics(&self, failed_in: RunState, err: &DeployError) -> Json {
        let partial = ManifestWriter::new(self.topology).build(&self.resolved, self.prior.as_ref());
        json!({
            "environment": self.environment.as_str(),
            "failed_in": failed_in.as_str(),
            "error": {
                "code": err.code(),
                "message": err.to_string(),
            },
            "manifest": partial.to_json(),
            "wiring": self.outcomes.iter().map(WiringOutcome::to_json).collect::<Vec<_>>(),
        })
    }
}

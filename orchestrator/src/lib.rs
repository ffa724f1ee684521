//! Deployment orchestration for the Frax protocol.
//!
//! A run resolves every component of a [`Topology`](frax_deploy_protocol::topology::Topology)
//! against a [`Ledger`](frax_deploy_protocol::Ledger), either by deploying it or
//! by attaching to the address recorded for the environment. It then applies
//! the wiring calls in phase order and persists the resulting manifest.
//!
//! ## Modules
//!
//! - **registry**: environment-keyed address file with atomic writes
//! - **manifest**: one environment's address manifest
//! - **resolver**: deploy, attach or discover a single component
//! - **graph**: resolution and wiring order, cycle detection
//! - **orchestrator**: the run state machine
//! - **writer**: manifest construction with forward-fill
//! - **ledger**: in-memory `LocalChain` and the JSON-RPC `RpcLedger`
//! - **config**: `DEPLOY_*` environment configuration and actor accounts

pub mod config;
pub mod errors;
pub mod graph;
pub mod ledger;
pub mod manifest;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod writer;

pub use config::{Actors, DeployConfig, ModePolicy};
pub use errors::{DeployError, RegistryError, TopologyError, WiringFailure};
pub use ledger::{LocalChain, RpcLedger, RpcSettings};
pub use manifest::Manifest;
pub use orchestrator::{Orchestrator, RunReport, RunState, StepStatus, WiringOutcome};
pub use registry::AddressRegistry;
pub use resolver::{Origin, ResolvedComponent, ResolvedSet, Resolver};
pub use writer::ManifestWriter;

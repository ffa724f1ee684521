//! Frax protocol description for the deployment tooling.
//!
//! ## Contents
//!
//! - **types**: addresses, environments, resolution modes, actor roles and the
//!   manifest layout
//! - **interfaces**: the blocking `Ledger` interface the orchestrator drives
//! - **topology**: every component of the protocol, how it is provisioned,
//!   and the configuration calls that wire the components together
//!
//! Contract bytecode is not part of this crate; components are reached only
//! through their call interface.

pub mod errors;
pub mod interfaces;
pub mod topology;
pub mod types;

pub use errors::ParseError;
pub use interfaces::{Ledger, LedgerError, Receipt};
pub use types::{
    ActorRole, Address, Category, ComponentKind, Environment, ManifestPath, ResolutionMode, Value,
};

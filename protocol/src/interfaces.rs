//! Ledger interface consumed by the deployment tooling.
//!
//! Every operation blocks until the ledger acknowledges it: instantiations and
//! calls return only once included and confirmed (or once the bounded wait
//! elapses), reads return the current value.

use core::time::Duration;

use thiserror::Error;

use crate::types::{Address, Value};

/// Confirmation of a state-mutating transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Transaction hash as reported by the ledger
    pub tx_hash: String,
    /// Block the transaction was included in
    pub block: u64,
}

/// Failure reported by a ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Execution reverted on-chain.
    #[error("reverted: {reason}")]
    Reverted { reason: String },

    /// Submitted but not confirmed within the bounded wait.
    #[error("not confirmed within {waited:?}")]
    Timeout { waited: Duration },

    /// Ledger could not be reached.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Ledger answered with something that could not be interpreted.
    #[error("malformed ledger response: {0}")]
    Decode(String),
}

/// Blocking, confirmable access to the ledger hosting the protocol.
pub trait Ledger {
    /// Instantiate `artifact` with constructor `args`, submitted by `actor`.
    fn instantiate(
        &mut self,
        artifact: &str,
        args: &[Value],
        actor: &Address,
    ) -> Result<Address, LedgerError>;

    /// Submit a state-mutating call to `target`, signed by `actor`.
    fn call(
        &mut self,
        target: &Address,
        method: &str,
        args: &[Value],
        actor: &Address,
    ) -> Result<Receipt, LedgerError>;

    /// Read-only call against `target`.
    fn read(&self, target: &Address, method: &str, args: &[Value]) -> Result<Value, LedgerError>;
}

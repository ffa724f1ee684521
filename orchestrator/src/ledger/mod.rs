//! Ledger implementations.

mod local;
mod rpc;

pub use local::{LocalChain, Transaction};
pub use rpc::{decode_value, encode_value, RpcLedger, RpcSettings};

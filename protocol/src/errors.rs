//! Errors raised while interpreting external inputs.

use thiserror::Error;

/// Failure to interpret an operator-supplied or manifest-supplied value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Environment selector did not name a known environment.
    #[error("unknown environment `{name}` (expected one of: local, testnet, production)")]
    UnknownEnvironment { name: String },

    /// Resolution mode was neither `fresh` nor `attach`.
    #[error("unknown resolution mode `{value}` (expected `fresh` or `attach`)")]
    UnknownMode { value: String },

    /// Text is not a 20-byte hex address.
    #[error("invalid address `{value}`")]
    InvalidAddress { value: String },

    /// Manifest category name is not part of the layout.
    #[error("unknown manifest category `{name}`")]
    UnknownCategory { name: String },
}

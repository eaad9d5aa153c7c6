use std::time::Duration;

use ethers::types::H256;
use thiserror::Error;

/// Error type for every step of the contract workflow.
///
/// Failures after a transaction has been submitted carry its hash so the
/// caller can keep tracking it independently.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Endpoint malformed or unreachable.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing, malformed or inconsistent account credentials.
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Missing bytecode or unusable interface description.
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Arguments do not match the interface (arity or types).
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// Malformed key, or key not matching the sender.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Node rejected the raw transaction (nonce too low, insufficient funds, gas too low).
    #[error("Submission rejected: {0}")]
    Submission(String),

    /// The raw transaction may have reached the node but no answer came back.
    /// Its nonce stays reserved; track `tx_hash` before sending anything else.
    #[error("Submission of {tx_hash:?} unconfirmed: {reason}")]
    Unconfirmed { tx_hash: H256, reason: String },

    /// Transaction submitted but not mined within the wait window.
    #[error("Timed out after {waited:?} waiting for receipt of {tx_hash:?}")]
    Timeout { tx_hash: H256, waited: Duration },

    /// Receipt present but no contract was created.
    #[error("Deployment failed in transaction {tx_hash:?}")]
    DeploymentFailed { tx_hash: H256 },

    /// Receipt present, mined, status failed.
    #[error("Execution reverted in transaction {tx_hash:?}")]
    ExecutionReverted { tx_hash: H256 },

    /// Node query failed outside of submission.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Call output or log data could not be decoded against the interface.
    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Nonce error: {0}")]
    Nonce(String),
}

impl WorkflowError {
    /// Hash of the already-submitted transaction this error refers to, if any.
    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            WorkflowError::Timeout { tx_hash, .. }
            | WorkflowError::Unconfirmed { tx_hash, .. }
            | WorkflowError::DeploymentFailed { tx_hash }
            | WorkflowError::ExecutionReverted { tx_hash } => Some(*tx_hash),
            _ => None,
        }
    }

    /// Whether the failure happened before anything reached the chain and the
    /// same call can be repeated as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::Connection(_) | WorkflowError::Rpc(_))
    }
}

impl From<ethers::abi::Error> for WorkflowError {
    fn from(err: ethers::abi::Error) -> Self {
        WorkflowError::Encoding(err.to_string())
    }
}

impl From<std::io::Error> for WorkflowError {
    fn from(err: std::io::Error) -> Self {
        WorkflowError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Artifact(err.to_string())
    }
}

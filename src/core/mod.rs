pub mod abi;
pub mod artifact;
pub mod config;
pub mod domain;
pub mod errors;
pub mod nonce;

pub use artifact::ContractArtifact;
pub use config::{ConnectionConfig, GasPolicy, ReceiptConfig, WorkflowConfig};
pub use domain::{
    AccountCredentials, DeployedContract, EventRecord, LogEntry, PrivateKey, ReceiptStatus,
    SignedTransaction, TransactionReceipt, UnsignedTransaction,
};
pub use errors::WorkflowError;
pub use nonce::NonceManager;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use std::time::Duration;

use crate::core::domain::{TransactionReceipt, UnsignedTransaction};
use crate::core::errors::WorkflowError;

/// The node RPC surface the workflow consumes.
///
/// Implementations perform blocking network I/O behind `async`; callers are
/// expected to bound every call with a timeout.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_gas_price(&self) -> Result<U256, WorkflowError>;

    /// Number of transactions sent from `address` (its next nonce).
    async fn get_transaction_count(&self, address: Address) -> Result<U256, WorkflowError>;

    async fn get_chain_id(&self) -> Result<u64, WorkflowError>;

    /// Deployed code at `address`; empty for accounts without code.
    async fn get_code(&self, address: Address) -> Result<Bytes, WorkflowError>;

    async fn get_block_number(&self) -> Result<u64, WorkflowError>;

    /// Submit signed RLP bytes. Node rejections map to `WorkflowError::Submission`.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, WorkflowError>;

    /// Wait until `tx_hash` is mined or `timeout` elapses (`WorkflowError::Timeout`).
    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        timeout: Duration,
    ) -> Result<TransactionReceipt, WorkflowError>;

    /// `eth_call` against the latest state.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, WorkflowError>;

    /// Dry-run `txn` and return the gas it would use.
    async fn estimate_gas(&self, txn: &UnsignedTransaction) -> Result<U256, WorkflowError>;
}

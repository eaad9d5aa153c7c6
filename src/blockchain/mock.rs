// filepath: src/blockchain/mock.rs
//! In-memory chain for exercising workflows without a node.
//!
//! Raw transactions are decoded and their signer recovered, so nonce ordering,
//! chain id and contract creation behave like a real node. Receipts become
//! visible after a configurable confirmation delay.

use async_trait::async_trait;
use ethers::{
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, H256, U256},
    utils::{get_contract_address, keccak256, rlp::Rlp},
};
use parking_lot::Mutex;
use std::{collections::HashMap, time::Duration};
use tokio::time::Instant;

use super::traits::ChainClient;
use crate::core::domain::{LogEntry, ReceiptStatus, TransactionReceipt, UnsignedTransaction};
use crate::core::errors::WorkflowError;

/// A transaction accepted by the mock, as decoded from its raw bytes.
#[derive(Debug, Clone)]
pub struct SubmittedTransaction {
    pub hash: H256,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: U256,
    pub gas_price: Option<U256>,
    pub gas_limit: Option<U256>,
    pub chain_id: Option<u64>,
    pub value: U256,
    pub data: Bytes,
}

#[derive(Debug)]
struct PendingReceipt {
    ready_at: Instant,
    receipt: TransactionReceipt,
}

#[derive(Debug)]
struct MockChainState {
    gas_price: U256,
    chain_id: u64,
    block_number: u64,
    default_nonce: u64,
    nonces: HashMap<Address, u64>,
    code: HashMap<Address, Bytes>,
    call_results: HashMap<(Address, [u8; 4]), Bytes>,
    gas_estimate: Option<U256>,
    confirmation_delay: Duration,
    deploy_address: Option<Address>,
    queued_logs: Vec<LogEntry>,
    revert_next: bool,
    reject_next: Option<String>,
    lose_next_response: Option<String>,
    submitted: Vec<SubmittedTransaction>,
    receipts: HashMap<H256, PendingReceipt>,
}

impl MockChainState {
    fn nonce_of(&self, address: Address) -> u64 {
        self.nonces.get(&address).copied().unwrap_or(self.default_nonce)
    }
}

/// Mock `ChainClient`: gas price 20, chain id 1, nonce 0, instant confirmation.
#[derive(Debug)]
pub struct MockChainClient {
    state: Mutex<MockChainState>,
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockChainState {
                gas_price: U256::from(20u64),
                chain_id: 1,
                block_number: 0,
                default_nonce: 0,
                nonces: HashMap::new(),
                code: HashMap::new(),
                call_results: HashMap::new(),
                gas_estimate: Some(U256::from(100_000u64)),
                confirmation_delay: Duration::ZERO,
                deploy_address: None,
                queued_logs: Vec::new(),
                revert_next: false,
                reject_next: None,
                lose_next_response: None,
                submitted: Vec::new(),
                receipts: HashMap::new(),
            }),
        }
    }

    pub fn with_gas_price(self, gas_price: u64) -> Self {
        self.state.lock().gas_price = U256::from(gas_price);
        self
    }

    pub fn with_chain_id(self, chain_id: u64) -> Self {
        self.state.lock().chain_id = chain_id;
        self
    }

    /// Starting nonce for accounts without an explicit one.
    pub fn with_default_nonce(self, nonce: u64) -> Self {
        self.state.lock().default_nonce = nonce;
        self
    }

    pub fn with_nonce(self, address: Address, nonce: u64) -> Self {
        self.state.lock().nonces.insert(address, nonce);
        self
    }

    /// `None` makes every estimation fail.
    pub fn with_gas_estimate(self, estimate: Option<u64>) -> Self {
        self.state.lock().gas_estimate = estimate.map(U256::from);
        self
    }

    pub fn with_confirmation_delay(self, delay: Duration) -> Self {
        self.state.lock().confirmation_delay = delay;
        self
    }

    /// Address assigned to every deployment instead of the CREATE address.
    pub fn with_deploy_address(self, address: Address) -> Self {
        self.state.lock().deploy_address = Some(address);
        self
    }

    pub fn with_code(self, address: Address, code: Bytes) -> Self {
        self.state.lock().code.insert(address, code);
        self
    }

    /// Answer `eth_call`s to `to` starting with `selector`.
    pub fn with_call_result(self, to: Address, selector: [u8; 4], output: Bytes) -> Self {
        self.set_call_result(to, selector, output);
        self
    }

    pub fn set_call_result(&self, to: Address, selector: [u8; 4], output: Bytes) {
        self.state.lock().call_results.insert((to, selector), output);
    }

    /// Attach a log to the next mined transaction. A zero address is replaced
    /// by the transaction's target (callee or created contract).
    pub fn queue_log(&self, log: LogEntry) {
        self.state.lock().queued_logs.push(log);
    }

    /// Mine the next transaction with a failed status.
    pub fn revert_next(&self) {
        self.state.lock().revert_next = true;
    }

    /// Reject the next submission with `reason`.
    pub fn reject_next(&self, reason: impl Into<String>) {
        self.state.lock().reject_next = Some(reason.into());
    }

    /// Accept the next submission but fail the call with an `Rpc` error, as
    /// when the connection drops before the node's answer arrives.
    pub fn lose_next_response(&self, reason: impl Into<String>) {
        self.state.lock().lose_next_response = Some(reason.into());
    }

    pub fn submitted(&self) -> Vec<SubmittedTransaction> {
        self.state.lock().submitted.clone()
    }

    pub fn nonce_of(&self, address: Address) -> u64 {
        self.state.lock().nonce_of(address)
    }
}

fn decode_raw(raw: &Bytes) -> Result<(TypedTransaction, Address), WorkflowError> {
    let rlp = Rlp::new(raw.as_ref());
    let (mut tx, sig) = TypedTransaction::decode_signed(&rlp)
        .map_err(|e| WorkflowError::Submission(format!("malformed transaction: {}", e)))?;
    // EIP-155: v = chain_id * 2 + 35/36
    if tx.chain_id().is_none() && sig.v >= 35 {
        tx.set_chain_id((sig.v - 35) / 2);
    }
    let from = sig
        .recover(tx.sighash())
        .map_err(|e| WorkflowError::Submission(format!("invalid signature: {}", e)))?;
    Ok((tx, from))
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn get_gas_price(&self) -> Result<U256, WorkflowError> {
        Ok(self.state.lock().gas_price)
    }

    async fn get_transaction_count(&self, address: Address) -> Result<U256, WorkflowError> {
        Ok(U256::from(self.state.lock().nonce_of(address)))
    }

    async fn get_chain_id(&self) -> Result<u64, WorkflowError> {
        Ok(self.state.lock().chain_id)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, WorkflowError> {
        Ok(self.state.lock().code.get(&address).cloned().unwrap_or_default())
    }

    async fn get_block_number(&self) -> Result<u64, WorkflowError> {
        Ok(self.state.lock().block_number)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, WorkflowError> {
        let (tx, from) = decode_raw(&raw)?;
        let mut state = self.state.lock();

        if let Some(reason) = state.reject_next.take() {
            return Err(WorkflowError::Submission(reason));
        }
        let chain_id = tx.chain_id().map(|c| c.as_u64());
        if chain_id != Some(state.chain_id) {
            return Err(WorkflowError::Submission(format!(
                "invalid chain id {:?}, node is on {}",
                chain_id, state.chain_id
            )));
        }
        let expected = state.nonce_of(from);
        let nonce = tx.nonce().copied().unwrap_or_default();
        if nonce != U256::from(expected) {
            let kind = if nonce < U256::from(expected) { "too low" } else { "too high" };
            return Err(WorkflowError::Submission(format!(
                "nonce {}: got {}, account nonce is {}",
                kind, nonce, expected
            )));
        }

        let hash = H256::from(keccak256(raw));
        let to = tx.to().and_then(|t| t.as_address().copied());
        let data = tx.data().cloned().unwrap_or_default();
        let status = if std::mem::take(&mut state.revert_next) {
            ReceiptStatus::Failed
        } else {
            ReceiptStatus::Success
        };
        // Nodes report the CREATE address even for reverted deployments.
        let contract_address = match to {
            Some(_) => None,
            None => Some(state.deploy_address.unwrap_or_else(|| get_contract_address(from, nonce))),
        };
        if let (Some(created), ReceiptStatus::Success) = (contract_address, status) {
            state.code.insert(created, data.clone());
        }
        let target = to.or(contract_address).unwrap_or_default();
        let logs = std::mem::take(&mut state.queued_logs)
            .into_iter()
            .enumerate()
            .map(|(i, mut log)| {
                if log.address.is_zero() {
                    log.address = target;
                }
                log.log_index = Some(i as u64);
                log
            })
            .collect();

        state.nonces.insert(from, expected + 1);
        state.block_number += 1;
        let receipt = TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(state.block_number),
            status,
            contract_address,
            logs,
        };
        let ready_at = Instant::now() + state.confirmation_delay;
        state.receipts.insert(hash, PendingReceipt { ready_at, receipt });
        state.submitted.push(SubmittedTransaction {
            hash,
            from,
            to,
            nonce,
            gas_price: tx.gas_price(),
            gas_limit: tx.gas().copied(),
            chain_id,
            value: tx.value().copied().unwrap_or_default(),
            data,
        });
        match state.lose_next_response.take() {
            Some(reason) => Err(WorkflowError::Rpc(reason)),
            None => Ok(hash),
        }
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        timeout: Duration,
    ) -> Result<TransactionReceipt, WorkflowError> {
        let pending = self
            .state
            .lock()
            .receipts
            .get(&tx_hash)
            .map(|p| (p.ready_at, p.receipt.clone()));
        match pending {
            Some((ready_at, receipt)) => {
                let remaining = ready_at.saturating_duration_since(Instant::now());
                if remaining > timeout {
                    tokio::time::sleep(timeout).await;
                    Err(WorkflowError::Timeout { tx_hash, waited: timeout })
                } else {
                    tokio::time::sleep(remaining).await;
                    Ok(receipt)
                }
            }
            None => {
                tokio::time::sleep(timeout).await;
                Err(WorkflowError::Timeout { tx_hash, waited: timeout })
            }
        }
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, WorkflowError> {
        let mut selector = [0u8; 4];
        if data.len() < 4 {
            return Err(WorkflowError::Rpc("execution reverted: no selector".to_string()));
        }
        selector.copy_from_slice(&data[..4]);
        self.state
            .lock()
            .call_results
            .get(&(to, selector))
            .cloned()
            .ok_or_else(|| WorkflowError::Rpc("execution reverted".to_string()))
    }

    async fn estimate_gas(&self, _txn: &UnsignedTransaction) -> Result<U256, WorkflowError> {
        self.state
            .lock()
            .gas_estimate
            .ok_or_else(|| WorkflowError::Rpc("gas estimation unavailable".to_string()))
    }
}

//! Contract workflow: build, sign, submit, confirm, decode.
//!
//! Every step is an explicit operation returning `Result<_, WorkflowError>`.
//! `deploy` and `invoke` chain them for the common case; callers that need
//! control over each step use the individual operations directly.

mod events;

pub use events::EventIter;

use ethers::{
    abi::Token,
    signers::Signer,
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::blockchain::{ChainClient, EthersChainClient};
use crate::core::artifact::ContractArtifact;
use crate::core::config::{GasPolicy, WorkflowConfig};
use crate::core::domain::{
    AccountCredentials, DeployedContract, PrivateKey, SignedTransaction, TransactionReceipt,
    UnsignedTransaction,
};
use crate::core::errors::WorkflowError;
use crate::core::nonce::NonceManager;
use crate::security::redaction::redact_hex_bytes;

/// Result of a confirmed deployment.
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub contract: DeployedContract,
    pub receipt: TransactionReceipt,
}

pub struct ContractWorkflow<C: ChainClient> {
    client: Arc<C>,
    gas: GasPolicy,
    nonces: NonceManager,
}

impl ContractWorkflow<EthersChainClient> {
    /// Connect to the configured node; fails with `Connection` if it is unreachable.
    pub async fn connect(config: &WorkflowConfig) -> Result<Self, WorkflowError> {
        let client = EthersChainClient::connect(&config.connection).await?;
        Ok(Self::new(Arc::new(client), config.gas.clone()))
    }
}

impl<C: ChainClient> ContractWorkflow<C> {
    pub fn new(client: Arc<C>, gas: GasPolicy) -> Self {
        Self { client, gas, nonces: NonceManager::new() }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    pub async fn block_number(&self) -> Result<u64, WorkflowError> {
        self.client.get_block_number().await
    }

    pub async fn get_code(&self, address: Address) -> Result<Bytes, WorkflowError> {
        self.client.get_code(address).await
    }

    /// Unsigned contract-creation transaction for `artifact` with `args`.
    ///
    /// # Errors
    /// `Artifact` without bytecode, `Encoding` when `args` do not fit the constructor.
    pub async fn build_deploy_transaction(
        &self,
        artifact: &ContractArtifact,
        args: &[Token],
        account: &AccountCredentials,
    ) -> Result<UnsignedTransaction, WorkflowError> {
        // Encode first so invalid input never consumes a nonce.
        let data = artifact.encode_deployment(args)?;
        let txn = self.prepare(account.address, None, U256::zero(), data).await?;
        info!(from = ?txn.from, nonce = %txn.nonce, gas_limit = %txn.gas_limit, "Built deploy transaction");
        Ok(txn)
    }

    /// Unsigned call of `function_name(args)` on `contract`, sending `value` wei.
    pub async fn build_call_transaction(
        &self,
        contract: &DeployedContract,
        function_name: &str,
        args: &[Token],
        account: &AccountCredentials,
        value: U256,
    ) -> Result<UnsignedTransaction, WorkflowError> {
        let data = contract.artifact.encode_call(function_name, args)?;
        let txn = self.prepare(account.address, Some(contract.address), value, data).await?;
        info!(
            from = ?txn.from,
            to = ?contract.address,
            function = function_name,
            nonce = %txn.nonce,
            "Built call transaction"
        );
        Ok(txn)
    }

    async fn prepare(
        &self,
        from: Address,
        to: Option<Address>,
        value: U256,
        data: Bytes,
    ) -> Result<UnsignedTransaction, WorkflowError> {
        let gas_price = self.client.get_gas_price().await?;
        let chain_id = self.client.get_chain_id().await?;
        let count = self.client.get_transaction_count(from).await?;
        if count > U256::from(u64::MAX) {
            return Err(WorkflowError::Nonce(format!("transaction count {} out of range", count)));
        }
        let nonce = self.nonces.reserve(from, count.as_u64())?;
        debug!(gas_price = %gas_price, chain_id, on_chain = %count, nonce, "Fetched chain metadata");

        let mut txn = UnsignedTransaction {
            from,
            to,
            gas_price,
            gas_limit: U256::zero(),
            nonce: U256::from(nonce),
            chain_id,
            value,
            data,
        };
        txn.gas_limit = self.gas_limit_for(&txn).await;
        Ok(txn)
    }

    async fn gas_limit_for(&self, txn: &UnsignedTransaction) -> U256 {
        if let Some(fixed) = self.gas.gas_limit {
            return U256::from(fixed);
        }
        match self.client.estimate_gas(txn).await {
            Ok(estimate) => {
                let limit = self.gas.with_margin(estimate);
                debug!(estimate = %estimate, limit = %limit, "Estimated gas");
                limit
            }
            Err(e) => {
                warn!(
                    fallback = self.gas.fallback_gas_limit,
                    "Gas estimation failed, using fallback limit: {}", e
                );
                U256::from(self.gas.fallback_gas_limit)
            }
        }
    }

    /// Sign `txn` locally and submit it.
    ///
    /// Until the node accepts the transaction its nonce is given back on
    /// failure, so the next build reuses it. A "nonce too high" rejection means
    /// the local counter ran ahead of the chain and drops it entirely. When the
    /// node never answers the nonce stays reserved and the error carries the
    /// locally computed hash.
    pub async fn sign_and_send(
        &self,
        txn: &UnsignedTransaction,
        private_key: &PrivateKey,
    ) -> Result<H256, WorkflowError> {
        let signed = match sign(txn, private_key) {
            Ok(signed) => signed,
            Err(e) => {
                self.discard(txn);
                return Err(e);
            }
        };
        debug!(tx_hash = ?signed.hash, raw = %redact_hex_bytes(&signed.raw), "Signed transaction");

        match self.client.send_raw_transaction(signed.raw).await {
            Ok(tx_hash) => {
                if tx_hash != signed.hash {
                    warn!(local = ?signed.hash, node = ?tx_hash, "Node reported a different transaction hash");
                }
                info!(tx_hash = ?tx_hash, nonce = %txn.nonce, "Transaction submitted");
                Ok(tx_hash)
            }
            Err(WorkflowError::Submission(reason)) => {
                warn!(from = ?txn.from, nonce = %txn.nonce, "Submission rejected: {}", reason);
                if reason.to_ascii_lowercase().contains("nonce too high") {
                    self.nonces.reset(txn.from);
                } else {
                    self.discard(txn);
                }
                Err(WorkflowError::Submission(reason))
            }
            Err(e) => {
                warn!(
                    tx_hash = ?signed.hash,
                    nonce = %txn.nonce,
                    "No answer to submission, keeping nonce reserved: {}", e
                );
                Err(WorkflowError::Unconfirmed { tx_hash: signed.hash, reason: e.to_string() })
            }
        }
    }

    /// Give back the nonce of a built transaction that will not be sent.
    ///
    /// Only the latest reservation of the account can be returned; returns
    /// `false` otherwise. An abandoned transaction that is not discarded keeps
    /// its nonce until the node rejects a later one as "nonce too high".
    pub fn discard(&self, txn: &UnsignedTransaction) -> bool {
        txn.nonce <= U256::from(u64::MAX) && self.nonces.release(txn.from, txn.nonce.as_u64())
    }

    /// Wait for `tx_hash` to be mined, at most `timeout`. Never resubmits.
    pub async fn await_receipt(
        &self,
        tx_hash: H256,
        timeout: Duration,
    ) -> Result<TransactionReceipt, WorkflowError> {
        let receipt = tokio::time::timeout(timeout, self.client.wait_for_receipt(tx_hash, timeout))
            .await
            .map_err(|_| WorkflowError::Timeout { tx_hash, waited: timeout })??;
        info!(tx_hash = ?tx_hash, block = ?receipt.block_number, status = ?receipt.status, "Receipt received");
        Ok(receipt)
    }

    /// `ExecutionReverted` unless the receipt reports success.
    pub fn ensure_success(&self, receipt: &TransactionReceipt) -> Result<(), WorkflowError> {
        if receipt.is_success() {
            Ok(())
        } else {
            Err(WorkflowError::ExecutionReverted { tx_hash: receipt.transaction_hash })
        }
    }

    /// Address created by a deployment receipt.
    ///
    /// Some nodes fill `contractAddress` for reverted deployments too, so the
    /// status is checked as well.
    pub fn extract_deployed_address(
        &self,
        receipt: &TransactionReceipt,
    ) -> Result<Address, WorkflowError> {
        match receipt.contract_address {
            Some(address) if receipt.is_success() => Ok(address),
            _ => Err(WorkflowError::DeploymentFailed { tx_hash: receipt.transaction_hash }),
        }
    }

    /// Occurrences of `event_name` emitted by `contract` in `receipt`.
    ///
    /// # Errors
    /// `UnknownEvent` if the ABI has no such event. No matching logs is an empty iterator.
    pub fn decode_events<'a>(
        &self,
        contract: &'a DeployedContract,
        event_name: &str,
        receipt: &'a TransactionReceipt,
    ) -> Result<EventIter<'a>, WorkflowError> {
        let events = contract.artifact.events(event_name)?;
        Ok(EventIter::new(events, contract.address, &receipt.logs))
    }

    /// `eth_call` of `function_name(args)` against the latest state.
    pub async fn read_only_call(
        &self,
        contract: &DeployedContract,
        function_name: &str,
        args: &[Token],
    ) -> Result<Vec<Token>, WorkflowError> {
        let function = contract.artifact.function(function_name, args)?;
        let data = function.encode_input(args)?;
        let output = self.client.call(contract.address, data.into()).await?;
        function.decode_output(&output).map_err(|e| {
            WorkflowError::Decoding(format!("output of {} does not decode: {}", function_name, e))
        })
    }

    /// Build, sign and submit a deployment, then wait for it to be mined.
    pub async fn deploy(
        &self,
        artifact: &ContractArtifact,
        args: &[Token],
        account: &AccountCredentials,
        timeout: Duration,
    ) -> Result<DeployOutcome, WorkflowError> {
        let tx_hash = {
            // 同一账户的构建与发送必须串行
            let _guard = self.nonces.lock_account(account.address).await;
            let txn = self.build_deploy_transaction(artifact, args, account).await?;
            self.sign_and_send(&txn, &account.private_key).await?
        };
        let receipt = self.await_receipt(tx_hash, timeout).await?;
        self.ensure_success(&receipt)?;
        let address = self.extract_deployed_address(&receipt)?;
        info!(address = ?address, tx_hash = ?tx_hash, "Contract deployed");
        Ok(DeployOutcome { contract: DeployedContract::at(artifact.clone(), address), receipt })
    }

    /// Build, sign and submit a contract call, then wait for a successful receipt.
    pub async fn invoke(
        &self,
        contract: &DeployedContract,
        function_name: &str,
        args: &[Token],
        account: &AccountCredentials,
        value: U256,
        timeout: Duration,
    ) -> Result<TransactionReceipt, WorkflowError> {
        let tx_hash = {
            let _guard = self.nonces.lock_account(account.address).await;
            let txn = self
                .build_call_transaction(contract, function_name, args, account, value)
                .await?;
            self.sign_and_send(&txn, &account.private_key).await?
        };
        let receipt = self.await_receipt(tx_hash, timeout).await?;
        self.ensure_success(&receipt)?;
        Ok(receipt)
    }
}

fn sign(
    txn: &UnsignedTransaction,
    private_key: &PrivateKey,
) -> Result<SignedTransaction, WorkflowError> {
    let wallet = private_key.wallet(txn.chain_id)?;
    if wallet.address() != txn.from {
        return Err(WorkflowError::Signing(format!(
            "signing key does not control sender {:?}",
            txn.from
        )));
    }
    let typed = txn.to_typed();
    let signature = wallet
        .sign_transaction_sync(&typed)
        .map_err(|e| WorkflowError::Signing(e.to_string()))?;
    let raw = typed.rlp_signed(&signature);
    Ok(SignedTransaction { hash: H256::from(keccak256(&raw)), raw })
}

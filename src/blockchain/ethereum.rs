use async_trait::async_trait;
use ethers::{
    prelude::JsonRpcClient,
    providers::{Http, Middleware, Provider, RpcError},
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, H256, U256,
    },
};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::traits::ChainClient;
use crate::core::config::ConnectionConfig;
use crate::core::domain::{TransactionReceipt, UnsignedTransaction};
use crate::core::errors::WorkflowError;
use crate::security::redaction::redact_endpoint;

/// `ChainClient` backed by an `ethers` provider.
#[derive(Clone)]
pub struct EthersChainClient<P: JsonRpcClient + Clone = Http> {
    provider: Provider<P>,
    poll_interval: Duration,
}

impl EthersChainClient<Http> {
    /// Build an HTTP provider for `config.endpoint` and check the node answers.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, WorkflowError> {
        let url = config.validate()?;
        info!(endpoint = %redact_endpoint(url.as_str()), "Connecting to node");

        // Build a reqwest client with a bounded timeout; allow proxy environment vars.
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.request_timeout_secs));
        if let Ok(proxy) = std::env::var("HTTPS_PROXY").or_else(|_| std::env::var("HTTP_PROXY")) {
            if let Ok(p) = reqwest::Proxy::all(proxy) {
                builder = builder.proxy(p);
            }
        }
        let client = builder
            .build()
            .map_err(|e| WorkflowError::Connection(format!("failed to build HTTP client: {}", e)))?;

        let provider = Provider::new(Http::new_with_client(url.clone(), client));
        let chain_id = provider.get_chainid().await.map_err(|e| {
            WorkflowError::Connection(format!(
                "node at {} did not answer eth_chainId: {}",
                redact_endpoint(url.as_str()),
                e
            ))
        })?;

        info!(chain_id = %chain_id, "Connected");
        Ok(Self { provider, poll_interval: Duration::from_millis(config.poll_interval_ms) })
    }
}

impl<P: JsonRpcClient + Clone> EthersChainClient<P> {
    /// Wrap an existing provider (e.g. `MockProvider` in tests).
    pub fn new_with_provider(provider: Provider<P>) -> Self {
        Self { provider, poll_interval: Duration::from_millis(500) }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn provider(&self) -> &Provider<P> {
        &self.provider
    }
}

#[async_trait]
impl<P> ChainClient for EthersChainClient<P>
where
    P: JsonRpcClient + Clone + 'static,
{
    async fn get_gas_price(&self) -> Result<U256, WorkflowError> {
        let price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| WorkflowError::Rpc(format!("Failed to get gas price: {}", e)))?;
        debug!("get_gas_price got = 0x{:x}", price);
        Ok(price)
    }

    async fn get_transaction_count(&self, address: Address) -> Result<U256, WorkflowError> {
        let count = self
            .provider
            .get_transaction_count(address, None)
            .await
            .map_err(|e| WorkflowError::Rpc(format!("Failed to get nonce: {}", e)))?;
        debug!(address = ?address, "get_transaction_count got = {}", count);
        Ok(count)
    }

    async fn get_chain_id(&self) -> Result<u64, WorkflowError> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| WorkflowError::Rpc(format!("Failed to get chain id: {}", e)))?;
        if chain_id > U256::from(u64::MAX) {
            return Err(WorkflowError::Rpc(format!("chain id {} out of range", chain_id)));
        }
        Ok(chain_id.as_u64())
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, WorkflowError> {
        self.provider
            .get_code(address, None)
            .await
            .map_err(|e| WorkflowError::Rpc(format!("Failed to get code: {}", e)))
    }

    async fn get_block_number(&self) -> Result<u64, WorkflowError> {
        let block_number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| WorkflowError::Rpc(format!("Failed to get block number: {}", e)))?;
        Ok(block_number.as_u64())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, WorkflowError> {
        // 只有节点返回的JSON-RPC错误才算拒绝，传输失败时交易可能已被接收
        let pending = self.provider.send_raw_transaction(raw).await.map_err(|e| {
            match e.as_error_response() {
                Some(resp) => WorkflowError::Submission(resp.message.clone()),
                None => WorkflowError::Rpc(format!("eth_sendRawTransaction failed: {}", e)),
            }
        })?;
        let tx_hash = pending.tx_hash();
        info!(tx_hash = ?tx_hash, "Transaction sent");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        timeout: Duration,
    ) -> Result<TransactionReceipt, WorkflowError> {
        let poll = async {
            loop {
                match self.provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return TransactionReceipt::from(receipt),
                    Ok(None) => debug!(tx_hash = ?tx_hash, "Receipt not available yet"),
                    // The transaction is already out; a flaky poll must not lose track of it.
                    Err(e) => warn!(tx_hash = ?tx_hash, "Receipt poll failed: {}", e),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| WorkflowError::Timeout { tx_hash, waited: timeout })
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, WorkflowError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.provider
            .call(&tx, None)
            .await
            .map_err(|e| WorkflowError::Rpc(format!("eth_call to {:?} failed: {}", to, e)))
    }

    async fn estimate_gas(&self, txn: &UnsignedTransaction) -> Result<U256, WorkflowError> {
        // An unset gas field lets the node search up to the block limit.
        let mut typed = txn.to_typed();
        if let TypedTransaction::Legacy(request) = &mut typed {
            request.gas = None;
        }
        self.provider
            .estimate_gas(&typed, None)
            .await
            .map_err(|e| WorkflowError::Rpc(format!("Failed to estimate gas: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_malformed_endpoint() {
        let err = EthersChainClient::connect(&ConnectionConfig::new("invalid://url"))
            .await
            .err()
            .expect("should fail");
        assert!(matches!(err, WorkflowError::Connection(_)));
    }

    #[tokio::test]
    async fn connect_reports_unreachable_node() {
        let mut config = ConnectionConfig::new("http://127.0.0.1:1");
        config.request_timeout_secs = 2;
        let err = EthersChainClient::connect(&config).await.err().expect("should fail");
        assert!(matches!(err, WorkflowError::Connection(_)));
    }
}

use ethers::{
    abi::Token,
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, NameOrAddress,
        TransactionRequest, H256, U256,
    },
    utils::to_checksum,
};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use zeroize::Zeroizing;

use crate::core::artifact::ContractArtifact;
use crate::core::errors::WorkflowError;

/// Private key wrapper (32 bytes) with secrecy::Secret for zeroization and display-hiding
pub struct PrivateKey(Secret<[u8; 32]>);

impl PrivateKey {
    pub fn new(k: [u8; 32]) -> Self {
        Self(Secret::new(k))
    }

    /// Scoped access to the underlying secret bytes.
    pub fn with_secret<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8; 32]) -> R,
    {
        f(self.0.expose_secret())
    }

    /// Try to construct a PrivateKey from a byte slice (must be 32 bytes).
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, WorkflowError> {
        if slice.len() != 32 {
            return Err(WorkflowError::Signing(format!(
                "private key must be 32 bytes, got {}",
                slice.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(slice);
        Ok(PrivateKey::new(arr))
    }

    /// Parse a hex key, with or without `0x`.
    pub fn from_hex(key_hex: &str) -> Result<Self, WorkflowError> {
        let trimmed = key_hex.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(WorkflowError::Signing("private key is empty".to_string()));
        }
        let bytes = Zeroizing::new(
            hex::decode(trimmed)
                .map_err(|_| WorkflowError::Signing("private key is not valid hex".to_string()))?,
        );
        Self::try_from_slice(&bytes)
    }

    /// Build a chain-bound signer. The wallet must not outlive the signing call.
    pub(crate) fn wallet(&self, chain_id: u64) -> Result<LocalWallet, WorkflowError> {
        self.with_secret(|bytes| LocalWallet::from_bytes(bytes))
            .map(|w| w.with_chain_id(chain_id))
            .map_err(|e| WorkflowError::Signing(format!("invalid private key: {}", e)))
    }

    /// Address controlled by this key.
    pub fn address(&self) -> Result<Address, WorkflowError> {
        Ok(self.wallet(1)?.address())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Account used to sign deployments and calls.
#[derive(Debug)]
pub struct AccountCredentials {
    pub address: Address,
    pub private_key: PrivateKey,
}

impl AccountCredentials {
    /// Both fields must be present and the key must control the address.
    /// Mixed-case addresses are checked against their EIP-55 checksum.
    pub fn new(address: &str, private_key_hex: &str) -> Result<Self, WorkflowError> {
        let address = parse_address(address)
            .map_err(|e| WorkflowError::Credentials(e.to_string()))?;
        if private_key_hex.trim().is_empty() {
            return Err(WorkflowError::Credentials("private key is empty".to_string()));
        }
        let private_key = PrivateKey::from_hex(private_key_hex)
            .map_err(|e| WorkflowError::Credentials(e.to_string()))?;
        let derived = private_key.address()?;
        if derived != address {
            return Err(WorkflowError::Credentials(format!(
                "private key controls {}, not {}",
                to_checksum(&derived, None),
                to_checksum(&address, None)
            )));
        }
        Ok(Self { address, private_key })
    }

    pub fn from_key(private_key: PrivateKey) -> Result<Self, WorkflowError> {
        let address = private_key.address()?;
        Ok(Self { address, private_key })
    }
}

/// Parse a `0x` address; mixed-case input must match its checksum.
pub fn parse_address(raw: &str) -> Result<Address, WorkflowError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(WorkflowError::Credentials("address is empty".to_string()));
    }
    let address = Address::from_str(raw)
        .map_err(|e| WorkflowError::Credentials(format!("invalid address '{}': {}", raw, e)))?;
    let body = raw.strip_prefix("0x").unwrap_or(raw);
    let mixed_case = body.chars().any(|c| c.is_ascii_lowercase())
        && body.chars().any(|c| c.is_ascii_uppercase());
    if mixed_case && to_checksum(&address, None) != format!("0x{}", body) {
        return Err(WorkflowError::Credentials(format!("bad checksum for address '{}'", raw)));
    }
    Ok(address)
}

/// Everything needed to sign a transaction, fixed at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub from: Address,
    /// `None` for contract creation
    pub to: Option<Address>,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub nonce: U256,
    pub chain_id: u64,
    pub value: U256,
    pub data: Bytes,
}

impl UnsignedTransaction {
    pub fn is_deployment(&self) -> bool {
        self.to.is_none()
    }

    /// Legacy (gas price) transaction request.
    pub fn to_typed(&self) -> TypedTransaction {
        let mut request = TransactionRequest::new()
            .from(self.from)
            .gas_price(self.gas_price)
            .gas(self.gas_limit)
            .nonce(self.nonce)
            .value(self.value)
            .data(self.data.clone())
            .chain_id(self.chain_id);
        if let Some(to) = self.to {
            request.to = Some(NameOrAddress::Address(to));
        }
        TypedTransaction::Legacy(request)
    }
}

/// Raw signed bytes; created, submitted, discarded.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: H256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    Failed,
}

/// One log emitted by a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub log_index: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
    pub status: ReceiptStatus,
    pub contract_address: Option<Address>,
    pub logs: Vec<LogEntry>,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

impl From<ethers::types::TransactionReceipt> for TransactionReceipt {
    fn from(receipt: ethers::types::TransactionReceipt) -> Self {
        // Pre-Byzantium receipts carry no status; treat them as success.
        let status = match receipt.status.map(|s| s.as_u64()) {
            Some(0) => ReceiptStatus::Failed,
            _ => ReceiptStatus::Success,
        };
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            status,
            contract_address: receipt.contract_address,
            logs: receipt
                .logs
                .into_iter()
                .map(|log| LogEntry {
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                    log_index: log.log_index.map(|i| i.as_u64()),
                })
                .collect(),
        }
    }
}

/// A contract with a resolved on-chain address.
#[derive(Debug, Clone)]
pub struct DeployedContract {
    pub artifact: ContractArtifact,
    pub address: Address,
}

impl DeployedContract {
    /// Attach to an already-deployed contract.
    pub fn at(artifact: ContractArtifact, address: Address) -> Self {
        Self { artifact, address }
    }
}

/// A decoded event occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub name: String,
    pub address: Address,
    pub log_index: Option<u64>,
    pub params: Vec<(String, Token)>,
}

impl EventRecord {
    pub fn param(&self, name: &str) -> Option<&Token> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

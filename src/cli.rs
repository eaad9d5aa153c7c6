use clap::{Parser, Subcommand};
use ethers::abi::Token;
use std::path::PathBuf;
use zeroize::Zeroizing;

use crate::core::abi::parse_args;
use crate::core::artifact::ContractArtifact;
use crate::core::domain::AccountCredentials;
use crate::core::errors::WorkflowError;

pub const DEFAULT_CONFIG_PATH: &str = "contract-flow.toml";
pub const ADDRESS_ENV: &str = "CONTRACT_FLOW_ADDRESS";
pub const PRIVATE_KEY_ENV: &str = "CONTRACT_FLOW_PRIVATE_KEY";

/// Contract workflow CLI (library-facing definitions)
#[derive(Debug, Parser)]
#[command(
    name = "contract-flow",
    about = "Deploy, call and read EVM smart contracts",
    version,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// TOML configuration file; ignored when the default path does not exist
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Node endpoint, takes precedence over the config file and CONTRACT_FLOW_RPC_URL
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the latest block number
    BlockNumber,
    /// Print the code deployed at an address
    Code {
        #[arg(long)]
        address: String,
    },
    /// Deploy a compiled contract
    Deploy {
        /// ABI JSON file
        #[arg(long)]
        abi: PathBuf,
        /// Bytecode hex file
        #[arg(long)]
        bin: PathBuf,
        /// Constructor argument, repeat in declaration order
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Send a state-changing contract transaction
    Send {
        #[arg(long)]
        abi: PathBuf,
        #[arg(long)]
        address: String,
        #[arg(long)]
        function: String,
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
        /// Wei to attach
        #[arg(long, default_value = "0")]
        value: String,
        /// Decode this event from the receipt
        #[arg(long)]
        event: Option<String>,
    },
    /// Decode events from a mined transaction
    Events {
        #[arg(long)]
        abi: PathBuf,
        #[arg(long)]
        address: String,
        #[arg(long)]
        event: String,
        #[arg(long = "tx-hash")]
        tx_hash: String,
    },
    /// Call a view function
    Read {
        #[arg(long)]
        abi: PathBuf,
        #[arg(long)]
        address: String,
        #[arg(long)]
        function: String,
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

/// 从环境变量读取账户凭据
pub fn credentials_from_env() -> Result<AccountCredentials, WorkflowError> {
    let address = std::env::var(ADDRESS_ENV)
        .map_err(|_| WorkflowError::Credentials(format!("{} is not set", ADDRESS_ENV)))?;
    let key = Zeroizing::new(
        std::env::var(PRIVATE_KEY_ENV)
            .map_err(|_| WorkflowError::Credentials(format!("{} is not set", PRIVATE_KEY_ENV)))?,
    );
    AccountCredentials::new(&address, &key)
}

/// Parse constructor arguments from their textual form.
pub fn parse_constructor_args(
    artifact: &ContractArtifact,
    raw: &[String],
) -> Result<Vec<Token>, WorkflowError> {
    let params = artifact.abi.constructor().map(|c| c.inputs.clone()).unwrap_or_default();
    parse_args("constructor", &params, raw)
}

/// Parse function arguments, picking the first overload whose arity and types fit.
pub fn parse_function_args(
    artifact: &ContractArtifact,
    function: &str,
    raw: &[String],
) -> Result<Vec<Token>, WorkflowError> {
    let candidates = artifact
        .abi
        .functions_by_name(function)
        .map_err(|_| WorkflowError::UnknownFunction(function.to_string()))?;
    let mut last_err = None;
    let mut matched = Vec::new();
    for candidate in candidates {
        match parse_args(function, &candidate.inputs, raw) {
            Ok(tokens) => matched.push((candidate.signature(), tokens)),
            Err(e) => last_err = Some(e),
        }
    }
    match matched.len() {
        0 => Err(last_err.unwrap_or_else(|| WorkflowError::UnknownFunction(function.to_string()))),
        1 => Ok(matched.remove(0).1),
        _ => {
            let signatures: Vec<String> = matched.into_iter().map(|(sig, _)| sig).collect();
            Err(WorkflowError::Encoding(format!(
                "ambiguous call to '{}': arguments fit {}",
                function,
                signatures.join(", ")
            )))
        }
    }
}

// src/main.rs
//! contract-flow entry point: runs one workflow action and prints JSON to stdout.
use anyhow::{Context, Result};
use clap::Parser;
use contract_flow::cli::{
    credentials_from_env, parse_constructor_args, parse_function_args, Cli, Commands,
    DEFAULT_CONFIG_PATH,
};
use contract_flow::core::abi::format_token;
use contract_flow::core::domain::parse_address;
use contract_flow::core::{ContractArtifact, DeployedContract, EventRecord, WorkflowConfig};
use contract_flow::workflow::ContractWorkflow;
use ethers::types::{H256, U256};
use ethers::utils::to_checksum;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;
    info!("Starting contract-flow v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let output = run(cli.command, &config).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=info,h2=info"));

    // stdout carries the JSON result
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// File (if present) -> CONTRACT_FLOW_RPC_URL -> --endpoint.
fn load_config(cli: &Cli) -> Result<WorkflowConfig> {
    let mut config = if cli.config.exists() {
        WorkflowConfig::load(&cli.config)?
    } else if cli.config.as_os_str() == DEFAULT_CONFIG_PATH {
        WorkflowConfig::default()
    } else {
        anyhow::bail!("config file {} not found", cli.config.display());
    };
    config = config.apply_env_overrides()?;
    if let Some(endpoint) = &cli.endpoint {
        config.connection.endpoint = endpoint.clone();
        config.connection.validate()?;
    }
    Ok(config)
}

async fn run(command: Commands, config: &WorkflowConfig) -> Result<Value> {
    // Fail on missing credentials before touching the network.
    let account = match &command {
        Commands::Deploy { .. } | Commands::Send { .. } => Some(credentials_from_env()?),
        _ => None,
    };
    let workflow = ContractWorkflow::connect(config).await?;
    let timeout = config.receipt.timeout();

    match command {
        Commands::BlockNumber => {
            let block_number = workflow.block_number().await?;
            Ok(json!({ "block_number": block_number }))
        }
        Commands::Code { address } => {
            let address = parse_address(&address)?;
            let code = workflow.get_code(address).await?;
            Ok(json!({
                "address": to_checksum(&address, None),
                "code": format!("0x{}", hex::encode(&code)),
            }))
        }
        Commands::Deploy { abi, bin, args } => {
            let artifact = ContractArtifact::from_files(&abi, Some(bin.as_path()))
                .with_context(|| format!("loading artifact {}", abi.display()))?;
            let tokens = parse_constructor_args(&artifact, &args)?;
            let account = account.context("credentials not loaded")?;
            let outcome = workflow.deploy(&artifact, &tokens, &account, timeout).await?;
            Ok(json!({
                "address": to_checksum(&outcome.contract.address, None),
                "tx_hash": format!("{:?}", outcome.receipt.transaction_hash),
                "block_number": outcome.receipt.block_number,
            }))
        }
        Commands::Send { abi, address, function, args, value, event } => {
            let contract = attach(&abi, &address)?;
            let tokens = parse_function_args(&contract.artifact, &function, &args)?;
            let value = U256::from_dec_str(value.trim())
                .with_context(|| format!("invalid value '{}'", value))?;
            let account = account.context("credentials not loaded")?;
            let receipt =
                workflow.invoke(&contract, &function, &tokens, &account, value, timeout).await?;
            let mut output = json!({
                "tx_hash": format!("{:?}", receipt.transaction_hash),
                "block_number": receipt.block_number,
                "status": "success",
            });
            if let Some(event) = event {
                let records = workflow
                    .decode_events(&contract, &event, &receipt)?
                    .collect::<Result<Vec<_>, _>>()?;
                output["events"] = Value::Array(records.iter().map(event_json).collect());
            }
            Ok(output)
        }
        Commands::Events { abi, address, event, tx_hash } => {
            let contract = attach(&abi, &address)?;
            let tx_hash = H256::from_str(tx_hash.trim())
                .with_context(|| format!("invalid transaction hash '{}'", tx_hash))?;
            let receipt = workflow.await_receipt(tx_hash, timeout).await?;
            let records = workflow
                .decode_events(&contract, &event, &receipt)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(json!({ "events": records.iter().map(event_json).collect::<Vec<_>>() }))
        }
        Commands::Read { abi, address, function, args } => {
            let contract = attach(&abi, &address)?;
            let tokens = parse_function_args(&contract.artifact, &function, &args)?;
            let outputs = workflow.read_only_call(&contract, &function, &tokens).await?;
            Ok(json!({ "outputs": outputs.iter().map(format_token).collect::<Vec<_>>() }))
        }
    }
}

fn attach(abi: &std::path::Path, address: &str) -> Result<DeployedContract> {
    let artifact = ContractArtifact::from_files(abi, None)
        .with_context(|| format!("loading ABI {}", abi.display()))?;
    Ok(DeployedContract::at(artifact, parse_address(address)?))
}

fn event_json(record: &EventRecord) -> Value {
    let params: serde_json::Map<String, Value> = record
        .params
        .iter()
        .map(|(name, token)| (name.clone(), Value::String(format_token(token))))
        .collect();
    json!({
        "event": record.name,
        "address": to_checksum(&record.address, None),
        "log_index": record.log_index,
        "params": params,
    })
}

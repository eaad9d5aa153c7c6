#![allow(clippy::needless_return)]
#![allow(clippy::len_zero)]
// src/lib.rs
//! EVM contract workflow: deploy, call, decode events and read state through
//! a pluggable [`blockchain::ChainClient`].

pub mod blockchain;
pub mod cli;
pub mod core;
pub mod security;
pub mod workflow;

pub use crate::blockchain::{ChainClient, EthersChainClient, MockChainClient};
pub use crate::core::WorkflowError;
pub use crate::workflow::{ContractWorkflow, DeployOutcome};

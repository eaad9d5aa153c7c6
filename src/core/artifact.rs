//! Compiled contract artifacts: interface description plus optional bytecode.
//!
//! Artifacts are compiler outputs (`.abi` JSON array and `.bin` hex) and are
//! treated as opaque inputs; only lookup and argument checks live here.

use ethers::{
    abi::{Abi, Event, Function, Token},
    types::Bytes,
};
use std::path::Path;

use crate::core::abi::check_tokens;
use crate::core::errors::WorkflowError;

#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub abi: Abi,
    bytecode: Option<Bytes>,
}

impl ContractArtifact {
    /// Interface-only artifact, enough to talk to an existing contract.
    pub fn new(abi: Abi) -> Self {
        Self { abi, bytecode: None }
    }

    pub fn with_bytecode(abi: Abi, bytecode: Bytes) -> Self {
        let bytecode = if bytecode.is_empty() { None } else { Some(bytecode) };
        Self { abi, bytecode }
    }

    /// Parse an ABI JSON array and optional bytecode hex (with or without `0x`).
    pub fn from_json(abi_json: &str, bytecode_hex: Option<&str>) -> Result<Self, WorkflowError> {
        let abi: Abi = serde_json::from_str(abi_json)
            .map_err(|e| WorkflowError::Artifact(format!("invalid ABI JSON: {}", e)))?;
        let bytecode = match bytecode_hex {
            Some(code) => Some(decode_bytecode(code)?),
            None => None,
        };
        Ok(Self { abi, bytecode: bytecode.filter(|b| !b.is_empty()) })
    }

    /// Load compiler output files.
    pub fn from_files(
        abi_path: impl AsRef<Path>,
        bin_path: Option<&Path>,
    ) -> Result<Self, WorkflowError> {
        let abi_path = abi_path.as_ref();
        let abi_json = std::fs::read_to_string(abi_path).map_err(|e| {
            WorkflowError::Artifact(format!("failed to read {}: {}", abi_path.display(), e))
        })?;
        let bin = match bin_path {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
                WorkflowError::Artifact(format!("failed to read {}: {}", path.display(), e))
            })?),
            None => None,
        };
        Self::from_json(&abi_json, bin.as_deref())
    }

    /// Creation bytecode; required for deployment.
    pub fn bytecode(&self) -> Result<&Bytes, WorkflowError> {
        self.bytecode
            .as_ref()
            .ok_or_else(|| WorkflowError::Artifact("artifact has no bytecode".to_string()))
    }

    /// Bytecode followed by the ABI-encoded constructor arguments.
    pub fn encode_deployment(&self, args: &[Token]) -> Result<Bytes, WorkflowError> {
        let code = self.bytecode()?.to_vec();
        match self.abi.constructor() {
            Some(constructor) => {
                check_tokens("constructor", &constructor.inputs, args)?;
                Ok(constructor.encode_input(code, args)?.into())
            }
            None if args.is_empty() => Ok(code.into()),
            None => Err(WorkflowError::Encoding(format!(
                "contract has no constructor but {} argument(s) were given",
                args.len()
            ))),
        }
    }

    /// Resolve `name` to the overload accepting `args`.
    pub fn function(&self, name: &str, args: &[Token]) -> Result<&Function, WorkflowError> {
        let candidates = self
            .abi
            .functions_by_name(name)
            .map_err(|_| WorkflowError::UnknownFunction(name.to_string()))?;
        if let [only] = candidates.as_slice() {
            check_tokens(name, &only.inputs, args)?;
            return Ok(only);
        }
        candidates
            .iter()
            .find(|f| check_tokens(name, &f.inputs, args).is_ok())
            .ok_or_else(|| {
                WorkflowError::Encoding(format!(
                    "no overload of '{}' accepts {} argument(s) of the given types",
                    name,
                    args.len()
                ))
            })
    }

    /// Selector-prefixed call data for `name(args)`.
    pub fn encode_call(&self, name: &str, args: &[Token]) -> Result<Bytes, WorkflowError> {
        let function = self.function(name, args)?;
        Ok(function.encode_input(args)?.into())
    }

    /// All events declared under `name` (overloads included).
    pub fn events(&self, name: &str) -> Result<&[Event], WorkflowError> {
        self.abi
            .events_by_name(name)
            .map(|events| events.as_slice())
            .map_err(|_| WorkflowError::UnknownEvent(name.to_string()))
    }
}

fn decode_bytecode(code: &str) -> Result<Bytes, WorkflowError> {
    let code = code.trim();
    let code = code.strip_prefix("0x").unwrap_or(code);
    hex::decode(code)
        .map(Bytes::from)
        .map_err(|e| WorkflowError::Artifact(format!("bytecode is not valid hex: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::ParamType;
    use ethers::types::{Address, U256};

    const TOKEN_ABI: &str = r#"[
        {"type":"constructor","inputs":[{"name":"supply","type":"uint256"}],"stateMutability":"nonpayable"},
        {"type":"function","name":"mint","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"},
        {"type":"function","name":"balance","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"event","name":"Minted","inputs":[{"name":"to","type":"address","indexed":true},{"name":"amount","type":"uint256","indexed":false}],"anonymous":false}
    ]"#;

    #[test]
    fn parses_abi_and_prefixed_bytecode() {
        let artifact = ContractArtifact::from_json(TOKEN_ABI, Some("0x600a")).unwrap();
        assert_eq!(artifact.bytecode().unwrap().to_vec(), vec![0x60, 0x0a]);
        assert!(artifact.abi.constructor().is_some());
    }

    #[test]
    fn empty_bytecode_is_missing() {
        let artifact = ContractArtifact::from_json(TOKEN_ABI, Some("")).unwrap();
        assert!(matches!(artifact.bytecode(), Err(WorkflowError::Artifact(_))));
        let interface_only = ContractArtifact::from_json(TOKEN_ABI, None).unwrap();
        assert!(matches!(
            interface_only.encode_deployment(&[Token::Uint(U256::one())]),
            Err(WorkflowError::Artifact(_))
        ));
    }

    #[test]
    fn invalid_abi_json_is_artifact_error() {
        let err = ContractArtifact::from_json("{not json", None).unwrap_err();
        assert!(matches!(err, WorkflowError::Artifact(_)));
    }

    #[test]
    fn constructor_arity_mismatch() {
        let artifact = ContractArtifact::from_json(TOKEN_ABI, Some("600a")).unwrap();
        let err = artifact.encode_deployment(&[]).unwrap_err();
        assert!(matches!(err, WorkflowError::Encoding(_)));
    }

    #[test]
    fn no_constructor_rejects_args() {
        let artifact = ContractArtifact::from_json("[]", Some("600a")).unwrap();
        assert_eq!(artifact.encode_deployment(&[]).unwrap().to_vec(), vec![0x60, 0x0a]);
        assert!(matches!(
            artifact.encode_deployment(&[Token::Bool(true)]),
            Err(WorkflowError::Encoding(_))
        ));
    }

    #[test]
    fn unknown_function_and_event() {
        let artifact = ContractArtifact::from_json(TOKEN_ABI, None).unwrap();
        assert!(matches!(
            artifact.encode_call("burn", &[]),
            Err(WorkflowError::UnknownFunction(name)) if name == "burn"
        ));
        assert!(matches!(artifact.events("Burned"), Err(WorkflowError::UnknownEvent(_))));
        assert_eq!(artifact.events("Minted").unwrap().len(), 1);
    }

    #[test]
    fn call_type_mismatch_is_encoding_error() {
        let artifact = ContractArtifact::from_json(TOKEN_ABI, None).unwrap();
        let err = artifact
            .encode_call("mint", &[Token::Bool(true), Token::Uint(U256::one())])
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Encoding(_)));
    }

    #[test]
    fn encodes_call_with_selector() {
        let artifact = ContractArtifact::from_json(TOKEN_ABI, None).unwrap();
        let data = artifact
            .encode_call(
                "mint",
                &[Token::Address(Address::repeat_byte(0x22)), Token::Uint(U256::from(1000u64))],
            )
            .unwrap();
        assert_eq!(data.len(), 4 + 64);
        let selector = artifact.abi.function("mint").unwrap().short_signature();
        assert_eq!(&data[..4], &selector);
    }

    #[test]
    fn overloads_resolve_by_arguments() {
        let abi = r#"[
            {"type":"function","name":"set","inputs":[{"name":"v","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"},
            {"type":"function","name":"set","inputs":[{"name":"v","type":"bool"}],"outputs":[],"stateMutability":"nonpayable"}
        ]"#;
        let artifact = ContractArtifact::from_json(abi, None).unwrap();
        let f = artifact.function("set", &[Token::Bool(false)]).unwrap();
        assert_eq!(f.inputs[0].kind, ParamType::Bool);
        let f = artifact.function("set", &[Token::Uint(U256::one())]).unwrap();
        assert_eq!(f.inputs[0].kind, ParamType::Uint(256));
        assert!(matches!(
            artifact.function("set", &[Token::String("x".into())]),
            Err(WorkflowError::Encoding(_))
        ));
    }
}

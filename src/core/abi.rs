use ethers::abi::{
    token::{LenientTokenizer, Tokenizer},
    Param, ParamType, Token,
};

use crate::core::errors::WorkflowError;

/// Compute the first 4 bytes (function selector) from a signature string, e.g. "transfer(address,uint256)".
pub fn selector_from_signature(signature: &str) -> [u8; 4] {
    ethers::utils::id(signature)
}

/// Check arity and per-position types of `args` against `params`.
pub fn check_tokens(name: &str, params: &[Param], args: &[Token]) -> Result<(), WorkflowError> {
    if params.len() != args.len() {
        return Err(WorkflowError::Encoding(format!(
            "'{}' expects {} argument(s), got {}",
            name,
            params.len(),
            args.len()
        )));
    }
    for (param, arg) in params.iter().zip(args) {
        if !arg.type_check(&param.kind) {
            return Err(WorkflowError::Encoding(format!(
                "argument '{}' of '{}' expects {}, got {:?}",
                param.name, name, param.kind, arg
            )));
        }
    }
    Ok(())
}

/// Parse textual arguments against parameter types.
///
/// Accepts decimal or `0x` integers, `true`/`false`, `0x` addresses and bytes,
/// and bracketed arrays/tuples (e.g. `[1,2]`, `(0x..,5)`).
pub fn parse_args(name: &str, params: &[Param], raw: &[String]) -> Result<Vec<Token>, WorkflowError> {
    if params.len() != raw.len() {
        return Err(WorkflowError::Encoding(format!(
            "'{}' expects {} argument(s), got {}",
            name,
            params.len(),
            raw.len()
        )));
    }
    params
        .iter()
        .zip(raw)
        .map(|(param, value)| parse_token(&param.kind, value))
        .collect()
}

pub fn parse_token(kind: &ParamType, value: &str) -> Result<Token, WorkflowError> {
    let value = value.trim();
    let input = match kind {
        ParamType::Address | ParamType::Bytes | ParamType::FixedBytes(_) => {
            value.strip_prefix("0x").unwrap_or(value)
        }
        _ => value,
    };
    LenientTokenizer::tokenize(kind, input).map_err(|e| {
        WorkflowError::Encoding(format!("cannot parse '{}' as {}: {}", value, kind, e))
    })
}

/// Human-readable token, `0x`-prefixed for addresses and bytes.
pub fn format_token(token: &Token) -> String {
    match token {
        Token::Address(a) => format!("{:?}", a),
        Token::Bytes(b) | Token::FixedBytes(b) => format!("0x{}", hex::encode(b)),
        Token::Int(v) => ethers::types::I256::from_raw(*v).to_string(),
        Token::Uint(v) => v.to_string(),
        Token::Bool(b) => b.to_string(),
        Token::String(s) => s.clone(),
        Token::Array(items) | Token::FixedArray(items) => {
            format!("[{}]", items.iter().map(format_token).collect::<Vec<_>>().join(","))
        }
        Token::Tuple(items) => {
            format!("({})", items.iter().map(format_token).collect::<Vec<_>>().join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, U256};

    fn param(name: &str, kind: ParamType) -> Param {
        Param { name: name.to_string(), kind, internal_type: None }
    }

    #[test]
    fn test_selector_from_signature() {
        // transfer(address,uint256) -> a9059cbb
        let sel = selector_from_signature("transfer(address,uint256)");
        assert_eq!(sel, [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_check_tokens_arity() {
        let params = vec![param("to", ParamType::Address)];
        let err = check_tokens("mint", &params, &[]).unwrap_err();
        assert!(err.to_string().contains("expects 1"));
    }

    #[test]
    fn test_check_tokens_types() {
        let params = vec![param("amount", ParamType::Uint(256))];
        assert!(check_tokens("f", &params, &[Token::Uint(U256::from(5u64))]).is_ok());
        let err = check_tokens("f", &params, &[Token::Bool(true)]).unwrap_err();
        assert!(matches!(err, WorkflowError::Encoding(_)));
    }

    #[test]
    fn test_parse_args() {
        let params = vec![
            param("to", ParamType::Address),
            param("amount", ParamType::Uint(256)),
            param("flag", ParamType::Bool),
        ];
        let raw = vec![
            "0x2222222222222222222222222222222222222222".to_string(),
            "1000".to_string(),
            "true".to_string(),
        ];
        let tokens = parse_args("mint", &params, &raw).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Address(Address::repeat_byte(0x22)),
                Token::Uint(U256::from(1000u64)),
                Token::Bool(true),
            ]
        );
    }

    #[test]
    fn test_parse_args_rejects_garbage() {
        let params = vec![param("amount", ParamType::Uint(256))];
        let err = parse_args("f", &params, &["lots".to_string()]).unwrap_err();
        assert!(matches!(err, WorkflowError::Encoding(_)));
        let err = parse_args("f", &params, &[]).unwrap_err();
        assert!(err.to_string().contains("expects 1"));
    }

    #[test]
    fn test_format_token() {
        assert_eq!(format_token(&Token::Uint(U256::from(42u64))), "42");
        assert_eq!(format_token(&Token::Bytes(vec![0xde, 0xad])), "0xdead");
        assert_eq!(
            format_token(&Token::Array(vec![Token::Bool(true), Token::Bool(false)])),
            "[true,false]"
        );
    }
}

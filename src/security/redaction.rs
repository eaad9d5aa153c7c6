// Simple helpers to avoid accidental printing of secrets in logs/tests.
use std::env;

/// Reduce an endpoint URL to scheme, host and port unless DEV_PRINT_SECRETS=1 is set.
///
/// Hosted RPC providers put the project key in the path or query
/// (e.g. `https://mainnet.infura.io/v3/<key>`), so the full URL is never logged.
pub fn redact_endpoint(endpoint: &str) -> String {
    if env::var("DEV_PRINT_SECRETS").ok().as_deref() == Some("1") {
        // Developer explicitly allowed printing secrets
        return endpoint.to_string();
    }
    match reqwest::Url::parse(endpoint) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("<no-host>");
            let hidden = url.path().len() > 1 || url.query().is_some();
            let suffix = if hidden { "/<redacted>" } else { "" };
            match url.port() {
                Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, suffix),
                None => format!("{}://{}{}", url.scheme(), host, suffix),
            }
        }
        Err(_) => format!("<redacted len={}>", endpoint.len()),
    }
}

/// Redact hex-serializable bytes unless DEV_PRINT_SECRETS=1 is set.
pub fn redact_hex_bytes(bytes: &[u8]) -> String {
    if env::var("DEV_PRINT_SECRETS").ok().as_deref() == Some("1") {
        return format!("0x{}", hex::encode(bytes));
    }
    format!("<redacted hex len={}>", bytes.len())
}

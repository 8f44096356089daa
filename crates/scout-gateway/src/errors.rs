//! Mapping of gateway failures onto `ClientError`.

use std::time::Duration;

use scout_core::errors::ClientError;

/// Map an upstream RPC error name (e.g. `FLOOD_WAIT_12`) onto a `ClientError`.
///
/// `seconds` is the wait the gateway reported separately, if any.
pub fn classify_rpc_error(name: &str, seconds: Option<u64>) -> ClientError {
    let upper = name.trim().to_ascii_uppercase();

    if let Some(wait) = flood_wait(&upper, seconds) {
        return ClientError::RateLimited {
            wait: Duration::from_secs(wait),
        };
    }

    match upper.as_str() {
        "SESSION_PASSWORD_NEEDED" => ClientError::PasswordRequired,
        "PHONE_NUMBER_INVALID" => ClientError::PhoneNumberInvalid,
        "SESSION_REVOKED" => ClientError::AuthKeyInvalid,
        s if s.starts_with("AUTH_KEY_") => ClientError::AuthKeyInvalid,
        s if s.ends_with("_TIMEOUT") || s == "RPC_CALL_FAIL" || s == "INTERNAL" => {
            ClientError::Transient(name.to_string())
        }
        _ => ClientError::Unexpected(name.to_string()),
    }
}

fn flood_wait(upper: &str, seconds: Option<u64>) -> Option<u64> {
    let rest = upper
        .strip_prefix("FLOOD_PREMIUM_WAIT")
        .or_else(|| upper.strip_prefix("FLOOD_WAIT"))?;
    let embedded = rest.strip_prefix('_').and_then(|n| n.parse::<u64>().ok());
    Some(embedded.or(seconds).unwrap_or(0))
}

/// Map a non-success HTTP response from the gateway.
pub fn classify_status(status: u16, body: &serde_json::Value, retry_after: Option<u64>) -> ClientError {
    let seconds = body
        .get("seconds")
        .and_then(|v| v.as_u64())
        .or(retry_after);

    if let Some(name) = body.get("error").and_then(|v| v.as_str()) {
        return match classify_rpc_error(name, seconds) {
            // Unnamed upstream trouble behind a 5xx is worth retrying.
            ClientError::Unexpected(msg) if status >= 500 => ClientError::Transient(msg),
            other => other,
        };
    }

    match status {
        429 => ClientError::RateLimited {
            wait: Duration::from_secs(seconds.unwrap_or(1)),
        },
        500..=599 => ClientError::Transient(format!("gateway returned {status}")),
        _ => ClientError::Unexpected(format!("gateway returned {status}")),
    }
}

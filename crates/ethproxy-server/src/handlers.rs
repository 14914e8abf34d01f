//! Route handlers.
//!
//! Every pool-touching handler follows the same linear flow: validate path
//! parameters, bound the upstream call with a fixed timeout, translate the
//! outcome to a status code and JSON body. Validation failures never reach
//! the pool.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, B256};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ethproxy_common::{
    BalanceResponse, EthProxyError, HealthResponse, JsonError, Result, StatusResponse, TxResponse,
};

use crate::service::AppState;

/// Upper bound on any single upstream interaction.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn json_error(code: StatusCode, message: impl Into<String>) -> Response {
    (
        code,
        Json(JsonError {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Upstream failures surface as 500 with the connector's message. The
/// cancellation kinds keep their distinct wording so callers can tell a
/// timeout from a node rejection.
fn eth_client_error(err: EthProxyError) -> Response {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("eth client error: {err}"),
    )
}

/// Bounds an upstream call with [`REQUEST_TIMEOUT`]. Expiry cancels the
/// in-flight call (the future is dropped) and yields a timeout error.
async fn bounded<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(REQUEST_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(EthProxyError::Timeout(REQUEST_TIMEOUT.as_millis() as u64)),
    }
}

fn strip_hex_prefix(raw: &str) -> Option<&str> {
    raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))
}

/// Accepts an optionally `0x`-prefixed, case-insensitive 20-byte hex string.
fn parse_address(raw: &str) -> Option<Address> {
    let digits = strip_hex_prefix(raw).unwrap_or(raw);
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    hex::decode(digits).ok().map(|b| Address::from_slice(&b))
}

/// The hash must decode to exactly 32 bytes.
fn parse_hash(raw: &str) -> Option<B256> {
    let digits = strip_hex_prefix(raw).unwrap_or(raw);
    if digits.len() != 64 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    hex::decode(digits).ok().map(|b| B256::from_slice(&b))
}

/// Liveness probe. Always OK, never touches the pool: an orchestrator must
/// be able to tell "process is alive" from "process can serve traffic".
pub async fn status(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        Json(StatusResponse {
            message: "OK".to_string(),
            version: state.build_info.version.to_string(),
            service: state.build_info.service.to_string(),
        }),
    )
        .into_response()
}

/// Readiness probe. Sweeps every backend's chain tip; any per-node failure
/// or tip divergence flips the response to 503 with the failure list.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let failures: Vec<String> =
        match tokio::time::timeout(REQUEST_TIMEOUT, state.pool.check_chain_tips()).await {
            Ok(report) => report.failures.iter().map(|f| f.to_string()).collect(),
            Err(_) => vec![format!(
                "health check err: {}",
                EthProxyError::Timeout(REQUEST_TIMEOUT.as_millis() as u64)
            )],
        };

    let code = if failures.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(HealthResponse {
            version: state.build_info.version.to_string(),
            service: state.build_info.service.to_string(),
            failures,
        }),
    )
        .into_response()
}

/// `GET /eth/v0/balance/{address}` - latest balance as a base-10 string.
pub async fn balance(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Response {
    let Some(account) = parse_address(&address) else {
        return json_error(StatusCode::BAD_REQUEST, "invalid address format");
    };
    match bounded(state.pool.balance_at(account)).await {
        Ok(balance) => (
            StatusCode::OK,
            Json(BalanceResponse {
                balance: balance.to_string(),
            }),
        )
            .into_response(),
        Err(err) => eth_client_error(err),
    }
}

/// `GET /eth/v0/tx/hash/{hash}` - transaction lookup with pending flag.
pub async fn transaction_by_hash(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Response {
    let Some(tx_hash) = parse_hash(&hash) else {
        return json_error(StatusCode::BAD_REQUEST, "invalid hash");
    };
    match bounded(state.pool.transaction_by_hash(tx_hash)).await {
        Ok((tx, is_pending)) => (
            StatusCode::OK,
            Json(TxResponse {
                tx: Some(tx),
                txid: tx_hash.to_string(),
                is_pending,
            }),
        )
            .into_response(),
        Err(err) => eth_client_error(err),
    }
}

/// `GET /eth/v0/tx/receipt/{hash}` - receipt lookup. A nil receipt with no
/// error is a distinct case from an upstream failure and maps to 404.
pub async fn transaction_receipt(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Response {
    let Some(tx_hash) = parse_hash(&hash) else {
        return json_error(StatusCode::BAD_REQUEST, "invalid hash");
    };
    match bounded(state.pool.transaction_receipt(tx_hash)).await {
        Ok(Some(receipt)) => (StatusCode::OK, Json(receipt)).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "not found"),
        Err(err) => eth_client_error(err),
    }
}

/// `POST /eth/v0/tx/new/{hexdata}` - broadcast of a signed transaction.
/// The payload must hex-decode (`0x`-prefixed) and then deserialize via the
/// binary transaction format; failure at either step is a 400.
pub async fn send_transaction(
    State(state): State<Arc<AppState>>,
    Path(data): Path<String>,
) -> Response {
    let raw = match decode_raw_tx(&data) {
        Ok(raw) => raw,
        Err(message) => return json_error(StatusCode::BAD_REQUEST, message),
    };
    let envelope = match TxEnvelope::decode_2718(&mut raw.as_slice()) {
        Ok(envelope) => envelope,
        Err(err) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                format!("could not decode transaction: {err}"),
            )
        }
    };
    match bounded(state.pool.send_raw_transaction(&raw)).await {
        Ok(()) => (
            StatusCode::OK,
            Json(TxResponse {
                tx: None,
                txid: envelope.tx_hash().to_string(),
                is_pending: false,
            }),
        )
            .into_response(),
        Err(err) => eth_client_error(err),
    }
}

fn decode_raw_tx(data: &str) -> std::result::Result<Vec<u8>, String> {
    let digits =
        strip_hex_prefix(data).ok_or_else(|| "invalid tx data: hex string without 0x prefix".to_string())?;
    hex::decode(digits).map_err(|err| format!("invalid tx data: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parsing_accepts_with_and_without_prefix() {
        let canonical = "fe3b557e8fb62b89f4916b721be55ceb828dbd73";
        assert!(parse_address(&format!("0x{canonical}")).is_some());
        assert!(parse_address(canonical).is_some());
        assert!(parse_address(&format!("0x{}", canonical.to_uppercase())).is_some());
    }

    #[test]
    fn test_address_parsing_rejects_bad_input() {
        assert!(parse_address("0x1234").is_none());
        assert!(parse_address("").is_none());
        assert!(parse_address("0xzz3b557e8fb62b89f4916b721be55ceb828dbd73").is_none());
        // 41 digits
        assert!(parse_address("0xfe3b557e8fb62b89f4916b721be55ceb828dbd731").is_none());
    }

    #[test]
    fn test_hash_parsing_requires_exactly_32_bytes() {
        let h = "326c7dbb58eaf646af01f7b6f4fb1e0fb1afe1329ac670ce5945e8fd940ec4d7";
        assert!(parse_hash(&format!("0x{h}")).is_some());
        assert!(parse_hash(h).is_some());
        assert!(parse_hash(&h[..62]).is_none());
        assert!(parse_hash(&format!("0x{h}00")).is_none());
    }

    #[test]
    fn test_raw_tx_decoding_requires_prefix_and_valid_hex() {
        assert_eq!(
            decode_raw_tx("02f870").unwrap_err(),
            "invalid tx data: hex string without 0x prefix"
        );
        assert!(decode_raw_tx("0xnothex").unwrap_err().starts_with("invalid tx data:"));
        assert_eq!(decode_raw_tx("0x02f8").unwrap(), vec![0x02, 0xf8]);
    }
}

use alloy::rpc::types::Transaction;
use serde::{Deserialize, Serialize};

/// Service identifier reported by `/status` and `/health`.
pub const SERVICE_NAME: &str = "eth-proxy";

// Probe and metrics endpoints.
pub const STATUS_ENDPOINT: &str = "/status"; // liveness probing
pub const HEALTH_ENDPOINT: &str = "/health"; // readiness probing
pub const METRICS_ENDPOINT: &str = "/metrics"; // Prometheus exposition

// Proxy endpoint prefixes, shared with the typed client.
pub const ETH_V0_BALANCE_PREFIX: &str = "/eth/v0/balance/"; // eth_getBalance
pub const ETH_V0_TX_PREFIX: &str = "/eth/v0/tx/hash/"; // eth_getTransactionByHash
pub const ETH_V0_TX_RECEIPT_PREFIX: &str = "/eth/v0/tx/receipt/"; // eth_getTransactionReceipt
pub const ETH_V0_SEND_TX_PREFIX: &str = "/eth/v0/tx/new/"; // eth_sendRawTransaction

/// Build metadata injected into the service at construction time.
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Liveness probe payload. Always `OK` while the process can answer HTTP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub message: String,
    pub version: String,
    pub service: String,
}

/// Readiness probe payload. `failures` is always present and empty when every
/// backend is reachable and the chain tips agree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub version: String,
    pub service: String,
    pub failures: Vec<String>,
}

/// Balance formatted as a base-10 string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceResponse {
    pub balance: String,
}

/// Transaction lookup / submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx: Option<Transaction>,
    pub txid: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_pending: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Error body attached to every non-2xx JSON response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonError {
    pub error: String,
}

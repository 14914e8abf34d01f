//! Typed HTTP client for the eth-proxy REST API.
//!
//! One method per proxy route, returning the same payload structs the server
//! serializes. Non-2xx responses are decoded into [`ClientError::Api`] so
//! callers get the server's error message together with the status code.

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, B256};
use alloy::rpc::types::TransactionReceipt;
use ethproxy_common::api::{
    ETH_V0_BALANCE_PREFIX, ETH_V0_SEND_TX_PREFIX, ETH_V0_TX_PREFIX, ETH_V0_TX_RECEIPT_PREFIX,
    HEALTH_ENDPOINT, STATUS_ENDPOINT,
};
use ethproxy_common::{BalanceResponse, HealthResponse, JsonError, StatusResponse, TxResponse};
use reqwest::Method;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure: connection, timeout, body read, decode.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// The proxy answered with a non-2xx status and a JSON error body.
    #[error("status {status}: {message}")]
    Api { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// HTTP client bound to one proxy base URL.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    base_url: String,
    http: reqwest::Client,
}

impl ProxyClient {
    /// A trailing slash on the base URL is tolerated; route constants carry
    /// their own leading slash.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.execute(Method::GET, STATUS_ENDPOINT.to_string()).await
    }

    /// Note: the server answers 503 when any backend is unhealthy, so an
    /// unhealthy proxy surfaces here as [`ClientError::Api`], not as a
    /// response with a non-empty failure list.
    pub async fn health(&self) -> Result<HealthResponse> {
        self.execute(Method::GET, HEALTH_ENDPOINT.to_string()).await
    }

    pub async fn balance(&self, address: Address) -> Result<BalanceResponse> {
        self.execute(Method::GET, format!("{ETH_V0_BALANCE_PREFIX}{address}"))
            .await
    }

    pub async fn transaction_by_hash(&self, hash: B256) -> Result<TxResponse> {
        self.execute(Method::GET, format!("{ETH_V0_TX_PREFIX}{hash}"))
            .await
    }

    pub async fn transaction_receipt(&self, hash: B256) -> Result<TransactionReceipt> {
        self.execute(Method::GET, format!("{ETH_V0_TX_RECEIPT_PREFIX}{hash}"))
            .await
    }

    /// Serializes the signed transaction to its binary form and posts it as
    /// `0x`-prefixed hex in the path, matching what the server decodes.
    pub async fn send_transaction(&self, tx: &TxEnvelope) -> Result<TxResponse> {
        let raw = alloy::primitives::hex::encode_prefixed(tx.encoded_2718());
        self.execute(Method::POST, format!("{ETH_V0_SEND_TX_PREFIX}{raw}"))
            .await
    }

    async fn execute<T: DeserializeOwned>(&self, method: Method, path: String) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.request(method, &url).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        // The proxy attaches {"error": ...} to every non-2xx it produces
        // itself; anything else (a 405 from the router, an intermediary's
        // HTML page) falls back to the raw body text.
        let body = response.text().await?;
        let message = match serde_json::from_str::<JsonError>(&body) {
            Ok(JsonError { error }) => error,
            Err(_) => body,
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

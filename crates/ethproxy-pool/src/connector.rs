use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{Transaction, TransactionReceipt};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use ethproxy_common::{EthProxyError, Result};

/// One upstream execution node.
///
/// The pool is generic over this trait so tests can swap in fakes. All
/// operations are expected to be safe for concurrent use by many callers,
/// and to respect cancellation of the calling task.
#[async_trait]
pub trait EthConnector: Send + Sync {
    /// Latest confirmed balance of `account`.
    async fn balance_at(&self, account: Address) -> Result<U256>;

    /// Current chain tip height.
    async fn block_number(&self) -> Result<u64>;

    /// Looks up a transaction in the chain and the pending pool. The bool
    /// reports whether the transaction is still pending. An absent
    /// transaction is an [`EthProxyError::NotFound`] error.
    async fn transaction_by_hash(&self, hash: B256) -> Result<(Transaction, bool)>;

    /// Receipt of a mined transaction. `Ok(None)` means the node knows of no
    /// such receipt, which is distinct from a transport failure.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>>;

    /// Broadcasts an already-signed, binary-encoded transaction.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<()>;
}

/// Production connector backed by an alloy HTTP provider.
#[derive(Debug)]
pub struct AlloyConnector {
    provider: RootProvider<Http<Client>>,
}

impl AlloyConnector {
    /// Wraps a connector around the given URL. The HTTP transport connects
    /// lazily, so this only fails on an unparseable endpoint.
    pub fn dial(url: &str) -> Result<Self> {
        let endpoint = url
            .parse()
            .map_err(|e| EthProxyError::InvalidEndpoint(format!("{url}: {e}")))?;
        Ok(Self {
            provider: RootProvider::new_http(endpoint),
        })
    }
}

fn upstream(err: impl std::fmt::Display) -> EthProxyError {
    EthProxyError::Upstream(err.to_string())
}

#[async_trait]
impl EthConnector for AlloyConnector {
    async fn balance_at(&self, account: Address) -> Result<U256> {
        self.provider.get_balance(account).await.map_err(upstream)
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider.get_block_number().await.map_err(upstream)
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<(Transaction, bool)> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(upstream)?
            .ok_or(EthProxyError::NotFound)?;
        let is_pending = tx.block_hash.is_none();
        Ok((tx, is_pending))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(hash)
            .await
            .map_err(upstream)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<()> {
        self.provider
            .send_raw_transaction(raw)
            .await
            .map(|_| ())
            .map_err(upstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_rejects_malformed_url() {
        let err = AlloyConnector::dial("not a url").unwrap_err();
        assert!(matches!(err, EthProxyError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_dial_accepts_http_endpoint() {
        // The transport is lazy, no node needs to be listening.
        assert!(AlloyConnector::dial("http://127.0.0.1:8545").is_ok());
    }
}

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::{Transaction, TransactionReceipt};
use ethproxy_common::{ConnectFailure, ConnectFailures, EthProxyError, Result};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::connector::EthConnector;

/// Two backends reporting chain tips further apart than this are considered
/// divergent by the readiness check.
pub const BLOCK_DIFF: u64 = 3;

/// One prioritized slot in the pool.
///
/// `id` is assigned once at construction (the entry's original position, as
/// a string) and never changes; it is the basis for the stale-swap guard in
/// [`NodePool::promote`].
struct NodeEntry {
    id: String,
    connector: Arc<dyn EthConnector>,
}

/// A single failure observed by the chain-tip sweep.
///
/// Kept structured internally; the readiness handler stringifies it into the
/// externally visible failure list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TipFailure {
    /// A backend failed to answer the height query at all.
    Node { index: usize, message: String },
    /// Two successively queried backends disagree about the chain tip.
    Divergence {
        index: usize,
        height: u64,
        prev_index: usize,
        prev_height: u64,
    },
}

impl fmt::Display for TipFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TipFailure::Node { index, message } => write!(f, "node {index} err: {message}"),
            TipFailure::Divergence {
                index,
                height,
                prev_index,
                prev_height,
            } => write!(
                f,
                "nodes {index} (height={height}) and {prev_index} (height={prev_height}) \
                 are reporting different chain tips"
            ),
        }
    }
}

/// Outcome of a full chain-tip sweep across every backend.
///
/// `height` is the first successfully retrieved tip, `None` when every node
/// failed. `failures` is empty exactly when the pool is ready to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTipReport {
    pub height: Option<u64>,
    pub failures: Vec<TipFailure>,
}

impl ChainTipReport {
    pub fn is_healthy(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ordered collection of upstream connectors with fan-out-until-success
/// dispatch and move-toward-front-on-success reprioritization.
///
/// The pool is constructed once at startup and shared by every concurrent
/// request. Entries are never added or removed after construction; the only
/// mutation is the adjacent-swap reorder, serialized by the write lock.
pub struct NodePool {
    entries: RwLock<Vec<NodeEntry>>,
}

impl std::fmt::Debug for NodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodePool").finish_non_exhaustive()
    }
}

impl NodePool {
    /// Builds a connector per URL in the comma-separated list.
    ///
    /// URLs that fail to construct are recorded but do not abort the pool.
    /// Construction fails only when zero connectors succeed, with an
    /// aggregated error naming every URL and its failure reason. Surviving
    /// entries keep input order and get their construction index as id.
    pub fn connect<F>(urls: &str, constructor: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<Arc<dyn EthConnector>>,
    {
        let mut entries = Vec::new();
        let mut failures = Vec::new();
        for url in urls.split(',') {
            match constructor(url) {
                Ok(connector) => entries.push(NodeEntry {
                    id: entries.len().to_string(),
                    connector,
                }),
                Err(err) => failures.push(ConnectFailure {
                    url: url.to_string(),
                    reason: err.to_string(),
                }),
            }
        }
        if entries.is_empty() {
            return Err(EthProxyError::NoNodes(ConnectFailures(failures)));
        }
        for failure in &failures {
            warn!(url = %failure.url, reason = %failure.reason, "skipping unreachable backend");
        }
        Ok(Self {
            entries: RwLock::new(entries),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Current priority order of the stable entry ids, front first.
    pub(crate) fn priority_ids(&self) -> Vec<String> {
        self.entries.read().iter().map(|e| e.id.clone()).collect()
    }

    /// Clones the id and connector at `position` without holding the lock
    /// across the caller's network call.
    fn snapshot(&self, position: usize) -> Option<(String, Arc<dyn EthConnector>)> {
        let entries = self.entries.read();
        let entry = entries.get(position)?;
        Some((entry.id.clone(), Arc::clone(&entry.connector)))
    }

    /// Bumps the entry at `position` one slot toward the front.
    ///
    /// The swap only happens if the entry at `position` still carries the id
    /// captured before the call: a concurrent success may already have
    /// reordered the list, in which case the stale swap is a no-op.
    fn promote(&self, position: usize, id: &str) {
        if position == 0 {
            return;
        }
        let mut entries = self.entries.write();
        if entries[position].id != id {
            return;
        }
        entries.swap(position - 1, position);
        debug!(id, from = position, to = position - 1, "promoted backend");
    }

    /// Fan-out-until-success over the current priority order.
    ///
    /// The first successful entry is promoted and its result returned. A
    /// cancellation-kind error is terminal: remaining entries are not tried.
    /// If every entry fails, the last entry's error is returned.
    async fn dispatch<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn EthConnector>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let count = self.len();
        let mut last_err = EthProxyError::Upstream("no backends".to_string());
        for position in 0..count {
            let Some((id, connector)) = self.snapshot(position) else {
                break;
            };
            match op(connector).await {
                Ok(value) => {
                    self.promote(position, &id);
                    return Ok(value);
                }
                Err(err) if err.is_cancellation() => return Err(err),
                Err(err) => {
                    warn!(node = %id, error = %err, "backend call failed");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    /// Latest confirmed balance, tried against each backend in turn.
    pub async fn balance_at(&self, account: Address) -> Result<U256> {
        self.dispatch(|node| async move { node.balance_at(account).await })
            .await
    }

    /// Transaction lookup with pending flag, tried against each backend.
    pub async fn transaction_by_hash(&self, hash: B256) -> Result<(Transaction, bool)> {
        self.dispatch(|node| async move { node.transaction_by_hash(hash).await })
            .await
    }

    /// Receipt lookup, tried against each backend. `Ok(None)` is a success
    /// carrying the not-found signal, so it stops the fan-out.
    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>> {
        self.dispatch(|node| async move { node.transaction_receipt(hash).await })
            .await
    }

    /// Broadcasts a signed transaction, fanned out like the reads. Failures
    /// carry the operation context on top of the connector's own message.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<()> {
        let raw = Bytes::copy_from_slice(raw);
        self.dispatch(move |node| {
            let raw = raw.clone();
            async move { node.send_raw_transaction(&raw).await }
        })
        .await
        .map_err(|err| match err {
            EthProxyError::Upstream(msg) => {
                EthProxyError::Upstream(format!("send transaction: {msg}"))
            }
            other => other,
        })
    }

    /// Queries the chain tip of every backend (a full sweep, unlike the read
    /// fan-out) and reports per-node failures plus tip divergences beyond
    /// [`BLOCK_DIFF`] between successive successful answers.
    pub async fn check_chain_tips(&self) -> ChainTipReport {
        let count = self.len();
        let mut heights: Vec<u64> = Vec::with_capacity(count);
        let mut failures = Vec::new();
        for index in 0..count {
            let Some((_, connector)) = self.snapshot(index) else {
                break;
            };
            match connector.block_number().await {
                Err(err) => failures.push(TipFailure::Node {
                    index,
                    message: err.to_string(),
                }),
                Ok(height) => {
                    if let Some(&prev_height) = heights.last() {
                        if height.abs_diff(prev_height) > BLOCK_DIFF {
                            failures.push(TipFailure::Divergence {
                                index,
                                height,
                                prev_index: index - 1,
                                prev_height,
                            });
                        }
                    }
                    heights.push(height);
                }
            }
        }
        ChainTipReport {
            height: heights.first().copied(),
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ========================================================================
    // Fakes
    // ========================================================================

    /// Scriptable connector: answers with a fixed height/balance or a fixed
    /// error, counting how often it was called.
    struct FakeConnector {
        height: u64,
        error: Option<EthProxyError>,
        calls: AtomicUsize,
    }

    impl FakeConnector {
        fn healthy(height: u64) -> Arc<Self> {
            Arc::new(Self {
                height,
                error: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                height: 0,
                error: Some(EthProxyError::Upstream(message.to_string())),
                calls: AtomicUsize::new(0),
            })
        }

        fn timing_out() -> Arc<Self> {
            Arc::new(Self {
                height: 0,
                error: Some(EthProxyError::Timeout(5000)),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn answer<T>(&self, value: T) -> Result<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.error {
                Some(EthProxyError::Upstream(msg)) => Err(EthProxyError::Upstream(msg.clone())),
                Some(EthProxyError::Timeout(ms)) => Err(EthProxyError::Timeout(*ms)),
                Some(_) => Err(EthProxyError::Cancelled),
                None => Ok(value),
            }
        }
    }

    #[async_trait]
    impl EthConnector for FakeConnector {
        async fn balance_at(&self, _account: Address) -> Result<U256> {
            self.answer(U256::from(self.height))
        }

        async fn block_number(&self) -> Result<u64> {
            self.answer(self.height)
        }

        async fn transaction_by_hash(&self, _hash: B256) -> Result<(Transaction, bool)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EthProxyError::NotFound)
        }

        async fn transaction_receipt(&self, _hash: B256) -> Result<Option<TransactionReceipt>> {
            self.answer(None)
        }

        async fn send_raw_transaction(&self, _raw: &[u8]) -> Result<()> {
            self.answer(())
        }
    }

    fn pool_of(connectors: Vec<Arc<FakeConnector>>) -> NodePool {
        let urls: Vec<String> = (0..connectors.len()).map(|i| format!("http://node{i}")).collect();
        NodePool::connect(&urls.join(","), |url| {
            let index: usize = url.trim_start_matches("http://node").parse().unwrap();
            Ok(connectors[index].clone() as Arc<dyn EthConnector>)
        })
        .unwrap()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    #[test]
    fn test_connect_with_zero_reachable_urls_lists_every_failure() {
        let err = NodePool::connect("http://a,http://b", |_| {
            Err(EthProxyError::Upstream("refused".to_string()))
        })
        .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("cannot connect to any nodes"));
        assert!(message.contains("url='http://a' err='refused'"));
        assert!(message.contains("url='http://b' err='refused'"));
    }

    #[test]
    fn test_connect_keeps_only_reachable_entries_in_input_order() {
        let pool = NodePool::connect("http://bad,http://good,http://also-good", |url| {
            if url.contains("bad") {
                Err(EthProxyError::Upstream("refused".to_string()))
            } else {
                Ok(FakeConnector::healthy(1) as Arc<dyn EthConnector>)
            }
        })
        .unwrap();
        assert_eq!(pool.len(), 2);
        // Ids are assigned by construction order of the survivors.
        assert_eq!(pool.priority_ids(), vec!["0", "1"]);
    }

    // ========================================================================
    // Fan-out and reprioritization
    // ========================================================================

    #[tokio::test]
    async fn test_fan_out_succeeds_with_single_healthy_node_at_any_position() {
        for healthy_pos in 0..3 {
            let connectors: Vec<Arc<FakeConnector>> = (0..3)
                .map(|i| {
                    if i == healthy_pos {
                        FakeConnector::healthy(42)
                    } else {
                        FakeConnector::failing("down")
                    }
                })
                .collect();
            let pool = pool_of(connectors.clone());
            let balance = pool.balance_at(Address::ZERO).await.unwrap();
            assert_eq!(balance, U256::from(42));
            // Entries before the healthy one were each tried exactly once.
            for (i, connector) in connectors.iter().enumerate() {
                let expected = if i <= healthy_pos { 1 } else { 0 };
                assert_eq!(connector.calls(), expected, "position {i}");
            }
        }
    }

    #[tokio::test]
    async fn test_all_failing_nodes_return_the_last_error() {
        let pool = pool_of(vec![
            FakeConnector::failing("first down"),
            FakeConnector::failing("last down"),
        ]);
        let err = pool.balance_at(Address::ZERO).await.unwrap_err();
        assert_eq!(err.to_string(), "last down");
    }

    #[tokio::test]
    async fn test_success_promotes_entry_one_slot() {
        let pool = pool_of(vec![
            FakeConnector::failing("down"),
            FakeConnector::failing("down"),
            FakeConnector::healthy(7),
        ]);
        pool.balance_at(Address::ZERO).await.unwrap();
        // Entry "2" moved from position 2 to position 1, a single step.
        assert_eq!(pool.priority_ids(), vec!["0", "2", "1"]);
        pool.balance_at(Address::ZERO).await.unwrap();
        assert_eq!(pool.priority_ids(), vec!["2", "0", "1"]);
        // At the front there is nothing left to promote.
        pool.balance_at(Address::ZERO).await.unwrap();
        assert_eq!(pool.priority_ids(), vec!["2", "0", "1"]);
    }

    #[tokio::test]
    async fn test_stale_promotion_is_a_no_op() {
        let pool = pool_of(vec![
            FakeConnector::healthy(1),
            FakeConnector::healthy(2),
            FakeConnector::healthy(3),
        ]);
        // Captured before a concurrent reorder: entry "2" was at position 2.
        pool.promote(2, "2");
        assert_eq!(pool.priority_ids(), vec!["0", "2", "1"]);
        // Replay the same promotion with the now-stale id: must not corrupt.
        pool.promote(2, "2");
        assert_eq!(pool.priority_ids(), vec!["0", "2", "1"]);
    }

    #[tokio::test]
    async fn test_cancellation_is_terminal_for_the_fan_out() {
        let first = FakeConnector::timing_out();
        let second = FakeConnector::healthy(9);
        let pool = pool_of(vec![first.clone(), second.clone()]);
        let err = pool.balance_at(Address::ZERO).await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0, "must not retry past a cancellation");
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_keeps_the_order_a_permutation() {
        let pool = Arc::new(pool_of(vec![
            FakeConnector::failing("down"),
            FakeConnector::healthy(1),
            FakeConnector::healthy(2),
            FakeConnector::healthy(3),
        ]));
        let mut tasks = Vec::new();
        for _ in 0..64 {
            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(async move {
                pool.balance_at(Address::ZERO).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let mut ids = pool.priority_ids();
        ids.sort();
        assert_eq!(ids, vec!["0", "1", "2", "3"]);
    }

    // ========================================================================
    // Submission
    // ========================================================================

    #[tokio::test]
    async fn test_send_raw_transaction_wraps_upstream_errors_with_context() {
        let pool = pool_of(vec![FakeConnector::failing("nonce too low")]);
        let err = pool.send_raw_transaction(&[0x02, 0x00]).await.unwrap_err();
        assert_eq!(err.to_string(), "send transaction: nonce too low");
    }

    #[tokio::test]
    async fn test_send_raw_transaction_fans_out_like_reads() {
        let first = FakeConnector::failing("down");
        let second = FakeConnector::healthy(1);
        let pool = pool_of(vec![first, second.clone()]);
        pool.send_raw_transaction(&[0x02]).await.unwrap();
        assert_eq!(second.calls(), 1);
        assert_eq!(pool.priority_ids(), vec!["1", "0"]);
    }

    // ========================================================================
    // Chain-tip sweep
    // ========================================================================

    #[tokio::test]
    async fn test_agreeing_tips_report_no_failures() {
        let pool = pool_of(vec![
            FakeConnector::healthy(100),
            FakeConnector::healthy(101),
            FakeConnector::healthy(102),
        ]);
        let report = pool.check_chain_tips().await;
        assert!(report.is_healthy());
        assert_eq!(report.height, Some(100));
    }

    #[tokio::test]
    async fn test_divergent_tip_reports_exactly_one_failure() {
        let pool = pool_of(vec![
            FakeConnector::healthy(100),
            FakeConnector::healthy(100),
            FakeConnector::healthy(105),
        ]);
        let report = pool.check_chain_tips().await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].to_string(),
            "nodes 2 (height=105) and 1 (height=100) are reporting different chain tips"
        );
        assert_eq!(report.height, Some(100));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_reported_by_index() {
        let pool = pool_of(vec![
            FakeConnector::healthy(100),
            FakeConnector::failing("connection refused"),
            FakeConnector::healthy(101),
        ]);
        let report = pool.check_chain_tips().await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].to_string(),
            "node 1 err: connection refused"
        );
        assert_eq!(report.height, Some(100));
    }

    #[tokio::test]
    async fn test_all_nodes_failing_yields_no_height_and_per_node_failures() {
        let pool = pool_of(vec![
            FakeConnector::failing("down"),
            FakeConnector::failing("down"),
        ]);
        let report = pool.check_chain_tips().await;
        assert_eq!(report.height, None);
        assert_eq!(report.failures.len(), 2);
        assert!(!report.is_healthy());
    }

    #[tokio::test]
    async fn test_exactly_threshold_apart_is_not_divergent() {
        let pool = pool_of(vec![
            FakeConnector::healthy(100),
            FakeConnector::healthy(100 + BLOCK_DIFF),
        ]);
        let report = pool.check_chain_tips().await;
        assert!(report.is_healthy());
    }
}

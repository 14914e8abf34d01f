//! Multi-backend Ethereum client abstraction.
//!
//! This crate presents a single logical execution-node client backed by N
//! physical connections. Reads fan out across the backends until one
//! succeeds, a successful backend is promoted one slot toward the front of
//! the priority list, and a full-sweep chain-tip check feeds the readiness
//! probe.
//!
//! # Components
//!
//! - [`EthConnector`] - capability trait for a single upstream node
//! - [`AlloyConnector`] - production connector over an alloy HTTP provider
//! - [`NodePool`] - the ordered, concurrently-accessed connector list
//!
//! # Concurrency
//!
//! The entry list is guarded by a read/write lock. Dispatch takes the read
//! lock only to snapshot an entry, never across network I/O, so concurrent
//! requests proceed in parallel. Only the rare reprioritization swap takes
//! the write lock, and a stale swap (another request already reordered the
//! list) is skipped rather than applied.

mod connector;
mod pool;

pub use connector::{AlloyConnector, EthConnector};
pub use pool::{ChainTipReport, NodePool, TipFailure, BLOCK_DIFF};

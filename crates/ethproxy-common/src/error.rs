use std::fmt;

use thiserror::Error;

/// A single backend URL that could not be turned into a live connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectFailure {
    pub url: String,
    pub reason: String,
}

/// Ordered list of per-URL construction failures.
///
/// Kept structured internally and only stringified at the boundary, so the
/// aggregated startup error lists every attempted URL with its reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectFailures(pub Vec<ConnectFailure>);

impl fmt::Display for ConnectFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for failure in &self.0 {
            write!(f, " url='{}' err='{}'", failure.url, failure.reason)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum EthProxyError {
    /// An upstream execution node rejected or failed the call.
    #[error("{0}")]
    Upstream(String),

    /// The bounded request context expired before the upstream call finished.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// The caller went away while the upstream call was in flight.
    #[error("request cancelled")]
    Cancelled,

    /// The node reports no such transaction.
    #[error("not found")]
    NotFound,

    /// A backend URL could not be parsed into an endpoint.
    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(String),

    /// Every configured backend failed to construct at startup.
    #[error("cannot connect to any nodes{0}")]
    NoNodes(ConnectFailures),

    /// Configuration file or environment could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl EthProxyError {
    /// Cancellation-kind errors are terminal for the fan-out loop: once the
    /// request context is gone there is no point trying further backends.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EthProxyError::Timeout(_) | EthProxyError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, EthProxyError>;

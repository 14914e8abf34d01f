//! Shared types for the eth-proxy service.
//!
//! This crate holds everything the server, client and CLI need to agree on:
//!
//! - [`error`] - The [`EthProxyError`] taxonomy used across the workspace
//! - [`config`] - Service configuration with YAML file + environment loading
//! - [`api`] - HTTP route constants and the JSON request/response bodies
//!
//! The API surface is a REST/JSON facade over one or more upstream Ethereum
//! execution nodes. Route constants are exported here so the typed client in
//! `ethproxy-client` can never drift from the routes the server registers.

pub mod api;
pub mod config;
pub mod error;

pub use api::{
    BalanceResponse, BuildInfo, HealthResponse, JsonError, StatusResponse, TxResponse,
    SERVICE_NAME,
};
pub use config::{Config, LogFormat, LogLevel};
pub use error::{ConnectFailure, ConnectFailures, EthProxyError, Result};

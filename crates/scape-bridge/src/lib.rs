//! Bridge protocol client for scape-rl
//!
//! This crate provides:
//! - `LineIo`/`Connect` transport seams and the concrete TCP transport
//! - `BridgeClient`: the line-oriented request/response protocol client,
//!   including the frame retry-with-reconnect path

pub mod client;
pub mod transport;

pub use client::{BridgeClient, RetryPolicy, TcpBridgeClient};
pub use transport::{Connect, LineIo, TcpConnector, TcpTransport};

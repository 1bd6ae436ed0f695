#![forbid(unsafe_code)]

//! Matching-server (SOMC) websocket client for the svcchan control plane:
//! a persistent, auto-reconnecting JSON-RPC-like transport used by the offering-publish and
//! endpoint-publish job handlers.

pub mod client;
pub mod error;
pub mod wire;

pub use client::SomcClient;
pub use error::SomcError;

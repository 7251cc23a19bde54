//! # Hydra Client
//!
//! Async client for a Hydra Head node: the WebSocket message stream, the
//! HTTP API and the commit/decommit workflow on top of them.

pub mod client;
pub mod config;
pub mod connection;
pub mod events;
pub mod http;
pub mod instance;

pub use client::HeadClient;
pub use config::ClientConfig;
pub use connection::ConnectionManager;
pub use events::{Channel, Delivery, EventBus, SubscriptionId};
pub use http::HttpChannel;
pub use instance::{HeadInstance, TxSubmitter, UtxoFetcher};

/// Prelude module for common imports.
pub mod prelude {
    pub use crate::client::HeadClient;
    pub use crate::config::ClientConfig;
    pub use crate::instance::{HeadInstance, TxSubmitter, UtxoFetcher};
    pub use hydra_core::prelude::*;
}

#![deny(clippy::expect_used, clippy::unwrap_used)]

//! Lifecycle controller for a single broker exchange.
//! 单个代理交换器的生命周期控制器。
//!
//! An [`ExchangeController`] defines the exchange once per channel incarnation,
//! caches definition failures, queues messages while the exchange is not ready
//! and replays them once the topology confirms its bindings.

pub mod broker;
pub mod config;
pub mod error;
pub mod exchange;
pub mod signal;
pub mod testing;

pub use broker::{Channel, ChannelFactory, Connection, Topology};
pub use error::{Error, Result};
pub use exchange::{ExchangeController, ExchangeDescriptor, ExchangeEvent, ExchangeState, Message};

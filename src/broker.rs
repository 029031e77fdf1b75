//! Traits for abstracting over the broker-side collaborators of an exchange.
//!
//! The controller only ever talks to these interfaces; transport, framing and
//! binding resolution live behind them.
//!
//! 对交换器在代理侧的协作者进行抽象的 trait。
//!
//! 控制器只与这些接口交互；传输、帧格式以及绑定解析都隐藏在它们之后。

use crate::{
    error::Result,
    exchange::{ExchangeDescriptor, Message},
    signal::SignalRegistry,
};
use async_trait::async_trait;
use std::sync::Arc;

/// A broker-session-scoped handle through which an exchange is defined, used
/// and destroyed.
///
/// The channel raises [`names::RELEASED`](crate::signal::names::RELEASED) on its
/// registry when the broker invalidates it.
///
/// 代理会话范围内的句柄，通过它定义、使用和销毁交换器。
///
/// 当代理使通道失效时，通道会在其注册表上发出 `released` 信号。
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Declares the exchange on the broker.
    /// 在代理上声明交换器。
    async fn define(&self, descriptor: &ExchangeDescriptor) -> Result<()>;

    /// Publishes a message to the exchange.
    /// 向交换器发布一条消息。
    async fn publish(&self, message: Message) -> Result<()>;

    /// Tears down the channel.
    /// 拆除通道。
    async fn destroy(&self) -> Result<()>;

    /// The registry the channel raises its signals on.
    fn signals(&self) -> &SignalRegistry;
}

/// Produces a fresh channel on demand.
///
/// 按需创建新的通道。
pub trait ChannelFactory: Send + Sync + 'static {
    type Channel: Channel;

    /// Creates a channel for the given exchange.
    /// 为给定交换器创建通道。
    fn create(&self, descriptor: &ExchangeDescriptor) -> Arc<Self::Channel>;
}

/// The shared broker connection.
///
/// It learns about every exchange built on it and raises
/// [`names::RECONNECTED`](crate::signal::names::RECONNECTED) after a session
/// was re-established.
///
/// 共享的代理连接。
///
/// 它记录建立在其上的每个交换器，并在会话重建后发出 `reconnected` 信号。
pub trait Connection: Send + Sync + 'static {
    /// Registers the existence of an exchange.
    /// 注册交换器的存在。
    fn add_exchange(&self, descriptor: &ExchangeDescriptor);

    fn signals(&self) -> &SignalRegistry;
}

/// Tracks broker-side declarations and raises
/// [`names::BINDINGS_COMPLETED`](crate::signal::names::BINDINGS_COMPLETED) once
/// the bindings for the exchange are in place.
///
/// 跟踪代理侧的声明，并在交换器的绑定就绪后发出 `bindings-completed` 信号。
pub trait Topology: Send + Sync + 'static {
    fn signals(&self) -> &SignalRegistry;
}

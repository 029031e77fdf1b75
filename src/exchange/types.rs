//! Exchange identity and message payload types.
//!
//! 交换器标识与消息负载类型。

use bytes::Bytes;
use std::fmt;

/// The immutable identity of an exchange, handed to the channel factory and to
/// every `define()` call.
///
/// 交换器的不可变标识，会传递给通道工厂以及每一次 `define()` 调用。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExchangeDescriptor {
    /// The exchange name on the broker.
    /// 代理上的交换器名称。
    pub name: String,
    /// The exchange type, e.g. `direct`, `fanout` or `topic`.
    /// 交换器类型，例如 `direct`、`fanout` 或 `topic`。
    pub exchange_type: String,
}

impl ExchangeDescriptor {
    pub fn new(name: impl Into<String>, exchange_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exchange_type: exchange_type.into(),
        }
    }
}

impl fmt::Display for ExchangeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.exchange_type)
    }
}

/// An opaque message handed through to the channel untouched.
///
/// 原样传递给通道的不透明消息。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub routing_key: String,
    pub body: Bytes,
}

impl Message {
    pub fn new(routing_key: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            routing_key: routing_key.into(),
            body: body.into(),
        }
    }
}

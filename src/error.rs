//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use crate::exchange::ExchangeState;
use thiserror::Error;

/// The primary error type for the exchange lifecycle library.
/// 交换器生命周期库的主要错误类型。
///
/// Errors are `Clone` because a cached definition failure is handed out to
/// every caller that hits the `Failed` state.
///
/// 错误类型实现了 `Clone`，因为缓存的定义失败需要分发给每一个在 `Failed` 状态下调用的调用者。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The broker refused an operation (for example a conflicting exchange definition).
    /// 代理拒绝了某个操作（例如交换器定义冲突）。
    #[error("Error: {0}")]
    Broker(String),

    /// The channel failed to carry an operation to the broker.
    /// 通道未能将操作传递给代理。
    #[error("Transport error: {0}")]
    Transport(String),

    /// The operation was abandoned because the exchange was destroyed before it settled.
    /// 由于交换器在操作完成前被销毁，该操作被放弃。
    #[error("Exchange was destroyed")]
    Destroyed,

    /// The controller task is no longer running.
    /// 控制器任务已不再运行。
    #[error("Exchange controller is closed")]
    ControllerClosed,

    /// A state change that the lifecycle does not allow was attempted.
    /// 尝试了生命周期不允许的状态转换。
    #[error("Invalid exchange state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ExchangeState,
        to: ExchangeState,
    },
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        let kind = match &err {
            Error::Broker(_) => ErrorKind::Other,
            Error::Transport(_) => ErrorKind::ConnectionAborted,
            Error::Destroyed => ErrorKind::NotConnected,
            Error::ControllerClosed => ErrorKind::BrokenPipe,
            Error::InvalidTransition { .. } => ErrorKind::InvalidInput,
        };
        std::io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_error_display_keeps_broker_message() {
        let err = Error::Broker("nope".to_string());
        assert_eq!(err.to_string(), "Error: nope");
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn test_into_io_error() {
        let io: std::io::Error = Error::ControllerClosed.into();
        assert_eq!(io.kind(), std::io::ErrorKind::BrokenPipe);

        let io: std::io::Error = Error::Transport("reset".into()).into();
        assert_eq!(io.kind(), std::io::ErrorKind::ConnectionAborted);
    }
}

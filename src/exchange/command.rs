//! Commands processed by the exchange actor.

use crate::{
    error::Result,
    exchange::Message,
};
use tokio::sync::oneshot;

/// Commands sent to the `ExchangeActor`.
///
/// This enum carries API calls from the controller handle, signals raised by
/// collaborators, and the outcomes of channel operations running outside the
/// actor. Outcomes are tagged with the channel incarnation they belong to.
///
/// 发送到 `ExchangeActor` 的命令。
///
/// 此枚举承载来自控制器句柄的API调用、协作者发出的信号，以及在actor之外运行的通道操作的结果。
/// 结果会带上其所属的通道化身编号。
#[derive(Debug)]
pub(crate) enum ExchangeCommand {
    /// Publish request from the public API.
    /// 来自公共API的发布请求。
    Publish {
        message: Message,
        response_tx: oneshot::Sender<Result<()>>,
    },
    /// Appends a message to the replay log without a waiting caller.
    /// 向重放日志追加一条没有等待者的消息。
    Record { message: Message },
    /// Usability check from the public API.
    /// 来自公共API的可用性检查。
    Check {
        response_tx: oneshot::Sender<Result<()>>,
    },
    /// Destroy request from the public API.
    /// 来自公共API的销毁请求。
    Destroy {
        response_tx: oneshot::Sender<Result<()>>,
    },
    /// The channel of `incarnation` was released by the broker.
    /// `incarnation` 对应的通道被代理释放。
    Released { incarnation: u64 },
    /// The connection re-established its broker session.
    /// 连接重新建立了代理会话。
    Reconnected,
    /// The topology confirmed the bindings of the exchange.
    /// 拓扑确认了交换器的绑定。
    BindingsCompleted,
    /// `define()` on the channel of `incarnation` settled.
    /// `incarnation` 对应通道上的 `define()` 已完成。
    DefineSettled { incarnation: u64, result: Result<()> },
    /// `destroy()` on the channel of `incarnation` settled.
    /// `incarnation` 对应通道上的 `destroy()` 已完成。
    DestroySettled { incarnation: u64, result: Result<()> },
}

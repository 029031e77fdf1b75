use std::fmt;

/// Lifecycle states of an exchange controller.
///
/// 交换器控制器的生命周期状态。
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExchangeState {
    /// A channel has been acquired and `define()` is outstanding.
    /// 已获取通道，`define()` 尚未完成。
    Initializing,
    /// The exchange is defined and operable.
    /// 交换器已定义且可用。
    Ready,
    /// The last `define()` failed; the failure is cached.
    /// 最近一次 `define()` 失败，失败已被缓存。
    Failed,
    /// Torn down by `destroy()`; no channel and no subscriptions remain.
    /// 已被 `destroy()` 拆除；不再持有通道和订阅。
    Destroyed,
}

impl ExchangeState {
    /// Stable, human-readable label used in logs and events.
    pub const fn label(self) -> &'static str {
        match self {
            ExchangeState::Initializing => "initializing",
            ExchangeState::Ready => "ready",
            ExchangeState::Failed => "failed",
            ExchangeState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A point-in-time view of a controller, published after every command it
/// processes.
///
/// 控制器在某一时刻的视图，每处理完一条命令后发布一次。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSnapshot {
    pub state: ExchangeState,
    /// Channel incarnation counter; bumped on every channel acquisition.
    /// 通道化身计数器；每次获取通道时递增。
    pub incarnation: u64,
    pub channel_attached: bool,
    pub replay_entries: usize,
}

impl ExchangeSnapshot {
    pub(crate) fn initial() -> Self {
        Self {
            state: ExchangeState::Initializing,
            incarnation: 0,
            channel_attached: false,
            replay_entries: 0,
        }
    }
}

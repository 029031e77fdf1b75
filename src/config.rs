//! 定义了交换器控制器的可配置参数。
//! Defines configurable parameters for the exchange controller.

/// A structure containing all configurable parameters for an exchange controller.
///
/// 包含交换器控制器所有可配置参数的结构体。
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Replay-log retention parameters.
    /// 重放日志保留相关参数。
    pub replay: ReplayConfig,
}

/// Replay-log retention parameters.
///
/// The log is an at-least-once record that survives flushes, so it needs
/// explicit bounds to keep memory in check.
///
/// 重放日志保留相关参数。
///
/// 日志是在刷新后依然保留的至少一次记录，因此需要显式的上限来控制内存。
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// The number of flushes an entry takes part in before it is pruned.
    /// The entry is still sent during the flush that reaches this count.
    ///
    /// 条目被清除前参与的刷新次数。达到该次数的那一次刷新中条目仍会被发送。
    pub max_flushes_per_entry: u32,
    /// The soft upper bound on the number of entries. When it is exceeded the
    /// oldest entries that were sent at least once and whose caller has
    /// already been answered are evicted. Entries never sent, or with a caller
    /// still waiting, are never evicted.
    ///
    /// 条目数量的软上限。超出时会淘汰最旧的、至少发送过一次且其调用者已得到结果的条目。
    /// 从未发送过的条目或调用者仍在等待的条目永远不会被淘汰。
    pub max_entries: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_flushes_per_entry: 8,
            max_entries: 1024,
        }
    }
}

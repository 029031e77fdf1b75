//! 交换器状态验证逻辑模块
//! Exchange State Validation Logic Module
//!
//! 该模块负责状态转换的合法性检查，以及每个状态下发布和检查请求的处理方式。
//!
//! This module decides which transitions are legal and how publish and check
//! requests are treated in each state.

use crate::exchange::ExchangeState;

/// 状态验证器，负责所有状态相关的验证和检查逻辑
/// State validator responsible for all state-related validation and check logic
pub struct StateValidator;

impl StateValidator {
    /// 验证状态转换是否合法
    /// Validate if state transition is legal
    pub fn is_valid_transition(current_state: ExchangeState, new_state: ExchangeState) -> bool {
        use ExchangeState::*;

        match (current_state, new_state) {
            // 定义结果
            // Definition outcomes
            (Initializing, Ready) => true,
            (Initializing, Failed) => true,

            // 通道被释放后重新获取；定义期间的释放会在定义完成后重新开始
            // Re-acquisition after a release; a release during definition restarts once it settles
            (Ready, Initializing) => true,
            (Initializing, Initializing) => true,

            // 销毁可以从任何状态开始
            // Destroy may start from any state
            (_, Destroyed) => true,

            // 销毁后按需重建
            // Rebuild on demand after destroy
            (Destroyed, Initializing) => true,

            // Failed 状态不会自动恢复，Ready 也不会直接失败
            // Failed never recovers on its own, and Ready never fails directly
            _ => false,
        }
    }

    /// 检查是否可以直接发送到通道（不经过重放日志）
    /// Check if messages may go straight to the channel
    pub fn can_publish_directly(state: ExchangeState, bindings_confirmed: bool) -> bool {
        state == ExchangeState::Ready && bindings_confirmed
    }

    /// 检查请求是否应立即以缓存的失败拒绝
    /// Check if requests must be rejected with the cached failure
    pub fn rejects_with_cached_failure(state: ExchangeState) -> bool {
        state == ExchangeState::Failed
    }

    /// 检查请求是否需要先触发重建
    /// Check if a request has to trigger a rebuild first
    pub fn needs_rebuild(state: ExchangeState) -> bool {
        state == ExchangeState::Destroyed
    }

    /// 检查是否允许执行重放刷新
    /// Check if a replay flush is permitted
    pub fn can_flush(state: ExchangeState) -> bool {
        state == ExchangeState::Ready
    }

    /// 检查通道释放是否应触发重新获取
    /// Check if a channel release should cause re-acquisition
    pub fn reacquires_on_release(state: ExchangeState) -> bool {
        state == ExchangeState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExchangeState::*;

    #[test]
    fn test_valid_transitions() {
        assert!(StateValidator::is_valid_transition(Initializing, Ready));
        assert!(StateValidator::is_valid_transition(Initializing, Failed));
        assert!(StateValidator::is_valid_transition(Ready, Initializing));
        assert!(StateValidator::is_valid_transition(Destroyed, Initializing));
        assert!(StateValidator::is_valid_transition(Initializing, Initializing));
    }

    #[test]
    fn test_destroy_from_anywhere() {
        for state in [Initializing, Ready, Failed, Destroyed] {
            assert!(StateValidator::is_valid_transition(state, Destroyed));
        }
    }

    #[test]
    fn test_invalid_transitions() {
        // 失败状态不会自动恢复
        assert!(!StateValidator::is_valid_transition(Failed, Initializing));
        assert!(!StateValidator::is_valid_transition(Failed, Ready));
        assert!(!StateValidator::is_valid_transition(Ready, Failed));
        assert!(!StateValidator::is_valid_transition(Destroyed, Ready));
        assert!(!StateValidator::is_valid_transition(Ready, Ready));
    }

    #[test]
    fn test_publish_routing_checks() {
        assert!(StateValidator::can_publish_directly(Ready, true));
        assert!(!StateValidator::can_publish_directly(Ready, false));
        assert!(!StateValidator::can_publish_directly(Initializing, true));

        assert!(StateValidator::rejects_with_cached_failure(Failed));
        assert!(!StateValidator::rejects_with_cached_failure(Destroyed));

        assert!(StateValidator::needs_rebuild(Destroyed));
        assert!(!StateValidator::needs_rebuild(Initializing));
    }

    #[test]
    fn test_release_and_flush_checks() {
        assert!(StateValidator::reacquires_on_release(Ready));
        assert!(!StateValidator::reacquires_on_release(Failed));
        assert!(StateValidator::can_flush(Ready));
        assert!(!StateValidator::can_flush(Initializing));
    }
}

//! 交换器生命周期管理器 - 唯一允许修改状态的代码路径
//! Exchange Lifecycle Manager - the only code path allowed to mutate state
//!
//! 管理器持有当前状态与缓存的定义失败，并保证二者始终一致：
//! 缓存的失败当且仅当处于 `Failed` 状态时存在。
//!
//! The manager owns the current state and the cached definition failure and
//! keeps them consistent: a cached failure exists if and only if the state is
//! `Failed`.

use super::transitions::{ExchangeEvent, StateTransitionExecutor};
use crate::{
    error::{Error, Result},
    exchange::ExchangeState,
};
use tracing::{debug, info, warn};

/// 交换器生命周期管理器
/// Exchange lifecycle manager
pub struct ExchangeLifecycle {
    /// 当前状态
    /// Current state
    current_state: ExchangeState,
    /// 最近一次失败的定义所产生的错误
    /// Error produced by the most recent failed definition
    cached_failure: Option<Error>,
    /// 状态转换执行器
    /// State transition executor
    transition_executor: StateTransitionExecutor,
}

impl std::fmt::Debug for ExchangeLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeLifecycle")
            .field("current_state", &self.current_state)
            .field("cached_failure", &self.cached_failure)
            .field("transition_executor", &self.transition_executor)
            .finish()
    }
}

impl ExchangeLifecycle {
    /// 创建新的生命周期管理器，初始状态为 `Initializing`
    /// Create a new lifecycle manager starting in `Initializing`
    pub fn new(transition_executor: StateTransitionExecutor) -> Self {
        Self {
            current_state: ExchangeState::Initializing,
            cached_failure: None,
            transition_executor,
        }
    }

    pub fn current_state(&self) -> ExchangeState {
        self.current_state
    }

    pub fn cached_failure(&self) -> Option<&Error> {
        self.cached_failure.as_ref()
    }

    /// The error handed to callers while `Failed`. Outside `Failed` this is `None`.
    /// 处于 `Failed` 时返回给调用者的错误，其他状态下为 `None`。
    pub fn failure_for_caller(&self) -> Option<Error> {
        self.cached_failure.clone()
    }

    /// The error answered to a caller rejected in the current state: the cached
    /// failure, or an invalid-transition error when none is cached.
    ///
    /// 在当前状态下被拒绝的调用者得到的错误：缓存的失败；若没有缓存，则为非法状态转换错误。
    pub fn rejection(&self) -> Error {
        self.failure_for_caller()
            .unwrap_or(Error::InvalidTransition {
                from: self.current_state,
                to: ExchangeState::Ready,
            })
    }

    /// 尝试转换到新状态
    /// Attempt to transition to a new state
    pub fn transition_to(&mut self, new_state: ExchangeState) -> Result<ExchangeEvent> {
        debug!(
            current_state = %self.current_state,
            target_state = %new_state,
            "Attempting state transition"
        );

        let event = self
            .transition_executor
            .execute_transition(self.current_state, new_state)?;
        self.current_state = new_state;
        if new_state != ExchangeState::Failed {
            self.cached_failure = None;
        }
        Ok(event)
    }

    /// 开始（重新）初始化
    /// Begin (re)initialization
    pub fn begin_initializing(&mut self) -> Result<Vec<ExchangeEvent>> {
        Ok(vec![self.transition_to(ExchangeState::Initializing)?])
    }

    /// 标记定义成功
    /// Mark definition as successful
    pub fn mark_defined(&mut self, incarnation: u64) -> Result<Vec<ExchangeEvent>> {
        let transition = self.transition_to(ExchangeState::Ready)?;
        info!(incarnation, "Exchange defined");
        Ok(vec![transition, ExchangeEvent::Defined { incarnation }])
    }

    /// 标记定义失败并缓存错误
    /// Mark definition as failed and cache the error
    pub fn mark_failed(&mut self, incarnation: u64, error: Error) -> Result<Vec<ExchangeEvent>> {
        let transition = self.transition_to(ExchangeState::Failed)?;
        warn!(incarnation, %error, "Exchange definition failed");
        self.cached_failure = Some(error.clone());
        Ok(vec![transition, ExchangeEvent::Failed { incarnation, error }])
    }

    /// 标记已销毁
    /// Mark as destroyed
    pub fn mark_destroyed(&mut self) -> Result<Vec<ExchangeEvent>> {
        if self.current_state == ExchangeState::Destroyed {
            return Ok(Vec::new());
        }
        Ok(vec![self.transition_to(ExchangeState::Destroyed)?])
    }

    /// 向观察者分发事件
    /// Hand events to observers
    pub fn announce(&self, events: &[ExchangeEvent]) {
        for event in events {
            self.transition_executor.announce(event);
        }
    }
}

//! 交换器状态转换逻辑模块
//! Exchange State Transition Logic Module
//!
//! 该模块负责执行经过验证的状态转换，并把生命周期事件分发给观察者。
//!
//! This module executes validated state transitions and hands lifecycle events
//! to observers.

use super::validation::StateValidator;
use crate::{
    error::{Error, Result},
    exchange::ExchangeState,
    signal::{SignalRegistry, names},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// 生命周期事件类型
/// Lifecycle event types
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeEvent {
    /// 状态转换事件
    /// State transition event
    StateTransition {
        from: ExchangeState,
        to: ExchangeState,
    },
    /// 交换器已定义
    /// The exchange was (re)defined on a channel incarnation
    Defined { incarnation: u64 },
    /// 交换器定义失败
    /// Definition failed on a channel incarnation
    Failed { incarnation: u64, error: Error },
}

impl ExchangeEvent {
    /// The signal name this event is raised under.
    /// 该事件对应的信号名称。
    pub fn topic(&self) -> &'static str {
        match self {
            ExchangeEvent::StateTransition { .. } => names::STATE_CHANGED,
            ExchangeEvent::Defined { .. } => names::DEFINED,
            ExchangeEvent::Failed { .. } => names::FAILED,
        }
    }
}

/// 状态转换执行器，负责执行状态转换和相关的事件处理
/// State transition executor responsible for executing state transitions and related event handling
pub struct StateTransitionExecutor {
    /// 交换器名称，用于日志记录
    /// Exchange name for logging
    exchange: Arc<str>,
    /// 事件监听器注册表，与控制器句柄共享
    /// Event listener registry, shared with the controller handle
    events: Arc<SignalRegistry<ExchangeEvent>>,
}

impl std::fmt::Debug for StateTransitionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTransitionExecutor")
            .field("exchange", &self.exchange)
            .field("event_listeners_count", &self.events.handler_count())
            .finish()
    }
}

impl StateTransitionExecutor {
    /// 创建新的状态转换执行器
    /// Create a new state transition executor
    pub fn new(exchange: Arc<str>, events: Arc<SignalRegistry<ExchangeEvent>>) -> Self {
        Self { exchange, events }
    }

    /// 执行状态转换
    /// Execute state transition
    pub fn execute_transition(
        &self,
        current_state: ExchangeState,
        new_state: ExchangeState,
    ) -> Result<ExchangeEvent> {
        if !StateValidator::is_valid_transition(current_state, new_state) {
            warn!(
                exchange = %self.exchange,
                current_state = %current_state,
                attempted_state = %new_state,
                "Invalid state transition attempted"
            );
            return Err(Error::InvalidTransition {
                from: current_state,
                to: new_state,
            });
        }

        debug!(
            exchange = %self.exchange,
            from = current_state.label(),
            to = new_state.label(),
            "State transition executed"
        );

        Ok(ExchangeEvent::StateTransition {
            from: current_state,
            to: new_state,
        })
    }

    /// 触发生命周期事件
    /// Trigger lifecycle event
    pub fn announce(&self, event: &ExchangeEvent) {
        self.events.raise(event.topic(), event);
    }

    pub fn events(&self) -> &Arc<SignalRegistry<ExchangeEvent>> {
        &self.events
    }
}

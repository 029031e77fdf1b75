//! 交换器生命周期管理模块
//! Exchange Lifecycle Management Module
//!
//! 该模块提供交换器生命周期的统一管理，包括状态验证、转换逻辑和管理器实现。
//! 状态只能通过管理器修改，缓存的失败与 `Failed` 状态同生共灭。
//!
//! This module provides unified exchange lifecycle management, including state
//! validation, transition logic and the manager. State is only mutated through
//! the manager, and the cached failure lives exactly as long as the `Failed` state.

mod manager;
mod transitions;
mod validation;

pub use manager::ExchangeLifecycle;
pub use transitions::{ExchangeEvent, StateTransitionExecutor};
pub use validation::StateValidator;

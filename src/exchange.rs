//! The exchange controller: a state machine with an attached replay log.
//!
//! 交换器控制器：附带重放日志的状态机。

mod actor;
mod command;
pub mod handle;
pub mod lifecycle;
pub mod replay;
mod sender;
mod state;
mod types;

pub use handle::{ExchangeController, ExchangeControllerBuilder};
pub use lifecycle::ExchangeEvent;
pub use state::{ExchangeSnapshot, ExchangeState};
pub use types::{ExchangeDescriptor, Message};

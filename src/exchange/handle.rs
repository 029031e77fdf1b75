//! The user-facing exchange controller API.

use super::{
    ExchangeDescriptor, ExchangeSnapshot, ExchangeState, Message,
    actor::ExchangeActor,
    command::ExchangeCommand,
    lifecycle::{ExchangeEvent, ExchangeLifecycle, StateTransitionExecutor},
    replay::ReplayLog,
};
use crate::{
    broker::{ChannelFactory, Connection, Topology},
    config::Config,
    error::{Error, Result},
    signal::{SignalRegistry, Subscription},
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// A handle to a running exchange controller.
///
/// The controller itself runs as an actor task spawned on construction. The
/// handle is cheap to clone; once every clone is dropped the actor removes its
/// subscriptions and stops.
///
/// 正在运行的交换器控制器的句柄。
///
/// 控制器本身是在构造时派生的 actor 任务。句柄克隆代价很低；
/// 所有克隆都被丢弃后，actor 会移除其订阅并停止。
#[derive(Clone)]
pub struct ExchangeController {
    descriptor: Arc<ExchangeDescriptor>,
    command_tx: mpsc::UnboundedSender<ExchangeCommand>,
    snapshot_rx: watch::Receiver<ExchangeSnapshot>,
    events: Arc<SignalRegistry<ExchangeEvent>>,
}

impl std::fmt::Debug for ExchangeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeController")
            .field("descriptor", &self.descriptor)
            .field("snapshot", &*self.snapshot_rx.borrow())
            .finish()
    }
}

impl ExchangeController {
    /// Creates a controller with the default configuration and starts it.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// 使用默认配置创建控制器并启动。必须在 Tokio 运行时中调用。
    pub fn new<F, C, T>(
        descriptor: ExchangeDescriptor,
        connection: Arc<C>,
        topology: Arc<T>,
        factory: Arc<F>,
    ) -> Self
    where
        F: ChannelFactory,
        C: Connection,
        T: Topology,
    {
        Self::builder(descriptor).build(connection, topology, factory)
    }

    /// Starts building a controller, which allows configuration and listeners
    /// that must be in place before the first definition settles.
    ///
    /// 开始构建控制器，可以在第一次定义完成之前设置配置和监听器。
    pub fn builder(descriptor: ExchangeDescriptor) -> ExchangeControllerBuilder {
        ExchangeControllerBuilder {
            descriptor,
            config: Config::default(),
            events: Arc::new(SignalRegistry::new()),
        }
    }

    pub fn descriptor(&self) -> &ExchangeDescriptor {
        &self.descriptor
    }

    /// The current state.
    /// 当前状态。
    pub fn state(&self) -> ExchangeState {
        self.snapshot_rx.borrow().state
    }

    pub fn snapshot(&self) -> ExchangeSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Waits until the controller reaches `state`.
    ///
    /// 等待控制器进入 `state`。
    pub async fn wait_for_state(&self, state: ExchangeState) -> Result<()> {
        self.wait_for(|snapshot| snapshot.state == state)
            .await
            .map(|_| ())
    }

    /// Waits until a snapshot satisfies `predicate` and returns it.
    ///
    /// 等待满足 `predicate` 的快照并返回它。
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&ExchangeSnapshot) -> bool,
    ) -> Result<ExchangeSnapshot> {
        let mut snapshot_rx = self.snapshot_rx.clone();
        let reached = snapshot_rx
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map(|snapshot| snapshot.clone());
        reached.map_err(|_| Error::ControllerClosed)
    }

    /// Publishes a message.
    ///
    /// While the exchange is ready and its bindings are confirmed the message
    /// goes straight to the channel. Otherwise it is recorded in the replay log
    /// and the call settles when a later replay sends it. In the failed state
    /// the cached definition failure is returned. A destroyed exchange is
    /// rebuilt first.
    ///
    /// 发布一条消息。
    ///
    /// 交换器就绪且绑定已确认时，消息直接发往通道。否则消息会被记录到重放日志，
    /// 并在之后的重放发送它时完成。处于失败状态时返回缓存的定义失败。已销毁的交换器会先被重建。
    pub async fn publish(&self, message: Message) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(ExchangeCommand::Publish {
            message,
            response_tx,
        })?;
        response_rx.await.map_err(|_| Error::ControllerClosed)?
    }

    /// Appends a message to the replay log without waiting for its delivery.
    /// It is sent with the next replay.
    ///
    /// 向重放日志追加消息而不等待其投递。它会随下一次重放发送。
    pub fn record(&self, message: Message) -> Result<()> {
        self.send(ExchangeCommand::Record { message })
    }

    /// Confirms the exchange is usable.
    ///
    /// Resolves at once when ready and fails at once with the cached failure.
    /// Otherwise it waits for the outstanding (or newly started) definition.
    ///
    /// 确认交换器可用。就绪时立即返回，失败时立即返回缓存的失败，否则等待正在进行（或新开始）的定义。
    pub async fn check(&self) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(ExchangeCommand::Check { response_tx })?;
        response_rx.await.map_err(|_| Error::ControllerClosed)?
    }

    /// Destroys the channel and removes every handler this controller put on
    /// the connection, the topology and the channel. The replay log is kept.
    ///
    /// If the channel fails to destroy, the controller is still torn down and
    /// the channel's error is returned.
    ///
    /// 销毁通道并移除该控制器在连接、拓扑和通道上注册的所有处理器。重放日志会被保留。
    /// 如果通道销毁失败，控制器仍会被拆除，并返回通道的错误。
    pub async fn destroy(&self) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(ExchangeCommand::Destroy { response_tx })?;
        response_rx.await.map_err(|_| Error::ControllerClosed)?
    }

    /// Registers a listener for a controller event such as
    /// [`names::DEFINED`](crate::signal::names::DEFINED) or
    /// [`names::FAILED`](crate::signal::names::FAILED).
    ///
    /// Listeners run on the controller task and must not block.
    ///
    /// 为控制器事件注册监听器。监听器在控制器任务上运行，不得阻塞。
    pub fn on_event(
        &self,
        topic: &'static str,
        listener: impl Fn(&ExchangeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.on(topic, listener)
    }

    pub fn remove_listener(&self, subscription: &Subscription) -> bool {
        self.events.off(subscription)
    }

    fn send(&self, command: ExchangeCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::ControllerClosed)
    }
}

/// Builder for [`ExchangeController`].
///
/// [`ExchangeController`] 的构建器。
pub struct ExchangeControllerBuilder {
    descriptor: ExchangeDescriptor,
    config: Config,
    events: Arc<SignalRegistry<ExchangeEvent>>,
}

impl ExchangeControllerBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Registers a listener before the controller starts, so no event is missed.
    /// 在控制器启动前注册监听器，从而不会错过任何事件。
    pub fn on_event(
        self,
        topic: &'static str,
        listener: impl Fn(&ExchangeEvent) + Send + Sync + 'static,
    ) -> Self {
        self.events.on(topic, listener);
        self
    }

    /// Spawns the controller actor and returns its handle.
    ///
    /// 派生控制器 actor 并返回其句柄。
    pub fn build<F, C, T>(self, connection: Arc<C>, topology: Arc<T>, factory: Arc<F>) -> ExchangeController
    where
        F: ChannelFactory,
        C: Connection,
        T: Topology,
    {
        let descriptor = Arc::new(self.descriptor);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ExchangeSnapshot::initial());

        let name: Arc<str> = Arc::from(descriptor.name.as_str());
        let lifecycle =
            ExchangeLifecycle::new(StateTransitionExecutor::new(name, self.events.clone()));

        let actor = ExchangeActor::new(
            descriptor.clone(),
            connection,
            topology,
            factory,
            lifecycle,
            ReplayLog::new(self.config.replay),
            command_rx,
            command_tx.downgrade(),
            snapshot_tx,
        );
        tokio::spawn(actor.run());

        ExchangeController {
            descriptor,
            command_tx,
            snapshot_rx,
            events: self.events,
        }
    }
}

//! The implementation of the `ExchangeActor`.
//!
//! The actor is the only owner of the exchange state. It runs in a dedicated
//! task and never awaits a channel operation itself: `define()` and
//! `destroy()` run in spawned tasks and report back through the command queue,
//! publishes go through the per-incarnation delivery task. Every command is
//! therefore handled to completion before the next one is looked at.
//!
//! `ExchangeActor` 的实现。
//!
//! actor 是交换器状态的唯一所有者。它在专用任务中运行，自身从不等待通道操作：
//! `define()` 和 `destroy()` 在派生任务中运行并通过命令队列回报结果，
//! 发布则经过每个化身的投递任务。因此每条命令都会在处理下一条之前被完整处理。

use super::{
    ExchangeDescriptor, ExchangeSnapshot, ExchangeState, Message,
    command::ExchangeCommand,
    lifecycle::{ExchangeEvent, ExchangeLifecycle, StateValidator},
    replay::{Delivery, ReplayLog},
    sender::delivery_task,
};
use crate::{
    broker::{Channel, ChannelFactory, Connection, Topology},
    error::{Error, Result},
    signal::{Subscription, names},
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

type Responder = oneshot::Sender<Result<()>>;

/// Everything tied to one channel incarnation.
///
/// 与单个通道化身绑定的全部内容。
struct ChannelSlot<Ch> {
    channel: Arc<Ch>,
    incarnation: u64,
    /// Our handler on the channel's `released` signal.
    released: Subscription,
    /// Queue feeding the delivery task of this incarnation.
    deliveries: mpsc::UnboundedSender<Delivery>,
    /// `define()` has been issued and has not settled yet.
    defining: bool,
    /// A release arrived while `define()` was outstanding.
    released_while_defining: bool,
    /// `bindings-completed` arrived while `define()` was outstanding.
    bindings_seen: bool,
    /// Direct sends are allowed; set once nothing is left to replay first.
    bindings_confirmed: bool,
}

/// Our handlers on the connection and the topology. Created once, removed on
/// destroy, re-created only by a rebuild.
///
/// 我们在连接和拓扑上的处理器。只创建一次，销毁时移除，只有重建时才重新创建。
#[derive(Default)]
struct SharedSubscriptions {
    connection: Option<Subscription>,
    topology: Option<Subscription>,
}

/// A `destroy()` waiting for the channel to answer.
struct Teardown<Ch> {
    incarnation: u64,
    /// Kept until the destroy settles.
    _channel: Arc<Ch>,
    waiters: Vec<Responder>,
    /// A publish or check arrived meanwhile and wants the exchange back.
    rebuild: bool,
}

/// The actor that owns the exchange state, the replay log and every
/// subscription made on collaborators.
///
/// 拥有交换器状态、重放日志以及在协作者上所做的全部订阅的 actor。
pub(crate) struct ExchangeActor<F: ChannelFactory, C: Connection, T: Topology> {
    pub(crate) descriptor: Arc<ExchangeDescriptor>,
    pub(crate) name: Arc<str>,
    pub(crate) connection: Arc<C>,
    pub(crate) topology: Arc<T>,
    pub(crate) factory: Arc<F>,
    pub(crate) lifecycle: ExchangeLifecycle,
    pub(crate) replay_log: ReplayLog,
    pub(crate) command_rx: mpsc::UnboundedReceiver<ExchangeCommand>,
    pub(crate) command_tx: mpsc::WeakUnboundedSender<ExchangeCommand>,
    pub(crate) snapshot_tx: watch::Sender<ExchangeSnapshot>,
    incarnation: u64,
    slot: Option<ChannelSlot<F::Channel>>,
    shared: SharedSubscriptions,
    check_waiters: Vec<Responder>,
    teardown: Option<Teardown<F::Channel>>,
}

impl<F: ChannelFactory, C: Connection, T: Topology> ExchangeActor<F, C, T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        descriptor: Arc<ExchangeDescriptor>,
        connection: Arc<C>,
        topology: Arc<T>,
        factory: Arc<F>,
        lifecycle: ExchangeLifecycle,
        replay_log: ReplayLog,
        command_rx: mpsc::UnboundedReceiver<ExchangeCommand>,
        command_tx: mpsc::WeakUnboundedSender<ExchangeCommand>,
        snapshot_tx: watch::Sender<ExchangeSnapshot>,
    ) -> Self {
        let name: Arc<str> = Arc::from(descriptor.name.as_str());
        Self {
            descriptor,
            name,
            connection,
            topology,
            factory,
            lifecycle,
            replay_log,
            command_rx,
            command_tx,
            snapshot_tx,
            incarnation: 0,
            slot: None,
            shared: SharedSubscriptions::default(),
            check_waiters: Vec::new(),
            teardown: None,
        }
    }

    /// Runs the actor's main event loop.
    ///
    /// 运行 actor 的主事件循环。
    pub(crate) async fn run(mut self) {
        info!(
            exchange = %self.name,
            exchange_type = %self.descriptor.exchange_type,
            "Starting exchange controller"
        );
        self.attach_shared();
        self.acquire_channel();
        self.publish_snapshot();

        while let Some(command) = self.command_rx.recv().await {
            self.handle_command(command);
            self.publish_snapshot();
        }

        // Every controller handle is gone.
        self.shutdown();
    }

    fn handle_command(&mut self, command: ExchangeCommand) {
        match command {
            ExchangeCommand::Publish {
                message,
                response_tx,
            } => self.handle_publish(message, response_tx),
            ExchangeCommand::Record { message } => {
                let entry = self.replay_log.append(message, None);
                debug!(exchange = %self.name, entry, "Message recorded for replay");
            }
            ExchangeCommand::Check { response_tx } => self.handle_check(response_tx),
            ExchangeCommand::Destroy { response_tx } => self.handle_destroy(response_tx),
            ExchangeCommand::Released { incarnation } => {
                self.handle_release(incarnation, names::RELEASED)
            }
            ExchangeCommand::Reconnected => {
                if let Some(incarnation) = self.slot.as_ref().map(|slot| slot.incarnation) {
                    self.handle_release(incarnation, names::RECONNECTED);
                }
            }
            ExchangeCommand::BindingsCompleted => self.handle_bindings_completed(),
            ExchangeCommand::DefineSettled {
                incarnation,
                result,
            } => self.handle_define_settled(incarnation, result),
            ExchangeCommand::DestroySettled {
                incarnation,
                result,
            } => self.handle_destroy_settled(incarnation, result),
        }
    }

    // ---------------- API requests ----------------

    fn handle_publish(&mut self, message: Message, response_tx: Responder) {
        if let Some(teardown) = self.teardown.as_mut() {
            teardown.rebuild = true;
            let entry = self.replay_log.append(message, Some(response_tx));
            debug!(exchange = %self.name, entry, "Publish queued while tearing down");
            return;
        }

        let state = self.lifecycle.current_state();
        if StateValidator::rejects_with_cached_failure(state) {
            if let Some(error) = self.lifecycle.failure_for_caller() {
                debug!(exchange = %self.name, %error, "Publish rejected with cached failure");
                let _ = response_tx.send(Err(error));
                return;
            }
        }

        let bindings_confirmed = self
            .slot
            .as_ref()
            .is_some_and(|slot| slot.bindings_confirmed);
        if StateValidator::can_publish_directly(state, bindings_confirmed) {
            if let Some(slot) = self.slot.as_ref() {
                Self::enqueue(slot, Delivery::direct(message, response_tx));
                return;
            }
        }

        let entry = self.replay_log.append(message, Some(response_tx));
        debug!(
            exchange = %self.name,
            entry,
            state = %state,
            entries = self.replay_log.len(),
            "Publish queued for replay"
        );

        if StateValidator::needs_rebuild(state) {
            self.rebuild();
        }
    }

    fn handle_check(&mut self, response_tx: Responder) {
        if let Some(teardown) = self.teardown.as_mut() {
            teardown.rebuild = true;
            self.check_waiters.push(response_tx);
            return;
        }

        match self.lifecycle.current_state() {
            ExchangeState::Ready => {
                let _ = response_tx.send(Ok(()));
            }
            ExchangeState::Failed => {
                if self.lifecycle.cached_failure().is_none() {
                    warn!(exchange = %self.name, "Failed state without a cached failure");
                }
                let _ = response_tx.send(Err(self.lifecycle.rejection()));
            }
            ExchangeState::Initializing => self.check_waiters.push(response_tx),
            ExchangeState::Destroyed => {
                self.check_waiters.push(response_tx);
                self.rebuild();
            }
        }
    }

    fn handle_destroy(&mut self, response_tx: Responder) {
        if let Some(teardown) = self.teardown.as_mut() {
            teardown.waiters.push(response_tx);
            return;
        }

        let Some(slot) = self.detach_channel() else {
            // Failed or already destroyed: no channel to wait for.
            self.finish_teardown(vec![response_tx], Ok(()), false);
            return;
        };

        let incarnation = slot.incarnation;
        let channel = slot.channel.clone();
        // Dropping the slot closes the delivery queue of this incarnation.
        drop(slot);

        info!(exchange = %self.name, incarnation, "Destroying exchange channel");
        let destroy_channel = channel.clone();
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            let result = destroy_channel.destroy().await;
            if let Some(command_tx) = command_tx.upgrade() {
                let _ = command_tx.send(ExchangeCommand::DestroySettled {
                    incarnation,
                    result,
                });
            }
        });

        self.teardown = Some(Teardown {
            incarnation,
            _channel: channel,
            waiters: vec![response_tx],
            rebuild: false,
        });
    }

    // ---------------- Collaborator signals ----------------

    fn handle_release(&mut self, incarnation: u64, reason: &'static str) {
        let state = self.lifecycle.current_state();
        let Some(slot) = self.slot.as_mut() else {
            trace!(exchange = %self.name, reason, "No channel attached; ignoring");
            return;
        };
        if slot.incarnation != incarnation {
            trace!(
                exchange = %self.name,
                incarnation,
                current = slot.incarnation,
                "Ignoring release of a previous channel"
            );
            return;
        }

        if slot.defining {
            debug!(
                exchange = %self.name,
                incarnation,
                reason,
                "Channel lost while defining; will re-acquire once define settles"
            );
            slot.released_while_defining = true;
            return;
        }

        if StateValidator::reacquires_on_release(state) {
            info!(exchange = %self.name, incarnation, reason, "Channel lost; re-acquiring");
            self.reacquire();
        }
    }

    fn handle_bindings_completed(&mut self) {
        let state = self.lifecycle.current_state();
        let Some(slot) = self.slot.as_mut() else {
            trace!(exchange = %self.name, "Bindings completed without a channel; ignoring");
            return;
        };

        if slot.defining {
            slot.bindings_seen = true;
            debug!(
                exchange = %self.name,
                incarnation = slot.incarnation,
                "Bindings completed before definition settled"
            );
            return;
        }

        if StateValidator::can_flush(state) {
            slot.bindings_confirmed = true;
            self.flush();
        }
    }

    // ---------------- Channel operation outcomes ----------------

    fn handle_define_settled(&mut self, incarnation: u64, result: Result<()>) {
        let replay_empty = self.replay_log.is_empty();
        let Some(slot) = self
            .slot
            .as_mut()
            .filter(|slot| slot.incarnation == incarnation)
        else {
            warn!(exchange = %self.name, incarnation, "Ignoring define outcome of an abandoned channel");
            return;
        };
        slot.defining = false;

        match result {
            Ok(()) if slot.released_while_defining => {
                info!(
                    exchange = %self.name,
                    incarnation,
                    "Channel was released during definition; re-acquiring"
                );
                self.reacquire();
            }
            Ok(()) => {
                let bindings_seen = slot.bindings_seen;
                // With nothing to replay there is nothing to wait for.
                slot.bindings_confirmed = bindings_seen || replay_empty;

                match self.lifecycle.mark_defined(incarnation) {
                    Ok(events) => {
                        self.commit(&events);
                        for waiter in self.check_waiters.drain(..) {
                            let _ = waiter.send(Ok(()));
                        }
                        if bindings_seen && !replay_empty {
                            self.flush();
                        }
                    }
                    Err(error) => {
                        warn!(exchange = %self.name, %error, "Cannot mark exchange as defined")
                    }
                }
            }
            Err(error) => {
                self.detach_channel();
                match self.lifecycle.mark_failed(incarnation, error.clone()) {
                    Ok(events) => {
                        let answered = self.replay_log.fail_awaited(&error);
                        if answered > 0 {
                            debug!(
                                exchange = %self.name,
                                answered,
                                "Queued publishes answered with definition failure"
                            );
                        }
                        self.commit(&events);
                        for waiter in self.check_waiters.drain(..) {
                            let _ = waiter.send(Err(error.clone()));
                        }
                    }
                    Err(transition_error) => {
                        warn!(exchange = %self.name, %transition_error, "Cannot mark exchange as failed")
                    }
                }
            }
        }
    }

    fn handle_destroy_settled(&mut self, incarnation: u64, result: Result<()>) {
        match self.teardown.take() {
            Some(teardown) if teardown.incarnation == incarnation => {
                self.finish_teardown(teardown.waiters, result, teardown.rebuild);
            }
            other => {
                self.teardown = other;
                warn!(exchange = %self.name, incarnation, "Ignoring stale destroy outcome");
            }
        }
    }

    // ---------------- Transitions ----------------

    /// Acquires a fresh channel, subscribes to its release and starts `define()`.
    ///
    /// 获取新通道，订阅其释放信号并开始 `define()`。
    fn acquire_channel(&mut self) {
        self.incarnation += 1;
        let incarnation = self.incarnation;
        let channel = self.factory.create(&self.descriptor);

        let command_tx = self.command_tx.clone();
        let released = channel.signals().on(names::RELEASED, move |_| {
            if let Some(command_tx) = command_tx.upgrade() {
                let _ = command_tx.send(ExchangeCommand::Released { incarnation });
            }
        });

        let (deliveries, delivery_rx) = mpsc::unbounded_channel();
        tokio::spawn(delivery_task(
            channel.clone(),
            delivery_rx,
            self.name.clone(),
            incarnation,
        ));

        debug!(exchange = %self.name, incarnation, "Channel acquired; defining exchange");
        let define_channel = channel.clone();
        let descriptor = self.descriptor.clone();
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            let result = define_channel.define(&descriptor).await;
            if let Some(command_tx) = command_tx.upgrade() {
                let _ = command_tx.send(ExchangeCommand::DefineSettled {
                    incarnation,
                    result,
                });
            }
        });

        self.slot = Some(ChannelSlot {
            channel,
            incarnation,
            released,
            deliveries,
            defining: true,
            released_while_defining: false,
            bindings_seen: false,
            bindings_confirmed: false,
        });
    }

    /// Replaces the current channel with a fresh one.
    fn reacquire(&mut self) {
        self.detach_channel();
        match self.lifecycle.begin_initializing() {
            Ok(events) => {
                self.acquire_channel();
                self.commit(&events);
            }
            Err(error) => warn!(exchange = %self.name, %error, "Cannot re-acquire channel"),
        }
    }

    /// Brings a destroyed exchange back exactly the way construction does.
    ///
    /// 以与构造完全相同的方式恢复已销毁的交换器。
    fn rebuild(&mut self) {
        match self.lifecycle.begin_initializing() {
            Ok(events) => {
                info!(
                    exchange = %self.name,
                    entries = self.replay_log.len(),
                    "Rebuilding destroyed exchange"
                );
                self.attach_shared();
                self.acquire_channel();
                self.commit(&events);
            }
            Err(error) => warn!(exchange = %self.name, %error, "Cannot rebuild exchange"),
        }
    }

    fn finish_teardown(&mut self, waiters: Vec<Responder>, result: Result<()>, rebuild: bool) {
        self.detach_shared();
        match self.lifecycle.mark_destroyed() {
            Ok(events) => self.commit(&events),
            Err(error) => warn!(exchange = %self.name, %error, "Cannot mark exchange as destroyed"),
        }

        match &result {
            Ok(()) => info!(exchange = %self.name, "Exchange destroyed"),
            Err(error) => warn!(
                exchange = %self.name,
                %error,
                "Channel destroy failed; exchange torn down anyway"
            ),
        }
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }

        if rebuild {
            self.rebuild();
        } else {
            for waiter in self.check_waiters.drain(..) {
                let _ = waiter.send(Err(Error::Destroyed));
            }
        }
    }

    /// Sends every replay-log entry to the channel, oldest first.
    ///
    /// 将重放日志中的每个条目发送到通道，最旧的优先。
    fn flush(&mut self) {
        let Some(slot) = self.slot.as_ref() else {
            return;
        };
        let deliveries = self.replay_log.flush();
        info!(
            exchange = %self.name,
            incarnation = slot.incarnation,
            entries = deliveries.len(),
            "Replaying logged messages"
        );
        for delivery in deliveries {
            Self::enqueue(slot, delivery);
        }
    }

    fn enqueue(slot: &ChannelSlot<F::Channel>, delivery: Delivery) {
        if let Err(mpsc::error::SendError(delivery)) = slot.deliveries.send(delivery) {
            delivery.settle(Err(Error::Transport("delivery task stopped".into())));
        }
    }

    // ---------------- Subscription bookkeeping ----------------

    fn attach_shared(&mut self) {
        if self.shared.connection.is_none() {
            self.connection.add_exchange(&self.descriptor);
            let command_tx = self.command_tx.clone();
            self.shared.connection = Some(self.connection.signals().on(names::RECONNECTED, move |_| {
                if let Some(command_tx) = command_tx.upgrade() {
                    let _ = command_tx.send(ExchangeCommand::Reconnected);
                }
            }));
        }

        if self.shared.topology.is_none() {
            let command_tx = self.command_tx.clone();
            self.shared.topology = Some(self.topology.signals().on(
                names::BINDINGS_COMPLETED,
                move |_| {
                    if let Some(command_tx) = command_tx.upgrade() {
                        let _ = command_tx.send(ExchangeCommand::BindingsCompleted);
                    }
                },
            ));
        }
    }

    fn detach_shared(&mut self) {
        if let Some(subscription) = self.shared.connection.take() {
            self.connection.signals().off(&subscription);
        }
        if let Some(subscription) = self.shared.topology.take() {
            self.topology.signals().off(&subscription);
        }
        debug!(exchange = %self.name, "Connection and topology handlers removed");
    }

    /// Takes the current channel out, removing our handler on it.
    fn detach_channel(&mut self) -> Option<ChannelSlot<F::Channel>> {
        let slot = self.slot.take()?;
        slot.channel.signals().off(&slot.released);
        trace!(exchange = %self.name, incarnation = slot.incarnation, "Channel detached");
        Some(slot)
    }

    // ---------------- Observation ----------------

    /// Publishes the snapshot first so that listeners already see the new state.
    fn commit(&self, events: &[ExchangeEvent]) {
        self.publish_snapshot();
        self.lifecycle.announce(events);
    }

    fn publish_snapshot(&self) {
        let next = ExchangeSnapshot {
            state: self.lifecycle.current_state(),
            incarnation: self.incarnation,
            channel_attached: self.slot.is_some() || self.teardown.is_some(),
            replay_entries: self.replay_log.len(),
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current != next {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    fn shutdown(&mut self) {
        self.detach_shared();
        if let Some(slot) = self.detach_channel() {
            let incarnation = slot.incarnation;
            let channel = slot.channel.clone();
            let name = self.name.clone();
            drop(slot);
            tokio::spawn(async move {
                if let Err(error) = channel.destroy().await {
                    warn!(exchange = %name, incarnation, %error, "Channel destroy failed during shutdown");
                }
            });
        }
        info!(exchange = %self.name, "Exchange controller stopped");
    }
}

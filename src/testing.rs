//! 测试辅助工具模块
//! Test utilities module
//!
//! In-memory collaborators for exercising an exchange controller without a
//! broker. Channel outcomes are scripted on the factory; every channel the
//! factory creates shares the same script and call record.
//!
//! 用于在没有代理的情况下驱动交换器控制器的内存协作者。通道结果在工厂上预设；
//! 工厂创建的每个通道共享同一份脚本和调用记录。

use crate::{
    broker::{Channel, ChannelFactory, Connection, Topology},
    error::{Error, Result},
    exchange::{ExchangeDescriptor, Message},
    signal::{SignalRegistry, names},
};
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::{Notify, oneshot};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A scripted `define()` outcome.
enum DefineOutcome {
    Now(Result<()>),
    Deferred(oneshot::Receiver<Result<()>>),
}

/// One recorded `publish()` call.
/// 一次被记录的 `publish()` 调用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    /// Index of the channel (in creation order) the message was published on.
    pub channel: usize,
    pub message: Message,
}

#[derive(Default)]
struct Script {
    define: VecDeque<DefineOutcome>,
    publish: VecDeque<Result<()>>,
    destroy: VecDeque<Result<()>>,
}

#[derive(Default)]
struct Record {
    defines: Vec<(usize, ExchangeDescriptor)>,
    publishes: Vec<PublishRecord>,
    destroys: Vec<usize>,
}

#[derive(Default)]
struct Shared {
    script: Mutex<Script>,
    record: Mutex<Record>,
    activity: Notify,
}

impl Shared {
    fn touch(&self) {
        self.activity.notify_waiters();
    }
}

/// A channel backed by the factory's script.
///
/// Operations without a scripted outcome succeed.
///
/// 由工厂脚本驱动的通道。没有预设结果的操作都会成功。
pub struct MockChannel {
    index: usize,
    shared: Arc<Shared>,
    signals: SignalRegistry,
}

impl MockChannel {
    /// Creation index of this channel on its factory.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Simulates the broker invalidating this channel.
    /// 模拟代理使该通道失效。
    pub fn release(&self) {
        self.signals.emit(names::RELEASED);
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn define(&self, descriptor: &ExchangeDescriptor) -> Result<()> {
        let outcome = lock(&self.shared.script).define.pop_front();
        lock(&self.shared.record)
            .defines
            .push((self.index, descriptor.clone()));
        self.shared.touch();

        match outcome {
            None => Ok(()),
            Some(DefineOutcome::Now(result)) => result,
            Some(DefineOutcome::Deferred(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(Error::Transport("define abandoned".into()))),
        }
    }

    async fn publish(&self, message: Message) -> Result<()> {
        let outcome = lock(&self.shared.script).publish.pop_front();
        lock(&self.shared.record).publishes.push(PublishRecord {
            channel: self.index,
            message,
        });
        self.shared.touch();
        outcome.unwrap_or(Ok(()))
    }

    async fn destroy(&self) -> Result<()> {
        let outcome = lock(&self.shared.script).destroy.pop_front();
        lock(&self.shared.record).destroys.push(self.index);
        self.shared.touch();
        outcome.unwrap_or(Ok(()))
    }

    fn signals(&self) -> &SignalRegistry {
        &self.signals
    }
}

/// A channel factory handing out [`MockChannel`]s.
///
/// 分发 [`MockChannel`] 的通道工厂。
#[derive(Default)]
pub struct MockChannelFactory {
    shared: Arc<Shared>,
    channels: Mutex<Vec<Arc<MockChannel>>>,
}

impl MockChannelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome of the next unscripted `define()`.
    /// 为下一次 `define()` 预设结果。
    pub fn expect_define(&self, result: Result<()>) {
        lock(&self.shared.script)
            .define
            .push_back(DefineOutcome::Now(result));
    }

    /// Queues a `define()` that stays pending until the returned sender is used.
    /// 预设一次保持挂起的 `define()`，直到使用返回的发送端。
    pub fn defer_define(&self) -> oneshot::Sender<Result<()>> {
        let (tx, rx) = oneshot::channel();
        lock(&self.shared.script)
            .define
            .push_back(DefineOutcome::Deferred(rx));
        tx
    }

    pub fn expect_publish(&self, result: Result<()>) {
        lock(&self.shared.script).publish.push_back(result);
    }

    pub fn expect_destroy(&self, result: Result<()>) {
        lock(&self.shared.script).destroy.push_back(result);
    }

    /// Number of channels created so far.
    pub fn created(&self) -> usize {
        lock(&self.channels).len()
    }

    pub fn channel(&self, index: usize) -> Option<Arc<MockChannel>> {
        lock(&self.channels).get(index).cloned()
    }

    /// The most recently created channel.
    pub fn latest(&self) -> Option<Arc<MockChannel>> {
        lock(&self.channels).last().cloned()
    }

    pub fn define_calls(&self) -> usize {
        lock(&self.shared.record).defines.len()
    }

    pub fn destroy_calls(&self) -> usize {
        lock(&self.shared.record).destroys.len()
    }

    /// Every publish across all channels, in call order.
    pub fn published(&self) -> Vec<PublishRecord> {
        lock(&self.shared.record).publishes.clone()
    }

    pub fn publish_calls(&self) -> usize {
        lock(&self.shared.record).publishes.len()
    }

    /// Waits until `condition` holds, re-checking after every channel call.
    ///
    /// 等待 `condition` 成立，每次通道调用后重新检查。
    pub async fn wait_until(&self, condition: impl Fn(&Self) -> bool) {
        loop {
            let notified = self.shared.activity.notified();
            if condition(self) {
                return;
            }
            notified.await;
        }
    }
}

impl ChannelFactory for MockChannelFactory {
    type Channel = MockChannel;

    fn create(&self, _descriptor: &ExchangeDescriptor) -> Arc<MockChannel> {
        let mut channels = lock(&self.channels);
        let channel = Arc::new(MockChannel {
            index: channels.len(),
            shared: self.shared.clone(),
            signals: SignalRegistry::new(),
        });
        channels.push(channel.clone());
        channel
    }
}

/// A connection that records the exchanges registered on it.
///
/// 记录其上注册的交换器的连接。
#[derive(Default)]
pub struct MockConnection {
    signals: SignalRegistry,
    exchanges: Mutex<Vec<ExchangeDescriptor>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the connection re-establishing its broker session.
    pub fn reconnect(&self) {
        self.signals.emit(names::RECONNECTED);
    }

    pub fn exchanges(&self) -> Vec<ExchangeDescriptor> {
        lock(&self.exchanges).clone()
    }
}

impl Connection for MockConnection {
    fn add_exchange(&self, descriptor: &ExchangeDescriptor) {
        lock(&self.exchanges).push(descriptor.clone());
    }

    fn signals(&self) -> &SignalRegistry {
        &self.signals
    }
}

/// A topology whose bindings complete on demand.
///
/// 按需完成绑定的拓扑。
#[derive(Default)]
pub struct MockTopology {
    signals: SignalRegistry,
}

impl MockTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals that the bindings for the exchange are in place.
    /// 发出交换器绑定已就绪的信号。
    pub fn complete_bindings(&self) {
        self.signals.emit(names::BINDINGS_COMPLETED);
    }
}

impl Topology for MockTopology {
    fn signals(&self) -> &SignalRegistry {
        &self.signals
    }
}

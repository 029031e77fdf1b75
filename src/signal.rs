//! 信号注册表 - 协作者暴露的订阅/退订接口
//! Signal Registry - the subscribe/unsubscribe surface exposed by collaborators
//!
//! 连接、拓扑和通道都拥有一个注册表。控制器在其上注册处理器，并持有返回的
//! `Subscription` 令牌，以便在销毁时精确地移除它们。
//!
//! Connections, topologies and channels each own a registry. The controller
//! registers handlers on them and keeps the returned `Subscription` tokens so
//! that exactly those handlers can be removed on destroy.

use dashmap::DashMap;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tracing::trace;

/// Well-known signal names.
/// 常用信号名称。
pub mod names {
    /// Raised by a channel when the broker invalidates it.
    /// 当代理使通道失效时由通道发出。
    pub const RELEASED: &str = "released";
    /// Raised by a topology once bindings for the exchange are in place.
    /// 当交换器的绑定就绪时由拓扑发出。
    pub const BINDINGS_COMPLETED: &str = "bindings-completed";
    /// Raised by a connection after it re-established its broker session.
    /// 当连接重新建立代理会话后由连接发出。
    pub const RECONNECTED: &str = "reconnected";
    /// Raised by an exchange controller after a successful definition.
    /// 交换器控制器成功定义后发出。
    pub const DEFINED: &str = "defined";
    /// Raised by an exchange controller after a failed definition.
    /// 交换器控制器定义失败后发出。
    pub const FAILED: &str = "failed";
    /// Raised by an exchange controller on every state change.
    pub const STATE_CHANGED: &str = "state-changed";
}

/// 处理器类型定义
/// Handler type definition
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Identifies a single registered handler.
/// 标识一个已注册的处理器。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// A token returned by [`SignalRegistry::on`]. Passing it back to
/// [`SignalRegistry::off`] removes exactly the handler it was issued for.
///
/// 由 [`SignalRegistry::on`] 返回的令牌。将其传回 [`SignalRegistry::off`]
/// 会精确移除对应的处理器。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    topic: &'static str,
    id: HandlerId,
}

impl Subscription {
    /// The signal this subscription listens to.
    pub fn topic(&self) -> &'static str {
        self.topic
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }
}

/// A registry of handlers keyed by signal name.
///
/// The registry is owned by the collaborator that raises the signals and is
/// shared with every party that subscribes; no handler is ever removed
/// implicitly.
///
/// 以信号名称为键的处理器注册表。
///
/// 注册表由发出信号的协作者拥有，并与所有订阅方共享；处理器永远不会被隐式移除。
pub struct SignalRegistry<E = ()> {
    next_id: AtomicU64,
    handlers: DashMap<&'static str, Vec<(HandlerId, Handler<E>)>>,
}

impl<E> Default for SignalRegistry<E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: DashMap::new(),
        }
    }
}

impl<E> std::fmt::Debug for SignalRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRegistry")
            .field("handler_count", &self.handler_count())
            .finish()
    }
}

impl<E> SignalRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器
    /// Registers a handler for `topic`.
    pub fn on(&self, topic: &'static str, handler: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        trace!(topic, handler_id = id.0, "Handler registered");
        Subscription { topic, id }
    }

    /// 移除处理器
    /// Removes the handler identified by `subscription`. Returns `false` if it
    /// was already gone.
    pub fn off(&self, subscription: &Subscription) -> bool {
        let removed = match self.handlers.get_mut(subscription.topic) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|(id, _)| *id != subscription.id);
                before != list.len()
            }
            None => false,
        };
        // The shard guard above must be released before this call.
        self.handlers
            .remove_if(subscription.topic, |_, list| list.is_empty());
        trace!(
            topic = subscription.topic,
            handler_id = subscription.id.0,
            removed,
            "Handler removed"
        );
        removed
    }

    /// 触发信号
    /// Invokes every handler registered for `topic`, in registration order.
    ///
    /// Handlers are collected before they run, so a handler may subscribe or
    /// unsubscribe without deadlocking the registry.
    pub fn raise(&self, topic: &'static str, payload: &E) {
        let snapshot: Vec<Handler<E>> = self
            .handlers
            .get(topic)
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();

        trace!(topic, handlers = snapshot.len(), "Raising signal");
        for handler in snapshot {
            handler(payload);
        }
    }

    /// Number of handlers registered for `topic`.
    pub fn count(&self, topic: &str) -> usize {
        self.handlers.get(topic).map(|list| list.len()).unwrap_or(0)
    }

    /// Number of handlers across all topics.
    pub fn handler_count(&self) -> usize {
        self.handlers.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.handler_count() == 0
    }

    /// Drops every handler. Meant for owners tearing the collaborator down.
    /// 移除所有处理器。供协作者的所有者在拆除时使用。
    pub fn reset(&self) {
        self.handlers.clear();
    }
}

impl SignalRegistry<()> {
    /// Raises a signal that carries no payload.
    /// 触发不带负载的信号。
    pub fn emit(&self, topic: &'static str) {
        self.raise(topic, &());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_on_and_raise() {
        let registry = SignalRegistry::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        registry.on("numbers", move |n| seen_clone.lock().unwrap().push(*n));
        registry.raise("numbers", &7);
        registry.raise("other", &9);

        assert_eq!(*seen.lock().unwrap(), vec![7]);
        assert_eq!(registry.count("numbers"), 1);
        assert_eq!(registry.count("other"), 0);
    }

    #[test]
    fn test_off_removes_only_the_given_handler() {
        let registry = SignalRegistry::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_a = hits.clone();
        let a = registry.on(names::RELEASED, move |_| {
            hits_a.fetch_add(1, Ordering::SeqCst);
        });
        let hits_b = hits.clone();
        let b = registry.on(names::RELEASED, move |_| {
            hits_b.fetch_add(10, Ordering::SeqCst);
        });

        assert!(registry.off(&a));
        assert!(!registry.off(&a));
        registry.emit(names::RELEASED);

        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(registry.handler_count(), 1);

        assert!(registry.off(&b));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_handler_may_unsubscribe_itself_while_raised() {
        let registry = Arc::new(SignalRegistry::<()>::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let registry_clone = registry.clone();
        let slot_clone = slot.clone();
        let sub = registry.on(names::BINDINGS_COMPLETED, move |_| {
            if let Some(sub) = slot_clone.lock().unwrap().take() {
                registry_clone.off(&sub);
            }
        });
        *slot.lock().unwrap() = Some(sub);

        registry.emit(names::BINDINGS_COMPLETED);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let registry = SignalRegistry::<()>::new();
        registry.on(names::RELEASED, |_| {});
        registry.on(names::RECONNECTED, |_| {});
        assert_eq!(registry.handler_count(), 2);

        registry.reset();
        assert!(registry.is_empty());
    }
}

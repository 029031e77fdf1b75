//! Integration tests for the exchange controller's state machine: definition,
//! failure caching, channel re-acquisition and teardown.

pub mod common;

use common::harness::{TestHarness, within};
use exchange_fsm::{
    Error, ExchangeController, ExchangeEvent, ExchangeState, Message,
    signal::names,
    testing::PublishRecord,
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

#[tokio::test]
async fn test_failed_definition_is_cached() {
    let harness = TestHarness::new();
    harness.factory.expect_define(Err(Error::Broker("nope".into())));
    let exchange = harness.start();

    within(exchange.wait_for_state(ExchangeState::Failed))
        .await
        .unwrap();

    let err = within(exchange.publish(Message::new("orders.created", "1")))
        .await
        .unwrap_err();
    assert_eq!(err, Error::Broker("nope".into()));
    assert_eq!(err.to_string(), "Error: nope");

    let err = within(exchange.check()).await.unwrap_err();
    assert_eq!(err.to_string(), "Error: nope");

    // No retry happens while the failure is cached.
    assert_eq!(harness.factory.define_calls(), 1);
    assert_eq!(harness.factory.publish_calls(), 0);
    let snapshot = exchange.snapshot();
    assert!(!snapshot.channel_attached);
    assert_eq!(snapshot.replay_entries, 0);
}

#[tokio::test]
async fn test_ready_exchange_publishes_directly() {
    let harness = TestHarness::new();
    let exchange = harness.start();

    within(exchange.check()).await.unwrap();
    assert_eq!(exchange.state(), ExchangeState::Ready);
    assert_eq!(harness.connection.exchanges(), vec![TestHarness::descriptor()]);

    let message = Message::new("orders.created", "1");
    within(exchange.publish(message.clone())).await.unwrap();

    assert_eq!(
        harness.factory.published(),
        vec![PublishRecord {
            channel: 0,
            message
        }]
    );
    assert_eq!(exchange.snapshot().replay_entries, 0);
}

#[tokio::test]
async fn test_check_waits_for_pending_definition() {
    let harness = TestHarness::new();
    let define = harness.factory.defer_define();
    let exchange = harness.start();
    within(harness.factory.wait_until(|f| f.define_calls() == 1)).await;

    let mut check = Box::pin(exchange.check());
    assert!(futures::poll!(&mut check).is_pending());
    assert_eq!(exchange.state(), ExchangeState::Initializing);

    define.send(Err(Error::Broker("nope".into()))).unwrap();
    let err = within(check).await.unwrap_err();
    assert_eq!(err, Error::Broker("nope".into()));
    assert_eq!(exchange.state(), ExchangeState::Failed);
}

#[tokio::test]
async fn test_release_reacquires_channel() {
    let harness = TestHarness::new();
    let defined = Arc::new(AtomicUsize::new(0));
    let defined_clone = defined.clone();
    let exchange = harness.start_with(
        ExchangeController::builder(TestHarness::descriptor()).on_event(names::DEFINED, move |_| {
            defined_clone.fetch_add(1, Ordering::SeqCst);
        }),
    );
    within(exchange.wait_for_state(ExchangeState::Ready))
        .await
        .unwrap();
    assert_eq!(defined.load(Ordering::SeqCst), 1);

    harness.factory.latest().unwrap().release();

    let snapshot = within(exchange.wait_for(|s| {
        s.incarnation == 2 && s.state == ExchangeState::Ready
    }))
    .await
    .unwrap();
    assert!(snapshot.channel_attached);
    assert_eq!(harness.factory.created(), 2);
    assert_eq!(harness.factory.define_calls(), 2);
    assert_eq!(defined.load(Ordering::SeqCst), 2);
    // Only the new channel carries our release handler.
    assert_eq!(harness.channel_handlers(), 1);

    // The old channel is no longer listened to.
    harness.factory.channel(0).unwrap().release();
    within(exchange.check()).await.unwrap();
    assert_eq!(harness.factory.created(), 2);

    let message = Message::new("orders.created", "2");
    within(exchange.publish(message.clone())).await.unwrap();
    assert_eq!(
        harness.factory.published(),
        vec![PublishRecord {
            channel: 1,
            message
        }]
    );
}

#[tokio::test]
async fn test_reconnect_reacquires_channel() {
    let harness = TestHarness::new();
    let exchange = harness.start();
    within(exchange.wait_for_state(ExchangeState::Ready))
        .await
        .unwrap();

    harness.connection.reconnect();

    within(exchange.wait_for(|s| s.incarnation == 2 && s.state == ExchangeState::Ready))
        .await
        .unwrap();
    assert_eq!(harness.factory.created(), 2);
    assert_eq!(harness.factory.define_calls(), 2);
}

#[tokio::test]
async fn test_release_during_definition_defines_again() {
    let harness = TestHarness::new();
    let define = harness.factory.defer_define();
    let exchange = harness.start();
    within(harness.factory.wait_until(|f| f.define_calls() == 1)).await;

    harness.factory.latest().unwrap().release();
    define.send(Ok(())).unwrap();

    let snapshot = within(exchange.wait_for(|s| s.state == ExchangeState::Ready))
        .await
        .unwrap();
    assert_eq!(snapshot.incarnation, 2);
    assert_eq!(harness.factory.created(), 2);
    assert_eq!(harness.factory.define_calls(), 2);
}

#[tokio::test]
async fn test_destroy_removes_every_handler() {
    let harness = TestHarness::new();
    let exchange = harness.start();
    within(exchange.check()).await.unwrap();
    assert_eq!(harness.shared_handlers(), 2);
    assert_eq!(harness.channel_handlers(), 1);

    within(exchange.destroy()).await.unwrap();

    assert_eq!(exchange.state(), ExchangeState::Destroyed);
    assert_eq!(harness.shared_handlers(), 0);
    assert_eq!(harness.channel_handlers(), 0);
    assert!(!exchange.snapshot().channel_attached);
    assert_eq!(harness.factory.destroy_calls(), 1);

    // Destroying again is a no-op.
    within(exchange.destroy()).await.unwrap();
    assert_eq!(harness.factory.destroy_calls(), 1);

    // Collaborator signals no longer reach the controller.
    harness.topology.complete_bindings();
    harness.connection.reconnect();
    assert_eq!(harness.factory.created(), 1);
    assert_eq!(exchange.state(), ExchangeState::Destroyed);
}

#[tokio::test]
async fn test_destroy_failure_still_tears_down() {
    let harness = TestHarness::new();
    harness
        .factory
        .expect_destroy(Err(Error::Transport("boom".into())));
    let exchange = harness.start();
    within(exchange.check()).await.unwrap();

    let err = within(exchange.destroy()).await.unwrap_err();
    assert_eq!(err, Error::Transport("boom".into()));
    assert_eq!(exchange.state(), ExchangeState::Destroyed);
    assert_eq!(harness.shared_handlers(), 0);
    assert_eq!(harness.channel_handlers(), 0);
}

#[tokio::test]
async fn test_check_rebuilds_destroyed_exchange() {
    let harness = TestHarness::new();
    let exchange = harness.start();
    within(exchange.check()).await.unwrap();
    within(exchange.destroy()).await.unwrap();

    within(exchange.check()).await.unwrap();

    assert_eq!(exchange.state(), ExchangeState::Ready);
    assert_eq!(harness.factory.created(), 2);
    assert_eq!(harness.shared_handlers(), 2);
    assert_eq!(harness.channel_handlers(), 1);
    assert_eq!(harness.connection.exchanges().len(), 2);
}

#[tokio::test]
async fn test_destroy_clears_cached_failure() {
    let harness = TestHarness::new();
    harness.factory.expect_define(Err(Error::Broker("nope".into())));
    let exchange = harness.start();
    within(exchange.wait_for_state(ExchangeState::Failed))
        .await
        .unwrap();

    // No channel is attached, so nothing needs destroying.
    within(exchange.destroy()).await.unwrap();
    assert_eq!(harness.factory.destroy_calls(), 0);
    assert_eq!(exchange.state(), ExchangeState::Destroyed);

    within(exchange.check()).await.unwrap();
    assert_eq!(exchange.state(), ExchangeState::Ready);
    assert_eq!(harness.factory.define_calls(), 2);
}

#[tokio::test]
async fn test_events_reach_listeners() {
    let harness = TestHarness::new();
    harness.factory.expect_define(Err(Error::Broker("nope".into())));

    let transitions = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(AtomicUsize::new(0));
    let transitions_clone = transitions.clone();
    let failures_clone = failures.clone();
    let builder = ExchangeController::builder(TestHarness::descriptor())
        .on_event(names::STATE_CHANGED, move |event| {
            if let ExchangeEvent::StateTransition { from, to } = event {
                transitions_clone.lock().unwrap().push((*from, *to));
            }
        })
        .on_event(names::FAILED, move |event| {
            if let ExchangeEvent::Failed { error, .. } = event {
                assert_eq!(error.to_string(), "Error: nope");
                failures_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
    let exchange = harness.start_with(builder);
    within(exchange.wait_for_state(ExchangeState::Failed))
        .await
        .unwrap();

    let defined = Arc::new(AtomicUsize::new(0));
    let defined_clone = defined.clone();
    let subscription = exchange.on_event(names::DEFINED, move |_| {
        defined_clone.fetch_add(1, Ordering::SeqCst);
    });

    within(exchange.destroy()).await.unwrap();
    within(exchange.check()).await.unwrap();
    assert!(exchange.remove_listener(&subscription));

    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(defined.load(Ordering::SeqCst), 1);
    assert_eq!(
        *transitions.lock().unwrap(),
        vec![
            (ExchangeState::Initializing, ExchangeState::Failed),
            (ExchangeState::Failed, ExchangeState::Destroyed),
            (ExchangeState::Destroyed, ExchangeState::Initializing),
            (ExchangeState::Initializing, ExchangeState::Ready),
        ]
    );
}

#[tokio::test]
async fn test_dropping_every_handle_stops_controller() {
    let harness = TestHarness::new();
    let exchange = harness.start();
    within(exchange.check()).await.unwrap();

    let clone = exchange.clone();
    drop(exchange);
    within(clone.check()).await.unwrap();
    drop(clone);

    within(harness.factory.wait_until(|f| f.destroy_calls() == 1)).await;
    assert_eq!(harness.shared_handlers(), 0);
    assert_eq!(harness.channel_handlers(), 0);
}

//! tests/common/harness.rs
use exchange_fsm::{
    ExchangeController, ExchangeDescriptor,
    exchange::ExchangeControllerBuilder,
    testing::{MockChannelFactory, MockConnection, MockTopology},
};
use std::future::Future;
use std::sync::{Arc, Once};
use std::time::Duration;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "exchange_fsm=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// Bounds every wait in a test so a missed signal fails instead of hanging.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out waiting for the exchange")
}

/// A test harness wiring an exchange controller to in-memory collaborators.
pub struct TestHarness {
    pub connection: Arc<MockConnection>,
    pub topology: Arc<MockTopology>,
    pub factory: Arc<MockChannelFactory>,
}

impl TestHarness {
    pub fn new() -> Self {
        init_tracing();
        Self {
            connection: Arc::new(MockConnection::new()),
            topology: Arc::new(MockTopology::new()),
            factory: Arc::new(MockChannelFactory::new()),
        }
    }

    pub fn descriptor() -> ExchangeDescriptor {
        ExchangeDescriptor::new("orders", "topic")
    }

    /// Starts a controller with the default configuration.
    pub fn start(&self) -> ExchangeController {
        ExchangeController::new(
            Self::descriptor(),
            self.connection.clone(),
            self.topology.clone(),
            self.factory.clone(),
        )
    }

    /// Starts a controller from a prepared builder.
    pub fn start_with(&self, builder: ExchangeControllerBuilder) -> ExchangeController {
        builder.build(
            self.connection.clone(),
            self.topology.clone(),
            self.factory.clone(),
        )
    }

    /// Handlers currently registered on the connection and the topology.
    pub fn shared_handlers(&self) -> usize {
        use exchange_fsm::{Connection, Topology};
        self.connection.signals().handler_count() + self.topology.signals().handler_count()
    }

    /// Handlers currently registered on every channel the factory created.
    pub fn channel_handlers(&self) -> usize {
        use exchange_fsm::Channel;
        (0..self.factory.created())
            .filter_map(|index| self.factory.channel(index))
            .map(|channel| channel.signals().handler_count())
            .sum()
    }
}

//! Convoflow service entry point.
//!
//! Wires the PostgreSQL and Redis adapters into the engine, starts the
//! background workers and serves the HTTP intake until Ctrl-C.

use std::error::Error;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use convoflow::adapters::actions::{
    CreateOrderAction, InitiatePaymentAction, SendMessageAction, ShowCatalogAction,
};
use convoflow::adapters::gateway::{
    HttpCatalogGateway, HttpGatewayConfig, HttpMessageSender, HttpPaymentGateway,
};
use convoflow::adapters::http::{intake_router, CallbackVerifier, IntakeState};
use convoflow::adapters::memory::{LoggingMessageSender, MockPaymentGateway, StaticCatalog};
use convoflow::adapters::postgres::{
    self, PostgresContactLock, PostgresInvocationLog, PostgresOrderStore, PostgresSessionStore,
};
use convoflow::adapters::redis::{self as redis_adapter, RedisTaskQueue};
use convoflow::application::{
    ActionExecutor, ActionRegistry, ConcurrencyGuard, FlowEngine, IdleSweeper, Interpreter,
    JobRegistry, OutboxRelay, WorkerPool,
};
use convoflow::config::{AppConfig, GatewayConfig};
use convoflow::domain::flow::FlowRegistry;
use convoflow::ports::{CatalogGateway, MessageSender, PaymentGateway, TaskQueue};

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        flows_dir = %config.flows.directory.display(),
        "Starting convoflow"
    );

    // Storage
    let pool = postgres::connect(&config.database).await?;
    let store = Arc::new(PostgresSessionStore::new(pool.clone()));
    let invocations = Arc::new(PostgresInvocationLog::new(pool.clone()));
    let orders = Arc::new(PostgresOrderStore::new(pool.clone()));
    let leases = Arc::new(PostgresContactLock::new(pool));

    let redis = redis_adapter::connect(&config.redis).await?;
    let queue: Arc<dyn TaskQueue> = Arc::new(RedisTaskQueue::new(redis, &config.redis.key_prefix));

    // Gateways
    let sender = message_sender(&config.gateway)?;
    let payments = payment_gateway(&config.gateway)?;
    let catalog = catalog_gateway(&config.gateway)?;

    // Flows and actions, checked against each other before any event runs
    let flows = Arc::new(FlowRegistry::load_dir(
        &config.flows.directory,
        config.flows.default_flow_id()?,
    )?);
    let actions = ActionRegistry::new()
        .with(Arc::new(SendMessageAction::new()))
        .with(Arc::new(ShowCatalogAction::new(catalog.clone())))
        .with(Arc::new(CreateOrderAction::new(catalog, orders)))
        .with(Arc::new(
            InitiatePaymentAction::new(payments).with_timeout(config.gateway.timeout()),
        ));
    actions.check_flows(&flows)?;
    tracing::info!(flows = flows.len(), "Flow definitions loaded");

    // Engine
    let executor = Arc::new(ActionExecutor::with_settings(
        actions,
        invocations.clone(),
        config.actions.executor_settings(),
    ));
    let interpreter = Arc::new(Interpreter::new(
        flows,
        executor,
        config.engine.interpreter_settings(),
    ));
    let guard = Arc::new(ConcurrencyGuard::new(leases, config.engine.guard_settings()));
    let relay = Arc::new(OutboxRelay::new(
        store.clone(),
        sender,
        queue.clone(),
        config.workers.outbox_relay_config(),
    ));
    let engine = Arc::new(
        FlowEngine::new(
            store.clone(),
            guard,
            interpreter,
            queue.clone(),
            config.engine.engine_settings(),
        )
        .with_relay(relay.clone()),
    );

    // Background workers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let workers = WorkerPool::new(
        queue.clone(),
        JobRegistry::for_engine(engine.clone()),
        config.workers.worker_pool_config(),
    );
    let sweeper = IdleSweeper::new(
        engine,
        store,
        invocations,
        config.engine.sweeper_config(),
    );

    let mut tasks = Vec::new();
    let rx = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = workers.run(rx).await {
            tracing::error!(error = %e, "Worker pool stopped with error");
        }
    }));
    let rx = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = relay.run(rx).await {
            tracing::error!(error = %e, "Outbox relay stopped with error");
        }
    }));
    let rx = shutdown_rx;
    tasks.push(tokio::spawn(async move { sweeper.run(rx).await }));

    // HTTP intake
    let verifier = CallbackVerifier::new(config.webhook.secret.clone(), config.webhook.tolerance());
    if !verifier.is_enabled() {
        tracing::warn!("No webhook secret configured; callbacks are accepted unsigned");
    }
    let app = intake_router(
        IntakeState::new(queue, verifier),
        config.server.request_timeout(),
    );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP intake listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Background task panicked");
        }
    }
    tracing::info!("Convoflow stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn http_config(gateway: &GatewayConfig, url: &str) -> HttpGatewayConfig {
    HttpGatewayConfig::new(url)
        .with_api_key(gateway.api_key.clone())
        .with_timeout(gateway.timeout())
}

fn message_sender(gateway: &GatewayConfig) -> Result<Arc<dyn MessageSender>, BoxError> {
    Ok(match &gateway.messaging_url {
        Some(url) => Arc::new(HttpMessageSender::new(http_config(gateway, url))?),
        None => {
            tracing::warn!("No messaging gateway configured; outbound messages are only logged");
            Arc::new(LoggingMessageSender)
        }
    })
}

fn payment_gateway(gateway: &GatewayConfig) -> Result<Arc<dyn PaymentGateway>, BoxError> {
    Ok(match &gateway.payment_url {
        Some(url) => Arc::new(HttpPaymentGateway::new(http_config(gateway, url))?),
        None => {
            tracing::warn!("No payment gateway configured; using the in-process mock");
            Arc::new(MockPaymentGateway::new())
        }
    })
}

fn catalog_gateway(gateway: &GatewayConfig) -> Result<Arc<dyn CatalogGateway>, BoxError> {
    Ok(match &gateway.catalog_url {
        Some(url) => Arc::new(HttpCatalogGateway::new(http_config(gateway, url))?),
        None => Arc::new(StaticCatalog::demo()),
    })
}

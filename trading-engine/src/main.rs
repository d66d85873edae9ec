//! Exchange engine binary
//!
//! Wires the durable store, the matching engine, the settlement coordinator
//! and the per-market order workers together, then feeds orders in from a
//! file, stdin and/or the HTTP API until shutdown.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use common::db::{
    init_db_pool, queries, run_migrations, InMemoryTransactionManager, PgTransactionManager,
    TransactionManager,
};
use common::decimal::dec;
use common::error::{Error, Result};
use common::model::account::Account;
use dotenv::dotenv;
use market_data::{MarketDataChannel, MarketPricePublisher};
use matching_engine::MatchingEngine;
use settlement_service::config::parse_markets;
use settlement_service::{
    EngineConfig, FeedStats, OrderProcessor, OrderRouter, SettlementCoordinator, StoreKind,
};
use tokio::fs::File;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command line arguments. Anything not given falls back to the environment.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Durable store: memory or postgres
    #[clap(long)]
    store: Option<StoreKind>,

    /// PostgreSQL connection string
    #[clap(long)]
    database_url: Option<String>,

    /// Comma-separated market symbols
    #[clap(long)]
    markets: Option<String>,

    /// Newline-delimited order feed; `-` reads stdin
    #[clap(long)]
    feed: Option<String>,

    /// API port
    #[clap(short, long)]
    port: Option<u16>,

    /// Do not serve the HTTP API
    #[clap(long)]
    no_api: bool,

    /// Default log level when RUST_LOG is unset
    #[clap(long, default_value = "info")]
    log_level: String,

    /// Log as JSON lines
    #[clap(long)]
    json_logs: bool,

    /// Seed demo accounts User1..UserN
    #[clap(short, long)]
    demo: bool,

    /// Number of demo accounts
    #[clap(long, default_value_t = 100)]
    demo_users: usize,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();
    init_tracing(&args)?;

    let config = load_config(&args)?;
    info!(
        "Starting exchange engine: store={}, markets={:?}",
        config.store, config.markets
    );

    let store = open_store(&config, &args).await?;

    let engine = Arc::new(MatchingEngine::new());
    for market in &config.markets {
        engine.register_market(market.as_str());
    }

    let publisher = Arc::new(MarketPricePublisher::new(
        store.clone(),
        Arc::new(MarketDataChannel::new()),
    ));
    let coordinator =
        SettlementCoordinator::new(store.clone(), publisher.clone(), config.settlement_timeout);
    let processor = Arc::new(OrderProcessor::new(
        engine.clone(),
        coordinator,
        store,
        publisher.clone(),
    ));

    for market in &config.markets {
        processor.recover(market).await?;
    }

    let router = Arc::new(OrderRouter::start(
        processor.clone(),
        &config.markets,
        config.worker_queue_capacity,
        None,
    ));

    let snapshot_task = spawn_snapshots(processor.clone(), config.snapshot_interval);

    let mut feed_task: Option<JoinHandle<Result<FeedStats>>> = args.feed.clone().map(|feed| {
        let router = router.clone();
        tokio::spawn(async move { ingest(router, feed).await })
    });

    if args.no_api {
        match feed_task.as_mut() {
            Some(handle) => tokio::select! {
                result = handle => report_feed(result),
                _ = shutdown_signal() => {},
            },
            None => shutdown_signal().await,
        }
    } else {
        let state = Arc::new(api_gateway::AppState::new(
            engine.clone(),
            router.clone(),
            publisher,
        ));
        let app = api_gateway::app(state);

        let addr: std::net::SocketAddr = ([0, 0, 0, 0], config.api_port).into();
        let listener = TcpListener::bind(&addr).await?;
        info!("Starting API server on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    if let Some(handle) = feed_task {
        handle.abort();
    }

    // Drain queued orders before the final snapshot
    router.shutdown().await;
    snapshot_task.abort();

    match processor.persist_books().await {
        Ok(saved) => info!("Saved {} resting orders on shutdown", saved),
        Err(e) => error!("Failed to save order books on shutdown: {}", e),
    }

    info!("Shutting down");
    Ok(())
}

fn init_tracing(args: &Args) -> Result<()> {
    // DEBUG=1 in .env switches the default level to debug
    let env_debug = std::env::var("DEBUG").map(|v| v == "1").unwrap_or(false);
    let default_level = if env_debug { "debug" } else { args.log_level.as_str() };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| Error::ConfigurationError(format!("invalid log filter: {}", e)))?;
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);

    let initialized = if args.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    initialized.map_err(|e| Error::ConfigurationError(format!("failed to initialize logging: {}", e)))
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env()?;

    if let Some(store) = args.store {
        config.store = store;
    }
    if let Some(url) = &args.database_url {
        config.database_url = url.clone();
    }
    if let Some(markets) = &args.markets {
        config.markets = parse_markets(markets)?;
    }
    if let Some(port) = args.port {
        config.api_port = port;
    }

    Ok(config)
}

/// Demo accounts in the shape of the legacy user generator
fn demo_accounts(count: usize) -> Vec<Account> {
    (1..=count)
        .map(|i| Account::new(format!("User{}", i), dec!(1000), dec!(1000)))
        .collect()
}

async fn open_store(config: &EngineConfig, args: &Args) -> Result<Arc<dyn TransactionManager>> {
    match config.store {
        StoreKind::Memory => {
            let store = InMemoryTransactionManager::new();
            if args.demo {
                for account in demo_accounts(args.demo_users) {
                    store.insert_account(account).await;
                }
                info!("Seeded {} demo accounts", args.demo_users);
            } else {
                warn!("In-memory store has no accounts; every settlement will be rejected");
            }
            Ok(Arc::new(store))
        }
        StoreKind::Postgres => {
            let pool = init_db_pool(&config.database_url, config.db_pool_size).await?;
            run_migrations(&pool).await?;

            if args.demo {
                for account in demo_accounts(args.demo_users) {
                    queries::upsert_account(&pool, &account).await?;
                }
                info!("Seeded {} demo accounts", args.demo_users);
            }
            Ok(Arc::new(PgTransactionManager::new(pool)))
        }
    }
}

async fn ingest(router: Arc<OrderRouter>, feed: String) -> Result<FeedStats> {
    if feed == "-" {
        info!("Reading orders from stdin");
        return router.consume(BufReader::new(tokio::io::stdin())).await;
    }

    let file = File::open(&feed).await.map_err(|e| {
        Error::ConfigurationError(format!("cannot open order feed {}: {}", feed, e))
    })?;
    info!("Reading orders from {}", feed);
    router.consume(BufReader::new(file)).await
}

fn report_feed(result: std::result::Result<Result<FeedStats>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(_)) => info!("Order feed finished"),
        Ok(Err(e)) => error!("Order feed failed: {}", e),
        Err(e) => error!("Order feed task ended abnormally: {}", e),
    }
}

fn spawn_snapshots(processor: Arc<OrderProcessor>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = processor.persist_books().await {
                error!("Failed to save order books: {}", e);
            }
        }
    })
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

// PostgreSQL-backed settlement tests
//
// Run with `cargo test --features db_tests`; each test is skipped when
// TEST_DATABASE_URL is not set.
#![cfg(feature = "db_tests")]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use hcn_exchange::common::db::{
    init_db_pool, queries, run_migrations, DbPool, PgTransactionManager, TransactionManager,
};
use hcn_exchange::common::decimal::dec;
use hcn_exchange::common::error::Error;
use hcn_exchange::common::model::account::Account;
use hcn_exchange::common::model::order::{Order, OrderBookEntry, Side};
use hcn_exchange::market_data::{MarketDataChannel, MarketPricePublisher};
use hcn_exchange::matching_engine::MatchingEngine;
use hcn_exchange::settlement_service::{OrderOutcome, OrderProcessor, SettlementCoordinator};
use uuid::Uuid;

async fn test_pool() -> Option<DbPool> {
    let db_url = match env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            println!("Skipping database test: TEST_DATABASE_URL not set");
            return None;
        }
    };

    let pool = match init_db_pool(&db_url, 5).await {
        Ok(pool) => pool,
        Err(err) => {
            println!("Skipping database test: could not connect to database: {}", err);
            return None;
        }
    };
    run_migrations(&pool).await.unwrap();
    Some(pool)
}

/// Fresh ids so tests never see each other's rows
fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..8])
}

struct PgExchange {
    store: Arc<PgTransactionManager>,
    engine: Arc<MatchingEngine>,
    processor: OrderProcessor,
}

fn exchange(pool: DbPool, symbol: &str) -> PgExchange {
    let store = Arc::new(PgTransactionManager::new(pool));
    let shared: Arc<dyn TransactionManager> = store.clone();
    let publisher = Arc::new(MarketPricePublisher::new(
        shared.clone(),
        Arc::new(MarketDataChannel::new()),
    ));
    let engine = Arc::new(MatchingEngine::new());
    engine.register_market(symbol);

    let processor = OrderProcessor::new(
        engine.clone(),
        SettlementCoordinator::new(shared.clone(), publisher.clone(), Duration::from_secs(5)),
        shared,
        publisher,
    );

    PgExchange {
        store,
        engine,
        processor,
    }
}

#[tokio::test]
async fn test_settlement_commits_every_record() {
    let Some(pool) = test_pool().await else { return };
    let symbol = unique("HCN/HDO");
    let (alice, bob) = (unique("alice"), unique("bob"));
    for user in [&alice, &bob] {
        queries::upsert_account(&pool, &Account::new(user.as_str(), dec!(1000), dec!(100)))
            .await
            .unwrap();
    }

    let ex = exchange(pool, &symbol);
    let bid = Order::new(alice.as_str(), symbol.as_str(), Side::Buy, dec!(5), dec!(10));
    let ask = Order::new(bob.as_str(), symbol.as_str(), Side::Sell, dec!(5), dec!(9));

    ex.processor.process(bid.clone()).await.unwrap();
    let outcome = ex.processor.process(ask.clone()).await.unwrap();
    assert!(matches!(outcome, OrderOutcome::Filled { .. }));

    let alice_account = ex.store.get_account(&alice).await.unwrap().unwrap();
    assert_eq!(alice_account.currency_balance, dec!(950));
    assert_eq!(alice_account.asset_balance, dec!(105));
    let bob_account = ex.store.get_account(&bob).await.unwrap().unwrap();
    assert_eq!(bob_account.currency_balance, dec!(1050));
    assert_eq!(bob_account.asset_balance, dec!(95));

    assert!(ex.store.order_settled(ask.id).await.unwrap());
    assert!(ex.store.order_settled(bid.id).await.unwrap());
    assert_eq!(
        ex.store.latest_market_price(&symbol).await.unwrap().map(|p| p.price),
        Some(dec!(10))
    );

    let err = ex.processor.process(ask).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateOrder(_)));
}

#[tokio::test]
async fn test_unknown_account_rolls_back() {
    let Some(pool) = test_pool().await else { return };
    let symbol = unique("HCN/HDO");
    let alice = unique("alice");
    queries::upsert_account(&pool, &Account::new(alice.as_str(), dec!(1000), dec!(100)))
        .await
        .unwrap();

    let ex = exchange(pool, &symbol);
    let ask = Order::new(alice.as_str(), symbol.as_str(), Side::Sell, dec!(3), dec!(20));
    ex.processor.process(ask.clone()).await.unwrap();

    let ghost = Order::new(unique("ghost").as_str(), symbol.as_str(), Side::Buy, dec!(3), dec!(25));
    let err = ex.processor.process(ghost.clone()).await.unwrap_err();
    assert!(matches!(err, Error::AccountNotFound(_)));

    assert!(!ex.store.order_settled(ghost.id).await.unwrap());
    assert!(!ex.store.order_settled(ask.id).await.unwrap());
    assert!(ex.store.latest_market_price(&symbol).await.unwrap().is_none());
    assert_eq!(ex.engine.snapshot(&symbol).unwrap().asks.len(), 1);

    let account = ex.store.get_account(&alice).await.unwrap().unwrap();
    assert_eq!(account.currency_balance, dec!(1000));
    assert_eq!(account.asset_balance, dec!(100));
}

#[tokio::test]
async fn test_order_book_snapshot_round_trip() {
    let Some(pool) = test_pool().await else { return };
    let symbol = unique("HCN/HDO");
    let store = PgTransactionManager::new(pool);

    assert!(store.load_order_book(&symbol).await.unwrap().is_empty());

    let entries = vec![
        OrderBookEntry::new(Order::new("alice", symbol.as_str(), Side::Buy, dec!(1), dec!(10)), 0),
        OrderBookEntry::new(Order::new("bob", symbol.as_str(), Side::Sell, dec!(2), dec!(12)), 1),
    ];
    store.save_order_book(&symbol, &entries).await.unwrap();
    store.save_order_book(&symbol, &entries[1..]).await.unwrap();

    let loaded = store.load_order_book(&symbol).await.unwrap();
    assert_eq!(loaded, entries[1..].to_vec());
}

use std::sync::Arc;

use common::db::{InMemoryTransactionManager, TransactionManager};
use common::decimal::dec;
use common::model::order::{Order, Side};
use common::model::trade::NewTrade;
use market_data::{MarketDataChannel, MarketDataMessage, MarketPricePublisher, Topic};

const MARKET: &str = "HCN/HDO";

fn publisher(store: &InMemoryTransactionManager) -> MarketPricePublisher {
    MarketPricePublisher::new(Arc::new(store.clone()), Arc::new(MarketDataChannel::new()))
}

#[tokio::test]
async fn test_latest_price_is_none_before_any_trade() {
    let store = InMemoryTransactionManager::new();
    let publisher = publisher(&store);

    assert_eq!(publisher.latest_price(MARKET).await.unwrap(), None);
}

#[tokio::test]
async fn test_recorded_price_visible_after_commit() {
    let store = InMemoryTransactionManager::new();
    let publisher = publisher(&store);

    let mut tx = store.begin_transaction().await.unwrap();
    let first = publisher.record(&mut tx, MARKET, dec!(10)).await.unwrap();
    assert_eq!(first.previous_price, None);
    tx.commit().await.unwrap();

    let mut tx = store.begin_transaction().await.unwrap();
    let second = publisher.record(&mut tx, MARKET, dec!(12)).await.unwrap();
    assert_eq!(second.previous_price, Some(dec!(10)));
    tx.commit().await.unwrap();

    assert_eq!(publisher.latest_price(MARKET).await.unwrap(), Some(dec!(12)));
    assert_eq!(store.market_prices(MARKET).await.len(), 2);
}

#[tokio::test]
async fn test_rolled_back_price_is_discarded() {
    let store = InMemoryTransactionManager::new();
    let publisher = publisher(&store);

    let mut tx = store.begin_transaction().await.unwrap();
    publisher.record(&mut tx, MARKET, dec!(10)).await.unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(publisher.latest_price(MARKET).await.unwrap(), None);
}

#[tokio::test]
async fn test_prices_are_kept_per_symbol() {
    let store = InMemoryTransactionManager::new();
    let publisher = publisher(&store);

    let mut tx = store.begin_transaction().await.unwrap();
    publisher.record(&mut tx, MARKET, dec!(10)).await.unwrap();
    publisher.record(&mut tx, "ABC/HDO", dec!(3)).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(publisher.latest_price(MARKET).await.unwrap(), Some(dec!(10)));
    assert_eq!(publisher.latest_price("ABC/HDO").await.unwrap(), Some(dec!(3)));
}

#[tokio::test]
async fn test_publish_reaches_symbol_and_wildcard_subscribers() {
    let store = InMemoryTransactionManager::new();
    let publisher = publisher(&store);
    let channel = publisher.channel();

    let (_, prices) = channel.subscribe(Topic::MarketPrice(MARKET.to_string())).await;
    let (_, all_trades) = channel.subscribe(Topic::AllTrades).await;
    let (_, other_prices) = channel.subscribe(Topic::MarketPrice("ABC/HDO".to_string())).await;

    let maker = Order::new("alice", MARKET, Side::Buy, dec!(5), dec!(10));
    let taker = Order::new("bob", MARKET, Side::Sell, dec!(5), dec!(9));
    let trade = NewTrade::from_match(&taker, &maker).unwrap().with_id(1);

    let mut tx = store.begin_transaction().await.unwrap();
    let market_price = publisher.record(&mut tx, MARKET, trade.price).await.unwrap();
    tx.commit().await.unwrap();
    publisher.publish(&market_price, &trade).await;

    match prices.try_recv().unwrap().as_ref() {
        MarketDataMessage::Price(update) => assert_eq!(update.price, dec!(10)),
        other => panic!("unexpected message: {other:?}"),
    }
    match all_trades.try_recv().unwrap().as_ref() {
        MarketDataMessage::Trade(message) => {
            assert_eq!(message.id, 1);
            assert_eq!(message.taker_side, Side::Sell);
        }
        other => panic!("unexpected message: {other:?}"),
    }
    assert!(other_prices.try_recv().is_err());
}

#[tokio::test]
async fn test_dropped_subscribers_are_pruned() {
    let channel = MarketDataChannel::new();
    let topic = Topic::Trades(MARKET.to_string());

    let (_, receiver) = channel.subscribe(topic.clone()).await;
    let (id, _kept) = channel.subscribe(topic.clone()).await;
    drop(receiver);

    let maker = Order::new("alice", MARKET, Side::Sell, dec!(1), dec!(20));
    let taker = Order::new("bob", MARKET, Side::Buy, dec!(1), dec!(25));
    let trade = NewTrade::from_match(&taker, &maker).unwrap().with_id(9);
    let delivered = channel
        .publish(topic.clone(), MarketDataMessage::Trade((&trade).into()))
        .await;

    assert_eq!(delivered, 1);
    assert_eq!(channel.subscriber_count(&topic).await, 1);
    assert!(channel.unsubscribe(id).await);
    assert_eq!(channel.subscriber_count(&topic).await, 0);
}

#[test]
fn test_messages_serialize_with_type_tag() {
    let maker = Order::new("alice", MARKET, Side::Sell, dec!(1), dec!(20));
    let taker = Order::new("bob", MARKET, Side::Buy, dec!(1), dec!(25));
    let trade = NewTrade::from_match(&taker, &maker).unwrap().with_id(3);

    let json = serde_json::to_value(MarketDataMessage::Trade((&trade).into())).unwrap();
    assert_eq!(json["type"], "Trade");
    assert_eq!(json["data"]["symbol"], MARKET);
    assert_eq!(json["data"]["takerSide"], "Buy");
}

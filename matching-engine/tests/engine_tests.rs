use common::decimal::{dec, Price, Quantity};
use common::error::Error;
use common::model::order::{Order, OrderBookEntry, Side};
use matching_engine::engine::{MatchDecision, MatchingEngine};
use uuid::Uuid;

const MARKET: &str = "HCN/HDO";

fn create_test_order(user_id: &str, side: Side, quantity: Quantity, price: Price) -> Order {
    Order::new(user_id, MARKET, side, quantity, price)
}

fn engine() -> MatchingEngine {
    let engine = MatchingEngine::new();
    engine.register_market(MARKET);
    engine
}

fn rest(engine: &MatchingEngine, order: Order) -> OrderBookEntry {
    match engine.submit(order).unwrap() {
        MatchDecision::Rested(entry) => entry,
        MatchDecision::Matched(_) => panic!("expected the order to rest"),
    }
}

#[test]
fn test_unknown_market_is_rejected() {
    let engine = engine();
    let order = Order::new("alice", "XYZ/HDO", Side::Buy, dec!(1), dec!(10));

    assert!(matches!(engine.submit(order), Err(Error::MarketNotFound(_))));
}

#[test]
fn test_non_crossing_order_rests() {
    let engine = engine();
    rest(&engine, create_test_order("alice", Side::Buy, dec!(5), dec!(10)));
    let ask = rest(&engine, create_test_order("bob", Side::Sell, dec!(5), dec!(11)));

    let snapshot = engine.snapshot(MARKET).unwrap();
    assert_eq!(snapshot.bids.len(), 1);
    assert_eq!(snapshot.asks.len(), 1);
    assert_eq!(snapshot.asks[0].id(), ask.id());
}

#[test]
fn test_sell_matches_best_bid_at_maker_price() {
    let engine = engine();
    let bid = rest(&engine, create_test_order("alice", Side::Buy, dec!(5), dec!(10)));
    let taker = create_test_order("bob", Side::Sell, dec!(5), dec!(9));

    let reservation = match engine.submit(taker.clone()).unwrap() {
        MatchDecision::Matched(reservation) => reservation,
        MatchDecision::Rested(_) => panic!("expected a match"),
    };
    assert_eq!(reservation.maker().id(), bid.id());
    assert_eq!(reservation.maker().price(), dec!(10));
    assert_eq!(reservation.taker().id, taker.id);

    // The taker is never inserted into the book
    assert!(!engine.is_resting(MARKET, taker.id).unwrap());

    reservation.complete();
    let snapshot = engine.snapshot(MARKET).unwrap();
    assert!(snapshot.bids.is_empty());
    assert!(snapshot.asks.is_empty());
}

#[test]
fn test_buy_prefers_lowest_ask_then_earliest() {
    let engine = engine();
    rest(&engine, create_test_order("a", Side::Sell, dec!(1), dec!(21)));
    let first = rest(&engine, create_test_order("b", Side::Sell, dec!(1), dec!(20)));
    rest(&engine, create_test_order("c", Side::Sell, dec!(1), dec!(20)));

    match engine.submit(create_test_order("d", Side::Buy, dec!(3), dec!(25))).unwrap() {
        MatchDecision::Matched(reservation) => assert_eq!(reservation.maker().id(), first.id()),
        MatchDecision::Rested(_) => panic!("expected a match"),
    }
}

#[test]
fn test_reserved_maker_is_invisible_to_other_takers() {
    let engine = engine();
    let first = rest(&engine, create_test_order("alice", Side::Sell, dec!(1), dec!(20)));
    let second = rest(&engine, create_test_order("bob", Side::Sell, dec!(1), dec!(20)));

    let claim = match engine.submit(create_test_order("carol", Side::Buy, dec!(1), dec!(20))).unwrap() {
        MatchDecision::Matched(reservation) => reservation,
        MatchDecision::Rested(_) => panic!("expected a match"),
    };
    assert_eq!(claim.maker().id(), first.id());

    match engine.submit(create_test_order("dave", Side::Buy, dec!(1), dec!(20))).unwrap() {
        MatchDecision::Matched(reservation) => assert_eq!(reservation.maker().id(), second.id()),
        MatchDecision::Rested(_) => panic!("expected the second ask to match"),
    }
}

#[test]
fn test_only_reserved_maker_leaves_taker_resting() {
    let engine = engine();
    rest(&engine, create_test_order("alice", Side::Sell, dec!(1), dec!(20)));

    let _claim = match engine.submit(create_test_order("bob", Side::Buy, dec!(1), dec!(20))).unwrap() {
        MatchDecision::Matched(reservation) => reservation,
        MatchDecision::Rested(_) => panic!("expected a match"),
    };

    let late = create_test_order("carol", Side::Buy, dec!(1), dec!(20));
    rest(&engine, late.clone());
    assert!(engine.is_resting(MARKET, late.id).unwrap());
}

#[test]
fn test_released_maker_keeps_priority() {
    let engine = engine();
    let first = rest(&engine, create_test_order("alice", Side::Buy, dec!(1), dec!(10)));
    rest(&engine, create_test_order("bob", Side::Buy, dec!(1), dec!(10)));

    match engine.submit(create_test_order("carol", Side::Sell, dec!(1), dec!(10))).unwrap() {
        MatchDecision::Matched(reservation) => reservation.release(),
        MatchDecision::Rested(_) => panic!("expected a match"),
    }

    let snapshot = engine.snapshot(MARKET).unwrap();
    assert_eq!(snapshot.bids[0].id(), first.id());
    assert_eq!(snapshot.bids[0].sequence, first.sequence);

    match engine.submit(create_test_order("dave", Side::Sell, dec!(1), dec!(10))).unwrap() {
        MatchDecision::Matched(reservation) => assert_eq!(reservation.maker().id(), first.id()),
        MatchDecision::Rested(_) => panic!("expected a match"),
    }
}

#[test]
fn test_dropped_reservation_releases_maker() {
    let engine = engine();
    let ask = rest(&engine, create_test_order("alice", Side::Sell, dec!(2), dec!(20)));

    {
        let decision = engine
            .submit(create_test_order("bob", Side::Buy, dec!(2), dec!(20)))
            .unwrap();
        assert!(matches!(decision, MatchDecision::Matched(_)));
    }

    match engine.submit(create_test_order("carol", Side::Buy, dec!(2), dec!(20))).unwrap() {
        MatchDecision::Matched(reservation) => assert_eq!(reservation.maker().id(), ask.id()),
        MatchDecision::Rested(_) => panic!("dropped reservation was not released"),
    }
}

#[test]
fn test_full_fill_removes_larger_maker_entirely() {
    let engine = engine();
    rest(&engine, create_test_order("alice", Side::Sell, dec!(10), dec!(20)));

    match engine.submit(create_test_order("bob", Side::Buy, dec!(3), dec!(20))).unwrap() {
        MatchDecision::Matched(reservation) => {
            reservation.complete();
        }
        MatchDecision::Rested(_) => panic!("expected a match"),
    }

    assert!(engine.snapshot(MARKET).unwrap().asks.is_empty());
}

#[test]
fn test_resting_id_submitted_again_is_duplicate() {
    let engine = engine();
    let order = create_test_order("alice", Side::Buy, dec!(1), dec!(10));
    rest(&engine, order.clone());

    assert!(matches!(engine.submit(order), Err(Error::DuplicateOrder(_))));
    assert_eq!(engine.snapshot(MARKET).unwrap().bids.len(), 1);
}

#[test]
fn test_market_depth_aggregates_levels() {
    let engine = engine();
    rest(&engine, create_test_order("a", Side::Buy, dec!(1), dec!(10)));
    rest(&engine, create_test_order("b", Side::Buy, dec!(2), dec!(10)));
    rest(&engine, create_test_order("c", Side::Buy, dec!(4), dec!(9)));
    rest(&engine, create_test_order("d", Side::Sell, dec!(3), dec!(12)));

    let depth = engine.market_depth(MARKET, 1).unwrap();
    assert_eq!(depth.bids, vec![(dec!(10), dec!(3))]);
    assert_eq!(depth.asks, vec![(dec!(12), dec!(3))]);
}

#[test]
fn test_restore_keeps_sequences_and_continues_after_them() {
    let source = engine();
    let first = rest(&source, create_test_order("a", Side::Sell, dec!(1), dec!(20)));
    let second = rest(&source, create_test_order("b", Side::Sell, dec!(1), dec!(20)));
    let entries = source.book_entries(MARKET).unwrap();

    let target = engine();
    assert_eq!(target.restore(MARKET, entries.clone()).unwrap(), 2);
    // Restoring the same entries again adds nothing
    assert_eq!(target.restore(MARKET, entries).unwrap(), 0);

    let later = rest(&target, create_test_order("c", Side::Sell, dec!(1), dec!(20)));
    assert!(later.sequence > second.sequence);

    let asks: Vec<Uuid> = target.snapshot(MARKET).unwrap().asks.iter().map(|e| e.id()).collect();
    assert_eq!(asks, vec![first.id(), second.id(), later.id()]);
}

#[test]
fn test_depth_of_restored_oversized_orders_saturates() {
    let engine = engine();
    let entries = vec![
        OrderBookEntry::new(create_test_order("a", Side::Buy, dec!(50000000000000000000000000000), dec!(10)), 0),
        OrderBookEntry::new(create_test_order("b", Side::Buy, dec!(50000000000000000000000000000), dec!(10)), 1),
    ];
    assert_eq!(engine.restore(MARKET, entries).unwrap(), 2);

    let depth = engine.market_depth(MARKET, 10).unwrap();
    assert_eq!(depth.bids, vec![(dec!(10), Quantity::MAX)]);
}

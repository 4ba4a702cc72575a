//! End-to-end tests for the ingestion/aggregation pipeline, driven the way
//! connectors and subscribers drive it: venue messages decoded into books,
//! notifications into the aggregator queue, snapshots read back by version.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use bookfeed::aggregator::{Aggregator, AggregatorHandle};
use bookfeed::connector::{BackoffPolicy, ConnectionState, ExchangeConnector, StatusBoard};
use bookfeed::orderbook::{BookSnapshot, PriceLevel};
use bookfeed::venue::Venue;

async fn wait_for_version(handle: &AggregatorHandle, at_least: u64) -> Arc<BookSnapshot> {
    for _ in 0..400 {
        if handle.version() >= at_least {
            return handle.snapshot().await.expect("aggregator alive");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("aggregator never reached version {at_least}");
}

#[tokio::test]
async fn venue_messages_flow_into_consolidated_snapshot() {
    let (aggregator, handle) = Aggregator::new("BTCUSDT".to_string(), 150);
    let books = aggregator.books();
    tokio::spawn(aggregator.run());

    books.insert(Venue::Binance, Default::default());
    books.insert(Venue::Bybit, Default::default());

    // Binance depth frame: bids {100: 1.0, 99: 2.0}.
    let binance_msg = r#"{
        "lastUpdateId": 1,
        "bids": [["100", "1.0"], ["99", "2.0"]],
        "asks": []
    }"#;
    let event = Venue::Binance.parse(binance_msg).unwrap();
    books.get_mut(&Venue::Binance).unwrap().apply(&event);
    handle.notify_book_changed(Venue::Binance);
    wait_for_version(&handle, 1).await;

    // Bybit snapshot: bids {100: 1.5, 98: 0.5}.
    let bybit_msg = r#"{
        "topic": "orderbook.50.BTCUSDT",
        "type": "snapshot",
        "data": {"s": "BTCUSDT", "b": [["100", "1.5"], ["98", "0.5"]], "a": []}
    }"#;
    let event = Venue::Bybit.parse(bybit_msg).unwrap();
    books.get_mut(&Venue::Bybit).unwrap().apply(&event);
    handle.notify_book_changed(Venue::Bybit);

    let snapshot = wait_for_version(&handle, 2).await;

    assert_eq!(
        snapshot.bids,
        vec![
            PriceLevel::new(dec!(100), dec!(2.5)),
            PriceLevel::new(dec!(99), dec!(2.0)),
            PriceLevel::new(dec!(98), dec!(0.5)),
        ]
    );
}

#[tokio::test]
async fn snapshot_then_zero_quantity_delta_empties_side() {
    let (aggregator, handle) = Aggregator::new("BTCUSDT".to_string(), 150);
    let books = aggregator.books();
    tokio::spawn(aggregator.run());

    books.insert(Venue::Bybit, Default::default());

    let snapshot_msg = r#"{
        "topic": "orderbook.50.BTCUSDT",
        "type": "snapshot",
        "data": {"s": "BTCUSDT", "b": [["100", "1.0"]], "a": [["101", "1.0"]]}
    }"#;
    let delta_msg = r#"{
        "topic": "orderbook.50.BTCUSDT",
        "type": "delta",
        "data": {"s": "BTCUSDT", "b": [["100", "0"]], "a": []}
    }"#;

    for msg in [snapshot_msg, delta_msg] {
        let event = Venue::Bybit.parse(msg).unwrap();
        books.get_mut(&Venue::Bybit).unwrap().apply(&event);
        handle.notify_book_changed(Venue::Bybit);
    }

    let snapshot = wait_for_version(&handle, 2).await;

    assert!(snapshot.bids.is_empty());
    assert_eq!(snapshot.asks, vec![PriceLevel::new(dec!(101), dec!(1.0))]);
}

#[tokio::test]
async fn late_subscriber_reads_only_the_latest_snapshot() {
    let (aggregator, handle) = Aggregator::new("BTCUSDT".to_string(), 150);
    let books = aggregator.books();
    tokio::spawn(aggregator.run());

    books.insert(Venue::Okx, Default::default());

    // Five consolidation cycles with evolving state, no intervening reads.
    for i in 1..=5u32 {
        let msg = format!(
            r#"{{"arg": {{"channel": "books5"}}, "data": [{{"bids": [["{}", "1.0"]], "asks": []}}]}}"#,
            100 + i
        );
        let event = Venue::Okx.parse(&msg).unwrap();
        books.get_mut(&Venue::Okx).unwrap().apply(&event);
        handle.notify_book_changed(Venue::Okx);
    }

    // A subscriber polling now gets the cycle-5 state, never an intermediate.
    let snapshot = wait_for_version(&handle, 5).await;

    assert_eq!(snapshot.version, 5);
    assert_eq!(snapshot.bids, vec![PriceLevel::new(dec!(105), dec!(1.0))]);
}

#[tokio::test]
async fn discarded_parse_error_leaves_pipeline_running() {
    let (aggregator, handle) = Aggregator::new("BTCUSDT".to_string(), 150);
    let books = aggregator.books();
    tokio::spawn(aggregator.run());

    books.insert(Venue::Binance, Default::default());

    let good = r#"{"lastUpdateId": 1, "bids": [["100", "1.0"]], "asks": []}"#;
    let bad = r#"{"lastUpdateId": 2, "bids": [["not-a-price", "1.0"]], "asks": []}"#;

    let event = Venue::Binance.parse(good).unwrap();
    books.get_mut(&Venue::Binance).unwrap().apply(&event);
    handle.notify_book_changed(Venue::Binance);
    wait_for_version(&handle, 1).await;

    // The bad message is discarded without touching the book.
    assert!(Venue::Binance.parse(bad).is_err());

    let snapshot = wait_for_version(&handle, 1).await;
    assert_eq!(snapshot.bids, vec![PriceLevel::new(dec!(100), dec!(1.0))]);
}

#[tokio::test]
async fn exhausted_connector_stops_and_freezes_its_book() {
    let (aggregator, handle) = Aggregator::new("BTCUSDT".to_string(), 150);
    let books = aggregator.books();
    tokio::spawn(aggregator.run());

    // Seed the venue's last known book before the connection dies for good.
    books.insert(Venue::Okx, Default::default());
    let msg = r#"{"arg": {"channel": "books5"}, "data": [{"bids": [["100", "2.0"]], "asks": []}]}"#;
    let event = Venue::Okx.parse(msg).unwrap();
    books.get_mut(&Venue::Okx).unwrap().apply(&event);
    handle.notify_book_changed(Venue::Okx);
    wait_for_version(&handle, 1).await;

    // Closed port: every attempt fails until the retry budget runs out.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let status: StatusBoard = Arc::new(DashMap::new());
    let policy = BackoffPolicy {
        initial: Duration::from_millis(1),
        max: Duration::from_millis(2),
        multiplier: 2.0,
        max_retries: 3,
    };
    let connector = ExchangeConnector::new(
        Venue::Okx,
        "BTCUSDT".to_string(),
        books.clone(),
        handle.clone(),
        status.clone(),
        policy,
        Duration::from_secs(30),
        Duration::from_secs(1),
    )
    .with_endpoint("127.0.0.1", port);

    // run() returns once the budget is exhausted.
    tokio::time::timeout(Duration::from_secs(10), connector.run())
        .await
        .expect("connector should stop permanently");

    assert_eq!(status.get(&Venue::Okx).unwrap().state, ConnectionState::Stopped);
    assert!(status.get(&Venue::Okx).unwrap().last_error.is_some());

    // The dead venue's last book keeps contributing to later cycles.
    handle.notify_book_changed(Venue::Okx);
    let snapshot = wait_for_version(&handle, 2).await;
    assert_eq!(snapshot.bids, vec![PriceLevel::new(dec!(100), dec!(2.0))]);
}

#[tokio::test]
async fn version_is_strictly_monotonic_across_bursts() {
    let (aggregator, handle) = Aggregator::new("BTCUSDT".to_string(), 150);
    let books = aggregator.books();
    tokio::spawn(aggregator.run());

    books.insert(Venue::Bitget, Default::default());

    let mut last = handle.version();
    for _ in 0..10 {
        handle.notify_book_changed(Venue::Bitget);
        let snapshot = wait_for_version(&handle, last + 1).await;
        assert!(snapshot.version > last);
        last = snapshot.version;
    }

    assert_eq!(last, 10);
}

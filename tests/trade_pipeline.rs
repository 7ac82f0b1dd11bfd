//! S1: a single trade frame parses to the expected publish frame.

use binance_feed_handlers::binance::parse_trade_frame;
use binance_feed_handlers::records::{SequenceCounter, TradeRecord};

#[test]
fn s1_single_trade_published() {
    let mut bytes = br#"{"stream":"btcusdt@trade","data":{"s":"BTCUSDT","t":100,"p":"30000.50","q":"0.1","m":false,"E":1700000000000,"T":1700000000000}}"#.to_vec();
    let raw = parse_trade_frame(&mut bytes).expect("valid trade frame");

    let mut seq = SequenceCounter::new();
    let record = TradeRecord {
        symbol: raw.symbol,
        trade_id: raw.trade_id,
        price: raw.price,
        quantity: raw.qty,
        buyer_is_maker: raw.buyer_is_maker,
        exch_event_time_ms: raw.exch_event_time_ms,
        exch_trade_time_ms: raw.exch_trade_time_ms,
        fh_recv_time_utc_ns: 1_700_000_000_123_456_789,
        fh_parse_us: 3,
        fh_send_us: 1,
        fh_seq_no: seq.next(),
    };

    assert_eq!(record.symbol, "BTCUSDT");
    assert_eq!(record.trade_id, 100);
    assert_eq!(record.price, 30000.50);
    assert_eq!(record.quantity, 0.1);
    assert!(!record.buyer_is_maker);
    assert_eq!(record.fh_seq_no, 1);

    let frame = record.to_publish_frame();
    assert_eq!(frame.update_fn, "upd");
    assert_eq!(frame.table, "trade_binance");
    let row = frame.row.as_array().unwrap();
    assert_eq!(row.len(), 12);
    assert_eq!(row[1], "BTCUSDT");
    assert_eq!(row[2], 100);
}

#[test]
fn property_8_sequence_continuity_across_many_records() {
    let mut seq = SequenceCounter::new();
    let values: Vec<u64> = (0..1000).map(|_| seq.next()).collect();
    for (i, v) in values.iter().enumerate() {
        assert_eq!(*v, i as u64 + 1);
    }
}

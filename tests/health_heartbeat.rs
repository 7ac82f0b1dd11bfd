//! S6: starting a handler and advancing 5s simulated time yields a health
//! record with uptimeSec >= 5 and connState = "connected".

use std::time::{Duration, Instant};

use binance_feed_handlers::health::HealthReporter;
use binance_feed_handlers::records::ConnState;

#[test]
fn s6_health_heartbeat_after_five_seconds() {
    let mut reporter = HealthReporter::new("quote_feed_handler", 0, 3);
    let t0 = Instant::now();
    let t5 = t0 + Duration::from_secs(5);

    assert!(reporter.is_due(t5));
    let record = reporter.build(t5, 5_000_000_000, 42, 40, 4_000_000_000, 3_900_000_000, ConnState::Connected);

    assert!(record.uptime_sec >= 5);
    assert_eq!(record.conn_state, ConnState::Connected);
    assert_eq!(record.symbol_count, 3);

    let frame = record.to_publish_frame();
    assert_eq!(frame.table, "health_feed_handler");
    let row = frame.row.as_array().unwrap();
    assert_eq!(row.len(), 10);
    assert_eq!(row[8], "connected");
}

//! Normalized records produced by the pipeline and the wire shape the
//! publisher sends them in: `(update_fn_name, table_name, row_tuple)`.

use serde_json::{json, Value};

use crate::clock::unix_ns_to_kdb_ns;

/// Connection state reported in health records; matches the fixed vocabulary
/// the downstream sink expects for its `connState` symbol column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnState::Disconnected => "disconnected",
            ConnState::Connecting => "connecting",
            ConnState::Connected => "connected",
            ConnState::Reconnecting => "reconnecting",
        }
    }
}

/// `(update_fn_name, table_name, row_tuple)` — the exact shape the fire-and-forget
/// sink contract sends over the wire.
#[derive(Debug, Clone)]
pub struct PublishFrame {
    pub update_fn: &'static str,
    pub table: &'static str,
    pub row: Value,
}

/// The kdb-q style update function name. Every table publishes through the
/// same function; there's no per-table override surface.
const DEFAULT_UPDATE_FN: &str = "upd";

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub symbol: String,
    pub trade_id: i64,
    pub price: f64,
    pub quantity: f64,
    pub buyer_is_maker: bool,
    pub exch_event_time_ms: i64,
    pub exch_trade_time_ms: i64,
    pub fh_recv_time_utc_ns: u64,
    pub fh_parse_us: i64,
    pub fh_send_us: i64,
    pub fh_seq_no: u64,
}

impl TradeRecord {
    pub fn to_publish_frame(&self) -> PublishFrame {
        let row = json!([
            unix_ns_to_kdb_ns(self.fh_recv_time_utc_ns),
            self.symbol,
            self.trade_id,
            self.price,
            self.quantity,
            self.buyer_is_maker,
            self.exch_event_time_ms,
            self.exch_trade_time_ms,
            self.fh_recv_time_utc_ns as i64,
            self.fh_parse_us,
            self.fh_send_us,
            self.fh_seq_no,
        ]);
        PublishFrame {
            update_fn: DEFAULT_UPDATE_FN,
            table: "trade_binance",
            row,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct L1QuoteRecord {
    pub symbol: String,
    pub bid_price: f64,
    pub bid_qty: f64,
    pub ask_price: f64,
    pub ask_qty: f64,
    pub is_valid: bool,
    pub exch_event_time_ms: i64,
    pub fh_recv_time_utc_ns: u64,
    pub fh_seq_no: u64,
}

impl L1QuoteRecord {
    pub fn to_publish_frame(&self) -> PublishFrame {
        let row = json!([
            unix_ns_to_kdb_ns(self.fh_recv_time_utc_ns),
            self.symbol,
            self.bid_price,
            self.bid_qty,
            self.ask_price,
            self.ask_qty,
            self.is_valid,
            self.exch_event_time_ms,
            self.fh_recv_time_utc_ns as i64,
            self.fh_seq_no,
        ]);
        PublishFrame {
            update_fn: DEFAULT_UPDATE_FN,
            table: "quote_binance",
            row,
        }
    }

    /// The "invalid" marker published exactly once per INVALID transition:
    /// zeroed prices/quantities and `isValid=false`.
    pub fn invalid(symbol: &str, exch_event_time_ms: i64, fh_recv_time_utc_ns: u64, fh_seq_no: u64) -> Self {
        Self {
            symbol: symbol.to_string(),
            bid_price: 0.0,
            bid_qty: 0.0,
            ask_price: 0.0,
            ask_qty: 0.0,
            is_valid: false,
            exch_event_time_ms,
            fh_recv_time_utc_ns,
            fh_seq_no,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthRecord {
    pub now_utc_ns: u64,
    pub handler_name: String,
    pub start_utc_ns: u64,
    pub uptime_sec: i64,
    pub msgs_received: i64,
    pub msgs_published: i64,
    pub last_msg_utc_ns: u64,
    pub last_pub_utc_ns: u64,
    pub conn_state: ConnState,
    pub symbol_count: i32,
}

impl HealthRecord {
    pub fn to_publish_frame(&self) -> PublishFrame {
        let row = json!([
            unix_ns_to_kdb_ns(self.now_utc_ns),
            self.handler_name,
            unix_ns_to_kdb_ns(self.start_utc_ns),
            self.uptime_sec,
            self.msgs_received,
            self.msgs_published,
            unix_ns_to_kdb_ns(self.last_msg_utc_ns),
            unix_ns_to_kdb_ns(self.last_pub_utc_ns),
            self.conn_state.as_str(),
            self.symbol_count,
        ]);
        PublishFrame {
            update_fn: DEFAULT_UPDATE_FN,
            table: "health_feed_handler",
            row,
        }
    }
}

/// Per-handler `fhSeqNo` allocator: starts at 1, increments by one for every
/// published record (property 8 — no gaps, no resets mid-run).
#[derive(Debug, Default)]
pub struct SequenceCounter(u64);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_row_has_twelve_fields() {
        let rec = TradeRecord {
            symbol: "BTCUSDT".into(),
            trade_id: 100,
            price: 30000.50,
            quantity: 0.1,
            buyer_is_maker: false,
            exch_event_time_ms: 1_700_000_000_000,
            exch_trade_time_ms: 1_700_000_000_000,
            fh_recv_time_utc_ns: 1_700_000_000_000_000_000,
            fh_parse_us: 5,
            fh_send_us: 2,
            fh_seq_no: 1,
        };
        let frame = rec.to_publish_frame();
        assert_eq!(frame.table, "trade_binance");
        assert_eq!(frame.row.as_array().unwrap().len(), 12);
    }

    #[test]
    fn quote_row_has_ten_fields() {
        let rec = L1QuoteRecord {
            symbol: "BTCUSDT".into(),
            bid_price: 30000.0,
            bid_qty: 1.0,
            ask_price: 30001.0,
            ask_qty: 2.0,
            is_valid: true,
            exch_event_time_ms: 1,
            fh_recv_time_utc_ns: 1_700_000_000_000_000_000,
            fh_seq_no: 1,
        };
        assert_eq!(rec.to_publish_frame().row.as_array().unwrap().len(), 10);
    }

    #[test]
    fn invalid_marker_is_zeroed() {
        let rec = L1QuoteRecord::invalid("BTCUSDT", 1, 1, 1);
        assert!(!rec.is_valid);
        assert_eq!(rec.bid_price, 0.0);
        assert_eq!(rec.ask_price, 0.0);
    }

    #[test]
    fn sequence_counter_starts_at_one_and_has_no_gaps() {
        let mut seq = SequenceCounter::new();
        let values: Vec<u64> = (0..5).map(|_| seq.next()).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
    }
}

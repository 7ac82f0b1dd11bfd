//! Wire-frame parsing for Binance's combined-stream WebSocket payloads
//! (§6.1). Each handler subscribes to exactly one stream kind, so unlike a
//! feed that demultiplexes several event types per socket, parsing here is
//! a single deserialize-or-reject step per frame.

use serde::Deserialize;

use crate::book::BufferedDelta;
use crate::error::{Error, Result};

#[derive(Deserialize)]
struct CombinedStreamEvent<T> {
    #[allow(dead_code)]
    stream: String,
    data: T,
}

#[derive(Deserialize)]
struct WireTrade {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "t")]
    trade_id: i64,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    qty: String,
    #[serde(rename = "m")]
    buyer_is_maker: bool,
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "T")]
    trade_time: i64,
}

#[derive(Deserialize)]
struct WireDepth {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "U")]
    first_update_id: u64,
    #[serde(rename = "u")]
    final_update_id: u64,
    #[serde(rename = "b")]
    bids: Vec<(String, String)>,
    #[serde(rename = "a")]
    asks: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawTrade {
    pub symbol: String,
    pub trade_id: i64,
    pub price: f64,
    pub qty: f64,
    pub buyer_is_maker: bool,
    pub exch_event_time_ms: i64,
    pub exch_trade_time_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDepth {
    pub symbol: String,
    pub exch_event_time_ms: i64,
    pub first_update_id: u64,
    pub final_update_id: u64,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl RawDepth {
    pub fn into_buffered_delta(self) -> BufferedDelta {
        BufferedDelta {
            first_update_id: self.first_update_id,
            final_update_id: self.final_update_id,
            exch_event_time_ms: self.exch_event_time_ms,
            bids: self.bids,
            asks: self.asks,
        }
    }
}

fn parse_decimal(value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| Error::Transient(format!("non-numeric decimal field: {value:?}")))
}

fn parse_decimal_pairs(pairs: &[(String, String)]) -> Result<Vec<(f64, f64)>> {
    pairs
        .iter()
        .map(|(p, q)| Ok((parse_decimal(p)?, parse_decimal(q)?)))
        .collect()
}

/// Parses a trade frame. `bytes` is mutated in place by `simd-json`.
pub fn parse_trade_frame(bytes: &mut [u8]) -> Result<RawTrade> {
    let wrapper: CombinedStreamEvent<WireTrade> = simd_json::from_slice(bytes)
        .map_err(|e| Error::Transient(format!("malformed trade frame: {e}")))?;
    let data = wrapper.data;
    Ok(RawTrade {
        symbol: data.symbol.to_ascii_uppercase(),
        trade_id: data.trade_id,
        price: parse_decimal(&data.price)?,
        qty: parse_decimal(&data.qty)?,
        buyer_is_maker: data.buyer_is_maker,
        exch_event_time_ms: data.event_time,
        exch_trade_time_ms: data.trade_time,
    })
}

/// Parses a depth frame. Missing `U`/`u` fields fail to deserialize and are
/// surfaced as `Transient`, matching the "missing U/u -> drop frame" rule
/// (§4.3.1).
pub fn parse_depth_frame(bytes: &mut [u8]) -> Result<RawDepth> {
    let wrapper: CombinedStreamEvent<WireDepth> = simd_json::from_slice(bytes)
        .map_err(|e| Error::Transient(format!("malformed depth frame: {e}")))?;
    let data = wrapper.data;
    Ok(RawDepth {
        symbol: data.symbol.to_ascii_uppercase(),
        exch_event_time_ms: data.event_time,
        first_update_id: data.first_update_id,
        final_update_id: data.final_update_id,
        bids: parse_decimal_pairs(&data.bids)?,
        asks: parse_decimal_pairs(&data.asks)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_parses_single_trade() {
        let mut bytes = br#"{"stream":"btcusdt@trade","data":{"s":"BTCUSDT","t":100,"p":"30000.50","q":"0.1","m":false,"E":1700000000000,"T":1700000000000}}"#.to_vec();
        let trade = parse_trade_frame(&mut bytes).unwrap();
        assert_eq!(trade.symbol, "BTCUSDT");
        assert_eq!(trade.trade_id, 100);
        assert_eq!(trade.price, 30000.50);
        assert_eq!(trade.qty, 0.1);
        assert!(!trade.buyer_is_maker);
    }

    #[test]
    fn parses_depth_delta() {
        let mut bytes = br#"{"stream":"btcusdt@depth","data":{"s":"BTCUSDT","E":1,"U":10,"u":12,"b":[["30000","1"]],"a":[["30001","2"]]}}"#.to_vec();
        let depth = parse_depth_frame(&mut bytes).unwrap();
        assert_eq!(depth.first_update_id, 10);
        assert_eq!(depth.final_update_id, 12);
        assert_eq!(depth.bids, vec![(30000.0, 1.0)]);
    }

    #[test]
    fn missing_update_ids_are_transient() {
        let mut bytes =
            br#"{"stream":"btcusdt@depth","data":{"s":"BTCUSDT","E":1,"b":[],"a":[]}}"#.to_vec();
        assert!(parse_depth_frame(&mut bytes).is_err());
    }

    #[test]
    fn non_numeric_decimal_is_transient() {
        let mut bytes = br#"{"stream":"btcusdt@trade","data":{"s":"BTCUSDT","t":1,"p":"abc","q":"1","m":false,"E":1,"T":1}}"#.to_vec();
        assert!(parse_trade_frame(&mut bytes).is_err());
    }
}

//! Trade feed handler binary: WebSocket trade events → parse/instrument →
//! publish, tick-by-tick with no batching (§4.2).

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use tokio_tungstenite::tungstenite::Message;

use binance_feed_handlers::binance;
use binance_feed_handlers::clock::{QuantaWallClock, WallClock};
use binance_feed_handlers::config::Config;
use binance_feed_handlers::connection::ConnectionManager;
use binance_feed_handlers::error::Error;
use binance_feed_handlers::health::HealthReporter;
use binance_feed_handlers::publisher::Publisher;
use binance_feed_handlers::records::{ConnState, SequenceCounter, TradeRecord};
use binance_feed_handlers::shutdown;
use binance_feed_handlers::symbol::SymbolTable;
use binance_feed_handlers::trade::{TradeContinuity, TradeIdTracker};

#[derive(Parser, Debug)]
#[command(author, version, about = "Binance trade feed handler")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(default_value = "config.json")]
    config: PathBuf,
}

fn init_logging(config: &Config) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_level_filter());
    if !config.logging.file.is_empty() {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.file)
        {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("cannot open log file {}: {e}, logging to stderr", config.logging.file);
            }
        }
    }
    builder.init();
}

fn log_continuity(symbol: &str, trade_id: i64, continuity: TradeContinuity) {
    match continuity {
        TradeContinuity::InOrder => {}
        TradeContinuity::OutOfOrder => warn!("OUT_OF_ORDER {symbol} tradeId={trade_id}"),
        TradeContinuity::Duplicate => warn!("DUPLICATE {symbol} tradeId={trade_id}"),
        TradeContinuity::Gap { missed } => {
            warn!("GAP {symbol} tradeId={trade_id} missed={missed}")
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };
    init_logging(&config);

    let symbols = SymbolTable::new(&config.symbols);
    if symbols.is_empty() {
        error!("no symbols configured");
        std::process::exit(1);
    }

    let running = shutdown::new_running_flag();
    shutdown::install(running.clone());

    let conn_mgr = ConnectionManager::new(
        config.reconnect.clone(),
        config.tickerplant.host.clone(),
        config.tickerplant.port,
        running.clone(),
    );

    let clock = QuantaWallClock::default();
    let mut tracker = TradeIdTracker::new(symbols.len());
    let mut publisher = Publisher::new();
    let mut seq = SequenceCounter::new();
    let mut health = HealthReporter::new("trade_feed_handler", clock.now_ns(), symbols.len() as i32);
    let mut msgs_received: i64 = 0;
    let mut last_msg_utc_ns: u64 = 0;
    let mut conn_state = ConnState::Connecting;

    let streams: Vec<String> = (0..symbols.len()).map(|i| symbols.stream_name(i, "trade")).collect();

    info!("starting trade feed handler for {} symbols", symbols.len());

    'outer: while running.load(Ordering::Relaxed) {
        let mut ws = match conn_mgr.connect_ws(&streams).await {
            Ok(ws) => ws,
            Err(Error::ShutdownRequested) => break,
            Err(e) => {
                error!("unexpected connect error: {e}");
                break;
            }
        };
        conn_state = ConnState::Connected;
        let mut tick = tokio::time::interval(Duration::from_millis(100));

        loop {
            if !running.load(Ordering::Relaxed) {
                break 'outer;
            }
            tokio::select! {
                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let t0 = Instant::now();
                            let wall_recv_ns = clock.now_ns();
                            msgs_received += 1;
                            last_msg_utc_ns = wall_recv_ns;

                            let mut bytes = text.into_bytes();
                            let raw = match binance::parse_trade_frame(&mut bytes) {
                                Ok(raw) => raw,
                                Err(e) => {
                                    warn!("{e}");
                                    continue;
                                }
                            };
                            let Some(idx) = symbols.index_of(&raw.symbol) else {
                                continue; // unknown symbol: dropped silently (§9 open question)
                            };

                            let fh_parse_us = t0.elapsed().as_micros() as i64;
                            let continuity = tracker.check_and_update(idx, raw.trade_id);
                            log_continuity(&raw.symbol, raw.trade_id, continuity);

                            let fh_seq_no = seq.next();
                            // Measured at the instant the payload is handed to the
                            // publisher, not at sink acknowledgment (§9 open question).
                            let fh_send_us = t0.elapsed().as_micros() as i64 - fh_parse_us;
                            let record = TradeRecord {
                                symbol: raw.symbol,
                                trade_id: raw.trade_id,
                                price: raw.price,
                                quantity: raw.qty,
                                buyer_is_maker: raw.buyer_is_maker,
                                exch_event_time_ms: raw.exch_event_time_ms,
                                exch_trade_time_ms: raw.exch_trade_time_ms,
                                fh_recv_time_utc_ns: wall_recv_ns,
                                fh_parse_us,
                                fh_send_us,
                                fh_seq_no,
                            };
                            let frame = record.to_publish_frame();
                            if let Err(e) = publisher.publish(&frame, &conn_mgr, wall_recv_ns).await {
                                warn!("publish failed for {}: {e}", record.symbol);
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("websocket error: {e}");
                            break;
                        }
                        None => {
                            warn!("websocket stream ended");
                            break;
                        }
                    }
                }
                _ = tick.tick() => {
                    let now = Instant::now();
                    if health.is_due(now) {
                        let record = health.build(
                            now,
                            clock.now_ns(),
                            msgs_received,
                            publisher.msgs_published() as i64,
                            last_msg_utc_ns,
                            publisher.last_pub_utc_ns(),
                            conn_state,
                        );
                        let now_ns = clock.now_ns();
                        if let Err(e) = publisher.publish(&record.to_publish_frame(), &conn_mgr, now_ns).await {
                            warn!("health publish failed: {e}");
                        }
                    }
                }
            }
        }
        conn_state = ConnState::Reconnecting;
    }

    publisher.close().await;
    info!("trade feed handler shut down");
}

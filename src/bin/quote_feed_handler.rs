//! Quote feed handler binary: WebSocket depth deltas → order-book engine →
//! L1 publication, with REST snapshot reconciliation and a 5s health
//! heartbeat (§4.3).

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use binance_feed_handlers::binance;
use binance_feed_handlers::book::{DepthSnapshot, OrderBookEngine, SnapshotOutcome};
use binance_feed_handlers::clock::{QuantaWallClock, WallClock};
use binance_feed_handlers::config::Config;
use binance_feed_handlers::connection::ConnectionManager;
use binance_feed_handlers::error::Error;
use binance_feed_handlers::health::HealthReporter;
use binance_feed_handlers::publisher::Publisher;
use binance_feed_handlers::records::{ConnState, L1QuoteRecord, SequenceCounter};
use binance_feed_handlers::shutdown;
use binance_feed_handlers::symbol::SymbolTable;

/// REST snapshot depth parameter: must be >= 10*D (§4.3.4).
const SNAPSHOT_LIMIT: u32 = 50;

#[derive(Parser, Debug)]
#[command(author, version, about = "Binance quote feed handler")]
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

/// All per-run mutable pipeline state, bundled so the select-loop helpers
/// below don't grow unwieldy argument lists.
struct Pipeline {
    symbols: SymbolTable,
    engine: OrderBookEngine,
    publisher: Publisher,
    seq: SequenceCounter,
    clock: QuantaWallClock,
    last_exch_event_ms: Vec<i64>,
    msgs_received: i64,
}

impl Pipeline {
    fn new(symbols: SymbolTable) -> Self {
        let count = symbols.len();
        Self {
            engine: OrderBookEngine::new(count),
            publisher: Publisher::new(),
            seq: SequenceCounter::new(),
            clock: QuantaWallClock::default(),
            last_exch_event_ms: vec![0; count],
            symbols,
            msgs_received: 0,
        }
    }

    /// Evaluates the publication policy for `idx` and sends if warranted
    /// (§4.3.5).
    async fn maybe_publish(&mut self, idx: usize, conn_mgr: &ConnectionManager) {
        let now = Instant::now();
        let candidate = self.engine.book(idx).candidate();
        if !self.engine.book(idx).should_publish(&candidate, now) {
            return;
        }
        let wall_recv_ns = self.clock.now_ns();
        let record = L1QuoteRecord {
            symbol: self.symbols.name(idx).to_string(),
            bid_price: candidate.bid_price,
            bid_qty: candidate.bid_qty,
            ask_price: candidate.ask_price,
            ask_qty: candidate.ask_qty,
            is_valid: candidate.is_valid,
            exch_event_time_ms: self.last_exch_event_ms[idx],
            fh_recv_time_utc_ns: wall_recv_ns,
            fh_seq_no: self.seq.next(),
        };
        let frame = record.to_publish_frame();
        if let Err(e) = self.publisher.publish(&frame, conn_mgr, wall_recv_ns).await {
            warn!("publish failed for {}: {e}", record.symbol);
        }
        self.engine.book_mut(idx).record_publish(candidate, now);
    }

    /// Publishes the one-shot invalid marker unconditionally (§4.3.5,
    /// property 5), bypassing the change-detection check.
    async fn publish_invalid(&mut self, idx: usize, conn_mgr: &ConnectionManager) {
        let now = Instant::now();
        let wall_recv_ns = self.clock.now_ns();
        let invalid = binance_feed_handlers::book::SymbolBook::invalid_candidate();
        let record = L1QuoteRecord::invalid(
            self.symbols.name(idx),
            self.last_exch_event_ms[idx],
            wall_recv_ns,
            self.seq.next(),
        );
        let frame = record.to_publish_frame();
        if let Err(e) = self.publisher.publish(&frame, conn_mgr, wall_recv_ns).await {
            warn!("publish failed for invalid marker on {}: {e}", record.symbol);
        }
        self.engine.book_mut(idx).record_publish(invalid, now);
    }

    fn request_snapshot(&self, idx: usize, conn_mgr: &ConnectionManager, tx: &mpsc::Sender<(usize, Result<DepthSnapshot, Error>)>) {
        let symbol = self.symbols.name(idx).to_string();
        let host = conn_mgr.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = host.fetch_snapshot(&symbol, SNAPSHOT_LIMIT).await;
            let _ = tx.send((idx, result)).await;
        });
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

    let mut pipeline = Pipeline::new(symbols);
    let mut health = HealthReporter::new(
        "quote_feed_handler",
        pipeline.clock.now_ns(),
        pipeline.symbols.len() as i32,
    );
    let mut last_msg_utc_ns: u64 = 0;
    let mut conn_state = ConnState::Connecting;

    let streams: Vec<String> = (0..pipeline.symbols.len())
        .map(|i| pipeline.symbols.stream_name(i, "depth"))
        .collect();

    info!("starting quote feed handler for {} symbols", pipeline.symbols.len());

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
        pipeline.engine.reset_all();

        let (snap_tx, mut snap_rx) = mpsc::channel::<(usize, Result<DepthSnapshot, Error>)>(64);
        let mut tick = tokio::time::interval(Duration::from_millis(25));

        loop {
            if !running.load(Ordering::Relaxed) {
                break 'outer;
            }
            tokio::select! {
                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            pipeline.msgs_received += 1;
                            let wall_recv_ns = pipeline.clock.now_ns();
                            last_msg_utc_ns = wall_recv_ns;
                            let mut bytes = text.into_bytes();
                            match binance::parse_depth_frame(&mut bytes) {
                                Ok(raw) => {
                                    if let Some(idx) = pipeline.symbols.index_of(&raw.symbol) {
                                        pipeline.last_exch_event_ms[idx] = raw.exch_event_time_ms;
                                        let outcome = pipeline
                                            .engine
                                            .book_mut(idx)
                                            .on_delta(raw.into_buffered_delta());
                                        use binance_feed_handlers::book::DeltaOutcome::*;
                                        match outcome {
                                            SnapshotNeeded => pipeline.request_snapshot(idx, &conn_mgr, &snap_tx),
                                            Buffered => {}
                                            Applied => pipeline.maybe_publish(idx, &conn_mgr).await,
                                            Invalidated => pipeline.publish_invalid(idx, &conn_mgr).await,
                                        }
                                    }
                                }
                                Err(e) => warn!("{e}"),
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
                Some((idx, result)) = snap_rx.recv() => {
                    match result {
                        Ok(snapshot) => {
                            let outcome = pipeline.engine.book_mut(idx).on_snapshot(snapshot);
                            if outcome == SnapshotOutcome::Invalidated {
                                pipeline.publish_invalid(idx, &conn_mgr).await;
                            } else {
                                pipeline.maybe_publish(idx, &conn_mgr).await;
                            }
                        }
                        Err(e) => {
                            warn!("snapshot fetch failed: {e}");
                            pipeline.engine.book_mut(idx).snapshot_fetch_failed();
                        }
                    }
                }
                _ = tick.tick() => {
                    let now = Instant::now();
                    let due: Vec<usize> = pipeline.engine.heartbeat_due(now).collect();
                    for idx in due {
                        pipeline.maybe_publish(idx, &conn_mgr).await;
                    }
                    if health.is_due(now) {
                        let record = health.build(
                            now,
                            pipeline.clock.now_ns(),
                            pipeline.msgs_received,
                            pipeline.publisher.msgs_published() as i64,
                            last_msg_utc_ns,
                            pipeline.publisher.last_pub_utc_ns(),
                            conn_state,
                        );
                        let now_ns = pipeline.clock.now_ns();
                        if let Err(e) = pipeline.publisher.publish(&record.to_publish_frame(), &conn_mgr, now_ns).await {
                            warn!("health publish failed: {e}");
                        }
                    }
                }
            }
        }
        conn_state = ConnState::Reconnecting;
    }

    pipeline.publisher.close().await;
    info!("quote feed handler shut down");
}

//! Connection-lifecycle supervisor: the market WebSocket, the downstream
//! sink, and the REST snapshot client, with exponential reconnection that
//! stays shutdown-responsive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::book::DepthSnapshot;
use crate::config::ReconnectConfig;
use crate::error::{Error, Result};
use crate::sink::SinkConnection;

const BINANCE_WS_BASE: &str = "wss://stream.binance.com:9443";
const BINANCE_REST_BASE: &str = "https://api.binance.com";

/// Upper bound on a single cooperative sleep slice, so a shutdown request is
/// observed within 100 ms regardless of how long the computed backoff is.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Exponential backoff with a shutdown-aware, slice-interruptible sleep.
pub struct Backoff {
    initial_ms: u64,
    max_ms: u64,
    multiplier: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial_ms: config.initial_backoff_ms,
            max_ms: config.max_backoff_ms,
            multiplier: config.multiplier,
            attempt: 0,
        }
    }

    fn delay(&self) -> Duration {
        let scaled = self.initial_ms as f64 * self.multiplier.powi(self.attempt as i32);
        let capped = scaled.min(self.max_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Sleeps the current backoff delay in ≤100 ms slices, returning early
    /// with `ShutdownRequested` if `running` flips to false. Bumps the
    /// attempt counter for the next call.
    pub async fn wait(&mut self, running: &Arc<AtomicBool>) -> Result<()> {
        let mut remaining = self.delay();
        self.attempt = self.attempt.saturating_add(1);
        while remaining > Duration::ZERO {
            if !running.load(Ordering::Relaxed) {
                return Err(Error::ShutdownRequested);
            }
            let slice = remaining.min(SLEEP_SLICE);
            sleep(slice).await;
            remaining -= slice;
        }
        if !running.load(Ordering::Relaxed) {
            return Err(Error::ShutdownRequested);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ConnectionManager {
    reconnect: ReconnectConfig,
    sink_host: String,
    sink_port: u16,
    http: reqwest::Client,
    running: Arc<AtomicBool>,
}

impl ConnectionManager {
    pub fn new(
        reconnect: ReconnectConfig,
        sink_host: String,
        sink_port: u16,
        running: Arc<AtomicBool>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build REST client");
        Self {
            reconnect,
            sink_host,
            sink_port,
            http,
            running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Blocks until a sink connection is established, or returns
    /// `ShutdownRequested` if shutdown is signaled mid-wait (§4.1).
    pub async fn connect_sink(&self) -> Result<SinkConnection> {
        let mut backoff = Backoff::new(&self.reconnect);
        loop {
            if !self.is_running() {
                return Err(Error::ShutdownRequested);
            }
            match SinkConnection::connect(&self.sink_host, self.sink_port).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    warn!("sink connect failed: {e}, backing off");
                    backoff.wait(&self.running).await?;
                }
            }
        }
    }

    /// Connects the combined-stream WebSocket for the given stream names,
    /// retrying with backoff until success or shutdown.
    pub async fn connect_ws(&self, streams: &[String]) -> Result<WsStream> {
        let query = format!("streams={}", streams.join("/"));
        let url = Url::parse(&format!("{BINANCE_WS_BASE}/stream?{query}"))
            .map_err(|e| Error::Fatal(format!("invalid stream URL: {e}")))?;

        let mut backoff = Backoff::new(&self.reconnect);
        loop {
            if !self.is_running() {
                return Err(Error::ShutdownRequested);
            }
            match connect_async(url.clone()).await {
                Ok((stream, _)) => {
                    info!("WebSocket connected ({} streams)", streams.len());
                    return Ok(stream);
                }
                Err(e) => {
                    warn!("WebSocket connect failed: {e}, backing off");
                    backoff.wait(&self.running).await?;
                }
            }
        }
    }

    /// Fetches a depth snapshot for `symbol` with `limit` levels (§4.3.4).
    /// A single attempt; the caller re-requests on the next delta per the
    /// INIT-state retry policy.
    pub async fn fetch_snapshot(&self, symbol: &str, limit: u32) -> Result<DepthSnapshot> {
        let url = format!("{BINANCE_REST_BASE}/api/v3/depth?symbol={symbol}&limit={limit}");
        let resp = self.http.get(&url).send().await?;
        let resp = resp
            .error_for_status()
            .map_err(|e| Error::Transient(format!("snapshot request for {symbol}: {e}")))?;
        let raw: RawSnapshot = resp.json().await?;
        Ok(DepthSnapshot {
            last_update_id: raw.last_update_id,
            bids: parse_levels(&raw.bids),
            asks: parse_levels(&raw.asks),
        })
    }
}

#[derive(serde::Deserialize)]
struct RawSnapshot {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
}

fn parse_levels(levels: &[(String, String)]) -> Vec<(f64, f64)> {
    levels
        .iter()
        .filter_map(|(p, q)| Some((p.parse().ok()?, q.parse().ok()?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ReconnectConfig {
        ReconnectConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 800,
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let b = Backoff::new(&cfg());
        assert_eq!(b.delay(), Duration::from_millis(100));
        let mut b2 = Backoff::new(&cfg());
        b2.attempt = 1;
        assert_eq!(b2.delay(), Duration::from_millis(200));
        b2.attempt = 10;
        assert_eq!(b2.delay(), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn wait_returns_shutdown_requested_promptly() {
        let running = Arc::new(AtomicBool::new(true));
        let mut backoff = Backoff::new(&ReconnectConfig {
            initial_backoff_ms: 10_000,
            max_backoff_ms: 10_000,
            multiplier: 1.0,
        });
        let running2 = running.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            running2.store(false, Ordering::Relaxed);
        });
        let result = backoff.wait(&running).await;
        assert!(matches!(result, Err(Error::ShutdownRequested)));
    }
}

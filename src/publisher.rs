//! Serializes records into the sink's fire-and-forget wire contract and
//! tracks the counters the health reporter surfaces (§4.4).

use log::warn;

use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::records::PublishFrame;
use crate::sink::SinkConnection;

pub struct Publisher {
    conn: Option<SinkConnection>,
    msgs_published: u64,
    last_pub_utc_ns: u64,
}

impl Publisher {
    pub fn new() -> Self {
        Self {
            conn: None,
            msgs_published: 0,
            last_pub_utc_ns: 0,
        }
    }

    pub fn msgs_published(&self) -> u64 {
        self.msgs_published
    }

    pub fn last_pub_utc_ns(&self) -> u64 {
        self.last_pub_utc_ns
    }

    async fn ensure_connected(&mut self, conn_mgr: &ConnectionManager) -> Result<()> {
        if self.conn.is_none() {
            self.conn = Some(conn_mgr.connect_sink().await?);
        }
        Ok(())
    }

    /// Sends `frame`. On a broken channel, reconnects once and retransmits
    /// the same frame; a second failure is logged and dropped (§4.1/§4.4).
    pub async fn publish(
        &mut self,
        frame: &PublishFrame,
        conn_mgr: &ConnectionManager,
        now_ns: u64,
    ) -> Result<()> {
        self.ensure_connected(conn_mgr).await?;

        if self.conn.as_mut().unwrap().send(frame).await.is_ok() {
            self.msgs_published += 1;
            self.last_pub_utc_ns = now_ns;
            return Ok(());
        }

        warn!(
            "sink channel broken publishing to {}, reconnecting for one retransmit",
            frame.table
        );
        self.conn = None;
        let mut conn = conn_mgr.connect_sink().await?;
        match conn.send(frame).await {
            Ok(()) => {
                self.msgs_published += 1;
                self.last_pub_utc_ns = now_ns;
                self.conn = Some(conn);
            }
            Err(e) => {
                warn!("retransmit to {} failed, dropping frame: {e}", frame.table);
                self.conn = Some(conn);
            }
        }
        Ok(())
    }

    pub async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close().await;
        }
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

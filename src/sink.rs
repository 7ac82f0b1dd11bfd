//! The downstream sink connection: a plain TCP request channel carrying
//! `(update_fn_name, table_name, row_tuple)` frames, fire-and-forget.
//!
//! No crate in this corpus speaks the vendor's real wire protocol, so this
//! defines the smallest framing that can carry the publication contract
//! without fabricating a dependency: a 4-byte big-endian length prefix
//! followed by a `serde_json`-encoded `(name, table, row)` array. The
//! contract itself (table/row shapes, fire-and-forget semantics) is exactly
//! what §6.2 specifies; the framing is this handler's own implementation
//! detail.

use log::warn;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::records::PublishFrame;

pub struct SinkConnection {
    stream: TcpStream,
}

impl SinkConnection {
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true).ok();
        Ok(Self { stream })
    }

    /// Sends one publish frame. Any I/O failure is reported as
    /// `ConnectionLost` so the caller can reconnect and retransmit once,
    /// per §4.1/§4.4's fire-and-forget failure semantics.
    pub async fn send(&mut self, frame: &PublishFrame) -> Result<()> {
        let payload = json!([frame.update_fn, frame.table, frame.row]);
        let bytes = serde_json::to_vec(&payload)?;
        let len = u32::try_from(bytes.len())
            .map_err(|_| Error::Transient("publish frame exceeds 4 GiB".into()))?;
        self.stream
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|e| Error::ConnectionLost(e.to_string()))?;
        self.stream
            .write_all(&bytes)
            .await
            .map_err(|e| Error::ConnectionLost(e.to_string()))?;
        Ok(())
    }

    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            warn!("error closing sink connection: {e}");
        }
    }
}

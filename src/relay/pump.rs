//! Relay pump
//!
//! One pump moves bytes in one direction of a connection pair. Reading and
//! writing run as two halves joined by a one-slot channel, so the next read
//! is already in flight while the previous buffer is still being written.
//! Every read goes into its own pooled buffer; the buffer travels to the
//! writer and is released once its bytes are on the wire.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::trace;

use super::PairId;
use crate::error::{Direction, TransferError};
use crate::pool::{BufferPool, PooledBuffer};

/// Drives one direction of one connection pair
#[derive(Debug, Clone)]
pub struct Pump {
    pair: PairId,
    direction: Direction,
    pool: BufferPool,
    forwarded: Arc<AtomicU64>,
}

impl Pump {
    /// Create a pump for `direction` of `pair`
    pub fn new(pair: PairId, direction: Direction, pool: BufferPool) -> Self {
        Pump {
            pair,
            direction,
            pool,
            forwarded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Direction this pump moves bytes in
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Bytes written to the destination so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Copy from `src` to `dst` until `src` reaches EOF or either side fails
    ///
    /// On EOF, buffers already read are written out before returning. On
    /// failure the buffer involved is abandoned and the error is returned;
    /// anything still queued goes back to the pool.
    pub async fn run<R, W>(&self, src: &mut R, dst: &mut W) -> Result<u64, TransferError>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let (tx, rx) = mpsc::channel(1);

        let reader = self.read_half(src, tx);
        let writer = self.write_half(dst, rx);
        tokio::try_join!(reader, writer)?;

        Ok(self.forwarded())
    }

    async fn read_half<R>(
        &self,
        src: &mut R,
        tx: mpsc::Sender<PooledBuffer>,
    ) -> Result<(), TransferError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        loop {
            let mut buf = self.pool.acquire_packet();
            match src.read(buf.read_region()).await {
                Ok(0) => {
                    trace!(pair = %self.pair, direction = %self.direction, "EOF");
                    buf.release();
                    return Ok(());
                }
                Ok(n) => {
                    buf.set_filled(n);
                    if tx.send(buf).await.is_err() {
                        // Writer is gone and has reported its own error
                        return Ok(());
                    }
                }
                Err(e) => {
                    buf.abandon();
                    return Err(TransferError::Read {
                        direction: self.direction,
                        source: e,
                    });
                }
            }
        }
    }

    async fn write_half<W>(
        &self,
        dst: &mut W,
        mut rx: mpsc::Receiver<PooledBuffer>,
    ) -> Result<(), TransferError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        while let Some(buf) = rx.recv().await {
            if let Err(e) = dst.write_all(buf.filled()).await {
                buf.abandon();
                return Err(self.write_error(e));
            }
            self.forwarded
                .fetch_add(buf.len() as u64, Ordering::Relaxed);
            buf.release();
        }

        dst.flush().await.map_err(|e| self.write_error(e))
    }

    fn write_error(&self, source: std::io::Error) -> TransferError {
        TransferError::Write {
            direction: self.direction,
            source,
        }
    }
}

//! Connection Record
//!
//! One open socket plus its buffered reader and writer halves. The record is
//! owned by the registry; callers get shared handles and all I/O is refused
//! once the record leaves the `Open` state.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;
use tokio::io::{
    AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::error::{SocketError, SocketResult};
use crate::transport::{BoxedStream, SocketKind};

/// Lifecycle of a connection record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Which worker produced the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Point-in-time view of a record for listings
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub address: String,
    pub kind: SocketKind,
    pub direction: Direction,
    pub state: ConnectionState,
    pub opened_at: SystemTime,
    pub age_ms: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// An open stream connection
pub struct ConnectionRecord {
    id: String,
    remote_address: String,
    kind: SocketKind,
    direction: Direction,
    opened_at: Instant,
    opened_wall: SystemTime,
    state: AtomicU8,
    closed_tx: watch::Sender<bool>,
    reader: Mutex<BufReader<ReadHalf<BoxedStream>>>,
    writer: Mutex<WriteHalf<BoxedStream>>,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl ConnectionRecord {
    /// Wrap a freshly established stream; the registry assigns the identifier
    pub fn new(
        stream: BoxedStream,
        remote_address: String,
        kind: SocketKind,
        direction: Direction,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let (closed_tx, _) = watch::channel(false);

        Self {
            id: String::new(),
            remote_address,
            kind,
            direction,
            opened_at: Instant::now(),
            opened_wall: SystemTime::now(),
            state: AtomicU8::new(0),
            closed_tx,
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(write_half),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    pub(crate) fn assign_id(&mut self, id: String) {
        self.id = id;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    pub fn kind(&self) -> &SocketKind {
        &self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            address: self.remote_address.clone(),
            kind: self.kind.clone(),
            direction: self.direction,
            state: self.state(),
            opened_at: self.opened_wall,
            age_ms: self.age().as_millis() as u64,
            bytes_read: self.bytes_read(),
            bytes_written: self.bytes_written(),
        }
    }

    /// Write the whole buffer and flush
    pub async fn write_all(&self, data: &[u8]) -> SocketResult<()> {
        self.ensure_open()?;
        let mut writer = self.writer.lock().await;
        self.guarded(async {
            writer.write_all(data).await?;
            writer.flush().await
        })
        .await?;

        self.bytes_written.fetch_add(data.len() as u64, Ordering::Relaxed);
        debug!("Wrote {} bytes to connection {}", data.len(), self.id);
        Ok(())
    }

    /// Read up to `max` bytes; end of stream is an error
    pub async fn read_some(&self, max: usize) -> SocketResult<Vec<u8>> {
        self.ensure_open()?;
        let mut reader = self.reader.lock().await;
        let mut buf = vec![0u8; max];
        let n = self.guarded(reader.read(&mut buf)).await?;
        if n == 0 {
            return Err(peer_closed());
        }

        buf.truncate(n);
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        debug!("Read {} bytes from connection {}", n, self.id);
        Ok(buf)
    }

    /// Fill `buf` completely
    pub async fn read_exact(&self, buf: &mut [u8]) -> SocketResult<()> {
        self.ensure_open()?;
        let mut reader = self.reader.lock().await;
        self.guarded(reader.read_exact(buf)).await?;
        self.bytes_read.fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Read one line of at most `max_len` bytes, without its terminator
    pub async fn read_line(&self, max_len: usize) -> SocketResult<String> {
        self.ensure_open()?;
        let mut reader = self.reader.lock().await;
        let mut line = Vec::new();
        let mut limited = (&mut *reader).take(max_len as u64);
        let n = self.guarded(limited.read_until(b'\n', &mut line)).await?;

        if n == 0 {
            return Err(peer_closed());
        }
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);

        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        } else if n == max_len {
            return Err(SocketError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Line exceeds {} bytes", max_len),
            )));
        }

        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whether a read would return data without blocking
    pub async fn read_ready(&self) -> SocketResult<bool> {
        self.ensure_open()?;
        // Another reader is parked on the stream, nothing is ready for us
        let Ok(mut reader) = self.reader.try_lock() else {
            return Ok(false);
        };

        if !reader.buffer().is_empty() {
            return Ok(true);
        }

        match tokio::time::timeout(Duration::ZERO, reader.fill_buf()).await {
            Ok(Ok(buf)) if buf.is_empty() => Err(peer_closed()),
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => Err(SocketError::Io(e)),
            Err(_) => Ok(false),
        }
    }

    /// Close the connection; wakes any I/O blocked on it. Idempotent.
    pub async fn close(&self) {
        if self
            .state
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.closed_tx.send_replace(true);

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown of connection {} reported: {}", self.id, e);
        }

        self.state.store(2, Ordering::Release);
        debug!("Connection {} to {} closed", self.id, self.remote_address);
    }

    fn ensure_open(&self) -> SocketResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(SocketError::ConnectionClosed { id: self.id.clone() })
        }
    }

    /// Run an I/O future, bailing out as soon as the record is closed
    async fn guarded<F, T>(&self, io: F) -> SocketResult<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        let mut closed_rx = self.closed_tx.subscribe();
        tokio::select! {
            biased;
            _ = closed_rx.wait_for(|closed| *closed) => {
                Err(SocketError::ConnectionClosed { id: self.id.clone() })
            }
            result = io => result.map_err(SocketError::from),
        }
    }
}

impl std::fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("id", &self.id)
            .field("remote_address", &self.remote_address)
            .field("kind", &self.kind)
            .field("direction", &self.direction)
            .field("state", &self.state())
            .finish()
    }
}

fn peer_closed() -> SocketError {
    SocketError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "Connection closed by peer",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;

    fn record_pair() -> (ConnectionRecord, DuplexStream) {
        let (local, remote) = tokio::io::duplex(1024);
        let record = ConnectionRecord::new(
            Box::new(local),
            "00:11:22:33:44:55".to_string(),
            SocketKind::L2cap { psm: 129, le: true, secure: false },
            Direction::Outbound,
        );
        (record, remote)
    }

    #[tokio::test]
    async fn test_write_then_peer_reads() {
        let (record, mut peer) = record_pair();
        record.write_all(b"hello").await.unwrap();

        let mut buf = [0u8; 5];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(record.bytes_written(), 5);
    }

    #[tokio::test]
    async fn test_read_line_strips_terminator() {
        let (record, mut peer) = record_pair();
        peer.write_all(b"first\r\nsecond\n").await.unwrap();

        assert_eq!(record.read_line(1024).await.unwrap(), "first");
        assert_eq!(record.read_line(1024).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_read_line_too_long() {
        let (record, mut peer) = record_pair();
        peer.write_all(b"0123456789abcdef\n").await.unwrap();

        let err = record.read_line(8).await.unwrap_err();
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_read_after_peer_hangup_is_error() {
        let (record, peer) = record_pair();
        drop(peer);

        let err = record.read_some(16).await.unwrap_err();
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_read_ready() {
        let (record, mut peer) = record_pair();
        assert!(!record.read_ready().await.unwrap());

        peer.write_all(b"x").await.unwrap();
        assert!(record.read_ready().await.unwrap());
        assert_eq!(record.read_some(8).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_reader() {
        let (record, _peer) = record_pair();
        let record = std::sync::Arc::new(record);

        let reader = {
            let record = std::sync::Arc::clone(&record);
            tokio::spawn(async move { record.read_some(16).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        record.close().await;
        let result = reader.await.unwrap();
        assert!(matches!(result, Err(SocketError::ConnectionClosed { .. })));
        assert_eq!(record.state(), ConnectionState::Closed);

        // Second close is a no-op
        record.close().await;
        assert!(record.write_all(b"late").await.is_err());
    }
}

//! Throughput Test Pattern
//!
//! Each buffer starts with a sequence counter cycling `'a'..='z'`; the rest of
//! the buffer is the alphabet repeated by offset. The reader checks both.

use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, info};

use crate::connection::ConnectionRecord;
use crate::error::{SocketError, SocketResult};

/// Reported when a run finishes in under a millisecond
pub const SENTINEL_BYTES_PER_SECOND: u64 = 9999;

/// Largest buffer a single throughput run accepts
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

const ALPHABET_LEN: usize = 26;

/// Sequence counter carried in byte 0 of buffer `index`
pub fn sequence_byte(index: usize) -> u8 {
    b'a' + (index % ALPHABET_LEN) as u8
}

/// Payload byte expected at `offset` (offset 0 is the counter)
pub fn payload_byte(offset: usize) -> u8 {
    b'a' + (offset % ALPHABET_LEN) as u8
}

fn next_sequence(current: u8) -> u8 {
    if current == b'z' {
        b'a'
    } else {
        current + 1
    }
}

/// Build buffer `index` of `size` bytes
pub fn build_buffer(index: usize, size: usize) -> BytesMut {
    let mut buf = BytesMut::with_capacity(size);
    buf.extend((0..size).map(payload_byte));
    if size > 0 {
        buf[0] = sequence_byte(index);
    }
    buf
}

/// `total_bytes` over `elapsed`, in bytes per second
pub fn bytes_per_second(total_bytes: u64, elapsed: Duration) -> u64 {
    let elapsed_ms = elapsed.as_millis() as u64;
    if elapsed_ms == 0 {
        SENTINEL_BYTES_PER_SECOND
    } else {
        total_bytes.saturating_mul(1000) / elapsed_ms
    }
}

/// Checks a stream of received buffers against the pattern
#[derive(Debug, Default)]
pub struct SequenceVerifier {
    last_sequence: Option<u8>,
    buffers_seen: usize,
}

impl SequenceVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify the next buffer. The first counter seen is taken as the start of
    /// the sequence but must still be a letter.
    pub fn verify(&mut self, buf: &[u8]) -> SocketResult<()> {
        let index = self.buffers_seen;
        let Some(&counter) = buf.first() else {
            return Ok(());
        };

        let expected = match self.last_sequence {
            Some(previous) => next_sequence(previous),
            None if counter.is_ascii_lowercase() => counter,
            None => b'a',
        };
        if counter != expected {
            return Err(SocketError::ThroughputMismatch {
                buffer: index,
                offset: 0,
                expected,
                actual: counter,
            });
        }

        for (offset, &actual) in buf.iter().enumerate().skip(1) {
            let expected = payload_byte(offset);
            if actual != expected {
                return Err(SocketError::ThroughputMismatch {
                    buffer: index,
                    offset,
                    expected,
                    actual,
                });
            }
        }

        self.last_sequence = Some(counter);
        self.buffers_seen += 1;
        Ok(())
    }

    pub fn buffers_seen(&self) -> usize {
        self.buffers_seen
    }
}

fn validate_run(num_buffers: usize, buffer_size: usize) -> SocketResult<()> {
    if num_buffers == 0 {
        return Err(SocketError::InvalidArgument(
            "numBuffers must be greater than 0".to_string(),
        ));
    }
    if buffer_size == 0 || buffer_size > MAX_BUFFER_SIZE {
        return Err(SocketError::InvalidArgument(format!(
            "bufferSize must be between 1 and {}",
            MAX_BUFFER_SIZE
        )));
    }
    Ok(())
}

/// Write `num_buffers` pattern buffers; returns bytes per second
pub async fn send(
    record: &ConnectionRecord,
    num_buffers: usize,
    buffer_size: usize,
) -> SocketResult<u64> {
    validate_run(num_buffers, buffer_size)?;

    let start = Instant::now();
    let mut buf = build_buffer(0, buffer_size);
    for index in 0..num_buffers {
        buf[0] = sequence_byte(index);
        record.write_all(&buf).await?;
    }

    let total = (num_buffers * buffer_size) as u64;
    let rate = bytes_per_second(total, start.elapsed());
    info!(
        "Throughput send on {}: {} buffers x {} bytes, {} bytes/s",
        record.id(),
        num_buffers,
        buffer_size,
        rate
    );
    Ok(rate)
}

/// Read and verify `num_buffers` pattern buffers; returns bytes per second
pub async fn read(
    record: &ConnectionRecord,
    num_buffers: usize,
    buffer_size: usize,
) -> SocketResult<u64> {
    validate_run(num_buffers, buffer_size)?;

    let start = Instant::now();
    let mut verifier = SequenceVerifier::new();
    let mut buf = vec![0u8; buffer_size];
    for _ in 0..num_buffers {
        record.read_exact(&mut buf).await?;
        verifier.verify(&buf)?;
    }

    let total = (num_buffers * buffer_size) as u64;
    let rate = bytes_per_second(total, start.elapsed());
    debug!("Verified {} buffers on {}", verifier.buffers_seen(), record.id());
    info!(
        "Throughput read on {}: {} buffers x {} bytes, {} bytes/s",
        record.id(),
        num_buffers,
        buffer_size,
        rate
    );
    Ok(rate)
}

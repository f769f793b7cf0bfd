//! Bounded byte-stream channel

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout_at, Instant};

use crate::error::Result;
use crate::traits::{Readable, Writable};

/// A bounded FIFO of bytes with timed blocking reads and writes.
///
/// Reads unblock as soon as at least one byte is queued and drain as many
/// bytes as fit in the caller's buffer. Writes block until every byte has
/// been accepted or the timeout expires; bytes accepted before a timeout
/// stay in the queue and are reflected in the partial return count.
///
/// Single reader, single writer. Share via `Arc` between the producing and
/// consuming task.
pub struct StreamChannel {
    capacity: usize,
    queue: Mutex<VecDeque<u8>>,
    data_available: Notify,
    space_available: Notify,
}

impl StreamChannel {
    /// Create a channel holding at most `capacity` queued bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            data_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    /// Number of bytes currently queued.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// True if no bytes are queued.
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

#[async_trait]
impl Readable for StreamChannel {
    async fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut queue = self.queue.lock().await;
                if !queue.is_empty() {
                    let n = buf.len().min(queue.len());
                    for slot in buf.iter_mut().take(n) {
                        *slot = queue.pop_front().unwrap_or_default();
                    }
                    self.space_available.notify_one();
                    return Ok(n);
                }
            }

            if timeout_at(deadline, self.data_available.notified())
                .await
                .is_err()
            {
                return Ok(0);
            }
        }
    }
}

#[async_trait]
impl Writable for StreamChannel {
    async fn write(&self, buf: &[u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut written = 0;

        loop {
            {
                let mut queue = self.queue.lock().await;
                let room = self.capacity.saturating_sub(queue.len());
                let n = room.min(buf.len() - written);
                if n > 0 {
                    queue.extend(&buf[written..written + n]);
                    written += n;
                    self.data_available.notify_one();
                }
                if written == buf.len() {
                    return Ok(written);
                }
            }

            if timeout_at(deadline, self.space_available.notified())
                .await
                .is_err()
            {
                // Partial at timeout: already-queued bytes stay queued.
                return Ok(written);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const T: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn read_returns_queued_bytes_in_order() {
        let ch = StreamChannel::new(64);
        assert_eq!(ch.write(&[1, 2, 3, 4, 5], T).await.unwrap(), 5);

        let mut buf = [0u8; 3];
        assert_eq!(ch.read(&mut buf, T).await.unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);

        let mut buf = [0u8; 8];
        assert_eq!(ch.read(&mut buf, T).await.unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn read_times_out_on_empty_channel() {
        let ch = StreamChannel::new(64);
        let mut buf = [0u8; 4];
        assert_eq!(ch.read(&mut buf, T).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_read_drains_without_blocking() {
        let ch = StreamChannel::new(64);
        ch.write(&[7, 8], T).await.unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(ch.read(&mut buf, Duration::ZERO).await.unwrap(), 2);
        assert_eq!(ch.read(&mut buf, Duration::ZERO).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn write_blocks_until_reader_frees_space() {
        let ch = Arc::new(StreamChannel::new(4));
        ch.write(&[0; 4], T).await.unwrap();

        let writer = {
            let ch = Arc::clone(&ch);
            tokio::spawn(async move { ch.write(&[1, 2, 3], Duration::from_secs(1)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut buf = [0u8; 4];
        assert_eq!(ch.read(&mut buf, T).await.unwrap(), 4);

        assert_eq!(writer.await.unwrap().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn write_returns_partial_count_at_timeout() {
        let ch = StreamChannel::new(4);
        assert_eq!(ch.write(&[0; 6], T).await.unwrap(), 4);
        assert_eq!(ch.len().await, 4);
    }
}

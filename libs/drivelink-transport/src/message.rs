//! Bounded message-framed channel

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout_at, Instant};

use crate::error::{Result, TransportError};
use crate::traits::{Readable, Writable};

/// Per-message bookkeeping overhead counted against the byte budget, so a
/// channel sized for `N * msg_len` holds roughly N worst-case messages.
const MESSAGE_OVERHEAD: usize = 4;

struct MessageState {
    queue: VecDeque<Vec<u8>>,
    used: usize,
}

/// A bounded buffer of whole messages.
///
/// Writes are atomic: either the entire message is queued within the timeout
/// or nothing is. Reads return exactly one whole message and fail fatally if
/// the caller's buffer cannot hold the head message.
///
/// Single reader, multiple writers: every write holds an internal guard for
/// its duration, with the caller's timeout split evenly between guard
/// acquisition and the wait for queue space.
pub struct MessageChannel {
    capacity: usize,
    state: Mutex<MessageState>,
    data_available: Notify,
    space_available: Notify,
    write_guard: Mutex<()>,
}

impl MessageChannel {
    /// Create a channel with a byte budget of `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(MessageState {
                queue: VecDeque::new(),
                used: 0,
            }),
            data_available: Notify::new(),
            space_available: Notify::new(),
            write_guard: Mutex::new(()),
        }
    }

    /// Length in bytes of the next queued message, or 0 if the channel is
    /// empty. Lets a reader pack several whole messages into one buffer.
    pub async fn next_length(&self) -> usize {
        self.state
            .lock()
            .await
            .queue
            .front()
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Number of queued messages.
    pub async fn message_count(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Read one message, then keep packing further whole queued messages into
    /// `buf` while they fit. Returns the total bytes consumed.
    ///
    /// A non-zero `next_length()` disagreeing with the byte count of the
    /// subsequent read would be a bookkeeping bug, not a runtime condition,
    /// and is treated as such.
    pub async fn read_all(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut consumed = self.read(buf, timeout).await?;
        if consumed == 0 {
            return Ok(0);
        }

        loop {
            let next = self.next_length().await;
            if next == 0 || consumed + next > buf.len() {
                break;
            }
            let n = self.read(&mut buf[consumed..], Duration::ZERO).await?;
            debug_assert_eq!(n, next);
            if n != next {
                return Err(TransportError::internal(
                    "message length changed between query and read",
                ));
            }
            consumed += n;
        }

        Ok(consumed)
    }
}

#[async_trait]
impl Readable for MessageChannel {
    async fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(head) = state.queue.front() {
                    if head.len() > buf.len() {
                        return Err(TransportError::BufferTooSmall {
                            needed: head.len(),
                            available: buf.len(),
                        });
                    }
                    let msg = state.queue.pop_front().unwrap_or_default();
                    buf[..msg.len()].copy_from_slice(&msg);
                    state.used -= msg.len() + MESSAGE_OVERHEAD;
                    self.space_available.notify_one();
                    return Ok(msg.len());
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
impl Writable for MessageChannel {
    async fn write(&self, buf: &[u8], timeout: Duration) -> Result<usize> {
        let need = buf.len() + MESSAGE_OVERHEAD;
        if need > self.capacity {
            return Err(TransportError::MessageTooLarge {
                size: buf.len(),
                capacity: self.capacity,
            });
        }

        // Caller's timeout is split evenly: half to win the writer guard,
        // half to wait for queue space.
        let half = timeout / 2;
        let guard = match timeout_at(Instant::now() + half, self.write_guard.lock()).await {
            Ok(guard) => guard,
            Err(_) => return Ok(0),
        };

        let deadline = Instant::now() + half;
        loop {
            {
                let mut state = self.state.lock().await;
                if state.used + need <= self.capacity {
                    state.queue.push_back(buf.to_vec());
                    state.used += need;
                    self.data_available.notify_one();
                    drop(guard);
                    return Ok(buf.len());
                }
            }

            if timeout_at(deadline, self.space_available.notified())
                .await
                .is_err()
            {
                return Ok(0);
            }
        }
    }
}

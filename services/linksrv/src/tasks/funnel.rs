//! Diagnostic funnel
//!
//! A single task owns the diagnostic sink; producers would otherwise
//! preempt each other mid-line and interleave output. Producers format a
//! line, enqueue it atomically, and move on. A producer that cannot enqueue
//! within the canonical timeout drops the line and reports 0; nothing in
//! the data path ever blocks on diagnostics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};

use drivelink_transport::{MessageChannel, Writable};

use super::watchdog::Watchdog;

/// Messages the funnel channel can hold at worst case.
pub const QUEUE_MESSAGES: usize = 64;

/// Longest single diagnostic message, linebreak included.
pub const MAX_MESSAGE_LEN: usize = 252;

/// Producer handle: formats and enqueues diagnostic lines.
#[derive(Clone)]
pub struct LogHandle {
    channel: Arc<MessageChannel>,
    timeout: Duration,
    dropped: Arc<AtomicU64>,
}

impl LogHandle {
    /// Enqueue one line (a linebreak is appended). Returns the number of
    /// bytes queued, 0 if the line was dropped.
    pub async fn log(&self, line: &str) -> usize {
        let mut msg = Vec::with_capacity(line.len().min(MAX_MESSAGE_LEN) + 1);
        msg.extend_from_slice(&line.as_bytes()[..line.len().min(MAX_MESSAGE_LEN - 1)]);
        msg.push(b'\n');

        match self.channel.write(&msg, self.timeout).await {
            Ok(0) | Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                0
            }
            Ok(n) => n,
        }
    }

    /// Lines dropped so far because the funnel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// The funnel task: drains the queue and writes to the diagnostic sink.
pub struct DiagFunnel {
    channel: Arc<MessageChannel>,
    sink: Arc<dyn Writable>,
    connected: Arc<AtomicBool>,
    watchdog: Arc<Watchdog>,
}

impl DiagFunnel {
    pub fn new(
        sink: Arc<dyn Writable>,
        connected: bool,
        watchdog: Arc<Watchdog>,
    ) -> (Self, LogHandle) {
        let channel = Arc::new(MessageChannel::new(QUEUE_MESSAGES * (MAX_MESSAGE_LEN + 8)));
        let handle = LogHandle {
            channel: channel.clone(),
            timeout: watchdog.suggested_timeout(),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (
            Self {
                channel,
                sink,
                connected: Arc::new(AtomicBool::new(connected)),
                watchdog,
            },
            handle,
        )
    }

    /// Flag checked before touching the sink; when cleared, drained
    /// messages are discarded successfully.
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    pub async fn run(self) {
        let id = self.watchdog.register("funnel");
        let timeout = self.watchdog.suggested_timeout();
        let mut buf = vec![0u8; 4 * MAX_MESSAGE_LEN];

        loop {
            self.watchdog.kick(id);

            // Pack as many whole queued lines as fit into one sink write.
            let n = match self.channel.read_all(&mut buf, timeout).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "diag funnel read failed");
                    continue;
                }
            };
            if n == 0 {
                continue;
            }

            if !self.connected.load(Ordering::Relaxed) {
                trace!(bytes = n, "diag sink disconnected, discarding");
                continue;
            }

            let mut written = 0;
            while written < n {
                match self.sink.write(&buf[written..n], timeout).await {
                    Ok(0) => {
                        self.watchdog.kick(id);
                        warn!("diag sink stalled");
                    }
                    Ok(w) => written += w,
                    Err(e) => {
                        warn!(error = %e, "diag sink write failed");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivelink_transport::{Readable, StreamChannel};
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn lines_reach_the_sink_in_order() {
        let watchdog = Watchdog::new(2000);
        let sink = Arc::new(StreamChannel::new(8192));
        let (funnel, handle) = DiagFunnel::new(sink.clone(), true, watchdog.clone());
        let task = tokio::spawn(funnel.run());

        assert!(handle.log("first line").await > 0);
        assert!(handle.log("second line").await > 0);

        let mut buf = [0u8; 256];
        let mut collected = Vec::new();
        while collected.len() < "first line\nsecond line\n".len() {
            let n = sink
                .read(&mut buf, Duration::from_millis(100))
                .await
                .unwrap();
            assert!(n > 0, "sink starved");
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, b"first line\nsecond line\n");
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_funnel_discards_successfully() {
        let watchdog = Watchdog::new(2000);
        let sink = Arc::new(StreamChannel::new(64));
        let (funnel, handle) = DiagFunnel::new(sink.clone(), false, watchdog.clone());
        let task = tokio::spawn(funnel.run());

        // Producers still see success and the sink stays silent.
        for _ in 0..8 {
            assert!(handle.log("unobserved").await > 0);
        }
        sleep(Duration::from_millis(200)).await;
        assert!(sink.is_empty().await);
        assert_eq!(handle.dropped(), 0);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn overlong_lines_are_truncated_not_fatal() {
        let watchdog = Watchdog::new(2000);
        let sink = Arc::new(StreamChannel::new(8192));
        let (funnel, handle) = DiagFunnel::new(sink, true, watchdog.clone());
        let task = tokio::spawn(funnel.run());

        let long = "x".repeat(4 * MAX_MESSAGE_LEN);
        let queued = handle.log(&long).await;
        assert_eq!(queued, MAX_MESSAGE_LEN);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_and_counts() {
        let watchdog = Watchdog::new(2000);
        let sink = Arc::new(StreamChannel::new(16));
        // No funnel task running: the queue only fills.
        let (_funnel, handle) = DiagFunnel::new(sink, true, watchdog);

        let line = "y".repeat(MAX_MESSAGE_LEN - 1);
        let mut dropped_seen = false;
        for _ in 0..(QUEUE_MESSAGES + 4) {
            if handle.log(&line).await == 0 {
                dropped_seen = true;
            }
        }
        assert!(dropped_seen);
        assert!(handle.dropped() > 0);
    }
}

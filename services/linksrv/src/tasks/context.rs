//! Per-task utilities
//!
//! Bundles the references every task carries (watchdog registration,
//! diagnostic log handle) and wraps the capability calls in watchdog-aware
//! retry loops. A timeout on a channel is never an error here: the task
//! kicks the watchdog to prove it is alive and tries again.

use std::sync::Arc;

use tracing::trace;

use drivelink_transport::{Readable, Result as TransportResult, Writable};

use super::funnel::LogHandle;
use super::watchdog::Watchdog;

pub struct TaskContext {
    name: &'static str,
    watchdog: Arc<Watchdog>,
    watchdog_id: usize,
    diag: LogHandle,
}

impl TaskContext {
    /// Register the calling task with the watchdog. Call once at the top of
    /// the task's run loop.
    pub fn register(name: &'static str, watchdog: Arc<Watchdog>, diag: LogHandle) -> Self {
        let watchdog_id = watchdog.register(name);
        Self {
            name,
            watchdog,
            watchdog_id,
            diag,
        }
    }

    pub fn kick(&self) {
        self.watchdog.kick(self.watchdog_id);
    }

    /// The canonical channel timeout: half the watchdog threshold, so a
    /// task always gets a kick in before it would be reported stalled.
    pub fn timeout(&self) -> std::time::Duration {
        self.watchdog.suggested_timeout()
    }

    /// Blocking read: retries timeouts forever, kicking the watchdog each
    /// round. An empty source is normal; only transport failures surface.
    pub async fn read(&self, src: &dyn Readable, buf: &mut [u8]) -> TransportResult<usize> {
        loop {
            let n = src.read(buf, self.timeout()).await?;
            self.kick();
            if n > 0 {
                return Ok(n);
            }
            trace!(task = self.name, "read timeout, retrying");
        }
    }

    /// Blocking write: retries until the whole buffer is delivered. A full
    /// sink is a pipeline problem worth noting, but not fatal.
    pub async fn write_all(&self, dst: &dyn Writable, buf: &[u8]) -> TransportResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = dst.write(&buf[written..], self.timeout()).await?;
            self.kick();
            if n == 0 {
                trace!(task = self.name, "write timeout, retrying");
                continue;
            }
            written += n;
        }
        Ok(())
    }

    /// Send a line to the diagnostic funnel. Dropped lines are counted by
    /// the handle; delays here must not trip the watchdog.
    pub async fn log(&self, line: String) {
        self.diag.log(&line).await;
        self.kick();
    }
}

//! Generic byte pump
//!
//! Reads a chunk from one capability and writes all of it to another,
//! forever. Composing two endpoints never needs anything more specific, so
//! this is the only generic plumbing task in the graph.

use std::sync::Arc;

use tracing::error;

use drivelink_protocols::packet::MAX_PACKET_LEN;
use drivelink_transport::{Readable, Result as TransportResult, Writable};

use super::funnel::LogHandle;
use super::watchdog::Watchdog;
use super::TaskContext;

pub struct Coupling {
    name: &'static str,
    src: Arc<dyn Readable>,
    dst: Arc<dyn Writable>,
    watchdog: Arc<Watchdog>,
    diag: LogHandle,
}

impl Coupling {
    pub fn new(
        name: &'static str,
        src: Arc<dyn Readable>,
        dst: Arc<dyn Writable>,
        watchdog: Arc<Watchdog>,
        diag: LogHandle,
    ) -> Self {
        Self {
            name,
            src,
            dst,
            watchdog,
            diag,
        }
    }

    pub async fn run(self) {
        if let Err(e) = self.task_loop().await {
            error!(task = self.name, error = %e, "coupling stopped");
        }
    }

    async fn task_loop(&self) -> TransportResult<()> {
        let ctx = TaskContext::register(self.name, self.watchdog.clone(), self.diag.clone());
        let mut buf = [0u8; MAX_PACKET_LEN];

        loop {
            ctx.kick();
            let n = ctx.read(self.src.as_ref(), &mut buf).await?;
            ctx.write_all(self.dst.as_ref(), &buf[..n]).await?;
        }
    }
}

//! Packet intake task
//!
//! Fills a sliding parse window from the raw host byte stream and runs the
//! frame extractor over it. Every recognized packet, and every parse error
//! the extractor generates, is queued as one whole message for downstream
//! consumers; the intake's message channel is the `Readable` face it shows
//! the dispatcher.

use std::sync::Arc;

use tracing::error;

use drivelink_protocols::packet::{PacketOrigin, PacketParser, MAX_PACKET_LEN, MAX_WRAPPED_LEN};
use drivelink_transport::{MessageChannel, Readable, Result as TransportResult};

use super::funnel::LogHandle;
use super::watchdog::Watchdog;
use super::{summarize, TaskContext, PACKET_QUEUE_DEPTH};

pub struct PacketIntake {
    source: Arc<dyn Readable>,
    msgbuf: Arc<MessageChannel>,
    watchdog: Arc<Watchdog>,
    diag: LogHandle,
    verbose: bool,
}

impl PacketIntake {
    pub fn new(
        source: Arc<dyn Readable>,
        watchdog: Arc<Watchdog>,
        diag: LogHandle,
        verbose: bool,
    ) -> Self {
        Self {
            source,
            msgbuf: Arc::new(MessageChannel::new((MAX_PACKET_LEN + 8) * PACKET_QUEUE_DEPTH)),
            watchdog,
            diag,
            verbose,
        }
    }

    /// Where parsed packets come out, one whole packet per read.
    pub fn reader(&self) -> Arc<MessageChannel> {
        self.msgbuf.clone()
    }

    pub async fn run(self) {
        if let Err(e) = self.task_loop().await {
            error!(error = %e, "packet intake stopped");
        }
    }

    async fn task_loop(&self) -> TransportResult<()> {
        let ctx = TaskContext::register("intake", self.watchdog.clone(), self.diag.clone());
        let mut parser = PacketParser::new();
        let mut window = vec![0u8; 2 * MAX_WRAPPED_LEN];
        let mut len = 0usize;
        let mut packets_in: u64 = 0;

        loop {
            ctx.kick();

            let n = ctx.read(self.source.as_ref(), &mut window[len..]).await?;
            len += n;

            let mut parsed = Vec::new();
            len = parser.extract(&mut window, len, &mut |packet| parsed.push(packet));

            for packet in parsed {
                if packet.origin != PacketOrigin::Internal {
                    packets_in += 1;
                    if self.verbose {
                        ctx.log(format!(
                            "intake got packet: {} (packets_in={packets_in})",
                            summarize(&packet)
                        ))
                        .await;
                    }
                } else {
                    ctx.log(format!("intake receive error: {}", summarize(&packet)))
                        .await;
                }

                ctx.write_all(self.msgbuf.as_ref(), &packet.encode()).await?;
            }
        }
    }
}

//! Packet output task
//!
//! The single egress point toward the host. Any task may hand it a packet
//! (its message channel takes multiple writers); the task validates the
//! length field, re-origins parser reports for transmission, stamps the
//! outgoing sequence number and writes the wrapped frame to the transport.
//! Owning the sequencer here is what makes outgoing numbering monotonic no
//! matter how many producers feed in.

use std::sync::Arc;

use tracing::error;

use drivelink_protocols::packet::{Packet, PacketOrigin, PacketSequencer, MAX_PACKET_LEN};
use drivelink_transport::{MessageChannel, Result as TransportResult, Writable};

use super::funnel::LogHandle;
use super::watchdog::Watchdog;
use super::{summarize, TaskContext, PACKET_QUEUE_DEPTH};

pub struct PacketOutput {
    target: Arc<dyn Writable>,
    msgbuf: Arc<MessageChannel>,
    watchdog: Arc<Watchdog>,
    diag: LogHandle,
    verbose: bool,
}

impl PacketOutput {
    pub fn new(
        target: Arc<dyn Writable>,
        watchdog: Arc<Watchdog>,
        diag: LogHandle,
        verbose: bool,
    ) -> Self {
        Self {
            target,
            msgbuf: Arc::new(MessageChannel::new((MAX_PACKET_LEN + 8) * PACKET_QUEUE_DEPTH)),
            watchdog,
            diag,
            verbose,
        }
    }

    /// Where producers hand in packets, one encoded packet per write.
    pub fn writer(&self) -> Arc<MessageChannel> {
        self.msgbuf.clone()
    }

    pub async fn run(self) {
        if let Err(e) = self.task_loop().await {
            error!(error = %e, "packet output stopped");
        }
    }

    async fn task_loop(&self) -> TransportResult<()> {
        let ctx = TaskContext::register("output", self.watchdog.clone(), self.diag.clone());
        let mut sequencer = PacketSequencer::new();
        let mut buf = [0u8; MAX_PACKET_LEN];
        let mut packets_out: u64 = 0;

        loop {
            ctx.kick();

            let n = ctx.read(self.msgbuf.as_ref(), &mut buf).await?;

            let mut packet = match Packet::decode(&buf[..n]) {
                Ok(packet) => packet,
                Err(e) => {
                    ctx.log(format!("output dropping undecodable packet: {e}")).await;
                    continue;
                }
            };

            // The length field must agree with both the message size and the
            // id's own layout; disagreement means an upstream bug, and the
            // packet is dropped rather than sent malformed.
            if packet.length as usize != n {
                ctx.log(format!(
                    "output dropping packet with invalid length field: expected {n}, got {}",
                    packet.length
                ))
                .await;
                continue;
            }
            if packet.length != packet.id().packet_len() {
                ctx.log(format!(
                    "output dropping packet where length field {} does not match expected length {} from id",
                    packet.length,
                    packet.id().packet_len()
                ))
                .await;
                continue;
            }

            // Parser reports are generated with origin Internal; re-origin
            // them for the trip to the host.
            if packet.origin == PacketOrigin::Internal {
                packet.origin = PacketOrigin::TargetToHost;
            }

            let frame = sequencer.rewrap(&mut packet);

            packets_out += 1;
            if self.verbose {
                ctx.log(format!(
                    "output sending wrapped packet: {} (packets_out={packets_out})",
                    summarize(&packet)
                ))
                .await;
            }

            ctx.write_all(self.target.as_ref(), &frame).await?;
        }
    }
}

//! Packet dispatcher
//!
//! Pulls whole packets off the intake and routes on the id: frequency
//! setpoints go to the VFD controller, everything else is forwarded
//! unchanged to the output and bounces back to the host. Routing on the
//! peeked discriminant keeps the packet bytes intact either way.

use std::sync::Arc;

use tracing::error;

use drivelink_protocols::packet::{peek_id, PacketId, MAX_PACKET_LEN};
use drivelink_transport::{MessageChannel, Result as TransportResult};

use super::funnel::LogHandle;
use super::watchdog::Watchdog;
use super::TaskContext;

pub struct Dispatcher {
    intake: Arc<MessageChannel>,
    vfd: Arc<MessageChannel>,
    output: Arc<MessageChannel>,
    watchdog: Arc<Watchdog>,
    diag: LogHandle,
}

impl Dispatcher {
    pub fn new(
        intake: Arc<MessageChannel>,
        vfd: Arc<MessageChannel>,
        output: Arc<MessageChannel>,
        watchdog: Arc<Watchdog>,
        diag: LogHandle,
    ) -> Self {
        Self {
            intake,
            vfd,
            output,
            watchdog,
            diag,
        }
    }

    pub async fn run(self) {
        if let Err(e) = self.task_loop().await {
            error!(error = %e, "dispatcher stopped");
        }
    }

    async fn task_loop(&self) -> TransportResult<()> {
        let ctx = TaskContext::register("dispatcher", self.watchdog.clone(), self.diag.clone());
        let mut buf = [0u8; MAX_PACKET_LEN];

        loop {
            ctx.kick();

            let n = ctx.read(self.intake.as_ref(), &mut buf).await?;
            let bytes = &buf[..n];

            match peek_id(bytes) {
                Some(PacketId::VfdSetFrequency) => {
                    ctx.write_all(self.vfd.as_ref(), bytes).await?;
                }
                _ => {
                    ctx.write_all(self.output.as_ref(), bytes).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivelink_protocols::packet::{Packet, PacketBody, PacketOrigin};
    use drivelink_transport::{Readable, Writable};
    use std::time::Duration;

    use crate::tasks::funnel::DiagFunnel;
    use crate::transport::NullSink;

    #[tokio::test(start_paused = true)]
    async fn setpoints_go_to_the_vfd_everything_else_to_output() {
        let watchdog = Watchdog::new(2000);
        let (_funnel, diag) = DiagFunnel::new(Arc::new(NullSink), false, watchdog.clone());
        let intake = Arc::new(MessageChannel::new(8192));
        let vfd = Arc::new(MessageChannel::new(8192));
        let output = Arc::new(MessageChannel::new(8192));
        let dispatcher = Dispatcher::new(
            intake.clone(),
            vfd.clone(),
            output.clone(),
            watchdog,
            diag,
        );
        let task = tokio::spawn(dispatcher.run());

        let setpoint = Packet::new(
            PacketOrigin::HostToTarget,
            PacketBody::VfdSetFrequency {
                node: 1,
                frequency: 120,
            },
        );
        let heartbeat = Packet::new(PacketOrigin::HostToTarget, PacketBody::Heartbeat);

        intake
            .write(&setpoint.encode(), Duration::from_secs(1))
            .await
            .unwrap();
        intake
            .write(&heartbeat.encode(), Duration::from_secs(1))
            .await
            .unwrap();

        let mut buf = [0u8; MAX_PACKET_LEN];
        let n = vfd.read(&mut buf, Duration::from_secs(5)).await.unwrap();
        assert_eq!(Packet::decode(&buf[..n]).unwrap(), setpoint);

        let n = output.read(&mut buf, Duration::from_secs(5)).await.unwrap();
        assert_eq!(Packet::decode(&buf[..n]).unwrap(), heartbeat);
        task.abort();
    }
}

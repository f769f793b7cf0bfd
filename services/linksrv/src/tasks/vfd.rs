//! VFD controller task
//!
//! Owns the Modbus client and the per-node setpoint cache. Each lap of the
//! loop drains pending setpoint commands, then serves one node round-robin:
//! a node whose setpoint changed gets a frequency write, any other real
//! node gets a status poll. Failed writes leave the cache delta in place,
//! so the write retries on the node's next lap without any timer state.

use std::sync::Arc;

use tracing::error;

use drivelink_protocols::modbus::{ModbusRequest, ModbusResponse, BROADCAST_ADDRESS};
use drivelink_protocols::packet::{
    Packet, PacketBody, PacketOrigin, VfdStatus, MAX_PACKET_LEN,
};
use drivelink_transport::{MessageChannel, Readable, Writable};

use crate::config::VfdConfig;
use crate::error::Result;
use crate::modbus_client::{ModbusClient, RequestOutcome};

use super::funnel::LogHandle;
use super::watchdog::Watchdog;
use super::{TaskContext, PACKET_QUEUE_DEPTH};

/// Marks a node whose drive has never acknowledged a setpoint; real
/// setpoints top out far below this.
const FREQUENCY_UNKNOWN: u16 = u16::MAX;

pub struct VfdController {
    bus: ModbusClient,
    inbox: Arc<MessageChannel>,
    /// Where status packets go (the packet output)
    target: Arc<dyn Writable>,
    config: VfdConfig,
    watchdog: Arc<Watchdog>,
    diag: LogHandle,
}

impl VfdController {
    pub fn new(
        bus: ModbusClient,
        target: Arc<dyn Writable>,
        config: VfdConfig,
        watchdog: Arc<Watchdog>,
        diag: LogHandle,
    ) -> Self {
        Self {
            bus,
            inbox: Arc::new(MessageChannel::new((MAX_PACKET_LEN + 8) * PACKET_QUEUE_DEPTH)),
            target,
            config,
            watchdog,
            diag,
        }
    }

    /// Where the dispatcher delivers setpoint packets.
    pub fn writer(&self) -> Arc<MessageChannel> {
        self.inbox.clone()
    }

    pub async fn run(self) {
        if let Err(e) = self.task_loop().await {
            error!(error = %e, "vfd controller stopped");
        }
    }

    async fn task_loop(mut self) -> Result<()> {
        let ctx = TaskContext::register("vfd", self.watchdog.clone(), self.diag.clone());
        let nodes = self.config.nodes as usize;

        let mut set_frequency = vec![0u16; nodes];
        let mut last_frequency = vec![FREQUENCY_UNKNOWN; nodes];
        // Which node this lap serves; node 0 is broadcast.
        let mut focus = 0usize;

        loop {
            ctx.kick();

            self.drain_inbox(&ctx, &mut set_frequency).await?;

            focus = (focus + 1) % nodes;

            let request = if set_frequency[focus] != last_frequency[focus] {
                ModbusRequest::WriteSingleRegister {
                    register_address: self.config.frequency_register,
                    data: set_frequency[focus],
                }
            } else if focus == BROADCAST_ADDRESS as usize {
                // Nothing to write, and a broadcast status poll would never
                // get an answer. Pace the lap so an idle bank doesn't spin.
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                continue;
            } else {
                ModbusRequest::ReadMultipleRegisters {
                    starting_address: self.config.status_register,
                    num_registers: self.config.status_register_count,
                }
            };

            let outcome = self.bus.send_request(focus as u8, &request).await?;

            match outcome {
                RequestOutcome::Broadcast => {
                    if matches!(request, ModbusRequest::WriteSingleRegister { .. }) {
                        // No acknowledgment is possible for broadcast; a
                        // clean exchange is the best confirmation there is.
                        last_frequency[focus] = set_frequency[focus];
                    } else {
                        ctx.log("unexpected modbus broadcast".to_string()).await;
                    }
                }
                RequestOutcome::Response(ModbusResponse::ReadMultipleRegisters { registers }) => {
                    self.handle_status(&ctx, focus as u8, &registers).await?;
                }
                RequestOutcome::Response(ModbusResponse::WriteSingleRegister {
                    register_address,
                    data,
                }) => {
                    if register_address == self.config.frequency_register {
                        ctx.log(format!(
                            "node {focus}: wrote frequency {data}, {}.{} Hz",
                            data / 10,
                            data % 10
                        ))
                        .await;
                        last_frequency[focus] = set_frequency[focus];
                    } else {
                        ctx.log(format!(
                            "unexpected single-reg write response at address {register_address:#06x}"
                        ))
                        .await;
                    }
                }
                RequestOutcome::Response(other) => {
                    ctx.log(format!(
                        "node {focus}: unexpected modbus response {:?}",
                        other.function()
                    ))
                    .await;
                }
                RequestOutcome::Exception(code) => {
                    // Already reported in-band by the client; the cache
                    // delta stays so the command retries next lap.
                    ctx.log(format!("node {focus}: modbus exception {code:#04x}"))
                        .await;
                }
                RequestOutcome::Failed => {
                    ctx.log(format!("node {focus}: unsuccessful modbus request"))
                        .await;
                }
            }
        }
    }

    /// Collect all queued host commands before touching the bus.
    async fn drain_inbox(&self, ctx: &TaskContext, set_frequency: &mut [u16]) -> Result<()> {
        let mut buf = [0u8; MAX_PACKET_LEN];
        loop {
            let n = self
                .inbox
                .read(&mut buf, std::time::Duration::ZERO)
                .await?;
            if n == 0 {
                return Ok(());
            }

            let packet = match Packet::decode(&buf[..n]) {
                Ok(packet) => packet,
                Err(e) => {
                    ctx.log(format!("vfd dropping undecodable command: {e}")).await;
                    continue;
                }
            };

            match packet.body {
                PacketBody::VfdSetFrequency { node, frequency } => {
                    ctx.log(format!(
                        "vfd got command to set node {node} frequency to {}.{} Hz",
                        frequency / 10,
                        frequency % 10
                    ))
                    .await;

                    if (node as usize) < set_frequency.len() {
                        set_frequency[node as usize] = frequency;
                    } else {
                        ctx.log(format!(
                            "vfd got invalid node {node}, exceeds {}",
                            set_frequency.len() - 1
                        ))
                        .await;
                    }
                }
                other => {
                    // The dispatcher only routes setpoints here; anything
                    // else is a wiring bug.
                    ctx.log(format!(
                        "vfd doesn't know what to do with packet id {}",
                        other.id().name()
                    ))
                    .await;
                    debug_assert!(false, "non-setpoint packet routed to vfd controller");
                }
            }
        }
    }

    /// Turn a status register block into a VfdStatus packet for the host.
    async fn handle_status(&self, ctx: &TaskContext, node: u8, registers: &[u16]) -> Result<()> {
        if registers.len() != self.config.status_register_count as usize || registers.len() < 8 {
            ctx.log(format!(
                "node {node}: short status block ({} registers)",
                registers.len()
            ))
            .await;
            return Ok(());
        }

        let status = VfdStatus {
            error: registers[0],
            state: registers[1],
            freq_cmd: registers[2],
            freq_out: registers[3],
            current_out: registers[4],
            dc_bus_voltage: registers[5],
            motor_output_voltage: registers[6],
            rpm: registers[7],
            node_address: node,
        };

        let packet = Packet::new(PacketOrigin::TargetToHost, PacketBody::VfdStatus(status));
        ctx.write_all(self.target.as_ref(), &packet.encode()).await?;
        Ok(())
    }
}

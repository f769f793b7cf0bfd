//! Simulated drive bank
//!
//! A Modbus server answering for every node on the bus, used when no real
//! drives are attached (`modbus.simulate: true`) and by the integration
//! tests. Each node keeps a frequency setpoint and synthesizes a status
//! block from it. When echo mode is on, incoming bytes are reflected back
//! before the response, standing in for the transceiver echo; the simulated
//! echo arrives later than the real one would, which the client's
//! permissive echo handling absorbs.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::error;

use drivelink_protocols::modbus::{
    codec, exception, ModbusRequest, ModbusResponse, BROADCAST_ADDRESS, MAX_ADU_LEN,
};
use drivelink_transport::{Readable, Result as TransportResult, Writable};

use crate::config::VfdConfig;

use super::funnel::LogHandle;
use super::watchdog::Watchdog;
use super::TaskContext;

pub struct FakeVfd {
    rx: Arc<dyn Readable>,
    tx: Arc<dyn Writable>,
    config: VfdConfig,
    echo: bool,
    response_delay: Duration,
    watchdog: Arc<Watchdog>,
    diag: LogHandle,
}

impl FakeVfd {
    pub fn new(
        rx: Arc<dyn Readable>,
        tx: Arc<dyn Writable>,
        config: VfdConfig,
        echo: bool,
        response_delay: Duration,
        watchdog: Arc<Watchdog>,
        diag: LogHandle,
    ) -> Self {
        Self {
            rx,
            tx,
            config,
            echo,
            response_delay,
            watchdog,
            diag,
        }
    }

    pub async fn run(self) {
        if let Err(e) = self.task_loop().await {
            error!(error = %e, "fake vfd stopped");
        }
    }

    async fn task_loop(&self) -> TransportResult<()> {
        let ctx = TaskContext::register("fake_vfd", self.watchdog.clone(), self.diag.clone());
        let nodes = self.config.nodes as usize;
        let mut frequency = vec![0u16; nodes];

        let mut in_buf = [0u8; 2 * MAX_ADU_LEN];
        let mut in_len = 0usize;
        // Bytes skipped past at the front of the buffer after parse errors.
        let mut index = 0usize;

        loop {
            ctx.kick();

            let n = ctx.read(self.rx.as_ref(), &mut in_buf[in_len..]).await?;

            if self.echo {
                // Reflect the fresh bytes, simulating the transceiver.
                ctx.write_all(self.tx.as_ref(), &in_buf[in_len..in_len + n])
                    .await?;
            }
            in_len += n;

            // Match as many complete requests as the buffer holds.
            loop {
                let window = &in_buf[index..in_len];
                let frame_len = match codec::request_frame_len(window) {
                    Ok(Some(len)) if window.len() >= len => len,
                    Ok(_) => break, // need more bytes
                    Err(_) => {
                        // Unparseable leading byte; discard and resync.
                        index += 1;
                        if in_len - index < 2 {
                            break;
                        }
                        continue;
                    }
                };

                match codec::decode_request(&window[..frame_len]) {
                    Ok((node, request)) => {
                        self.serve(&ctx, node, &request, &mut frequency).await?;
                    }
                    Err(_) => {
                        ctx.log("fake vfd: parsing error".to_string()).await;
                        index += 1;
                        continue;
                    }
                }
                index += frame_len;
            }

            // Shift out everything consumed or skipped.
            if index > 0 {
                in_buf.copy_within(index..in_len, 0);
                in_len -= index;
                index = 0;
            }
        }
    }

    async fn serve(
        &self,
        ctx: &TaskContext,
        node: u8,
        request: &ModbusRequest,
        frequency: &mut [u16],
    ) -> TransportResult<()> {
        let broadcast = node == BROADCAST_ADDRESS;
        if node as usize >= frequency.len() {
            // Not one of ours; a real bus would stay silent.
            return Ok(());
        }

        let reply = match request {
            ModbusRequest::WriteSingleRegister {
                register_address,
                data,
            } => {
                if *register_address == self.config.frequency_register {
                    if broadcast {
                        frequency.iter_mut().for_each(|f| *f = *data);
                    } else {
                        frequency[node as usize] = *data;
                    }
                    Ok(ModbusResponse::WriteSingleRegister {
                        register_address: *register_address,
                        data: *data,
                    })
                } else {
                    Err(exception::ILLEGAL_DATA_ADDRESS)
                }
            }
            ModbusRequest::ReadMultipleRegisters {
                starting_address,
                num_registers,
            } => {
                if *starting_address == self.config.status_register
                    && *num_registers == self.config.status_register_count
                {
                    Ok(ModbusResponse::ReadMultipleRegisters {
                        registers: self.status_block(frequency[node as usize]),
                    })
                } else {
                    Err(exception::ILLEGAL_DATA_ADDRESS)
                }
            }
            ModbusRequest::WriteMultipleRegisters { .. } => Err(exception::ILLEGAL_FUNCTION),
        };

        if broadcast {
            // Broadcast requests are applied silently.
            return Ok(());
        }

        sleep(self.response_delay).await;

        let frame = match reply {
            Ok(response) => match codec::encode_response(node, &response) {
                Ok(frame) => frame,
                Err(e) => {
                    ctx.log(format!("fake vfd: response encode failed: {e}")).await;
                    return Ok(());
                }
            },
            Err(code) => codec::encode_exception(node, request.function() as u8, code),
        };

        ctx.write_all(self.tx.as_ref(), &frame).await
    }

    /// Synthesize the status register block a drive would report while
    /// tracking its setpoint.
    fn status_block(&self, frequency: u16) -> Vec<u16> {
        let mut registers = vec![0u16; self.config.status_register_count as usize];
        if registers.len() >= 8 {
            registers[0] = 0; // no fault
            registers[1] = if frequency > 0 { 0x0001 } else { 0x0000 };
            registers[2] = frequency; // commanded
            registers[3] = frequency; // actual tracks instantly here
            registers[4] = frequency / 100; // amps, roughly
            registers[5] = 3200; // 320.0 V dc bus
            registers[6] = 2300; // 230.0 V out
            registers[7] = frequency.saturating_mul(6) / 10; // rpm at 2 poles
        }
        registers
    }
}

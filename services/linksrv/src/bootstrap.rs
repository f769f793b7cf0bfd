//! Service assembly
//!
//! All channels, tasks and supervisors are constructed here, once, before
//! anything runs; nothing allocates pipeline state after startup. The
//! assembler also closes the observer cycle: the watchdog wants to report
//! through the packet output and the funnel, both of which it supervises,
//! so those slots are installed post-construction rather than wired at
//! construction time.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use drivelink_transport::{Readable, StreamChannel, Writable};

use crate::config::LinkConfig;
use crate::error::Result;
use crate::modbus_client::ModbusClient;
use crate::tasks::{
    DiagFunnel, Dispatcher, FakeVfd, LogHandle, PacketIntake, PacketOutput, VfdController, Watchdog,
};
use crate::timing::BusTiming;
use crate::transport::{NullSink, SerialPort, TracingSink};

/// Byte capacity of the in-process bus channels used in simulate mode.
const SIM_BUS_CAPACITY: usize = 4096;

/// A running link service. Tasks run until shutdown; dropping the handles
/// does not stop them, call [`LinkService::shutdown`].
pub struct LinkService {
    watchdog: Arc<Watchdog>,
    handles: Vec<JoinHandle<()>>,
}

impl LinkService {
    pub fn watchdog(&self) -> Arc<Watchdog> {
        self.watchdog.clone()
    }

    /// Stop every task in the graph.
    pub async fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("link service stopped");
    }
}

/// Step-by-step constructor for the task graph. Tests drive it directly
/// with in-process channels; [`start`] drives it with serial devices.
pub struct Assembler {
    config: LinkConfig,
    watchdog: Arc<Watchdog>,
    diag: LogHandle,
    handles: Vec<JoinHandle<()>>,
}

impl Assembler {
    pub fn new(config: &LinkConfig, diag_sink: Arc<dyn Writable>) -> Self {
        let watchdog = Watchdog::new(config.watchdog.timeout_ticks);
        let (funnel, diag) = DiagFunnel::new(diag_sink, config.diag.enabled, watchdog.clone());
        watchdog.install_diag(diag.clone());

        let handles = vec![
            tokio::spawn(watchdog.clone().run()),
            tokio::spawn(funnel.run()),
        ];

        Self {
            config: config.clone(),
            watchdog,
            diag,
            handles,
        }
    }

    pub fn watchdog(&self) -> Arc<Watchdog> {
        self.watchdog.clone()
    }

    pub fn diag(&self) -> LogHandle {
        self.diag.clone()
    }

    /// Wire and spawn the packet fabric and the bus master.
    pub fn spawn_core(
        &mut self,
        host_source: Arc<dyn Readable>,
        host_sink: Arc<dyn Writable>,
        bus_rx: Arc<dyn Readable>,
        bus_tx: Arc<dyn Writable>,
    ) {
        let verbose = self.config.diag.verbose_io;

        let output = PacketOutput::new(
            host_sink,
            self.watchdog.clone(),
            self.diag.clone(),
            verbose,
        );
        let output_writer = output.writer();
        self.watchdog.install_packet_target(output_writer.clone());

        let intake = PacketIntake::new(
            host_source,
            self.watchdog.clone(),
            self.diag.clone(),
            verbose,
        );
        let intake_reader = intake.reader();

        let bus = ModbusClient::new(
            bus_rx,
            bus_tx,
            output_writer.clone(),
            self.diag.clone(),
            BusTiming::from_config(&self.config.modbus),
            self.config.modbus.echo,
            self.watchdog.suggested_timeout(),
        );
        let vfd = VfdController::new(
            bus,
            output_writer.clone(),
            self.config.vfd.clone(),
            self.watchdog.clone(),
            self.diag.clone(),
        );
        let vfd_writer = vfd.writer();

        let dispatcher = Dispatcher::new(
            intake_reader,
            vfd_writer,
            output_writer,
            self.watchdog.clone(),
            self.diag.clone(),
        );

        self.handles.push(tokio::spawn(output.run()));
        self.handles.push(tokio::spawn(intake.run()));
        self.handles.push(tokio::spawn(dispatcher.run()));
        self.handles.push(tokio::spawn(vfd.run()));
    }

    /// Spawn the simulated drive bank on the server side of the bus.
    pub fn spawn_fake_vfd(&mut self, rx: Arc<dyn Readable>, tx: Arc<dyn Writable>) {
        let fake = FakeVfd::new(
            rx,
            tx,
            self.config.vfd.clone(),
            self.config.modbus.echo,
            Duration::from_millis(self.config.modbus.response_delay_ms),
            self.watchdog.clone(),
            self.diag.clone(),
        );
        self.handles.push(tokio::spawn(fake.run()));
    }

    pub fn finish(self) -> LinkService {
        LinkService {
            watchdog: self.watchdog,
            handles: self.handles,
        }
    }
}

/// Build the full service from configuration: serial devices, or the
/// simulated bus when `modbus.simulate` is set.
pub fn start(config: &LinkConfig) -> Result<LinkService> {
    let diag_sink: Arc<dyn Writable> = if config.diag.enabled {
        Arc::new(TracingSink)
    } else {
        Arc::new(NullSink)
    };
    let mut assembler = Assembler::new(config, diag_sink);

    let host = SerialPort::open(
        &config.host_link.device,
        config.host_link.baud_rate,
        8,
        1,
        "none",
    )?;

    let (bus_rx, bus_tx): (Arc<dyn Readable>, Arc<dyn Writable>) = if config.modbus.simulate {
        info!("modbus bus simulated in-process");
        let to_server = Arc::new(StreamChannel::new(SIM_BUS_CAPACITY));
        let to_client = Arc::new(StreamChannel::new(SIM_BUS_CAPACITY));
        assembler.spawn_fake_vfd(to_server.clone(), to_client.clone());
        (to_client, to_server)
    } else {
        let bus = SerialPort::open(
            &config.modbus.device,
            config.modbus.baud_rate,
            config.modbus.data_bits,
            config.modbus.stop_bits,
            &config.modbus.parity,
        )?;
        (bus.clone(), bus)
    };

    assembler.spawn_core(host.clone(), host, bus_rx, bus_tx);
    Ok(assembler.finish())
}

//! Device transports and diagnostic sinks
//!
//! Adapters that expose real endpoints through the capability traits. The
//! task graph never sees a serial port, only `Readable`/`Writable`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

use drivelink_transport::{Readable, Result as TransportResult, TransportError, Writable};

use crate::error::Result;

/// The async timer cannot express a true zero wait, so capability timeouts
/// on devices are rounded up to one scheduler tick.
const MIN_DEVICE_TIMEOUT: Duration = Duration::from_millis(1);

/// A serial device exposed as transport capabilities.
pub struct SerialPort {
    device: String,
    reader: Mutex<ReadHalf<SerialStream>>,
    writer: Mutex<WriteHalf<SerialStream>>,
}

impl SerialPort {
    /// Open a serial device with explicit framing.
    pub fn open(
        device: &str,
        baud_rate: u32,
        data_bits: u8,
        stop_bits: u8,
        parity: &str,
    ) -> Result<Arc<Self>> {
        let data_bits = match data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };
        let stop_bits = match stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };
        let parity = match parity {
            "even" => tokio_serial::Parity::Even,
            "odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        };

        let stream = tokio_serial::new(device, baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .open_native_async()?;

        info!(device, baud_rate, "opened serial device");

        let (reader, writer) = tokio::io::split(stream);
        Ok(Arc::new(Self {
            device: device.to_string(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }))
    }
}

#[async_trait]
impl Readable for SerialPort {
    async fn read(&self, buf: &mut [u8], wait: Duration) -> TransportResult<usize> {
        let mut reader = self.reader.lock().await;
        match timeout(wait.max(MIN_DEVICE_TIMEOUT), reader.read(buf)).await {
            Ok(Ok(0)) => Err(TransportError::closed(format!(
                "serial device {} disconnected",
                self.device
            ))),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(TransportError::io(e.to_string())),
            Err(_) => Ok(0),
        }
    }
}

#[async_trait]
impl Writable for SerialPort {
    async fn write(&self, buf: &[u8], wait: Duration) -> TransportResult<usize> {
        let mut writer = self.writer.lock().await;
        match timeout(wait.max(MIN_DEVICE_TIMEOUT), writer.write_all(buf)).await {
            Ok(Ok(())) => Ok(buf.len()),
            Ok(Err(e)) => Err(TransportError::io(e.to_string())),
            Err(_) => Ok(0),
        }
    }
}

/// Diagnostic sink that forwards funnel output into the service log, one
/// event per line.
pub struct TracingSink;

#[async_trait]
impl Writable for TracingSink {
    async fn write(&self, buf: &[u8], _wait: Duration) -> TransportResult<usize> {
        let text = String::from_utf8_lossy(buf);
        for line in text.lines().filter(|l| !l.is_empty()) {
            info!(target: "diag", "{line}");
        }
        Ok(buf.len())
    }
}

/// Diagnostic sink with no observer attached; accepts and discards.
pub struct NullSink;

#[async_trait]
impl Writable for NullSink {
    async fn write(&self, buf: &[u8], _wait: Duration) -> TransportResult<usize> {
        Ok(buf.len())
    }
}

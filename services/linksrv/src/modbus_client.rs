//! Modbus RTU client state machine
//!
//! One client owns one bus. A request/response exchange is fully serialized:
//! flush stale bytes, honor the 3.5-character inter-message gap, transmit,
//! absorb and verify the transceiver echo when wired half-duplex, then
//! collect the response against a deadline derived from byte time. Every
//! way an exchange can fail produces exactly one in-band `ModbusError`
//! packet on the report target, and the bus is never left holding stale
//! bytes: the next request's flush sweeps up anything unexpected.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use drivelink_protocols::modbus::{
    self, codec, ModbusRequest, ModbusResponse, BROADCAST_ADDRESS, EXCEPTION_BIT,
    EXCEPTION_FRAME_LEN, MAX_ADU_LEN,
};
use drivelink_protocols::packet::{
    ModbusErrorDetail, ModbusErrorKind, ModbusErrorReport, Packet, PacketBody, PacketOrigin,
};
use drivelink_transport::{Readable, Writable};

use crate::error::{LinkSrvError, Result};
use crate::tasks::LogHandle;
use crate::timing::BusTiming;

/// What a completed `send_request` call amounts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A validated response, decoded to host representation
    Response(ModbusResponse),
    /// Broadcast requests complete without any response
    Broadcast,
    /// The server answered with an exception; already reported in-band
    Exception(u8),
    /// The exchange failed; already reported in-band
    Failed,
}

pub struct ModbusClient {
    rx: Arc<dyn Readable>,
    tx: Arc<dyn Writable>,
    /// Where ModbusError report packets go
    target: Arc<dyn Writable>,
    diag: LogHandle,
    timing: BusTiming,
    /// Transceiver wiring echoes our own transmission back into rx
    echo: bool,
    report_timeout: Duration,
    in_buf: [u8; MAX_ADU_LEN],
    in_len: usize,
    last_response_completed: Instant,
}

impl ModbusClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rx: Arc<dyn Readable>,
        tx: Arc<dyn Writable>,
        target: Arc<dyn Writable>,
        diag: LogHandle,
        timing: BusTiming,
        echo: bool,
        report_timeout: Duration,
    ) -> Self {
        Self {
            rx,
            tx,
            target,
            diag,
            timing,
            echo,
            report_timeout,
            in_buf: [0u8; MAX_ADU_LEN],
            in_len: 0,
            last_response_completed: Instant::now(),
        }
    }

    /// Run one request/response exchange on the bus.
    ///
    /// Returns the decoded response, `Broadcast` for node 0, or the failure
    /// outcome after reporting it. `Err` is reserved for conditions no
    /// retry can fix (a request that cannot encode, a dead transport).
    pub async fn send_request(
        &mut self,
        node: u8,
        request: &ModbusRequest,
    ) -> Result<RequestOutcome> {
        // Length prediction must use the host-side view of the request,
        // before any wire encoding.
        let expected_len = modbus::expected_response_len(request);
        let function = request.function() as u8;

        let out = codec::encode_request(node, request)
            .map_err(|e| LinkSrvError::internal(format!("failed to build modbus request: {e}")))?;

        self.flush_input(node, function).await?;

        // Enforce the inter-message gap relative to the end of the previous
        // exchange. The async timer rounds the wait up to its tick.
        let since_last = self.last_response_completed.elapsed();
        let gap = self.timing.inter_message_delay();
        if since_last < gap {
            let wait = gap - since_last;
            debug!(?wait, "too early for next modbus request, waiting");
            sleep(wait).await;
        }

        let mut written = 0;
        while written < out.len() {
            let n = self.tx.write(&out[written..], self.report_timeout).await?;
            if n == 0 {
                return Err(LinkSrvError::io("modbus transmit stalled"));
            }
            written += n;
        }

        // Response timing is relative to the start of transmission.
        let start = Instant::now();
        let window = self.timing.exchange_window(out.len(), expected_len);

        if self.echo {
            self.read_until(out.len(), start, window).await?;

            if self.in_len < out.len() {
                // Short echo means the bus never carried our transmission.
                self.report(
                    node,
                    function,
                    ModbusErrorKind::BadEchoNotEnoughBytes,
                    ModbusErrorDetail::Bytes {
                        actual: self.in_len as u32,
                        expected: out.len() as u32,
                    },
                )
                .await;
                self.consume(self.in_len);
                return Ok(RequestOutcome::Failed);
            }

            if self.in_buf[..out.len()] != out[..] {
                self.report(
                    node,
                    function,
                    ModbusErrorKind::BadEchoMismatchedContents,
                    ModbusErrorDetail::None,
                )
                .await;
                self.consume(self.in_len);
                return Ok(RequestOutcome::Failed);
            }

            if self.in_len > out.len() {
                // Overflow bytes may be the start of the response; keep them.
                self.diag
                    .log(&format!(
                        "received too many request echo bytes: {} of {}",
                        self.in_len,
                        out.len()
                    ))
                    .await;
            }
            self.consume(out.len());
        }

        if node == BROADCAST_ADDRESS {
            self.last_response_completed = Instant::now();
            return Ok(RequestOutcome::Broadcast);
        }

        self.read_until(expected_len, start, window).await?;
        self.last_response_completed = Instant::now();

        // An exception frame is shorter than any expected response; check
        // for one before judging the byte count. No attempt is made to
        // distinguish an exception with a bad CRC from arbitrary noise.
        if self.in_len >= EXCEPTION_FRAME_LEN
            && self.in_buf[1] == function | EXCEPTION_BIT
            && codec::valid_crc(&self.in_buf[..EXCEPTION_FRAME_LEN])
        {
            let code = self.in_buf[2];
            self.report(
                node,
                function,
                ModbusErrorKind::ResponseException,
                ModbusErrorDetail::Exception(code),
            )
            .await;
            self.consume(EXCEPTION_FRAME_LEN);
            return Ok(RequestOutcome::Exception(code));
        }

        if self.in_len < expected_len {
            self.report(
                node,
                function,
                ModbusErrorKind::BadResponseNotEnoughBytes,
                ModbusErrorDetail::Bytes {
                    actual: self.in_len as u32,
                    expected: expected_len as u32,
                },
            )
            .await;
            self.in_len = 0;
            return Ok(RequestOutcome::Failed);
        }

        // Enough bytes, maybe more; overage is swept by the next flush.
        let frame = &self.in_buf[..expected_len];
        if codec::valid_crc(frame) && frame[0] == node && frame[1] == function {
            match codec::decode_response(frame, request) {
                Ok(response) => {
                    self.consume(expected_len);
                    return Ok(RequestOutcome::Response(response));
                }
                Err(e) => debug!(error = %e, "modbus response failed structural checks"),
            }
        }

        self.report(
            node,
            function,
            ModbusErrorKind::BadResponseMalformedPacket,
            ModbusErrorDetail::None,
        )
        .await;
        self.consume(expected_len);
        Ok(RequestOutcome::Failed)
    }

    /// Sweep any bytes already sitting on the bus. Finding some means the
    /// previous exchange left debris; discard and report.
    async fn flush_input(&mut self, node: u8, function: u8) -> Result<()> {
        let mut total = self.in_len;
        loop {
            let n = self.rx.read(&mut self.in_buf, Duration::ZERO).await?;
            total += n;
            if n == 0 {
                break;
            }
        }

        if total > 0 {
            self.report(
                node,
                function,
                ModbusErrorKind::ExtraBytes,
                ModbusErrorDetail::Bytes {
                    actual: total as u32,
                    expected: 0,
                },
            )
            .await;
        }

        self.in_len = 0;
        Ok(())
    }

    /// Accumulate input until `target_len` bytes are buffered or the
    /// deadline (relative to `start`) passes. A final zero-timeout read
    /// picks up bytes that arrived exactly at the deadline.
    async fn read_until(
        &mut self,
        target_len: usize,
        start: Instant,
        max_wait: Duration,
    ) -> Result<()> {
        loop {
            let remaining = max_wait.saturating_sub(start.elapsed());
            let n = self
                .rx
                .read(&mut self.in_buf[self.in_len..], remaining)
                .await?;
            self.in_len += n;
            if self.in_len >= target_len || remaining.is_zero() {
                return Ok(());
            }
        }
    }

    /// Drop `len` bytes from the front of the input buffer, keeping any
    /// overflow as the prefix of the next frame.
    fn consume(&mut self, len: usize) {
        self.in_buf.copy_within(len..self.in_len, 0);
        self.in_len -= len;
    }

    async fn report(
        &self,
        node: u8,
        function: u8,
        kind: ModbusErrorKind,
        detail: ModbusErrorDetail,
    ) {
        let packet = Packet::new(
            PacketOrigin::TargetToHost,
            PacketBody::ModbusError(ModbusErrorReport {
                kind,
                node,
                function,
                detail,
            }),
        );

        match self.target.write(&packet.encode(), self.report_timeout).await {
            Ok(0) => warn!(?kind, node, "modbus error report dropped"),
            Ok(_) => {}
            Err(e) => warn!(?kind, node, error = %e, "modbus error report failed"),
        }

        self.diag
            .log(&format!(
                "modbus node {node} cmd {function:#04x}: {kind:?} reported"
            ))
            .await;
    }
}

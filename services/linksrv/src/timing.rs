//! Modbus RTU bus timing
//!
//! Everything derives from the byte time at the configured baud rate. The
//! firmware counted free-running CPU cycles for sub-tick precision; here the
//! same arithmetic runs on the tokio monotonic clock, with delays rounded up
//! to the runtime's millisecond timer granularity.

use std::time::Duration;

use crate::config::ModbusConfig;

/// One character of inactivity marks the end of a frame for the receiver.
const IDLE_LINE_CHARS: u32 = 1;

#[derive(Debug, Clone, Copy)]
pub struct BusTiming {
    /// Time to shift one byte's symbols onto the wire
    byte_time: Duration,
    /// Required bus idle between the end of a response and the next request
    inter_message_delay: Duration,
    /// How long the drives take to prepare a response
    response_delay: Duration,
}

impl BusTiming {
    pub fn new(baud_rate: u32, symbols_per_byte: u32, response_delay: Duration) -> Self {
        let byte_nanos = 1_000_000_000u64 * symbols_per_byte as u64 / baud_rate as u64;
        let byte_time = Duration::from_nanos(byte_nanos);
        Self {
            byte_time,
            // 3.5 characters, expanded to 7/2 and rounded up.
            inter_message_delay: Duration::from_nanos((byte_nanos * 7).div_ceil(2)),
            response_delay,
        }
    }

    pub fn from_config(config: &ModbusConfig) -> Self {
        Self::new(
            config.baud_rate,
            config.symbols_per_byte(),
            Duration::from_millis(config.response_delay_ms),
        )
    }

    pub fn inter_message_delay(&self) -> Duration {
        self.inter_message_delay
    }

    /// Deadline for a whole exchange: shifting the request out (and hearing
    /// its echo), the server thinking, and the response shifting back in.
    pub fn exchange_window(&self, request_len: usize, response_len: usize) -> Duration {
        self.byte_time * (request_len + response_len + IDLE_LINE_CHARS as usize) as u32
            + self.response_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench_timing() -> BusTiming {
        // 38400 baud, 8N2 framing: 11 symbols per byte.
        BusTiming::new(38_400, 11, Duration::from_millis(6))
    }

    #[test]
    fn byte_time_at_bench_baud_rate() {
        let timing = bench_timing();
        // 11 symbols / 38400 baud ≈ 286 µs per byte.
        assert_eq!(timing.byte_time, Duration::from_nanos(286_458));
    }

    #[test]
    fn inter_message_delay_is_three_and_a_half_characters() {
        let timing = bench_timing();
        let expected = Duration::from_nanos((286_458 * 7 + 1) / 2);
        assert_eq!(timing.inter_message_delay(), expected);
        assert!(timing.inter_message_delay() > Duration::from_micros(1000));
        assert!(timing.inter_message_delay() < Duration::from_micros(1010));
    }

    #[test]
    fn exchange_window_scales_with_frame_sizes() {
        let timing = bench_timing();
        let short = timing.exchange_window(8, 8);
        let long = timing.exchange_window(8, 21);
        assert!(long > short);
        // Both dominated by the 6 ms response delay plus a few byte times.
        assert!(short > Duration::from_millis(6));
        assert!(long < Duration::from_millis(20));
    }
}

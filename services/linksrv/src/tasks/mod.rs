//! The task graph
//!
//! Each submodule owns one long-running task. Tasks talk to each other only
//! through the transport capabilities, are registered with the watchdog, and
//! kick it once per loop iteration. Embedded-side data flow:
//!
//! ```text
//! host RX -> PacketIntake -> Dispatcher -> VfdController -> Modbus bus
//!                                \------------------------> PacketOutput -> host TX
//! ```

pub mod context;
pub mod coupling;
pub mod dispatcher;
pub mod fake_vfd;
pub mod funnel;
pub mod intake;
pub mod output;
pub mod vfd;
pub mod watchdog;

pub use context::TaskContext;
pub use coupling::Coupling;
pub use dispatcher::Dispatcher;
pub use fake_vfd::FakeVfd;
pub use funnel::{DiagFunnel, LogHandle};
pub use intake::PacketIntake;
pub use output::PacketOutput;
pub use vfd::VfdController;
pub use watchdog::Watchdog;

use drivelink_protocols::packet::Packet;

/// Packets queued between tasks before backpressure kicks in.
pub const PACKET_QUEUE_DEPTH: usize = 12;

/// One-line packet summary for diagnostic output.
pub fn summarize(packet: &Packet) -> String {
    format!(
        "seq {} origin {:?} id {}",
        packet.sequence_num,
        packet.origin,
        packet.id().name()
    )
}

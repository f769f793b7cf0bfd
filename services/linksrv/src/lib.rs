//! # DriveLink link service
//!
//! Terminates the host serial link, parses the framed packet protocol,
//! routes frequency setpoints to a bank of VFDs over Modbus RTU, and
//! reports drive status, parse errors and liveness timeouts back to the
//! host over the same link.
//!
//! ```text
//! host serial ──► PacketIntake ──► Dispatcher ──► VfdController ──► RS-485 bus
//!      ▲                               │               │
//!      └────────── PacketOutput ◄──────┴───────────────┘
//!                        ▲
//!            Watchdog ───┴─── diagnostic funnel
//! ```
//!
//! See [`bootstrap`] for how the graph is assembled and [`config`] for the
//! runtime knobs.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod modbus_client;
pub mod tasks;
pub mod timing;
pub mod transport;

pub use bootstrap::{start, Assembler, LinkService};
pub use config::LinkConfig;
pub use error::{LinkSrvError, Result};

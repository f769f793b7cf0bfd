//! Liveness supervisor
//!
//! Tasks register once and then kick periodically. The supervisor waits for
//! every registered task's bit within the timeout window; whoever fails to
//! arrive gets reported, in-band toward the host and on the diagnostic
//! funnel. Reporting is the whole job: the supervisor never resets anything,
//! so a wired hardware watchdog stays the only hard reset path.
//!
//! The supervisor needs the packet output and the funnel, but both of those
//! are themselves supervised tasks. The assembler breaks the cycle by
//! installing the observer slots after construction, before anything runs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{error, warn};

use drivelink_protocols::packet::{Packet, PacketBody, TASK_NAME_LEN};
use drivelink_transport::Writable;

use super::funnel::LogHandle;

/// Bits available in the event mask.
pub const MAX_TASKS: usize = 24;

/// Attempts to hand a timeout report to the packet output before giving up
/// on that report.
const REPORT_ATTEMPTS: u32 = 3;

struct TrackedTask {
    name: &'static str,
    last_kick: Instant,
}

pub struct Watchdog {
    timeout: Duration,
    tasks: Mutex<Vec<TrackedTask>>,
    bits: AtomicU32,
    kicked: Notify,
    packet_target: OnceCell<Arc<dyn Writable>>,
    diag: OnceCell<LogHandle>,
}

impl Watchdog {
    /// `timeout_ticks` is in milliseconds, one tick per millisecond.
    pub fn new(timeout_ticks: u64) -> Arc<Self> {
        Arc::new(Self {
            timeout: Duration::from_millis(timeout_ticks),
            tasks: Mutex::new(Vec::new()),
            bits: AtomicU32::new(0),
            kicked: Notify::new(),
            packet_target: OnceCell::new(),
            diag: OnceCell::new(),
        })
    }

    /// Half the timeout: the canonical wait used by every channel operation
    /// so a looping task always kicks in time.
    pub fn suggested_timeout(&self) -> Duration {
        self.timeout / 2
    }

    /// Observer slot: where timeout reports go as packets. Installed by the
    /// assembler once the packet output exists.
    pub fn install_packet_target(&self, target: Arc<dyn Writable>) {
        let _ = self.packet_target.set(target);
    }

    /// Observer slot: where timeout reports go as diagnostic lines.
    pub fn install_diag(&self, diag: LogHandle) {
        let _ = self.diag.set(diag);
    }

    /// Assign the calling task a fresh bit and seed its kick timestamp.
    pub fn register(&self, name: &'static str) -> usize {
        let mut tasks = self.tasks.lock();
        assert!(tasks.len() < MAX_TASKS, "watchdog task table full");
        tasks.push(TrackedTask {
            name,
            last_kick: Instant::now(),
        });
        tasks.len() - 1
    }

    /// Liveness assertion from a monitored task.
    pub fn kick(&self, id: usize) {
        debug_assert!(id < MAX_TASKS);
        self.bits.fetch_or(1 << id, Ordering::AcqRel);
        self.tasks.lock()[id].last_kick = Instant::now();
        self.kicked.notify_one();
    }

    pub async fn run(self: Arc<Self>) {
        loop {
            let count = self.tasks.lock().len();
            if count == 0 {
                // Nothing registered yet; don't hog the CPU with a
                // zero-length wait.
                sleep(Duration::from_millis(10)).await;
                continue;
            }

            let expected: u32 = (1u32 << count) - 1;
            let deadline = Instant::now() + self.timeout;

            loop {
                if self.bits.load(Ordering::Acquire) & expected == expected {
                    break;
                }
                if timeout_at(deadline, self.kicked.notified()).await.is_err() {
                    break;
                }
            }

            let seen = self.bits.swap(0, Ordering::AcqRel);
            let stalled = expected & !seen;
            if stalled == 0 {
                continue;
            }

            let now = Instant::now();
            for id in 0..count {
                if stalled & (1 << id) == 0 {
                    continue;
                }
                let (name, last_kick) = {
                    let tasks = self.tasks.lock();
                    (tasks[id].name, tasks[id].last_kick)
                };
                let unresponsive_ticks = now.duration_since(last_kick).as_millis() as u32;
                error!(task = name, unresponsive_ticks, "watchdog timeout");

                self.report(name, unresponsive_ticks).await;
            }
        }
    }

    async fn report(&self, name: &'static str, unresponsive_ticks: u32) {
        let mut name_bytes = [0u8; TASK_NAME_LEN];
        let copy = name.len().min(TASK_NAME_LEN);
        name_bytes[..copy].copy_from_slice(&name.as_bytes()[..copy]);

        if let Some(target) = self.packet_target.get() {
            let packet = Packet::internal(PacketBody::WatchdogTimeout {
                unresponsive_ticks,
                name: name_bytes,
            });
            let frame = packet.encode();
            let mut delivered = false;
            for _ in 0..REPORT_ATTEMPTS {
                match target.write(&frame, self.suggested_timeout()).await {
                    Ok(0) => continue,
                    Ok(_) => {
                        delivered = true;
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "watchdog report write failed");
                        break;
                    }
                }
            }
            if !delivered {
                warn!(task = name, "watchdog timeout report dropped");
            }
        }

        if let Some(diag) = self.diag.get() {
            diag.log(&format!(
                "watchdog: {name} unresponsive for {unresponsive_ticks} ticks"
            ))
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivelink_protocols::packet::PacketId;
    use drivelink_transport::{MessageChannel, Readable};

    async fn drain_reports(target: &MessageChannel) -> Vec<Packet> {
        let mut reports = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let n = target.read(&mut buf, Duration::ZERO).await.unwrap();
            if n == 0 {
                break;
            }
            reports.push(Packet::decode(&buf[..n]).unwrap());
        }
        reports
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_tasks_are_never_reported() {
        let watchdog = Watchdog::new(2000);
        let target = Arc::new(MessageChannel::new(4096));
        watchdog.install_packet_target(target.clone());

        let id = watchdog.register("steady");
        {
            let watchdog = watchdog.clone();
            tokio::spawn(async move {
                loop {
                    watchdog.kick(id);
                    sleep(Duration::from_millis(500)).await;
                }
            });
        }
        let supervisor = tokio::spawn(watchdog.clone().run());

        sleep(Duration::from_secs(10)).await;
        assert!(drain_reports(&target).await.is_empty());
        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_task_is_reported_by_name() {
        let watchdog = Watchdog::new(2000);
        let target = Arc::new(MessageChannel::new(8192));
        watchdog.install_packet_target(target.clone());

        let steady = watchdog.register("steady");
        let stalling = watchdog.register("stalling");

        {
            let watchdog = watchdog.clone();
            tokio::spawn(async move {
                loop {
                    watchdog.kick(steady);
                    sleep(Duration::from_millis(500)).await;
                }
            });
        }
        {
            let watchdog = watchdog.clone();
            tokio::spawn(async move {
                // Three kicks, then silence.
                for _ in 0..3 {
                    watchdog.kick(stalling);
                    sleep(Duration::from_millis(500)).await;
                }
            });
        }
        let supervisor = tokio::spawn(watchdog.clone().run());

        // Well past the last kick plus the timeout window.
        sleep(Duration::from_millis(4500)).await;

        let reports = drain_reports(&target).await;
        assert!(!reports.is_empty(), "expected a timeout report");
        for report in &reports {
            assert_eq!(report.id(), PacketId::WatchdogTimeout);
            match &report.body {
                PacketBody::WatchdogTimeout {
                    unresponsive_ticks,
                    name,
                } => {
                    assert!(name.starts_with(b"stalling"));
                    assert!(*unresponsive_ticks >= 2000);
                }
                other => panic!("unexpected body {other:?}"),
            }
        }
        supervisor.abort();
    }
}

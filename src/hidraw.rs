//! Raw HID report ingestion.
//!
//! One reader thread per configured surface reads the hidraw node
//! non-blocking, stamps each buffer with a monotonic arrival time, and
//! pushes it onto the shared bounded ring. Readers do nothing else: no
//! parsing beyond a length sanity check, so a slow pump can never back up
//! into the kernel. When the ring is full the oldest buffer is dropped and
//! counted; the session tracker tolerates the gap.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use tracing::{error, info, warn};

use crate::report::parser::MIN_REPORT_LEN;
use crate::report::Side;

/// Largest report buffer we accept from a device.
pub const MAX_REPORT_LEN: usize = 64;

/// Monotonic microsecond clock shared by readers and the pump.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl MonotonicClock {
    #[must_use]
    pub fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }
}

/// One raw report buffer with transport metadata.
#[derive(Debug, Clone)]
pub struct RawReport {
    pub side: Side,
    pub timestamp_us: u64,
    pub data: SmallVec<[u8; MAX_REPORT_LEN]>,
}

struct RingState {
    queue: VecDeque<RawReport>,
    dropped: u64,
    closed: bool,
}

/// Bounded report ring between the reader threads and the pump. Arrival
/// order is preserved; overflow drops the oldest buffer.
pub struct ReportRing {
    state: Mutex<RingState>,
    readable: Condvar,
    capacity: usize,
}

impl ReportRing {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RingState {
                queue: VecDeque::with_capacity(capacity),
                dropped: 0,
                closed: false,
            }),
            readable: Condvar::new(),
            capacity: capacity.max(2),
        }
    }

    pub fn push(&self, report: RawReport) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if state.queue.len() >= self.capacity {
            state.queue.pop_front();
            state.dropped += 1;
        }
        state.queue.push_back(report);
        self.readable.notify_one();
    }

    /// Pop the next report, waiting up to `timeout`. None on timeout or
    /// when the ring is closed and drained; check [`Self::is_closed`] to
    /// tell them apart.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<RawReport> {
        let mut state = self.state.lock();
        loop {
            if let Some(report) = state.queue.pop_front() {
                return Some(report);
            }
            if state.closed {
                return None;
            }
            if self.readable.wait_for(&mut state, timeout).timed_out() {
                return None;
            }
        }
    }

    pub fn close(&self) {
        self.state.lock().closed = true;
        self.readable.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}

/// Handle to one reader thread. Dropping it stops the thread and closes
/// the device node on every exit path.
pub struct RawReader {
    path: PathBuf,
    shutdown_tx: crossbeam_channel::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl RawReader {
    /// Open `path` non-blocking and start the reader loop.
    pub fn spawn(
        path: &Path,
        side: Side,
        ring: Arc<ReportRing>,
        clock: MonotonicClock,
    ) -> Result<Self> {
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        info!("reading {} reports from {}", side, path.display());

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let thread_path = path.to_path_buf();
        let handle = thread::spawn(move || {
            read_loop(&mut file, side, &ring, clock, &shutdown_rx);
            info!("reader thread exiting for {}", thread_path.display());
        });

        Ok(Self {
            path: path.to_path_buf(),
            shutdown_tx,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RawReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(
    file: &mut File,
    side: Side,
    ring: &ReportRing,
    clock: MonotonicClock,
    shutdown_rx: &crossbeam_channel::Receiver<()>,
) {
    let mut buf = [0u8; MAX_REPORT_LEN];
    let mut short_streak = 0u32;
    loop {
        match shutdown_rx.try_recv() {
            Ok(()) | Err(crossbeam_channel::TryRecvError::Disconnected) => return,
            Err(crossbeam_channel::TryRecvError::Empty) => {}
        }
        match file.read(&mut buf) {
            Ok(0) => {
                warn!("{}: device went away", side);
                break;
            }
            Ok(n) if n < MIN_REPORT_LEN => {
                // Some other report type (battery, feature echo); ignore,
                // but a stream of nothing else means a misconfigured node.
                short_streak += 1;
                if short_streak == 200 {
                    warn!("{}: only undersized reports arriving, wrong hidraw node?", side);
                }
            }
            Ok(n) => {
                short_streak = 0;
                ring.push(RawReport {
                    side,
                    timestamp_us: clock.now_us(),
                    data: SmallVec::from_slice(&buf[..n]),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(1));
            }
            Err(e) => {
                error!("{}: read error: {}", side, e);
                break;
            }
        }
    }
}

//! Update loop running every region's periodic hook.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::info;

use crate::bus::RegionTable;
use crate::memory::RegisterFile;

/// Name of the update thread.
pub const UPDATE_THREAD_NAME: &str = "hm2-update";

/// Runs update passes over a frozen region table.
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    regs: Arc<RegisterFile>,
    regions: Arc<RegionTable>,
    period: Duration,
}

impl UpdateScheduler {
    /// Scheduler pausing `period` between passes; a zero period only yields.
    #[must_use]
    pub const fn new(regs: Arc<RegisterFile>, regions: Arc<RegionTable>, period: Duration) -> Self {
        Self {
            regs,
            regions,
            period,
        }
    }

    /// Delay between passes.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Runs every update hook once, in registration order.
    pub fn run_pass(&self) {
        self.regions.update_pass(&self.regs);
    }

    fn pause(&self) {
        if self.period.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.period);
        }
    }

    /// Runs passes until `stop` is set and returns the number of passes.
    pub fn run_until(&self, stop: &AtomicBool) -> u64 {
        let mut passes = 0u64;
        while !stop.load(Ordering::Relaxed) {
            self.run_pass();
            passes += 1;
            self.pause();
        }
        passes
    }

    /// Runs passes forever.
    pub fn run_updates(&self) -> ! {
        loop {
            self.run_pass();
            self.pause();
        }
    }

    /// Moves the scheduler onto its own thread, running forever.
    ///
    /// # Errors
    ///
    /// Returns the error from spawning the thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        info!(
            "starting update loop over {} regions, period {:?}",
            self.regions.len(),
            self.period
        );
        thread::Builder::new()
            .name(UPDATE_THREAD_NAME.to_owned())
            .spawn(move || self.run_updates())
    }

    /// Moves the scheduler onto its own thread, running until `stop` is set.
    /// The thread returns the number of passes.
    ///
    /// # Errors
    ///
    /// Returns the error from spawning the thread.
    pub fn spawn_until(self, stop: Arc<AtomicBool>) -> io::Result<JoinHandle<u64>> {
        thread::Builder::new()
            .name(UPDATE_THREAD_NAME.to_owned())
            .spawn(move || self.run_until(&stop))
    }
}

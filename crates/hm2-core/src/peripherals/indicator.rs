//! Status LED driven from bit 31 of the status register.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;

use crate::bus::RegionHandler;
use crate::lbp16::spaces::{IndicatorMode, Statistics};
use crate::memory::RegisterFile;

/// Bit of the status register mirrored onto the indicator.
pub const INDICATOR_BIT: u32 = 31;

/// An on/off indicator such as the board LED.
pub trait Indicator: Send + Sync {
    /// Switches the indicator.
    fn set(&self, on: bool);
}

impl<T: Indicator + ?Sized> Indicator for Arc<T> {
    fn set(&self, on: bool) {
        (**self).set(on);
    }
}

/// Indicator that remembers its state and counts transitions.
#[derive(Debug, Default)]
pub struct SimulatedIndicator {
    on: AtomicBool,
    transitions: AtomicUsize,
}

impl SimulatedIndicator {
    /// Starts switched off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Relaxed)
    }

    /// Number of on/off changes so far.
    #[must_use]
    pub fn transitions(&self) -> usize {
        self.transitions.load(Ordering::Relaxed)
    }
}

impl Indicator for SimulatedIndicator {
    fn set(&self, on: bool) {
        if self.on.swap(on, Ordering::Relaxed) != on {
            self.transitions.fetch_add(1, Ordering::Relaxed);
            debug!("indicator {}", if on { "on" } else { "off" });
        }
    }
}

/// Update-only region over the status register.
pub struct StatusLed {
    status_addr: u16,
    indicator: Box<dyn Indicator>,
    stats: Arc<Statistics>,
}

impl std::fmt::Debug for StatusLed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusLed")
            .field("status_addr", &format_args!("{:#06x}", self.status_addr))
            .field("mode", &self.stats.indicator_mode())
            .finish_non_exhaustive()
    }
}

impl StatusLed {
    /// Mirrors the register at `status_addr`, subject to the space-6
    /// indicator mode in `stats`.
    pub fn new(
        status_addr: u16,
        indicator: impl Indicator + 'static,
        stats: Arc<Statistics>,
    ) -> Self {
        Self {
            status_addr,
            indicator: Box::new(indicator),
            stats,
        }
    }
}

impl RegionHandler for StatusLed {
    fn update(&self, regs: &RegisterFile) {
        let on = match self.stats.indicator_mode() {
            IndicatorMode::Mirror => (regs.read_u32(self.status_addr) >> INDICATOR_BIT) & 1 == 1,
            IndicatorMode::ForceOn => true,
            IndicatorMode::ForceOff => false,
        };
        self.indicator.set(on);
    }
}

//! Board bring-up: register file, descriptors, regions and dispatcher.

use std::sync::Arc;

use log::{info, warn};

use crate::bus::{Bus, RegionTable};
use crate::config::BoardConfig;
use crate::dispatch::Dispatcher;
use crate::idrom::{DescriptorError, Descriptors};
use crate::lbp16::spaces::Statistics;
use crate::memory::{RegisterFile, IOPORT_START, STATUS_START};
use crate::peripherals::ioport::IOPORT_BYTES;
use crate::peripherals::{GpioPins, Indicator, IoPort, StatusLed};
use crate::scheduler::UpdateScheduler;

/// Size of the status register region.
const STATUS_BYTES: u32 = 4;

/// A fully initialized emulated board.
#[derive(Debug)]
pub struct Board {
    config: BoardConfig,
    descriptors: Descriptors,
    dispatcher: Dispatcher,
}

impl Board {
    /// Builds the board: writes the descriptor tables, registers the `led`
    /// and `ioport` regions and wires the dispatcher.
    ///
    /// A region that cannot be registered is logged and left out; its
    /// address range then behaves as plain memory.
    ///
    /// # Errors
    ///
    /// Returns a [`DescriptorError`] when `config` does not describe a valid
    /// descriptor layout.
    pub fn new(
        config: BoardConfig,
        pins: impl GpioPins + 'static,
        indicator: impl Indicator + 'static,
    ) -> Result<Self, DescriptorError> {
        let descriptors = Descriptors::from_config(&config)?;
        let regs = Arc::new(RegisterFile::new());
        descriptors.write(&regs);

        let stats = Arc::new(Statistics::new());
        let mut regions = RegionTable::new();
        let led = StatusLed::new(STATUS_START, indicator, Arc::clone(&stats));
        if let Err(error) = regions.register("led", STATUS_START, STATUS_BYTES, led) {
            warn!("continuing without status indicator: {error}");
        }
        let ioport = IoPort::new(&config, pins);
        if let Err(error) = regions.register("ioport", IOPORT_START, IOPORT_BYTES, ioport) {
            warn!("continuing without I/O port: {error}");
        }

        let bus = Bus::new(regs, Arc::new(regions));
        let dispatcher = Dispatcher::new(bus, &config, stats);
        info!(
            "board {} initialized with {} regions",
            String::from_utf8_lossy(&config.board_name),
            dispatcher.bus().regions().len()
        );

        Ok(Self {
            config,
            descriptors,
            dispatcher,
        })
    }

    /// Board configuration.
    #[must_use]
    pub const fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Descriptor tables written at bring-up.
    #[must_use]
    pub const fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    /// Request dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Register bus.
    #[must_use]
    pub const fn bus(&self) -> &Bus {
        self.dispatcher.bus()
    }

    /// Shared register file.
    #[must_use]
    pub fn registers(&self) -> &Arc<RegisterFile> {
        self.bus().registers()
    }

    /// Executes one request payload.
    pub fn deliver(&self, payload: &[u8]) -> Vec<Vec<u8>> {
        self.dispatcher.deliver(payload)
    }

    /// Update scheduler over this board's regions, using the configured
    /// period.
    #[must_use]
    pub fn scheduler(&self) -> UpdateScheduler {
        UpdateScheduler::new(
            Arc::clone(self.bus().registers()),
            Arc::clone(self.bus().regions()),
            self.config.update_period,
        )
    }
}

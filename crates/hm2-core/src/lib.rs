//! Register-level emulator of a HostMot2 motion-control I/O board.
//!
//! The crate owns the 64 KiB register file, the region bus routing accesses
//! to per-function handlers, the IDROM descriptor tables the host driver
//! discovers the board from, and the LBP16 protocol engine turning request
//! payloads into reply frames. Sockets, SPI shifting and GPIO electrical
//! details stay behind the [`GpioPins`] and [`Indicator`] traits and the
//! `deliver` byte-buffer boundary.

/// Register file storage and the fixed address map.
pub mod memory;
pub use memory::{
    RegisterFile, ADDRESS_SPACE_BYTES, IDROM_START, ID_START, IOPORT_START, MODULE_DESC_START,
    PIN_DESC_START, STATUS_START,
};

/// Error types and the error classes counted in space 6.
pub mod fault;
pub use fault::{BusError, ErrorClass, ProtocolError, RegistrationError};

/// Region table and register bus.
pub mod bus;
pub use bus::{
    Bus, PlainRegion, Region, RegionHandle, RegionHandler, RegionTable, RegionView, MAX_REGIONS,
};

/// Board capabilities and network identity.
pub mod config;
pub use config::{BoardConfig, NetworkConfig, DEFAULT_UPDATE_PERIOD, LBP16_UDP_PORT};

/// ID block, IDROM and descriptor tables.
pub mod idrom;
pub use idrom::{
    DescriptorError, Descriptors, GTag, IdBlock, IdromHeader, ModuleDescriptor, PinDescriptor,
};

/// LBP16 command codec, info areas and secondary spaces.
pub mod lbp16;
pub use lbp16::{Lbp16Command, MemorySpace, TransferSize};

/// Request payload execution.
pub mod dispatch;
pub use dispatch::{Dispatcher, MAX_REPLY_FRAME};

/// Function-block region handlers and their hardware collaborators.
pub mod peripherals;
pub use peripherals::{
    Direction, GpioPins, Indicator, IoPort, SimulatedIndicator, SimulatedPins, StatusLed,
};

/// Periodic update loop.
pub mod scheduler;
pub use scheduler::UpdateScheduler;

/// SPI command frames.
pub mod spi;
pub use spi::{SpiCommand, SpiFrame};

/// Board assembly.
pub mod board;
pub use board::Board;

#[cfg(test)]
use proptest as _;

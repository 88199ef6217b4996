//! Region handlers for the board's function blocks and the hardware
//! collaborators they drive.

/// Status register mirrored onto the indicator LED.
pub mod indicator;
/// General purpose I/O port module.
pub mod ioport;

pub use indicator::{Indicator, SimulatedIndicator, StatusLed};
pub use ioport::{Direction, GpioPins, IoPort, IoPortRegister, SimulatedPins};

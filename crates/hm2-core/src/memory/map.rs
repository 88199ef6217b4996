//! Fixed HostMot2 register-file layout.

/// Inclusive start address of the ID block.
pub const ID_START: u16 = 0x0100;
/// Inclusive end address of the ID block.
pub const ID_END: u16 = 0x010F;
/// Inclusive start address of the status/indicator register.
pub const STATUS_START: u16 = 0x0200;
/// Inclusive end address of the status/indicator register.
pub const STATUS_END: u16 = 0x0203;
/// Inclusive start address of the IDROM header.
pub const IDROM_START: u16 = 0x0400;
/// Inclusive end address of the IDROM header.
pub const IDROM_END: u16 = 0x043F;
/// Inclusive start address of the module descriptor array.
pub const MODULE_DESC_START: u16 = 0x0440;
/// Inclusive end address of the module descriptor array.
pub const MODULE_DESC_END: u16 = 0x05FF;
/// Inclusive start address of the pin descriptor array.
pub const PIN_DESC_START: u16 = 0x0600;
/// Inclusive end address of the pin descriptor array (144 pins).
pub const PIN_DESC_END: u16 = 0x083F;
/// Inclusive start address of the I/O port register block.
pub const IOPORT_START: u16 = 0x1000;
/// Inclusive end address of the I/O port register block.
pub const IOPORT_END: u16 = 0x14FF;

//! ID block, IDROM header, module and pin descriptor tables.
//!
//! The host driver discovers the board by parsing these tables out of the
//! register file, so their byte layout is fixed:
//!
//! ```text
//! 0x0100  ID block      cookie, "HOSTMOT2", offset to IDROM
//! 0x0400  IDROM header  16 little-endian u32 fields
//! 0x0440  modules       12 bytes each, GTag 0 terminates
//! 0x0600  pins          4 bytes each, count given by IDROM IOWidth
//! ```

use thiserror::Error;

use crate::config::BoardConfig;
use crate::memory::{
    RegisterFile, IDROM_START, ID_START, IOPORT_START, MODULE_DESC_END, MODULE_DESC_START,
    PIN_DESC_END, PIN_DESC_START,
};

/// Config cookie at the start of the ID block.
pub const CONFIG_COOKIE: u32 = 0x55AA_CAFE;
/// Firmware name following the cookie.
pub const FIRMWARE_NAME: [u8; 8] = *b"HOSTMOT2";
/// IDROM type understood by the host driver.
pub const IDROM_TYPE: u32 = 2;
/// Offset from the IDROM to the module descriptors.
pub const MODULE_DESC_OFFSET: u32 = (MODULE_DESC_START - IDROM_START) as u32;
/// Offset from the IDROM to the pin descriptors.
pub const PIN_DESC_OFFSET: u32 = (PIN_DESC_START - IDROM_START) as u32;
/// Size of one module descriptor in bytes.
pub const MODULE_DESC_BYTES: usize = 12;
/// Module descriptor slots, the sentinel included.
pub const MAX_MODULE_DESCRIPTORS: usize = 32;
/// Largest pin count HostMot2 supports.
pub const MAX_PINS: usize = 144;
/// Clock tag selecting the IDROM low clock.
pub const CLOCK_LOW_TAG: u8 = 1;
/// Clock tag selecting the IDROM high clock.
pub const CLOCK_HIGH_TAG: u8 = 2;
/// Secondary-pin bit marking an output.
pub const PIN_OUTPUT: u8 = 0x80;

const _: () = assert!(
    (MODULE_DESC_END - MODULE_DESC_START + 1) as usize >= MAX_MODULE_DESCRIPTORS * MODULE_DESC_BYTES
);
const _: () = assert!((PIN_DESC_END - PIN_DESC_START + 1) as usize == MAX_PINS * 4);

/// General function tags used in module and pin descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum GTag {
    /// Terminates the module descriptor array.
    End = 0,
    /// General purpose I/O port.
    IoPort = 3,
    /// Step/direction generator.
    StepGen = 5,
}

impl GTag {
    /// Raw tag byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses a raw tag byte.
    #[must_use]
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::End),
            3 => Some(Self::IoPort),
            5 => Some(Self::StepGen),
            _ => None,
        }
    }
}

/// Descriptor table problems detected before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum DescriptorError {
    /// More modules than descriptor slots.
    #[error("{count} modules exceed the {max} descriptor slots")]
    TooManyModules {
        /// Modules requested.
        count: usize,
        /// Slots available, sentinel excluded.
        max: usize,
    },
    /// More pins than HostMot2 supports.
    #[error("{count} pins exceed the {MAX_PINS} pin limit")]
    TooManyPins {
        /// Pins requested.
        count: usize,
    },
    /// Pin descriptor count disagrees with the IDROM pin count.
    #[error("{descriptors} pin descriptors for an IOWidth of {io_width}")]
    PinCountMismatch {
        /// Descriptors supplied.
        descriptors: usize,
        /// IDROM IOWidth.
        io_width: u32,
    },
}

/// ID block at 0x0100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdBlock {
    /// Config cookie.
    pub cookie: u32,
    /// Firmware name.
    pub name: [u8; 8],
    /// Register-file offset of the IDROM.
    pub idrom_offset: u32,
}

impl Default for IdBlock {
    fn default() -> Self {
        Self {
            cookie: CONFIG_COOKIE,
            name: FIRMWARE_NAME,
            idrom_offset: u32::from(IDROM_START),
        }
    }
}

impl IdBlock {
    /// Serializes the block.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.cookie.to_le_bytes());
        out[4..12].copy_from_slice(&self.name);
        out[12..16].copy_from_slice(&self.idrom_offset.to_le_bytes());
        out
    }
}

/// IDROM header at 0x0400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdromHeader {
    /// IDROM type, always [`IDROM_TYPE`].
    pub idrom_type: u32,
    /// Offset from the IDROM to the module descriptors.
    pub module_offset: u32,
    /// Offset from the IDROM to the pin descriptors.
    pub pin_offset: u32,
    /// Board name.
    pub board_name: [u8; 8],
    /// FPGA size.
    pub fpga_size: u32,
    /// FPGA pin count.
    pub fpga_pins: u32,
    /// I/O port count.
    pub io_ports: u32,
    /// Total I/O pins.
    pub io_width: u32,
    /// Pins per port.
    pub port_width: u32,
    /// Low clock in Hz.
    pub clock_low: u32,
    /// High clock in Hz.
    pub clock_high: u32,
    /// Instance strides 0 and 1.
    pub instance_strides: [u32; 2],
    /// Register strides 0 and 1.
    pub register_strides: [u32; 2],
}

impl IdromHeader {
    /// Header for `config`.
    #[must_use]
    pub const fn from_config(config: &BoardConfig) -> Self {
        Self {
            idrom_type: IDROM_TYPE,
            module_offset: MODULE_DESC_OFFSET,
            pin_offset: PIN_DESC_OFFSET,
            board_name: config.board_name,
            fpga_size: config.fpga_size,
            fpga_pins: config.fpga_pins,
            io_ports: config.io_ports,
            io_width: config.io_width,
            port_width: config.port_width,
            clock_low: config.clock_low,
            clock_high: config.clock_high,
            instance_strides: config.instance_strides,
            register_strides: config.register_strides,
        }
    }

    /// Serializes the header as sixteen little-endian words.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 64] {
        let name = self.board_name;
        let fields = [
            self.idrom_type,
            self.module_offset,
            self.pin_offset,
            u32::from_le_bytes([name[0], name[1], name[2], name[3]]),
            u32::from_le_bytes([name[4], name[5], name[6], name[7]]),
            self.fpga_size,
            self.fpga_pins,
            self.io_ports,
            self.io_width,
            self.port_width,
            self.clock_low,
            self.clock_high,
            self.instance_strides[0],
            self.instance_strides[1],
            self.register_strides[0],
            self.register_strides[1],
        ];

        let mut out = [0u8; 64];
        for (slot, field) in out.chunks_exact_mut(4).zip(fields) {
            slot.copy_from_slice(&field.to_le_bytes());
        }
        out
    }
}

/// One 12-byte module descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Function tag.
    pub gtag: u8,
    /// Module version.
    pub version: u8,
    /// [`CLOCK_LOW_TAG`] or [`CLOCK_HIGH_TAG`].
    pub clock_tag: u8,
    /// Instances of the module.
    pub instances: u8,
    /// Register-file offset of the first register.
    pub base_address: u16,
    /// Registers per instance.
    pub registers: u8,
    /// Stride selection: bits 5..4 instance stride, bits 1..0 register stride.
    pub strides: u8,
    /// Bitmap of per-instance registers, bit 0 = register 0.
    pub mp_bitmap: u32,
}

impl ModuleDescriptor {
    /// The array terminator.
    pub const SENTINEL: Self = Self {
        gtag: 0,
        version: 0,
        clock_tag: 0,
        instances: 0,
        base_address: 0,
        registers: 0,
        strides: 0,
        mp_bitmap: 0,
    };

    /// I/O port module: five per-instance registers (data, DDR, alt source,
    /// open drain, invert) using instance stride 0 and register stride 0.
    #[must_use]
    pub const fn ioport(instances: u8) -> Self {
        Self {
            gtag: GTag::IoPort.as_u8(),
            version: 0,
            clock_tag: CLOCK_LOW_TAG,
            instances,
            base_address: IOPORT_START,
            registers: 5,
            strides: 0x00,
            mp_bitmap: 0x1F,
        }
    }

    /// Serializes the descriptor.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; MODULE_DESC_BYTES] {
        let mut out = [0u8; MODULE_DESC_BYTES];
        out[0] = self.gtag;
        out[1] = self.version;
        out[2] = self.clock_tag;
        out[3] = self.instances;
        out[4..6].copy_from_slice(&self.base_address.to_le_bytes());
        out[6] = self.registers;
        out[7] = self.strides;
        out[8..12].copy_from_slice(&self.mp_bitmap.to_le_bytes());
        out
    }

    /// Parses a serialized descriptor.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; MODULE_DESC_BYTES]) -> Self {
        Self {
            gtag: bytes[0],
            version: bytes[1],
            clock_tag: bytes[2],
            instances: bytes[3],
            base_address: u16::from_le_bytes([bytes[4], bytes[5]]),
            registers: bytes[6],
            strides: bytes[7],
            mp_bitmap: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }
}

/// One 4-byte pin descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PinDescriptor {
    /// Pin of the secondary function; [`PIN_OUTPUT`] marks outputs.
    pub sec_pin: u8,
    /// Secondary function tag.
    pub sec_tag: u8,
    /// Secondary unit; bit 7 means shared by all units.
    pub sec_unit: u8,
    /// Primary function tag, normally the I/O port.
    pub primary_tag: u8,
}

impl PinDescriptor {
    /// Plain I/O pin with no secondary function.
    #[must_use]
    pub const fn gpio() -> Self {
        Self {
            sec_pin: 0,
            sec_tag: 0,
            sec_unit: 0,
            primary_tag: GTag::IoPort.as_u8(),
        }
    }

    /// Step output of step generator `unit`.
    #[must_use]
    pub const fn step(unit: u8) -> Self {
        Self {
            sec_pin: PIN_OUTPUT | 0x01,
            sec_tag: GTag::StepGen.as_u8(),
            sec_unit: unit,
            primary_tag: GTag::IoPort.as_u8(),
        }
    }

    /// Direction output of step generator `unit`.
    #[must_use]
    pub const fn dir(unit: u8) -> Self {
        Self {
            sec_pin: PIN_OUTPUT | 0x02,
            sec_tag: GTag::StepGen.as_u8(),
            sec_unit: unit,
            primary_tag: GTag::IoPort.as_u8(),
        }
    }

    /// Returns `true` when the secondary pin is an output.
    #[must_use]
    pub const fn is_output(self) -> bool {
        self.sec_pin & PIN_OUTPUT != 0
    }

    /// Packs the descriptor into its register word.
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes([self.sec_pin, self.sec_tag, self.sec_unit, self.primary_tag])
    }

    /// Unpacks a register word.
    #[must_use]
    pub const fn from_u32(word: u32) -> Self {
        let [sec_pin, sec_tag, sec_unit, primary_tag] = word.to_le_bytes();
        Self {
            sec_pin,
            sec_tag,
            sec_unit,
            primary_tag,
        }
    }
}

/// Complete descriptor set for one board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptors {
    /// ID block.
    pub id: IdBlock,
    /// IDROM header.
    pub idrom: IdromHeader,
    /// Module descriptors, sentinel excluded.
    pub modules: Vec<ModuleDescriptor>,
    /// Pin descriptors.
    pub pins: Vec<PinDescriptor>,
}

impl Descriptors {
    /// Derives the descriptor set from board configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`DescriptorError`] when the tables would not fit their
    /// fixed slots or the pin count disagrees with the IDROM.
    pub fn from_config(config: &BoardConfig) -> Result<Self, DescriptorError> {
        let mut modules = Vec::new();
        if config.io_ports > 0 {
            let instances = u8::try_from(config.io_ports).map_err(|_| {
                DescriptorError::TooManyModules {
                    count: config.io_ports as usize,
                    max: MAX_MODULE_DESCRIPTORS - 1,
                }
            })?;
            modules.push(ModuleDescriptor::ioport(instances));
        }

        let descriptors = Self {
            id: IdBlock::default(),
            idrom: IdromHeader::from_config(config),
            modules,
            pins: config.pins.clone(),
        };
        descriptors.validate()?;
        Ok(descriptors)
    }

    /// Checks the tables against their fixed slots.
    ///
    /// # Errors
    ///
    /// See [`DescriptorError`].
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.modules.len() >= MAX_MODULE_DESCRIPTORS {
            return Err(DescriptorError::TooManyModules {
                count: self.modules.len(),
                max: MAX_MODULE_DESCRIPTORS - 1,
            });
        }
        if self.pins.len() > MAX_PINS {
            return Err(DescriptorError::TooManyPins {
                count: self.pins.len(),
            });
        }
        if self.pins.len() != self.idrom.io_width as usize {
            return Err(DescriptorError::PinCountMismatch {
                descriptors: self.pins.len(),
                io_width: self.idrom.io_width,
            });
        }
        Ok(())
    }

    /// Writes every table into the register file.
    pub fn write(&self, regs: &RegisterFile) {
        regs.write_bytes(ID_START, &self.id.to_bytes());
        regs.write_bytes(IDROM_START, &self.idrom.to_bytes());

        let mut addr = MODULE_DESC_START;
        for module in self.modules.iter().chain([&ModuleDescriptor::SENTINEL]) {
            regs.write_bytes(addr, &module.to_bytes());
            addr += MODULE_DESC_BYTES as u16;
        }

        let mut addr = PIN_DESC_START;
        for pin in &self.pins {
            regs.write_u32(addr, pin.to_u32());
            addr += 4;
        }
    }
}

/// Reads the module descriptor array back out of the register file, stopping
/// at the sentinel.
#[must_use]
pub fn read_modules(regs: &RegisterFile) -> Vec<ModuleDescriptor> {
    let mut modules = Vec::new();
    let mut addr = MODULE_DESC_START;
    for _ in 0..MAX_MODULE_DESCRIPTORS {
        let mut bytes = [0u8; MODULE_DESC_BYTES];
        regs.read_bytes(addr, &mut bytes);
        let module = ModuleDescriptor::from_bytes(bytes);
        if module.gtag == GTag::End.as_u8() {
            break;
        }
        modules.push(module);
        addr += MODULE_DESC_BYTES as u16;
    }
    modules
}

//! LBP16 command codec.
//!
//! Every command starts with a little-endian 16-bit command word:
//!
//! ```text
//! 15    write
//! 14    address word follows
//! 13    info area access
//! 12-10 memory space
//! 9-8   unit size (8, 16, 32, 64 bits)
//! 7     address increment
//! 6-0   unit count, 1..=127
//! ```

/// Info-area records indexed by memory space.
pub mod info;
/// Secondary memory spaces 2, 4, 6 and 7.
pub mod spaces;

const WRITE_BIT: u16 = 0x8000;
const HAS_ADDR_BIT: u16 = 0x4000;
const INFO_AREA_BIT: u16 = 0x2000;
const SPACE_SHIFT: u16 = 10;
const SIZE_SHIFT: u16 = 8;
const INCREMENT_BIT: u16 = 0x0080;
const COUNT_MASK: u16 = 0x007F;

/// Largest unit count a command can carry.
pub const MAX_TRANSFER_COUNT: u8 = 127;

/// Bytes in a command word.
pub const COMMAND_BYTES: usize = 2;

/// Bytes in an address word.
pub const ADDRESS_BYTES: usize = 2;

/// Memory spaces selectable by the three space bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum MemorySpace {
    /// HostMot2 register file.
    HostMot2 = 0,
    /// Not implemented.
    Unused1 = 1,
    /// Ethernet EEPROM image.
    Eeprom = 2,
    /// Not implemented.
    Unused3 = 3,
    /// Timer and utility scratch words.
    Timers = 4,
    /// Reserved; even its info area is rejected.
    Reserved5 = 5,
    /// Statistics and control.
    Statistics = 6,
    /// Board identity.
    Identity = 7,
}

impl MemorySpace {
    /// All spaces in index order.
    pub const ALL: [Self; 8] = [
        Self::HostMot2,
        Self::Unused1,
        Self::Eeprom,
        Self::Unused3,
        Self::Timers,
        Self::Reserved5,
        Self::Statistics,
        Self::Identity,
    ];

    /// Space selected by the low three bits of `bits`.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self::ALL[(bits & 0x7) as usize]
    }

    /// Space index, 0..=7.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Returns `true` for spaces that serve data transfers.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Self::Unused1 | Self::Unused3 | Self::Reserved5)
    }
}

/// Unit size selected by the two size bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TransferSize {
    /// 8-bit units.
    Bits8,
    /// 16-bit units.
    Bits16,
    /// 32-bit units.
    Bits32,
    /// 64-bit units.
    Bits64,
}

impl TransferSize {
    /// Size selected by the low two bits of `code`.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code & 0x3 {
            0 => Self::Bits8,
            1 => Self::Bits16,
            2 => Self::Bits32,
            _ => Self::Bits64,
        }
    }

    /// Two-bit size code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Bits8 => 0,
            Self::Bits16 => 1,
            Self::Bits32 => 2,
            Self::Bits64 => 3,
        }
    }

    /// Unit width in bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.bytes() * 8
    }

    /// Unit width in bytes.
    #[must_use]
    pub const fn bytes(self) -> u8 {
        1 << self.code()
    }
}

/// Decoded LBP16 command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Lbp16Command {
    /// Host writes data to the board.
    pub write: bool,
    /// An address word follows the command word.
    pub has_addr: bool,
    /// Access targets the space's info area instead of its data.
    pub info_area: bool,
    /// Addressed memory space.
    pub space: MemorySpace,
    /// Unit size.
    pub size: TransferSize,
    /// Advance the address by one unit after each unit.
    pub increment: bool,
    /// Number of units, valid in `1..=127`.
    pub count: u8,
}

impl Lbp16Command {
    /// Decodes a command word. Total over all inputs.
    #[must_use]
    pub const fn decode(raw: u16) -> Self {
        Self {
            write: raw & WRITE_BIT != 0,
            has_addr: raw & HAS_ADDR_BIT != 0,
            info_area: raw & INFO_AREA_BIT != 0,
            space: MemorySpace::from_bits((raw >> SPACE_SHIFT) as u8),
            size: TransferSize::from_code((raw >> SIZE_SHIFT) as u8),
            increment: raw & INCREMENT_BIT != 0,
            count: (raw & COUNT_MASK) as u8,
        }
    }

    /// Re-encodes the command word. Counts above 127 are truncated to the
    /// seven count bits.
    #[must_use]
    pub const fn encode(self) -> u16 {
        let mut raw = ((self.space.index() as u16) << SPACE_SHIFT)
            | ((self.size.code() as u16) << SIZE_SHIFT)
            | (self.count as u16 & COUNT_MASK);
        if self.write {
            raw |= WRITE_BIT;
        }
        if self.has_addr {
            raw |= HAS_ADDR_BIT;
        }
        if self.info_area {
            raw |= INFO_AREA_BIT;
        }
        if self.increment {
            raw |= INCREMENT_BIT;
        }
        raw
    }

    /// Space index, 0..=7.
    #[must_use]
    pub const fn memory_space(self) -> u8 {
        self.space.index()
    }

    /// Two-bit size code.
    #[must_use]
    pub const fn transfer_size_code(self) -> u8 {
        self.size.code()
    }

    /// Unit width in bits.
    #[must_use]
    pub const fn transfer_bits(self) -> u8 {
        self.size.bits()
    }

    /// Unit width in bytes.
    #[must_use]
    pub const fn transfer_bytes(self) -> u8 {
        self.size.bytes()
    }

    /// Returns `true` when the count is in `1..=127`.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.count >= 1 && self.count <= MAX_TRANSFER_COUNT
    }

    /// Bytes of data the command moves: `count * transfer_bytes`.
    #[must_use]
    pub const fn num_bytes(self) -> usize {
        self.count as usize * self.size.bytes() as usize
    }

    /// Bytes of the command and address words.
    #[must_use]
    pub const fn header_bytes(self) -> usize {
        if self.has_addr {
            COMMAND_BYTES + ADDRESS_BYTES
        } else {
            COMMAND_BYTES
        }
    }

    /// Bytes the command occupies in a request payload.
    #[must_use]
    pub const fn wire_bytes(self) -> usize {
        if self.write {
            self.header_bytes() + self.num_bytes()
        } else {
            self.header_bytes()
        }
    }

    /// Bytes of address space touched: all units when incrementing, one unit
    /// otherwise.
    #[must_use]
    pub const fn span_bytes(self) -> usize {
        if self.increment {
            self.num_bytes()
        } else {
            self.size.bytes() as usize
        }
    }

    /// Start offset of each unit relative to the command address.
    pub fn unit_offsets(self) -> impl Iterator<Item = usize> {
        let step = if self.increment {
            self.size.bytes() as usize
        } else {
            0
        };
        (0..usize::from(self.count)).map(move |unit| unit * step)
    }

    /// Serializes the command word, optional `addr` and `data` the way a
    /// host would put them on the wire. The address is emitted only when
    /// `has_addr` is set.
    #[must_use]
    pub fn to_wire(self, addr: u16, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_bytes() + data.len());
        out.extend_from_slice(&self.encode().to_le_bytes());
        if self.has_addr {
            out.extend_from_slice(&addr.to_le_bytes());
        }
        out.extend_from_slice(data);
        out
    }
}

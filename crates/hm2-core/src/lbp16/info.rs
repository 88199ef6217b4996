//! Per-space capability records.
//!
//! Each memory space publishes a 16-byte record the host reads through
//! 16-bit info-area commands:
//!
//! ```text
//! 0  cookie           0x5A00 | space
//! 2  memsizes         bit 15 writable, 14..8 type, 7..0 access widths
//! 4  memranges        15..11 erase log2, 10..6 page log2, 4..0 range log2
//! 6  address pointer  next address for commands without an address word
//! 8  name             8 bytes, NUL padded
//! ```

use std::sync::atomic::{AtomicU16, Ordering};

use super::MemorySpace;
use crate::fault::ProtocolError;

/// Bytes in one info-area record.
pub const INFO_AREA_BYTES: usize = 16;
/// Cookie of space 0; other spaces add their index.
pub const COOKIE_BASE: u16 = 0x5A00;
/// Record offset of the address pointer.
pub const POINTER_OFFSET: usize = 6;

/// `memsizes` bit marking a writable space.
pub const MEM_WRITABLE: u16 = 0x8000;
/// `memsizes` type of register spaces.
pub const MEM_TYPE_REGISTER: u8 = 0x01;
/// `memsizes` type of plain memory.
pub const MEM_TYPE_MEMORY: u8 = 0x02;
/// `memsizes` type of EEPROM.
pub const MEM_TYPE_EEPROM: u8 = 0x0E;
/// `memsizes` width bit for 8-bit access.
pub const WIDTH_8: u8 = 0x01;
/// `memsizes` width bit for 16-bit access.
pub const WIDTH_16: u8 = 0x02;
/// `memsizes` width bit for 32-bit access.
pub const WIDTH_32: u8 = 0x04;
/// `memsizes` width bit for 64-bit access.
pub const WIDTH_64: u8 = 0x08;

/// Packs a `memsizes` word.
#[must_use]
pub const fn memsizes(writable: bool, mem_type: u8, widths: u8) -> u16 {
    let flag = if writable { MEM_WRITABLE } else { 0 };
    flag | ((mem_type as u16 & 0x7F) << 8) | widths as u16
}

/// Packs a `memranges` word from log2 sizes.
#[must_use]
pub const fn memranges(erase_log2: u8, page_log2: u8, range_log2: u8) -> u16 {
    ((erase_log2 as u16 & 0x1F) << 11)
        | ((page_log2 as u16 & 0x1F) << 6)
        | (range_log2 as u16 & 0x1F)
}

/// One info-area record. Only the address pointer changes after boot.
#[derive(Debug)]
pub struct InfoArea {
    /// `0x5A00 | space`.
    pub cookie: u16,
    /// Access description.
    pub memsizes: u16,
    /// Size description.
    pub memranges: u16,
    address_pointer: AtomicU16,
    /// Space name, NUL padded.
    pub name: [u8; 8],
}

impl InfoArea {
    fn new(space: MemorySpace, memsizes: u16, memranges: u16, name: &[u8]) -> Self {
        let mut padded = [0u8; 8];
        let len = name.len().min(padded.len());
        padded[..len].copy_from_slice(&name[..len]);
        Self {
            cookie: COOKIE_BASE | u16::from(space.index()),
            memsizes,
            memranges,
            address_pointer: AtomicU16::new(0),
            name: padded,
        }
    }

    /// Current address pointer.
    #[must_use]
    pub fn address_pointer(&self) -> u16 {
        self.address_pointer.load(Ordering::Relaxed)
    }

    /// Replaces the address pointer.
    pub fn set_address_pointer(&self, addr: u16) {
        self.address_pointer.store(addr, Ordering::Relaxed);
    }

    /// Returns `true` when the space accepts data writes.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.memsizes & MEM_WRITABLE != 0
    }

    /// Size of the space's data in bytes, from the range field.
    #[must_use]
    pub const fn data_bytes(&self) -> usize {
        1 << (self.memranges & 0x1F)
    }

    /// Serialized record.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; INFO_AREA_BYTES] {
        let mut out = [0u8; INFO_AREA_BYTES];
        out[0..2].copy_from_slice(&self.cookie.to_le_bytes());
        out[2..4].copy_from_slice(&self.memsizes.to_le_bytes());
        out[4..6].copy_from_slice(&self.memranges.to_le_bytes());
        out[6..8].copy_from_slice(&self.address_pointer().to_le_bytes());
        out[8..16].copy_from_slice(&self.name);
        out
    }

    /// Copies record bytes starting at `offset` into `out`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::OutOfRange`] when the bytes run past the record.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), ProtocolError> {
        let bytes = self.to_bytes();
        let source = bytes
            .get(offset..offset + out.len())
            .ok_or(ProtocolError::OutOfRange)?;
        out.copy_from_slice(source);
        Ok(())
    }

    /// Returns `true` when `[offset, offset + len)` only covers the
    /// address pointer.
    #[must_use]
    pub const fn accepts_write(offset: usize, len: usize) -> bool {
        offset >= POINTER_OFFSET && offset + len <= POINTER_OFFSET + 2
    }

    /// Writes record bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::OutOfRange`] past the record and
    /// [`ProtocolError::ReadOnly`] outside the address pointer.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), ProtocolError> {
        if offset + data.len() > INFO_AREA_BYTES {
            return Err(ProtocolError::OutOfRange);
        }
        if !Self::accepts_write(offset, data.len()) {
            return Err(ProtocolError::ReadOnly);
        }
        let mut pointer = self.address_pointer().to_le_bytes();
        pointer[offset - POINTER_OFFSET..offset - POINTER_OFFSET + data.len()]
            .copy_from_slice(data);
        self.set_address_pointer(u16::from_le_bytes(pointer));
        Ok(())
    }
}

/// Info areas of all eight memory spaces.
#[derive(Debug)]
pub struct InfoAreaTable {
    areas: [InfoArea; 8],
}

impl Default for InfoAreaTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InfoAreaTable {
    /// Records for the board's spaces.
    #[must_use]
    pub fn new() -> Self {
        let unused = |space| InfoArea::new(space, 0, 0, b"Unused");
        Self {
            areas: [
                InfoArea::new(
                    MemorySpace::HostMot2,
                    memsizes(true, MEM_TYPE_REGISTER, WIDTH_32),
                    memranges(0, 0, 16),
                    b"HostMot2",
                ),
                unused(MemorySpace::Unused1),
                InfoArea::new(
                    MemorySpace::Eeprom,
                    memsizes(false, MEM_TYPE_EEPROM, WIDTH_16),
                    memranges(0, 0, 6),
                    b"EEPROM",
                ),
                unused(MemorySpace::Unused3),
                InfoArea::new(
                    MemorySpace::Timers,
                    memsizes(true, MEM_TYPE_MEMORY, WIDTH_32),
                    memranges(0, 0, 5),
                    b"Timers",
                ),
                InfoArea::new(MemorySpace::Reserved5, 0, 0, b""),
                InfoArea::new(
                    MemorySpace::Statistics,
                    memsizes(true, MEM_TYPE_MEMORY, WIDTH_16),
                    memranges(0, 0, 5),
                    b"LBP16RW",
                ),
                InfoArea::new(
                    MemorySpace::Identity,
                    memsizes(false, MEM_TYPE_MEMORY, WIDTH_16),
                    memranges(0, 0, 5),
                    b"LBP16RO",
                ),
            ],
        }
    }

    /// Record of `space`.
    #[must_use]
    pub const fn get(&self, space: MemorySpace) -> &InfoArea {
        &self.areas[space.index() as usize]
    }

    /// Zeroes every address pointer.
    pub fn reset_pointers(&self) {
        for area in &self.areas {
            area.set_address_pointer(0);
        }
    }
}

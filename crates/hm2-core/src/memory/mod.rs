//! Register file backing store and fixed address-space layout.

/// Fixed block addresses.
pub mod map;

use std::sync::atomic::{AtomicU32, Ordering};

pub use map::{
    IDROM_END, IDROM_START, ID_END, ID_START, IOPORT_END, IOPORT_START, MODULE_DESC_END,
    MODULE_DESC_START, PIN_DESC_END, PIN_DESC_START, STATUS_END, STATUS_START,
};

/// Size in bytes of the register file (64 KiB).
pub const ADDRESS_SPACE_BYTES: usize = u16::MAX as usize + 1;

const WORD_COUNT: usize = ADDRESS_SPACE_BYTES / 4;

/// 64 KiB register file shared by the request and update contexts.
///
/// Storage is an array of atomic little-endian words. Every 32-bit word is
/// individually consistent; accesses spanning several words carry no
/// cross-word ordering guarantee, matching the register-visible behavior of
/// the emulated board.
#[derive(Debug)]
pub struct RegisterFile {
    words: Box<[AtomicU32]>,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Allocates a zeroed register file.
    #[must_use]
    pub fn new() -> Self {
        Self {
            words: (0..WORD_COUNT).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Size in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        ADDRESS_SPACE_BYTES
    }

    /// Always `false`; the register file has a fixed non-zero size.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    fn word(&self, addr: u16) -> &AtomicU32 {
        &self.words[usize::from(addr) / 4]
    }

    /// Reads one byte.
    #[must_use]
    pub fn read_u8(&self, addr: u16) -> u8 {
        let shift = u32::from(addr % 4) * 8;
        let word = self.word(addr).load(Ordering::Relaxed);
        (word >> shift) as u8
    }

    /// Writes one byte, leaving the other bytes of its word untouched.
    pub fn write_u8(&self, addr: u16, value: u8) {
        let shift = u32::from(addr % 4) * 8;
        let mask = !(0xFF_u32 << shift);
        let bits = u32::from(value) << shift;
        // The closure never returns `None`, so the update always succeeds.
        let _ = self
            .word(addr)
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |word| {
                Some((word & mask) | bits)
            });
    }

    /// Reads a little-endian 32-bit value; `addr` need not be aligned.
    ///
    /// Bytes past `0xFFFF` wrap to the start of the register file.
    #[must_use]
    pub fn read_u32(&self, addr: u16) -> u32 {
        if addr % 4 == 0 {
            return self.word(addr).load(Ordering::Relaxed);
        }
        let mut bytes = [0u8; 4];
        for (offset, byte) in (0u16..).zip(bytes.iter_mut()) {
            *byte = self.read_u8(addr.wrapping_add(offset));
        }
        u32::from_le_bytes(bytes)
    }

    /// Writes a little-endian 32-bit value; `addr` need not be aligned.
    ///
    /// Bytes past `0xFFFF` wrap to the start of the register file.
    pub fn write_u32(&self, addr: u16, value: u32) {
        if addr % 4 == 0 {
            self.word(addr).store(value, Ordering::Relaxed);
            return;
        }
        for (offset, byte) in (0u16..).zip(value.to_le_bytes()) {
            self.write_u8(addr.wrapping_add(offset), byte);
        }
    }

    /// Copies `out.len()` bytes starting at `addr` into `out`.
    ///
    /// Bytes past `0xFFFF` wrap to the start of the register file.
    pub fn read_bytes(&self, addr: u16, out: &mut [u8]) {
        let mut cursor = addr;
        for chunk in out.chunks_mut(4) {
            if cursor % 4 == 0 && chunk.len() == 4 {
                chunk.copy_from_slice(&self.read_u32(cursor).to_le_bytes());
            } else {
                for (offset, byte) in (0u16..).zip(chunk.iter_mut()) {
                    *byte = self.read_u8(cursor.wrapping_add(offset));
                }
            }
            cursor = cursor.wrapping_add(4);
        }
    }

    /// Copies `data` into the register file starting at `addr`.
    ///
    /// Bytes past `0xFFFF` wrap to the start of the register file.
    pub fn write_bytes(&self, addr: u16, data: &[u8]) {
        let mut cursor = addr;
        for chunk in data.chunks(4) {
            if cursor % 4 == 0 && chunk.len() == 4 {
                self.write_u32(
                    cursor,
                    u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                );
            } else {
                for (offset, byte) in (0u16..).zip(chunk) {
                    self.write_u8(cursor.wrapping_add(offset), *byte);
                }
            }
            // A chunk is at most 4 bytes, so the cast is lossless.
            cursor = cursor.wrapping_add(chunk.len() as u16);
        }
    }

    /// Reads consecutive 32-bit words starting at `addr`.
    pub fn read_words(&self, addr: u16, words: &mut [u32]) {
        let mut cursor = addr;
        for word in words {
            *word = self.read_u32(cursor);
            cursor = cursor.wrapping_add(4);
        }
    }

    /// Writes consecutive 32-bit words starting at `addr`.
    pub fn write_words(&self, addr: u16, words: &[u32]) {
        let mut cursor = addr;
        for word in words {
            self.write_u32(cursor, *word);
            cursor = cursor.wrapping_add(4);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RegisterFile, ADDRESS_SPACE_BYTES};

    #[test]
    fn canonical_register_file_is_64kib_and_zeroed() {
        let regs = RegisterFile::new();
        assert_eq!(regs.len(), ADDRESS_SPACE_BYTES);

        let mut bytes = vec![0xFFu8; ADDRESS_SPACE_BYTES];
        regs.read_bytes(0, &mut bytes);
        assert!(bytes.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn words_are_little_endian() {
        let regs = RegisterFile::new();
        regs.write_u32(0x0100, 0x55AA_CAFE);
        assert_eq!(regs.read_u8(0x0100), 0xFE);
        assert_eq!(regs.read_u8(0x0101), 0xCA);
        assert_eq!(regs.read_u8(0x0102), 0xAA);
        assert_eq!(regs.read_u8(0x0103), 0x55);
    }

    #[test]
    fn byte_write_preserves_neighbours() {
        let regs = RegisterFile::new();
        regs.write_u32(0x0200, 0xFFFF_FFFF);
        regs.write_u8(0x0201, 0x00);
        assert_eq!(regs.read_u32(0x0200), 0xFFFF_00FF);
    }

    #[test]
    fn unaligned_word_access_spans_two_words() {
        let regs = RegisterFile::new();
        regs.write_u32(0x0102, 0x1122_3344);
        assert_eq!(regs.read_u32(0x0100), 0x3344_0000);
        assert_eq!(regs.read_u32(0x0104), 0x0000_1122);
        assert_eq!(regs.read_u32(0x0102), 0x1122_3344);
    }

    #[test]
    fn byte_ranges_roundtrip_at_any_alignment() {
        let regs = RegisterFile::new();
        let data: Vec<u8> = (1..=11).collect();
        regs.write_bytes(0x0403, &data);

        let mut out = vec![0u8; data.len()];
        regs.read_bytes(0x0403, &mut out);
        assert_eq!(out, data);
        assert_eq!(regs.read_u8(0x0402), 0);
        assert_eq!(regs.read_u8(0x040E), 0);
    }

    #[test]
    fn top_of_address_space_wraps() {
        let regs = RegisterFile::new();
        regs.write_u32(0xFFFE, 0xAABB_CCDD);
        assert_eq!(regs.read_u8(0xFFFF), 0xCC);
        assert_eq!(regs.read_u8(0x0000), 0xBB);
    }
}

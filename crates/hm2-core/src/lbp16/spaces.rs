//! Backing stores of the secondary memory spaces.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::time::Instant;

use log::info;

use crate::config::{BoardConfig, NetworkConfig};
use crate::fault::{ErrorClass, ProtocolError};

/// LBP16 protocol version reported in space 7.
pub const PROTOCOL_VERSION: u16 = 3;
/// Bytes in the EEPROM image of space 2.
pub const EEPROM_BYTES: usize = 64;
/// Words in the timer block of space 4.
pub const TIMER_WORDS: usize = 8;
/// Words in the statistics block of space 6.
pub const STAT_WORDS: usize = 16;
/// Bytes in the identity block of space 7.
pub const IDENTITY_BYTES: usize = 32;
/// Value written to the reset trigger to request a soft reset.
pub const RESET_MAGIC: u16 = 0x5A;

/// Byte-addressed store behind one secondary memory space.
///
/// Callers check bounds against [`SpaceStore::size`] before calling
/// [`SpaceStore::read`] or [`SpaceStore::write`].
pub trait SpaceStore: Send + Sync {
    /// Size of the store in bytes.
    fn size(&self) -> usize;

    /// Copies bytes starting at `offset` into `out`.
    fn read(&self, offset: usize, out: &mut [u8]);

    /// Stores `data` at `offset`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::ReadOnly`] for read-only stores.
    fn write(&self, _offset: usize, _data: &[u8]) -> Result<(), ProtocolError> {
        Err(ProtocolError::ReadOnly)
    }
}

/// Read-only image of the Ethernet EEPROM (space 2).
///
/// ```text
/// 0x00  MAC address (6)
/// 0x08  IPv4 address
/// 0x0C  netmask
/// 0x10  gateway
/// 0x14  UDP port (LE)
/// 0x18  board name (8)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EepromImage {
    bytes: [u8; EEPROM_BYTES],
}

impl EepromImage {
    /// Builds the image from network settings and the IDROM board name.
    #[must_use]
    pub fn new(network: &NetworkConfig, board_name: [u8; 8]) -> Self {
        let mut bytes = [0u8; EEPROM_BYTES];
        bytes[0x00..0x06].copy_from_slice(&network.mac);
        bytes[0x08..0x0C].copy_from_slice(&network.ip);
        bytes[0x0C..0x10].copy_from_slice(&network.netmask);
        bytes[0x10..0x14].copy_from_slice(&network.gateway);
        bytes[0x14..0x16].copy_from_slice(&network.udp_port.to_le_bytes());
        bytes[0x18..0x20].copy_from_slice(&board_name);
        Self { bytes }
    }

    /// Raw image.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; EEPROM_BYTES] {
        &self.bytes
    }
}

impl SpaceStore for EepromImage {
    fn size(&self) -> usize {
        EEPROM_BYTES
    }

    fn read(&self, offset: usize, out: &mut [u8]) {
        out.copy_from_slice(&self.bytes[offset..offset + out.len()]);
    }
}

/// Timer and scratch words (space 4).
///
/// Word 0 latches the microseconds elapsed since boot whenever a read
/// covers it; words 1..7 are scratch.
#[derive(Debug)]
pub struct TimerBlock {
    epoch: Instant,
    words: [AtomicU32; TIMER_WORDS],
}

impl Default for TimerBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerBlock {
    /// Starts the timestamp at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            words: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }

    /// Word at `index`.
    #[must_use]
    pub fn word(&self, index: usize) -> u32 {
        self.words[index].load(Ordering::Relaxed)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn latch(&self) {
        let micros = self.epoch.elapsed().as_micros() as u32;
        self.words[0].store(micros, Ordering::Relaxed);
    }
}

impl SpaceStore for TimerBlock {
    fn size(&self) -> usize {
        TIMER_WORDS * 4
    }

    fn read(&self, offset: usize, out: &mut [u8]) {
        if offset < 4 {
            self.latch();
        }
        for (index, byte) in out.iter_mut().enumerate() {
            let at = offset + index;
            *byte = self.words[at / 4].load(Ordering::Relaxed).to_le_bytes()[at % 4];
        }
    }

    fn write(&self, offset: usize, data: &[u8]) -> Result<(), ProtocolError> {
        for (index, byte) in data.iter().enumerate() {
            let at = offset + index;
            let shift = (at % 4) * 8;
            let mask = !(0xFF_u32 << shift);
            let bits = u32::from(*byte) << shift;
            let _ = self.words[at / 4].fetch_update(Ordering::Relaxed, Ordering::Relaxed, |word| {
                Some((word & mask) | bits)
            });
        }
        Ok(())
    }
}

/// Words of the statistics and control block (space 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum StatRegister {
    /// Commands dropped for framing or count errors.
    ParseErrors = 0,
    /// Commands dropped for space, width or range errors.
    MemoryErrors = 1,
    /// Commands dropped for writes to read-only storage.
    WriteErrors = 2,
    /// Request payloads received.
    RxPackets = 3,
    /// Request payloads with at least one executed command.
    RxPayloads = 4,
    /// Request payloads with at least one dropped command.
    RxBad = 5,
    /// Reply frames sent.
    TxPackets = 6,
    /// Reply frames carrying data.
    TxPayloads = 7,
    /// Replies dropped for exceeding the frame size.
    TxBad = 8,
    /// Indicator override, see [`IndicatorMode`].
    IndicatorMode = 9,
    /// Host-owned debug pointer.
    DebugPointer = 10,
    /// Host-owned scratch word.
    Scratch = 11,
    /// Reserved.
    Reserved12 = 12,
    /// EEPROM write enable; the image stays read-only.
    EepromWriteEnable = 13,
    /// Write [`RESET_MAGIC`] to request a soft reset.
    ResetTrigger = 14,
    /// Reserved.
    Reserved15 = 15,
}

impl StatRegister {
    /// Byte offset within space 6.
    #[must_use]
    pub const fn offset(self) -> u16 {
        self as u16 * 2
    }

    /// Counter bumped for a dropped command of `class`.
    #[must_use]
    pub const fn for_error(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Parse => Self::ParseErrors,
            ErrorClass::MemoryAccess => Self::MemoryErrors,
            ErrorClass::Write => Self::WriteErrors,
        }
    }
}

/// Indicator override selected through [`StatRegister::IndicatorMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum IndicatorMode {
    /// Mirror bit 31 of the status register.
    Mirror,
    /// Always on.
    ForceOn,
    /// Always off.
    ForceOff,
}

impl IndicatorMode {
    /// Mode for a register value; unknown values mirror.
    #[must_use]
    pub const fn from_word(word: u16) -> Self {
        match word {
            1 => Self::ForceOn,
            2 => Self::ForceOff,
            _ => Self::Mirror,
        }
    }
}

/// Statistics and control block (space 6).
#[derive(Debug)]
pub struct Statistics {
    words: [AtomicU16; STAT_WORDS],
    reset_requested: AtomicBool,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    /// All counters zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            words: std::array::from_fn(|_| AtomicU16::new(0)),
            reset_requested: AtomicBool::new(false),
        }
    }

    /// Current value of `register`.
    #[must_use]
    pub fn get(&self, register: StatRegister) -> u16 {
        self.words[register as usize].load(Ordering::Relaxed)
    }

    /// Overwrites `register`.
    pub fn set(&self, register: StatRegister, value: u16) {
        self.words[register as usize].store(value, Ordering::Relaxed);
    }

    /// Adds `amount` to a counter, wrapping at 16 bits.
    pub fn add(&self, register: StatRegister, amount: u16) {
        self.words[register as usize].fetch_add(amount, Ordering::Relaxed);
    }

    /// Adds one to a counter, wrapping at 16 bits.
    pub fn bump(&self, register: StatRegister) {
        self.add(register, 1);
    }

    /// Counts a dropped command.
    pub fn record_error(&self, class: ErrorClass) {
        self.bump(StatRegister::for_error(class));
    }

    /// Current indicator override.
    #[must_use]
    pub fn indicator_mode(&self) -> IndicatorMode {
        IndicatorMode::from_word(self.get(StatRegister::IndicatorMode))
    }

    /// Zeroes every word.
    pub fn clear(&self) {
        for word in &self.words {
            word.store(0, Ordering::Relaxed);
        }
    }

    /// Returns and clears a pending soft-reset request.
    pub fn take_reset_request(&self) -> bool {
        self.reset_requested.swap(false, Ordering::Relaxed)
    }

    fn check_reset_trigger(&self) {
        let trigger = &self.words[StatRegister::ResetTrigger as usize];
        if trigger
            .compare_exchange(RESET_MAGIC, 0, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            info!("soft reset requested by host");
            self.reset_requested.store(true, Ordering::Relaxed);
        }
    }
}

impl SpaceStore for Statistics {
    fn size(&self) -> usize {
        STAT_WORDS * 2
    }

    fn read(&self, offset: usize, out: &mut [u8]) {
        for (index, byte) in out.iter_mut().enumerate() {
            let at = offset + index;
            *byte = self.words[at / 2].load(Ordering::Relaxed).to_le_bytes()[at % 2];
        }
    }

    fn write(&self, offset: usize, data: &[u8]) -> Result<(), ProtocolError> {
        for (index, byte) in data.iter().enumerate() {
            let at = offset + index;
            let shift = (at % 2) * 8;
            let mask = !(0xFF_u16 << shift);
            let bits = u16::from(*byte) << shift;
            let _ = self.words[at / 2].fetch_update(Ordering::Relaxed, Ordering::Relaxed, |word| {
                Some((word & mask) | bits)
            });
        }
        self.check_reset_trigger();
        Ok(())
    }
}

/// Board identity block (space 7), read only.
///
/// ```text
/// 0x00  identity string (16)
/// 0x10  LBP16 protocol version
/// 0x12  firmware version
/// 0x14  option jumpers
/// 0x16  reserved (10)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityBlock {
    bytes: [u8; IDENTITY_BYTES],
}

impl IdentityBlock {
    /// Builds the block from board configuration.
    #[must_use]
    pub fn new(config: &BoardConfig) -> Self {
        let mut bytes = [0u8; IDENTITY_BYTES];
        bytes[0x00..0x10].copy_from_slice(&config.identity);
        bytes[0x10..0x12].copy_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        bytes[0x12..0x14].copy_from_slice(&config.firmware_version.to_le_bytes());
        Self { bytes }
    }

    /// Raw block.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; IDENTITY_BYTES] {
        &self.bytes
    }
}

impl SpaceStore for IdentityBlock {
    fn size(&self) -> usize {
        IDENTITY_BYTES
    }

    fn read(&self, offset: usize, out: &mut [u8]) {
        out.copy_from_slice(&self.bytes[offset..offset + out.len()]);
    }
}

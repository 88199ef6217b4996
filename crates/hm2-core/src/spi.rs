//! SPI command frames of the serial transport.
//!
//! The host sends a 4-byte frame, then shifts `count` 32-bit words in or out:
//!
//! ```text
//! byte 0-1  address, big-endian
//! byte 2    7..4 command (0xA read, 0xB write), 3 auto-increment
//! byte 2-3  bits 10..4 of the big-endian pair: word count
//! ```

use crate::bus::Bus;
use crate::fault::{BusError, ProtocolError};

/// Bytes in a command frame.
pub const SPI_FRAME_BYTES: usize = 4;

/// Command nibble of an SPI frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpiCommand {
    /// Read words from the board.
    Read,
    /// Write words to the board.
    Write,
    /// Any other nibble; ignored.
    Unknown(u8),
}

impl SpiCommand {
    /// Command selected by a 4-bit nibble.
    #[must_use]
    pub const fn from_nibble(nibble: u8) -> Self {
        match nibble & 0xF {
            0xA => Self::Read,
            0xB => Self::Write,
            other => Self::Unknown(other),
        }
    }

    /// 4-bit nibble of the command.
    #[must_use]
    pub const fn nibble(self) -> u8 {
        match self {
            Self::Read => 0xA,
            Self::Write => 0xB,
            Self::Unknown(other) => other & 0xF,
        }
    }
}

/// Decoded SPI command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpiFrame {
    /// Register-file address.
    pub addr: u16,
    /// Transfer direction.
    pub command: SpiCommand,
    /// Advance the address by 4 after each word.
    pub increment: bool,
    /// Number of 32-bit words, 0..=127.
    pub count: u8,
}

impl SpiFrame {
    /// Decodes a command frame.
    #[must_use]
    pub const fn decode(frame: [u8; SPI_FRAME_BYTES]) -> Self {
        let packed = ((frame[2] as u16) << 8) | frame[3] as u16;
        Self {
            addr: u16::from_be_bytes([frame[0], frame[1]]),
            command: SpiCommand::from_nibble(frame[2] >> 4),
            increment: frame[2] & 0x08 != 0,
            count: ((packed >> 4) & 0x7F) as u8,
        }
    }

    /// Encodes the command frame.
    #[must_use]
    pub const fn encode(self) -> [u8; SPI_FRAME_BYTES] {
        let [hi, lo] = self.addr.to_be_bytes();
        let increment = if self.increment { 0x08 } else { 0 };
        [
            hi,
            lo,
            (self.command.nibble() << 4) | increment | ((self.count >> 4) & 0x07),
            (self.count & 0x0F) << 4,
        ]
    }

    /// Bytes shifted after the frame.
    #[must_use]
    pub const fn data_bytes(self) -> usize {
        self.count as usize * 4
    }

    /// Runs the frame against the bus.
    ///
    /// Reads return `count` little-endian words; writes consume them from
    /// `data` and return nothing. Incrementing transfers go to the owning
    /// region as one block, others word by word at the same address. Unknown
    /// commands do nothing.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] when a write supplies too few bytes and
    /// [`ProtocolError::HandlerRejected`] when a region handler refuses.
    pub fn execute(self, bus: &Bus, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let words = usize::from(self.count);
        match self.command {
            SpiCommand::Read => {
                let mut values = vec![0u32; words];
                if self.increment {
                    bus.read_words(self.addr, &mut values).map_err(rejected)?;
                } else {
                    for value in &mut values {
                        bus.read_words(self.addr, std::slice::from_mut(value))
                            .map_err(rejected)?;
                    }
                }
                Ok(values.iter().flat_map(|value| value.to_le_bytes()).collect())
            }
            SpiCommand::Write => {
                let bytes = data
                    .get(..self.data_bytes())
                    .ok_or(ProtocolError::Truncated)?;
                let values: Vec<u32> = bytes
                    .chunks_exact(4)
                    .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
                    .collect();
                if self.increment {
                    bus.write_words(self.addr, &values).map_err(rejected)?;
                } else {
                    for value in &values {
                        bus.write_words(self.addr, std::slice::from_ref(value))
                            .map_err(rejected)?;
                    }
                }
                Ok(Vec::new())
            }
            SpiCommand::Unknown(_) => Ok(Vec::new()),
        }
    }
}

const fn rejected(_error: BusError) -> ProtocolError {
    ProtocolError::HandlerRejected
}

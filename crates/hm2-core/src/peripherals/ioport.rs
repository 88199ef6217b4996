//! HostMot2 I/O port module.
//!
//! Five registers per instance, `REGISTER_STRIDE` bytes apart, one word per
//! instance:
//!
//! ```text
//! 0x1000  data         writes set outputs, reads return pin levels
//! 0x1100  DDR          1 = output
//! 0x1200  alt source   1 = pin owned by a secondary function
//! 0x1300  open drain   1 = open drain output, DDR ignored
//! 0x1400  invert       1 = invert the driven value
//! ```
//!
//! Host pin `n` lives in word `n / port_width`, bit `n % port_width`, and is
//! wired to the `n`-th available GPIO line.

use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use crate::bus::RegionHandler;
use crate::config::BoardConfig;
use crate::fault::BusError;

/// Bytes between two registers of the module.
pub const REGISTER_STRIDE: u16 = 0x100;
/// Registers per instance.
pub const IOPORT_REGISTERS: usize = 5;
/// Size of the module's register block in bytes.
pub const IOPORT_BYTES: u32 = REGISTER_STRIDE as u32 * IOPORT_REGISTERS as u32;

/// Electrical direction of one GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// High impedance input.
    Input,
    /// Driven output.
    Output,
}

/// GPIO lines of the host controller.
pub trait GpioPins: Send + Sync {
    /// Configures the direction of `line`.
    fn set_direction(&self, line: u8, direction: Direction);

    /// Drives the lines selected by `mask` to the matching bits of `levels`.
    fn put_masked(&self, mask: u64, levels: u64);

    /// Current level of every line, bit `n` = line `n`.
    fn get_all(&self) -> u64;
}

impl<T: GpioPins + ?Sized> GpioPins for Arc<T> {
    fn set_direction(&self, line: u8, direction: Direction) {
        (**self).set_direction(line, direction);
    }

    fn put_masked(&self, mask: u64, levels: u64) {
        (**self).put_masked(mask, levels);
    }

    fn get_all(&self) -> u64 {
        (**self).get_all()
    }
}

/// Registers of one I/O port instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IoPortRegister {
    /// Output value on write, pin levels on read.
    Data = 0,
    /// Data direction.
    Ddr = 1,
    /// Alternate source select.
    AltSource = 2,
    /// Open drain select.
    OpenDrain = 3,
    /// Output invert.
    OutputInvert = 4,
}

impl IoPortRegister {
    /// Register for a stride index.
    #[must_use]
    pub const fn from_index(index: u16) -> Option<Self> {
        match index {
            0 => Some(Self::Data),
            1 => Some(Self::Ddr),
            2 => Some(Self::AltSource),
            3 => Some(Self::OpenDrain),
            4 => Some(Self::OutputInvert),
            _ => None,
        }
    }

    /// Region-local byte offset of `instance`.
    #[must_use]
    pub const fn offset(self, instance: u16) -> u16 {
        self as u16 * REGISTER_STRIDE + instance * 4
    }
}

#[derive(Debug)]
struct PortState {
    registers: [Vec<u32>; IOPORT_REGISTERS],
}

impl PortState {
    fn get(&self, register: IoPortRegister, word: usize, bit: u32) -> bool {
        self.registers[register as usize][word] & bit != 0
    }
}

/// Region handler for the I/O port block.
pub struct IoPort {
    pins: Box<dyn GpioPins>,
    lines: Vec<u8>,
    port_width: usize,
    words: usize,
    state: Mutex<PortState>,
}

impl std::fmt::Debug for IoPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoPort")
            .field("lines", &self.lines)
            .field("port_width", &self.port_width)
            .field("words", &self.words)
            .finish_non_exhaustive()
    }
}

impl IoPort {
    /// Wires the configured pins to `pins`, all as inputs.
    pub fn new(config: &BoardConfig, pins: impl GpioPins + 'static) -> Self {
        let port_width = config.port_width.min(32) as usize;
        let words = config.ioport_words() as usize;
        let lines: Vec<u8> = if port_width == 0 {
            Vec::new()
        } else {
            (0u8..64)
                .filter(|line| config.lines_available & (1 << line) != 0)
                .take(config.io_width as usize)
                .collect()
        };

        for line in &lines {
            debug!("initializing GPIO{line} as input");
            pins.set_direction(*line, Direction::Input);
        }

        Self {
            pins: Box::new(pins),
            lines,
            port_width,
            words,
            state: Mutex::new(PortState {
                registers: std::array::from_fn(|_| vec![0; words]),
            }),
        }
    }

    /// GPIO line of each host pin.
    #[must_use]
    pub fn lines(&self) -> &[u8] {
        &self.lines
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PortState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn locate(&self, offset: usize) -> Result<(IoPortRegister, usize), BusError> {
        if offset % 4 != 0 {
            return Err(BusError::Rejected);
        }
        let stride = usize::from(REGISTER_STRIDE);
        let register = u16::try_from(offset / stride)
            .ok()
            .and_then(IoPortRegister::from_index)
            .ok_or(BusError::Rejected)?;
        let word = (offset % stride) / 4;
        if word >= self.words {
            return Err(BusError::Rejected);
        }
        Ok((register, word))
    }

    fn targets(
        &self,
        offset: u16,
        count: usize,
    ) -> Result<Vec<(IoPortRegister, usize)>, BusError> {
        (0..count)
            .map(|index| self.locate(usize::from(offset) + index * 4))
            .collect()
    }

    fn position(&self, pin: usize) -> (usize, u32) {
        (pin / self.port_width, 1 << (pin % self.port_width))
    }

    fn apply(&self, state: &PortState) {
        let mut mask = 0u64;
        let mut levels = 0u64;

        for (pin, line) in self.lines.iter().enumerate() {
            let (word, bit) = self.position(pin);
            if word >= self.words {
                break;
            }
            let level = state.get(IoPortRegister::Data, word, bit)
                ^ state.get(IoPortRegister::OutputInvert, word, bit);

            let direction = if state.get(IoPortRegister::AltSource, word, bit) {
                Direction::Input
            } else if state.get(IoPortRegister::OpenDrain, word, bit) {
                if level {
                    Direction::Input
                } else {
                    Direction::Output
                }
            } else if state.get(IoPortRegister::Ddr, word, bit) {
                Direction::Output
            } else {
                Direction::Input
            };

            self.pins.set_direction(*line, direction);
            if direction == Direction::Output {
                mask |= 1 << line;
                if level {
                    levels |= 1 << line;
                }
            }
        }

        self.pins.put_masked(mask, levels);
    }

    fn pin_levels(&self, word: usize) -> u32 {
        let levels = self.pins.get_all();
        self.lines
            .iter()
            .enumerate()
            .filter(|(pin, line)| self.position(*pin).0 == word && levels & (1 << **line) != 0)
            .fold(0, |value, (pin, _)| value | self.position(pin).1)
    }
}

impl RegionHandler for IoPort {
    fn read(&self, offset: u16, words: &mut [u32]) -> Result<(), BusError> {
        let targets = self.targets(offset, words.len())?;
        let state = self.lock();
        for (out, (register, word)) in words.iter_mut().zip(targets) {
            *out = match register {
                IoPortRegister::Data => self.pin_levels(word),
                other => state.registers[other as usize][word],
            };
        }
        Ok(())
    }

    fn write(&self, offset: u16, words: &[u32]) -> Result<(), BusError> {
        let targets = self.targets(offset, words.len())?;
        let mut state = self.lock();
        for (value, (register, word)) in words.iter().zip(targets) {
            state.registers[register as usize][word] = *value;
        }
        self.apply(&state);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SimulatedLines {
    outputs: u64,
    driven: u64,
    inputs: u64,
}

/// In-memory GPIO lines for the simulator and tests.
///
/// Output lines read back their driven level; input lines read the level
/// set with [`SimulatedPins::set_input`].
#[derive(Debug, Default)]
pub struct SimulatedPins {
    lines: Mutex<SimulatedLines>,
}

impl SimulatedPins {
    /// All lines inputs, all levels low.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatedLines> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the externally applied level of `line`.
    pub fn set_input(&self, line: u8, high: bool) {
        let mut lines = self.lock();
        if high {
            lines.inputs |= 1 << line;
        } else {
            lines.inputs &= !(1 << line);
        }
    }

    /// Configured direction of `line`.
    #[must_use]
    pub fn direction(&self, line: u8) -> Direction {
        if self.lock().outputs & (1 << line) != 0 {
            Direction::Output
        } else {
            Direction::Input
        }
    }

    /// Level driven on `line`, `None` while it is an input.
    #[must_use]
    pub fn driven(&self, line: u8) -> Option<bool> {
        let lines = self.lock();
        (lines.outputs & (1 << line) != 0).then_some(lines.driven & (1 << line) != 0)
    }
}

impl GpioPins for SimulatedPins {
    fn set_direction(&self, line: u8, direction: Direction) {
        let mut lines = self.lock();
        match direction {
            Direction::Output => lines.outputs |= 1 << line,
            Direction::Input => lines.outputs &= !(1 << line),
        }
    }

    fn put_masked(&self, mask: u64, levels: u64) {
        let mut lines = self.lock();
        lines.driven = (lines.driven & !mask) | (levels & mask);
    }

    fn get_all(&self) -> u64 {
        let lines = self.lock();
        (lines.driven & lines.outputs) | (lines.inputs & !lines.outputs)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::{Direction, IoPort, IoPortRegister, SimulatedPins};
    use crate::bus::RegionHandler;
    use crate::config::BoardConfig;
    use crate::fault::BusError;

    fn port() -> (IoPort, Arc<SimulatedPins>) {
        let pins = Arc::new(SimulatedPins::new());
        (IoPort::new(&BoardConfig::default(), Arc::clone(&pins)), pins)
    }

    #[test]
    fn pins_map_onto_available_lines() {
        let (port, _) = port();
        let expected: Vec<u8> = (0..16).chain([22, 26, 27, 28]).collect();
        assert_eq!(port.lines(), expected.as_slice());
    }

    #[test]
    fn ddr_and_data_drive_outputs() {
        let (port, pins) = port();
        port.write(IoPortRegister::Ddr.offset(0), &[0b11]).expect("ddr");
        port.write(IoPortRegister::Data.offset(0), &[0b01]).expect("data");

        assert_eq!(pins.direction(0), Direction::Output);
        assert_eq!(pins.driven(0), Some(true));
        assert_eq!(pins.driven(1), Some(false));
        assert_eq!(pins.driven(2), None);
    }

    #[test]
    fn host_pin_sixteen_is_line_twenty_two() {
        let (port, pins) = port();
        port.write(IoPortRegister::Ddr.offset(0), &[1 << 16]).expect("ddr");
        port.write(IoPortRegister::Data.offset(0), &[1 << 16]).expect("data");
        assert_eq!(pins.driven(22), Some(true));
        assert_eq!(pins.direction(16), Direction::Input);
    }

    #[test]
    fn invert_applies_to_outputs_only() {
        let (port, pins) = port();
        port.write(IoPortRegister::OutputInvert.offset(0), &[0b11]).expect("invert");
        port.write(IoPortRegister::Ddr.offset(0), &[0b01]).expect("ddr");
        assert_eq!(pins.driven(0), Some(true));

        pins.set_input(1, true);
        let mut levels = [0u32];
        port.read(IoPortRegister::Data.offset(0), &mut levels).expect("data");
        assert_eq!(levels[0], 0b11);
    }

    #[test]
    fn open_drain_floats_high_and_drives_low() {
        let (port, pins) = port();
        port.write(IoPortRegister::OpenDrain.offset(0), &[0b1]).expect("od");
        assert_eq!(pins.driven(0), Some(false));

        port.write(IoPortRegister::Data.offset(0), &[0b1]).expect("data");
        assert_eq!(pins.direction(0), Direction::Input);
    }

    #[test]
    fn alt_source_releases_pin() {
        let (port, pins) = port();
        port.write(IoPortRegister::Ddr.offset(0), &[0b1]).expect("ddr");
        port.write(IoPortRegister::AltSource.offset(0), &[0b1]).expect("alt");
        assert_eq!(pins.direction(0), Direction::Input);
    }

    #[test]
    fn configuration_registers_read_back() {
        let (port, _) = port();
        port.write(IoPortRegister::Ddr.offset(0), &[0x000F_0F0F]).expect("ddr");
        let mut value = [0u32];
        port.read(IoPortRegister::Ddr.offset(0), &mut value).expect("ddr");
        assert_eq!(value, [0x000F_0F0F]);
    }

    #[rstest]
    #[case::second_instance(IoPortRegister::Data.offset(1))]
    #[case::unaligned(0x0102)]
    #[case::past_last_register(0x0500)]
    fn unserved_offsets_are_rejected(#[case] offset: u16) {
        let (port, pins) = port();
        assert_eq!(port.write(offset, &[0xFFFF_FFFF]), Err(BusError::Rejected));
        let mut value = [0u32];
        assert_eq!(port.read(offset, &mut value), Err(BusError::Rejected));
        assert_eq!(pins.direction(0), Direction::Input);
    }
}

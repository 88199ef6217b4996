//! Memory-space dispatcher: executes LBP16 request payloads.
//!
//! A payload holds any number of back-to-back commands. Each command is
//! framed, validated and executed in order; a command that fails validation
//! is dropped without side effects and counted in space 6, and processing
//! continues with the next one. Only a framing failure ends the payload.

use std::ops::Range;
use std::sync::Arc;

use log::debug;

use crate::bus::Bus;
use crate::config::BoardConfig;
use crate::fault::{BusError, ProtocolError};
use crate::lbp16::info::{InfoArea, InfoAreaTable, INFO_AREA_BYTES};
use crate::lbp16::spaces::{
    EepromImage, IdentityBlock, SpaceStore, StatRegister, Statistics, TimerBlock,
};
use crate::lbp16::{Lbp16Command, MemorySpace, TransferSize};

/// Largest reply frame the transport sends.
pub const MAX_REPLY_FRAME: usize = 1400;

/// One command cut out of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Framed<'a> {
    command: Lbp16Command,
    addr: Option<u16>,
    data: &'a [u8],
    len: usize,
}

impl<'a> Framed<'a> {
    fn parse(rest: &'a [u8]) -> Result<Self, ProtocolError> {
        let [lo, hi, tail @ ..] = rest else {
            return Err(ProtocolError::Truncated);
        };
        let command = Lbp16Command::decode(u16::from_le_bytes([*lo, *hi]));

        let (addr, tail) = if command.has_addr {
            let [lo, hi, tail @ ..] = tail else {
                return Err(ProtocolError::Truncated);
            };
            (Some(u16::from_le_bytes([*lo, *hi])), tail)
        } else {
            (None, tail)
        };

        let data_len = if command.write {
            command.num_bytes()
        } else {
            0
        };
        let data = tail.get(..data_len).ok_or(ProtocolError::Truncated)?;

        Ok(Self {
            command,
            addr,
            data,
            len: command.header_bytes() + data_len,
        })
    }
}

/// Routes commands to the register bus, the info areas and the secondary
/// spaces.
#[derive(Debug)]
pub struct Dispatcher {
    bus: Bus,
    info: InfoAreaTable,
    eeprom: EepromImage,
    timers: TimerBlock,
    stats: Arc<Statistics>,
    identity: IdentityBlock,
    frame_limit: usize,
}

impl Dispatcher {
    /// Builds the dispatcher for `config`; `stats` is shared with the
    /// indicator.
    #[must_use]
    pub fn new(bus: Bus, config: &BoardConfig, stats: Arc<Statistics>) -> Self {
        Self {
            bus,
            info: InfoAreaTable::new(),
            eeprom: EepromImage::new(&config.network, config.board_name),
            timers: TimerBlock::new(),
            stats,
            identity: IdentityBlock::new(config),
            frame_limit: MAX_REPLY_FRAME,
        }
    }

    /// Overrides the reply frame size.
    #[must_use]
    pub const fn with_frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = limit;
        self
    }

    /// Register bus behind space 0.
    #[must_use]
    pub const fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Info areas of all spaces.
    #[must_use]
    pub const fn info_areas(&self) -> &InfoAreaTable {
        &self.info
    }

    /// Statistics and control block.
    #[must_use]
    pub const fn statistics(&self) -> &Arc<Statistics> {
        &self.stats
    }

    /// Clears statistics and address pointers.
    pub fn soft_reset(&self) {
        self.stats.clear();
        self.info.reset_pointers();
    }

    /// Performs and reports a soft reset the host requested through space 6.
    pub fn take_reset_request(&self) -> bool {
        if self.stats.take_reset_request() {
            self.soft_reset();
            return true;
        }
        false
    }

    /// Executes every command in `payload` and returns the reply frames.
    ///
    /// Reads append their data to the current frame; a new frame starts when
    /// the next command's data would overflow it. Writes produce no reply
    /// bytes, so a write-only payload yields no frames.
    pub fn deliver(&self, payload: &[u8]) -> Vec<Vec<u8>> {
        self.stats.bump(StatRegister::RxPackets);

        let mut frames = Vec::new();
        let mut current = Vec::new();
        let mut executed = false;
        let mut dropped = false;
        let mut rest = payload;

        while !rest.is_empty() {
            let outcome = match Framed::parse(rest) {
                Ok(framed) => {
                    rest = &rest[framed.len..];
                    self.execute(framed.command, framed.addr, framed.data)
                        .map_err(|error| (error, framed.len))
                }
                Err(error) => Err((error, rest.len())),
            };

            match outcome {
                Ok(reply) => {
                    executed = true;
                    if reply.is_empty() {
                        continue;
                    }
                    if current.len() + reply.len() > self.frame_limit {
                        frames.push(std::mem::take(&mut current));
                    }
                    current.extend_from_slice(&reply);
                }
                Err((error, bytes)) => {
                    self.drop_command(error, bytes);
                    dropped = true;
                    if error.ends_payload() {
                        break;
                    }
                }
            }
        }

        if !current.is_empty() {
            frames.push(current);
        }
        if executed {
            self.stats.bump(StatRegister::RxPayloads);
        }
        if dropped {
            self.stats.bump(StatRegister::RxBad);
        }
        for _ in &frames {
            self.stats.bump(StatRegister::TxPackets);
            self.stats.bump(StatRegister::TxPayloads);
        }
        frames
    }

    fn drop_command(&self, error: ProtocolError, bytes: usize) {
        debug!("dropping LBP16 command ({bytes} bytes): {error}");
        self.stats.record_error(error.class());
        if error == ProtocolError::ReplyOverflow {
            self.stats.bump(StatRegister::TxBad);
        }
    }

    /// Executes one decoded command and returns its reply bytes.
    ///
    /// `addr` is the command's address word, if it carried one; without it
    /// data commands start at the space's address pointer and info-area
    /// commands at offset 0. `data` holds the write payload.
    ///
    /// # Errors
    ///
    /// Returns the [`ProtocolError`] that caused the command to be dropped.
    /// Validation happens before any state changes.
    pub fn execute(
        &self,
        command: Lbp16Command,
        addr: Option<u16>,
        data: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        if !command.is_valid() {
            return Err(ProtocolError::InvalidTransferCount);
        }
        if command.write && data.len() < command.num_bytes() {
            return Err(ProtocolError::Truncated);
        }
        if !command.write && command.num_bytes() > self.frame_limit {
            return Err(ProtocolError::ReplyOverflow);
        }
        let data = if command.write {
            &data[..command.num_bytes()]
        } else {
            &[]
        };

        if command.info_area {
            return self.execute_info(command, addr.unwrap_or(0), data);
        }
        if !command.space.is_supported() {
            return Err(ProtocolError::UnsupportedSpace);
        }

        let area = self.info.get(command.space);
        let addr = addr.unwrap_or_else(|| area.address_pointer());
        if command.write && !area.is_writable() {
            return Err(ProtocolError::ReadOnly);
        }
        if usize::from(addr) + command.span_bytes() > area.data_bytes() {
            return Err(ProtocolError::OutOfRange);
        }

        let reply = match command.space {
            MemorySpace::HostMot2 => self.execute_registers(command, addr, data)?,
            MemorySpace::Eeprom => transfer(&self.eeprom, command, addr, data)?,
            MemorySpace::Timers => transfer(&self.timers, command, addr, data)?,
            MemorySpace::Statistics => transfer(self.stats.as_ref(), command, addr, data)?,
            MemorySpace::Identity => transfer(&self.identity, command, addr, data)?,
            MemorySpace::Unused1 | MemorySpace::Unused3 | MemorySpace::Reserved5 => {
                return Err(ProtocolError::UnsupportedSpace);
            }
        };

        if command.increment {
            let next = (usize::from(addr) + command.num_bytes()) % area.data_bytes();
            area.set_address_pointer(u16::try_from(next).unwrap_or(0));
        }
        Ok(reply)
    }

    fn execute_info(
        &self,
        command: Lbp16Command,
        addr: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        if command.space == MemorySpace::Reserved5 {
            return Err(ProtocolError::ReservedInfoArea);
        }
        if command.size != TransferSize::Bits16 {
            return Err(ProtocolError::InfoAreaWidth);
        }

        let area = self.info.get(command.space);
        let base = usize::from(addr);
        if base + command.span_bytes() > INFO_AREA_BYTES {
            return Err(ProtocolError::OutOfRange);
        }

        let unit = usize::from(command.transfer_bytes());
        if command.write {
            if !command
                .unit_offsets()
                .all(|offset| InfoArea::accepts_write(base + offset, unit))
            {
                return Err(ProtocolError::ReadOnly);
            }
            for (offset, chunk) in command.unit_offsets().zip(data.chunks_exact(unit)) {
                area.write(base + offset, chunk)?;
            }
            return Ok(Vec::new());
        }

        let mut reply = vec![0u8; command.num_bytes()];
        for (offset, chunk) in command.unit_offsets().zip(reply.chunks_exact_mut(unit)) {
            area.read(base + offset, chunk)?;
        }
        Ok(reply)
    }

    /// Space 0. Word-aligned 32- and 64-bit units go through the region
    /// handlers, as one transfer when incrementing and unit by unit
    /// otherwise. Narrower or unaligned units inside a region read the
    /// containing words through its handler and write them back merged;
    /// elsewhere they access the register file bytes directly.
    fn execute_registers(
        &self,
        command: Lbp16Command,
        addr: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let unit = usize::from(command.transfer_bytes());
        let through_bus = unit >= 4 && addr % 4 == 0;
        let transfers: Vec<(usize, Range<usize>)> = if through_bus && command.increment {
            vec![(0, 0..command.num_bytes())]
        } else {
            command
                .unit_offsets()
                .enumerate()
                .map(|(index, offset)| (offset, index * unit..(index + 1) * unit))
                .collect()
        };

        let mut reply = if command.write {
            Vec::new()
        } else {
            vec![0u8; command.num_bytes()]
        };

        for (offset, bytes) in transfers {
            let at = u16::try_from(usize::from(addr) + offset)
                .map_err(|_| ProtocolError::OutOfRange)?;
            if command.write {
                let chunk = &data[bytes];
                if through_bus {
                    let words: Vec<u32> = chunk
                        .chunks_exact(4)
                        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
                        .collect();
                    self.bus.write_words(at, &words).map_err(rejected)?;
                } else {
                    self.write_narrow(at, chunk)?;
                }
            } else {
                let chunk = &mut reply[bytes];
                if through_bus {
                    let mut words = vec![0u32; chunk.len() / 4];
                    self.bus.read_words(at, &mut words).map_err(rejected)?;
                    for (out, word) in chunk.chunks_exact_mut(4).zip(words) {
                        out.copy_from_slice(&word.to_le_bytes());
                    }
                } else {
                    self.read_narrow(at, chunk)?;
                }
            }
        }
        Ok(reply)
    }

    /// Containing aligned words of `[at, at + len)` when a region owns them.
    fn owned_window(&self, at: u16, len: usize) -> Option<(u16, usize, usize)> {
        let start = usize::from(at) & !3;
        let end = (usize::from(at) + len).next_multiple_of(4);
        let base = u16::try_from(start).ok()?;
        let span = u32::try_from(end - start).ok()?;
        self.bus.regions().resolve(base, span)?;
        Some((base, usize::from(at) - start, (end - start) / 4))
    }

    fn read_narrow(&self, at: u16, out: &mut [u8]) -> Result<(), ProtocolError> {
        let Some((base, skip, count)) = self.owned_window(at, out.len()) else {
            self.bus.registers().read_bytes(at, out);
            return Ok(());
        };
        let mut words = vec![0u32; count];
        self.bus.read_words(base, &mut words).map_err(rejected)?;
        let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        out.copy_from_slice(&bytes[skip..skip + out.len()]);
        Ok(())
    }

    fn write_narrow(&self, at: u16, chunk: &[u8]) -> Result<(), ProtocolError> {
        let Some((base, skip, count)) = self.owned_window(at, chunk.len()) else {
            self.bus.registers().write_bytes(at, chunk);
            return Ok(());
        };
        let mut words = vec![0u32; count];
        self.bus.read_words(base, &mut words).map_err(rejected)?;
        let mut bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        bytes[skip..skip + chunk.len()].copy_from_slice(chunk);
        let merged: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
            .collect();
        self.bus.write_words(base, &merged).map_err(rejected)
    }
}

fn rejected(error: BusError) -> ProtocolError {
    debug!("region handler refused access: {error}");
    ProtocolError::HandlerRejected
}

fn transfer(
    store: &dyn SpaceStore,
    command: Lbp16Command,
    addr: u16,
    data: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let unit = usize::from(command.transfer_bytes());
    let base = usize::from(addr);
    if base + command.span_bytes() > store.size() {
        return Err(ProtocolError::OutOfRange);
    }

    if command.write {
        for (offset, chunk) in command.unit_offsets().zip(data.chunks_exact(unit)) {
            store.write(base + offset, chunk)?;
        }
        return Ok(Vec::new());
    }

    let mut reply = vec![0u8; command.num_bytes()];
    for (offset, chunk) in command.unit_offsets().zip(reply.chunks_exact_mut(unit)) {
        store.read(base + offset, chunk);
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Dispatcher, Framed};
    use crate::bus::{Bus, RegionTable};
    use crate::config::BoardConfig;
    use crate::fault::ProtocolError;
    use crate::lbp16::spaces::{StatRegister, Statistics};
    use crate::lbp16::{Lbp16Command, MemorySpace};
    use crate::memory::RegisterFile;

    fn dispatcher() -> Dispatcher {
        let bus = Bus::new(Arc::new(RegisterFile::new()), Arc::new(RegionTable::new()));
        Dispatcher::new(bus, &BoardConfig::default(), Arc::new(Statistics::new()))
    }

    #[test]
    fn framing_reads_optional_address_and_write_data() {
        let framed = Framed::parse(&[0x01, 0xC2, 0x00, 0x02, 1, 2, 3, 4, 0xFF]).expect("frame");
        assert_eq!(framed.addr, Some(0x0200));
        assert_eq!(framed.data, &[1, 2, 3, 4]);
        assert_eq!(framed.len, 8);

        assert_eq!(Framed::parse(&[0x01]), Err(ProtocolError::Truncated));
        assert_eq!(Framed::parse(&[0x01, 0xC2, 0x00]), Err(ProtocolError::Truncated));
        assert_eq!(
            Framed::parse(&[0x01, 0xC2, 0x00, 0x02, 1, 2]),
            Err(ProtocolError::Truncated)
        );
    }

    #[test]
    fn incrementing_command_advances_address_pointer() {
        let dispatcher = dispatcher();
        let write = Lbp16Command::decode(0xC282);
        dispatcher
            .execute(write, Some(0x3000), &[0; 8])
            .expect("write");
        assert_eq!(
            dispatcher
                .info_areas()
                .get(MemorySpace::HostMot2)
                .address_pointer(),
            0x3008
        );

        let fixed = Lbp16Command::decode(0xC202);
        dispatcher
            .execute(fixed, Some(0x4000), &[0; 8])
            .expect("write");
        assert_eq!(
            dispatcher
                .info_areas()
                .get(MemorySpace::HostMot2)
                .address_pointer(),
            0x3008
        );
    }

    #[test]
    fn read_only_spaces_reject_writes() {
        let dispatcher = dispatcher();
        let eeprom = Lbp16Command::decode(0xC901);
        assert_eq!(
            dispatcher.execute(eeprom, Some(0), &[0, 0]),
            Err(ProtocolError::ReadOnly)
        );
        assert_eq!(
            dispatcher.statistics().get(StatRegister::WriteErrors),
            0,
            "direct execute does not count"
        );
    }

    #[test]
    fn oversized_reads_are_dropped_and_counted() {
        let dispatcher = dispatcher().with_frame_limit(16);
        let read = Lbp16Command::decode(0x4285);
        let frames = dispatcher.deliver(&read.to_wire(0x0000, &[]));
        assert!(frames.is_empty());
        assert_eq!(dispatcher.statistics().get(StatRegister::TxBad), 1);
        assert_eq!(dispatcher.statistics().get(StatRegister::MemoryErrors), 1);
    }

    #[test]
    fn replies_split_between_commands() {
        let dispatcher = dispatcher().with_frame_limit(12);
        let read = Lbp16Command::decode(0x4282);
        let mut payload = read.to_wire(0x0000, &[]);
        payload.extend(read.to_wire(0x0008, &[]));
        let frames = dispatcher.deliver(&payload);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|frame| frame.len() == 8));
        assert_eq!(dispatcher.statistics().get(StatRegister::TxPackets), 2);
    }

    #[test]
    fn narrow_writes_to_plain_memory_keep_neighbouring_bytes() {
        let dispatcher = dispatcher();
        dispatcher.bus().registers().write_u32(0x3000, 0x4433_2211);

        let half = Lbp16Command::decode(0xC181);
        dispatcher
            .execute(half, Some(0x3001), &[0xAA, 0xBB])
            .expect("unaligned half write");
        assert_eq!(dispatcher.bus().registers().read_u32(0x3000), 0x44BB_AA11);
    }

    #[test]
    fn only_framing_failures_stop_the_payload() {
        let dispatcher = dispatcher();
        let write = Lbp16Command::decode(0xC281);
        let mut payload = Lbp16Command::decode(0xC280).to_wire(0x3000, &[]);
        payload.extend(write.to_wire(0x3000, &[1, 2, 3, 4]));
        payload.extend([0x81, 0xC2, 0x04]);
        payload.extend(write.to_wire(0x3004, &[5, 6, 7, 8]));

        assert!(dispatcher.deliver(&payload).is_empty());
        assert_eq!(dispatcher.bus().registers().read_u32(0x3000), 0x0403_0201);
        assert_eq!(dispatcher.bus().registers().read_u32(0x3004), 0);
        assert_eq!(dispatcher.statistics().get(StatRegister::ParseErrors), 2);
        assert_eq!(dispatcher.statistics().get(StatRegister::RxBad), 1);
    }
}

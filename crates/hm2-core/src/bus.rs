//! Region table and register bus routing.
//!
//! Subsystems claim sub-ranges of the 64 KiB register file at boot. Bus
//! accesses resolve to the first registered region that fully contains the
//! accessed range; that region's handler runs with a region-local offset.
//! Ranges with no region, or regions without a handler for the requested
//! direction, behave as plain memory.

use std::sync::Arc;

use log::{info, warn};

use crate::fault::{BusError, RegistrationError};
use crate::memory::{RegisterFile, ADDRESS_SPACE_BYTES};

/// Maximum number of regions a table accepts.
pub const MAX_REGIONS: usize = 8;

/// Optional per-region behavior.
///
/// Every method has a default meaning "not implemented": `update` does
/// nothing, `read` and `write` report [`BusError::NoHandler`] so the access
/// falls back to the register file.
pub trait RegionHandler: Send + Sync {
    /// Periodic processing, called once per update-scheduler pass.
    fn update(&self, _regs: &RegisterFile) {}

    /// Serves a read of `words.len()` words at region-local byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoHandler`] when the region has no read logic, or
    /// [`BusError::Rejected`] when the offset is not served.
    fn read(&self, _offset: u16, _words: &mut [u32]) -> Result<(), BusError> {
        Err(BusError::NoHandler)
    }

    /// Serves a write of `words` at region-local byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoHandler`] when the region has no write logic, or
    /// [`BusError::Rejected`] when the offset is not served.
    fn write(&self, _offset: u16, _words: &[u32]) -> Result<(), BusError> {
        Err(BusError::NoHandler)
    }
}

impl<T: RegionHandler + ?Sized> RegionHandler for Arc<T> {
    fn update(&self, regs: &RegisterFile) {
        (**self).update(regs);
    }

    fn read(&self, offset: u16, words: &mut [u32]) -> Result<(), BusError> {
        (**self).read(offset, words)
    }

    fn write(&self, offset: u16, words: &[u32]) -> Result<(), BusError> {
        (**self).write(offset, words)
    }
}

/// Region with no behavior; claims an address range as plain memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainRegion;

impl RegionHandler for PlainRegion {}

/// One registered owner of an address range.
pub struct Region {
    name: &'static str,
    base: u16,
    size: u32,
    handler: Box<dyn RegionHandler>,
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("base", &format_args!("{:#06x}", self.base))
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl Region {
    /// Region name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// First address owned by the region.
    #[must_use]
    pub const fn base(&self) -> u16 {
        self.base
    }

    /// Length of the region in bytes.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// One past the last owned address.
    #[must_use]
    pub const fn end(&self) -> u32 {
        (self.base as u32).saturating_add(self.size)
    }

    /// Returns `true` when `[addr, addr + len)` lies entirely inside the region.
    ///
    /// The end comparison is inclusive: a transfer whose last byte is the
    /// region's last byte is contained.
    #[must_use]
    pub const fn contains(&self, addr: u16, len: u32) -> bool {
        let start = addr as u32;
        start >= self.base as u32 && start.saturating_add(len) <= self.end()
    }
}

/// Handle returned by [`RegionTable::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionHandle {
    index: usize,
    base: u16,
    size: u32,
}

impl RegionHandle {
    /// Position of the region in registration order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }

    /// Base address of the region.
    #[must_use]
    pub const fn base(self) -> u16 {
        self.base
    }

    /// Length of the region in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        self.size
    }

    /// Direct view of the region's bytes, bypassing its handlers.
    #[must_use]
    pub const fn view(self, regs: &RegisterFile) -> RegionView<'_> {
        RegionView {
            regs,
            base: self.base,
            size: self.size,
        }
    }
}

/// Raw access to one region's slice of the register file.
#[derive(Debug, Clone, Copy)]
pub struct RegionView<'a> {
    regs: &'a RegisterFile,
    base: u16,
    size: u32,
}

impl RegionView<'_> {
    fn absolute(&self, offset: u16, len: u32) -> Result<u16, BusError> {
        if u32::from(offset) + len > self.size {
            return Err(BusError::Unmapped);
        }
        Ok(self.base.wrapping_add(offset))
    }

    /// Reads the word at region-local `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] when the word is outside the region.
    pub fn read_u32(&self, offset: u16) -> Result<u32, BusError> {
        let addr = self.absolute(offset, 4)?;
        Ok(self.regs.read_u32(addr))
    }

    /// Writes the word at region-local `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] when the word is outside the region.
    pub fn write_u32(&self, offset: u16, value: u32) -> Result<(), BusError> {
        let addr = self.absolute(offset, 4)?;
        self.regs.write_u32(addr, value);
        Ok(())
    }
}

/// Ordered, fixed-capacity table of regions.
#[derive(Debug, Default)]
pub struct RegionTable {
    regions: Vec<Region>,
}

impl RegionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regions: Vec::with_capacity(MAX_REGIONS),
        }
    }

    /// Appends a region.
    ///
    /// Overlapping or out-of-bounds regions are accepted with a warning;
    /// lookups resolve overlaps in favor of the earlier registration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::TableFull`] once [`MAX_REGIONS`] regions
    /// are registered.
    pub fn register(
        &mut self,
        name: &'static str,
        base: u16,
        size: u32,
        handler: impl RegionHandler + 'static,
    ) -> Result<RegionHandle, RegistrationError> {
        if self.regions.len() >= MAX_REGIONS {
            warn!("failed to register region {name}: table is full");
            return Err(RegistrationError::TableFull {
                capacity: MAX_REGIONS,
            });
        }

        let index = self.regions.len();
        info!("registering region {index} ({name}): addr={base:#06x}, size={size}");

        let region = Region {
            name,
            base,
            size,
            handler: Box::new(handler),
        };
        if region.end() > ADDRESS_SPACE_BYTES as u32 {
            warn!("region {name} extends past the end of the register file");
        }
        if let Some(other) = self
            .regions
            .iter()
            .find(|other| u32::from(base) < other.end() && u32::from(other.base) < region.end())
        {
            warn!("region {name} overlaps region {}", other.name);
        }
        self.regions.push(region);

        Ok(RegionHandle { index, base, size })
    }

    /// Number of registered regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` when no region is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Regions in registration order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// First region fully containing `[addr, addr + len)`.
    #[must_use]
    pub fn resolve(&self, addr: u16, len: u32) -> Option<&Region> {
        self.regions.iter().find(|region| region.contains(addr, len))
    }

    /// Routes a word read to the owning region's read handler.
    ///
    /// # Errors
    ///
    /// [`BusError::Unmapped`] when no region contains the range,
    /// [`BusError::NoHandler`] when the owner has no read handler, or the
    /// handler's own error.
    pub fn bus_read(&self, addr: u16, words: &mut [u32]) -> Result<(), BusError> {
        let region = self
            .resolve(addr, byte_len(words.len()))
            .ok_or(BusError::Unmapped)?;
        region.handler.read(addr - region.base, words)
    }

    /// Routes a word write to the owning region's write handler.
    ///
    /// # Errors
    ///
    /// [`BusError::Unmapped`] when no region contains the range,
    /// [`BusError::NoHandler`] when the owner has no write handler, or the
    /// handler's own error.
    pub fn bus_write(&self, addr: u16, words: &[u32]) -> Result<(), BusError> {
        let region = self
            .resolve(addr, byte_len(words.len()))
            .ok_or(BusError::Unmapped)?;
        region.handler.write(addr - region.base, words)
    }

    /// Runs every region's update hook once, in registration order.
    pub fn update_pass(&self, regs: &RegisterFile) {
        for region in &self.regions {
            region.handler.update(regs);
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn byte_len(words: usize) -> u32 {
    (words * 4) as u32
}

/// Register bus: region routing with fallback to the register file.
#[derive(Debug, Clone)]
pub struct Bus {
    regs: Arc<RegisterFile>,
    regions: Arc<RegionTable>,
}

impl Bus {
    /// Combines a register file with a frozen region table.
    #[must_use]
    pub const fn new(regs: Arc<RegisterFile>, regions: Arc<RegionTable>) -> Self {
        Self { regs, regions }
    }

    /// Shared register file.
    #[must_use]
    pub fn registers(&self) -> &Arc<RegisterFile> {
        &self.regs
    }

    /// Shared region table.
    #[must_use]
    pub fn regions(&self) -> &Arc<RegionTable> {
        &self.regions
    }

    /// Reads words through the owning handler, or directly when unmanaged.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Rejected`] when a handler refuses the access.
    pub fn read_words(&self, addr: u16, words: &mut [u32]) -> Result<(), BusError> {
        match self.regions.bus_read(addr, words) {
            Err(error) if error.falls_back() => {
                self.regs.read_words(addr, words);
                Ok(())
            }
            other => other,
        }
    }

    /// Writes words through the owning handler, or directly when unmanaged.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Rejected`] when a handler refuses the access.
    pub fn write_words(&self, addr: u16, words: &[u32]) -> Result<(), BusError> {
        match self.regions.bus_write(addr, words) {
            Err(error) if error.falls_back() => {
                self.regs.write_words(addr, words);
                Ok(())
            }
            other => other,
        }
    }
}

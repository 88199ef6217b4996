//! Board capability and network configuration.

use std::time::Duration;

use crate::idrom::PinDescriptor;

/// UDP port LBP16 hosts talk to.
pub const LBP16_UDP_PORT: u16 = 27181;

/// Default delay between update-scheduler passes.
pub const DEFAULT_UPDATE_PERIOD: Duration = Duration::from_micros(100);

/// Number of GPIO lines on the reference microcontroller.
pub const REFERENCE_GPIO_LINES: u8 = 29;

/// GPIO lines free for I/O on the reference board: 0..=15, 22 and 26..=28.
pub const REFERENCE_LINES_AVAILABLE: u64 = 0x1C40_FFFF;

/// Network identity published through the EEPROM memory space.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct NetworkConfig {
    /// Ethernet MAC address.
    pub mac: [u8; 6],
    /// IPv4 address.
    pub ip: [u8; 4],
    /// IPv4 subnet mask.
    pub netmask: [u8; 4],
    /// IPv4 default gateway.
    pub gateway: [u8; 4],
    /// UDP port serving LBP16.
    pub udp_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mac: [0x00, 0x08, 0xDC, 0x12, 0x34, 0x56],
            ip: [192, 168, 1, 121],
            netmask: [255, 255, 255, 0],
            gateway: [192, 168, 1, 1],
            udp_port: LBP16_UDP_PORT,
        }
    }
}

/// Capabilities of the emulated board.
///
/// Everything the IDROM, the pin descriptors, the identity spaces and the
/// I/O port module publish is derived from this structure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BoardConfig {
    /// IDROM board name.
    pub board_name: [u8; 8],
    /// Identity string published in memory space 7.
    pub identity: [u8; 16],
    /// Firmware version published in memory space 7.
    pub firmware_version: u16,
    /// IDROM "FPGA size" field.
    pub fpga_size: u32,
    /// IDROM "FPGA pins" field.
    pub fpga_pins: u32,
    /// Number of I/O port instances.
    pub io_ports: u32,
    /// Total number of host-visible I/O pins.
    pub io_width: u32,
    /// Pins per I/O port register word.
    pub port_width: u32,
    /// Low reference clock in Hz.
    pub clock_low: u32,
    /// High reference clock in Hz.
    pub clock_high: u32,
    /// Instance strides 0 and 1.
    pub instance_strides: [u32; 2],
    /// Register strides 0 and 1.
    pub register_strides: [u32; 2],
    /// One descriptor per host-visible pin.
    pub pins: Vec<PinDescriptor>,
    /// GPIO lines usable by the I/O port; host pin `n` maps to line `n`.
    pub lines_available: u64,
    /// Network identity.
    pub network: NetworkConfig,
    /// Delay between update-scheduler passes.
    pub update_period: Duration,
}

impl Default for BoardConfig {
    fn default() -> Self {
        let pins = (0u8..10)
            .flat_map(|unit| [PinDescriptor::step(unit), PinDescriptor::dir(unit)])
            .collect();

        Self {
            board_name: *b"*RP2040*",
            identity: *b"RP2040-W5500-HM2",
            firmware_version: 1,
            fpga_size: 0,
            fpga_pins: 56,
            io_ports: 1,
            io_width: 20,
            port_width: 20,
            clock_low: 10_000_000,
            clock_high: 20_000_000,
            instance_strides: [4, 64],
            register_strides: [256, 256],
            pins,
            lines_available: REFERENCE_LINES_AVAILABLE,
            network: NetworkConfig::default(),
            update_period: DEFAULT_UPDATE_PERIOD,
        }
    }
}

impl BoardConfig {
    /// Number of 32-bit register words each I/O port register spans.
    #[must_use]
    pub const fn ioport_words(&self) -> u32 {
        if self.port_width == 0 {
            return 0;
        }
        self.io_width.div_ceil(self.port_width)
    }
}

//! LBP16 request handling through a fully assembled board.

use log as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use std::sync::Arc;

use hm2_core::lbp16::spaces::StatRegister;
use hm2_core::{
    Board, BoardConfig, Direction, Lbp16Command, MemorySpace, SimulatedIndicator, SimulatedPins,
    TransferSize,
};
use proptest::prelude::*;
use rstest::rstest;

fn board() -> Board {
    Board::new(
        BoardConfig::default(),
        SimulatedPins::new(),
        SimulatedIndicator::new(),
    )
    .expect("reference board")
}

fn command(
    write: bool,
    space: MemorySpace,
    size: TransferSize,
    increment: bool,
    count: u8,
) -> Lbp16Command {
    Lbp16Command {
        write,
        has_addr: true,
        info_area: false,
        space,
        size,
        increment,
        count,
    }
}

fn info(write: bool, space: MemorySpace, size: TransferSize, count: u8) -> Lbp16Command {
    Lbp16Command {
        info_area: true,
        ..command(write, space, size, true, count)
    }
}

fn stat(board: &Board, register: StatRegister) -> u16 {
    board.dispatcher().statistics().get(register)
}

fn single_frame(frames: Vec<Vec<u8>>) -> Vec<u8> {
    assert_eq!(frames.len(), 1, "expected one reply frame");
    frames.into_iter().next().unwrap_or_default()
}

#[test]
fn decode_is_total_and_reencodes_every_word() {
    for raw in 0..=u16::MAX {
        let command = Lbp16Command::decode(raw);
        assert_eq!(command.encode(), raw);
        assert!(command.memory_space() <= 7);
        assert!([8, 16, 32, 64].contains(&command.transfer_bits()));
        assert_eq!(command.is_valid(), raw & 0x7F != 0);
    }
}

#[test]
fn addressed_word_write_sets_status_register() {
    let board = board();
    let payload = [0x01, 0xC2, 0x00, 0x02, 0x01, 0x00, 0x00, 0x00];

    assert!(board.deliver(&payload).is_empty());
    assert_eq!(board.registers().read_u8(0x0200), 0x01);
    assert_eq!(board.registers().read_u32(0x0200), 0x0000_0001);
    assert_eq!(stat(&board, StatRegister::RxBad), 0);
}

#[test]
fn pointer_form_byte_write_sets_status_register() {
    let board = board();
    let set_pointer = info(true, MemorySpace::HostMot2, TransferSize::Bits16, 1);
    board.deliver(&set_pointer.to_wire(0x0006, &0x0200_u16.to_le_bytes()));
    assert_eq!(
        board
            .dispatcher()
            .info_areas()
            .get(MemorySpace::HostMot2)
            .address_pointer(),
        0x0200
    );

    assert!(board.deliver(&[0x01, 0x80, 0x01]).is_empty());
    assert_eq!(board.registers().read_u8(0x0200), 0x01);
    assert_eq!(board.registers().read_u8(0x0201), 0x00);
    assert_eq!(stat(&board, StatRegister::ParseErrors), 0);
}

#[test]
fn increment_selects_unit_addressing() {
    let board = board();

    let fixed = command(false, MemorySpace::HostMot2, TransferSize::Bits8, false, 4);
    let reply = single_frame(board.deliver(&fixed.to_wire(0x0100, &[])));
    assert_eq!(reply, vec![0xFE; 4]);

    let incrementing = command(false, MemorySpace::HostMot2, TransferSize::Bits8, true, 4);
    let reply = single_frame(board.deliver(&incrementing.to_wire(0x0100, &[])));
    assert_eq!(reply, vec![0xFE, 0xCA, 0xAA, 0x55]);

    let fixed_write = command(true, MemorySpace::HostMot2, TransferSize::Bits32, false, 3);
    let data: Vec<u8> = [1u32, 2, 3].iter().flat_map(|word| word.to_le_bytes()).collect();
    board.deliver(&fixed_write.to_wire(0x3000, &data));
    assert_eq!(board.registers().read_u32(0x3000), 3);
    assert_eq!(board.registers().read_u32(0x3004), 0);
}

#[test]
fn zero_count_is_dropped_counted_and_processing_continues() {
    let board = board();
    let mut invalid = command(true, MemorySpace::HostMot2, TransferSize::Bits32, true, 1);
    invalid.count = 0;
    let valid = command(true, MemorySpace::HostMot2, TransferSize::Bits32, true, 1);

    let mut payload = invalid.to_wire(0x3000, &[]);
    payload.extend(valid.to_wire(0x3004, &[0xAA, 0xBB, 0xCC, 0xDD]));
    board.deliver(&payload);

    assert_eq!(board.registers().read_u32(0x3000), 0);
    assert_eq!(board.registers().read_u32(0x3004), 0xDDCC_BBAA);
    assert_eq!(stat(&board, StatRegister::ParseErrors), 1);
    assert_eq!(stat(&board, StatRegister::RxBad), 1);
    assert_eq!(stat(&board, StatRegister::RxPayloads), 1);
}

#[test]
fn truncated_write_ends_payload_without_mutation() {
    let board = board();
    let write = command(true, MemorySpace::HostMot2, TransferSize::Bits32, true, 2);
    let mut payload = write.to_wire(0x3000, &[1, 2, 3, 4]);
    payload.truncate(8);

    assert!(board.deliver(&payload).is_empty());
    assert_eq!(board.registers().read_u32(0x3000), 0);
    assert_eq!(stat(&board, StatRegister::ParseErrors), 1);
    assert_eq!(stat(&board, StatRegister::RxPayloads), 0);
}

#[test]
fn trailing_partial_command_word_is_a_parse_error() {
    let board = board();
    let read = command(false, MemorySpace::HostMot2, TransferSize::Bits32, true, 1);
    let mut payload = read.to_wire(0x0100, &[]);
    payload.push(0x01);

    let reply = single_frame(board.deliver(&payload));
    assert_eq!(reply, 0x55AA_CAFE_u32.to_le_bytes());
    assert_eq!(stat(&board, StatRegister::ParseErrors), 1);
}

#[rstest]
#[case::reserved_space(MemorySpace::Reserved5, TransferSize::Bits16)]
#[case::byte_units(MemorySpace::HostMot2, TransferSize::Bits8)]
#[case::word_units(MemorySpace::Statistics, TransferSize::Bits32)]
fn malformed_info_area_access_is_rejected(#[case] space: MemorySpace, #[case] size: TransferSize) {
    let board = board();
    let frames = board.deliver(&info(false, space, size, 1).to_wire(0, &[]));

    assert!(frames.is_empty());
    assert_eq!(stat(&board, StatRegister::MemoryErrors), 1);
    assert_eq!(stat(&board, StatRegister::RxBad), 1);
}

#[test]
fn info_area_describes_register_space() {
    let board = board();
    let reply = single_frame(
        board.deliver(&info(false, MemorySpace::HostMot2, TransferSize::Bits16, 8).to_wire(0, &[])),
    );
    assert_eq!(&reply[0..2], &0x5A00_u16.to_le_bytes());
    assert_eq!(&reply[2..4], &0x8104_u16.to_le_bytes());
    assert_eq!(&reply[4..6], &0x0010_u16.to_le_bytes());
    assert_eq!(&reply[8..16], b"HostMot2");
}

#[test]
fn info_area_fields_other_than_pointer_are_read_only() {
    let board = board();
    let write = info(true, MemorySpace::Timers, TransferSize::Bits16, 1);
    board.deliver(&write.to_wire(0, &[0xFF, 0xFF]));

    assert_eq!(
        board.dispatcher().info_areas().get(MemorySpace::Timers).cookie,
        0x5A04
    );
    assert_eq!(stat(&board, StatRegister::WriteErrors), 1);
}

#[rstest]
#[case::unused_one(MemorySpace::Unused1)]
#[case::unused_three(MemorySpace::Unused3)]
#[case::reserved(MemorySpace::Reserved5)]
fn unsupported_spaces_are_rejected(#[case] space: MemorySpace) {
    let board = board();
    let read = command(false, space, TransferSize::Bits32, true, 1);
    assert!(board.deliver(&read.to_wire(0, &[])).is_empty());
    assert_eq!(stat(&board, StatRegister::MemoryErrors), 1);
}

#[test]
fn identity_space_is_read_only_and_stable() {
    let board = board();
    let write = command(true, MemorySpace::Identity, TransferSize::Bits16, true, 8);
    board.deliver(&write.to_wire(0, &[0x41; 16]));
    assert_eq!(stat(&board, StatRegister::WriteErrors), 1);

    let read = command(false, MemorySpace::Identity, TransferSize::Bits16, true, 8);
    let reply = single_frame(board.deliver(&read.to_wire(0, &[])));
    assert_eq!(reply, b"RP2040-W5500-HM2".to_vec());
}

#[test]
fn eeprom_space_publishes_network_identity() {
    let board = board();
    let read = command(false, MemorySpace::Eeprom, TransferSize::Bits16, true, 3);
    let reply = single_frame(board.deliver(&read.to_wire(0, &[])));
    assert_eq!(reply, vec![0x00, 0x08, 0xDC, 0x12, 0x34, 0x56]);

    let past_end = command(false, MemorySpace::Eeprom, TransferSize::Bits16, true, 2);
    assert!(board.deliver(&past_end.to_wire(62, &[])).is_empty());
    assert_eq!(stat(&board, StatRegister::MemoryErrors), 1);
}

#[test]
fn timer_space_latches_monotonic_timestamp() {
    let board = board();
    let read = command(false, MemorySpace::Timers, TransferSize::Bits32, true, 1);
    let first = single_frame(board.deliver(&read.to_wire(0, &[])));
    std::thread::sleep(std::time::Duration::from_millis(1));
    let second = single_frame(board.deliver(&read.to_wire(0, &[])));

    let first = u32::from_le_bytes([first[0], first[1], first[2], first[3]]);
    let second = u32::from_le_bytes([second[0], second[1], second[2], second[3]]);
    assert!(second > first);
}

#[test]
fn statistics_space_reports_counters() {
    let board = board();
    let read = command(false, MemorySpace::Statistics, TransferSize::Bits16, true, 16);
    board.deliver(&[0x01]);
    let reply = single_frame(board.deliver(&read.to_wire(0, &[])));

    let word = |index: usize| u16::from_le_bytes([reply[index * 2], reply[index * 2 + 1]]);
    assert_eq!(word(StatRegister::ParseErrors as usize), 1);
    assert_eq!(word(StatRegister::RxPackets as usize), 2);
    assert_eq!(word(StatRegister::RxBad as usize), 1);
    assert_eq!(stat(&board, StatRegister::TxPackets), 1);
}

#[test]
fn reset_trigger_clears_statistics_and_pointers() {
    let board = board();
    let write = command(true, MemorySpace::HostMot2, TransferSize::Bits32, true, 1);
    board.deliver(&write.to_wire(0x3000, &[0; 4]));
    assert_ne!(
        board
            .dispatcher()
            .info_areas()
            .get(MemorySpace::HostMot2)
            .address_pointer(),
        0
    );

    let trigger = command(true, MemorySpace::Statistics, TransferSize::Bits16, true, 1);
    let offset = StatRegister::ResetTrigger.offset();
    board.deliver(&trigger.to_wire(offset, &0x005A_u16.to_le_bytes()));

    assert!(board.dispatcher().take_reset_request());
    assert!(!board.dispatcher().take_reset_request());
    assert_eq!(stat(&board, StatRegister::RxPackets), 0);
    assert_eq!(
        board
            .dispatcher()
            .info_areas()
            .get(MemorySpace::HostMot2)
            .address_pointer(),
        0
    );
    assert_eq!(board.registers().read_u32(0x0100), 0x55AA_CAFE);
    assert_eq!(board.registers().read_u32(0x0400), 2);
}

#[test]
fn ioport_registers_are_served_by_their_handler() {
    let pins = Arc::new(SimulatedPins::new());
    let board = Board::new(
        BoardConfig::default(),
        Arc::clone(&pins),
        SimulatedIndicator::new(),
    )
    .expect("board");

    let write = command(true, MemorySpace::HostMot2, TransferSize::Bits32, true, 1);
    board.deliver(&write.to_wire(0x1100, &0b101_u32.to_le_bytes()));
    board.deliver(&write.to_wire(0x1000, &0b001_u32.to_le_bytes()));
    assert_eq!(pins.direction(2), Direction::Output);
    assert_eq!(pins.driven(0), Some(true));
    assert_eq!(pins.driven(2), Some(false));

    pins.set_input(1, true);
    let read = command(false, MemorySpace::HostMot2, TransferSize::Bits32, true, 1);
    let reply = single_frame(board.deliver(&read.to_wire(0x1000, &[])));
    assert_eq!(reply, 0b011_u32.to_le_bytes());

    board.deliver(&write.to_wire(0x1004, &[0xFF; 4]));
    assert_eq!(stat(&board, StatRegister::MemoryErrors), 1);
}

#[test]
fn narrow_ioport_accesses_merge_through_the_handler() {
    let pins = Arc::new(SimulatedPins::new());
    let board = Board::new(
        BoardConfig::default(),
        Arc::clone(&pins),
        SimulatedIndicator::new(),
    )
    .expect("board");

    let half = command(true, MemorySpace::HostMot2, TransferSize::Bits16, true, 1);
    board.deliver(&half.to_wire(0x1100, &[0b101, 0x00]));
    board.deliver(&half.to_wire(0x1102, &[0x00, 0x00]));
    assert_eq!(pins.direction(0), Direction::Output);
    assert_eq!(pins.direction(1), Direction::Input);
    assert_eq!(pins.direction(2), Direction::Output);

    pins.set_input(1, true);
    let halves = command(false, MemorySpace::HostMot2, TransferSize::Bits16, true, 2);
    let reply = single_frame(board.deliver(&halves.to_wire(0x1000, &[])));
    assert_eq!(reply, [0b010, 0, 0, 0]);
    let byte = command(false, MemorySpace::HostMot2, TransferSize::Bits8, true, 1);
    assert_eq!(single_frame(board.deliver(&byte.to_wire(0x1000, &[]))), [0b010]);
    assert_eq!(board.registers().read_u32(0x1000), 0);

    board.deliver(&half.to_wire(0x1004, &[0xFF, 0xFF]));
    assert_eq!(stat(&board, StatRegister::MemoryErrors), 1);
    assert_eq!(stat(&board, StatRegister::RxBad), 1);
}

#[test]
fn mixed_payload_replies_in_command_order() {
    let board = board();
    let write = command(true, MemorySpace::HostMot2, TransferSize::Bits32, true, 1);
    let read_cookie = command(false, MemorySpace::HostMot2, TransferSize::Bits32, true, 1);
    let read_name = command(false, MemorySpace::HostMot2, TransferSize::Bits8, true, 8);

    let mut payload = read_cookie.to_wire(0x0100, &[]);
    payload.extend(write.to_wire(0x3000, &[9, 9, 9, 9]));
    payload.extend(read_name.to_wire(0x0104, &[]));

    let reply = single_frame(board.deliver(&payload));
    let mut expected = 0x55AA_CAFE_u32.to_le_bytes().to_vec();
    expected.extend_from_slice(b"HOSTMOT2");
    assert_eq!(reply, expected);
    assert_eq!(board.registers().read_u32(0x3000), 0x0909_0909);
}

proptest! {
    #[test]
    fn decode_fields_match_bit_layout(raw in any::<u16>()) {
        let command = Lbp16Command::decode(raw);
        prop_assert_eq!(command.write, raw & 0x8000 != 0);
        prop_assert_eq!(command.has_addr, raw & 0x4000 != 0);
        prop_assert_eq!(command.info_area, raw & 0x2000 != 0);
        prop_assert_eq!(u16::from(command.memory_space()), (raw >> 10) & 0x7);
        prop_assert_eq!(u16::from(command.transfer_size_code()), (raw >> 8) & 0x3);
        prop_assert_eq!(command.increment, raw & 0x0080 != 0);
        prop_assert_eq!(u16::from(command.count), raw & 0x7F);
        prop_assert_eq!(
            command.num_bytes(),
            usize::from(command.count) * usize::from(command.transfer_bytes())
        );
    }

    #[test]
    fn register_space_round_trips_any_count(
        count in 1u8..=127,
        base in 0x2000u16..0x8000,
        bytes in prop::collection::vec(any::<u8>(), 508),
    ) {
        let board = board();
        let base = base & !0x3;
        let data = &bytes[..usize::from(count) * 4];

        let write = command(true, MemorySpace::HostMot2, TransferSize::Bits32, true, count);
        prop_assert!(board.deliver(&write.to_wire(base, data)).is_empty());

        let read = command(false, MemorySpace::HostMot2, TransferSize::Bits32, true, count);
        let frames = board.deliver(&read.to_wire(base, &[]));
        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(frames[0].as_slice(), data);
        prop_assert_eq!(stat(&board, StatRegister::RxBad), 0);
    }

    #[test]
    fn arbitrary_payloads_never_panic(payload in prop::collection::vec(any::<u8>(), 0..256)) {
        let board = board();
        for frame in board.deliver(&payload) {
            prop_assert!(!frame.is_empty());
            prop_assert!(frame.len() <= hm2_core::MAX_REPLY_FRAME);
        }
        board.dispatcher().take_reset_request();
        board.scheduler().run_pass();
    }
}

#![no_main]

use std::sync::OnceLock;

use hm2_core::{
    Board, BoardConfig, Lbp16Command, SimulatedIndicator, SimulatedPins, SpiFrame,
    MAX_REPLY_FRAME,
};
use libfuzzer_sys::fuzz_target;

fn board() -> Option<&'static Board> {
    static BOARD: OnceLock<Option<Board>> = OnceLock::new();
    BOARD
        .get_or_init(|| {
            Board::new(
                BoardConfig::default(),
                SimulatedPins::new(),
                SimulatedIndicator::new(),
            )
            .ok()
        })
        .as_ref()
}

fuzz_target!(|data: &[u8]| {
    let Some(board) = board() else {
        return;
    };

    if let [lo, hi, ..] = data {
        let command = Lbp16Command::decode(u16::from_le_bytes([*lo, *hi]));
        assert_eq!(command.encode(), u16::from_le_bytes([*lo, *hi]));
    }

    for frame in board.deliver(data) {
        assert!(!frame.is_empty());
        assert!(frame.len() <= MAX_REPLY_FRAME);
    }
    board.dispatcher().take_reset_request();
    board.scheduler().run_pass();

    if let [a, b, c, d, rest @ ..] = data {
        let _ = SpiFrame::decode([*a, *b, *c, *d]).execute(board.bus(), rest);
    }
});

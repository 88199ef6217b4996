//! Host simulator: serves the emulated HostMot2 register interface over
//! LBP16/UDP with in-memory GPIO lines and status indicator.

use std::env;
use std::ffi::OsString;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use hm2_core::{Board, BoardConfig, SimulatedIndicator, SimulatedPins, LBP16_UDP_PORT};
use log::{debug, error, info, warn};

const USAGE_TEXT: &str = "\
Usage: hm2-sim [options]

Options:
  -b, --bind <addr>       IPv4 address to listen on (default: 0.0.0.0)
  -p, --port <port>       UDP port to listen on (default: 27181)
      --period-us <us>    Update-loop period in microseconds (default: 100)
  -v, --verbose           Log every request at debug level
  -h, --help              Show this help message

Logging honours RUST_LOG; --verbose raises the default level to debug.

Examples:
  hm2-sim
  hm2-sim --bind 127.0.0.1 --port 27182 --period-us 0
";

/// Largest datagram read from the socket.
const RECEIVE_BUFFER_BYTES: usize = 1500;

#[derive(Debug, PartialEq, Eq)]
struct ServeArgs {
    bind: Ipv4Addr,
    port: u16,
    period: Option<Duration>,
    verbose: bool,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            bind: Ipv4Addr::UNSPECIFIED,
            port: LBP16_UDP_PORT,
            period: None,
            verbose: false,
        }
    }
}

#[derive(Debug)]
enum ParseResult {
    Serve(ServeArgs),
    Help,
}

fn option_value(
    args: &mut impl Iterator<Item = OsString>,
    flag: &OsString,
) -> Result<String, String> {
    args.next()
        .map(|value| value.to_string_lossy().to_string())
        .ok_or_else(|| format!("missing value for {}", flag.to_string_lossy()))
}

#[allow(clippy::while_let_on_iterator)]
fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let mut serve = ServeArgs::default();

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Ok(ParseResult::Help);
        }

        if arg == "--verbose" || arg == "-v" {
            serve.verbose = true;
            continue;
        }

        if arg == "--bind" || arg == "-b" {
            let value = option_value(&mut args, &arg)?;
            serve.bind = value
                .parse()
                .map_err(|_| format!("invalid bind address: {value}"))?;
            continue;
        }

        if arg == "--port" || arg == "-p" {
            let value = option_value(&mut args, &arg)?;
            serve.port = value
                .parse()
                .map_err(|_| format!("invalid port: {value}"))?;
            continue;
        }

        if arg == "--period-us" {
            let value = option_value(&mut args, &arg)?;
            let micros: u64 = value
                .parse()
                .map_err(|_| format!("invalid period: {value}"))?;
            serve.period = Some(Duration::from_micros(micros));
            continue;
        }

        return Err(format!("unknown option: {}", arg.to_string_lossy()));
    }

    Ok(ParseResult::Serve(serve))
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn board_config(args: &ServeArgs) -> BoardConfig {
    let mut config = BoardConfig::default();
    config.network.udp_port = args.port;
    if let Some(period) = args.period {
        config.update_period = period;
    }
    config
}

fn run_serve(args: &ServeArgs) -> Result<(), i32> {
    let board = match Board::new(
        board_config(args),
        SimulatedPins::new(),
        SimulatedIndicator::new(),
    ) {
        Ok(board) => board,
        Err(e) => {
            error!("invalid board configuration: {e}");
            return Err(1);
        }
    };

    if let Err(e) = board.scheduler().spawn() {
        error!("failed to start update loop: {e}");
        return Err(1);
    }

    let addr = SocketAddr::from((args.bind, args.port));
    let socket = match UdpSocket::bind(addr) {
        Ok(socket) => socket,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            return Err(1);
        }
    };
    info!("serving LBP16 on {addr}");

    let mut buffer = [0u8; RECEIVE_BUFFER_BYTES];
    loop {
        let (len, peer) = match socket.recv_from(&mut buffer) {
            Ok(received) => received,
            Err(e) => {
                warn!("receive failed: {e}");
                continue;
            }
        };
        debug!("{len} byte request from {peer}");

        for frame in board.deliver(&buffer[..len]) {
            if let Err(e) = socket.send_to(&frame, peer) {
                warn!("reply to {peer} failed: {e}");
            }
        }

        if board.dispatcher().take_reset_request() {
            info!("soft reset: statistics and address pointers cleared");
        }
    }
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Serve(args)) => {
            init_logging(args.verbose);
            match run_serve(&args) {
                Ok(()) => 0,
                Err(code) => code,
            }
        }
        Err(error) => {
            eprintln!("error: {error}");
            eprintln!("{USAGE_TEXT}");
            1
        }
    };

    std::process::exit(exit_code);
}

//! A low-level TCP Texas Hold'em server.
//!
//! The server runs with two threads; one for managing TCP connections
//! and exchanging data, and another for applying actions to tables and
//! folding players that take too long to act.

use anyhow::Error;
use ctrlc::set_handler;
use holdem::{
    DEFAULT_BIG_BLIND, DEFAULT_MAX_SEATS, DEFAULT_SMALL_BLIND, DEFAULT_STARTING_STACK, MAX_SEATS,
    MAX_STARTING_STACK, TableSettings,
    constants::DEFAULT_MIN_PLAYERS,
    entities::{Blinds, Chips},
    server::{self, DEFAULT_ACTION_TIMEOUT, ServerConfig, ServerTimeouts},
};
use log::info;
use pico_args::Arguments;
use std::time::Duration;

const HELP: &str = "\
Run a multi-table Texas Hold'em server

USAGE:
  holdem_server [OPTIONS]

OPTIONS:
  --bind            IP:PORT  Server socket bind address       [default: 127.0.0.1:6969]
  --seats           N        Seats per table (2-10)           [default: 9]
  --min_players     N        Players needed to start a hand   [default: 2]
  --starting_stack  CHIPS    Stack for newly seated players   [default: 1000]
                             (capped at 429496729)
  --small_blind     CHIPS    Small blind                      [default: 1]
  --big_blind       CHIPS    Big blind                        [default: 2]
  --action_timeout  SECS     Time to act before auto-folding  [default: 30]

FLAGS:
  -h, --help                 Print help information
";

struct Args {
    bind: String,
    seats: usize,
    min_players: usize,
    starting_stack: Chips,
    small_blind: Chips,
    big_blind: Chips,
    action_timeout: u64,
}

fn main() -> Result<(), Error> {
    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs
            .value_from_str("--bind")
            .unwrap_or("127.0.0.1:6969".into()),
        seats: pargs
            .value_from_str("--seats")
            .unwrap_or(DEFAULT_MAX_SEATS),
        min_players: pargs
            .value_from_str("--min_players")
            .unwrap_or(DEFAULT_MIN_PLAYERS),
        starting_stack: pargs
            .value_from_str("--starting_stack")
            .unwrap_or(DEFAULT_STARTING_STACK),
        small_blind: pargs
            .value_from_str("--small_blind")
            .unwrap_or(DEFAULT_SMALL_BLIND),
        big_blind: pargs
            .value_from_str("--big_blind")
            .unwrap_or(DEFAULT_BIG_BLIND),
        action_timeout: pargs
            .value_from_str("--action_timeout")
            .unwrap_or(DEFAULT_ACTION_TIMEOUT.as_secs()),
    };

    let blinds = Blinds {
        small: args.small_blind,
        big: args.big_blind.max(args.small_blind),
    };
    let mut settings = TableSettings::new(
        args.seats.clamp(DEFAULT_MIN_PLAYERS, MAX_SEATS),
        args.starting_stack.clamp(1, MAX_STARTING_STACK),
        blinds,
    );
    settings.min_players = args.min_players.clamp(DEFAULT_MIN_PLAYERS, settings.max_seats);
    let config = ServerConfig {
        settings,
        timeouts: ServerTimeouts {
            action: Duration::from_secs(args.action_timeout),
            ..Default::default()
        },
    };

    // Catching signals for exit.
    set_handler(|| std::process::exit(0))?;

    env_logger::builder().format_target(false).init();
    info!("starting at {}", args.bind);
    server::run(&args.bind, config)?;

    Ok(())
}

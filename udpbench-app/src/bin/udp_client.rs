use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use udpbench_app::pacer::{self, Generator, GeneratorConfig, RateSchedule};

/// Sends paced bursts of UDP datagrams to a udp_server and prints the
/// server's totals on quit.
#[derive(Parser, Debug)]
#[command(name = "udp_client", author, version, about, long_about = None)]
struct Args {
    /// Server host name or IPv4 address
    host: String,

    /// Server UDP port
    port: u16,

    /// Packets sent per iteration
    #[arg(allow_negative_numbers = true)]
    packets: i64,

    /// Target send rate in packets per second
    #[arg(allow_negative_numbers = true)]
    rate: i64,

    /// Seed for the packet length sequence
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(parse_failure_code(e.kind()));
        }
    };

    let schedule = match RateSchedule::configure(args.rate, args.packets) {
        Ok(schedule) => schedule,
        Err(e) => {
            eprintln!("Invalid parameters: {}", e);
            eprintln!("{}", Args::command().render_usage());
            return ExitCode::from(2);
        }
    };

    match run(&args, schedule) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Exception: {:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Exit status for a rejected command line. A malformed number is an invalid
/// parameter like an out-of-range one; a wrong argument list is a usage error.
fn parse_failure_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        ErrorKind::ValueValidation | ErrorKind::InvalidValue => 2,
        _ => 1,
    }
}

fn run(args: &Args, schedule: RateSchedule) -> anyhow::Result<()> {
    let destination = pacer::resolve(&args.host, args.port)?;
    let config = GeneratorConfig::new(destination, schedule).with_seed(args.seed);
    let mut generator = Generator::connect(config).context("Failed to open client socket")?;
    log::debug!("Client socket {} connected to {}", generator.local_addr()?, destination);

    log::info!(
        "Sending to {} in batches of {} with {}ms pauses",
        destination,
        schedule.batch_size(),
        schedule.pause_ms()
    );
    println!("Packets per iteration {}", schedule.packets_per_iteration());

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("Enter message: ");
        io::stdout().flush()?;

        // EOF on stdin ends the session the same way typing quit does.
        let line = match lines.next() {
            Some(line) => line.context("Failed to read from stdin")?,
            None => break,
        };
        if line.starts_with("quit") {
            break;
        }

        let result = generator
            .run_iteration(line.as_bytes())
            .context("Iteration failed")?;
        println!(
            "Iteration took {:.6}sec at rate {:.2}pps\n",
            result.elapsed.as_secs_f64(),
            result.rate_pps()
        );
    }

    let reply = generator.send_quit().context("Quit exchange failed")?;
    println!("Reply is:");
    println!("{}", String::from_utf8_lossy(&reply));

    Ok(())
}

use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tokio::signal;
use udpbench_app::session::SessionServer;

/// Counts datagrams from a udp_client until it sends quit, then replies with
/// the totals and exits.
#[derive(Parser, Debug)]
#[command(name = "udp_server", author, version, about, long_about = None)]
struct Args {
    /// UDP port to listen on
    port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Exception: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    let mut server = SessionServer::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    println!("Listening on {}", server.local_addr()?);

    let summary = server
        .run_until(async {
            if signal::ctrl_c().await.is_err() {
                // No signal handler: only a quit packet can end the session.
                std::future::pending::<()>().await;
            }
        })
        .await;

    if !server.session().is_terminated() {
        println!("Interrupted before quit");
    }
    println!("{}", summary);

    Ok(())
}

//! probe51 - drives an MCS-51 monitor shell through one scripted debug pass
//!
//! Spawns the monitor, arms breakpoints from an assembler listing, runs to
//! the first stop, and prints the register snapshot and a disassembly
//! window as JSON. Raw monitor output is mirrored to stderr.

use std::path::PathBuf;

use clap::Parser;
use probe51_listing::read_listing;
use probe51_session::Session;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "probe51")]
#[command(about = "Drive an MCS-51 monitor shell through a typed debug session")]
struct Cli {
    /// Path to the assembler listing for the debugged program
    listing: PathBuf,

    /// Monitor executable to spawn
    #[arg(long, default_value = "mon51")]
    monitor: String,

    /// Extra argument passed to the monitor (repeatable)
    #[arg(long = "monitor-arg")]
    monitor_args: Vec<String>,

    /// 0-based source line to break at (repeatable)
    #[arg(long = "break")]
    breakpoints: Vec<usize>,

    /// Instructions to disassemble around the stop
    #[arg(long, default_value = "8")]
    window: usize,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "probe51=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("session failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let map = read_listing(&cli.listing)?;

    info!(monitor = %cli.monitor, "initializing session");
    let mut session = Session::initialize(&cli.monitor, &cli.monitor_args).await?;

    // Mirror raw monitor output so the operator keeps visibility even when
    // structured parsing fails.
    if let Some(mut raw) = session.observe() {
        tokio::spawn(async move {
            while let Some(chunk) = raw.recv().await {
                eprint!("{chunk}");
            }
        });
    }

    session.load_map(map);
    let armed = session.set_breakpoints(&cli.breakpoints).await?;
    info!(?armed, "breakpoints armed");

    let snapshot = session.continue_run().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Ok(pc) = u16::from_str_radix(&snapshot.pc, 16) {
        let back = (cli.window / 2) as i64;
        let window = session
            .disassemble(i64::from(pc), -back, cli.window)
            .await?;
        println!("{}", serde_json::to_string_pretty(&window)?);
    }

    session.terminate().await?;
    Ok(())
}

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use drivetrain_runtime::messages::DriveMode;
use drivetrain_runtime::runtime::RunOptions;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chassis description (JSON). Defaults to a six-motor tank drive
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control law to run each tick
    #[arg(short, long, value_enum, default_value_t = DriveMode::Tank)]
    mode: DriveMode,

    /// Drive from the keyboard instead of the scripted stick profile
    #[arg(short, long)]
    keyboard: bool,

    /// Stop after N ticks (runs until interrupted otherwise)
    #[arg(long)]
    ticks: Option<u64>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=debug to see every motor write)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let options = RunOptions {
        config: args.config,
        mode: args.mode,
        keyboard: args.keyboard,
        ticks: args.ticks,
    };

    if let Err(e) = drivetrain_runtime::runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

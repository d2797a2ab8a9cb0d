//! wlfill - fill gaps in 15-minute water-level series.

use clap::Parser;

mod cmd;
mod io;

#[derive(Parser)]
#[command(
    name = "wlfill",
    version,
    about = "Gap filling for fixed-cadence water-level sensor data"
)]
struct Cli {
    #[command(subcommand)]
    command: cmd::Command,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    cmd::run_command(cli.command)
}

mod demo;
mod massage;
mod sh;

use clap::{Parser, Subcommand};

/// xtask command-line interface
#[derive(Parser)]
#[command(name = "xtask", version, about = "TSL repository tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fix, lint, format, check and test the workspace
    Massage(massage::MassageArgs),
    /// Run the demo under every scheduling policy
    Demo(demo::DemoArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Massage(args) => massage::run(args),
        Command::Demo(args) => demo::run(args),
    }
}

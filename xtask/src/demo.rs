use anyhow::{Context, Result};
use clap::Args;

use crate::sh::ShOptionsBuilder;

const POLICIES: [&str; 3] = ["fcfs", "rr", "random"];

/// Run tsl-demo once per scheduling policy as a smoke test
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Total threads per run, main included
    #[arg(short = 'n', long, default_value_t = 4)]
    pub threads: usize,

    /// Only run this policy
    #[arg(long)]
    pub policy: Option<String>,

    /// Build and run in release mode
    #[arg(long)]
    pub release: bool,

    /// Show the demo output
    #[arg(long)]
    pub verbose: bool,
}

pub fn run(args: DemoArgs) -> Result<()> {
    let policies: Vec<&str> = match &args.policy {
        Some(p) => vec![p.as_str()],
        None => POLICIES.to_vec(),
    };
    let profile = if args.release { "--release" } else { "" };
    let mut opts = ShOptionsBuilder::default();
    if !args.verbose {
        opts.stdout(crate::sh::StreamMode::Null);
    }
    let opts = opts.build().context("building shell options")?;

    for policy in policies {
        println!("tsl-demo --policy {policy} --threads {}", args.threads);
        let cmd = format!(
            "cargo run --quiet {profile} -p tsl-demo -- --policy {policy} --threads {}",
            args.threads
        );
        crate::sh!(options(opts), cmd).with_context(|| format!("demo with {policy} failed"))?;
    }
    Ok(())
}

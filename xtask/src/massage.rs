use anyhow::{Context, Result};
use clap::Args;

use crate::sh::ShOptions;

/// Massage packages by running cargo fix, clippy, fmt, check, and nextest
#[derive(Args, Debug)]
pub struct MassageArgs {
    #[command(flatten)]
    workspace: clap_cargo::Workspace,

    /// Stop after `cargo check`
    #[arg(long)]
    pub no_test: bool,

    /// Show the output of every step
    #[arg(long)]
    pub verbose: bool,
}

impl MassageArgs {
    /// Either `--workspace` or one `-p` flag per selected package.
    fn target_flags(&self) -> String {
        if self.workspace.workspace || self.workspace.package.is_empty() {
            return "--workspace".to_string();
        }
        self.workspace
            .package
            .iter()
            .map(|p| format!("-p {p}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn run(args: MassageArgs) -> Result<()> {
    let targets = args.target_flags();
    let mut steps = vec![
        (
            "cargo fix",
            format!("cargo fix --allow-dirty --allow-staged --quiet {targets}"),
        ),
        (
            "cargo clippy --fix",
            format!("cargo clippy --fix --allow-dirty --allow-staged --quiet {targets}"),
        ),
        ("cargo fmt", "cargo fmt --all --quiet".to_string()),
        ("cargo check", format!("cargo check --quiet {targets}")),
    ];
    if !args.no_test {
        steps.push((
            "cargo nextest",
            format!("cargo nextest run --no-tests pass {targets}"),
        ));
    }

    let mut opts = ShOptions::quiet_unless(args.verbose);
    opts.env.push(("RUST_BACKTRACE".into(), "1".into()));

    let total = steps.len();
    for (i, (label, cmd)) in steps.iter().enumerate() {
        println!("[{}/{total}] {label}", i + 1);
        crate::sh!(options(opts), cmd).with_context(|| format!("{label} failed"))?;
    }
    Ok(())
}

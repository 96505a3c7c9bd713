use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use scheduler::{Handle, SchedulerConfig, SchedulingPolicy, Tid, YieldTarget};

/// Spawn counting threads that take turns on one OS thread.
#[derive(Parser, Debug)]
#[command(name = "tsl-demo", version, about)]
struct Cli {
    /// Total number of threads, main included
    #[arg(short = 'n', long, default_value_t = 4, env = "TSL_DEMO_THREADS")]
    threads: usize,

    /// Scheduling policy: fcfs, rr or random (overrides config and TSL_POLICY)
    #[arg(short, long)]
    policy: Option<SchedulingPolicy>,

    /// How far each thread counts
    #[arg(long, default_value_t = 50)]
    count: u32,

    /// Yield after every this many counts
    #[arg(long, default_value_t = 10)]
    yield_period: u32,

    /// Stack size per thread, e.g. 64KiB or 1MiB
    #[arg(long, value_parser = parse_size_arg)]
    stack_size: Option<usize>,

    /// TOML file with scheduler settings; TSL_* variables apply otherwise
    #[arg(short, long, env = "TSL_CONFIG")]
    config: Option<PathBuf>,
}

fn parse_size_arg(s: &str) -> Result<usize, String> {
    scheduler::config::parse_stack_size(s)
}

fn load_config(cli: &Cli) -> Result<SchedulerConfig> {
    let mut config = match &cli.config {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SchedulerConfig::from_env().context("reading TSL_* environment")?,
    };
    if let Some(policy) = cli.policy {
        config.policy = policy;
    }
    if let Some(stack_size) = cli.stack_size {
        config.stack_size = stack_size;
    }
    config.max_threads = config.max_threads.max(cli.threads);
    config.validate().context("invalid scheduler settings")?;
    Ok(config)
}

fn counter(tsl: Handle, count: u32, yield_period: u32) {
    let tid = tsl.current_id();
    println!("Thread {tid} started running (first time)");
    for n in 1..=count {
        println!("Thread {tid} is running (count={n})");
        if n % yield_period == 0 {
            if let Err(e) = tsl.yield_now(YieldTarget::Any) {
                log::error!("thread {tid}: yield failed: {e}");
                return;
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    if cli.threads == 0 {
        bail!("--threads must be at least 1 (the main thread)");
    }
    if cli.yield_period == 0 {
        bail!("--yield-period must be at least 1");
    }

    let config = load_config(&cli)?;
    log::debug!("{config:?}");
    let tsl = scheduler::init_with_config(config).context("initializing scheduler")?;
    println!(
        "Main thread {} using {} scheduling",
        tsl.current_id(),
        tsl.policy_name()
    );

    let (count, period) = (cli.count, cli.yield_period);
    let mut tids: Vec<Tid> = Vec::with_capacity(cli.threads.saturating_sub(1));
    for _ in 1..cli.threads {
        let tid = tsl
            .create(move || counter(tsl, count, period))
            .context("creating thread")?;
        println!("Thread {tid} created");
        tids.push(tid);
    }

    for &tid in &tids {
        println!("Main: waiting for thread {tid}");
        tsl.join(tid)
            .with_context(|| format!("joining thread {tid}"))?;
        println!("Main: thread {tid} finished");
    }

    let stats = tsl.stats();
    println!(
        "Stats: {} threads created, {} reaped, {} context switches",
        stats.threads_created, stats.threads_reaped, stats.context_switches
    );
    println!("Main thread calling exit");
    Err(tsl.exit()).context("main thread exit")
}

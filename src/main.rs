// VHOSTPIN -- VHOST WORKER THREAD PINNING AGENT
// KEEPS vhost-* THREADS ON OPERATOR-CHOSEN CPUS
//
// BPF ONLY SIGNALS (NEW KTHREAD OR VHOST_SET_OWNER IOCTL)
// RUST USERSPACE HANDLES: CONFIGURATION, /proc SCANNING, PINNING DECISIONS

#[allow(non_upper_case_globals)]
#[allow(non_camel_case_types)]
#[allow(non_snake_case)]
#[allow(dead_code)]
mod bpf_skel;

mod cli;
mod probe;

use std::mem::MaybeUninit;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::debug;

use probe::{Probe, TriggerMode};
use vhostpin::affinity::SchedAffinity;
use vhostpin::config::{self, Config};
use vhostpin::driver::Driver;
use vhostpin::pinner::{Mode, Pinner};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "vhostpin")]
#[command(about = "VHOSTPIN -- PIN VHOST WORKER THREADS TO CHOSEN CPUS")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    // ONLY PRINT MATCHING PROCESSES, NEVER PIN
    #[arg(long)]
    discovery_mode: bool,

    // first, last, OR AN EXPLICIT CPU LIST (e.g. 2-3,6)
    #[arg(long, default_value = "")]
    pin_mode: String,

    // REGEX MATCHED AGAINST THE PROCESS NAME
    #[arg(long, default_value = config::DEFAULT_NAME_FILTER)]
    proc_name_filter: String,

    // DEFAULT: /host/proc IF MOUNTED, ELSE /proc
    #[arg(long)]
    proc_dir: Option<PathBuf>,

    // ALSO WALK /proc/<pid>/task/* DURING SWEEPS
    #[arg(long)]
    scan_threads: bool,

    // WHICH KERNEL EVENT TRIGGERS PINNING
    #[arg(long, value_enum, default_value_t = TriggerMode::Kthread)]
    trigger: TriggerMode,

    // WAIT BEFORE AN IOCTL-TRIGGERED SWEEP (WORKER STILL STARTING)
    #[arg(long, default_value_t = 2000)]
    sweep_delay_ms: u64,

    // DEBUG LOGGING (RUST_LOG OVERRIDES)
    #[arg(long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    // CHECK HOST PREREQUISITES AND EXIT
    Check,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let proc_dir = cli.proc_dir.clone().unwrap_or_else(config::default_proc_dir);

    if let Some(Command::Check) = cli.command {
        return cli::check::run_check(&proc_dir);
    }

    // INITIALIZING: ANY FAILURE FROM HERE TO THE EVENT LOOP IS FATAL
    let config = Config {
        discovery_mode: cli.discovery_mode,
        pin_mode: cli.pin_mode.clone(),
        name_filter: cli.proc_name_filter.clone(),
        proc_dir,
        scan_threads: cli.scan_threads,
        sweep_delay: Duration::from_millis(cli.sweep_delay_ms),
    };
    let pinner = Pinner::new(&config, SchedAffinity).context("invalid configuration")?;

    println!("VHOSTPIN v{}", env!("CARGO_PKG_VERSION"));
    println!("PROC DIR:        {}", config.proc_dir.display());
    println!("NAME FILTER:     {}", config.name_filter);
    match pinner.mode() {
        Mode::Discovery => println!("MODE:            DISCOVERY"),
        Mode::Pin(policy) => println!("PIN MODE:        {}", policy),
    }
    println!("TRIGGER:         {}", cli.trigger.probe_name());
    println!("SCAN THREADS:    {}", config.scan_threads);
    if cli.trigger == TriggerMode::Ioctl {
        println!("SWEEP DELAY:     {} ms", cli.sweep_delay_ms);
    }
    println!();

    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })?;

    let mut open_object = MaybeUninit::uninit();
    let probe = Probe::attach(&mut open_object, cli.trigger)
        .context("attaching to kernel event source")?;

    // SUBSCRIBE BEFORE THE STARTUP SWEEP: THREADS BORN DURING THE SWEEP
    // QUEUE UP IN THE CHANNEL INSTEAD OF SLIPPING THROUGH
    let (tx, rx) = crossbeam::channel::unbounded();
    let ring = probe.ring_buffer(tx)?;

    let driver = Arc::new(Driver::new(Arc::new(pinner), config.sweep_delay));
    let listener = thread::Builder::new()
        .name("vhostpin-driver".into())
        .spawn({
            let driver = Arc::clone(&driver);
            move || driver.run(rx)
        })?;

    println!("VHOSTPIN IS ACTIVE ({} PROBE, CTRL+C TO EXIT)", probe.trigger().probe_name());

    while !SHUTDOWN.load(Ordering::Relaxed) {
        // EINTR ON CTRL+C LANDS HERE; THE LOOP CONDITION HANDLES IT
        if let Err(e) = ring.poll(POLL_TIMEOUT) {
            debug!("ring buffer poll: {}", e);
        }
    }

    println!("VHOSTPIN IS SHUTTING DOWN");

    // DRAINING: DROPPING THE RING BUFFER DROPS THE LAST SENDER
    drop(ring);
    listener.join().map_err(|_| anyhow!("driver thread panicked"))?;

    // IN-FLIGHT DISPATCHES ARE NOT AWAITED
    println!("DISPATCHED:      {}", driver.dispatched());
    println!("VHOSTPIN OUT.");
    Ok(())
}

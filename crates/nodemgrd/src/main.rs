//! nodemgrd — node power/performance envelope daemon.
//!
//! Drives a `nodemgr_core::engine::Engine` through one tick every
//! `--interval-ms` milliseconds until a `SIGINT`/`SIGTERM` flips the
//! shutdown flag, the same shape `rpglotd`'s collection loop runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use nodemgr_core::budgeting::{Budgeting, SimpleDomainBudgeting, SubDomainConfig};
use nodemgr_core::clock::SystemClock;
use nodemgr_core::config::ConfigFile;
use nodemgr_core::control::{InMemoryControl, LoggingKnobWriter};
use nodemgr_core::domain::{DomainId, RaplDomainId};
use nodemgr_core::engine::{Engine, LoggingHostPowerControl, NullReadingSource, ReadingSource};
use nodemgr_core::reading::{ReadingBus, ReadingType, ALL_DEVICES};
use nodemgr_core::storage::PolicyStore;
use nodemgr_core::transport::{LoggingTransport, ObjectTree};

/// Node power/performance envelope daemon.
#[derive(Parser)]
#[command(name = "nodemgrd", about = "Node power/performance envelope daemon", version)]
struct Args {
    /// Tick interval in milliseconds.
    #[arg(short, long, default_value = "100")]
    interval_ms: u64,

    /// Directory persisted (`persistent`) policies are stored under.
    #[arg(short, long, default_value = "./policies")]
    storage_dir: String,

    /// Path to `general.conf.json` (domain presets, GPIO, SMaRT).
    #[arg(short, long, default_value = "./general.conf.json")]
    config_path: String,

    /// Number of GPIO lines available for `HwProtectionGpio`/`Gpio` triggers.
    #[arg(long, default_value = "0")]
    gpio_lines: u16,

    /// Feed synthetic readings instead of leaving the bus empty — useful for
    /// running the daemon without real sensor acquisition wired up.
    #[arg(long)]
    mock: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("nodemgrd={}", level).parse().unwrap())
        .add_directive(format!("nodemgr_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Publishes fixed, plausible readings on every poll so the daemon is
/// drivable without a real sensor backend (`--mock`).
struct SyntheticReadingSource;

impl ReadingSource for SyntheticReadingSource {
    fn poll(&mut self, bus: &mut ReadingBus, _now_ms: i64) {
        bus.publish(ReadingType::AcPower, ALL_DEVICES, 180.0);
        bus.publish(ReadingType::DcPower, ALL_DEVICES, 160.0);
        bus.publish(ReadingType::CpuPower, ALL_DEVICES, 90.0);
        bus.publish(ReadingType::DramPower, ALL_DEVICES, 25.0);
        bus.publish(ReadingType::PciePower, ALL_DEVICES, 15.0);
        bus.publish(ReadingType::InletTemperature, ALL_DEVICES, 24.0);
        bus.publish(ReadingType::CpuUtilization, ALL_DEVICES, 40.0);
        bus.publish(ReadingType::HostPower, ALL_DEVICES, 1.0);
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("nodemgrd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}ms, storage={}, config={}",
        args.interval_ms, args.storage_dir, args.config_path
    );

    let config = match ConfigFile::load(&args.config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, path = args.config_path, "failed to load config, aborting");
            std::process::exit(1);
        }
    };
    let shared_config = Arc::new(std::sync::Mutex::new(config));

    let policy_store = match PolicyStore::new(&args.storage_dir) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, dir = args.storage_dir, "failed to open policy storage, aborting");
            std::process::exit(1);
        }
    };

    let compound_budgeting = SimpleDomainBudgeting::new(
        vec![
            SubDomainConfig {
                rapl_domain_id: RaplDomainId::MemorySubsystem,
                p_coeff: 0.1,
                feedback_reading: ReadingType::DramPower,
                efficiency_reading: ReadingType::DramPower,
                efficiency_averaging_period_ms: 60_000,
                budget_correction: 0.0,
                capability_domain_id: DomainId::MemorySubsystem,
            },
            SubDomainConfig {
                rapl_domain_id: RaplDomainId::Pcie,
                p_coeff: 0.1,
                feedback_reading: ReadingType::PciePower,
                efficiency_reading: ReadingType::PciePower,
                efficiency_averaging_period_ms: 60_000,
                budget_correction: 0.0,
                capability_domain_id: DomainId::Pcie,
            },
        ],
        RaplDomainId::CpuSubsystem,
    );
    let control = InMemoryControl::new(Box::new(LoggingKnobWriter));
    let budgeting = Budgeting::new(Box::new(control), compound_budgeting);

    let object_tree = ObjectTree::new(Box::new(LoggingTransport::new()));
    let host_control = Box::new(LoggingHostPowerControl::default());
    let reading_source: Box<dyn ReadingSource> = if args.mock {
        Box::new(SyntheticReadingSource)
    } else {
        Box::new(NullReadingSource)
    };

    let mut engine = Engine::new(
        Box::new(SystemClock),
        reading_source,
        shared_config,
        policy_store,
        budgeting,
        object_tree,
        host_control,
        args.gpio_lines,
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Starting tick loop");

    let interval = Duration::from_millis(args.interval_ms);
    let sleep_interval = Duration::from_millis(100);

    while running.load(Ordering::SeqCst) {
        engine.tick();

        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutdown complete");
}

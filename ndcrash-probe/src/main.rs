mod fault;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use ndcrash::ReporterConfig;

use crate::fault::Fault;

/// Exit status when the process outlived the triggered signal.
const SURVIVED: i32 = 3;

#[derive(Debug, Parser)]
#[command(name = "ndcrash-probe")]
#[command(about = "Crashes under the ndcrash reporter", long_about = None)]
struct Args {
    #[clap(short, long, value_enum)]
    fault: Fault,

    #[clap(short, long, default_value = ndcrash::DEFAULT_SOCKET_NAME)]
    socket_name: String,

    /// Bound on connect, send and acknowledgment; unbounded when omitted.
    #[clap(short, long)]
    timeout_ms: Option<u64>,

    /// Skip writing a core file for the crash.
    #[clap(long)]
    no_core_dump: bool,

    #[clap(short, long)]
    verbose: bool,
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .init();

    if args.no_core_dump {
        let rlim = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        unsafe {
            if libc::setrlimit(libc::RLIMIT_CORE, &rlim) != 0 {
                warn!("Failed to disable core dumps");
            }
        }
    }

    let mut config = ReporterConfig::default()
        .with_socket_name(&args.socket_name)
        .context("invalid socket name")?;
    if let Some(ms) = args.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }

    ndcrash::init_with(config).context("failed to initialize crash reporting")?;
    info!(
        "Reporting to @{}, triggering {:?} (pid {})",
        args.socket_name,
        args.fault,
        std::process::id()
    );

    fault::trigger(args.fault)?;

    info!("Survived {:?}", args.fault);
    ndcrash::deinit();
    std::process::exit(SURVIVED);
}

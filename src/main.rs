//! nflog-ingest CLI entry point.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nflog_ingest::{CopyMode, EnobufsPolicy, SessionConfig};

#[derive(Parser, Debug)]
#[command(
    name = "nflog-ingest",
    about = "Print packets logged to an NFLOG group"
)]
struct Args {
    /// NFLOG group to bind (matches the --nflog-group of the firewall rule)
    #[arg(short, long, default_value_t = 0)]
    group: u32,

    /// Kernel-side flush timeout in seconds (0 = kernel default)
    #[arg(long, default_value_t = 0.0)]
    timeout: f64,

    /// Kernel queue threshold in messages (0 = kernel default)
    #[arg(long, default_value_t = 0)]
    qthresh: u64,

    /// Socket receive buffer in bytes (0 = leave as is)
    #[arg(long, default_value_t = 0)]
    rcvbuf: u64,

    /// Kernel-side netlink buffer size in bytes (0 = kernel default)
    #[arg(long, default_value_t = 0)]
    nlbuf: u64,

    /// Message-loss policy: raise, handle or disable
    #[arg(long, default_value_t = EnobufsPolicy::Raise)]
    enobufs: EnobufsPolicy,

    /// Packet copy mode: none, meta or packet
    #[arg(long, default_value_t = CopyMode::Packet)]
    copy_mode: CopyMode,

    /// Number of records to print before exiting (negative = unbounded)
    #[arg(short = 'n', long, default_value_t = -1)]
    count: i64,

    /// Print replayable capture dumps instead of formatted records
    #[arg(long)]
    raw: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[cfg(target_os = "linux")]
fn main() -> Result<()> {
    use nflog_ingest::IngestSession;

    let args = Args::parse();

    // Set up logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let config = SessionConfig {
        group: args.group,
        timeout: args.timeout,
        qthresh: args.qthresh,
        rcvbuf: args.rcvbuf,
        nlbuf: args.nlbuf,
        enobufs: args.enobufs,
        copy_mode: args.copy_mode,
    };

    let mut session = IngestSession::open(&config)?;

    if args.raw {
        let mut printed: i64 = 0;
        'drain: while args.count < 0 || printed < args.count {
            for capture in session.drain_raw()? {
                println!("{capture:?}");
                printed += 1;
                if args.count >= 0 && printed >= args.count {
                    break 'drain;
                }
            }
        }
        return Ok(());
    }

    let consumed = session.loop_consume(
        |record| {
            println!("{record}");
            Ok(())
        },
        args.count,
    )?;
    tracing::info!(consumed, "session ended");

    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() -> Result<()> {
    let _ = Args::parse();
    anyhow::bail!("nflog-ingest requires Linux (NFLOG is a netfilter subsystem)");
}

//! zoofuse - Mount a ZooKeeper tree as a FUSE filesystem.
//!
//! Usage: zoofuse [--zkconn host:port] [--zkroot /path] [--rw] <mountpoint>

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use zoofuse_core::ZkClient;
use zoofuse_fuse::config::DEFAULT_PROBE_CONCURRENCY;
use zoofuse_fuse::{MountConfig, MountContext, ZooMount};

#[derive(Parser)]
#[command(name = "zoofuse")]
#[command(about = "Mount a ZooKeeper tree as a FUSE filesystem")]
#[command(version)]
struct Cli {
    /// Directory to mount the tree on
    mountpoint: PathBuf,

    /// ZooKeeper path shown as the filesystem root
    #[arg(long, default_value = "/")]
    zkroot: String,

    /// ZooKeeper connection string (host:port[,host:port...])
    #[arg(long, default_value = "127.0.0.1:2181", env = "ZOOFUSE_ZKCONN")]
    zkconn: String,

    /// Mount read-write (default: read-only)
    #[arg(long)]
    rw: bool,

    /// Append logs to this file instead of stdout
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Maximum concurrent child probes per directory listing
    #[arg(long, default_value_t = DEFAULT_PROBE_CONCURRENCY)]
    probe_concurrency: usize,
}

fn open_logfile(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = if cli.debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match &cli.logfile {
        Some(path) => {
            let file = open_logfile(path)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .with(env_filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer())
                .with(env_filter)
                .init();
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    if !cli.mountpoint.is_dir() {
        anyhow::bail!("Mountpoint does not exist: {}", cli.mountpoint.display());
    }
    let mountpoint = std::fs::canonicalize(&cli.mountpoint)
        .with_context(|| format!("Failed to resolve mountpoint {}", cli.mountpoint.display()))?;

    info!(
        mountpoint = %mountpoint.display(),
        zkconn = %cli.zkconn,
        zkroot = %cli.zkroot,
        rw = cli.rw,
        logfile = ?cli.logfile,
        "Starting zoofuse"
    );

    let client = ZkClient::connect(&cli.zkconn)
        .with_context(|| format!("Failed to connect to ZooKeeper at {}", cli.zkconn))?;

    let config = MountConfig::default()
        .read_write(cli.rw)
        .probe_concurrency(cli.probe_concurrency);
    let ctx = MountContext {
        client,
        endpoint: cli.zkconn.clone(),
        root_alias: cli.zkroot.clone(),
        mountpoint: mountpoint.clone(),
    };

    let mut mount = ZooMount::mount(ctx, config).map_err(|e| {
        error!(error = %e, "Mount failed");
        anyhow::anyhow!("Failed to mount filesystem: {e}")
    })?;

    let unmounter = mount.unmounter();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, unmounting...");
        if let Err(e) = unmounter.unmount() {
            error!(error = %e, "Unmount on signal failed");
        }
    })
    .context("Failed to set signal handler")?;

    info!("Filesystem mounted at {} (press Ctrl+C to unmount)", mountpoint.display());
    mount.serve().context("Filesystem session failed")?;
    Ok(())
}

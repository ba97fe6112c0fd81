use std::fmt;
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use shmpoll_config::ShmPollConfig;
use shmpoll_core::events::{empty_event, event_data, event_flags, EventFlags};
use shmpoll_core::kernel::SystemEpoll;
use shmpoll_core::session::{Connection, MemorySession, SessionTable};
use shmpoll_core::EpollRegistry;
use tracing::info;

use crate::error::CliError;

/// Shared-memory descriptors in the probe are synthetic and sit well above
/// anything the kernel hands out.
const FIRST_SHARED_FD: i32 = 1 << 20;

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file; defaults to the layered `config/` lookup
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch a socket pair plus in-memory sessions and run one wait
    Probe(ProbeArgs),
    /// Print the effective configuration as YAML
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Wait timeout in milliseconds (negative blocks)
    #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
    pub timeout_ms: i32,
    /// Number of in-memory sessions to watch alongside the socket
    #[arg(long, default_value_t = 1)]
    pub shared: usize,
    /// Make the socket and every session readable before waiting
    #[arg(long)]
    pub ready: bool,
}

pub fn load_config(path: Option<&Path>) -> Result<ShmPollConfig, CliError> {
    Ok(match path {
        Some(path) => ShmPollConfig::load_from_path(path)?,
        None => ShmPollConfig::load()?,
    })
}

pub fn render_config(config: &ShmPollConfig) -> Result<String, CliError> {
    Ok(serde_yaml::to_string(config)?)
}

#[derive(Debug)]
pub struct ProbeReport {
    pub events: Vec<(u64, EventFlags)>,
    pub metrics: String,
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} event(s)", self.events.len())?;
        for (data, flags) in &self.events {
            writeln!(f, "  data={data} flags={flags:?}")?;
        }
        write!(f, "{}", self.metrics)
    }
}

pub fn run_probe(args: &ProbeArgs, config: &ShmPollConfig) -> Result<ProbeReport, CliError> {
    let sessions = Arc::new(SessionTable::new());
    let registry = EpollRegistry::new(Arc::new(SystemEpoll), sessions.clone(), config);
    let epfd = registry.create1(0)?;

    let (mut writer, reader) = UnixStream::pair()?;
    registry.add(epfd, reader.as_raw_fd(), EventFlags::IN, 0)?;

    let mut held = Vec::with_capacity(args.shared);
    for index in 0..args.shared {
        let session = Arc::new(MemorySession::new());
        session.set_writable(false);
        session.set_readable(args.ready);
        let connection: Arc<dyn Connection> = session.clone();
        let fd = FIRST_SHARED_FD + index as i32;
        sessions.attach(fd, &connection);
        registry.add(epfd, fd, EventFlags::IN, index as u64 + 1)?;
        held.push(session);
    }
    if args.ready {
        writer.write_all(b"probe")?;
    }
    info!(epfd, shared = args.shared, ready = args.ready, "probing");

    let mut buffer = vec![empty_event(); args.shared + 1];
    let ready = registry.wait(epfd, &mut buffer, args.timeout_ms)?;
    let events = buffer[..ready]
        .iter()
        .map(|event| (event_data(event), event_flags(event)))
        .collect();

    let metrics = registry
        .metrics()
        .map(|metrics| metrics.gather_metrics())
        .transpose()
        .map_err(|error| CliError::Metrics(error.to_string()))?
        .unwrap_or_default();
    registry.close(epfd)?;
    Ok(ProbeReport { events, metrics })
}

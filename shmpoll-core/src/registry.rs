//! ## shmpoll-core::registry
//! **Process-wide registry of emulated epoll instances**
//!
//! The instance table is built lazily on first use under the registry lock;
//! an atomic flag lets read-only queries skip the lock before that.
//! Control dispatch lives in `control.rs`, the wait engine in `wait/`.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use shmpoll_config::{ShmPollConfig, TableConfig, WaitConfig};
use shmpoll_telemetry::{EventLogger, MetricsRecorder};
use tracing::{debug, warn};

use crate::error::PollError;
use crate::instance::{EntryCounts, EntryStore, InstanceCell, InstanceTable};
use crate::kernel::{KernelPoller, SystemEpoll};
use crate::session::{Bridge, KernelOnly};

pub struct EpollRegistry {
    pub(crate) kernel: Arc<dyn KernelPoller>,
    pub(crate) bridge: Arc<dyn Bridge>,
    table_config: TableConfig,
    pub(crate) wait_config: WaitConfig,
    pub(crate) metrics: Option<MetricsRecorder>,
    initialized: AtomicBool,
    table: Mutex<Option<InstanceTable>>,
}

impl EpollRegistry {
    pub fn new(
        kernel: Arc<dyn KernelPoller>,
        bridge: Arc<dyn Bridge>,
        config: &ShmPollConfig,
    ) -> Self {
        Self {
            kernel,
            bridge,
            table_config: config.table.clone(),
            wait_config: config.wait.clone(),
            metrics: config.telemetry.metrics.then(MetricsRecorder::new),
            initialized: AtomicBool::new(false),
            table: Mutex::new(None),
        }
    }

    /// Record into `metrics` instead of a private recorder.
    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn metrics(&self) -> Option<&MetricsRecorder> {
        self.metrics.as_ref()
    }

    fn with_table<R>(&self, f: impl FnOnce(&mut InstanceTable) -> R) -> R {
        let mut guard = self.table.lock();
        let table = guard.get_or_insert_with(|| {
            debug!(
                capacity = self.table_config.capacity,
                "initialising epoll instance table"
            );
            self.initialized.store(true, Ordering::Release);
            InstanceTable::with_capacity(self.table_config.capacity)
        });
        f(table)
    }

    /// `epoll_create`: `size` is only checked for positivity.
    pub fn create(&self, size: i32) -> Result<RawFd, PollError> {
        if size <= 0 {
            return Err(PollError::invalid(format!("size must be positive, got {size}")));
        }
        self.create1(0)
    }

    /// `epoll_create1`: only `EPOLL_CLOEXEC` is accepted.
    pub fn create1(&self, flags: i32) -> Result<RawFd, PollError> {
        if flags & !libc::EPOLL_CLOEXEC != 0 {
            return Err(PollError::invalid(format!("unsupported create flags {flags:#x}")));
        }
        let epfd = self.kernel.create(flags)?;

        let stored = self.with_table(|table| {
            if !table.fits(epfd) {
                return Err(table.capacity());
            }
            let stale = table.insert(epfd, EntryStore::new(self.table_config.initial_overflow_capacity));
            Ok((stale, table.live()))
        });

        match stored {
            Ok((stale, live)) => {
                if let Some(stale) = stale {
                    warn!(
                        epfd,
                        entries = stale.lock().len(),
                        "replacing stale epoll instance left behind by an unregistered close"
                    );
                }
                if let Some(metrics) = &self.metrics {
                    metrics.live_instances.set(live as i64);
                }
                EventLogger::log_instance("created", epfd, 0);
                Ok(epfd)
            }
            Err(capacity) => {
                if let Err(error) = self.kernel.close(epfd) {
                    warn!(epfd, %error, "failed to release rejected epoll descriptor");
                }
                Err(PollError::ResourceExhausted { capacity })
            }
        }
    }

    /// Drop the instance and release its kernel descriptor.
    pub fn close(&self, epfd: RawFd) -> Result<(), PollError> {
        let (removed, live) = self.with_table(|table| (table.remove(epfd), table.live()));
        let removed = removed.ok_or(PollError::InstanceNotFound(epfd))?;
        let entries = removed.lock().len();
        if let Some(metrics) = &self.metrics {
            metrics.live_instances.set(live as i64);
        }
        EventLogger::log_instance("closed", epfd, entries);
        self.kernel.close(epfd)?;
        Ok(())
    }

    /// Whether `epfd` names a live instance.
    pub fn contains(&self, epfd: RawFd) -> bool {
        if !self.initialized.load(Ordering::Acquire) {
            return false;
        }
        self.with_table(|table| table.get(epfd).is_some())
    }

    /// Number of descriptors watched by `epfd`.
    pub fn instance_len(&self, epfd: RawFd) -> Result<usize, PollError> {
        Ok(self.lookup(epfd)?.lock().len())
    }

    pub fn counts(&self, epfd: RawFd) -> Result<EntryCounts, PollError> {
        Ok(self.lookup(epfd)?.lock().counts())
    }

    pub(crate) fn lookup(&self, epfd: RawFd) -> Result<InstanceCell, PollError> {
        self.with_table(|table| table.get(epfd))
            .ok_or(PollError::InstanceNotFound(epfd))
    }
}

static GLOBAL: OnceCell<EpollRegistry> = OnceCell::new();

/// Install the process-wide registry with a bridge and configuration.
///
/// Fails if the registry was already installed or lazily created.
pub fn install(
    bridge: Arc<dyn Bridge>,
    config: &ShmPollConfig,
) -> Result<&'static EpollRegistry, PollError> {
    GLOBAL
        .try_insert(EpollRegistry::new(Arc::new(SystemEpoll), bridge, config))
        .map_err(|_| PollError::invalid("global registry is already initialised"))
}

/// The process-wide registry, created on first use with the system epoll
/// facility and a bridge that routes nothing to shared memory.
pub fn global() -> &'static EpollRegistry {
    GLOBAL.get_or_init(|| {
        let config = ShmPollConfig::load().unwrap_or_else(|error| {
            warn!(%error, "falling back to default configuration");
            ShmPollConfig::default()
        });
        EpollRegistry::new(Arc::new(SystemEpoll), Arc::new(KernelOnly), &config)
    })
}

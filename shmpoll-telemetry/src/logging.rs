//! ## shmpoll-telemetry::logging
//! **Structured logging with `tracing`**
//!
//! `RUST_LOG` takes precedence over the configured level so a single run can
//! be turned up without touching configuration files.

use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

static INSTALLED: OnceCell<()> = OnceCell::new();

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Install the global fmt subscriber. Later calls are no-ops.
    pub fn init(default_level: &str) {
        INSTALLED.get_or_init(|| {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level));
            let _ = fmt()
                .with_env_filter(filter)
                .with_thread_names(true)
                .with_span_events(FmtSpan::CLOSE)
                .try_init();
        });
    }

    /// Record a lifecycle event for an instance handle.
    #[inline]
    pub fn log_instance(action: &str, epfd: i32, entries: usize) {
        let span = tracing::info_span!("epoll_instance", epfd, action);
        let _guard = span.enter();
        tracing::info!(entries, "Epoll instance {}", action);
    }
}

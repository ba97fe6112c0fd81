//! ## shmpoll-core::wait
//! **The wait engine**
//!
//! A wait is dispatched on the instance's entry counts alone:
//! - no shared-memory entries: straight to the kernel facility
//! - no kernel entries: shared-memory passes with spin/sleep backoff
//! - both: see `concurrent`

mod concurrent;
mod deadline;

use std::os::unix::io::RawFd;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::utils::Backoff;
use shmpoll_telemetry::{EventOrigin, WaitRegime};
use tracing::{instrument, trace};

use crate::error::PollError;
use crate::registry::EpollRegistry;

use concurrent::Rendezvous;
use deadline::Deadline;

/// Events delivered by each mechanism during one wait.
#[derive(Debug, Clone, Copy, Default)]
struct Delivered {
    real: usize,
    shared: usize,
}

impl EpollRegistry {
    /// `epoll_wait`: fill `events` with up to `events.len()` ready entries.
    ///
    /// `timeout_ms` follows the kernel convention: negative blocks without
    /// bound, zero polls once. Returns 0 on timeout.
    pub fn wait(
        &self,
        epfd: RawFd,
        events: &mut [libc::epoll_event],
        timeout_ms: i32,
    ) -> Result<usize, PollError> {
        self.pwait(epfd, events, timeout_ms, None)
    }

    /// `epoll_pwait`: as [`wait`](Self::wait), with `sigmask` installed for
    /// every kernel-side wait.
    #[instrument(level = "debug", skip(self, events, sigmask), fields(capacity = events.len()))]
    pub fn pwait(
        &self,
        epfd: RawFd,
        events: &mut [libc::epoll_event],
        timeout_ms: i32,
        sigmask: Option<&libc::sigset_t>,
    ) -> Result<usize, PollError> {
        if events.is_empty() {
            return Err(PollError::invalid("event buffer capacity must be positive"));
        }
        let cell = self.lookup(epfd)?;
        let (real, shared) = {
            let store = cell.lock();
            (store.real_count(), store.shared_count())
        };
        let started = Instant::now();
        let deadline = Deadline::after(timeout_ms);

        let regime = match (real, shared) {
            (_, 0) => WaitRegime::Real,
            (0, _) => WaitRegime::Virtual,
            _ => WaitRegime::Mixed,
        };
        trace!(real, shared, regime = regime.as_str(), "dispatching wait");

        let delivered = match regime {
            WaitRegime::Real => Delivered {
                real: self.kernel.wait(epfd, events, timeout_ms, sigmask)?,
                shared: 0,
            },
            WaitRegime::Virtual => Delivered {
                real: 0,
                shared: self.poll_shared(deadline, None, || cell.lock().collect_ready(events)),
            },
            WaitRegime::Mixed => self.concurrent_wait(epfd, &cell, events, deadline, sigmask)?,
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_wait(regime, started.elapsed().as_micros() as f64);
            metrics.record_events(EventOrigin::Real, delivered.real);
            metrics.record_events(EventOrigin::Virtual, delivered.shared);
        }
        Ok(delivered.real + delivered.shared)
    }

    /// Repeat `pass` until it reports something, the deadline passes, or the
    /// kernel side of a mixed wait has finished.
    fn poll_shared(
        &self,
        deadline: Deadline,
        rendezvous: Option<&Rendezvous>,
        mut pass: impl FnMut() -> usize,
    ) -> usize {
        let backoff = Backoff::new();
        let interval = Duration::from_micros(self.wait_config.poll_interval_us);
        loop {
            let found = pass();
            if found > 0 {
                return found;
            }
            if deadline.expired() || rendezvous.is_some_and(Rendezvous::kernel_finished) {
                return 0;
            }
            if backoff.is_completed() {
                let nap = deadline.remaining().map_or(interval, |left| left.min(interval));
                thread::sleep(nap);
            } else {
                backoff.snooze();
            }
        }
    }
}

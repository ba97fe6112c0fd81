//! Mixed waits: kernel and shared-memory descriptors in one instance.
//!
//! When shared-memory entries are already ready, both sides are polled once
//! without blocking. The buffer is split so neither side can starve the
//! other: with room for two or more events the shared side keeps up to half,
//! with room for one the sides take turns.
//!
//! Otherwise the kernel side runs on a scoped background thread and owns the
//! whole output buffer. It waits in short slices and gives up between slices
//! once the caller has seen shared-memory readiness. The caller only peeks at
//! shared-memory entries while the kernel side runs; edges and one-shot
//! state are consumed in a single pass after the join, into whatever part
//! of the buffer the kernel left free.

use std::io;
use std::os::unix::io::RawFd;
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use tracing::{debug, trace};

use super::{Deadline, Delivered};
use crate::error::PollError;
use crate::instance::InstanceCell;
use crate::registry::EpollRegistry;

const KERNEL_THREAD_NAME: &str = "shmpoll-kernel-wait";

/// Progress shared by the two sides of a mixed wait.
#[derive(Debug, Default)]
pub(crate) struct Rendezvous {
    events: AtomicUsize,
    kernel_done: AtomicBool,
}

impl Rendezvous {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn publish(&self, count: usize) {
        self.events.fetch_add(count, Ordering::AcqRel);
    }

    pub(crate) fn has_events(&self) -> bool {
        self.events.load(Ordering::Acquire) > 0
    }

    fn finish_kernel(&self) {
        self.kernel_done.store(true, Ordering::Release);
    }

    pub(crate) fn kernel_finished(&self) -> bool {
        self.kernel_done.load(Ordering::Acquire)
    }
}

/// Slots kept back from the kernel when `ready_shared` shared-memory entries
/// are already ready.
fn shared_reserve(capacity: usize, ready_shared: usize, shared_first: bool) -> usize {
    match capacity {
        0 => 0,
        1 => usize::from(shared_first && ready_shared > 0),
        _ => ready_shared.min(capacity / 2),
    }
}

/// Marks the kernel side finished however it exits.
struct FinishOnDrop<'a>(&'a Rendezvous);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish_kernel();
    }
}

impl EpollRegistry {
    pub(super) fn concurrent_wait(
        &self,
        epfd: RawFd,
        cell: &InstanceCell,
        events: &mut [libc::epoll_event],
        deadline: Deadline,
        sigmask: Option<&libc::sigset_t>,
    ) -> Result<Delivered, PollError> {
        let slice_ms = i32::try_from(self.wait_config.kernel_slice_ms).unwrap_or(i32::MAX);
        let (ready_shared, shared_first) = {
            let mut store = cell.lock();
            (store.ready_shared(), store.take_shared_turn())
        };
        if ready_shared > 0 {
            let kernel_room = events.len() - shared_reserve(events.len(), ready_shared, shared_first);
            let real = match kernel_room {
                0 => 0,
                room => self.kernel.wait(epfd, &mut events[..room], 0, sigmask)?,
            };
            let shared = cell.lock().collect_ready(&mut events[real..]);
            trace!(epfd, real, shared, shared_first, "mixed wait, shared side already ready");
            if real + shared > 0 {
                return Ok(Delivered { real, shared });
            }
        }

        loop {
            let rendezvous = &Rendezvous::new();
            let kernel_events = &mut *events;
            let real = thread::scope(|scope| -> Result<usize, PollError> {
                let handle = thread::Builder::new()
                    .name(KERNEL_THREAD_NAME.into())
                    .spawn_scoped(scope, move || {
                        self.kernel_wait_sliced(epfd, kernel_events, deadline, slice_ms, sigmask, rendezvous)
                    })?;

                let seen = self.poll_shared(deadline, Some(rendezvous), || {
                    usize::from(cell.lock().has_ready())
                });
                if seen > 0 {
                    rendezvous.publish(seen);
                }

                match handle.join() {
                    Ok(result) => Ok(result?),
                    Err(payload) => panic::resume_unwind(payload),
                }
            })?;

            let shared = match events.get_mut(real..) {
                Some(rest) if !rest.is_empty() => cell.lock().collect_ready(rest),
                _ => 0,
            };
            trace!(epfd, real, shared, "mixed wait pass");

            if real + shared > 0 || deadline.expired() {
                return Ok(Delivered { real, shared });
            }
            debug!(epfd, "shared-memory readiness vanished before delivery, waiting again");
        }
    }

    /// Kernel side of a blocking mixed wait. Fills the front of `events`.
    fn kernel_wait_sliced(
        &self,
        epfd: RawFd,
        events: &mut [libc::epoll_event],
        deadline: Deadline,
        slice_ms: i32,
        sigmask: Option<&libc::sigset_t>,
        rendezvous: &Rendezvous,
    ) -> io::Result<usize> {
        let _finish = FinishOnDrop(rendezvous);
        loop {
            let ready = self.kernel.wait(epfd, events, deadline.slice_ms(slice_ms), sigmask)?;
            if ready > 0 {
                rendezvous.publish(ready);
                return Ok(ready);
            }
            if rendezvous.has_events() || deadline.expired() {
                return Ok(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{empty_event, event_data, event_flags, EventFlags};
    use crate::session::{Connection, MemorySession};
    use crate::testing::{scripted_registry, shared_registry, Pipe, ScriptedKernel};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn ready_session() -> Arc<dyn Connection> {
        let session = Arc::new(MemorySession::new());
        session.set_readable(true);
        session
    }

    #[test]
    fn rendezvous_tracks_both_sides() {
        let rendezvous = Rendezvous::new();
        assert!(!rendezvous.has_events());
        assert!(!rendezvous.kernel_finished());
        {
            let _finish = FinishOnDrop(&rendezvous);
            rendezvous.publish(2);
        }
        assert!(rendezvous.has_events());
        assert!(rendezvous.kernel_finished());
    }

    #[test]
    fn shared_readiness_cuts_a_long_kernel_wait_short() {
        let (registry, sessions) = shared_registry();
        let epfd = registry.create1(0).unwrap();
        let pipe = Pipe::new();
        registry.add(epfd, pipe.read_fd(), EventFlags::IN, 1).unwrap();
        let connection = ready_session();
        sessions.attach(80_000, &connection);
        registry.add(epfd, 80_000, EventFlags::IN, 2).unwrap();

        let started = Instant::now();
        let mut events = [empty_event(); 4];
        assert_eq!(registry.wait(epfd, &mut events, 1000).unwrap(), 1);
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(event_data(&events[0]), 2);
        assert_eq!(event_flags(&events[0]), EventFlags::IN);
        registry.close(epfd).unwrap();
    }

    #[test]
    fn kernel_readiness_ends_the_shared_polling() {
        let (registry, sessions) = shared_registry();
        let epfd = registry.create1(0).unwrap();
        let pipe = Pipe::new();
        registry.add(epfd, pipe.read_fd(), EventFlags::IN, 1).unwrap();
        let idle: Arc<dyn Connection> = Arc::new(MemorySession::new());
        sessions.attach(80_001, &idle);
        registry.add(epfd, 80_001, EventFlags::IN, 2).unwrap();

        let writer = {
            let write_fd = pipe.write_fd();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                Pipe::write_to(write_fd, b"wake");
            })
        };
        let mut events = [empty_event(); 4];
        assert_eq!(registry.wait(epfd, &mut events, -1).unwrap(), 1);
        assert_eq!(event_data(&events[0]), 1);
        writer.join().unwrap();

        let metrics = registry.metrics().unwrap();
        assert_eq!(metrics.waits_for(shmpoll_telemetry::WaitRegime::Mixed), 1);
        assert_eq!(metrics.events_for(shmpoll_telemetry::EventOrigin::Real), 1);
        registry.close(epfd).unwrap();
    }

    #[test]
    fn both_sides_merge_into_one_result() {
        let (registry, sessions) = shared_registry();
        let epfd = registry.create1(0).unwrap();
        let pipe = Pipe::new();
        pipe.write(b"x");
        registry.add(epfd, pipe.read_fd(), EventFlags::IN, 1).unwrap();
        let connection = ready_session();
        sessions.attach(80_002, &connection);
        registry.add(epfd, 80_002, EventFlags::IN, 2).unwrap();

        let mut events = [empty_event(); 4];
        assert_eq!(registry.wait(epfd, &mut events, 100).unwrap(), 2);
        let mut data: Vec<u64> = events[..2].iter().map(event_data).collect();
        data.sort_unstable();
        assert_eq!(data, vec![1, 2]);
        registry.close(epfd).unwrap();
    }

    #[test]
    fn mixed_timeout_with_nothing_ready() {
        let (registry, sessions) = shared_registry();
        let epfd = registry.create1(0).unwrap();
        let pipe = Pipe::new();
        registry.add(epfd, pipe.read_fd(), EventFlags::IN, 1).unwrap();
        let idle: Arc<dyn Connection> = Arc::new(MemorySession::new());
        sessions.attach(80_003, &idle);
        registry.add(epfd, 80_003, EventFlags::IN, 2).unwrap();

        let started = Instant::now();
        let mut events = [empty_event(); 4];
        assert_eq!(registry.wait(epfd, &mut events, 30).unwrap(), 0);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(1000));
        registry.close(epfd).unwrap();
    }

    #[test]
    fn shared_side_keeps_part_of_the_buffer() {
        assert_eq!(shared_reserve(1, 3, true), 1);
        assert_eq!(shared_reserve(1, 3, false), 0);
        assert_eq!(shared_reserve(1, 0, true), 0);
        assert_eq!(shared_reserve(2, 5, false), 1);
        assert_eq!(shared_reserve(8, 2, false), 2);
        assert_eq!(shared_reserve(8, 9, true), 4);
    }

    #[test]
    fn always_ready_sides_share_the_buffer() {
        let (registry, sessions) = shared_registry();
        let epfd = registry.create1(0).unwrap();
        let pipe = Pipe::new();
        pipe.write(b"x");
        registry.add(epfd, pipe.read_fd(), EventFlags::IN, 1).unwrap();
        let connection = ready_session();
        sessions.attach(80_005, &connection);
        registry.add(epfd, 80_005, EventFlags::IN, 2).unwrap();

        let mut single = [empty_event(); 1];
        let mut seen = Vec::new();
        for _ in 0..4 {
            assert_eq!(registry.wait(epfd, &mut single, 100).unwrap(), 1);
            seen.push(event_data(&single[0]));
        }
        assert_eq!(seen.iter().filter(|data| **data == 1).count(), 2);
        assert_eq!(seen.iter().filter(|data| **data == 2).count(), 2);

        let mut pair = [empty_event(); 2];
        for _ in 0..3 {
            assert_eq!(registry.wait(epfd, &mut pair, 100).unwrap(), 2);
            let mut data: Vec<u64> = pair.iter().map(event_data).collect();
            data.sort_unstable();
            assert_eq!(data, vec![1, 2]);
        }
        registry.close(epfd).unwrap();
    }

    #[test]
    fn edge_that_drops_and_rises_during_a_wait_is_delivered() {
        let (registry, sessions) = shared_registry();
        let epfd = registry.create1(0).unwrap();
        let pipe = Pipe::new();
        registry.add(epfd, pipe.read_fd(), EventFlags::IN, 1).unwrap();
        let session = Arc::new(MemorySession::new());
        session.set_readable(true);
        let connection: Arc<dyn Connection> = session.clone();
        sessions.attach(80_006, &connection);
        registry
            .add(epfd, 80_006, EventFlags::IN | EventFlags::ET, 2)
            .unwrap();

        let mut events = [empty_event(); 2];
        assert_eq!(registry.wait(epfd, &mut events, 0).unwrap(), 1);
        assert_eq!(registry.wait(epfd, &mut events, 0).unwrap(), 0);

        let toggler = {
            let session = session.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                session.set_readable(false);
                thread::sleep(Duration::from_millis(20));
                session.set_readable(true);
            })
        };
        let started = Instant::now();
        assert_eq!(registry.wait(epfd, &mut events, 2000).unwrap(), 1);
        assert_eq!(event_data(&events[0]), 2);
        assert!(started.elapsed() < Duration::from_millis(1500));
        toggler.join().unwrap();
        registry.close(epfd).unwrap();
    }

    #[test]
    fn kernel_failure_is_reported() {
        let kernel = Arc::new(ScriptedKernel::starting_at(20).failing_wait(libc::EINTR));
        let (registry, sessions) = scripted_registry(kernel);
        let epfd = registry.create1(0).unwrap();
        registry.add(epfd, 5, EventFlags::IN, 1).unwrap();
        let idle: Arc<dyn Connection> = Arc::new(MemorySession::new());
        sessions.attach(80_004, &idle);
        registry.add(epfd, 80_004, EventFlags::IN, 2).unwrap();

        let mut events = [empty_event(); 2];
        let error = registry.wait(epfd, &mut events, -1).unwrap_err();
        assert_eq!(error.errno(), libc::EINTR);
    }
}

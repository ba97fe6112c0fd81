use std::time::{Duration, Instant};

/// Wall-clock budget of one wait call, fixed at entry.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Deadline {
    Never,
    Immediate,
    At(Instant),
}

impl Deadline {
    /// Kernel timeout convention: negative waits forever, zero polls once.
    pub(crate) fn after(timeout_ms: i32) -> Self {
        match timeout_ms {
            t if t < 0 => Deadline::Never,
            0 => Deadline::Immediate,
            t => Deadline::At(Instant::now() + Duration::from_millis(t as u64)),
        }
    }

    pub(crate) fn expired(&self) -> bool {
        match self {
            Deadline::Never => false,
            Deadline::Immediate => true,
            Deadline::At(at) => Instant::now() >= *at,
        }
    }

    /// Time left, `None` when unbounded.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        match self {
            Deadline::Never => None,
            Deadline::Immediate => Some(Duration::ZERO),
            Deadline::At(at) => Some(at.saturating_duration_since(Instant::now())),
        }
    }

    /// Kernel timeout for the next wait, never longer than `slice_ms`.
    pub(crate) fn slice_ms(&self, slice_ms: i32) -> i32 {
        match self.remaining() {
            None => slice_ms,
            Some(left) => {
                let millis = left.as_micros().div_ceil(1000);
                millis.min(slice_ms as u128) as i32
            }
        }
    }
}

//! ## shmpoll-telemetry::metrics
//! **Prometheus exporter for wait regimes and delivered events**

use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};

/// Algorithm a wait call was dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitRegime {
    Real,
    Virtual,
    Mixed,
}

impl WaitRegime {
    pub fn as_str(self) -> &'static str {
        match self {
            WaitRegime::Real => "real",
            WaitRegime::Virtual => "virtual",
            WaitRegime::Mixed => "mixed",
        }
    }
}

/// Which mechanism produced a delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    Real,
    Virtual,
}

impl EventOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            EventOrigin::Real => "real",
            EventOrigin::Virtual => "virtual",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub waits: IntCounterVec,
    pub events: IntCounterVec,
    pub wait_latency: Histogram,
    pub live_instances: IntGauge,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();

        let waits = IntCounterVec::new(
            Opts::new("shmpoll_waits_total", "Wait calls by dispatch regime"),
            &["regime"],
        )
        .expect("static metric definition");
        let events = IntCounterVec::new(
            Opts::new("shmpoll_events_total", "Delivered readiness events by origin"),
            &["origin"],
        )
        .expect("static metric definition");
        let wait_latency = Histogram::with_opts(
            HistogramOpts::new("shmpoll_wait_latency_us", "Wall-clock time spent inside wait")
                .buckets(vec![10.0, 100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0]),
        )
        .expect("static metric definition");
        let live_instances = IntGauge::new("shmpoll_instances_live", "Open epoll instances")
            .expect("static metric definition");

        registry
            .register(Box::new(waits.clone()))
            .expect("metric registered once");
        registry
            .register(Box::new(events.clone()))
            .expect("metric registered once");
        registry
            .register(Box::new(wait_latency.clone()))
            .expect("metric registered once");
        registry
            .register(Box::new(live_instances.clone()))
            .expect("metric registered once");

        Self {
            registry,
            waits,
            events,
            wait_latency,
            live_instances,
        }
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    #[inline]
    pub fn record_wait(&self, regime: WaitRegime, micros: f64) {
        self.waits.with_label_values(&[regime.as_str()]).inc();
        self.wait_latency.observe(micros);
    }

    #[inline]
    pub fn record_events(&self, origin: EventOrigin, count: usize) {
        if count > 0 {
            self.events
                .with_label_values(&[origin.as_str()])
                .inc_by(count as u64);
        }
    }

    pub fn waits_for(&self, regime: WaitRegime) -> u64 {
        self.waits.with_label_values(&[regime.as_str()]).get()
    }

    pub fn events_for(&self, origin: EventOrigin) -> u64 {
        self.events.with_label_values(&[origin.as_str()]).get()
    }
}

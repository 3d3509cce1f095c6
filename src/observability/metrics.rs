use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Tick flow
    pub static ref TICKS_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("ticks_received_total", "Ticks received from upstream by source"),
        &["source"]
    ).unwrap();

    pub static ref TICKS_FORWARDED: IntCounterVec = IntCounterVec::new(
        Opts::new("ticks_forwarded_total", "Ticks published to subscribers by source"),
        &["source"]
    ).unwrap();

    pub static ref TICKS_SUPPRESSED: IntCounterVec = IntCounterVec::new(
        Opts::new("ticks_suppressed_total", "Accepted ticks not forwarded because their source is inactive"),
        &["source"]
    ).unwrap();

    pub static ref TICKS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("ticks_rejected_total", "Ticks rejected by validation"),
        &["source", "reason"]
    ).unwrap();

    pub static ref DIVERGENCE_FLAGS: IntCounterVec = IntCounterVec::new(
        Opts::new("cross_source_divergence_total", "Accepted ticks flagged for cross-source divergence"),
        &["symbol"]
    ).unwrap();

    pub static ref CIRCUIT_TRIPS: IntCounterVec = IntCounterVec::new(
        Opts::new("circuit_breaker_trips_total", "Price jump guard trips"),
        &["source"]
    ).unwrap();

    // Source health
    pub static ref SOURCE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("source_failures_total", "Failure signals by source"),
        &["source"]
    ).unwrap();

    pub static ref SOURCE_HEALTHY: IntGaugeVec = IntGaugeVec::new(
        Opts::new("source_healthy", "1 when the source is healthy"),
        &["source"]
    ).unwrap();

    pub static ref RECONNECT_ATTEMPTS: IntCounter = IntCounter::new(
        "stream_reconnect_attempts_total",
        "Streaming connection attempts after the first"
    ).unwrap();

    pub static ref POLL_CYCLES: IntCounterVec = IntCounterVec::new(
        Opts::new("poll_cycles_total", "Polling cycles by outcome"),
        &["outcome"]
    ).unwrap();

    pub static ref POLL_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "poll_latency_seconds",
            "Quote fetch latency"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
    ).unwrap();

    // Failover
    pub static ref ROUTER_PHASE: IntGauge = IntGauge::new(
        "router_phase",
        "Current phase (0 startup, 1 primary, 2 fallback, 3 both unavailable)"
    ).unwrap();

    pub static ref PHASE_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("phase_transitions_total", "Router phase transitions"),
        &["from", "to"]
    ).unwrap();

    pub static ref FALLBACK_ACTIVATIONS: IntCounter = IntCounter::new(
        "fallback_activations_total",
        "Switches from primary to secondary"
    ).unwrap();

    // Distribution
    pub static ref SUBSCRIBERS: IntGauge = IntGauge::new(
        "tick_subscribers",
        "Attached tick subscribers"
    ).unwrap();

    pub static ref TICKS_DROPPED: IntCounter = IntCounter::new(
        "ticks_dropped_total",
        "Ticks lost by lagging subscribers"
    ).unwrap();

    pub static ref EVENT_PROCESSING_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "event_processing_latency_seconds",
            "Router handling time per feed event"
        ).buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005])
    ).unwrap();
}

/// Registers every collector. Safe to call more than once.
pub fn register_metrics() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(TICKS_RECEIVED.clone()),
        Box::new(TICKS_FORWARDED.clone()),
        Box::new(TICKS_SUPPRESSED.clone()),
        Box::new(TICKS_REJECTED.clone()),
        Box::new(DIVERGENCE_FLAGS.clone()),
        Box::new(CIRCUIT_TRIPS.clone()),
        Box::new(SOURCE_FAILURES.clone()),
        Box::new(SOURCE_HEALTHY.clone()),
        Box::new(RECONNECT_ATTEMPTS.clone()),
        Box::new(POLL_CYCLES.clone()),
        Box::new(POLL_LATENCY.clone()),
        Box::new(ROUTER_PHASE.clone()),
        Box::new(PHASE_TRANSITIONS.clone()),
        Box::new(FALLBACK_ACTIVATIONS.clone()),
        Box::new(SUBSCRIBERS.clone()),
        Box::new(TICKS_DROPPED.clone()),
        Box::new(EVENT_PROCESSING_LATENCY.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Prometheus text exposition of the registry.
pub fn render() -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

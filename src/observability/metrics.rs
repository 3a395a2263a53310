use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_requests_total: IntCounterVec,
    pub offer_transitions_total: IntCounterVec,
    pub broadcast_expirations_total: IntCounter,
    pub routing_fallbacks_total: IntCounter,
    pub ranking_latency_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_requests_total = IntCounterVec::new(
            Opts::new("dispatch_requests_total", "Dispatch requests created by mode"),
            &["mode"],
        )
        .expect("valid dispatch_requests_total metric");

        let offer_transitions_total = IntCounterVec::new(
            Opts::new(
                "offer_transitions_total",
                "Offers moved out of their previous status, by new status",
            ),
            &["status"],
        )
        .expect("valid offer_transitions_total metric");

        let broadcast_expirations_total = IntCounter::new(
            "broadcast_expirations_total",
            "Broadcast requests cancelled because nobody responded in time",
        )
        .expect("valid broadcast_expirations_total metric");

        let routing_fallbacks_total = IntCounter::new(
            "routing_fallbacks_total",
            "Road distance lookups answered with the straight-line distance",
        )
        .expect("valid routing_fallbacks_total metric");

        let ranking_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "ranking_latency_seconds",
            "Latency of candidate ranking in seconds",
        ))
        .expect("valid ranking_latency_seconds metric");

        registry
            .register(Box::new(dispatch_requests_total.clone()))
            .expect("register dispatch_requests_total");
        registry
            .register(Box::new(offer_transitions_total.clone()))
            .expect("register offer_transitions_total");
        registry
            .register(Box::new(broadcast_expirations_total.clone()))
            .expect("register broadcast_expirations_total");
        registry
            .register(Box::new(routing_fallbacks_total.clone()))
            .expect("register routing_fallbacks_total");
        registry
            .register(Box::new(ranking_latency_seconds.clone()))
            .expect("register ranking_latency_seconds");

        Self {
            registry,
            dispatch_requests_total,
            offer_transitions_total,
            broadcast_expirations_total,
            routing_fallbacks_total,
            ranking_latency_seconds,
        }
    }

    pub fn record_transition(&self, status: &str, count: usize) {
        if count > 0 {
            self.offer_transitions_total
                .with_label_values(&[status])
                .inc_by(count as u64);
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

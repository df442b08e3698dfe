use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub lifecycle_transitions_total: IntCounterVec,
    pub operation_failures_total: IntCounterVec,
    pub scheduler_pass_seconds: HistogramVec,
    pub scheduler_backlog: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let lifecycle_transitions_total = IntCounterVec::new(
            Opts::new(
                "lifecycle_transitions_total",
                "Committed status changes by entity and resulting status",
            ),
            &["entity", "status"],
        )
        .expect("valid lifecycle_transitions_total metric");

        let operation_failures_total = IntCounterVec::new(
            Opts::new(
                "operation_failures_total",
                "Failed lifecycle operations by operation and error kind",
            ),
            &["operation", "kind"],
        )
        .expect("valid operation_failures_total metric");

        let scheduler_pass_seconds = HistogramVec::new(
            HistogramOpts::new(
                "scheduler_pass_seconds",
                "Duration of one scheduler job within a pass in seconds",
            ),
            &["job"],
        )
        .expect("valid scheduler_pass_seconds metric");

        let scheduler_backlog = IntGauge::new(
            "scheduler_backlog",
            "Items found due for a transition in the last scheduler pass",
        )
        .expect("valid scheduler_backlog metric");

        registry
            .register(Box::new(lifecycle_transitions_total.clone()))
            .expect("register lifecycle_transitions_total");
        registry
            .register(Box::new(operation_failures_total.clone()))
            .expect("register operation_failures_total");
        registry
            .register(Box::new(scheduler_pass_seconds.clone()))
            .expect("register scheduler_pass_seconds");
        registry
            .register(Box::new(scheduler_backlog.clone()))
            .expect("register scheduler_backlog");

        Self {
            registry,
            lifecycle_transitions_total,
            operation_failures_total,
            scheduler_pass_seconds,
            scheduler_backlog,
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

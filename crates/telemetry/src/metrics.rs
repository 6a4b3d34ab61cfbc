use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Verification Service Metrics ====
    pub static ref VERIFY_ENROLLMENTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("verify_enrollments_total", "Identity document enrollments"),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref VERIFY_ATTEMPTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("verify_attempts_total", "Live frame verification attempts"),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref VERIFY_MATCH_DISTANCE: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "verify_match_distance",
                "Embedding distance between live frame and enrolled document",
            )
            .buckets(vec![2.5, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 40.0, 60.0]),
            &["verdict"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref VERIFY_PIPELINE_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "verify_pipeline_seconds",
                "Time spent per face pipeline stage",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref VERIFY_STATELESS_MODE: IntGauge = {
        let metric = IntGauge::new(
            "verify_stateless_mode",
            "1 when no identity store is configured and verification always passes",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

//! Prometheus counters for redaction activity.

use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};

/// Redaction counters on a private registry. Cheap to clone.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    groups: IntCounterVec,
    calls: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let groups = IntCounterVec::new(
            Opts::new(
                "redactor_redaction_groups_total",
                "Plugin groups processed, by outcome.",
            ),
            &["outcome"],
        )?;
        let calls = IntCounterVec::new(
            Opts::new(
                "redactor_redaction_calls_total",
                "Redaction calls, by entry point and result.",
            ),
            &["entry_point", "result"],
        )?;

        registry.register(Box::new(groups.clone()))?;
        registry.register(Box::new(calls.clone()))?;

        Ok(Self {
            registry,
            groups,
            calls,
        })
    }

    /// `outcome` is `succeeded` or a failure stage.
    pub fn record_group(&self, outcome: &str) {
        self.groups.with_label_values(&[outcome]).inc();
    }

    /// `result` is one of `ok`, `partial`, `rejected`, `error`.
    pub fn record_call(&self, entry_point: &str, result: &str) {
        self.calls.with_label_values(&[entry_point, result]).inc();
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

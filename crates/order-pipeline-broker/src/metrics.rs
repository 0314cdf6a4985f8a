use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// Prometheus metrics for the pipeline
pub struct PipelineMetrics {
    pub registry: Registry,

    // Message counters
    pub messages_dispatched: IntCounterVec,
    pub messages_handled: IntCounterVec,

    // Handling duration
    pub handling_duration: HistogramVec,

    // Failure routing
    pub retries: IntCounter,
    pub dead_letters: IntCounter,

    pub queue_depth: IntGauge,
}

impl PipelineMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let messages_dispatched = IntCounterVec::new(
            Opts::new("op_messages_dispatched_total", "Messages accepted by the dispatcher by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(messages_dispatched.clone()))?;

        let messages_handled = IntCounterVec::new(
            Opts::new("op_messages_handled_total", "Handled messages by kind and outcome"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(messages_handled.clone()))?;

        let handling_duration = HistogramVec::new(
            HistogramOpts::new(
                "op_handling_duration_seconds",
                "Message handling duration in seconds",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(handling_duration.clone()))?;

        let retries = IntCounter::new("op_retries_total", "Messages re-dispatched after a transient failure")?;
        registry.register(Box::new(retries.clone()))?;

        let dead_letters = IntCounter::new("op_dead_letters_total", "Messages routed to the dead-letter sink")?;
        registry.register(Box::new(dead_letters.clone()))?;

        let queue_depth = IntGauge::new("op_queue_depth", "Pending envelopes, delayed ones included")?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(PipelineMetrics {
            registry,
            messages_dispatched,
            messages_handled,
            handling_duration,
            retries,
            dead_letters,
            queue_depth,
        })
    }

    pub fn inc_dispatched(&self, kind: &str) {
        self.messages_dispatched.with_label_values(&[kind]).inc();
    }

    pub fn inc_handled(&self, kind: &str, outcome: &str) {
        self.messages_handled
            .with_label_values(&[kind, outcome])
            .inc();
    }

    /// Record message handling duration
    pub fn observe_handling_duration(&self, kind: &str, duration_secs: f64) {
        self.handling_duration
            .with_label_values(&[kind])
            .observe(duration_secs);
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_registered() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.inc_dispatched("place_order");
        metrics.inc_handled("place_order", "success");
        metrics.observe_handling_duration("place_order", 0.01);
        metrics.dead_letters.inc();

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();

        assert!(names.contains(&"op_messages_dispatched_total".to_string()));
        assert!(names.contains(&"op_messages_handled_total".to_string()));
        assert!(names.contains(&"op_handling_duration_seconds".to_string()));
        assert!(names.contains(&"op_dead_letters_total".to_string()));
        assert_eq!(
            metrics.messages_dispatched.with_label_values(&["place_order"]).get(),
            1
        );
    }

    #[test]
    fn test_independent_registries() {
        let a = PipelineMetrics::new().unwrap();
        let b = PipelineMetrics::new().unwrap();
        a.retries.inc();

        assert_eq!(a.retries.get(), 1);
        assert_eq!(b.retries.get(), 0);
    }
}

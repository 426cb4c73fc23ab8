use crate::{reconcile::Outcome, Queue};
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{counter::Counter, family::Family, gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    reconciles: Family<OutcomeLabels, Counter>,
    failures: Counter,
    invalid_keys: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: &'static str,
}

#[derive(Debug)]
struct QueueDepth(Queue);

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(reg: &mut Registry, queue: Queue) -> Self {
        let reconciles = Family::default();
        reg.register(
            "reconciles",
            "Count of TrafficSplit keys reconciled successfully, by outcome",
            reconciles.clone(),
        );

        let failures = Counter::default();
        reg.register(
            "reconcile_failures",
            "Count of reconciliations that failed and were requeued",
            failures.clone(),
        );

        let invalid_keys = Counter::default();
        reg.register(
            "invalid_keys",
            "Count of malformed keys discarded without reconciliation",
            invalid_keys.clone(),
        );

        reg.register_collector(Box::new(QueueDepth(queue)));

        Self {
            reconciles,
            failures,
            invalid_keys,
        }
    }

    pub(crate) fn reconciled(&self, outcome: Outcome) {
        self.reconciles
            .get_or_create(&OutcomeLabels {
                outcome: outcome.as_str(),
            })
            .inc();
    }

    pub(crate) fn failed(&self) {
        self.failures.inc();
    }

    pub(crate) fn invalid_key(&self) {
        self.invalid_keys.inc();
    }
}

impl Collector for QueueDepth {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let depth_encoder = encoder.encode_descriptor(
            "queue_depth",
            "The number of TrafficSplit keys waiting to be reconciled",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(self.0.len() as u32).encode(depth_encoder)?;
        Ok(())
    }
}

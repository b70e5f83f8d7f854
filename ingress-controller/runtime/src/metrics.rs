use crate::index::SharedCache;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{counter::Counter, family::Family, gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub struct Metrics {
    publishes: Family<ResultLabels, Counter>,
    starts: Family<ResultLabels, Counter>,
    lookups: Counter,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct ResultLabels {
    result: &'static str,
}

#[derive(Debug)]
struct Instrumented(SharedCache);

// === impl Metrics ===

impl Metrics {
    pub fn register(reg: &mut Registry, cache: SharedCache) -> Self {
        let publishes = Family::<ResultLabels, Counter>::default();
        reg.register(
            "publishes",
            "Total number of routing configuration publishes",
            publishes.clone(),
        );

        let starts = Family::<ResultLabels, Counter>::default();
        reg.register(
            "supervisor_starts",
            "Total number of attempts to start the routing process",
            starts.clone(),
        );

        let lookups = Counter::default();
        reg.register(
            "lookups",
            "Total number of backend lookups made on membership cache misses",
            lookups.clone(),
        );

        reg.register_collector(Box::new(Instrumented(cache)));

        Self {
            publishes,
            starts,
            lookups,
        }
    }

    pub(crate) fn publish(&self, ok: bool) {
        self.publishes.get_or_create(&ResultLabels::new(ok)).inc();
    }

    pub(crate) fn start(&self, ok: bool) {
        self.starts.get_or_create(&ResultLabels::new(ok)).inc();
    }

    pub(crate) fn lookup(&self) {
        self.lookups.inc();
    }

    #[cfg(test)]
    pub(crate) fn publishes(&self, ok: bool) -> u64 {
        self.publishes.get_or_create(&ResultLabels::new(ok)).get()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            publishes: Family::default(),
            starts: Family::default(),
            lookups: Counter::default(),
        }
    }
}

impl ResultLabels {
    fn new(ok: bool) -> Self {
        Self {
            result: if ok { "ok" } else { "error" },
        }
    }
}

// === impl Instrumented ===

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let services = ConstGauge::new(self.0.len() as u32);
        let services_encoder = encoder.encode_descriptor(
            "membership_cache_size",
            "The number of services in the membership cache",
            None,
            MetricType::Gauge,
        )?;
        services.encode(services_encoder)?;
        Ok(())
    }
}

use crate::error::Result;
use crate::list::List;
use prometheus::{
    exponential_buckets, Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec, Opts,
    Registry,
};
use std::fmt;

/// Prometheus collectors describing the blocklist as of the last applied poll
#[derive(Clone)]
pub struct BlocklistMetrics {
    blocklist_length: IntGaugeVec,
    compacted_length: IntGaugeVec,
    tenants: IntGauge,
    poll_duration: Histogram,
    poll_errors: IntCounter,
}

impl BlocklistMetrics {
    /// Create the collectors and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        let blocklist_length = IntGaugeVec::new(
            Opts::new("tempodb_blocklist_length", "Total number of blocks per tenant."),
            &["tenant"],
        )?;
        let compacted_length = IntGaugeVec::new(
            Opts::new(
                "tempodb_blocklist_compacted_length",
                "Total number of compacted blocks per tenant.",
            ),
            &["tenant"],
        )?;
        let tenants = IntGauge::new(
            "tempodb_blocklist_tenants",
            "Total number of tenants with live blocks.",
        )?;
        let poll_duration = Histogram::with_opts(
            HistogramOpts::new(
                "tempodb_blocklist_poll_duration_seconds",
                "Time spent polling the backend.",
            )
            .buckets(exponential_buckets(0.25, 2.0, 10)?),
        )?;
        let poll_errors = IntCounter::new(
            "tempodb_blocklist_poll_errors_total",
            "Total number of failed blocklist polls.",
        )?;

        registry.register(Box::new(blocklist_length.clone()))?;
        registry.register(Box::new(compacted_length.clone()))?;
        registry.register(Box::new(tenants.clone()))?;
        registry.register(Box::new(poll_duration.clone()))?;
        registry.register(Box::new(poll_errors.clone()))?;

        Ok(Self {
            blocklist_length,
            compacted_length,
            tenants,
            poll_duration,
            poll_errors,
        })
    }

    /// Record the block counts held by `list`. Tenants no longer in the list are
    /// removed from the per-tenant gauges.
    pub fn record_blocklist(&self, list: &List) {
        self.blocklist_length.reset();
        self.compacted_length.reset();

        let tenants = list.tenants();
        for tenant in &tenants {
            self.blocklist_length
                .with_label_values(&[tenant.as_str()])
                .set(list.metas(tenant).len() as i64);
        }
        for tenant in list.compacted_tenants() {
            self.compacted_length
                .with_label_values(&[tenant.as_str()])
                .set(list.compacted_metas(&tenant).len() as i64);
        }

        self.tenants.set(tenants.len() as i64);
    }

    pub fn observe_poll_duration(&self, seconds: f64) {
        self.poll_duration.observe(seconds);
    }

    pub fn inc_poll_errors(&self) {
        self.poll_errors.inc();
    }
}

impl fmt::Debug for BlocklistMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlocklistMetrics").finish_non_exhaustive()
    }
}

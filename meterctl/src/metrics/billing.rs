//! Counters for ledger activity.

use prometheus::{CounterVec, IntCounter, IntCounterVec, Opts, Registry};
use rust_decimal::{Decimal, prelude::ToPrimitive};

/// Billing instruments registered in their own registry
#[derive(Clone)]
pub struct BillingMetrics {
    /// Inlet calls by outcome (`charged`, `free`, `deleted`)
    inlet_requests: IntCounterVec,
    /// Sum of pre-charges applied, by cost table entry
    inlet_precharged: CounterVec,
    /// Successful settlements, by model
    settlements: IntCounterVec,
    /// Sum of settled cost, by model
    settled_cost: CounterVec,
    /// Tokens settled, by model and `token_type` (`input` or `output`)
    settled_tokens: IntCounterVec,
    settlement_errors: IntCounter,
    /// Price syncs by outcome (`success`, `failure`)
    price_syncs: IntCounterVec,
    registry: Registry,
}

impl BillingMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let inlet_requests = IntCounterVec::new(
            Opts::new("meterctl_inlet_requests_total", "Inlet authorizations by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(inlet_requests.clone()))?;

        let inlet_precharged = CounterVec::new(
            Opts::new("meterctl_inlet_precharged_total", "Balance debited by inlet pre-charges"),
            &["entry"],
        )?;
        registry.register(Box::new(inlet_precharged.clone()))?;

        let settlements = IntCounterVec::new(Opts::new("meterctl_settlements_total", "Settled outlet transactions"), &["model"])?;
        registry.register(Box::new(settlements.clone()))?;

        let settled_cost = CounterVec::new(
            Opts::new("meterctl_settled_cost_total", "Balance debited by outlet settlement"),
            &["model"],
        )?;
        registry.register(Box::new(settled_cost.clone()))?;

        let settled_tokens = IntCounterVec::new(
            Opts::new("meterctl_settled_tokens_total", "Tokens billed by outlet settlement"),
            &["model", "token_type"],
        )?;
        registry.register(Box::new(settled_tokens.clone()))?;

        let settlement_errors = IntCounter::new("meterctl_settlement_errors_total", "Outlet settlements that failed")?;
        registry.register(Box::new(settlement_errors.clone()))?;

        let price_syncs = IntCounterVec::new(
            Opts::new("meterctl_price_syncs_total", "Derived model price synchronizations by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(price_syncs.clone()))?;

        Ok(Self {
            inlet_requests,
            inlet_precharged,
            settlements,
            settled_cost,
            settled_tokens,
            settlement_errors,
            price_syncs,
            registry: registry.clone(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// `entry` is the cost table key that priced the call, so labels stay bounded by config
    pub fn record_inlet(&self, entry: &str, pre_charge: Decimal) {
        let outcome = if pre_charge.is_zero() { "free" } else { "charged" };
        self.inlet_requests.with_label_values(&[outcome]).inc();
        if let Some(amount) = pre_charge.to_f64().filter(|a| *a > 0.0) {
            self.inlet_precharged.with_label_values(&[entry]).inc_by(amount);
        }
    }

    /// A soft-deleted user passed through without charge
    pub fn record_inlet_deleted(&self) {
        self.inlet_requests.with_label_values(&["deleted"]).inc();
    }

    pub fn record_settlement(&self, model: &str, cost: Decimal, input_tokens: u64, output_tokens: u64) {
        self.settlements.with_label_values(&[model]).inc();
        if let Some(amount) = cost.to_f64().filter(|a| *a > 0.0) {
            self.settled_cost.with_label_values(&[model]).inc_by(amount);
        }
        self.settled_tokens.with_label_values(&[model, "input"]).inc_by(input_tokens);
        self.settled_tokens.with_label_values(&[model, "output"]).inc_by(output_tokens);
    }

    pub fn record_settlement_error(&self) {
        self.settlement_errors.inc();
    }

    pub fn record_price_sync(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.price_syncs.with_label_values(&[outcome]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn test_counters_are_exported() {
        let registry = Registry::new();
        let metrics = BillingMetrics::new(&registry).unwrap();

        metrics.record_inlet("gpt-4", Decimal::new(5, 1));
        metrics.record_inlet("gpt-4", Decimal::ZERO);
        metrics.record_inlet_deleted();
        metrics.record_settlement("gpt-4", Decimal::new(3421, 4), 100, 20);
        metrics.record_price_sync(false);

        let mut buffer = vec![];
        TextEncoder::new().encode(&registry.gather(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("meterctl_inlet_requests_total"));
        assert!(text.contains("meterctl_settled_tokens_total"));
        assert!(text.contains("meterctl_price_syncs_total"));

        assert_eq!(metrics.inlet_requests.with_label_values(&["free"]).get(), 1);
        assert_eq!(metrics.inlet_requests.with_label_values(&["deleted"]).get(), 1);
        assert_eq!(metrics.settled_tokens.with_label_values(&["gpt-4", "input"]).get(), 100);
    }

    #[test]
    fn test_registering_twice_fails() {
        let registry = Registry::new();
        BillingMetrics::new(&registry).unwrap();
        assert!(BillingMetrics::new(&registry).is_err());
    }
}

//! `SimpleDomainBudgeting`, the AC/DC aggressive-limit distributor (spec
//! §4.7). Grounded on `budgeting.hpp`'s `CompoundDomainBudgetingIf::
//! distributeBudget` call site — its own header
//! (`compound_domain_budgeting.hpp`) is not present in the retrieval pack, so
//! the distribution formula is read off spec.md §4.7 directly rather than
//! transcribed from source.

use std::collections::HashMap;

use crate::domain::{DomainId, RaplDomainId};
use crate::reading::{ReadingBus, ReadingType, ALL_DEVICES};

use super::efficiency::EfficiencyHelper;
use super::regulator::ProportionalRegulator;

/// Min/max bounds a sub-domain's distributed share is clamped to, sourced
/// from that sub-domain's `capabilityDomainId`.
pub trait CapabilityBounds {
    fn bounds(&self, domain_id: DomainId) -> (f64, f64);
}

/// One configured sub-domain's distribution parameters (spec §4.7).
pub struct SubDomainConfig {
    pub rapl_domain_id: RaplDomainId,
    pub p_coeff: f64,
    pub feedback_reading: ReadingType,
    pub efficiency_reading: ReadingType,
    pub efficiency_averaging_period_ms: i64,
    pub budget_correction: f64,
    pub capability_domain_id: DomainId,
}

struct SubDomain {
    config: SubDomainConfig,
    regulator: ProportionalRegulator,
    efficiency: EfficiencyHelper,
}

/// Distributes one compound AC/DC total across the configured RAPL
/// sub-domains; the sub-domain named by `absorbing` (CPU, in every observed
/// configuration) has no distributor entry of its own and instead takes
/// whatever the configured sub-domains didn't claim.
pub struct SimpleDomainBudgeting {
    sub_domains: Vec<SubDomain>,
    absorbing: RaplDomainId,
}

impl SimpleDomainBudgeting {
    pub fn new(configs: Vec<SubDomainConfig>, absorbing: RaplDomainId) -> Self {
        let sub_domains = configs
            .into_iter()
            .map(|config| SubDomain {
                regulator: ProportionalRegulator::new(config.p_coeff),
                efficiency: EfficiencyHelper::new(config.efficiency_averaging_period_ms),
                config,
            })
            .collect();
        Self { sub_domains, absorbing }
    }

    /// `distributeBudget`: splits `total` across every configured sub-domain
    /// plus the absorbing one.
    pub fn distribute_budget(
        &mut self,
        total: f64,
        now_ms: i64,
        readings: &ReadingBus,
        bounds: &dyn CapabilityBounds,
    ) -> HashMap<RaplDomainId, f64> {
        let mut out = HashMap::with_capacity(self.sub_domains.len() + 1);
        let mut allocated = 0.0;

        for sub in &mut self.sub_domains {
            let feedback = readings
                .last_value(sub.config.feedback_reading, ALL_DEVICES)
                .unwrap_or(f64::NAN);
            let sub_power = readings
                .last_value(sub.config.efficiency_reading, ALL_DEVICES)
                .unwrap_or(f64::NAN);

            sub.efficiency.update(now_ms, sub_power, feedback);
            let eta = sub.efficiency.efficiency(now_ms);
            let eta = if eta.is_finite() { eta } else { 0.0 };

            let trim = sub.regulator.output(total, feedback);
            let (min, max) = bounds.bounds(sub.config.capability_domain_id);
            let share = (eta * total * (1.0 + sub.config.budget_correction) + trim).clamp(min, max);

            out.insert(sub.config.rapl_domain_id, share);
            allocated += share;
        }

        out.insert(self.absorbing, total - allocated);
        out
    }
}

//! PTAM-to-RAPL budget propagation and compound distribution (spec §4.6).
//! Grounded on `budgeting.hpp`'s `Budgeting`/`BudgetingIf`: the orchestration
//! (`propagatePtamLimits`/`runCompoundBudgeting`/`selectRaplLimits`) is
//! transcribed directly; its two collaborator types
//! (`PowerLimitSelector`, `CompoundDomainBudgetingIf`) have no header in the
//! retrieval pack and are designed from spec.md §4.6/§4.7 instead (see
//! `selector`/`compound`'s module docs).

pub mod compound;
pub mod efficiency;
pub mod regulator;
pub mod selector;

pub use compound::{CapabilityBounds, SimpleDomainBudgeting, SubDomainConfig};
pub use selector::PowerLimitSelector;

use std::collections::HashMap;

use crate::control::{Control, Limit};
use crate::domain::{map_ptam_domain_to_rapl_domain, BudgetingHandle, DomainId, RaplDomainId};
use crate::policy::{BudgetingStrategy, COMPONENT_ID_ALL};
use crate::reading::{ReadingBus, ReadingType, ALL_DEVICES};

const DEFAULT_PSU_EFFICIENCY: f64 = 1.0;

const RAPL_DOMAINS: [RaplDomainId; 4] = [
    RaplDomainId::DcTotalPower,
    RaplDomainId::CpuSubsystem,
    RaplDomainId::MemorySubsystem,
    RaplDomainId::Pcie,
];

/// Orchestrates PTAM-submitted limits down to the RAPL control planes. Holds
/// one [`PowerLimitSelector`] per [`RaplDomainId`] plus one compound selector
/// that arbitrates `aggressive` AC/DC platform-total limits ahead of
/// distribution.
pub struct Budgeting {
    control: Box<dyn Control>,
    compound_budgeting: SimpleDomainBudgeting,
    limit_selectors: HashMap<RaplDomainId, PowerLimitSelector>,
    compound_limit_selector: PowerLimitSelector,
    ptam_limits: HashMap<DomainId, HashMap<BudgetingStrategy, Option<f64>>>,
    psu_efficiency: f64,
}

impl Budgeting {
    pub fn new(control: Box<dyn Control>, compound_budgeting: SimpleDomainBudgeting) -> Self {
        let limit_selectors = RAPL_DOMAINS.into_iter().map(|id| (id, PowerLimitSelector::new())).collect();
        Self {
            control,
            compound_budgeting,
            limit_selectors,
            compound_limit_selector: PowerLimitSelector::new(),
            ptam_limits: HashMap::new(),
            psu_efficiency: DEFAULT_PSU_EFFICIENCY,
        }
    }

    /// Refreshes the PSU-efficiency EWMA used by `AcTotalPower` conversions;
    /// a non-finite reading falls back to `1.0` (spec §4.6).
    pub fn update_psu_efficiency(&mut self, readings: &ReadingBus) {
        let value = readings
            .last_value(ReadingType::PlatformPowerEfficiency, ALL_DEVICES)
            .unwrap_or(f64::NAN);
        self.psu_efficiency = if value.is_finite() { value } else { DEFAULT_PSU_EFFICIENCY };
    }

    fn convert_power_limit(&self, domain_id: DomainId, limit_value: f64) -> f64 {
        if domain_id == DomainId::AcTotalPower {
            limit_value * self.psu_efficiency
        } else {
            limit_value
        }
    }

    /// `getLimitSelector`: `aggressive` AC/DC platform totals route to the
    /// compound selector; everything else routes to its sub-domain's own
    /// selector.
    fn get_limit_selector(&mut self, domain_id: DomainId, strategy: BudgetingStrategy) -> Option<&mut PowerLimitSelector> {
        if strategy == BudgetingStrategy::Aggressive
            && matches!(domain_id, DomainId::AcTotalPower | DomainId::DcTotalPower)
        {
            Some(&mut self.compound_limit_selector)
        } else {
            let rapl_domain_id = map_ptam_domain_to_rapl_domain(domain_id)?;
            self.limit_selectors.get_mut(&rapl_domain_id)
        }
    }

    fn propagate_ptam_limits(&mut self) {
        for selector in self.limit_selectors.values_mut() {
            selector.reset_limit();
        }
        self.compound_limit_selector.reset_limit();

        let snapshot: Vec<(DomainId, BudgetingStrategy, f64)> = self
            .ptam_limits
            .iter()
            .flat_map(|(&domain_id, by_strategy)| {
                by_strategy
                    .iter()
                    .filter_map(move |(&strategy, limit)| limit.map(|value| (domain_id, strategy, value)))
            })
            .collect();

        for (domain_id, strategy, raw_limit) in snapshot {
            let converted = self.convert_power_limit(domain_id, raw_limit);
            let limit = Limit { value: converted, strategy };
            match self.get_limit_selector(domain_id, strategy) {
                Some(selector) => selector.update_limit(limit, domain_id),
                None => tracing::error!(?domain_id, "budgeting: domain has no RAPL projection"),
            }
        }
    }

    fn run_compound_budgeting(&mut self, now_ms: i64, readings: &ReadingBus, bounds: &dyn CapabilityBounds) {
        let (Some(total), Some(source_domain)) =
            (self.compound_limit_selector.get_limit(), self.compound_limit_selector.get_source_domain())
        else {
            return;
        };

        let rapl_limits = self.compound_budgeting.distribute_budget(total.value, now_ms, readings, bounds);
        for (rapl_domain_id, value) in rapl_limits {
            if let Some(selector) = self.limit_selectors.get_mut(&rapl_domain_id) {
                selector.update_limit(Limit { value, strategy: total.strategy }, source_domain);
            }
        }
    }

    fn select_rapl_limits(&mut self) {
        let rapl_domain_ids: Vec<RaplDomainId> = self.limit_selectors.keys().copied().collect();
        for rapl_domain_id in rapl_domain_ids {
            let limit = self.limit_selectors[&rapl_domain_id].get_limit();
            self.control.set_budget(rapl_domain_id, limit);
        }
    }

    /// `Budgeting::run`: propagate, distribute, then push every RAPL
    /// domain's winning limit to `Control`.
    pub fn run(&mut self, now_ms: i64, readings: &ReadingBus, bounds: &dyn CapabilityBounds) {
        self.update_psu_efficiency(readings);
        self.propagate_ptam_limits();
        self.run_compound_budgeting(now_ms, readings, bounds);
        self.select_rapl_limits();
    }
}

impl BudgetingHandle for Budgeting {
    fn set_limit(&mut self, domain_id: DomainId, component_id: u8, value: f64, strategy: BudgetingStrategy) {
        if component_id == COMPONENT_ID_ALL {
            self.ptam_limits.entry(domain_id).or_default().insert(strategy, Some(value));
        } else if let Some(rapl_domain_id) = map_ptam_domain_to_rapl_domain(domain_id) {
            self.control
                .set_component_budget(rapl_domain_id, component_id, Some(Limit { value, strategy }));
        }
    }

    fn reset_limit(&mut self, domain_id: DomainId, component_id: u8, strategy: BudgetingStrategy) {
        if component_id == COMPONENT_ID_ALL {
            if let Some(by_strategy) = self.ptam_limits.get_mut(&domain_id) {
                by_strategy.insert(strategy, None);
            }
        } else if let Some(rapl_domain_id) = map_ptam_domain_to_rapl_domain(domain_id) {
            self.control.set_component_budget(rapl_domain_id, component_id, None);
        }
    }

    fn is_active(&self, domain_id: DomainId, component_id: u8, strategy: BudgetingStrategy) -> bool {
        let Some(rapl_domain_id) = map_ptam_domain_to_rapl_domain(domain_id) else {
            return false;
        };
        if component_id == COMPONENT_ID_ALL {
            self.limit_selectors
                .get(&rapl_domain_id)
                .map(|selector| selector.is_active(domain_id, strategy))
                .unwrap_or(false)
                && self.control.is_domain_limit_active(rapl_domain_id)
        } else {
            self.control.is_component_limit_active(rapl_domain_id, component_id)
        }
    }
}

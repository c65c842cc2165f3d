//! `Domain`'s policy collection and tick logic (spec §4.5):
//! `getTriggeredPoliciesLimits`/`updateLimits`/`deleteNonActiveLimits`/
//! `matchPolicyWithSelectedLimit`. Grounded on `domains/domain_power.hpp`.

use std::collections::HashMap;

use crate::capability::{CapabilitiesIf, ComponentCapabilities, DomainCapabilities};
use crate::policy::{BudgetingStrategy, Policy, PolicyId, PolicyInput, PolicyStateKind};
use crate::statistics::StatisticsProvider;

use super::DomainInfo;

/// The `(componentId, strategy)` key `DomainPower::DomainLimits` is keyed
/// on, mapping to the id of the policy currently supplying that limit.
pub type DomainLimits = HashMap<(u8, BudgetingStrategy), PolicyId>;

/// Budgeting's inbound surface as seen from a Domain (`BudgetingIf` in the
/// source). A trait rather than a direct dependency on
/// `crate::budgeting::Budgeting` so this module doesn't need that one to
/// exist yet, and so tests can supply a recording double.
pub trait BudgetingHandle {
    fn set_limit(&mut self, domain_id: super::DomainId, component_id: u8, value: f64, strategy: BudgetingStrategy);
    fn reset_limit(&mut self, domain_id: super::DomainId, component_id: u8, strategy: BudgetingStrategy);
    fn is_active(&self, domain_id: super::DomainId, component_id: u8, strategy: BudgetingStrategy) -> bool;
}

/// One power/performance domain's policy set plus the per-tick limit
/// arbitration across them (spec §4.5). Grounded on `Domain`/`DomainPower`
/// — the source's class hierarchy (`Domain` → `DomainPower` →
/// `DomainHwProtection`/`DomainPcie`) collapses to one struct here, since
/// the differences between domain kinds are in which policies
/// `domain::factory` seeds at startup, not in the tick algorithm itself.
pub struct Domain {
    info: DomainInfo,
    capabilities: DomainCapabilities,
    component_capabilities: Vec<ComponentCapabilities>,
    policies: Vec<Policy>,
    limiting_policies: DomainLimits,
    limit_bias_absolute: f64,
    limit_bias_relative: f64,
    is_host_power_on: bool,
    statistics: StatisticsProvider,
}

impl Domain {
    pub fn new(
        info: DomainInfo,
        capabilities: DomainCapabilities,
        component_capabilities: Vec<ComponentCapabilities>,
    ) -> Self {
        Self {
            info,
            capabilities,
            component_capabilities,
            policies: Vec::new(),
            limiting_policies: HashMap::new(),
            limit_bias_absolute: 0.0,
            limit_bias_relative: 1.0,
            is_host_power_on: false,
            statistics: StatisticsProvider::new(),
        }
    }

    pub fn info(&self) -> &DomainInfo {
        &self.info
    }

    pub fn capabilities(&self) -> &DomainCapabilities {
        &self.capabilities
    }

    pub fn capabilities_mut(&mut self) -> &mut DomainCapabilities {
        &mut self.capabilities
    }

    pub fn statistics_mut(&mut self) -> &mut StatisticsProvider {
        &mut self.statistics
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn policies_mut(&mut self) -> &mut [Policy] {
        &mut self.policies
    }

    pub fn find_policy(&self, id: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| p.id() == id)
    }

    pub fn find_policy_mut(&mut self, id: &str) -> Option<&mut Policy> {
        self.policies.iter_mut().find(|p| p.id() == id)
    }

    pub fn add_policy(&mut self, policy: Policy) {
        self.policies.push(policy);
    }

    /// `createPolicy`'s delete callback: drops the policy and any limit it
    /// was supplying.
    pub fn remove_policy(&mut self, id: &str) {
        self.policies.retain(|p| p.id() != id);
        self.limiting_policies.retain(|_, owner| owner != id);
    }

    pub fn set_limit_bias(&mut self, absolute: f64, relative: f64) {
        self.limit_bias_absolute = absolute;
        self.limit_bias_relative = relative;
    }

    pub fn limit_bias(&self) -> (f64, f64) {
        (self.limit_bias_absolute, self.limit_bias_relative)
    }

    pub fn is_host_power_on(&self) -> bool {
        self.is_host_power_on
    }

    fn component_bounds(&self, component_id: u8) -> (f64, f64) {
        self.component_capabilities
            .get(component_id as usize)
            .map(|c| (crate::capability::CapabilitiesIf::min(c), crate::capability::CapabilitiesIf::max(c)))
            .unwrap_or((self.capabilities.min(), self.capabilities.max()))
    }

    fn apply_bias(&self, ptam_limit: f64, component_id: u8) -> f64 {
        let biased = ptam_limit * self.limit_bias_relative + self.limit_bias_absolute;
        let (min, max) = self.component_bounds(component_id);
        biased.clamp(min, max)
    }

    /// `getTriggeredPoliciesLimits`: the lowest-limit policy per
    /// `(componentId, strategy)` key among every `triggered`/`selected`
    /// policy.
    pub fn triggered_policies_limits(&self) -> DomainLimits {
        let mut lowest: HashMap<(u8, BudgetingStrategy), (PolicyId, f64)> = HashMap::new();

        for policy in &self.policies {
            if !matches!(policy.state(), PolicyStateKind::Triggered | PolicyStateKind::Selected) {
                continue;
            }
            let Some(strategy) = policy.strategy() else {
                continue;
            };
            let key = (policy.component_id(), strategy);
            let limit = policy.reading_limit();
            lowest
                .entry(key)
                .and_modify(|(id, existing_limit)| {
                    if limit < *existing_limit {
                        *id = policy.id().to_string();
                        *existing_limit = limit;
                    }
                })
                .or_insert_with(|| (policy.id().to_string(), limit));
        }

        lowest.into_iter().map(|(key, (id, _))| (key, id)).collect()
    }

    /// `updateLimits`: pushes each winning limit to Budgeting, demoting
    /// any previous winner at the same key back out of `selected`.
    pub fn update_limits(&mut self, lowest: &DomainLimits, budgeting: &mut dyn BudgetingHandle) {
        for (&(component_id, strategy), policy_id) in lowest {
            let previous_winner = self.limiting_policies.get(&(component_id, strategy)).cloned();
            if let Some(previous_id) = &previous_winner {
                if previous_id != policy_id {
                    if let Some(previous_policy) = self.find_policy_mut(previous_id) {
                        previous_policy.apply(PolicyInput::LimitSelection(false));
                    }
                }
            }
            self.limiting_policies
                .insert((component_id, strategy), policy_id.clone());

            let biased = self
                .find_policy(policy_id)
                .map(|p| self.apply_bias(p.reading_limit(), component_id));
            if let Some(value) = biased {
                budgeting.set_limit(self.info.domain_id, component_id, value, strategy);
            }
        }
    }

    /// `deleteNonActiveLimits`: drops keys no longer present in this
    /// tick's winning set, telling Budgeting to release the limit.
    pub fn delete_non_active_limits(&mut self, active: &DomainLimits, budgeting: &mut dyn BudgetingHandle) {
        let stale: Vec<(u8, BudgetingStrategy)> = self
            .limiting_policies
            .keys()
            .copied()
            .filter(|key| !active.contains_key(key))
            .collect();
        for (component_id, strategy) in stale {
            budgeting.reset_limit(self.info.domain_id, component_id, strategy);
            self.limiting_policies.remove(&(component_id, strategy));
        }
    }

    /// `matchPolicyWithSelectedLimit`: tells each limiting policy whether
    /// its `(componentId, strategy)` key is the one actually in force at
    /// the hardware, driving `Triggered` ⇄ `Selected`.
    pub fn match_policy_with_selected_limit(&mut self, budgeting: &dyn BudgetingHandle) {
        let domain_id = self.info.domain_id;
        for (&(component_id, strategy), policy_id) in self.limiting_policies.clone().iter() {
            let strategy_in_use = budgeting.is_active(domain_id, component_id, strategy);
            if let Some(policy) = self.find_policy_mut(policy_id) {
                policy.apply(PolicyInput::LimitSelection(strategy_in_use));
            }
        }
    }

    /// One `run()`+`postRun()` cycle, gated on host power exactly as the
    /// source's `DomainPower::run`/`postRun` are.
    pub fn tick(&mut self, budgeting: &mut dyn BudgetingHandle) {
        if !self.is_host_power_on {
            return;
        }
        let lowest = self.triggered_policies_limits();
        self.update_limits(&lowest, budgeting);
        self.delete_non_active_limits(&lowest, budgeting);
        self.match_policy_with_selected_limit(budgeting);
    }

    /// `hostPowerReadingEvent`'s callback: host power loss immediately
    /// releases every limit this domain is holding.
    pub fn set_host_power(&mut self, on: bool, budgeting: &mut dyn BudgetingHandle) {
        let was_on = self.is_host_power_on;
        self.is_host_power_on = on;
        if was_on && !on {
            self.delete_non_active_limits(&DomainLimits::new(), budgeting);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryPowerRangeStore;
    use crate::domain::DomainId;
    use crate::policy::{
        LimitException, PolicyOwner, PolicyParams, PolicyStorage, PowerCorrectionType, COMPONENT_ID_ALL,
    };
    use crate::reading::ReadingType;
    use crate::trigger::TriggerType;
    use std::collections::HashMap as StdHashMap;

    #[derive(Default)]
    struct RecordingBudgeting {
        set: Vec<(DomainId, u8, f64, BudgetingStrategy)>,
        reset: Vec<(DomainId, u8, BudgetingStrategy)>,
        active: StdHashMap<(DomainId, u8, BudgetingStrategy), bool>,
    }

    impl BudgetingHandle for RecordingBudgeting {
        fn set_limit(&mut self, domain_id: DomainId, component_id: u8, value: f64, strategy: BudgetingStrategy) {
            self.set.push((domain_id, component_id, value, strategy));
            self.active.insert((domain_id, component_id, strategy), true);
        }

        fn reset_limit(&mut self, domain_id: DomainId, component_id: u8, strategy: BudgetingStrategy) {
            self.reset.push((domain_id, component_id, strategy));
            self.active.insert((domain_id, component_id, strategy), false);
        }

        fn is_active(&self, domain_id: DomainId, component_id: u8, strategy: BudgetingStrategy) -> bool {
            *self.active.get(&(domain_id, component_id, strategy)).unwrap_or(&false)
        }
    }

    fn domain() -> Domain {
        let info = DomainInfo {
            object_path: "/xyz/Domain/CpuSubsystem".to_string(),
            controlled_parameter: ReadingType::CpuPower,
            domain_id: DomainId::CpuSubsystem,
            available_components: std::sync::Arc::new(vec![0, 1]),
            required_reading_unavailable: false,
            triggers: std::sync::Arc::new(std::collections::HashSet::from([TriggerType::Always])),
            max_component_number: 2,
        };
        let caps = DomainCapabilities::new(
            true,
            true,
            1_000,
            DomainId::CpuSubsystem,
            Box::new(MemoryPowerRangeStore::default()),
        );
        let mut d = Domain::new(info, caps, vec![ComponentCapabilities::new(0), ComponentCapabilities::new(1)]);
        d.capabilities_mut().update_max_reading(400.0);
        d.is_host_power_on = true;
        d
    }

    fn power_params(limit: f64) -> PolicyParams {
        PolicyParams {
            correction_in_ms: 1000,
            limit,
            stat_reporting_period: 60,
            policy_storage: PolicyStorage::Volatile,
            power_correction_type: PowerCorrectionType::Automatic,
            limit_exception: LimitException::NoAction,
            suspend_periods: Vec::new(),
            thresholds: HashMap::new(),
            component_id: COMPONENT_ID_ALL,
            trigger_limit: 0,
            trigger_type: TriggerType::Always,
        }
    }

    fn triggered_policy(id: &str, limit: f64) -> Policy {
        let mut p = Policy::new_power(
            id.to_string(),
            PolicyOwner::Bmc,
            DomainId::CpuSubsystem,
            power_params(limit),
            true,
            true,
        );
        p.apply(PolicyInput::ParametersValidation(true));
        p.set_enabled(true);
        p.set_parent_enabled(true);
        p.apply(PolicyInput::TriggerAction(crate::trigger::TriggerActionType::Trigger));
        p
    }

    #[test]
    fn lowest_limit_wins_per_key() {
        let mut d = domain();
        d.add_policy(triggered_policy("P1", 200.0));
        d.add_policy(triggered_policy("P2", 100.0));
        let lowest = d.triggered_policies_limits();
        assert_eq!(lowest.len(), 1);
        let winner = lowest.values().next().unwrap();
        assert_eq!(winner, "P2");
    }

    #[test]
    fn tick_installs_and_releases_limit() {
        let mut d = domain();
        d.add_policy(triggered_policy("P1", 150.0));
        let mut budgeting = RecordingBudgeting::default();

        d.tick(&mut budgeting);
        assert_eq!(budgeting.set.len(), 1);
        assert_eq!(budgeting.set[0].1, COMPONENT_ID_ALL);

        d.remove_policy("P1");
        d.tick(&mut budgeting);
        assert_eq!(budgeting.reset.len(), 1);
    }

    #[test]
    fn host_power_off_releases_all_limits() {
        let mut d = domain();
        d.add_policy(triggered_policy("P1", 150.0));
        let mut budgeting = RecordingBudgeting::default();
        d.tick(&mut budgeting);
        assert_eq!(budgeting.set.len(), 1);

        d.set_host_power(false, &mut budgeting);
        assert_eq!(budgeting.reset.len(), 1);
        assert!(d.limiting_policies.is_empty());
    }

    #[test]
    fn match_policy_promotes_to_selected_when_budgeting_reports_active() {
        let mut d = domain();
        d.add_policy(triggered_policy("P1", 150.0));
        let mut budgeting = RecordingBudgeting::default();
        d.tick(&mut budgeting);
        assert_eq!(d.find_policy("P1").unwrap().state(), PolicyStateKind::Selected);
    }
}

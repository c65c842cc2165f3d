//! Per-domain default policy seeding (spec §4.5's "domains auto-create
//! their DMTF/always-on policies at startup"). Grounded on
//! `domain_power.hpp::createDmtfPolicies`, `domain_hw_protection.hpp::
//! createHwProtectionPolicies`, `domain_performance.hpp::
//! createDefaultPolicies`, `domain_pcie.hpp::createSmbalertPolicy`.

use std::collections::HashMap;

use crate::capability::CapabilitiesIf;
use crate::policy::{
    LimitException, PerformanceKnobType, Policy, PolicyOwner, PolicyParams, PolicyStorage,
    PowerCorrectionType, CORRECTION_TIME_PERFORMANCE_POLICY,
};
use crate::trigger::TriggerType;

use super::{Domain, DomainId};

const INTERNAL_POLICY_CORRECTION_TIME_MS: u32 = 1000;
const INTERNAL_SMART_POLICY_CORRECTION_TIME_MS: u32 = 4000;
const HW_PROTECTION_POLICY_CORRECTION_TIME_MS: u32 = 1000;
const ZERO_WATT_LIMIT: f64 = 0.0;
const MINIMUM_STAT_REPORTING_PERIOD: u32 = 1;
const DMTF_STAT_REPORTING_PERIOD: u32 = 60;

fn internal_always_on_params(limit: f64, component_id: u8, correction_ms: u32, reporting_period: u32) -> PolicyParams {
    PolicyParams {
        correction_in_ms: correction_ms,
        limit,
        stat_reporting_period: reporting_period,
        policy_storage: PolicyStorage::Volatile,
        power_correction_type: PowerCorrectionType::NonAggressive,
        limit_exception: LimitException::NoAction,
        suspend_periods: Vec::new(),
        thresholds: HashMap::new(),
        component_id,
        trigger_limit: 0,
        trigger_type: TriggerType::Always,
    }
}

/// `createDmtfPolicies`: one domain-wide always-on policy plus one
/// per-component always-on policy, named `Dmtf<pluralName>` /
/// `Dmtf<singularName><idx>`.
pub fn seed_dmtf_policies(domain: &mut Domain, singular_name: &str, plural_name: &str) {
    let max_component_number = domain.info().max_component_number;
    let domain_id = domain.info().domain_id;

    domain.add_policy(Policy::new_power(
        format!("DmtfPower{plural_name}"),
        PolicyOwner::Internal,
        domain_id,
        internal_always_on_params(
            ZERO_WATT_LIMIT,
            crate::policy::COMPONENT_ID_ALL,
            INTERNAL_POLICY_CORRECTION_TIME_MS,
            DMTF_STAT_REPORTING_PERIOD,
        ),
        true,
        false,
    ));

    for idx in 0..max_component_number {
        domain.add_policy(Policy::new_power(
            format!("DmtfPower{singular_name}{idx}"),
            PolicyOwner::Internal,
            domain_id,
            internal_always_on_params(
                ZERO_WATT_LIMIT,
                idx,
                INTERNAL_POLICY_CORRECTION_TIME_MS,
                DMTF_STAT_REPORTING_PERIOD,
            ),
            true,
            false,
        ));
    }
}

/// `DomainPcie::createSmbalertPolicy`.
pub fn seed_smbalert_policy(domain: &mut Domain) {
    let domain_id = domain.info().domain_id;
    let mut params = internal_always_on_params(
        ZERO_WATT_LIMIT,
        crate::policy::COMPONENT_ID_ALL,
        INTERNAL_SMART_POLICY_CORRECTION_TIME_MS,
        MINIMUM_STAT_REPORTING_PERIOD,
    );
    params.trigger_type = TriggerType::SmbalertInterrupt;
    params.power_correction_type = PowerCorrectionType::Automatic;
    domain.add_policy(Policy::new_power(
        "SMBAlert".to_string(),
        PolicyOwner::Internal,
        domain_id,
        params,
        true,
        false,
    ));
}

/// `DomainHwProtection::createHwProtectionPolicies`: an always-on policy
/// plus, only if the configured GPIO line resolves, a GPIO-triggered one —
/// both non-editable and internal-only, matching the source's restriction
/// that `HwProtection` rejects any non-internal `createPolicyFromFactory`
/// call.
pub fn seed_hw_protection_policies(domain: &mut Domain, gpio_line: Option<u16>) {
    let domain_id = domain.info().domain_id;
    let max = domain.capabilities().max();

    domain.add_policy(Policy::new_power(
        "HwProtectionAlwaysOn".to_string(),
        PolicyOwner::Internal,
        domain_id,
        PolicyParams {
            correction_in_ms: HW_PROTECTION_POLICY_CORRECTION_TIME_MS,
            limit: max,
            stat_reporting_period: MINIMUM_STAT_REPORTING_PERIOD,
            policy_storage: PolicyStorage::Volatile,
            power_correction_type: PowerCorrectionType::Automatic,
            limit_exception: LimitException::NoAction,
            suspend_periods: Vec::new(),
            thresholds: HashMap::new(),
            component_id: crate::policy::COMPONENT_ID_ALL,
            trigger_limit: 0,
            trigger_type: TriggerType::Always,
        },
        false,
        false,
    ));

    if let Some(line) = gpio_line {
        domain.add_policy(Policy::new_power(
            "HwProtectionGpio".to_string(),
            PolicyOwner::Internal,
            domain_id,
            PolicyParams {
                correction_in_ms: HW_PROTECTION_POLICY_CORRECTION_TIME_MS,
                limit: max,
                stat_reporting_period: MINIMUM_STAT_REPORTING_PERIOD,
                policy_storage: PolicyStorage::Volatile,
                power_correction_type: PowerCorrectionType::Automatic,
                limit_exception: LimitException::NoAction,
                suspend_periods: Vec::new(),
                thresholds: HashMap::new(),
                component_id: crate::policy::COMPONENT_ID_ALL,
                trigger_limit: line,
                trigger_type: TriggerType::Gpio,
            },
            false,
            false,
        ));
    }
}

/// `HwProtection::updateLimit`: the always-on policy(ies) track the
/// domain's capability max directly, bypassing the usual validation path
/// (the source calls `PolicyIf::setLimit` unconditionally).
pub fn hw_protection_update_limit(domain: &mut Domain, limit: f64) {
    for policy in domain.policies_mut() {
        policy.params_mut().limit = limit;
    }
}

/// `DomainPerformance::createDefaultPolicies`: one editable `bmc`-owned
/// policy per supported performance knob, named after the knob.
pub fn seed_performance_policies(domain: &mut Domain) {
    let domain_id = domain.info().domain_id;
    let reporting_min = domain.capabilities().min_stat_reporting_period() as u32;

    let knobs = [
        PerformanceKnobType::TurboRatioLimit,
        PerformanceKnobType::Prochot,
        PerformanceKnobType::HwpmPerfPreference,
        PerformanceKnobType::HwpmPerfBias,
        PerformanceKnobType::HwpmPerfPreferenceOverride,
    ];

    for knob in knobs {
        if domain.policies().iter().any(|p| p.performance_knob() == Some(knob)) {
            continue;
        }
        domain.add_policy(Policy::new_performance(
            knob.name().to_string(),
            PolicyOwner::Bmc,
            domain_id,
            PolicyParams {
                correction_in_ms: CORRECTION_TIME_PERFORMANCE_POLICY,
                limit: f64::NAN,
                stat_reporting_period: reporting_min,
                policy_storage: PolicyStorage::Volatile,
                power_correction_type: PowerCorrectionType::Automatic,
                limit_exception: LimitException::NoAction,
                suspend_periods: Vec::new(),
                thresholds: HashMap::new(),
                component_id: crate::policy::COMPONENT_ID_ALL,
                trigger_limit: 0,
                trigger_type: TriggerType::Always,
            },
            knob,
            true,
            false,
        ));
    }
}

/// Whether `domain_id` is allowed to accept user/`bmc`-owned policy
/// creation at all — `HwProtection` is internal-only end to end (spec
/// §4.5).
pub fn accepts_user_policies(domain_id: DomainId) -> bool {
    domain_id != DomainId::HwProtection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ComponentCapabilities, DomainCapabilities};
    use crate::config::MemoryPowerRangeStore;
    use crate::domain::DomainInfo;
    use crate::reading::ReadingType;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn domain(domain_id: DomainId, max_component_number: u8) -> Domain {
        let info = DomainInfo {
            object_path: "/xyz/Domain/Test".to_string(),
            controlled_parameter: ReadingType::CpuPower,
            domain_id,
            available_components: Arc::new((0..max_component_number).collect()),
            required_reading_unavailable: false,
            triggers: Arc::new(HashSet::from([TriggerType::Always])),
            max_component_number,
        };
        let caps = DomainCapabilities::new(true, true, 1000, domain_id, Box::new(MemoryPowerRangeStore::default()));
        let components = (0..max_component_number).map(ComponentCapabilities::new).collect();
        Domain::new(info, caps, components)
    }

    #[test]
    fn dmtf_seeding_creates_one_plus_per_component() {
        let mut d = domain(DomainId::CpuSubsystem, 2);
        seed_dmtf_policies(&mut d, "_Cpu", "_Cpus");
        assert_eq!(d.policies().len(), 3);
        assert!(d.find_policy("DmtfPower_Cpus").is_some());
        assert!(d.find_policy("DmtfPower_Cpu0").is_some());
        assert!(d.find_policy("DmtfPower_Cpu1").is_some());
    }

    #[test]
    fn hw_protection_seeds_always_on_and_gpio_variant() {
        let mut d = domain(DomainId::HwProtection, 1);
        seed_hw_protection_policies(&mut d, Some(4));
        assert_eq!(d.policies().len(), 2);
        assert!(!d.find_policy("HwProtectionAlwaysOn").unwrap().is_editable());
    }

    #[test]
    fn hw_protection_skips_gpio_policy_when_line_absent() {
        let mut d = domain(DomainId::HwProtection, 1);
        seed_hw_protection_policies(&mut d, None);
        assert_eq!(d.policies().len(), 1);
    }

    #[test]
    fn performance_seeding_creates_five_knob_policies_and_is_idempotent() {
        let mut d = domain(DomainId::Performance, 0);
        seed_performance_policies(&mut d);
        assert_eq!(d.policies().len(), 5);
        seed_performance_policies(&mut d);
        assert_eq!(d.policies().len(), 5);
    }

    #[test]
    fn hw_protection_rejects_user_policies() {
        assert!(!accepts_user_policies(DomainId::HwProtection));
        assert!(accepts_user_policies(DomainId::CpuSubsystem));
    }
}

//! Policy parameters, validation, and the `Policy` aggregate that ties the
//! state machine, limit-exception monitor, and statistics together (spec
//! §3/§4.4). Grounded on `policies/{policy,policy_types,power_policy,
//! performance_policy}.hpp`.

pub mod limit_exception;
pub mod state;
pub mod strategy;

pub use limit_exception::{ActionOutcome, HostPowerControl, LimitExceptionHandler, LimitExceptionMonitor};
pub use state::{PolicyInput, PolicyStateKind};
pub use strategy::{power_policy_strategy, BudgetingStrategy};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::DomainId;
use crate::error::PolicyError;
use crate::reading::DeviceIndex;
use crate::statistics::provider::StatisticsProvider;
use crate::trigger::TriggerType;

/// `kComponentIdAll` — a policy that applies across every component in its
/// domain rather than one specific one.
pub const COMPONENT_ID_ALL: u8 = 0xff;

/// `kNodeManagerMaxPolicies` — the hard cap on `bmc`-owned policies per
/// domain (spec §3).
pub const MAX_BMC_POLICIES_PER_DOMAIN: u8 = 64;

/// The policy id pattern (spec §3): ASCII letters, digits, underscore,
/// 1-255 characters.
pub fn is_valid_policy_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 255
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub type PolicyId = String;

/// `PolicyParams::policyStorage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyStorage {
    Volatile,
    Persistent,
}

impl PolicyStorage {
    pub fn parse(name: &str) -> Result<Self, PolicyError> {
        match name {
            "volatile" => Ok(PolicyStorage::Volatile),
            "persistent" => Ok(PolicyStorage::Persistent),
            _ => Err(PolicyError::InvalidPolicyStorage),
        }
    }
}

/// `PolicyParams::powerCorrectionType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerCorrectionType {
    Automatic,
    NonAggressive,
    Aggressive,
}

impl PowerCorrectionType {
    pub fn parse(name: &str) -> Result<Self, PolicyError> {
        match name {
            "automatic" => Ok(PowerCorrectionType::Automatic),
            "nonAggressive" => Ok(PowerCorrectionType::NonAggressive),
            "aggressive" => Ok(PowerCorrectionType::Aggressive),
            _ => Err(PolicyError::InvalidPowerCorrectionType),
        }
    }
}

/// `PolicyParams::limitException`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LimitException {
    NoAction,
    LogEvent,
    PowerOff,
    LogEventAndPowerOff,
}

impl LimitException {
    pub fn parse(name: &str) -> Result<Self, PolicyError> {
        match name {
            "noAction" => Ok(LimitException::NoAction),
            "logEvent" => Ok(LimitException::LogEvent),
            "powerOff" => Ok(LimitException::PowerOff),
            "logEventAndPowerOff" => Ok(LimitException::LogEventAndPowerOff),
            _ => Err(PolicyError::InvalidLimitException),
        }
    }
}

/// Who owns a policy and therefore what it's allowed to do (spec §4.4's
/// "internal policies are force-created" note, and the 64-per-domain cap
/// that applies only to `bmc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyOwner {
    Internal,
    Bmc,
    TotalBudget,
}

impl PolicyOwner {
    pub fn name(&self) -> &'static str {
        match self {
            PolicyOwner::Internal => "internal",
            PolicyOwner::Bmc => "bmc",
            PolicyOwner::TotalBudget => "totalBudget",
        }
    }

    pub fn parse(name: &str) -> Result<Self, PolicyError> {
        match name {
            "internal" => Ok(PolicyOwner::Internal),
            "bmc" => Ok(PolicyOwner::Bmc),
            "totalBudget" => Ok(PolicyOwner::TotalBudget),
            _ => Err(PolicyError::InvalidArgument),
        }
    }
}

/// `variant<vector<string>, string>` — a suspend-period field that's either
/// a single token (e.g. `"always"`) or a list of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

pub type PolicySuspendPeriods = Vec<HashMap<String, StringOrList>>;
pub type PolicyThresholds = HashMap<String, Vec<u16>>;

/// The knobs a performance policy is allowed to target — a restriction of
/// the source's unified `KnobType` to the subset `PerformancePolicy`
/// accepts (`performance_policy.hpp`'s `verifyKnobType`). Distinct from
/// [`crate::capability::KnobType`], which covers the budgeting-facing
/// subset instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PerformanceKnobType {
    TurboRatioLimit,
    Prochot,
    HwpmPerfPreference,
    HwpmPerfBias,
    HwpmPerfPreferenceOverride,
}

impl PerformanceKnobType {
    pub fn name(&self) -> &'static str {
        match self {
            PerformanceKnobType::TurboRatioLimit => "TurboRatioLimit",
            PerformanceKnobType::Prochot => "Prochot",
            PerformanceKnobType::HwpmPerfPreference => "HwpmPerfPreference",
            PerformanceKnobType::HwpmPerfBias => "HwpmPerfBias",
            PerformanceKnobType::HwpmPerfPreferenceOverride => "HwpmPerfPreferenceOverride",
        }
    }
}

/// `kCorrectionTimePerformancePolicy`. The source spells this
/// `std::numeric_limits<uint32_t>::quiet_NaN()`, which on an integer type
/// resolves to the primary template's default — `0`, not a true NaN. A
/// performance policy's `correctionInMs` must equal this value exactly.
pub const CORRECTION_TIME_PERFORMANCE_POLICY: u32 = 0;

/// Bounds a validation pass checks a [`PolicyParams`] against — the scalar
/// facts a `Policy` needs from its owning domain/capabilities, gathered up
/// front rather than passed as live object references.
#[derive(Debug, Clone, Copy)]
pub struct PolicyValidationContext {
    pub min_correction_time_ms: u32,
    pub max_correction_time_ms: u32,
    pub min_reporting_period_s: u32,
    pub max_reporting_period_s: u32,
    pub max_component_number: u8,
    pub is_component_available: bool,
    pub trigger_available: bool,
    pub trigger_min: u16,
    pub trigger_max: u16,
    pub is_power_policy: bool,
    pub limit_min: f64,
    pub limit_max: f64,
}

/// `PolicyParams` (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyParams {
    pub correction_in_ms: u32,
    pub limit: f64,
    pub stat_reporting_period: u32,
    pub policy_storage: PolicyStorage,
    pub power_correction_type: PowerCorrectionType,
    pub limit_exception: LimitException,
    pub suspend_periods: PolicySuspendPeriods,
    pub thresholds: PolicyThresholds,
    pub component_id: u8,
    pub trigger_limit: u16,
    pub trigger_type: TriggerType,
}

impl PolicyParams {
    /// `Policy::verifyParams` (spec §3's invariant list). `force` mirrors
    /// the source's force-create path for internal policies: correctable
    /// violations (`correctionInMs` out of range) are clamped in place
    /// instead of raising.
    pub fn validate(&mut self, ctx: &PolicyValidationContext, force: bool) -> Result<(), PolicyError> {
        if self.component_id != COMPONENT_ID_ALL {
            if self.component_id as u32 >= ctx.max_component_number as u32 || !ctx.is_component_available {
                return Err(PolicyError::InvalidComponentId);
            }
        }

        if self.trigger_type != TriggerType::Always {
            if !ctx.trigger_available {
                return Err(PolicyError::UnsupportedPolicyTriggerType);
            }
            if self.trigger_limit < ctx.trigger_min || self.trigger_limit > ctx.trigger_max {
                return Err(PolicyError::TriggerValueOutOfRange);
            }
        }

        if self.stat_reporting_period < ctx.min_reporting_period_s
            || self.stat_reporting_period > ctx.max_reporting_period_s
        {
            return Err(PolicyError::StatRepPeriodOutOfRange);
        }

        if self.trigger_type == TriggerType::MissingReadingsTimeout {
            if !(0.0..=100.0).contains(&self.limit) {
                return Err(PolicyError::PowerLimitOutOfRange);
            }
        } else if ctx.is_power_policy && self.limit == 0.0 {
            // 0 forces max throttle regardless of componentMin.
        } else if self.limit < ctx.limit_min || self.limit > ctx.limit_max {
            return Err(PolicyError::PowerLimitOutOfRange);
        }

        if self.correction_in_ms < ctx.min_correction_time_ms
            || self.correction_in_ms > ctx.max_correction_time_ms
        {
            if force {
                self.correction_in_ms = self
                    .correction_in_ms
                    .clamp(ctx.min_correction_time_ms, ctx.max_correction_time_ms);
                tracing::warn!(
                    clamped_to = self.correction_in_ms,
                    "correctionInMs out of range, clamped on restore"
                );
            } else {
                return Err(PolicyError::CorrectionTimeOutOfRange);
            }
        }

        Ok(())
    }
}

/// The effects `Policy::apply` derives by diffing the old and new
/// [`PolicyStateKind`] — install/uninstall the trigger on
/// `Pending`↔`Ready`, start/stop the limit-exception monitor and
/// throttling statistic on entering/leaving `Selected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateEffects {
    pub from: PolicyStateKind,
    pub to: PolicyStateKind,
    pub install_trigger: bool,
    pub uninstall_trigger: bool,
    pub entered_selected: bool,
    pub left_selected: bool,
}

fn derive_effects(from: PolicyStateKind, to: PolicyStateKind) -> StateEffects {
    use PolicyStateKind::*;
    StateEffects {
        from,
        to,
        install_trigger: to == Ready && from != Triggered && from != Selected,
        uninstall_trigger: from == Ready && to != Triggered,
        entered_selected: to == Selected && from != Selected,
        left_selected: from == Selected && to != Selected,
    }
}

/// `PolicyIf`/`PolicyBasicIf` realized as one struct carrying every flavor
/// of policy (power and performance alike) — the source's class hierarchy
/// collapses to data plus a `strategy` that's only meaningful for power
/// policies, since a tagged union is the idiomatic Rust shape here rather
/// than a trait-object hierarchy with a handful of no-op overrides.
pub struct Policy {
    id: PolicyId,
    owner: PolicyOwner,
    domain_id: DomainId,
    params: PolicyParams,
    state: PolicyStateKind,
    editable: bool,
    allow_delete: bool,
    enabled: bool,
    parent_enabled: bool,
    is_power_policy: bool,
    performance_knob: Option<PerformanceKnobType>,
    statistics: StatisticsProvider,
    monitor: LimitExceptionMonitor,
}

impl Policy {
    pub fn new_power(
        id: PolicyId,
        owner: PolicyOwner,
        domain_id: DomainId,
        params: PolicyParams,
        editable: bool,
        allow_delete: bool,
    ) -> Self {
        Self {
            id,
            owner,
            domain_id,
            params,
            state: PolicyStateKind::Disabled,
            editable,
            allow_delete,
            enabled: false,
            parent_enabled: false,
            is_power_policy: true,
            performance_knob: None,
            statistics: StatisticsProvider::new(),
            monitor: LimitExceptionMonitor::new(),
        }
    }

    pub fn new_performance(
        id: PolicyId,
        owner: PolicyOwner,
        domain_id: DomainId,
        params: PolicyParams,
        knob: PerformanceKnobType,
        editable: bool,
        allow_delete: bool,
    ) -> Self {
        Self {
            id,
            owner,
            domain_id,
            params,
            state: PolicyStateKind::Disabled,
            editable,
            allow_delete,
            enabled: false,
            parent_enabled: false,
            is_power_policy: false,
            performance_knob: Some(knob),
            statistics: StatisticsProvider::new(),
            monitor: LimitExceptionMonitor::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> PolicyOwner {
        self.owner
    }

    pub fn domain_id(&self) -> DomainId {
        self.domain_id
    }

    pub fn params(&self) -> &PolicyParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut PolicyParams {
        &mut self.params
    }

    pub fn state(&self) -> PolicyStateKind {
        self.state
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn allows_delete(&self) -> bool {
        self.allow_delete
    }

    pub fn is_power_policy(&self) -> bool {
        self.is_power_policy
    }

    pub fn performance_knob(&self) -> Option<PerformanceKnobType> {
        self.performance_knob
    }

    pub fn statistics_mut(&mut self) -> &mut StatisticsProvider {
        &mut self.statistics
    }

    pub fn monitor_mut(&mut self) -> &mut LimitExceptionMonitor {
        &mut self.monitor
    }

    /// `PowerPolicy::getStrategy()` — `None` for performance policies,
    /// which never go through compound budgeting.
    pub fn strategy(&self) -> Option<BudgetingStrategy> {
        self.is_power_policy.then(|| {
            power_policy_strategy(self.domain_id, self.params.power_correction_type, self.params.limit_exception)
        })
    }

    /// Drives the state machine and reports the side effects the caller
    /// must now carry out (trigger install/uninstall, monitor reset).
    pub fn apply(&mut self, input: PolicyInput) -> Option<StateEffects> {
        let next = state::next(self.state, input)?;
        let effects = derive_effects(self.state, next);
        if effects.left_selected {
            self.monitor.reset();
        }
        self.state = next;
        Some(effects)
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Option<StateEffects> {
        self.enabled = enabled;
        self.apply(PolicyInput::Enabled(enabled))
    }

    pub fn set_parent_enabled(&mut self, parent_enabled: bool) -> Option<StateEffects> {
        self.parent_enabled = parent_enabled;
        self.apply(PolicyInput::ParentEnabled(parent_enabled))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_parent_enabled(&self) -> bool {
        self.parent_enabled
    }

    pub fn reading_limit(&self) -> f64 {
        self.params.limit
    }

    pub fn component_id(&self) -> u8 {
        self.params.component_id
    }
}

/// `kComponentIdAll`'s device-index counterpart for per-component budgeting
/// paths that need a concrete [`DeviceIndex`] rather than the sentinel.
pub fn component_id_to_device_index(component_id: u8) -> Option<DeviceIndex> {
    (component_id != COMPONENT_ID_ALL).then_some(component_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PolicyValidationContext {
        PolicyValidationContext {
            min_correction_time_ms: 1000,
            max_correction_time_ms: 60000,
            min_reporting_period_s: 1,
            max_reporting_period_s: 3600,
            max_component_number: 8,
            is_component_available: true,
            trigger_available: true,
            trigger_min: 0,
            trigger_max: 1000,
            is_power_policy: true,
            limit_min: 0.0,
            limit_max: 1000.0,
        }
    }

    fn params() -> PolicyParams {
        PolicyParams {
            correction_in_ms: 6000,
            limit: 270.0,
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

    #[test]
    fn valid_params_pass() {
        let mut p = params();
        assert!(p.validate(&ctx(), false).is_ok());
    }

    #[test]
    fn component_id_all_bypasses_availability_check() {
        let mut c = ctx();
        c.is_component_available = false;
        let mut p = params();
        assert!(p.validate(&c, false).is_ok());
    }

    #[test]
    fn out_of_range_component_id_rejected() {
        let mut p = params();
        p.component_id = 9;
        assert_eq!(p.validate(&ctx(), false), Err(PolicyError::InvalidComponentId));
    }

    #[test]
    fn correction_time_boundaries_are_accepted() {
        let mut p = params();
        p.correction_in_ms = 1000;
        assert!(p.validate(&ctx(), false).is_ok());
        p.correction_in_ms = 60000;
        assert!(p.validate(&ctx(), false).is_ok());
    }

    #[test]
    fn correction_time_out_of_range_rejected_unless_forced() {
        let mut p = params();
        p.correction_in_ms = 999;
        assert_eq!(
            p.validate(&ctx(), false),
            Err(PolicyError::CorrectionTimeOutOfRange)
        );
        assert!(p.validate(&ctx(), true).is_ok());
        assert_eq!(p.correction_in_ms, 1000);
    }

    #[test]
    fn policy_id_pattern() {
        assert!(is_valid_policy_id("P1_test"));
        assert!(!is_valid_policy_id(""));
        assert!(!is_valid_policy_id("bad id!"));
        assert!(!is_valid_policy_id(&"x".repeat(256)));
    }

    #[test]
    fn apply_installs_trigger_on_entering_ready() {
        let mut policy = Policy::new_power(
            "P1".to_string(),
            PolicyOwner::Bmc,
            DomainId::CpuSubsystem,
            params(),
            true,
            true,
        );
        policy.apply(PolicyInput::ParametersValidation(true));
        policy.set_enabled(true);
        let effects = policy.set_parent_enabled(true).unwrap();
        assert_eq!(policy.state(), PolicyStateKind::Ready);
        assert!(effects.install_trigger);
    }

    #[test]
    fn apply_resets_monitor_on_leaving_selected() {
        let mut policy = Policy::new_power(
            "P1".to_string(),
            PolicyOwner::Bmc,
            DomainId::CpuSubsystem,
            params(),
            true,
            true,
        );
        policy.apply(PolicyInput::ParametersValidation(true));
        policy.set_enabled(true);
        policy.set_parent_enabled(true);
        policy.apply(PolicyInput::TriggerAction(crate::trigger::TriggerActionType::Trigger));
        policy.apply(PolicyInput::LimitSelection(true));
        assert_eq!(policy.state(), PolicyStateKind::Selected);
        let effects = policy.apply(PolicyInput::LimitSelection(false)).unwrap();
        assert!(effects.left_selected);
        assert_eq!(policy.state(), PolicyStateKind::Triggered);
    }

    #[test]
    fn performance_policy_has_no_strategy() {
        let policy = Policy::new_performance(
            "PERF1".to_string(),
            PolicyOwner::Bmc,
            DomainId::Performance,
            params(),
            PerformanceKnobType::TurboRatioLimit,
            true,
            true,
        );
        assert_eq!(policy.strategy(), None);
    }
}

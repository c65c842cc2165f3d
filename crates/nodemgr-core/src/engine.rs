//! Top-level orchestrator: one `tick()` per control-loop period, wiring
//! every other module the way spec §5's run order chains
//! devicesManager→ptam→budgeting→control→statusMonitor→smartSupervisor
//! together. `statusMonitor`/`smartSupervisor` have no dedicated module in
//! this crate — their jobs (publishing the live tree, seeding the SMBAlert
//! policy) are absorbed into [`transport`](crate::transport) and
//! [`domain::factory`] respectively, so the tick order below collapses to
//! reading poll → trigger evaluation → domain tick → budgeting → publish →
//! persist. Shaped after the daemon loop `nodemgrd` drives it from: one
//! struct owning every collaborator, one method advancing them all by a
//! single step.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::budgeting::{Budgeting, CapabilityBounds};
use crate::capability::{CapabilitiesIf, ComponentCapabilities, DomainCapabilities};
use crate::clock::Now;
use crate::config::{ConfigFile, GeneralPresets, PowerRange, PowerRangeStore};
use crate::domain::{factory, Domain, DomainId, DomainInfo};
use crate::error::PolicyError;
use crate::policy::limit_exception::action_starts_power_off;
use crate::policy::{
    component_id_to_device_index, is_valid_policy_id, HostPowerControl, LimitExceptionHandler,
    Policy, PolicyId, PolicyInput, PolicyOwner, PolicyParams, PolicyStateKind, PolicyStorage,
    PolicyValidationContext, StateEffects, MAX_BMC_POLICIES_PER_DOMAIN,
};
use crate::reading::{ReadingBus, ReadingType, ALL_DEVICES};
use crate::statistics::{GlobalAccumulator, PolicyAccumulator, Statistic};
use crate::storage::{PolicyRecord, PolicyStore};
use crate::transport::objects::{CapabilitiesSnapshot, DomainAttributes, TriggerAttributes};
use crate::transport::{ObjectPath, ObjectTree};
use crate::trigger::{gpio_line_of, TriggerActionType, TriggerType, TriggersManager};

/// Every domain an engine instance carries, in the fixed order they're
/// seeded and ticked (spec §3). `Performance` last: it never holds a power
/// limit, so ordering it after the power domains doesn't affect budgeting.
const ALL_DOMAINS: [DomainId; 7] = [
    DomainId::AcTotalPower,
    DomainId::DcTotalPower,
    DomainId::CpuSubsystem,
    DomainId::MemorySubsystem,
    DomainId::Pcie,
    DomainId::HwProtection,
    DomainId::Performance,
];

const ALL_TRIGGER_TYPES: [TriggerType; 6] = [
    TriggerType::Always,
    TriggerType::InletTemperature,
    TriggerType::CpuUtilization,
    TriggerType::HostReset,
    TriggerType::SmbalertInterrupt,
    TriggerType::Gpio,
];

/// How many components each domain reports (spec leaves the device count to
/// the devices manager, absent from this crate's scope; a fixed small count
/// stands in, the same shape `domain/aggregate.rs`'s own test fixture uses).
fn component_count(domain_id: DomainId) -> u8 {
    match domain_id {
        DomainId::CpuSubsystem | DomainId::MemorySubsystem | DomainId::Pcie => 2,
        DomainId::AcTotalPower | DomainId::DcTotalPower | DomainId::HwProtection | DomainId::Performance => 0,
    }
}

fn controlled_parameter(domain_id: DomainId) -> ReadingType {
    match domain_id {
        DomainId::AcTotalPower => ReadingType::AcPower,
        DomainId::DcTotalPower | DomainId::HwProtection => ReadingType::DcPower,
        DomainId::CpuSubsystem => ReadingType::CpuPower,
        DomainId::MemorySubsystem => ReadingType::DramPower,
        DomainId::Pcie => ReadingType::PciePower,
        DomainId::Performance => ReadingType::CpuUtilization,
    }
}

fn is_present(presets: &GeneralPresets, domain_id: DomainId) -> bool {
    match domain_id {
        DomainId::AcTotalPower => presets.ac_total_power_domain_present,
        DomainId::DcTotalPower => presets.dc_total_power_domain_present,
        DomainId::CpuSubsystem => presets.cpu_subsystem_domain_present,
        DomainId::MemorySubsystem => presets.memory_subsystem_domain_present,
        DomainId::Pcie => presets.pcie_domain_present,
        DomainId::HwProtection => presets.hw_protection_domain_present,
        DomainId::Performance => presets.performance_domain_present,
    }
}

fn is_enabled(presets: &GeneralPresets, domain_id: DomainId) -> bool {
    match domain_id {
        DomainId::AcTotalPower => presets.ac_total_power_domain_enabled,
        DomainId::DcTotalPower => presets.dc_total_power_domain_enabled,
        DomainId::CpuSubsystem => presets.cpu_subsystem_domain_enabled,
        DomainId::MemorySubsystem => presets.memory_subsystem_domain_enabled,
        DomainId::Pcie => presets.pcie_domain_enabled,
        DomainId::HwProtection => presets.hw_protection_domain_enabled,
        DomainId::Performance => presets.performance_domain_enabled,
    }
}

/// What the engine needs from its sensor collection side (spec §4.1's
/// "devicesManager" role): push this tick's samples onto the bus. A trait
/// rather than a direct dependency so the real sensor backend can be
/// plugged in without touching the tick loop, the same seam `Transport` and
/// `Control` use for their own external collaborators.
pub trait ReadingSource: Send {
    fn poll(&mut self, bus: &mut ReadingBus, now_ms: i64);
}

/// Default wiring until a real sensor backend is plugged in: publishes
/// nothing, so every reading reports unavailable and every policy that
/// depends on one stays un-triggered rather than acting on stale zeros.
#[derive(Default)]
pub struct NullReadingSource;

impl ReadingSource for NullReadingSource {
    fn poll(&mut self, _bus: &mut ReadingBus, _now_ms: i64) {}
}

/// [`PowerRangeStore`] backed by one [`ConfigFile`] shared across every
/// domain's [`DomainCapabilities`]. Handing each domain its own
/// `ConfigFile::load` would mean `flush()`ing seven independent snapshots of
/// the same `general.conf.json`, each overwriting the others' fields with
/// whatever stale copy it last read — this wrapper keeps exactly one
/// `ConfigFile` in memory and lets every domain read/write through it.
#[derive(Clone)]
pub struct SharedPowerRangeStore(Arc<Mutex<ConfigFile>>);

impl SharedPowerRangeStore {
    pub fn new(config: Arc<Mutex<ConfigFile>>) -> Self {
        Self(config)
    }
}

impl PowerRangeStore for SharedPowerRangeStore {
    fn get_power_range(&self) -> PowerRange {
        self.0.lock().unwrap().get_power_range()
    }

    fn update_power_range(&mut self, range: PowerRange) {
        self.0.lock().unwrap().update_power_range(range);
    }
}

/// Reference [`HostPowerControl`]: logs the requested transition and reports
/// it complete on the next poll, standing in for the host/chassis state RPC
/// surface until a real one is wired up. Mirrors [`crate::transport::LoggingTransport`]'s
/// "thin logging adapter over an external collaborator" shape.
#[derive(Default)]
pub struct LoggingHostPowerControl {
    host_off: bool,
    chassis_off: bool,
}

impl HostPowerControl for LoggingHostPowerControl {
    fn request_host_shutdown(&mut self) -> Result<bool, ()> {
        tracing::warn!("requesting host soft shutdown");
        self.host_off = true;
        Ok(true)
    }

    fn host_power_off(&self) -> bool {
        self.host_off
    }

    fn request_chassis_power_down(&mut self) -> Result<bool, ()> {
        tracing::warn!("requesting chassis power down");
        self.chassis_off = true;
        Ok(true)
    }

    fn chassis_power_off(&self) -> bool {
        self.chassis_off
    }
}

/// [`CapabilityBounds`] over the engine's live domain map — every
/// `SimpleDomainBudgeting` sub-domain clamp reads straight from that
/// domain's [`DomainCapabilities`], so there's no separate bounds table to
/// keep in sync.
struct EngineBounds<'a> {
    domains: &'a HashMap<DomainId, Domain>,
}

impl CapabilityBounds for EngineBounds<'_> {
    fn bounds(&self, domain_id: DomainId) -> (f64, f64) {
        self.domains
            .get(&domain_id)
            .map(|d| (d.capabilities().min(), d.capabilities().max()))
            .unwrap_or((0.0, 0.0))
    }
}

/// One installed trigger: which domain it belongs to, and the action
/// evaluator itself. Kept outside `Domain`/`Policy` because `Trigger`'s
/// callback can't hold a `&mut Domain` back into the structure it came
/// from — instead it pushes onto `pending_actions`, which the engine drains
/// after every poll pass.
struct InstalledTrigger {
    domain_id: DomainId,
    trigger: crate::trigger::Trigger,
    gpio_line: Option<u16>,
}

/// Ties every other module into one step-at-a-time control loop (spec §5,
/// §9). Owns the live domain/policy tree, the trigger and budgeting
/// pipelines, and the RPC/storage surfaces they're published and persisted
/// through.
pub struct Engine {
    clock: Box<dyn Now>,
    reading_bus: ReadingBus,
    reading_source: Box<dyn ReadingSource>,
    trigger_manager: TriggersManager,
    domains: HashMap<DomainId, Domain>,
    installed_triggers: HashMap<PolicyId, InstalledTrigger>,
    pending_actions: Arc<Mutex<VecDeque<(PolicyId, TriggerActionType)>>>,
    budgeting: Budgeting,
    policy_store: PolicyStore,
    validation_ctx: PolicyValidationContext,
    object_tree: ObjectTree,
    host_control: Box<dyn HostPowerControl>,
    escalations: HashMap<PolicyId, LimitExceptionHandler>,
    health: u8,
    storage_sync_every: u32,
    ticks_since_sync: u32,
}

impl Engine {
    /// Builds every domain the configured [`GeneralPresets`] marks present,
    /// seeds their internal (DMTF/SMBAlert/HwProtection/performance-knob)
    /// policies via [`domain::factory`], activates them, restores any
    /// persisted `bmc`-owned policies from `policy_store`, and leaves the
    /// result ready for `tick()`.
    pub fn new(
        clock: Box<dyn Now>,
        reading_source: Box<dyn ReadingSource>,
        shared_config: Arc<Mutex<ConfigFile>>,
        policy_store: PolicyStore,
        budgeting: Budgeting,
        object_tree: ObjectTree,
        host_control: Box<dyn HostPowerControl>,
        gpio_lines_count: u16,
    ) -> Self {
        let presets = shared_config.lock().unwrap().general_presets().clone();
        let gpio_line = shared_config.lock().unwrap().gpio().hw_protection_policy_trigger_gpio;
        let gpio_line = (gpio_line >= 0).then_some(gpio_line as u16);

        let trigger_manager = TriggersManager::new(gpio_lines_count);
        let mut domains = HashMap::new();

        for domain_id in ALL_DOMAINS {
            if !is_present(&presets, domain_id) {
                continue;
            }
            let max_component_number = component_count(domain_id);
            let has_readings = domain_id != DomainId::HwProtection && domain_id != DomainId::Performance;

            let store = Box::new(SharedPowerRangeStore::new(shared_config.clone()));
            let caps = DomainCapabilities::new(has_readings, has_readings, 1_000, domain_id, store);
            let components = (0..max_component_number).map(ComponentCapabilities::new).collect();

            let info = DomainInfo {
                object_path: format!("/xyz/openbmc_project/NodeManager/Domain/{}", domain_id.name()),
                controlled_parameter: controlled_parameter(domain_id),
                domain_id,
                available_components: Arc::new((0..max_component_number).collect()),
                required_reading_unavailable: false,
                triggers: Arc::new(available_triggers(&trigger_manager, domain_id)),
                max_component_number,
            };

            let mut domain = Domain::new(info, caps, components);
            domain.set_host_power(true, &mut NoopBudgeting);
            seed_domain(&mut domain, domain_id, gpio_line);
            domain.statistics_mut().add_statistic(
                controlled_parameter(domain_id),
                ALL_DEVICES,
                Box::new(Statistic::new("Power", Box::new(GlobalAccumulator::new()))),
            );
            seed_policy_statistics(&mut domain);
            domains.insert(domain_id, domain);
        }

        let validation_ctx = PolicyValidationContext {
            min_correction_time_ms: 1_000,
            max_correction_time_ms: 60_000,
            min_reporting_period_s: 1,
            max_reporting_period_s: 3_600,
            max_component_number: 64,
            is_component_available: true,
            trigger_available: true,
            trigger_min: 0,
            trigger_max: u16::MAX,
            is_power_policy: true,
            limit_min: 0.0,
            limit_max: crate::capability::UNKNOWN_MAX_POWER_LIMIT_WATTS,
        };

        let mut engine = Self {
            clock,
            reading_bus: ReadingBus::new(),
            reading_source,
            trigger_manager,
            domains,
            installed_triggers: HashMap::new(),
            pending_actions: Arc::new(Mutex::new(VecDeque::new())),
            budgeting,
            policy_store,
            validation_ctx,
            object_tree,
            host_control,
            escalations: HashMap::new(),
            health: 0,
            storage_sync_every: 10,
            ticks_since_sync: 0,
        };

        engine.activate_seeded_policies(&presets);
        engine.restore_persisted_policies();
        engine
    }

    /// Walks every policy `domain::factory` just seeded through
    /// `ParametersValidation`/`Enabled`/`ParentEnabled`, the same sequence a
    /// freshly-validated policy goes through in `policy::mod`'s own tests —
    /// seeded policies start `Disabled` and never move on their own.
    fn activate_seeded_policies(&mut self, presets: &GeneralPresets) {
        let domain_ids: Vec<DomainId> = self.domains.keys().copied().collect();
        for domain_id in domain_ids {
            let enabled = is_enabled(presets, domain_id);
            let mut effects_list: Vec<(PolicyId, StateEffects)> = Vec::new();
            if let Some(domain) = self.domains.get_mut(&domain_id) {
                let host_on = domain.is_host_power_on();
                for policy in domain.policies_mut() {
                    policy.apply(PolicyInput::ParametersValidation(true));
                    policy.set_enabled(enabled);
                    if let Some(effects) = policy.set_parent_enabled(host_on) {
                        effects_list.push((policy.id().to_string(), effects));
                    }
                }
            }
            for (policy_id, effects) in effects_list {
                self.handle_effects(domain_id, &policy_id, effects);
            }
        }
    }

    fn restore_persisted_policies(&mut self) {
        let records = match self.policy_store.load_all(&self.validation_ctx) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "failed to load persisted policies");
                return;
            }
        };
        for record in records {
            let host_on = match self.domains.get(&record.domain_id) {
                Some(domain) => domain.is_host_power_on(),
                None => continue,
            };
            let Some(domain) = self.domains.get_mut(&record.domain_id) else {
                continue;
            };
            let mut policy = Policy::new_power(
                record.policy_id.clone(),
                record.owner,
                record.domain_id,
                record.policy_params,
                true,
                true,
            );
            policy.apply(PolicyInput::ParametersValidation(true));
            policy.set_enabled(record.is_enabled);
            let effects = policy.set_parent_enabled(host_on);
            domain.add_policy(policy);
            seed_policy_statistic(domain, &record.policy_id);

            if let Some(effects) = effects {
                self.handle_effects(record.domain_id, &record.policy_id, effects);
            }
        }
    }

    /// Installs the trigger for a policy that just entered `Ready`.
    /// `TriggerType::Always` has no real `Trigger`/`Action` — the engine
    /// synthesizes its one-shot activation directly instead of going
    /// through `TriggersManager`, which rejects that trigger type outright.
    fn install_trigger_if_ready(&mut self, domain_id: DomainId, policy_id: &str) {
        let Some(domain) = self.domains.get(&domain_id) else {
            return;
        };
        let Some(policy) = domain.find_policy(policy_id) else {
            return;
        };
        if policy.state() != PolicyStateKind::Ready {
            return;
        }
        let trigger_type = policy.params().trigger_type;
        let trigger_level = policy.params().trigger_limit;

        if trigger_type == TriggerType::Always {
            self.pending_actions
                .lock()
                .unwrap()
                .push_back((policy_id.to_string(), TriggerActionType::Trigger));
            return;
        }

        let gpio_line = if trigger_type == TriggerType::Gpio {
            let line = gpio_line_of(trigger_level);
            if let Err(e) = self.trigger_manager.reserve_gpio(line) {
                tracing::warn!(policy_id, error = %e, "failed to reserve gpio line");
                return;
            }
            Some(line)
        } else {
            None
        };

        let pending = self.pending_actions.clone();
        let owned_id = policy_id.to_string();
        let callback: crate::trigger::TriggerCallback = Box::new(move |action| {
            pending.lock().unwrap().push_back((owned_id.clone(), action));
        });

        match self.trigger_manager.create_trigger(trigger_type, trigger_level, Some(callback)) {
            Ok(trigger) => {
                self.installed_triggers.insert(policy_id.to_string(), InstalledTrigger { domain_id, trigger, gpio_line });
            }
            Err(e) => {
                if let Some(line) = gpio_line {
                    self.trigger_manager.free_gpio(line);
                }
                tracing::warn!(policy_id, error = %e, "failed to install trigger");
            }
        }
    }

    /// Unregisters `policy_id`'s trigger and releases any GPIO line it held
    /// (spec §3: "a policy's removal unregisters its trigger and releases
    /// its reserved GPIO line"). A trigger-limit update goes through here
    /// then back through `install_trigger_if_ready`, freeing before
    /// reserving per spec §3.
    fn uninstall_trigger(&mut self, policy_id: &str) {
        if let Some(installed) = self.installed_triggers.remove(policy_id) {
            if let Some(line) = installed.gpio_line {
                self.trigger_manager.free_gpio(line);
            }
        }
    }

    /// Applies a just-derived [`StateEffects`] for one policy: install or
    /// uninstall its trigger.
    fn handle_effects(&mut self, domain_id: DomainId, policy_id: &str, effects: StateEffects) {
        if effects.install_trigger {
            self.install_trigger_if_ready(domain_id, policy_id);
        }
        if effects.uninstall_trigger {
            self.uninstall_trigger(policy_id);
        }
    }

    /// One control-loop step: poll sensors, evaluate triggers, run each
    /// domain's limit arbitration, propagate budgets to hardware, publish
    /// the live object tree, and periodically persist `persistent` policies.
    pub fn tick(&mut self) {
        let now_ms = self.clock.now_ms();

        self.reading_source.poll(&mut self.reading_bus, now_ms);

        for domain in self.domains.values_mut() {
            domain.statistics_mut().update_from_bus(now_ms, &self.reading_bus);
            for policy in domain.policies_mut() {
                policy.statistics_mut().update_from_bus(now_ms, &self.reading_bus);
            }
        }

        self.poll_triggers(now_ms);
        self.drain_pending_actions();
        self.poll_limit_exceptions(now_ms);

        if let Some(host_power) = self.reading_bus.last_value(ReadingType::HostPower, ALL_DEVICES) {
            let is_on = host_power != 0.0;
            for domain in self.domains.values_mut() {
                domain.set_host_power(is_on, &mut self.budgeting);
            }
        }

        for domain in self.domains.values_mut() {
            domain.tick(&mut self.budgeting);
        }

        let bounds = EngineBounds { domains: &self.domains };
        self.budgeting.run(now_ms, &self.reading_bus, &bounds);

        self.publish(now_ms);
        self.maybe_sync_storage();
    }

    fn poll_triggers(&mut self, now_ms: i64) {
        for (policy_id, installed) in self.installed_triggers.iter_mut() {
            let domain = match self.domains.get(&installed.domain_id) {
                Some(domain) => domain,
                None => continue,
            };
            let Some(policy) = domain.find_policy(policy_id) else { continue };
            let Ok(reading_type) = policy.params().trigger_type.to_reading_type() else { continue };
            let device = component_id_to_device_index(policy.component_id()).unwrap_or(ALL_DEVICES);
            let value = self.reading_bus.last_value(reading_type, device).unwrap_or(f64::NAN);
            installed.trigger.update_value(now_ms, value);
        }
    }

    fn drain_pending_actions(&mut self) {
        let actions: Vec<(PolicyId, TriggerActionType)> = {
            let mut queue = self.pending_actions.lock().unwrap();
            queue.drain(..).collect()
        };
        for (policy_id, action) in actions {
            let Some(domain_id) = self.domain_of(&policy_id) else { continue };
            let Some(domain) = self.domains.get_mut(&domain_id) else { continue };
            let Some(policy) = domain.find_policy_mut(&policy_id) else { continue };
            if let Some(effects) = policy.apply(PolicyInput::TriggerAction(action)) {
                self.handle_effects(domain_id, &policy_id, effects);
            }
        }
    }

    /// Feeds every `Selected` power policy's reading into its
    /// [`crate::policy::LimitExceptionMonitor`], starting (or continuing) the
    /// power-off escalation when one fires (spec §8's limit-exception
    /// scenario).
    fn poll_limit_exceptions(&mut self, now_ms: i64) {
        let mut to_begin = Vec::new();
        for domain in self.domains.values_mut() {
            let reading_type = domain.info().controlled_parameter;
            for policy in domain.policies_mut() {
                if !policy.is_power_policy() {
                    continue;
                }
                let is_selected = policy.state() == PolicyStateKind::Selected;
                let device = component_id_to_device_index(policy.component_id()).unwrap_or(ALL_DEVICES);
                let value = self.reading_bus.last_value(reading_type, device).unwrap_or(f64::NAN);
                let limit = policy.params().limit.clamp(0.0, u16::MAX as f64) as u16;
                let fired = policy
                    .monitor_mut()
                    .tick(now_ms, is_selected, value, limit, policy.params().correction_in_ms);
                if fired && action_starts_power_off(policy.params().limit_exception) {
                    to_begin.push(policy.id().to_string());
                }
            }
        }

        for policy_id in to_begin {
            self.escalations
                .entry(policy_id)
                .or_insert_with(LimitExceptionHandler::with_default_timeouts)
                .begin(now_ms);
        }

        let mut resolved = Vec::new();
        for (policy_id, handler) in self.escalations.iter_mut() {
            if let Some(outcome) = handler.poll(now_ms, self.host_control.as_mut()) {
                tracing::warn!(policy_id, ?outcome, "limit-exception escalation resolved");
                resolved.push(policy_id.clone());
            }
        }
        for policy_id in resolved {
            self.escalations.remove(&policy_id);
            if let Some(domain_id) = self.domain_of(&policy_id) {
                if let Some(domain) = self.domains.get_mut(&domain_id) {
                    if let Some(policy) = domain.find_policy_mut(&policy_id) {
                        policy.monitor_mut().mark_action_finished();
                    }
                }
            }
        }
    }

    fn domain_of(&self, policy_id: &str) -> Option<DomainId> {
        self.domains
            .iter()
            .find(|(_, domain)| domain.find_policy(policy_id).is_some())
            .map(|(&id, _)| id)
    }

    fn publish(&mut self, now_ms: i64) {
        self.object_tree.publish_root(self.health);
        self.publish_triggers();

        for domain in self.domains.values_mut() {
            let domain_id = domain.info().domain_id;
            let stats = domain.statistics_mut().get_statistics(now_ms);
            self.object_tree.publish_statistics(domain_id, &stats);
        }

        for domain in self.domains.values() {
            let domain_id = domain.info().domain_id;
            let attrs = DomainAttributes {
                domain_id,
                available_triggers: domain.info().triggers.iter().map(|t| t.name().to_string()).collect(),
                limit_bias_absolute: domain.limit_bias().0,
                limit_bias_relative: domain.limit_bias().1,
                available_components: domain.info().available_components.as_ref().clone(),
            };
            let capabilities = CapabilitiesSnapshot {
                min: domain.capabilities().min(),
                max: domain.capabilities().max(),
                max_correction_time_ms: domain.capabilities().max_correction_time_ms(),
                min_correction_time_ms: domain.capabilities().min_correction_time_ms(),
                max_stat_reporting_period_s: domain.capabilities().max_stat_reporting_period() as u32,
                min_stat_reporting_period_s: domain.capabilities().min_stat_reporting_period() as u32,
            };
            self.object_tree.publish_domain(&attrs, &capabilities, domain.is_host_power_on());

            let selected: Vec<String> = domain
                .policies()
                .iter()
                .filter(|p| p.state() == PolicyStateKind::Selected)
                .map(|p| p.id().to_string())
                .collect();
            self.object_tree.publish_selected_policies(domain_id, &selected);

            for policy in domain.policies() {
                self.object_tree.publish_policy(policy);
            }
        }
    }

    fn publish_triggers(&mut self) {
        for trigger_type in ALL_TRIGGER_TYPES {
            if let Ok(caps) = self.trigger_manager.get_trigger_capabilities(trigger_type) {
                self.object_tree.publish_trigger(&TriggerAttributes {
                    trigger_type,
                    min: caps.min as f64,
                    max: caps.max as f64,
                    unit: caps.unit,
                });
            }
        }
    }

    fn maybe_sync_storage(&mut self) {
        self.ticks_since_sync += 1;
        if self.ticks_since_sync < self.storage_sync_every {
            return;
        }
        self.ticks_since_sync = 0;
        for domain in self.domains.values() {
            for policy in domain.policies() {
                if let Err(e) = self.policy_store.sync(policy) {
                    tracing::error!(policy_id = policy.id(), error = %e, "failed to persist policy");
                }
            }
        }
    }

    /// `PolicyManager.CreateWithId` (spec §6): creates a `bmc`-owned power
    /// policy, subject to the per-domain cap.
    pub fn create_policy(&mut self, domain_id: DomainId, id: PolicyId, params: PolicyParams) -> Result<ObjectPath, PolicyError> {
        self.create_power_policy(domain_id, id, PolicyOwner::Bmc, params)
    }

    /// `PolicyManager.CreateForTotalBudget` (spec §6): same validation path
    /// as [`Self::create_policy`], owned by `totalBudget` instead of `bmc`
    /// so it isn't counted against the 64-per-domain cap (spec §3: "`bmc`
    /// policies count against a hard cap of 64 per domain").
    pub fn create_policy_for_total_budget(&mut self, domain_id: DomainId, id: PolicyId, params: PolicyParams) -> Result<ObjectPath, PolicyError> {
        self.create_power_policy(domain_id, id, PolicyOwner::TotalBudget, params)
    }

    fn create_power_policy(
        &mut self,
        domain_id: DomainId,
        id: PolicyId,
        owner: PolicyOwner,
        mut params: PolicyParams,
    ) -> Result<ObjectPath, PolicyError> {
        if !is_valid_policy_id(&id) {
            return Err(PolicyError::InvalidPolicyId);
        }
        if !factory::accepts_user_policies(domain_id) {
            return Err(PolicyError::InvalidDomainId);
        }
        let Some(domain) = self.domains.get(&domain_id) else {
            return Err(PolicyError::InvalidDomainId);
        };
        if domain.find_policy(&id).is_some() {
            return Err(PolicyError::InvalidArgument);
        }
        if owner == PolicyOwner::Bmc {
            let bmc_count = domain.policies().iter().filter(|p| p.owner() == PolicyOwner::Bmc).count();
            if bmc_count >= MAX_BMC_POLICIES_PER_DOMAIN as usize {
                return Err(PolicyError::PoliciesCannotBeCreated);
            }
        }
        params.validate(&self.validation_ctx, false)?;

        if params.trigger_type == TriggerType::Gpio {
            self.trigger_manager.reserve_gpio(gpio_line_of(params.trigger_limit))?;
        }

        let host_on = domain.is_host_power_on();
        let mut policy = Policy::new_power(id.clone(), owner, domain_id, params, true, true);
        policy.apply(PolicyInput::ParametersValidation(true));
        policy.set_enabled(true);
        let effects = policy.set_parent_enabled(host_on);

        let persistent = policy.params().policy_storage == PolicyStorage::Persistent;
        let domain = self.domains.get_mut(&domain_id).expect("checked above");
        domain.add_policy(policy);
        seed_policy_statistic(domain, &id);
        if persistent {
            if let Some(policy) = domain.find_policy(&id) {
                if let Err(e) = self.policy_store.sync(policy) {
                    tracing::error!(policy_id = %id, error = %e, "failed to persist created policy");
                }
            }
        }

        if let Some(effects) = effects {
            self.handle_effects(domain_id, &id, effects);
        }

        if let Some(policy) = self.domains.get(&domain_id).and_then(|d| d.find_policy(&id)) {
            self.object_tree.publish_policy(policy);
        }

        Ok(self.object_tree.policy_path(domain_id, &id))
    }

    /// `Object.Delete` (spec §6): only `allowDelete` policies accept this;
    /// releases the policy's trigger/GPIO line and any storage record.
    pub fn delete_policy(&mut self, domain_id: DomainId, id: &str) -> Result<(), PolicyError> {
        let domain = self.domains.get(&domain_id).ok_or(PolicyError::InvalidDomainId)?;
        let policy = domain.find_policy(id).ok_or(PolicyError::InvalidArgument)?;
        if !policy.allows_delete() {
            return Err(PolicyError::OperationNotPermitted);
        }

        self.uninstall_trigger(id);
        self.escalations.remove(id);
        let domain = self.domains.get_mut(&domain_id).expect("checked above");
        domain.remove_policy(id);
        if let Err(e) = self.policy_store.delete(id) {
            tracing::error!(policy_id = id, error = %e, "failed to delete persisted policy record");
        }
        self.object_tree.unpublish_policy(domain_id, id);
        Ok(())
    }

    /// Writable `Object.Enable.Enabled` (spec §6): flips a policy's own
    /// enabled latch, independent of its domain's.
    pub fn set_policy_enabled(&mut self, domain_id: DomainId, id: &str, enabled: bool) -> Result<(), PolicyError> {
        let domain = self.domains.get(&domain_id).ok_or(PolicyError::InvalidDomainId)?;
        let policy = domain.find_policy(id).ok_or(PolicyError::InvalidArgument)?;
        if !policy.is_editable() {
            return Err(PolicyError::OperationNotPermitted);
        }

        let domain = self.domains.get_mut(&domain_id).expect("checked above");
        let policy = domain.find_policy_mut(id).expect("checked above");
        let effects = policy.set_enabled(enabled);
        if let Some(effects) = effects {
            self.handle_effects(domain_id, id, effects);
        }
        if let Some(policy) = self.domains.get(&domain_id).and_then(|d| d.find_policy(id)) {
            self.object_tree.publish_policy(policy);
        }
        Ok(())
    }
}

fn available_triggers(manager: &TriggersManager, domain_id: DomainId) -> std::collections::HashSet<TriggerType> {
    let candidates = match domain_id {
        DomainId::Pcie => vec![TriggerType::Always, TriggerType::SmbalertInterrupt],
        DomainId::HwProtection => vec![TriggerType::Always, TriggerType::Gpio],
        _ => vec![TriggerType::Always, TriggerType::InletTemperature, TriggerType::CpuUtilization, TriggerType::HostReset],
    };
    candidates.into_iter().filter(|t| manager.is_trigger_available(*t)).collect()
}

/// Seeds a `"Power"` [`Statistic`] for every power policy already on
/// `domain`, windowed by each policy's own `statReportingPeriod` (spec
/// §4.3.3's `PolicyAccumulator`), bound to the domain's controlled-parameter
/// reading at that policy's component. Mirrors `PowerPolicy::updateParams`
/// re-seeding its statistic whenever `componentId`/`statReportingPeriod`
/// change; this crate re-seeds once, at creation, since policy parameters
/// aren't mutated in place after restore/activation.
fn seed_policy_statistics(domain: &mut Domain) {
    let reading_type = domain.info().controlled_parameter;
    for policy in domain.policies_mut() {
        seed_power_statistic(policy, reading_type);
    }
}

fn seed_policy_statistic(domain: &mut Domain, policy_id: &str) {
    let reading_type = domain.info().controlled_parameter;
    if let Some(policy) = domain.find_policy_mut(policy_id) {
        seed_power_statistic(policy, reading_type);
    }
}

fn seed_power_statistic(policy: &mut Policy, reading_type: ReadingType) {
    if !policy.is_power_policy() {
        return;
    }
    let device = component_id_to_device_index(policy.component_id()).unwrap_or(ALL_DEVICES);
    let period_ms = (policy.params().stat_reporting_period as i64).max(1) * 1_000;
    policy.statistics_mut().add_statistic(
        reading_type,
        device,
        Box::new(Statistic::new("Power", Box::new(PolicyAccumulator::new(period_ms)))),
    );
}

fn seed_domain(domain: &mut Domain, domain_id: DomainId, gpio_line: Option<u16>) {
    match domain_id {
        DomainId::AcTotalPower => factory::seed_dmtf_policies(domain, "Input", "Inputs"),
        DomainId::DcTotalPower => factory::seed_dmtf_policies(domain, "Output", "Outputs"),
        DomainId::CpuSubsystem => factory::seed_dmtf_policies(domain, "Cpu", "Cpus"),
        DomainId::MemorySubsystem => factory::seed_dmtf_policies(domain, "Memory", "Memories"),
        DomainId::Pcie => {
            factory::seed_dmtf_policies(domain, "Card", "Cards");
            factory::seed_smbalert_policy(domain);
        }
        DomainId::HwProtection => factory::seed_hw_protection_policies(domain, gpio_line),
        DomainId::Performance => factory::seed_performance_policies(domain),
    }
}

/// Placeholder `BudgetingHandle` used only while constructing a `Domain`,
/// before `Engine`'s real `Budgeting` exists — the very first
/// `set_host_power(true, ..)` call has nothing to release yet, so a handle
/// that records nothing is sufficient.
struct NoopBudgeting;

impl crate::domain::BudgetingHandle for NoopBudgeting {
    fn set_limit(&mut self, _domain_id: DomainId, _component_id: u8, _value: f64, _strategy: crate::policy::BudgetingStrategy) {}
    fn reset_limit(&mut self, _domain_id: DomainId, _component_id: u8, _strategy: crate::policy::BudgetingStrategy) {}
    fn is_active(&self, _domain_id: DomainId, _component_id: u8, _strategy: crate::policy::BudgetingStrategy) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::budgeting::SimpleDomainBudgeting;
    use crate::clock::ManualClock;
    use crate::control::{InMemoryControl, LoggingKnobWriter};
    use crate::domain::RaplDomainId;
    use crate::policy::{LimitException, PolicyOwner, PolicyParams, PolicyStorage, PowerCorrectionType, COMPONENT_ID_ALL};
    use crate::storage::PolicyRecord;
    use crate::transport::LoggingTransport;

    /// Publishes one fixed `CpuPower` sample (plus a powered-on host) every
    /// poll, so a test can drive `Engine::tick` without a real sensor
    /// backend.
    struct FixedReadingSource {
        cpu_power: f64,
    }

    impl ReadingSource for FixedReadingSource {
        fn poll(&mut self, bus: &mut ReadingBus, _now_ms: i64) {
            bus.publish(ReadingType::CpuPower, ALL_DEVICES, self.cpu_power);
            bus.publish(ReadingType::HostPower, ALL_DEVICES, 1.0);
        }
    }

    fn build_engine(storage_dir: &std::path::Path, clock: Box<dyn Now>, reading_source: Box<dyn ReadingSource>) -> Engine {
        let config = ConfigFile::load(storage_dir.join("missing-general.conf.json")).unwrap();
        let shared_config = Arc::new(Mutex::new(config));
        let policy_store = PolicyStore::new(storage_dir.join("policies")).unwrap();
        let compound = SimpleDomainBudgeting::new(Vec::new(), RaplDomainId::CpuSubsystem);
        let control = InMemoryControl::new(Box::new(LoggingKnobWriter));
        let budgeting = Budgeting::new(Box::new(control), compound);
        let object_tree = ObjectTree::new(Box::new(LoggingTransport::new()));
        let host_control = Box::new(LoggingHostPowerControl::default());
        Engine::new(clock, reading_source, shared_config, policy_store, budgeting, object_tree, host_control, 0)
    }

    fn power_params(limit: f64, power_correction_type: PowerCorrectionType, limit_exception: LimitException) -> PolicyParams {
        PolicyParams {
            correction_in_ms: 1_000,
            limit,
            stat_reporting_period: 60,
            policy_storage: PolicyStorage::Volatile,
            power_correction_type,
            limit_exception,
            suspend_periods: Vec::new(),
            thresholds: HashMap::new(),
            component_id: COMPONENT_ID_ALL,
            trigger_limit: 0,
            trigger_type: TriggerType::Always,
        }
    }

    /// Spec §8's "engine presets decide what the tree looks like at startup":
    /// only the domains `GeneralPresets::default()` marks present are built.
    #[test]
    fn default_presets_seed_cpu_memory_and_dc_domains_only() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Box::new(ManualClock::new(0));
        let engine = build_engine(dir.path(), clock, Box::new(NullReadingSource));

        assert!(engine.domains.contains_key(&DomainId::CpuSubsystem));
        assert!(engine.domains.contains_key(&DomainId::MemorySubsystem));
        assert!(engine.domains.contains_key(&DomainId::DcTotalPower));
        assert!(!engine.domains.contains_key(&DomainId::AcTotalPower));
        assert!(!engine.domains.contains_key(&DomainId::HwProtection));
        assert!(!engine.domains.contains_key(&DomainId::Performance));
    }

    /// Spec §8's DMTF scenario: the always-on domain-wide policy installs
    /// its trigger at construction, fires on the first tick, and is
    /// reported `Selected` once Budgeting has had a tick to catch up and
    /// report the limit active back to `matchPolicyWithSelectedLimit`.
    #[test]
    fn dmtf_always_on_policy_reaches_selected_after_two_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Box::new(ManualClock::new(0));
        let mut engine = build_engine(dir.path(), clock, Box::new(FixedReadingSource { cpu_power: 90.0 }));

        engine.tick();
        engine.tick();

        let domain = engine.domains.get(&DomainId::CpuSubsystem).unwrap();
        let policy = domain.find_policy("DmtfPowerCpus").unwrap();
        assert_eq!(policy.state(), PolicyStateKind::Selected);
    }

    /// The statistics-wiring fix this crate relies on: `Engine::tick` feeds
    /// each domain's bound readings into its `StatisticsProvider` every
    /// tick, so `GetStatistics()` reflects the latest sample without any
    /// extra plumbing from the caller.
    #[test]
    fn domain_statistics_reflect_the_latest_reading_after_tick() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Box::new(ManualClock::new(1_000));
        let mut engine = build_engine(dir.path(), clock, Box::new(FixedReadingSource { cpu_power: 77.0 }));

        engine.tick();

        let domain = engine.domains.get_mut(&DomainId::CpuSubsystem).unwrap();
        let stats = domain.statistics_mut().get_statistics(1_000);
        match stats.get("Power").and_then(|v| v.get("Current")) {
            Some(crate::statistics::StatValue::Double(v)) => assert!((v - 77.0).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    /// Spec §8's persistence scenario: a `bmc`-owned `persistent` policy
    /// saved to storage is restored on the next `Engine::new` ("restart"),
    /// picks up a seeded statistic, and resumes progressing through the
    /// state machine rather than sitting `Disabled`.
    #[test]
    fn persistent_policy_survives_restart_and_resumes_progressing() {
        let dir = tempfile::tempdir().unwrap();
        let policy_store = PolicyStore::new(dir.path().join("policies")).unwrap();
        policy_store
            .save(&PolicyRecord {
                policy_id: "UserLimit".to_string(),
                domain_id: DomainId::CpuSubsystem,
                owner: PolicyOwner::Bmc,
                is_enabled: true,
                policy_params: power_params(50.0, PowerCorrectionType::Aggressive, LimitException::NoAction),
            })
            .unwrap();

        let clock = Box::new(ManualClock::new(0));
        let mut engine = build_engine(dir.path(), clock, Box::new(FixedReadingSource { cpu_power: 10.0 }));

        assert!(engine.domains.get(&DomainId::CpuSubsystem).unwrap().find_policy("UserLimit").is_some());

        engine.tick();
        engine.tick();

        let domain = engine.domains.get_mut(&DomainId::CpuSubsystem).unwrap();
        let policy = domain.find_policy("UserLimit").unwrap();
        assert!(matches!(policy.state(), PolicyStateKind::Triggered | PolicyStateKind::Selected));
        assert!(domain.statistics_mut().get_statistics(0).is_empty());
        assert!(policy.params().limit == 50.0);
    }

    /// Spec §8's limit-exception scenario: a continuous exceedance past
    /// `correctionInMs` starts the power-off escalation, which
    /// `LoggingHostPowerControl` resolves within the same tick it fires.
    /// Exercised directly against `poll_limit_exceptions`/the reading bus
    /// rather than through `tick()`'s full budgeting pipeline, so the
    /// outcome doesn't depend on which of several competing policies'
    /// candidate limit a `PowerLimitSelector` happens to keep (see
    /// `budgeting::selector`'s "same-domain resubmission replaces" rule).
    #[test]
    fn limit_exception_power_off_escalation_resolves_once_correction_time_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Box::new(ManualClock::new(0));
        let mut engine = build_engine(dir.path(), clock, Box::new(NullReadingSource));

        let mut policy = Policy::new_power(
            "Hot".to_string(),
            PolicyOwner::Bmc,
            DomainId::CpuSubsystem,
            power_params(50.0, PowerCorrectionType::Automatic, LimitException::PowerOff),
            true,
            true,
        );
        policy.apply(PolicyInput::ParametersValidation(true));
        policy.set_enabled(true);
        policy.set_parent_enabled(true);
        policy.apply(PolicyInput::TriggerAction(TriggerActionType::Trigger));
        policy.apply(PolicyInput::LimitSelection(true));
        assert_eq!(policy.state(), PolicyStateKind::Selected);
        engine.domains.get_mut(&DomainId::CpuSubsystem).unwrap().add_policy(policy);

        engine.reading_bus.publish(ReadingType::CpuPower, ALL_DEVICES, 200.0);

        engine.poll_limit_exceptions(0);
        assert!(!engine.host_control.host_power_off());
        engine.poll_limit_exceptions(500);
        assert!(!engine.host_control.host_power_off());
        engine.poll_limit_exceptions(1_500);
        assert!(engine.host_control.host_power_off());
    }

    fn build_engine_with_gpio(
        dir: &std::path::Path,
        clock: Box<dyn Now>,
        reading_source: Box<dyn ReadingSource>,
        gpio_lines_count: u16,
    ) -> Engine {
        let config = ConfigFile::load(dir.join("missing-general.conf.json")).unwrap();
        let shared_config = Arc::new(Mutex::new(config));
        let policy_store = PolicyStore::new(dir.join("policies")).unwrap();
        let compound = SimpleDomainBudgeting::new(Vec::new(), RaplDomainId::CpuSubsystem);
        let control = InMemoryControl::new(Box::new(LoggingKnobWriter));
        let budgeting = Budgeting::new(Box::new(control), compound);
        let object_tree = ObjectTree::new(Box::new(LoggingTransport::new()));
        let host_control = Box::new(LoggingHostPowerControl::default());
        Engine::new(
            clock,
            reading_source,
            shared_config,
            policy_store,
            budgeting,
            object_tree,
            host_control,
            gpio_lines_count,
        )
    }

    /// `PolicyManager.CreateWithId`: the returned path matches
    /// `ObjectTree::policy_path`, the policy is reachable through the
    /// domain afterwards, and a second create under the same id is
    /// rejected rather than silently replacing it.
    #[test]
    fn create_policy_publishes_and_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Box::new(ManualClock::new(0));
        let mut engine = build_engine(dir.path(), clock, Box::new(NullReadingSource));

        let params = power_params(50.0, PowerCorrectionType::NonAggressive, LimitException::NoAction);
        let path = engine.create_policy(DomainId::CpuSubsystem, "UserLimit".to_string(), params.clone()).unwrap();
        assert_eq!(path, engine.object_tree.policy_path(DomainId::CpuSubsystem, "UserLimit"));
        assert!(engine.domains.get(&DomainId::CpuSubsystem).unwrap().find_policy("UserLimit").is_some());

        let err = engine.create_policy(DomainId::CpuSubsystem, "UserLimit".to_string(), params).unwrap_err();
        assert_eq!(err, PolicyError::InvalidArgument);
    }

    /// Spec §3's "`bmc` policies count against a hard cap of 64 per
    /// domain": the 65th `bmc`-owned create in a domain is rejected, but
    /// a `totalBudget`-owned one still goes through afterwards.
    #[test]
    fn create_policy_enforces_the_bmc_cap_but_total_budget_is_exempt() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Box::new(ManualClock::new(0));
        let mut engine = build_engine(dir.path(), clock, Box::new(NullReadingSource));

        for i in 0..MAX_BMC_POLICIES_PER_DOMAIN {
            let params = power_params(50.0, PowerCorrectionType::NonAggressive, LimitException::NoAction);
            engine.create_policy(DomainId::CpuSubsystem, format!("Bmc{i}"), params).unwrap();
        }

        let params = power_params(50.0, PowerCorrectionType::NonAggressive, LimitException::NoAction);
        let err = engine.create_policy(DomainId::CpuSubsystem, "OneTooMany".to_string(), params).unwrap_err();
        assert_eq!(err, PolicyError::PoliciesCannotBeCreated);

        let params = power_params(50.0, PowerCorrectionType::NonAggressive, LimitException::NoAction);
        assert!(engine.create_policy_for_total_budget(DomainId::CpuSubsystem, "TotalBudget".to_string(), params).is_ok());
    }

    /// `Object.Delete`: only `allowDelete` policies accept it, and a
    /// deletable one is gone from the domain and storage afterwards.
    #[test]
    fn delete_policy_rejects_non_deletable_and_removes_deletable_ones() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Box::new(ManualClock::new(0));
        let mut engine = build_engine(dir.path(), clock, Box::new(NullReadingSource));

        let err = engine.delete_policy(DomainId::CpuSubsystem, "DmtfPowerCpus").unwrap_err();
        assert_eq!(err, PolicyError::OperationNotPermitted);

        let params = power_params(50.0, PowerCorrectionType::NonAggressive, LimitException::NoAction);
        engine.create_policy(DomainId::CpuSubsystem, "UserLimit".to_string(), params).unwrap();
        engine.delete_policy(DomainId::CpuSubsystem, "UserLimit").unwrap();
        assert!(engine.domains.get(&DomainId::CpuSubsystem).unwrap().find_policy("UserLimit").is_none());
    }

    /// Writable `Object.Enable.Enabled`: a non-editable policy rejects the
    /// write; an editable one's latch flips and is republished.
    #[test]
    fn set_policy_enabled_rejects_non_editable_policies() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Box::new(ManualClock::new(0));
        let mut engine = build_engine(dir.path(), clock, Box::new(NullReadingSource));

        let locked = Policy::new_power(
            "Locked".to_string(),
            PolicyOwner::Internal,
            DomainId::CpuSubsystem,
            power_params(50.0, PowerCorrectionType::NonAggressive, LimitException::NoAction),
            false,
            false,
        );
        engine.domains.get_mut(&DomainId::CpuSubsystem).unwrap().add_policy(locked);
        let err = engine.set_policy_enabled(DomainId::CpuSubsystem, "Locked", false).unwrap_err();
        assert_eq!(err, PolicyError::OperationNotPermitted);

        let params = power_params(50.0, PowerCorrectionType::NonAggressive, LimitException::NoAction);
        engine.create_policy(DomainId::CpuSubsystem, "UserLimit".to_string(), params).unwrap();
        engine.set_policy_enabled(DomainId::CpuSubsystem, "UserLimit", false).unwrap();
        let domain = engine.domains.get(&DomainId::CpuSubsystem).unwrap();
        assert!(!domain.find_policy("UserLimit").unwrap().is_enabled());
    }

    /// Spec §3's process-wide GPIO reservation: two policies can't claim
    /// the same line, and deleting the holder frees it for reuse.
    #[test]
    fn create_policy_reserves_gpio_lines_and_delete_frees_them() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Box::new(ManualClock::new(0));
        let mut engine = build_engine_with_gpio(dir.path(), clock, Box::new(NullReadingSource), 8);

        let mut params = power_params(50.0, PowerCorrectionType::NonAggressive, LimitException::NoAction);
        params.trigger_type = TriggerType::Gpio;
        params.trigger_limit = 3;
        engine.create_policy(DomainId::CpuSubsystem, "GpioOne".to_string(), params.clone()).unwrap();

        let err = engine.create_policy(DomainId::CpuSubsystem, "GpioTwo".to_string(), params.clone()).unwrap_err();
        assert_eq!(err, PolicyError::OperationNotPermitted);

        engine.delete_policy(DomainId::CpuSubsystem, "GpioOne").unwrap();
        assert!(engine.create_policy(DomainId::CpuSubsystem, "GpioTwo".to_string(), params).is_ok());
    }
}

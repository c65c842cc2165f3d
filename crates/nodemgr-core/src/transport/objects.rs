//! Object-tree shape (spec §6): `Root`, `Domain/<D>`, `Domain/<D>/Policy/<id>`,
//! `Trigger/<T>`. [`ObjectTree`] publishes these onto any [`Transport`] —
//! it only ever calls through the trait, so it's agnostic to whatever bus
//! binding eventually backs it.

use super::{ObjectPath, PropertyValue, Transport};
use crate::domain::DomainId;
use crate::policy::{Policy, PolicyOwner, PolicyStateKind};
use crate::statistics::{StatValue, StatValuesMap};
use crate::trigger::TriggerType;
use std::collections::HashMap;

pub const IFACE_ROOT: &str = "xyz.openbmc_project.NodeManager";
pub const IFACE_CAPABILITIES: &str = "xyz.openbmc_project.NodeManager.Capabilities";
pub const IFACE_DOMAIN_ATTRIBUTES: &str = "xyz.openbmc_project.NodeManager.DomainAttributes";
pub const IFACE_POLICY_MANAGER: &str = "xyz.openbmc_project.NodeManager.PolicyManager";
pub const IFACE_STATISTICS: &str = "xyz.openbmc_project.NodeManager.Statistics";
pub const IFACE_POLICY_ATTRIBUTES: &str = "xyz.openbmc_project.NodeManager.PolicyAttributes";
pub const IFACE_TRIGGER: &str = "xyz.openbmc_project.NodeManager.Trigger";
pub const IFACE_ENABLE: &str = "xyz.openbmc_project.Object.Enable";
pub const IFACE_DELETE: &str = "xyz.openbmc_project.Object.Delete";

pub const MAX_NUMBER_OF_POLICIES: u8 = 64;
pub const VERSION: &str = "1.0";

/// Root/domain/policy/trigger attributes this daemon publishes, expressed
/// independently of `Transport` so callers building the tree don't have to
/// know the property encoding.
pub struct DomainAttributes {
    pub domain_id: DomainId,
    pub available_triggers: Vec<String>,
    pub limit_bias_absolute: f64,
    pub limit_bias_relative: f64,
    pub available_components: Vec<u8>,
}

pub struct CapabilitiesSnapshot {
    pub min: f64,
    pub max: f64,
    pub max_correction_time_ms: u32,
    pub min_correction_time_ms: u32,
    pub max_stat_reporting_period_s: u32,
    pub min_stat_reporting_period_s: u32,
}

pub struct TriggerAttributes {
    pub trigger_type: TriggerType,
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
}

/// Builds and maintains the object/RPC tree over any [`Transport`].
pub struct ObjectTree {
    transport: Box<dyn Transport>,
    root: ObjectPath,
}

impl ObjectTree {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport, root: ObjectPath::new("/xyz/openbmc_project/NodeManager") }
    }

    pub fn root_path(&self) -> &ObjectPath {
        &self.root
    }

    pub fn domain_path(&self, domain_id: DomainId) -> ObjectPath {
        self.root.child("Domain").child(domain_id.name())
    }

    pub fn policy_path(&self, domain_id: DomainId, policy_id: &str) -> ObjectPath {
        self.domain_path(domain_id).child("Policy").child(policy_id)
    }

    pub fn trigger_path(&self, trigger_type: TriggerType) -> ObjectPath {
        self.root.child("Trigger").child(trigger_type.name())
    }

    /// Publishes the root object: `Version` is a standing const, `Health`
    /// and `MaxNumberOfPolicies` are refreshed each call.
    pub fn publish_root(&mut self, health: u8) {
        let path = self.root.clone();
        self.transport.register_object(&path, &[IFACE_ROOT]);
        self.transport.set_property(&path, IFACE_ROOT, "Version", PropertyValue::Str(VERSION.to_string()));
        self.transport.set_property(&path, IFACE_ROOT, "Health", PropertyValue::U8(health));
        self.transport.set_property(
            &path,
            IFACE_ROOT,
            "MaxNumberOfPolicies",
            PropertyValue::U8(MAX_NUMBER_OF_POLICIES),
        );
    }

    pub fn publish_domain(&mut self, attrs: &DomainAttributes, capabilities: &CapabilitiesSnapshot, enabled: bool) {
        let path = self.domain_path(attrs.domain_id);
        self.transport.register_object(
            &path,
            &[IFACE_CAPABILITIES, IFACE_DOMAIN_ATTRIBUTES, IFACE_POLICY_MANAGER, IFACE_STATISTICS, IFACE_ENABLE],
        );

        self.transport.set_property(&path, IFACE_CAPABILITIES, "Max", PropertyValue::F64(capabilities.max));
        self.transport.set_property(&path, IFACE_CAPABILITIES, "Min", PropertyValue::F64(capabilities.min));
        self.transport.set_property(
            &path,
            IFACE_CAPABILITIES,
            "MaxCorrectionTimeInMs",
            PropertyValue::U32(capabilities.max_correction_time_ms),
        );
        self.transport.set_property(
            &path,
            IFACE_CAPABILITIES,
            "MinCorrectionTimeInMs",
            PropertyValue::U32(capabilities.min_correction_time_ms),
        );
        self.transport.set_property(
            &path,
            IFACE_CAPABILITIES,
            "MaxStatisticsReportingPeriod",
            PropertyValue::U32(capabilities.max_stat_reporting_period_s),
        );
        self.transport.set_property(
            &path,
            IFACE_CAPABILITIES,
            "MinStatisticsReportingPeriod",
            PropertyValue::U32(capabilities.min_stat_reporting_period_s),
        );

        self.transport.set_property(
            &path,
            IFACE_DOMAIN_ATTRIBUTES,
            "DomainId",
            PropertyValue::Str(attrs.domain_id.name().to_string()),
        );
        self.transport.set_property(
            &path,
            IFACE_DOMAIN_ATTRIBUTES,
            "AvailableTriggers",
            PropertyValue::StringList(attrs.available_triggers.clone()),
        );
        self.transport.set_property(
            &path,
            IFACE_DOMAIN_ATTRIBUTES,
            "LimitBiasAbsolute",
            PropertyValue::F64(attrs.limit_bias_absolute),
        );
        self.transport.set_property(
            &path,
            IFACE_DOMAIN_ATTRIBUTES,
            "LimitBiasRelative",
            PropertyValue::F64(attrs.limit_bias_relative),
        );
        self.transport.set_property(
            &path,
            IFACE_DOMAIN_ATTRIBUTES,
            "AvailableComponents",
            PropertyValue::U8List(attrs.available_components.clone()),
        );

        self.transport.set_property(&path, IFACE_ENABLE, "Enabled", PropertyValue::Bool(enabled));
    }

    /// Publishes `GetSelectedPolicyId`/`GetSelectedPolicies` results
    /// computed by `DomainInfo` at call time, since they change every tick.
    pub fn publish_selected_policies(&mut self, domain_id: DomainId, selected: &[String]) {
        let path = self.domain_path(domain_id);
        let paths: Vec<ObjectPath> = selected.iter().map(|id| self.policy_path(domain_id, id)).collect();
        self.transport.set_property(
            &path,
            IFACE_POLICY_MANAGER,
            "GetSelectedPolicyId",
            paths.first().cloned().map(PropertyValue::Path).unwrap_or(PropertyValue::Str(String::new())),
        );
        self.transport.set_property(
            &path,
            IFACE_POLICY_MANAGER,
            "GetSelectedPolicies",
            PropertyValue::PathList(paths),
        );
    }

    /// `PolicyAttributes` mirrors every `PolicyParams` field plus the
    /// identity/state fields the source adds on top: `Id`, `DomainId`,
    /// `ComponentId`, `PolicyState`, `PolicyType`, `Owner`.
    pub fn publish_policy(&mut self, policy: &Policy) {
        let path = self.policy_path(policy.domain_id(), policy.id());
        let mut interfaces = vec![IFACE_POLICY_ATTRIBUTES, IFACE_ENABLE];
        if policy.allows_delete() {
            interfaces.push(IFACE_DELETE);
        }
        self.transport.register_object(&path, &interfaces);

        let params = policy.params();
        self.transport.set_property(&path, IFACE_POLICY_ATTRIBUTES, "Id", PropertyValue::Str(policy.id().to_string()));
        self.transport.set_property(
            &path,
            IFACE_POLICY_ATTRIBUTES,
            "DomainId",
            PropertyValue::Str(policy.domain_id().name().to_string()),
        );
        self.transport.set_property(
            &path,
            IFACE_POLICY_ATTRIBUTES,
            "ComponentId",
            PropertyValue::U8(policy.component_id()),
        );
        self.transport.set_property(
            &path,
            IFACE_POLICY_ATTRIBUTES,
            "PolicyState",
            PropertyValue::Str(policy.state().name().to_string()),
        );
        self.transport.set_property(
            &path,
            IFACE_POLICY_ATTRIBUTES,
            "PolicyType",
            PropertyValue::Str(if policy.is_power_policy() { "Power" } else { "Performance" }.to_string()),
        );
        self.transport.set_property(&path, IFACE_POLICY_ATTRIBUTES, "Owner", owner_property(policy.owner()));
        self.transport.set_property(
            &path,
            IFACE_POLICY_ATTRIBUTES,
            "CorrectionInMs",
            PropertyValue::U32(params.correction_in_ms),
        );
        self.transport.set_property(&path, IFACE_POLICY_ATTRIBUTES, "Limit", PropertyValue::F64(params.limit));
        self.transport.set_property(
            &path,
            IFACE_POLICY_ATTRIBUTES,
            "StatReportingPeriod",
            PropertyValue::U32(params.stat_reporting_period),
        );
        self.transport.set_property(
            &path,
            IFACE_POLICY_ATTRIBUTES,
            "TriggerLimit",
            PropertyValue::U16(params.trigger_limit),
        );

        self.transport.set_property(&path, IFACE_ENABLE, "Enabled", PropertyValue::Bool(policy.is_enabled()));
    }

    pub fn unpublish_policy(&mut self, domain_id: DomainId, policy_id: &str) {
        self.transport.remove_object(&self.policy_path(domain_id, policy_id));
    }

    /// `Statistics.GetStatistics()`: flattens each named statistic's value
    /// map onto the domain object as `<name>.<field>` properties — this
    /// transport models properties rather than RPC methods, so the
    /// method-call surface spec §6 names collapses to "publish the latest
    /// snapshot", the same way `publish_selected_policies` stands in for
    /// `GetSelectedPolicies()`.
    pub fn publish_statistics(&mut self, domain_id: DomainId, stats: &HashMap<String, StatValuesMap>) {
        let path = self.domain_path(domain_id);
        for (name, values) in stats {
            for (field, value) in values {
                self.transport.set_property(&path, IFACE_STATISTICS, &format!("{name}.{field}"), stat_property(value));
            }
        }
    }

    pub fn publish_trigger(&mut self, attrs: &TriggerAttributes) {
        let path = self.trigger_path(attrs.trigger_type);
        self.transport.register_object(&path, &[IFACE_TRIGGER]);
        self.transport.set_property(
            &path,
            IFACE_TRIGGER,
            "Name",
            PropertyValue::Str(attrs.trigger_type.name().to_string()),
        );
        self.transport.set_property(&path, IFACE_TRIGGER, "Min", PropertyValue::F64(attrs.min));
        self.transport.set_property(&path, IFACE_TRIGGER, "Max", PropertyValue::F64(attrs.max));
        self.transport.set_property(&path, IFACE_TRIGGER, "Unit", PropertyValue::Str(attrs.unit.to_string()));
    }

    /// Called whenever a policy transitions state, so subscribers watching
    /// `PolicyState`/`Enabled` see the edge rather than polling.
    pub fn notify_policy_changed(&mut self, domain_id: DomainId, policy_id: &str, property: &str) {
        let path = self.policy_path(domain_id, policy_id);
        self.transport.emit_changed(&path, IFACE_POLICY_ATTRIBUTES, property);
    }
}

fn owner_property(owner: PolicyOwner) -> PropertyValue {
    PropertyValue::Str(owner.name().to_string())
}

fn stat_property(value: &StatValue) -> PropertyValue {
    match *value {
        StatValue::Double(v) => PropertyValue::F64(v),
        StatValue::U32(v) => PropertyValue::U32(v),
        StatValue::U64(v) => PropertyValue::F64(v as f64),
        StatValue::Bool(v) => PropertyValue::Bool(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{
        LimitException, Policy, PolicyOwner, PolicyParams, PolicyStorage, PowerCorrectionType, COMPONENT_ID_ALL,
    };
    use crate::transport::LoggingTransport;
    use std::collections::HashMap;

    fn policy() -> Policy {
        Policy::new_power(
            "UserPolicy1".to_string(),
            PolicyOwner::Bmc,
            DomainId::AcTotalPower,
            PolicyParams {
                correction_in_ms: 6_000,
                limit: 270.0,
                stat_reporting_period: 60,
                policy_storage: PolicyStorage::Volatile,
                power_correction_type: PowerCorrectionType::NonAggressive,
                limit_exception: LimitException::NoAction,
                suspend_periods: Vec::new(),
                thresholds: HashMap::new(),
                component_id: COMPONENT_ID_ALL,
                trigger_limit: 0,
                trigger_type: TriggerType::Always,
            },
            true,
            true,
        )
    }

    #[test]
    fn domain_and_policy_paths_nest_under_root() {
        let tree = ObjectTree::new(Box::new(LoggingTransport::new()));
        assert_eq!(tree.domain_path(DomainId::Pcie).as_str(), "/xyz/openbmc_project/NodeManager/Domain/Pcie");
        assert_eq!(
            tree.policy_path(DomainId::Pcie, "P1").as_str(),
            "/xyz/openbmc_project/NodeManager/Domain/Pcie/Policy/P1"
        );
    }

    #[test]
    fn publish_policy_exposes_id_and_owner() {
        let mut tree = ObjectTree::new(Box::new(LoggingTransport::new()));
        let p = policy();
        tree.publish_policy(&p);
        let path = tree.policy_path(DomainId::AcTotalPower, "UserPolicy1");
        assert_eq!(
            tree.transport.get_property(&path, IFACE_POLICY_ATTRIBUTES, "Owner"),
            Some(PropertyValue::Str("bmc".to_string()))
        );
        assert_eq!(
            tree.transport.get_property(&path, IFACE_POLICY_ATTRIBUTES, "Limit"),
            Some(PropertyValue::F64(270.0))
        );
    }

    #[test]
    fn publish_statistics_flattens_each_field_onto_the_domain_object() {
        let mut tree = ObjectTree::new(Box::new(LoggingTransport::new()));
        let mut stats = HashMap::new();
        let mut fields = StatValuesMap::new();
        fields.insert("Current".into(), StatValue::Double(42.0));
        stats.insert("Power".to_string(), fields);

        tree.publish_statistics(DomainId::CpuSubsystem, &stats);
        let path = tree.domain_path(DomainId::CpuSubsystem);
        assert_eq!(
            tree.transport.get_property(&path, IFACE_STATISTICS, "Power.Current"),
            Some(PropertyValue::F64(42.0))
        );
    }

    #[test]
    fn root_carries_the_fixed_version_and_policy_cap() {
        let mut tree = ObjectTree::new(Box::new(LoggingTransport::new()));
        tree.publish_root(0);
        let root = tree.root_path().clone();
        assert_eq!(
            tree.transport.get_property(&root, IFACE_ROOT, "MaxNumberOfPolicies"),
            Some(PropertyValue::U8(MAX_NUMBER_OF_POLICIES))
        );
    }
}

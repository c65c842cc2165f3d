//! Per-domain policy aggregation and limit arbitration (spec §4.5).
//!
//! `DomainId` and `RaplDomainId` are the identity types every other module
//! (`capability`, `budgeting`, `policy`) keys off of; the full `Domain` tick
//! logic (`getTriggeredPoliciesLimits`/`updateLimits`/
//! `deleteNonActiveLimits`/`matchPolicyWithSelectedLimit`) lives alongside
//! them in this module.

pub mod aggregate;
pub mod factory;

pub use aggregate::{BudgetingHandle, Domain, DomainLimits};

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::reading::{DeviceIndex, ReadingType};
use crate::trigger::TriggerType;

/// Every policy source domain (spec §3). Grounded on `domain_types.hpp`'s
/// usage sites in `domain_capabilities.hpp`/`domain_power.hpp` — no single
/// declaring header ships in the retrieval pack, so the variant list is
/// assembled from every `DomainId::` switch arm across the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainId {
    AcTotalPower,
    CpuSubsystem,
    MemorySubsystem,
    HwProtection,
    Pcie,
    DcTotalPower,
    Performance,
}

impl DomainId {
    pub fn name(&self) -> &'static str {
        match self {
            DomainId::AcTotalPower => "AcTotalPower",
            DomainId::CpuSubsystem => "CpuSubsystem",
            DomainId::MemorySubsystem => "MemorySubsystem",
            DomainId::HwProtection => "HwProtection",
            DomainId::Pcie => "Pcie",
            DomainId::DcTotalPower => "DcTotalPower",
            DomainId::Performance => "Performance",
        }
    }

    pub fn parse(name: &str) -> Result<Self, PolicyError> {
        match name {
            "AcTotalPower" => Ok(DomainId::AcTotalPower),
            "CpuSubsystem" => Ok(DomainId::CpuSubsystem),
            "MemorySubsystem" => Ok(DomainId::MemorySubsystem),
            "HwProtection" => Ok(DomainId::HwProtection),
            "Pcie" => Ok(DomainId::Pcie),
            "DcTotalPower" => Ok(DomainId::DcTotalPower),
            "Performance" => Ok(DomainId::Performance),
            _ => Err(PolicyError::InvalidDomainId),
        }
    }
}

/// Hardware RAPL control planes `DomainId` is reduced onto for budgeting
/// (spec §3/§4.6). `AcTotalPower`, `DcTotalPower`, and `HwProtection` all map
/// to `DcTotalPower` — an intentional conflation kept from the source (see
/// DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaplDomainId {
    DcTotalPower,
    CpuSubsystem,
    MemorySubsystem,
    Pcie,
}

impl RaplDomainId {
    pub fn name(&self) -> &'static str {
        match self {
            RaplDomainId::DcTotalPower => "DcTotalPower",
            RaplDomainId::CpuSubsystem => "CpuSubsystem",
            RaplDomainId::MemorySubsystem => "MemorySubsystem",
            RaplDomainId::Pcie => "Pcie",
        }
    }
}

/// `mapPtamDomainToRaplDomain` (`budgeting.hpp`): `Performance` has no RAPL
/// projection, since it never carries a power limit.
pub fn map_ptam_domain_to_rapl_domain(domain_id: DomainId) -> Option<RaplDomainId> {
    match domain_id {
        DomainId::AcTotalPower | DomainId::DcTotalPower | DomainId::HwProtection => {
            Some(RaplDomainId::DcTotalPower)
        }
        DomainId::CpuSubsystem => Some(RaplDomainId::CpuSubsystem),
        DomainId::MemorySubsystem => Some(RaplDomainId::MemorySubsystem),
        DomainId::Pcie => Some(RaplDomainId::Pcie),
        DomainId::Performance => None,
    }
}

/// Immutable-by-reference metadata shared between a Domain and its Policies
/// (spec §3). Grounded on `domain_types.hpp`'s `DomainInfo`.
#[derive(Debug, Clone)]
pub struct DomainInfo {
    pub object_path: String,
    pub controlled_parameter: ReadingType,
    pub domain_id: DomainId,
    pub available_components: Arc<Vec<DeviceIndex>>,
    pub required_reading_unavailable: bool,
    pub triggers: Arc<HashSet<TriggerType>>,
    pub max_component_number: u8,
}

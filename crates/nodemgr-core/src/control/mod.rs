//! Hardware budget application (spec §4.8). Grounded on `budgeting.hpp`'s
//! `ControlIf` usage sites (`setBudget`/`setComponentBudget`/
//! `isDomainLimitActive`/`isComponentLimitActive`) — `control.hpp` itself is
//! not present in the retrieval pack, so the trait surface is read off
//! spec.md §4.8 directly rather than transcribed from source.

pub mod knob;

pub use knob::{InMemoryControl, KnobWriter, LoggingKnobWriter};

use crate::domain::RaplDomainId;
use crate::policy::BudgetingStrategy;

/// A budget value together with the strategy it was submitted under —
/// shared by `budgeting::PowerLimitSelector` (the candidate-arbitration
/// side) and `Control` (the hardware-application side).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    pub value: f64,
    pub strategy: BudgetingStrategy,
}

/// The hardware-facing half of the budgeting pipeline: writes the winning
/// per-RAPL-domain (and, for HwProtection/user overrides, per-component)
/// limit to the platform's RAPL knobs and reports whether a limit is
/// currently installed.
pub trait Control: Send {
    /// `setBudget`: `None` clears the domain-wide limit.
    fn set_budget(&mut self, rapl_domain_id: RaplDomainId, limit: Option<Limit>);
    /// `setComponentBudget`: `None` clears the per-component limit.
    fn set_component_budget(&mut self, rapl_domain_id: RaplDomainId, component_id: u8, limit: Option<Limit>);
    fn is_domain_limit_active(&self, rapl_domain_id: RaplDomainId) -> bool;
    fn is_component_limit_active(&self, rapl_domain_id: RaplDomainId, component_id: u8) -> bool;
}

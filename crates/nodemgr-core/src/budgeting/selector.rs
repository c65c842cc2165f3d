//! Per-RAPL-domain limit arbitration (spec §4.6). Grounded on
//! `budgeting.hpp`'s `limitSelectors`/`compoundLimitSelector` usage — the
//! collaborator's own header (`power_limit_selector.hpp`) is not present in
//! the retrieval pack, so the arbitration rule is read off spec.md directly:
//! "keeps per-DomainId candidate limits and returns the minimum, remembering
//! which source domain won."

use std::collections::HashMap;

use crate::control::Limit;
use crate::domain::DomainId;
use crate::policy::BudgetingStrategy;

/// Tracks every source domain's most recent candidate limit for one RAPL
/// domain (or the compound AC/DC total), and reports the minimum.
#[derive(Default)]
pub struct PowerLimitSelector {
    candidates: HashMap<DomainId, Limit>,
}

impl PowerLimitSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `resetLimit`: clears every candidate, called at the start of each
    /// tick's `propagatePtamLimits` before PTAM limits are re-propagated.
    pub fn reset_limit(&mut self) {
        self.candidates.clear();
    }

    /// `updateLimit`: replaces (or installs) `source`'s candidate.
    pub fn update_limit(&mut self, limit: Limit, source: DomainId) {
        self.candidates.insert(source, limit);
    }

    fn winner(&self) -> Option<(&DomainId, &Limit)> {
        self.candidates
            .iter()
            .min_by(|(_, a), (_, b)| a.value.partial_cmp(&b.value).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// `getLimit`: the lowest candidate across every source domain, or
    /// `None` if nothing has been submitted this tick.
    pub fn get_limit(&self) -> Option<Limit> {
        self.winner().map(|(_, limit)| *limit)
    }

    /// `getSourceDomain`: which domain's candidate is currently winning.
    pub fn get_source_domain(&self) -> Option<DomainId> {
        self.winner().map(|(domain, _)| *domain)
    }

    /// Whether `domain_id` is both the current winner and was submitted
    /// under `strategy`.
    pub fn is_active(&self, domain_id: DomainId, strategy: BudgetingStrategy) -> bool {
        match self.winner() {
            Some((winner, limit)) => *winner == domain_id && limit.strategy == strategy,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_candidate_wins() {
        let mut sel = PowerLimitSelector::new();
        sel.update_limit(
            Limit { value: 200.0, strategy: BudgetingStrategy::NonAggressive },
            DomainId::AcTotalPower,
        );
        sel.update_limit(
            Limit { value: 150.0, strategy: BudgetingStrategy::Aggressive },
            DomainId::HwProtection,
        );
        assert_eq!(sel.get_limit().unwrap().value, 150.0);
        assert_eq!(sel.get_source_domain(), Some(DomainId::HwProtection));
        assert!(sel.is_active(DomainId::HwProtection, BudgetingStrategy::Aggressive));
        assert!(!sel.is_active(DomainId::AcTotalPower, BudgetingStrategy::NonAggressive));
    }

    #[test]
    fn reset_clears_every_candidate() {
        let mut sel = PowerLimitSelector::new();
        sel.update_limit(
            Limit { value: 100.0, strategy: BudgetingStrategy::NonAggressive },
            DomainId::CpuSubsystem,
        );
        sel.reset_limit();
        assert!(sel.get_limit().is_none());
        assert!(sel.get_source_domain().is_none());
    }

    #[test]
    fn same_domain_resubmission_replaces_rather_than_accumulates() {
        let mut sel = PowerLimitSelector::new();
        sel.update_limit(
            Limit { value: 100.0, strategy: BudgetingStrategy::NonAggressive },
            DomainId::CpuSubsystem,
        );
        sel.update_limit(
            Limit { value: 80.0, strategy: BudgetingStrategy::Aggressive },
            DomainId::CpuSubsystem,
        );
        assert_eq!(sel.get_limit().unwrap().value, 80.0);
    }
}

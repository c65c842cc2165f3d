//! On-disk shape of one persisted policy (spec §6's "Policy JSON record").

use serde::{Deserialize, Serialize};

use crate::domain::DomainId;
use crate::policy::{Policy, PolicyId, PolicyOwner, PolicyParams};

/// `{domainId, owner, isEnabled, policyParams}` — `policy_id` itself is not
/// part of the JSON body, it's the file's stem (`<policyId>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRecord {
    #[serde(skip)]
    pub policy_id: PolicyId,
    pub domain_id: DomainId,
    pub owner: PolicyOwner,
    pub is_enabled: bool,
    pub policy_params: PolicyParams,
}

impl PolicyRecord {
    pub fn from_policy(policy: &Policy) -> Self {
        Self {
            policy_id: policy.id().to_string(),
            domain_id: policy.domain_id(),
            owner: policy.owner(),
            is_enabled: policy.is_enabled(),
            policy_params: policy.params().clone(),
        }
    }
}

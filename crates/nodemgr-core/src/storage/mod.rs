//! Persistent policy storage: one JSON file per `policyStorage = persistent`
//! policy (spec §4.4.6/§6). Grounded on the teacher's
//! `storage/manager.rs` — whole-file replace via a `.tmp` sibling plus
//! `rename`, and start-of-day cleanup of abandoned `.tmp` files — adapted
//! from chunked binary snapshots down to one small JSON record per policy.

pub mod record;

pub use record::PolicyRecord;

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::policy::{Policy, PolicyId, PolicyValidationContext};

/// Directory of `<policyId>.json` records. Grounded on the teacher's
/// `StorageManager::new` (create the directory, sweep leftover `.tmp` files)
/// and its tmp-then-rename write helper.
pub struct PolicyStore {
    base_path: PathBuf,
}

impl PolicyStore {
    pub fn new(base_path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        if let Ok(entries) = fs::read_dir(&base_path) {
            for entry in entries.flatten() {
                if entry.path().extension().is_some_and(|ext| ext == "tmp") {
                    let _ = fs::remove_file(entry.path());
                }
            }
        }

        Ok(Self { base_path })
    }

    fn path_for(&self, policy_id: &str) -> PathBuf {
        self.base_path.join(format!("{policy_id}.json"))
    }

    /// Whole-file replace: write to `<id>.json.tmp`, `sync_all`, then
    /// `rename` over the final path. Write failures are the caller's to log
    /// (spec §9: "storage errors on write are logged; the in-memory policy
    /// remains authoritative").
    pub fn save(&self, record: &PolicyRecord) -> std::io::Result<()> {
        let final_path = self.path_for(&record.policy_id);
        let tmp_path = final_path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(record)?;

        {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(&body)?;
            f.sync_all()?;
        }
        fs::rename(tmp_path, final_path)?;
        Ok(())
    }

    /// Idempotent: deleting an already-absent record is not an error.
    pub fn delete(&self, policy_id: &str) -> std::io::Result<()> {
        match fs::remove_file(self.path_for(policy_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Persists `policy` if (and only if) it's `persistent`-storage; deletes
    /// any stored record otherwise, so a volatile↔persistent flip always
    /// reconciles storage (spec §4.4.6).
    pub fn sync(&self, policy: &Policy) -> std::io::Result<()> {
        if policy.params().policy_storage == crate::policy::PolicyStorage::Persistent {
            self.save(&PolicyRecord::from_policy(policy))
        } else {
            self.delete(policy.id())
        }
    }

    /// Every record currently on disk, in no particular order. Files that
    /// fail to parse as JSON at all are deleted outright (spec §6: "unknown
    /// fields cause the file to be deleted"); files that parse but fail
    /// `ctx`'s validation (after the clamp-on-restore pass) are likewise
    /// deleted and skipped, each logged with the reason.
    pub fn load_all(&self, ctx: &PolicyValidationContext) -> std::io::Result<Vec<PolicyRecord>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|ext| ext != "json").unwrap_or(true) {
                continue;
            }
            let policy_id: PolicyId = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };

            let body = match fs::read(&path) {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(policy_id, error = %e, "failed to read policy record, skipping");
                    continue;
                }
            };

            let mut record: PolicyRecord = match serde_json::from_slice(&body) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(policy_id, error = %e, "malformed policy record, deleting");
                    let _ = fs::remove_file(&path);
                    continue;
                }
            };
            record.policy_id = policy_id.clone();

            if let Err(e) = record.policy_params.validate(ctx, true) {
                tracing::warn!(policy_id, error = %e, "policy record failed validation, deleting");
                let _ = fs::remove_file(&path);
                continue;
            }

            out.push(record);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainId;
    use crate::policy::{
        LimitException, PolicyOwner, PolicyParams, PolicyStorage, PowerCorrectionType, COMPONENT_ID_ALL,
    };
    use crate::trigger::TriggerType;
    use std::collections::HashMap;

    fn ctx() -> PolicyValidationContext {
        PolicyValidationContext {
            min_correction_time_ms: 100,
            max_correction_time_ms: 60_000,
            min_reporting_period_s: 1,
            max_reporting_period_s: 3_600,
            max_component_number: 4,
            is_component_available: true,
            trigger_available: true,
            trigger_min: 0,
            trigger_max: 100,
            is_power_policy: true,
            limit_min: 0.0,
            limit_max: 1_000.0,
        }
    }

    fn record(id: &str, correction_in_ms: u32, limit: f64) -> PolicyRecord {
        PolicyRecord {
            policy_id: id.to_string(),
            domain_id: DomainId::CpuSubsystem,
            owner: PolicyOwner::Bmc,
            is_enabled: true,
            policy_params: PolicyParams {
                correction_in_ms,
                limit,
                stat_reporting_period: 60,
                policy_storage: PolicyStorage::Persistent,
                power_correction_type: PowerCorrectionType::NonAggressive,
                limit_exception: LimitException::NoAction,
                suspend_periods: Vec::new(),
                thresholds: HashMap::new(),
                component_id: COMPONENT_ID_ALL,
                trigger_limit: 0,
                trigger_type: TriggerType::Always,
            },
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = PolicyStore::new(dir.path()).unwrap();
        store.save(&record("UserPolicy1", 1_000, 150.0)).unwrap();

        let loaded = store.load_all(&ctx()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].policy_id, "UserPolicy1");
        assert_eq!(loaded[0].policy_params.limit, 150.0);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = PolicyStore::new(dir.path()).unwrap();
        store.delete("NeverExisted").unwrap();
        store.save(&record("Gone", 1_000, 10.0)).unwrap();
        store.delete("Gone").unwrap();
        store.delete("Gone").unwrap();
        assert!(store.load_all(&ctx()).unwrap().is_empty());
    }

    #[test]
    fn out_of_range_correction_time_is_clamped_not_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = PolicyStore::new(dir.path()).unwrap();
        store.save(&record("TooSlow", 999_999, 10.0)).unwrap();

        let loaded = store.load_all(&ctx()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].policy_params.correction_in_ms, 60_000);
    }

    #[test]
    fn out_of_range_limit_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PolicyStore::new(dir.path()).unwrap();
        store.save(&record("BadLimit", 1_000, 50_000.0)).unwrap();

        let loaded = store.load_all(&ctx()).unwrap();
        assert!(loaded.is_empty());
        assert!(!dir.path().join("BadLimit.json").exists());
    }

    #[test]
    fn malformed_json_is_deleted_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = PolicyStore::new(dir.path()).unwrap();
        fs::write(dir.path().join("Broken.json"), b"{not json").unwrap();

        let loaded = store.load_all(&ctx()).unwrap();
        assert!(loaded.is_empty());
        assert!(!dir.path().join("Broken.json").exists());
    }

    #[test]
    fn abandoned_tmp_file_is_swept_on_open() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Leftover.json.tmp"), b"partial").unwrap();
        let _store = PolicyStore::new(dir.path()).unwrap();
        assert!(!dir.path().join("Leftover.json.tmp").exists());
    }
}

//! On-disk configuration (spec §6): `general.conf.json`'s `GeneralPresets`,
//! `Gpio`, `Smart`, and `PowerRange` sections. Grounded on
//! `original_source/config/config.hpp` — no dedicated config crate, plain
//! `serde`/`serde_json` struct deserialization, the way the rest of this
//! crate's JSON records are handled (policy storage, per-policy records).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Per-domain presence/enablement toggles plus the handful of scalar tuning
/// knobs the source keeps alongside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GeneralPresets {
    pub ac_total_power_domain_present: bool,
    pub ac_total_power_domain_enabled: bool,
    pub cpu_subsystem_domain_present: bool,
    pub cpu_subsystem_domain_enabled: bool,
    pub memory_subsystem_domain_present: bool,
    pub memory_subsystem_domain_enabled: bool,
    pub hw_protection_domain_present: bool,
    pub hw_protection_domain_enabled: bool,
    pub pcie_domain_present: bool,
    pub pcie_domain_enabled: bool,
    pub dc_total_power_domain_present: bool,
    pub dc_total_power_domain_enabled: bool,
    pub performance_domain_present: bool,
    pub performance_domain_enabled: bool,
    pub policy_control_enabled: bool,
    pub cpu_performance_optimization: bool,
    pub prochot_assertion_ratio: u8,
    pub nm_initialization_mode: u8,
    pub accelerators_interface: String,
    pub cpu_turbo_ratio_limit: bool,
}

impl Default for GeneralPresets {
    fn default() -> Self {
        Self {
            ac_total_power_domain_present: false,
            ac_total_power_domain_enabled: false,
            cpu_subsystem_domain_present: true,
            cpu_subsystem_domain_enabled: true,
            memory_subsystem_domain_present: true,
            memory_subsystem_domain_enabled: true,
            hw_protection_domain_present: false,
            hw_protection_domain_enabled: false,
            pcie_domain_present: false,
            pcie_domain_enabled: false,
            dc_total_power_domain_present: true,
            dc_total_power_domain_enabled: true,
            performance_domain_present: false,
            performance_domain_enabled: false,
            policy_control_enabled: true,
            cpu_performance_optimization: false,
            prochot_assertion_ratio: 0,
            nm_initialization_mode: 0,
            accelerators_interface: String::new(),
            cpu_turbo_ratio_limit: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GpioConfig {
    pub hw_protection_policy_trigger_gpio: i32,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            hw_protection_policy_trigger_gpio: -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SmartConfig {
    pub psu_polling_interval_ms: u32,
    pub overtemperature_throttling_time_ms: u32,
    pub overcurrent_throttling_time_ms: u32,
    pub undervoltage_throttling_time_ms: u32,
    pub max_undervoltage_time_time_ms: u32,
    pub max_overtemperature_time_ms: u32,
    pub powergood_polling_interval_time_ms: u32,
    pub i2c_addr_max: u32,
    pub i2c_addr_min: u32,
    pub force_smbalert_mask_interval_time_ms: u32,
    pub redundancy_enabled: bool,
    pub smart_enabled: bool,
}

impl Default for SmartConfig {
    fn default() -> Self {
        Self {
            psu_polling_interval_ms: 1000,
            overtemperature_throttling_time_ms: 1000,
            overcurrent_throttling_time_ms: 1000,
            undervoltage_throttling_time_ms: 1000,
            max_undervoltage_time_time_ms: 1000,
            max_overtemperature_time_ms: 1000,
            powergood_polling_interval_time_ms: 1000,
            i2c_addr_max: 0x7f,
            i2c_addr_min: 0x08,
            force_smbalert_mask_interval_time_ms: 60000,
            redundancy_enabled: false,
            smart_enabled: false,
        }
    }
}

/// User-overridden min/max watts per domain; zero means "no override"
/// (`kNoOverwrittenValue`). Read by [`crate::capability::DomainCapabilities`]
/// at construction and written back whenever a user sets a latched bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PowerRange {
    #[serde(rename = "AcMinimumPower")]
    pub ac_min: f64,
    #[serde(rename = "AcMaximumPower")]
    pub ac_max: f64,
    #[serde(rename = "CpuMinimumPower")]
    pub cpu_min: f64,
    #[serde(rename = "CpuMaximumPower")]
    pub cpu_max: f64,
    #[serde(rename = "MemoryMinimumPower")]
    pub memory_min: f64,
    #[serde(rename = "MemoryMaximumPower")]
    pub memory_max: f64,
    #[serde(rename = "PcieMinimumPower")]
    pub pcie_min: f64,
    #[serde(rename = "PcieMaximumPower")]
    pub pcie_max: f64,
    #[serde(rename = "DcMinimumPower")]
    pub dc_min: f64,
    #[serde(rename = "DcMaximumPower")]
    pub dc_max: f64,
}

/// No-overwritten sentinel (spec §4.3; `kNoOverwrittenValue` in the source).
pub const NO_OVERWRITTEN_VALUE: f64 = 0.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(rename = "GeneralPresets")]
    pub general_presets: GeneralPresets,
    #[serde(rename = "Gpio")]
    pub gpio: GpioConfig,
    #[serde(rename = "Smart")]
    pub smart: SmartConfig,
    #[serde(rename = "PowerRange")]
    pub power_range: PowerRange,
}

/// Read/write access to the subset of [`GeneralConfig`] that domain
/// capabilities need (spec §4.3's config-integrated min/max latch).
/// A trait rather than a process-wide singleton (unlike the source's
/// `Config::getInstance()`) so tests can supply an in-memory double.
pub trait PowerRangeStore: Send {
    fn get_power_range(&self) -> PowerRange;
    fn update_power_range(&mut self, range: PowerRange);
}

/// File-backed [`PowerRangeStore`] that persists the whole [`GeneralConfig`]
/// document on every update, mirroring the source's `Config::flush`.
pub struct ConfigFile {
    path: PathBuf,
    config: GeneralConfig,
}

impl ConfigFile {
    /// Loads `path` if it exists, otherwise starts from defaults (the
    /// source's `createCfg` fallback).
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => GeneralConfig::default(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, config })
    }

    pub fn general_presets(&self) -> &GeneralPresets {
        &self.config.general_presets
    }

    pub fn gpio(&self) -> &GpioConfig {
        &self.config.gpio
    }

    pub fn smart(&self) -> &SmartConfig {
        &self.config.smart
    }

    fn flush(&self) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.config)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

impl PowerRangeStore for ConfigFile {
    fn get_power_range(&self) -> PowerRange {
        self.config.power_range
    }

    fn update_power_range(&mut self, range: PowerRange) {
        self.config.power_range = range;
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "failed to persist power range config");
        }
    }
}

/// In-memory [`PowerRangeStore`] for domains/tests that don't need
/// persistence.
#[derive(Debug, Default)]
pub struct MemoryPowerRangeStore {
    pub range: PowerRange,
}

impl PowerRangeStore for MemoryPowerRangeStore {
    fn get_power_range(&self) -> PowerRange {
        self.range
    }

    fn update_power_range(&mut self, range: PowerRange) {
        self.range = range;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let config = GeneralConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: GeneralConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ConfigFile::load(dir.path().join("general.conf.json")).unwrap();
        assert_eq!(*cfg.general_presets(), GeneralPresets::default());
    }

    #[test]
    fn update_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("general.conf.json");
        let mut cfg = ConfigFile::load(&path).unwrap();
        let mut range = PowerRange::default();
        range.cpu_max = 250.0;
        cfg.update_power_range(range);

        let reloaded = ConfigFile::load(&path).unwrap();
        assert_eq!(reloaded.get_power_range().cpu_max, 250.0);
    }
}

//! Edge-detecting evaluators bound to readings (spec §4.2).

pub mod action;
pub mod binary;
pub mod cpu_utilization;
pub mod gpio;
pub mod manager;

pub use action::{Action, ActionIf, TriggerActionType};
pub use binary::ActionBinary;
pub use cpu_utilization::ActionCpuUtilization;
pub use gpio::ActionGpio;
pub use manager::{gpio_line_of, TriggersManager};

use crate::error::PolicyError;
use crate::reading::{ReadingConsumer, ReadingEventKind, ReadingType};

/// The set of reading sources a trigger can be bound to, and the
/// hardcoded "always on" pseudo-trigger (spec §4.2's DMTF policy source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerType {
    Always,
    InletTemperature,
    MissingReadingsTimeout,
    TimeAfterHostReset,
    Gpio,
    CpuUtilization,
    HostReset,
    SmbalertInterrupt,
}

impl TriggerType {
    pub fn name(&self) -> &'static str {
        match self {
            TriggerType::Always => "AlwaysOn",
            TriggerType::InletTemperature => "InletTemperature",
            TriggerType::MissingReadingsTimeout => "MissingReadingsTimeout",
            TriggerType::TimeAfterHostReset => "TimeAfterHostReset",
            TriggerType::Gpio => "GPIO",
            TriggerType::CpuUtilization => "CPUUtilization",
            TriggerType::HostReset => "HostReset",
            TriggerType::SmbalertInterrupt => "SMBAlertInterrupt",
        }
    }

    pub fn to_reading_type(&self) -> Result<ReadingType, PolicyError> {
        match self {
            TriggerType::InletTemperature => Ok(ReadingType::InletTemperature),
            TriggerType::Gpio => Ok(ReadingType::Gpio(0)),
            TriggerType::CpuUtilization => Ok(ReadingType::CpuUtilization),
            TriggerType::HostReset | TriggerType::SmbalertInterrupt => Ok(ReadingType::HostPower),
            TriggerType::Always
            | TriggerType::MissingReadingsTimeout
            | TriggerType::TimeAfterHostReset => Err(PolicyError::UnsupportedPolicyTriggerType),
        }
    }
}

pub type TriggerCallback = Box<dyn FnMut(TriggerActionType) + Send>;

/// Binds one [`ActionIf`] to its owner's callback, and forwards a
/// `missingReading` notification when the bound reading goes unavailable.
pub struct Trigger {
    action: Box<dyn ActionIf>,
    callback: Option<TriggerCallback>,
}

impl Trigger {
    pub fn new(action: Box<dyn ActionIf>, callback: Option<TriggerCallback>) -> Self {
        Self { action, callback }
    }

    pub fn update_value(&mut self, now_ms: i64, new_value: f64) {
        if let Some(action_type) = self.action.update_reading(now_ms, new_value) {
            if let Some(callback) = self.callback.as_mut() {
                callback(action_type);
            }
        }
    }

    pub fn report_missing_reading(&mut self) {
        if let Some(callback) = self.callback.as_mut() {
            callback(TriggerActionType::MissingReading);
        }
    }
}

impl ReadingConsumer for Trigger {
    fn on_event(&mut self, event: ReadingEventKind) {
        if event == ReadingEventKind::Unavailable {
            self.report_missing_reading();
        }
    }
}

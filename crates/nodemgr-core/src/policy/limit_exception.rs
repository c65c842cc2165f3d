//! Limit-exception monitoring and the host/chassis power-off escalation it
//! can trigger (spec §4.4.3). Grounded on `policies/limit_exception_monitor.hpp`
//! and `policies/limit_exception_handler.hpp`.
//!
//! The source drives escalation through a chain of sdbusplus async
//! callbacks and two `boost::asio::steady_timer`s. This crate's control
//! loop is a single tick, not an event loop (spec §9's design note), so
//! [`LimitExceptionHandler`] is a `poll()`-driven state machine instead:
//! each tick hands it the current time and a [`HostPowerControl`]
//! collaborator, and it advances (or resolves) one step.

use super::LimitException;

/// `LimitExceptionMonitor::run()`'s exceedance timer and one-shot action
/// latch. Fed the monitored reading each tick rather than self-registering
/// on the reading bus, mirroring how [`crate::capability::DomainCapabilities`]
/// takes pushed samples instead of owning its own subscription.
pub struct LimitExceptionMonitor {
    timestamp_ms: Option<i64>,
    is_action_called: bool,
    is_action_finished: bool,
}

impl Default for LimitExceptionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl LimitExceptionMonitor {
    pub fn new() -> Self {
        Self {
            timestamp_ms: None,
            is_action_called: false,
            is_action_finished: true,
        }
    }

    /// Clears the exceedance timer and the one-shot latch. Called on
    /// construction, on leaving `selected`, and on any change to `limit`,
    /// `correctionInMs`, or `limitException`.
    pub fn reset(&mut self) {
        self.timestamp_ms = None;
        self.is_action_called = false;
        self.is_action_finished = true;
    }

    /// The in-flight action (if any) has resolved — re-arms the latch so a
    /// future exceedance can fire again.
    pub fn mark_action_finished(&mut self) {
        self.is_action_finished = true;
    }

    /// `limitOffset = max(1.05 * limit, 2.0)`.
    fn limit_offset(limit: u16) -> f64 {
        (1.05 * limit as f64).max(2.0)
    }

    /// Advances the exceedance timer for this tick. Returns `true` exactly
    /// once per continuous exceedance episode — the tick the configured
    /// action should begin.
    pub fn tick(
        &mut self,
        now_ms: i64,
        is_selected: bool,
        monitored_value: f64,
        limit: u16,
        correction_in_ms: u32,
    ) -> bool {
        if !is_selected {
            self.timestamp_ms = None;
            self.is_action_called = false;
            return false;
        }
        if monitored_value.is_nan() {
            return false;
        }

        let offset = Self::limit_offset(limit);
        if self.timestamp_ms.is_none() && monitored_value > offset {
            self.timestamp_ms = Some(now_ms);
        } else if self.timestamp_ms.is_some() && monitored_value <= offset {
            self.timestamp_ms = None;
            self.is_action_called = false;
        }

        let time_exceeded = self
            .timestamp_ms
            .is_some_and(|t| (now_ms - t) as u32 > correction_in_ms);

        if !self.is_action_called && self.is_action_finished && time_exceeded {
            self.is_action_called = true;
            self.is_action_finished = false;
            true
        } else {
            false
        }
    }
}

/// How the escalation sequence concluded (mirrors the source's
/// `boost::system::errc` completion codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    TimedOut,
    NotSupported,
}

/// The host/chassis power-control collaborator the escalation handler
/// drives. A real implementation backs this with the host/chassis state
/// RPC surface named in `LimitExceptionHandleDbusConfig`; tests use an
/// in-memory double.
pub trait HostPowerControl: Send {
    /// Requests the host transition to `Off`. `Ok(false)` means the
    /// platform reports the transition unsupported (dbus `not_supported`);
    /// `Err` is a transient failure worth retrying next tick.
    fn request_host_shutdown(&mut self) -> Result<bool, ()>;
    fn host_power_off(&self) -> bool;
    fn request_chassis_power_down(&mut self) -> Result<bool, ()>;
    fn chassis_power_off(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    SoftShutdown { deadline_ms: i64, requested: bool },
    PowerDown { deadline_ms: i64, requested: bool },
}

/// `LimitExceptionHandler::doAction(powerOff | logEventAndPowerOff, ...)`:
/// soft-shutdown the host, escalating to a chassis power-down on timeout or
/// `not_supported`, each stage capped by its own deadline.
pub struct LimitExceptionHandler {
    phase: Phase,
    soft_shutdown_timeout_ms: i64,
    power_down_timeout_ms: i64,
}

impl LimitExceptionHandler {
    pub fn new(soft_shutdown_timeout_ms: i64, power_down_timeout_ms: i64) -> Self {
        Self {
            phase: Phase::Idle,
            soft_shutdown_timeout_ms,
            power_down_timeout_ms,
        }
    }

    /// `kLimitExceptionDbusConfig`'s defaults: 30s soft-shutdown, 15s
    /// power-down.
    pub fn with_default_timeouts() -> Self {
        Self::new(30_000, 15_000)
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// Starts (or restarts) the escalation sequence at the soft-shutdown
    /// stage.
    pub fn begin(&mut self, now_ms: i64) {
        self.phase = Phase::SoftShutdown {
            deadline_ms: now_ms + self.soft_shutdown_timeout_ms,
            requested: false,
        };
    }

    /// Advances the state machine by one tick. `Some(_)` means the
    /// escalation has resolved (the handler returns to idle); `None` means
    /// it's still in flight and `poll` should be called again next tick.
    ///
    /// Bounded to a handful of iterations per call so an immediate
    /// `not_supported` on the soft-shutdown stage can fall through to the
    /// chassis stage within the same tick, without looping unboundedly.
    pub fn poll(&mut self, now_ms: i64, control: &mut dyn HostPowerControl) -> Option<ActionOutcome> {
        for _ in 0..4 {
            match self.phase {
                Phase::Idle => return None,
                Phase::SoftShutdown {
                    deadline_ms,
                    requested,
                } => {
                    if !requested {
                        match control.request_host_shutdown() {
                            Ok(true) => {
                                self.phase = Phase::SoftShutdown {
                                    deadline_ms,
                                    requested: true,
                                };
                                continue;
                            }
                            Ok(false) => {
                                self.phase = Phase::PowerDown {
                                    deadline_ms: now_ms + self.power_down_timeout_ms,
                                    requested: false,
                                };
                                continue;
                            }
                            Err(()) => {
                                if now_ms >= deadline_ms {
                                    self.phase = Phase::PowerDown {
                                        deadline_ms: now_ms + self.power_down_timeout_ms,
                                        requested: false,
                                    };
                                    continue;
                                }
                                return None;
                            }
                        }
                    }
                    if control.host_power_off() {
                        self.phase = Phase::Idle;
                        return Some(ActionOutcome::Success);
                    }
                    if now_ms >= deadline_ms {
                        self.phase = Phase::PowerDown {
                            deadline_ms: now_ms + self.power_down_timeout_ms,
                            requested: false,
                        };
                        continue;
                    }
                    return None;
                }
                Phase::PowerDown {
                    deadline_ms,
                    requested,
                } => {
                    if !requested {
                        match control.request_chassis_power_down() {
                            Ok(true) => {
                                self.phase = Phase::PowerDown {
                                    deadline_ms,
                                    requested: true,
                                };
                                continue;
                            }
                            Ok(false) => {
                                self.phase = Phase::Idle;
                                return Some(ActionOutcome::NotSupported);
                            }
                            Err(()) => {
                                if now_ms >= deadline_ms {
                                    self.phase = Phase::Idle;
                                    return Some(ActionOutcome::TimedOut);
                                }
                                return None;
                            }
                        }
                    }
                    if control.chassis_power_off() {
                        self.phase = Phase::Idle;
                        return Some(ActionOutcome::Success);
                    }
                    if now_ms >= deadline_ms {
                        self.phase = Phase::Idle;
                        return Some(ActionOutcome::TimedOut);
                    }
                    return None;
                }
            }
        }
        None
    }
}

/// `LimitExceptionHandlerIf::doAction` dispatch: `logEvent`/
/// `logEventAndPowerOff` log unconditionally (the caller is expected to do
/// the actual logging, since this module has no logging side channel of
/// its own beyond `tracing`); only `powerOff`/`logEventAndPowerOff` start
/// the escalation sequence.
pub fn action_starts_power_off(action: LimitException) -> bool {
    matches!(
        action,
        LimitException::PowerOff | LimitException::LogEventAndPowerOff
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockControl {
        host_shutdown_result: Result<bool, ()>,
        host_off_after_ticks: Option<u32>,
        chassis_power_down_result: Result<bool, ()>,
        chassis_off_after_ticks: Option<u32>,
        ticks: u32,
    }

    impl MockControl {
        fn immediate_success() -> Self {
            Self {
                host_shutdown_result: Ok(true),
                host_off_after_ticks: Some(0),
                chassis_power_down_result: Ok(true),
                chassis_off_after_ticks: Some(0),
                ticks: 0,
            }
        }
    }

    impl HostPowerControl for MockControl {
        fn request_host_shutdown(&mut self) -> Result<bool, ()> {
            self.host_shutdown_result
        }
        fn host_power_off(&self) -> bool {
            self.host_off_after_ticks == Some(self.ticks)
        }
        fn request_chassis_power_down(&mut self) -> Result<bool, ()> {
            self.chassis_power_down_result
        }
        fn chassis_power_off(&self) -> bool {
            self.chassis_off_after_ticks == Some(self.ticks)
        }
    }

    #[test]
    fn monitor_fires_once_after_correction_window() {
        let mut monitor = LimitExceptionMonitor::new();
        assert!(!monitor.tick(0, true, 250.0, 100, 1000));
        assert!(!monitor.tick(500, true, 250.0, 100, 1000));
        assert!(monitor.tick(1100, true, 250.0, 100, 1000));
        // Still exceeding, but the latch holds until marked finished.
        assert!(!monitor.tick(1200, true, 250.0, 100, 1000));
    }

    #[test]
    fn monitor_resets_when_condition_clears() {
        let mut monitor = LimitExceptionMonitor::new();
        monitor.tick(0, true, 250.0, 100, 1000);
        assert!(!monitor.tick(500, true, 10.0, 100, 1000));
        assert!(!monitor.tick(1600, true, 250.0, 100, 1000));
    }

    #[test]
    fn monitor_resets_when_leaving_selected() {
        let mut monitor = LimitExceptionMonitor::new();
        monitor.tick(0, true, 250.0, 100, 1000);
        monitor.tick(0, false, 250.0, 100, 1000);
        assert!(!monitor.tick(1100, true, 250.0, 100, 1000));
        assert!(monitor.tick(2200, true, 250.0, 100, 1000));
    }

    #[test]
    fn monitor_rearms_after_action_finishes() {
        let mut monitor = LimitExceptionMonitor::new();
        assert!(monitor.tick(1100, true, 250.0, 100, 1000));
        assert!(!monitor.tick(1200, true, 250.0, 100, 1000));
        monitor.mark_action_finished();
        monitor.tick(1200, true, 10.0, 100, 1000);
        assert!(monitor.tick(3300, true, 250.0, 100, 1000));
    }

    #[test]
    fn handler_succeeds_on_soft_shutdown() {
        let mut control = MockControl::immediate_success();
        let mut handler = LimitExceptionHandler::new(30_000, 15_000);
        handler.begin(0);
        assert_eq!(handler.poll(0, &mut control), Some(ActionOutcome::Success));
        assert!(!handler.is_active());
    }

    #[test]
    fn handler_escalates_on_not_supported() {
        let mut control = MockControl::immediate_success();
        control.host_shutdown_result = Ok(false);
        let mut handler = LimitExceptionHandler::new(30_000, 15_000);
        handler.begin(0);
        assert_eq!(handler.poll(0, &mut control), Some(ActionOutcome::Success));
    }

    #[test]
    fn handler_reports_not_supported_when_chassis_also_refuses() {
        let mut control = MockControl::immediate_success();
        control.host_shutdown_result = Ok(false);
        control.chassis_power_down_result = Ok(false);
        let mut handler = LimitExceptionHandler::new(30_000, 15_000);
        handler.begin(0);
        assert_eq!(
            handler.poll(0, &mut control),
            Some(ActionOutcome::NotSupported)
        );
    }

    #[test]
    fn handler_times_out_soft_shutdown_then_escalates() {
        let mut control = MockControl::immediate_success();
        control.host_off_after_ticks = None;
        let mut handler = LimitExceptionHandler::new(30_000, 15_000);
        handler.begin(0);
        assert_eq!(handler.poll(1_000, &mut control), None);
        assert_eq!(handler.poll(30_000, &mut control), Some(ActionOutcome::Success));
    }

    #[test]
    fn handler_times_out_entirely() {
        let mut control = MockControl::immediate_success();
        control.host_off_after_ticks = None;
        control.chassis_off_after_ticks = None;
        let mut handler = LimitExceptionHandler::new(30_000, 15_000);
        handler.begin(0);
        handler.poll(30_000, &mut control);
        assert_eq!(
            handler.poll(45_000, &mut control),
            Some(ActionOutcome::TimedOut)
        );
    }
}

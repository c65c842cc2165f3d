//! Policy state machine: a pure transition function plus the inputs that
//! drive it (spec §4.4.1). Grounded on `policies/policy_state.hpp` — each
//! match arm below reproduces one `PolicyState*::on*` override (or, where a
//! state doesn't override a given input, the `PolicyStateBase` default it
//! inherits).
//!
//! Side effects the source ties to state *entry* (install/uninstall the
//! trigger, start/stop the throttling log) are deliberately not encoded
//! here — `next` only answers "what state comes next, if any". The caller
//! (`Policy::apply`) diffs old vs. new state and drives those effects.

use crate::trigger::TriggerActionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyStateKind {
    Disabled,
    Pending,
    Ready,
    Triggered,
    Selected,
    Suspended,
}

impl PolicyStateKind {
    pub fn name(&self) -> &'static str {
        match self {
            PolicyStateKind::Disabled => "DISABLED",
            PolicyStateKind::Pending => "PENDING",
            PolicyStateKind::Ready => "READY",
            PolicyStateKind::Triggered => "TRIGGERED",
            PolicyStateKind::Selected => "SELECTED",
            PolicyStateKind::Suspended => "SUSPENDED",
        }
    }
}

/// The five named inputs `PolicyStateIf` exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyInput {
    ParametersValidation(bool),
    Enabled(bool),
    ParentEnabled(bool),
    TriggerAction(TriggerActionType),
    LimitSelection(bool),
}

/// `PolicyStateBase`'s default handling of `onParametersValidation`: suspend
/// on invalid, otherwise no change. Reused by every state that doesn't
/// override it.
fn base_on_parameters_validation(is_valid: bool) -> Option<PolicyStateKind> {
    (!is_valid).then_some(PolicyStateKind::Suspended)
}

/// `PolicyStateBase`'s default `onEnabled`: disable on `false`, otherwise no
/// change.
fn base_on_enabled(is_enabled: bool) -> Option<PolicyStateKind> {
    (!is_enabled).then_some(PolicyStateKind::Disabled)
}

/// `next(state, input)` — `None` means the input doesn't move this state
/// (`doNotChangeState()` in the source).
pub fn next(state: PolicyStateKind, input: PolicyInput) -> Option<PolicyStateKind> {
    use PolicyInput::*;
    use PolicyStateKind::*;

    match state {
        // PolicyStateSuspended: overrides onParametersValidation only.
        Suspended => match input {
            ParametersValidation(is_valid) => is_valid.then_some(Pending),
            Enabled(is_enabled) => base_on_enabled(is_enabled),
            ParentEnabled(_) | TriggerAction(_) | LimitSelection(_) => None,
        },

        // PolicyStateDisabled: unconditionally swallows
        // onParametersValidation (never suspends from here), and overrides
        // onEnabled to move forward only on `true`.
        Disabled => match input {
            ParametersValidation(_) => None,
            Enabled(is_enabled) => is_enabled.then_some(Pending),
            ParentEnabled(_) | TriggerAction(_) | LimitSelection(_) => None,
        },

        // PolicyStatePending: overrides onParentEnabled only.
        Pending => match input {
            ParametersValidation(is_valid) => base_on_parameters_validation(is_valid),
            Enabled(is_enabled) => base_on_enabled(is_enabled),
            ParentEnabled(is_parent_enabled) => is_parent_enabled.then_some(Ready),
            TriggerAction(_) | LimitSelection(_) => None,
        },

        // PolicyStateReady: overrides onParentEnabled and onTriggerAction.
        Ready => match input {
            ParametersValidation(is_valid) => base_on_parameters_validation(is_valid),
            Enabled(is_enabled) => base_on_enabled(is_enabled),
            ParentEnabled(is_parent_enabled) => (!is_parent_enabled).then_some(Pending),
            TriggerAction(action) => (action == TriggerActionType::Trigger).then_some(Triggered),
            LimitSelection(_) => None,
        },

        // PolicyStateTriggered: overrides onParentEnabled, onTriggerAction,
        // onLimitSelection.
        Triggered => match input {
            ParametersValidation(is_valid) => base_on_parameters_validation(is_valid),
            Enabled(is_enabled) => base_on_enabled(is_enabled),
            ParentEnabled(is_parent_enabled) => (!is_parent_enabled).then_some(Pending),
            TriggerAction(action) => {
                (action == TriggerActionType::Deactivate).then_some(Ready)
            }
            LimitSelection(is_selected) => is_selected.then_some(Selected),
        },

        // PolicyStateSelected: overrides onParentEnabled, onTriggerAction,
        // onLimitSelection.
        Selected => match input {
            ParametersValidation(is_valid) => base_on_parameters_validation(is_valid),
            Enabled(is_enabled) => base_on_enabled(is_enabled),
            ParentEnabled(is_parent_enabled) => (!is_parent_enabled).then_some(Pending),
            TriggerAction(action) => {
                (action == TriggerActionType::Deactivate).then_some(Ready)
            }
            LimitSelection(is_selected) => (!is_selected).then_some(Triggered),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PolicyInput::*;
    use PolicyStateKind::*;

    #[test]
    fn disabled_ignores_parameters_validation() {
        assert_eq!(next(Disabled, ParametersValidation(false)), None);
        assert_eq!(next(Disabled, ParametersValidation(true)), None);
    }

    #[test]
    fn disabled_enables_into_pending() {
        assert_eq!(next(Disabled, Enabled(true)), Some(Pending));
        assert_eq!(next(Disabled, Enabled(false)), None);
    }

    #[test]
    fn suspended_returns_to_pending_when_valid() {
        assert_eq!(next(Suspended, ParametersValidation(true)), Some(Pending));
        assert_eq!(next(Suspended, ParametersValidation(false)), None);
    }

    #[test]
    fn any_state_but_disabled_suspends_on_invalid_parameters() {
        for s in [Pending, Ready, Triggered, Selected] {
            assert_eq!(next(s, ParametersValidation(false)), Some(Suspended));
        }
    }

    #[test]
    fn pending_to_ready_on_parent_enabled() {
        assert_eq!(next(Pending, ParentEnabled(true)), Some(Ready));
        assert_eq!(next(Pending, ParentEnabled(false)), None);
    }

    #[test]
    fn ready_triggers_into_triggered() {
        assert_eq!(
            next(Ready, TriggerAction(TriggerActionType::Trigger)),
            Some(Triggered)
        );
        assert_eq!(
            next(Ready, TriggerAction(TriggerActionType::Deactivate)),
            None
        );
    }

    #[test]
    fn triggered_round_trips_with_ready_and_selected() {
        assert_eq!(
            next(Triggered, TriggerAction(TriggerActionType::Deactivate)),
            Some(Ready)
        );
        assert_eq!(next(Triggered, LimitSelection(true)), Some(Selected));
    }

    #[test]
    fn selected_drops_back_to_triggered_or_ready() {
        assert_eq!(next(Selected, LimitSelection(false)), Some(Triggered));
        assert_eq!(
            next(Selected, TriggerAction(TriggerActionType::Deactivate)),
            Some(Ready)
        );
    }

    #[test]
    fn parent_disabled_drops_triggered_and_selected_to_pending() {
        assert_eq!(next(Triggered, ParentEnabled(false)), Some(Pending));
        assert_eq!(next(Selected, ParentEnabled(false)), Some(Pending));
    }
}

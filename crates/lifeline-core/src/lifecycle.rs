use crate::CoreError;
use lifeline_schema::{
    is_config_update_allowed, is_valid_desired_state_transition, is_valid_state_transition, State,
};

/// Gate for assigning `target` directly to an entity currently in `current`,
/// bypassing the event machine.
pub fn validate_transition(current: State, target: State) -> Result<(), CoreError> {
    if is_valid_state_transition(target, current) {
        Ok(())
    } else {
        Err(CoreError::IllegalStateChange {
            from: current,
            to: target,
        })
    }
}

/// Gate for changing the desired state to `desired` while in `current`.
pub fn validate_desired_transition(current: State, desired: State) -> Result<(), CoreError> {
    if is_valid_desired_state_transition(desired, current) {
        Ok(())
    } else {
        Err(CoreError::IllegalStateChange {
            from: current,
            to: desired,
        })
    }
}

/// Whether configuration may be updated toward a desired state.
///
/// Implemented at every level of the cluster tree; a level succeeds only if
/// it and all of its children do, so a rejected update fails before anything
/// is mutated.
pub trait ConfigUpdateCheck {
    /// Human-readable name of the checked object, used in errors.
    fn config_target(&self) -> String;

    fn check_update_configuration(&self, desired: State) -> Result<(), CoreError>;
}

pub(crate) fn check_config_update(
    target: &impl ConfigUpdateCheck,
    desired: State,
) -> Result<(), CoreError> {
    if is_config_update_allowed(desired) {
        Ok(())
    } else {
        Err(CoreError::UnsupportedConfigUpdate {
            target: target.config_target(),
            state: desired,
        })
    }
}

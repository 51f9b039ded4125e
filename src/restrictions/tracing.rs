//! Counter-triggered restrictions with hysteresis.
use crate::catalog::TracingPolicy;
use crate::restrictions::{RestrictionLog, RestrictionStatus};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TracingState {
    /// Set once the policy has been switched off for good.
    pub exhausted: bool,
}

/// The status of `policy` after observing `value` at `time`, given its logged history.
///
/// A disabled policy enables once the value reaches the start level. An enabled policy disables
/// when the value crosses the stop level (downwards when the stop level is below the start level,
/// upwards otherwise) or when `stop_after` has elapsed since it was enabled. Only a downward stop
/// lets the policy enable again.
pub fn next_status(
    policy: &TracingPolicy,
    state: &mut TracingState,
    value: f64,
    time: f64,
    log: &RestrictionLog,
) -> RestrictionStatus {
    let enabled = log
        .latest(&policy.name)
        .is_some_and(|row| row.status == RestrictionStatus::Enabled);

    if !enabled {
        return if !state.exhausted && value >= policy.start_level {
            RestrictionStatus::Enabled
        } else {
            RestrictionStatus::Disabled
        };
    }

    if let Some(stop_level) = policy.stop_level {
        if stop_level < policy.start_level {
            if value <= stop_level {
                return RestrictionStatus::Disabled;
            }
        } else if value >= stop_level {
            state.exhausted = true;
            return RestrictionStatus::Disabled;
        }
    }
    if let (Some(stop_after), Some(since)) = (policy.stop_after, log.enabled_since(&policy.name)) {
        if time - since >= stop_after {
            state.exhausted = true;
            return RestrictionStatus::Disabled;
        }
    }
    RestrictionStatus::Enabled
}

//! Alternating restricted and unrestricted phases of one mobility group.
use crate::catalog::CyclicGroup;
use crate::distribution::Distribution;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CyclicPhase {
    pub restricted: bool,
    /// When the phase switches. Infinite for a phase that never ends.
    pub ends_at: f64,
}

impl CyclicPhase {
    /// The first phase of `group`, starting at `time`.
    #[must_use]
    pub fn start(group: &CyclicGroup, time: f64, dt: f64) -> Self {
        let restricted = group.start_restricted;
        CyclicPhase {
            restricted,
            ends_at: time + phase_length(group, restricted, dt),
        }
    }

    /// Switches to the other phase once `time` reaches the end of the current one. Returns
    /// whether it switched.
    pub fn advance(&mut self, group: &CyclicGroup, time: f64, dt: f64) -> bool {
        if time < self.ends_at {
            return false;
        }
        self.restricted = !self.restricted;
        self.ends_at = time + phase_length(group, self.restricted, dt);
        true
    }
}

/// Draws a phase length. A missing or non-finite length never ends; a zero length lasts one step.
fn phase_length(group: &CyclicGroup, restricted: bool, dt: f64) -> f64 {
    let distribution: &Distribution = if restricted {
        &group.restricted
    } else {
        &group.unrestricted
    };
    if distribution.is_none() {
        return f64::INFINITY;
    }
    let length = distribution.sample_positive_one();
    if !length.is_finite() {
        f64::INFINITY
    } else if length <= 0.0 {
        dt
    } else {
        length
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::GroupId;

    fn group(restricted: Distribution, unrestricted: Distribution) -> CyclicGroup {
        CyclicGroup {
            name: "workers".to_string(),
            mobility_group: GroupId::default(),
            restricted,
            unrestricted,
            start_restricted: false,
        }
    }

    #[test]
    fn alternates_with_drawn_lengths() {
        let group = group(Distribution::constant(1.0), Distribution::constant(2.0));
        let mut phase = CyclicPhase::start(&group, 5.0, 0.5);
        assert_eq!(
            phase,
            CyclicPhase {
                restricted: false,
                ends_at: 7.0
            }
        );
        assert!(!phase.advance(&group, 6.0, 0.5));
        assert!(phase.advance(&group, 7.0, 0.5));
        assert!(phase.restricted);
        assert_eq!(phase.ends_at, 8.0);
    }

    #[test]
    fn zero_length_lasts_one_step_and_none_lasts_forever() {
        let group = group(Distribution::none(), Distribution::constant(0.0));
        let mut phase = CyclicPhase::start(&group, 0.0, 0.5);
        assert_eq!(phase.ends_at, 0.5);
        assert!(phase.advance(&group, 0.5, 0.5));
        assert!(phase.restricted);
        assert_eq!(phase.ends_at, f64::INFINITY);
        assert!(!phase.advance(&group, 1e9, 0.5));
    }
}

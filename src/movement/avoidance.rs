//! Steering away from threats.
//!
//! An agent that can be infected turns toward the middle of the widest angular gap between the
//! bearings of the threats around it. Only the heading changes; the speed is kept.
use std::collections::BTreeMap;
use std::f64::consts::TAU;

use crate::catalog::Catalogs;
use crate::error::EpiError;
use crate::movement::{angle, replace_velocity, standardize_angle};
use crate::population::{AgentId, Population};

/// An agent that should steer away from a threat.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AvoidancePair {
    pub agent: AgentId,
    pub threat: AgentId,
}

/// The midpoint of the widest gap between the bearings, in `[0, 2π)`. The gap from the largest
/// bearing wraps around to the smallest. Among equally wide gaps the first in ascending order
/// wins. Returns `None` when there are no bearings.
#[must_use]
pub fn deviation_angle(bearings: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = bearings.iter().copied().map(standardize_angle).collect();
    sorted.sort_by(f64::total_cmp);
    let (first, last) = (*sorted.first()?, *sorted.last()?);

    let mut best_start = last;
    let mut best_gap = first + TAU - last;
    let mut wrap_is_best = true;
    for pair in sorted.windows(2) {
        let gap = pair[1] - pair[0];
        if gap > best_gap || (wrap_is_best && gap >= best_gap) {
            best_gap = gap;
            best_start = pair[0];
            wrap_is_best = false;
        }
    }
    Some(standardize_angle(best_start + best_gap / 2.0))
}

/// Pairs every active agent in a state that can be infected with each neighbor whose state has an
/// avoidance radius the agent is inside of.
#[must_use]
pub fn avoidance_pairs(population: &Population, catalogs: &Catalogs) -> Vec<AvoidancePair> {
    let mut pairs = Vec::new();
    for row in 0..population.len() {
        if !population.is_active(row)
            || !catalogs
                .disease
                .get(population.disease_state[row])
                .can_get_infected
        {
            continue;
        }
        for neighbor in &population.neighbors[row].total {
            let state = catalogs.disease.get(population.disease_state[neighbor.row]);
            if let Some(radius) = state.avoidance_radius {
                if neighbor.distance_squared <= radius * radius {
                    pairs.push(AvoidancePair {
                        agent: population.agent[row],
                        threat: neighbor.agent,
                    });
                }
            }
        }
    }
    pairs
}

/// Turns each agent of `pairs` away from its threats. Returns the number of agents turned.
pub fn avoid(population: &mut Population, pairs: &[AvoidancePair]) -> Result<usize, EpiError> {
    // Ordered by row so the result does not depend on the order of `pairs`.
    let mut bearings: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
    for pair in pairs {
        let (Some(row), Some(threat)) = (population.row(pair.agent), population.row(pair.threat))
        else {
            return Err(EpiError::invalid_fields(&["agent"]));
        };
        bearings.entry(row).or_default().push(angle(
            population.x[threat] - population.x[row],
            population.y[threat] - population.y[row],
        ));
    }

    let mut turned = 0;
    for (row, bearings) in bearings {
        if let Some(direction) = deviation_angle(&bearings) {
            replace_velocity(population, row, direction);
            turned += 1;
        }
    }
    Ok(turned)
}

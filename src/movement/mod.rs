//! Agent movement inside a rectangular box.
//!
//! Positions advance by `v·dt`. A coordinate that crosses an edge is placed on the edge and the
//! matching velocity component changes sign, so agents never leave the box. Velocity changes
//! either draw a new speed and heading or only turn the agent, keeping its speed.
mod avoidance;

use std::f64::consts::TAU;

use log::trace;
use rand::Rng;
use rand_distr::{Distribution as _, Normal};
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::catalog::Catalogs;
use crate::distribution::Distribution;
use crate::error::EpiError;
use crate::population::{AgentId, Population};

pub use avoidance::{avoid, avoidance_pairs, deviation_angle, AvoidancePair};

/// The closed rectangle agents move in.
#[derive(Copy, Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BoxBounds {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
}

impl BoxBounds {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.left, self.right, self.bottom, self.top]
            .iter()
            .all(|v| v.is_finite())
            && self.left < self.right
            && self.bottom < self.top
    }

    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.left..=self.right).contains(&x) && (self.bottom..=self.top).contains(&y)
    }
}

fn reflect(position: f64, velocity: f64, low: f64, high: f64) -> (f64, f64) {
    if position > high {
        (high, -velocity)
    } else if position < low {
        (low, -velocity)
    } else {
        (position, velocity)
    }
}

/// Advances one agent by `dt`, reflecting it off the box edges.
#[must_use]
pub fn move_agent(
    position: [f64; 2],
    velocity: [f64; 2],
    dt: f64,
    bounds: &BoxBounds,
) -> ([f64; 2], [f64; 2]) {
    let (x, vx) = reflect(
        position[0] + velocity[0] * dt,
        velocity[0],
        bounds.left,
        bounds.right,
    );
    let (y, vy) = reflect(
        position[1] + velocity[1] * dt,
        velocity[1],
        bounds.bottom,
        bounds.top,
    );
    ([x, y], [vx, vy])
}

/// Moves every active agent. Returns the number of agents moved.
pub fn move_agents(
    population: &mut Population,
    dt: f64,
    bounds: &BoxBounds,
) -> Result<usize, EpiError> {
    population.check_kinematics()?;
    let mut moved = 0;
    for row in 0..population.len() {
        if !population.is_active(row) {
            continue;
        }
        let (position, velocity) = move_agent(
            [population.x[row], population.y[row]],
            [population.vx[row], population.vy[row]],
            dt,
            bounds,
        );
        population.x[row] = position[0];
        population.y[row] = position[1];
        population.vx[row] = velocity[0];
        population.vy[row] = velocity[1];
        moved += 1;
    }
    trace!("moved {moved} agents");
    Ok(moved)
}

/// Sets the velocity of the given agents to zero, leaving their positions alone.
pub fn stop(population: &mut Population, agents: &[AgentId]) -> Result<(), EpiError> {
    for row in population.rows_of(agents)? {
        stop_row(population, row);
    }
    Ok(())
}

pub(crate) fn stop_row(population: &mut Population, row: usize) {
    population.vx[row] = 0.0;
    population.vy[row] = 0.0;
}

/// Sets an agent moving again with a speed and heading drawn from its mobility group. Agents
/// without a group, or whose group has no speed distribution, stay as they are.
pub(crate) fn restart_row(population: &mut Population, row: usize, catalogs: &Catalogs) {
    let Some(id) = population.mobility_group[row] else {
        return;
    };
    let group = catalogs.mobility.get(id);
    if group.speed.is_none() {
        return;
    }
    let speed = group.speed.sample_positive_one();
    let direction = if group.initial_angle.is_none() {
        angle(population.vx[row], population.vy[row])
    } else {
        standardize_angle(group.initial_angle.sample_one())
    };
    population.vx[row] = speed * direction.cos();
    population.vy[row] = speed * direction.sin();
}

/// Maps an angle to `[0, 2π)`. Angles already in range are returned unchanged.
#[must_use]
pub fn standardize_angle(theta: f64) -> f64 {
    if (0.0..TAU).contains(&theta) {
        return theta;
    }
    let standardized = (theta + TAU).rem_euclid(TAU);
    // Rounding can land exactly on 2π for inputs just below a multiple of it.
    if standardized >= TAU {
        0.0
    } else {
        standardized
    }
}

/// The direction of the vector `(x, y)` in `[0, 2π)`.
#[must_use]
pub fn angle(x: f64, y: f64) -> f64 {
    standardize_angle(y.atan2(x))
}

/// Turns an agent to `direction`, keeping its speed.
pub fn replace_velocity(population: &mut Population, row: usize, direction: f64) {
    let speed = population.vx[row].hypot(population.vy[row]);
    population.vx[row] = speed * direction.cos();
    population.vy[row] = speed * direction.sin();
}

/// Where a new heading comes from.
#[derive(Clone, Copy, Debug)]
pub enum AngleSource<'a> {
    /// Drawn from a distribution, used when velocities are initialized.
    Sample(&'a Distribution),
    /// The current heading plus a `Normal(0, variance)` change.
    Perturb { variance: f64 },
}

/// Draws a speed for each row, and a heading from `angle_source`. A *none* speed distribution
/// keeps each agent's current speed.
pub fn set_velocity<R: Rng + ?Sized>(
    population: &mut Population,
    rows: &[usize],
    speed: &Distribution,
    angle_source: AngleSource<'_>,
    rng: &mut R,
) -> Result<(), EpiError> {
    let perturbation = match angle_source {
        AngleSource::Perturb { variance } if variance > 0.0 => Some(
            Normal::new(0.0, variance.sqrt())
                .map_err(|e| EpiError::ConfigurationError(format!("angle variance: {e}")))?,
        ),
        _ => None,
    };
    for &row in rows {
        let current_speed = population.vx[row].hypot(population.vy[row]);
        let norm = if speed.is_none() {
            current_speed
        } else {
            speed.sample_positive_one()
        };
        let direction = match angle_source {
            AngleSource::Sample(distribution) => distribution.sample_one(),
            AngleSource::Perturb { .. } => {
                let current = angle(population.vx[row], population.vy[row]);
                current + perturbation.as_ref().map_or(0.0, |normal| normal.sample(rng))
            }
        };
        let direction = standardize_angle(direction);
        population.vx[row] = norm * direction.cos();
        population.vy[row] = norm * direction.sin();
    }
    Ok(())
}

/// A column agents can be selected by.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum GroupField {
    DiseaseState,
    VulnerabilityGroup,
    MobilityGroup,
    IsolationAdherenceGroup,
    RestrictionAdherenceGroup,
}

/// Selects living agents by explicit id, by group label, by both, or neither (everyone).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgentFilter {
    pub agents: Option<Vec<AgentId>>,
    pub group: Option<(GroupField, String)>,
}

impl AgentFilter {
    #[must_use]
    pub fn all() -> Self {
        AgentFilter::default()
    }

    #[must_use]
    pub fn agents(agents: Vec<AgentId>) -> Self {
        AgentFilter {
            agents: Some(agents),
            group: None,
        }
    }

    #[must_use]
    pub fn group(field: GroupField, label: &str) -> Self {
        AgentFilter {
            agents: None,
            group: Some((field, label.to_string())),
        }
    }

    #[must_use]
    pub fn with_group(mut self, field: GroupField, label: &str) -> Self {
        self.group = Some((field, label.to_string()));
        self
    }

    /// The matching rows. A label unknown to the catalogs matches nobody.
    pub fn select(
        &self,
        population: &Population,
        catalogs: &Catalogs,
    ) -> Result<Vec<usize>, EpiError> {
        let candidates = match &self.agents {
            Some(agents) => population.rows_of(agents)?,
            None => (0..population.len()).collect(),
        };
        let mut rows: Vec<usize> = candidates
            .into_iter()
            .filter(|row| !population.is_dead[*row])
            .collect();

        if let Some((field, label)) = &self.group {
            let matches: Box<dyn Fn(usize) -> bool + '_> = match field {
                GroupField::DiseaseState => match catalogs.disease.id(label) {
                    Some(id) => Box::new(move |row| population.disease_state[row] == id),
                    None => return Ok(Vec::new()),
                },
                GroupField::VulnerabilityGroup => match catalogs.vulnerability.id(label) {
                    Some(id) => Box::new(move |row| population.vulnerability_group[row] == id),
                    None => return Ok(Vec::new()),
                },
                GroupField::MobilityGroup => match catalogs.mobility.id(label) {
                    Some(id) => Box::new(move |row| population.mobility_group[row] == Some(id)),
                    None => return Ok(Vec::new()),
                },
                GroupField::IsolationAdherenceGroup => {
                    match catalogs.isolation_adherence.id(label) {
                        Some(id) => Box::new(move |row| {
                            population.isolation_adherence_group[row] == Some(id)
                        }),
                        None => return Ok(Vec::new()),
                    }
                }
                GroupField::RestrictionAdherenceGroup => {
                    match catalogs.restriction_adherence.id(label) {
                        Some(id) => Box::new(move |row| {
                            population.restriction_adherence_group[row] == Some(id)
                        }),
                        None => return Ok(Vec::new()),
                    }
                }
            };
            rows.retain(|row| matches(*row));
        }
        Ok(rows)
    }
}

/// Gives the selected agents a speed from `speed` and a heading from `initial_angle`. Returns
/// the number of agents updated.
pub fn initialize_velocities<R: Rng + ?Sized>(
    population: &mut Population,
    catalogs: &Catalogs,
    filter: &AgentFilter,
    speed: &Distribution,
    initial_angle: &Distribution,
    rng: &mut R,
) -> Result<usize, EpiError> {
    let rows = filter.select(population, catalogs)?;
    set_velocity(
        population,
        &rows,
        speed,
        AngleSource::Sample(initial_angle),
        rng,
    )?;
    Ok(rows.len())
}

/// Gives the selected agents a new speed from `speed` and turns them by a normally distributed
/// angle. Returns the number of agents updated.
pub fn update_velocities<R: Rng + ?Sized>(
    population: &mut Population,
    catalogs: &Catalogs,
    filter: &AgentFilter,
    speed: &Distribution,
    angle_variance: f64,
    rng: &mut R,
) -> Result<usize, EpiError> {
    population.check_kinematics()?;
    let rows = filter.select(population, catalogs)?;
    set_velocity(
        population,
        &rows,
        speed,
        AngleSource::Perturb {
            variance: angle_variance,
        },
        rng,
    )?;
    Ok(rows.len())
}

/// Runs [`initialize_velocities`] for every mobility group with that group's speed and initial
/// heading distributions.
pub fn initialize_group_velocities<R: Rng + ?Sized>(
    population: &mut Population,
    catalogs: &Catalogs,
    rng: &mut R,
) -> Result<usize, EpiError> {
    let mut updated = 0;
    for id in catalogs.mobility.ids() {
        let group = catalogs.mobility.get(id);
        let filter = AgentFilter::group(GroupField::MobilityGroup, catalogs.mobility.name(id));
        updated += initialize_velocities(
            population,
            catalogs,
            &filter,
            &group.speed,
            &group.initial_angle,
            rng,
        )?;
    }
    Ok(updated)
}

/// Runs [`update_velocities`] for every mobility group with that group's speed distribution and
/// angle variance.
pub fn update_group_velocities<R: Rng + ?Sized>(
    population: &mut Population,
    catalogs: &Catalogs,
    rng: &mut R,
) -> Result<usize, EpiError> {
    let mut updated = 0;
    for id in catalogs.mobility.ids() {
        let group = catalogs.mobility.get(id);
        let filter = AgentFilter::group(GroupField::MobilityGroup, catalogs.mobility.name(id));
        updated += update_velocities(
            population,
            catalogs,
            &filter,
            &group.speed,
            group.angle_variance,
            rng,
        )?;
    }
    Ok(updated)
}

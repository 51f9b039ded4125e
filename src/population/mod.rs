//! The agent population, stored column by column.
//!
//! Each agent is one row of [`Population`], addressed by a stable [`AgentId`]. The engine works
//! on whole columns; per-phase changes are made on a copy and committed only when the phase
//! succeeds.
mod context_ext;
mod frame;

use std::fmt::{self, Display};

use crate::catalog::{Catalogs, DiseaseStateId, GroupCatalog, GroupId};
use crate::error::EpiError;
use crate::spatial::NeighborSets;
use crate::{HashMap, HashMapExt};

pub use context_ext::ContextPopulationExt;
pub use frame::{AgentFrame, Column};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u64);

impl Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Columns an [`AgentFrame`] must provide.
pub const REQUIRED_COLUMNS: [&str; 6] = ["agent", "x", "y", "vx", "vy", "disease_state"];

#[derive(Debug, Clone, Default)]
pub struct Population {
    pub agent: Vec<AgentId>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub vx: Vec<f64>,
    pub vy: Vec<f64>,
    pub disease_state: Vec<DiseaseStateId>,
    pub vulnerability_group: Vec<GroupId>,
    pub mobility_group: Vec<Option<GroupId>>,
    pub isolation_adherence_group: Vec<Option<GroupId>>,
    pub restriction_adherence_group: Vec<Option<GroupId>>,
    pub is_dead: Vec<bool>,
    pub is_diagnosed: Vec<bool>,
    pub is_isolated: Vec<bool>,
    pub is_hospitalized: Vec<bool>,
    pub is_in_icu: Vec<bool>,
    pub disease_state_time: Vec<f64>,
    pub disease_state_max_time: Vec<f64>,
    pub immunization_level: Vec<f64>,
    pub immunization_time: Vec<f64>,
    pub immunization_max_time: Vec<f64>,
    pub immunization_slope: Vec<f64>,
    pub times_infected: Vec<u32>,
    pub isolation_time: Vec<f64>,
    pub isolation_max_time: Vec<f64>,
    pub adheres_to_isolation: Vec<bool>,
    pub adheres_to_restriction: Vec<bool>,
    /// Kept in place by a mobility restriction.
    pub is_confined: Vec<bool>,
    pub transmission_reduction_factor: Vec<f64>,
    /// A residence time must be drawn for the current state.
    pub needs_max_time: Vec<bool>,
    /// Immunization decay must be recomputed after a state change.
    pub needs_immunization_update: Vec<bool>,
    pub neighbors: Vec<NeighborSets>,
    rows: HashMap<AgentId, usize>,
}

impl Population {
    #[must_use]
    pub fn len(&self) -> usize {
        self.agent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agent.is_empty()
    }

    /// The row holding `agent`.
    #[must_use]
    pub fn row(&self, agent: AgentId) -> Option<usize> {
        self.rows.get(&agent).copied()
    }

    /// Resolves a list of agents to rows. Unknown agents are an invalid `agent` field.
    pub fn rows_of(&self, agents: &[AgentId]) -> Result<Vec<usize>, EpiError> {
        agents
            .iter()
            .map(|agent| {
                self.row(*agent)
                    .ok_or_else(|| EpiError::invalid_fields(&["agent"]))
            })
            .collect()
    }

    /// Whether the agent moves this step: alive, not in hospital, not in an isolation it adheres
    /// to and not confined by a mobility restriction.
    #[must_use]
    pub fn is_active(&self, row: usize) -> bool {
        !self.is_dead[row]
            && !self.is_hospitalized[row]
            && !(self.is_isolated[row] && self.adheres_to_isolation[row])
            && !self.is_confined[row]
    }

    /// Fails if a position or velocity is `NaN`, naming the affected columns.
    pub fn check_kinematics(&self) -> Result<(), EpiError> {
        let columns = [
            ("x", &self.x),
            ("y", &self.y),
            ("vx", &self.vx),
            ("vy", &self.vy),
        ];
        let invalid: Vec<&str> = columns
            .iter()
            .filter(|(_, values)| values.iter().any(|v| v.is_nan()))
            .map(|(name, _)| *name)
            .collect();
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(EpiError::invalid_fields(&invalid))
        }
    }

    /// Builds the population from a frame, resolving labels against `catalogs`. Every missing,
    /// null or unresolvable field is reported in one error.
    pub fn from_frame(frame: &AgentFrame, catalogs: &Catalogs) -> Result<Population, EpiError> {
        frame.validate_required(&REQUIRED_COLUMNS)?;
        let n = frame.n_rows();
        let mut reader = ColumnReader {
            frame,
            n,
            invalid: Vec::new(),
        };

        let agent: Vec<AgentId> = reader
            .ints("agent", 0)
            .into_iter()
            .map(|id| AgentId(u64::try_from(id).unwrap_or(u64::MAX)))
            .collect();
        if agent.contains(&AgentId(u64::MAX)) {
            reader.invalid("agent");
        }
        let mut rows = HashMap::with_capacity(n);
        for (row, id) in agent.iter().enumerate() {
            if rows.insert(*id, row).is_some() {
                reader.invalid("agent");
            }
        }

        let x = reader.floats("x", f64::NAN);
        let y = reader.floats("y", f64::NAN);
        let vx = reader.floats("vx", f64::NAN);
        let vy = reader.floats("vy", f64::NAN);

        let disease_state: Vec<DiseaseStateId> = reader
            .labels("disease_state")
            .into_iter()
            .map(|label| {
                label
                    .and_then(|label| catalogs.disease.id(&label))
                    .unwrap_or_else(|| {
                        reader.invalid("disease_state");
                        catalogs.disease.infection_state()
                    })
            })
            .collect();

        let vulnerability_group: Vec<GroupId> = reader
            .groups("vulnerability_group", &catalogs.vulnerability)
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        let mobility_group = reader.groups("mobility_group", &catalogs.mobility);
        let isolation_adherence_group =
            reader.groups("isolation_adherence_group", &catalogs.isolation_adherence);
        let restriction_adherence_group =
            reader.groups("restriction_adherence_group", &catalogs.restriction_adherence);

        let is_dead: Vec<bool> = reader
            .bools("is_dead")
            .into_iter()
            .zip(&disease_state)
            .map(|(dead, state)| dead || catalogs.disease.get(*state).is_dead)
            .collect();
        let disease_state_max_time = reader.floats("disease_state_max_time", f64::NAN);
        let immunization_level = reader.floats("immunization_level", 0.0);
        let immunization_max_time = reader.floats("immunization_max_time", f64::NAN);
        let needs_max_time = disease_state_max_time.iter().map(|t| t.is_nan()).collect();
        let needs_immunization_update = immunization_level
            .iter()
            .zip(&immunization_max_time)
            .map(|(level, max_time)| *level > 0.0 && max_time.is_nan())
            .collect();

        let population = Population {
            is_diagnosed: reader.bools("is_diagnosed"),
            is_isolated: reader.bools("is_isolated"),
            is_hospitalized: reader.bools("is_hospitalized"),
            is_in_icu: reader.bools("is_in_icu"),
            disease_state_time: reader.floats("disease_state_time", 0.0),
            immunization_time: reader.floats("immunization_time", f64::NAN),
            immunization_slope: reader.floats("immunization_slope", f64::NAN),
            times_infected: reader
                .ints("times_infected", 0)
                .into_iter()
                .map(|count| u32::try_from(count).unwrap_or(0))
                .collect(),
            isolation_time: reader.floats("isolation_time", f64::NAN),
            isolation_max_time: reader.floats("isolation_max_time", f64::NAN),
            adheres_to_isolation: reader.bools_or("adheres_to_isolation", true),
            adheres_to_restriction: reader.bools_or("adheres_to_restriction", true),
            is_confined: reader.bools("is_confined"),
            transmission_reduction_factor: reader.floats("transmission_reduction_factor", 1.0),
            neighbors: vec![NeighborSets::default(); n],
            agent,
            x,
            y,
            vx,
            vy,
            disease_state,
            vulnerability_group,
            mobility_group,
            isolation_adherence_group,
            restriction_adherence_group,
            is_dead,
            disease_state_max_time,
            immunization_level,
            immunization_max_time,
            needs_max_time,
            needs_immunization_update,
            rows,
        };

        if reader.invalid.is_empty() {
            Ok(population)
        } else {
            Err(EpiError::invalid_fields(&reader.invalid))
        }
    }

    /// Writes every column, labels included, back to a frame.
    #[must_use]
    pub fn to_frame(&self, catalogs: &Catalogs) -> AgentFrame {
        fn labels<T>(catalog: &GroupCatalog<T>, ids: &[Option<GroupId>]) -> Column {
            Column::Text(
                ids.iter()
                    .map(|id| id.map(|id| catalog.name(id).to_string()))
                    .collect(),
            )
        }
        fn ids(sets: &[NeighborSets], select: impl Fn(&NeighborSets) -> Vec<u64>) -> Column {
            Column::IdList(sets.iter().map(select).collect())
        }
        let bools = |values: &[bool]| Column::from(values.to_vec());
        let floats = |values: &[f64]| Column::from(values.to_vec());

        let mut frame = AgentFrame::new();
        frame.insert(
            "agent",
            Column::Int(
                self.agent
                    .iter()
                    .map(|id| i64::try_from(id.0).ok())
                    .collect(),
            ),
        );
        frame.insert("x", floats(&self.x));
        frame.insert("y", floats(&self.y));
        frame.insert("vx", floats(&self.vx));
        frame.insert("vy", floats(&self.vy));
        frame.insert(
            "disease_state",
            Column::Text(
                self.disease_state
                    .iter()
                    .map(|state| Some(catalogs.disease.get(*state).name.clone()))
                    .collect(),
            ),
        );
        let vulnerability: Vec<Option<GroupId>> =
            self.vulnerability_group.iter().copied().map(Some).collect();
        frame.insert(
            "vulnerability_group",
            labels(&catalogs.vulnerability, &vulnerability),
        );
        frame.insert(
            "mobility_group",
            labels(&catalogs.mobility, &self.mobility_group),
        );
        frame.insert(
            "isolation_adherence_group",
            labels(&catalogs.isolation_adherence, &self.isolation_adherence_group),
        );
        frame.insert(
            "restriction_adherence_group",
            labels(&catalogs.restriction_adherence, &self.restriction_adherence_group),
        );
        frame.insert("is_dead", bools(&self.is_dead));
        frame.insert("is_diagnosed", bools(&self.is_diagnosed));
        frame.insert("is_isolated", bools(&self.is_isolated));
        frame.insert("is_hospitalized", bools(&self.is_hospitalized));
        frame.insert("is_in_icu", bools(&self.is_in_icu));
        frame.insert("disease_state_time", floats(&self.disease_state_time));
        frame.insert("disease_state_max_time", floats(&self.disease_state_max_time));
        frame.insert("immunization_level", floats(&self.immunization_level));
        frame.insert("immunization_time", floats(&self.immunization_time));
        frame.insert("immunization_max_time", floats(&self.immunization_max_time));
        frame.insert("immunization_slope", floats(&self.immunization_slope));
        frame.insert(
            "times_infected",
            Column::Int(
                self.times_infected
                    .iter()
                    .map(|count| Some(i64::from(*count)))
                    .collect(),
            ),
        );
        frame.insert("isolation_time", floats(&self.isolation_time));
        frame.insert("isolation_max_time", floats(&self.isolation_max_time));
        frame.insert("adheres_to_isolation", bools(&self.adheres_to_isolation));
        frame.insert("adheres_to_restriction", bools(&self.adheres_to_restriction));
        frame.insert("is_confined", bools(&self.is_confined));
        frame.insert(
            "transmission_reduction_factor",
            floats(&self.transmission_reduction_factor),
        );
        frame.insert(
            "neighbors_can_be_infected",
            ids(&self.neighbors, |sets| agent_ids(&sets.can_be_infected)),
        );
        frame.insert(
            "neighbors_infectious_spreading",
            ids(&self.neighbors, |sets| agent_ids(&sets.infectious_spreading)),
        );
        frame.insert(
            "neighbors_infectious_non_spreading",
            ids(&self.neighbors, |sets| agent_ids(&sets.infectious_non_spreading)),
        );
        frame.insert(
            "neighbors_immune",
            ids(&self.neighbors, |sets| agent_ids(&sets.immune)),
        );
        frame.insert(
            "neighbors_total",
            ids(&self.neighbors, |sets| agent_ids(&sets.total)),
        );
        frame
    }
}

fn agent_ids(neighbors: &[crate::spatial::Neighbor]) -> Vec<u64> {
    neighbors.iter().map(|neighbor| neighbor.agent.0).collect()
}

/// Reads optional columns with defaults, recording the names of malformed ones.
struct ColumnReader<'a> {
    frame: &'a AgentFrame,
    n: usize,
    invalid: Vec<String>,
}

impl ColumnReader<'_> {
    fn invalid(&mut self, name: &str) {
        if !self.invalid.iter().any(|field| field == name) {
            self.invalid.push(name.to_string());
        }
    }

    fn floats(&mut self, name: &str, default: f64) -> Vec<f64> {
        match self.frame.get(name).map(Column::to_floats) {
            None => vec![default; self.n],
            Some(Some(values)) => values,
            Some(None) => {
                self.invalid(name);
                vec![default; self.n]
            }
        }
    }

    fn ints(&mut self, name: &str, default: i64) -> Vec<i64> {
        match self.frame.get(name) {
            None => vec![default; self.n],
            Some(Column::Int(values)) => values.iter().map(|v| v.unwrap_or(default)).collect(),
            Some(_) => {
                self.invalid(name);
                vec![default; self.n]
            }
        }
    }

    fn bools_or(&mut self, name: &str, default: bool) -> Vec<bool> {
        match self.frame.get(name) {
            None => vec![default; self.n],
            Some(Column::Bool(values)) => values.iter().map(|v| v.unwrap_or(default)).collect(),
            Some(_) => {
                self.invalid(name);
                vec![default; self.n]
            }
        }
    }

    fn bools(&mut self, name: &str) -> Vec<bool> {
        self.bools_or(name, false)
    }

    fn labels(&mut self, name: &str) -> Vec<Option<String>> {
        match self.frame.get(name) {
            None => vec![None; self.n],
            Some(Column::Text(values)) => values.clone(),
            Some(_) => {
                self.invalid(name);
                vec![None; self.n]
            }
        }
    }

    /// Resolves group labels. Null labels, and every label of an absent column, fall back to
    /// the catalog's first group; labels the catalog does not know are invalid.
    fn groups<T>(&mut self, name: &str, catalog: &GroupCatalog<T>) -> Vec<Option<GroupId>> {
        let default = catalog.ids().next();
        let labels = self.labels(name);
        let mut unknown = false;
        let groups = labels
            .into_iter()
            .map(|label| match label {
                None => default,
                Some(label) => {
                    let id = catalog.id(&label);
                    unknown |= id.is_none();
                    id
                }
            })
            .collect();
        if unknown {
            self.invalid(name);
        }
        groups
    }
}


#[cfg(test)]
mod test {
    use super::test_support::frame_at;
    use super::*;
    use crate::parameters::test_support::basic_parameters;

    fn catalogs() -> Catalogs {
        Catalogs::from_parameters(&basic_parameters()).unwrap()
    }

    #[test]
    fn ingests_required_columns_with_defaults() {
        let frame = frame_at(&[(1.0, 2.0), (3.0, 4.0)], &["susceptible", "infected"]);
        let population = Population::from_frame(&frame, &catalogs()).unwrap();
        assert_eq!(population.len(), 2);
        assert_eq!(population.row(AgentId(1)), Some(1));
        assert_eq!(population.transmission_reduction_factor, vec![1.0, 1.0]);
        assert!(population.needs_max_time.iter().all(|flag| *flag));
        assert!(population.adheres_to_isolation.iter().all(|flag| *flag));
        assert_eq!(population.mobility_group, vec![None, None]);
        assert!(population.is_active(0));
    }

    #[test]
    fn reports_missing_and_null_columns_together() {
        let frame = frame_at(&[(1.0, 2.0)], &["susceptible"])
            .with_column("x", vec![f64::NAN]);
        let mut frame = frame;
        frame.remove("vy");
        frame.remove("agent");
        match Population::from_frame(&frame, &catalogs()).unwrap_err() {
            EpiError::Multiple(errors) => {
                assert!(matches!(
                    &errors[0],
                    EpiError::MissingFieldError(fields) if fields == &vec!["agent", "vy"]
                ));
                assert!(matches!(
                    &errors[1],
                    EpiError::InvalidFieldError(Some(fields)) if fields == &vec!["x"]
                ));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_labels_and_duplicate_ids_are_invalid() {
        let frame = frame_at(&[(1.0, 2.0), (3.0, 4.0)], &["susceptible", "zombie"])
            .with_column("agent", vec![7_i64, 7]);
        match Population::from_frame(&frame, &catalogs()).unwrap_err() {
            EpiError::InvalidFieldError(Some(fields)) => {
                assert_eq!(fields, vec!["agent", "disease_state"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn nan_velocity_is_detected() {
        let frame = frame_at(&[(1.0, 2.0)], &["susceptible"]);
        let mut population = Population::from_frame(&frame, &catalogs()).unwrap();
        assert!(population.check_kinematics().is_ok());
        population.vy[0] = f64::NAN;
        assert!(matches!(
            population.check_kinematics(),
            Err(EpiError::InvalidFieldError(Some(fields))) if fields == vec!["vy"]
        ));
    }

    #[test]
    fn frame_export_keeps_labels() {
        let catalogs = catalogs();
        let frame = frame_at(&[(1.0, 2.0), (3.0, 4.0)], &["recovered", "infected"]);
        let population = Population::from_frame(&frame, &catalogs).unwrap();
        let exported = population.to_frame(&catalogs);
        assert_eq!(
            exported.get("disease_state"),
            Some(&Column::from(vec!["recovered", "infected"]))
        );
        assert_eq!(
            exported.get("neighbors_total"),
            Some(&Column::IdList(vec![vec![], vec![]]))
        );
        let reloaded = Population::from_frame(&exported, &catalogs).unwrap();
        assert_eq!(reloaded.x, population.x);
        assert_eq!(reloaded.disease_state, population.disease_state);
    }
}

//! Neighbor detection.
//!
//! Every step one k-d tree is built per disease state over its living, non-hospitalized agents.
//! Each such agent then queries every tree within the tracing radius and its neighbors are split
//! by the epidemiological role of their state.
mod tree;

use log::trace;

use crate::catalog::{DiseaseCatalog, DiseaseStateId};
use crate::error::EpiError;
use crate::population::{AgentId, Population};

pub use tree::{leaf_size, StatusTree, MIN_LEAF_SIZE};

/// An agent found by a radius query.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Neighbor {
    pub agent: AgentId,
    /// Row of the neighbor in the population it was found in.
    pub row: usize,
    pub distance_squared: f64,
}

/// The neighbors of one agent, split by role. Every neighbor is also in `total`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NeighborSets {
    pub can_be_infected: Vec<Neighbor>,
    pub infectious_spreading: Vec<Neighbor>,
    pub infectious_non_spreading: Vec<Neighbor>,
    /// Living agents that can neither be infected nor are infected.
    pub immune: Vec<Neighbor>,
    pub total: Vec<Neighbor>,
}

/// The role a disease state's agents play in a neighbor set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NeighborRole {
    CanBeInfected,
    InfectiousSpreading,
    InfectiousNonSpreading,
    Immune,
}

impl NeighborSets {
    fn push(&mut self, role: NeighborRole, neighbor: Neighbor) {
        let set = match role {
            NeighborRole::CanBeInfected => &mut self.can_be_infected,
            NeighborRole::InfectiousSpreading => &mut self.infectious_spreading,
            NeighborRole::InfectiousNonSpreading => &mut self.infectious_non_spreading,
            NeighborRole::Immune => &mut self.immune,
        };
        set.push(neighbor);
        self.total.push(neighbor);
    }

    fn sort(&mut self) {
        for set in [
            &mut self.can_be_infected,
            &mut self.infectious_spreading,
            &mut self.infectious_non_spreading,
            &mut self.immune,
            &mut self.total,
        ] {
            set.sort_by_key(|neighbor| neighbor.agent);
        }
    }
}

/// The tree of one disease state. Both fields are `None` when the state has no indexable agent.
#[derive(Debug)]
pub struct StatusIndex {
    pub state: DiseaseStateId,
    pub role: Option<NeighborRole>,
    pub tree: Option<StatusTree>,
    /// Agents in the tree, in population order.
    pub labels: Option<Vec<AgentId>>,
}

impl StatusIndex {
    fn query(&self, center: [f64; 2], radius: f64) -> Result<Vec<(usize, f64)>, EpiError> {
        match &self.tree {
            Some(tree) => tree.query_radius(center, radius),
            None => Ok(Vec::new()),
        }
    }
}

/// Whether an agent takes part in the index, as a tree member and as a querier.
#[must_use]
pub fn is_indexed(population: &Population, row: usize) -> bool {
    !population.is_dead[row] && !population.is_hospitalized[row]
}

/// The role of a state's agents, `None` for dead states. Infected wins over susceptible.
#[must_use]
pub fn role_of(catalog: &DiseaseCatalog, state: DiseaseStateId) -> Option<NeighborRole> {
    let state = catalog.get(state);
    if state.is_dead {
        None
    } else if state.is_infected {
        Some(if state.can_spread {
            NeighborRole::InfectiousSpreading
        } else {
            NeighborRole::InfectiousNonSpreading
        })
    } else if state.can_get_infected {
        Some(NeighborRole::CanBeInfected)
    } else {
        Some(NeighborRole::Immune)
    }
}

#[derive(Debug)]
pub struct SpatialIndex {
    statuses: Vec<StatusIndex>,
}

impl SpatialIndex {
    /// Builds one tree per disease state.
    pub fn build(population: &Population, catalog: &DiseaseCatalog) -> Result<Self, EpiError> {
        let mut members: Vec<Vec<([f64; 2], usize)>> = vec![Vec::new(); catalog.len()];
        for row in 0..population.len() {
            if is_indexed(population, row) {
                members[population.disease_state[row].index()]
                    .push(([population.x[row], population.y[row]], row));
            }
        }

        let statuses = catalog
            .iter()
            .zip(members)
            .map(|((state, _), points)| {
                let role = role_of(catalog, state);
                if role.is_none() || points.is_empty() {
                    return Ok(StatusIndex {
                        state,
                        role,
                        tree: None,
                        labels: None,
                    });
                }
                let labels = points.iter().map(|(_, row)| population.agent[*row]).collect();
                Ok(StatusIndex {
                    state,
                    role,
                    tree: StatusTree::build(points)?,
                    labels: Some(labels),
                })
            })
            .collect::<Result<Vec<_>, EpiError>>()?;
        Ok(SpatialIndex { statuses })
    }

    #[must_use]
    pub fn status(&self, state: DiseaseStateId) -> &StatusIndex {
        &self.statuses[state.index()]
    }

    /// The neighbors of `row` within `radius`, the agent itself excluded.
    pub fn neighbors_of(
        &self,
        population: &Population,
        row: usize,
        radius: f64,
    ) -> Result<NeighborSets, EpiError> {
        let mut sets = NeighborSets::default();
        let center = [population.x[row], population.y[row]];
        for status in &self.statuses {
            let Some(role) = status.role else {
                continue;
            };
            for (found, distance_squared) in status.query(center, radius)? {
                if found != row {
                    sets.push(
                        role,
                        Neighbor {
                            agent: population.agent[found],
                            row: found,
                            distance_squared,
                        },
                    );
                }
            }
        }
        sets.sort();
        Ok(sets)
    }
}

/// Rebuilds the index and stores every agent's neighbor sets in the population. Dead and
/// hospitalized agents get empty sets.
pub fn compute_neighbors(
    population: &mut Population,
    catalog: &DiseaseCatalog,
    tracing_radius: f64,
) -> Result<SpatialIndex, EpiError> {
    let index = SpatialIndex::build(population, catalog)?;
    let neighbors: Vec<NeighborSets> = (0..population.len())
        .map(|row| {
            if is_indexed(population, row) {
                index.neighbors_of(population, row, tracing_radius)
            } else {
                Ok(NeighborSets::default())
            }
        })
        .collect::<Result<_, EpiError>>()?;
    trace!(
        "indexed {} neighbor pairs within {tracing_radius}",
        neighbors.iter().map(|sets| sets.total.len()).sum::<usize>()
    );
    population.neighbors = neighbors;
    Ok(index)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::Catalogs;
    use crate::parameters::test_support::basic_parameters;
    use crate::parameters::DiseaseGroupConfig;
    use crate::population::test_support::frame_at;

    fn setup(positions: &[(f64, f64)], states: &[&str]) -> (Population, Catalogs) {
        let mut parameters = basic_parameters();
        parameters.disease_groups.push(DiseaseGroupConfig {
            name: "carrier".to_string(),
            is_infected: true,
            ..DiseaseGroupConfig::default()
        });
        parameters.disease_groups.push(DiseaseGroupConfig {
            name: "dead".to_string(),
            is_dead: true,
            ..DiseaseGroupConfig::default()
        });
        let catalogs = Catalogs::from_parameters(&parameters).unwrap();
        let frame = frame_at(positions, states);
        (Population::from_frame(&frame, &catalogs).unwrap(), catalogs)
    }

    fn ids(neighbors: &[Neighbor]) -> Vec<u64> {
        neighbors.iter().map(|n| n.agent.0).collect()
    }

    #[test]
    fn partitions_neighbors_by_role() {
        let (mut population, catalogs) = setup(
            &[
                (0.0, 0.0),
                (1.0, 0.0),
                (0.0, 1.0),
                (1.0, 1.0),
                (0.5, 0.5),
                (0.2, 0.2),
                (50.0, 50.0),
            ],
            &[
                "susceptible",
                "susceptible",
                "infected",
                "carrier",
                "recovered",
                "dead",
                "infected",
            ],
        );
        compute_neighbors(&mut population, &catalogs.disease, 2.0).unwrap();

        let sets = &population.neighbors[0];
        assert_eq!(ids(&sets.can_be_infected), vec![1]);
        assert_eq!(ids(&sets.infectious_spreading), vec![2]);
        assert_eq!(ids(&sets.infectious_non_spreading), vec![3]);
        assert_eq!(ids(&sets.immune), vec![4]);
        assert_eq!(ids(&sets.total), vec![1, 2, 3, 4]);
        assert_eq!(sets.infectious_spreading[0].distance_squared, 1.0);

        // Dead agents are neither indexed nor given neighbors.
        assert_eq!(population.neighbors[5], NeighborSets::default());
        assert!(population.neighbors[6].total.is_empty());
    }

    #[test]
    fn hospitalized_agents_are_skipped() {
        let (mut population, catalogs) =
            setup(&[(0.0, 0.0), (1.0, 0.0)], &["susceptible", "infected"]);
        population.is_hospitalized[1] = true;
        compute_neighbors(&mut population, &catalogs.disease, 5.0).unwrap();
        assert!(population.neighbors[0].total.is_empty());
        assert!(population.neighbors[1].total.is_empty());
    }

    #[test]
    fn empty_status_has_no_tree() {
        let (population, catalogs) = setup(&[(0.0, 0.0)], &["susceptible"]);
        let index = SpatialIndex::build(&population, &catalogs.disease).unwrap();
        let infected = catalogs.disease.id("infected").unwrap();
        assert!(index.status(infected).tree.is_none());
        assert!(index.status(infected).labels.is_none());

        let susceptible = catalogs.disease.id("susceptible").unwrap();
        assert_eq!(
            index.status(susceptible).labels,
            Some(vec![AgentId(0)])
        );
    }

    #[test]
    fn trees_use_the_scaled_leaf_size() {
        let positions: Vec<(f64, f64)> = (0..3000)
            .map(|i| (f64::from(i % 60), f64::from(i / 60)))
            .collect();
        let (population, catalogs) = setup(&positions, &["susceptible"; 3000]);
        let index = SpatialIndex::build(&population, &catalogs.disease).unwrap();
        let susceptible = catalogs.disease.id("susceptible").unwrap();
        let tree = index.status(susceptible).tree.as_ref().unwrap();
        assert_eq!(tree.len(), 3000);
        assert_eq!(tree.leaf_size(), 30);
    }

    #[test]
    fn roles_of_states() {
        let (_, catalogs) = setup(&[], &[]);
        let role = |name| role_of(&catalogs.disease, catalogs.disease.id(name).unwrap());
        assert_eq!(role("susceptible"), Some(NeighborRole::CanBeInfected));
        assert_eq!(role("infected"), Some(NeighborRole::InfectiousSpreading));
        assert_eq!(role("carrier"), Some(NeighborRole::InfectiousNonSpreading));
        assert_eq!(role("recovered"), Some(NeighborRole::Immune));
        assert_eq!(role("dead"), None);
    }
}

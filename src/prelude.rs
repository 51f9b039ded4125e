pub use crate::catalog::{Catalogs, ContextCatalogExt, DiseaseStateId, GroupId, StateKey};
pub use crate::context::Context;
pub use crate::disease::{ContextHealthcareExt, DiseaseStep, HealthcareCapacity};
pub use crate::distribution::{Distribution, DistributionConfig};
pub use crate::error::EpiError;
pub use crate::global_properties::{load_parameters_from_json, ContextGlobalPropertiesExt};
pub use crate::log::{debug, error, info, trace, warn};
pub use crate::movement::{deviation_angle, AgentFilter, BoxBounds, GroupField};
pub use crate::parameters::{ExecutionMode, Parameters, SimulationParameters};
pub use crate::plan::StepPhase;
pub use crate::population::{AgentFrame, AgentId, Column, ContextPopulationExt, Population};
pub use crate::random::ContextRandomExt;
pub use crate::restrictions::{
    ContextRestrictionExt, MonitoredCounter, RestrictionLog, RestrictionStatus,
};
pub use crate::simulation::{ContextSimulationExt, StepSummary};
pub use crate::spatial::{compute_neighbors, NeighborSets, SpatialIndex};
pub use crate::{define_data_plugin, define_global_property, define_rng};

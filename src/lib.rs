//! A spatial, agent-based epidemic engine.
//!
//! Agents move inside a rectangular box, find their neighbors through per-status k-d trees and
//! progress through a configurable disease state machine with diagnosis, isolation, capacity
//! constrained hospital care, waning immunity and mobility restrictions.
//!
//! The central object is the [`Context`]. It keeps the simulation clock, a queue of plans and a
//! set of data plugins; every module stores its state in a plugin and exposes its behavior
//! through a `Context*Ext` extension trait:
//! * [`ContextSimulationExt`](simulation::ContextSimulationExt) validates the [`Parameters`]
//!   and runs the step loop.
//! * [`ContextPopulationExt`](population::ContextPopulationExt) loads and exports the agent
//!   table.
//! * [`ContextCatalogExt`](catalog::ContextCatalogExt) holds the catalogs resolved from the
//!   parameters.
//! * [`ContextRandomExt`](random::ContextRandomExt) provides named, independently seeded random
//!   streams.
//!
//! A step moves agents, rebuilds the spatial index, advances the disease state machine and the
//! restriction policies, and finally turns susceptible agents away from nearby threats.
//!
//! [`Parameters`]: parameters::Parameters
pub mod catalog;
pub mod context;
pub mod disease;
pub mod distribution;
pub mod error;
pub mod global_properties;
pub mod hashing;
pub mod log;
pub mod movement;
pub mod numeric;
pub mod parameters;
pub mod plan;
pub mod population;
pub mod prelude;
pub mod random;
pub mod restrictions;
pub mod simulation;
pub mod spatial;

pub use context::Context;
pub use error::EpiError;
pub use hashing::{HashMap, HashMapExt, HashSet, HashSetExt};

// Re-exported so that `define_rng!` can name the generator type.
pub use rand;

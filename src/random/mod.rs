//! Named, independently seeded random number streams.
//!
//! Every random decision in the engine draws from a stream identified by a type defined with
//! [`define_rng!`]. Each stream is seeded with `base_seed + hash(name)`, so adding draws to one
//! stream never shifts the values produced by another, and two runs with the same base seed
//! reproduce each other exactly.
mod context_ext;
mod macros;

use std::any::{Any, TypeId};
use std::cell::RefCell;

pub use context_ext::ContextRandomExt;
pub use macros::define_rng;

use crate::define_data_plugin;
use crate::hashing::hash_str;
use crate::rand::SeedableRng;
use crate::HashMap;

pub trait RngId: Copy + Clone {
    type RngType: SeedableRng;
    fn get_name() -> &'static str;
}

/// Derives the seed of the stream called `name` from the run's base seed.
#[must_use]
pub fn stream_seed(base_seed: u64, name: &str) -> u64 {
    base_seed.wrapping_add(hash_str(name))
}

// This is a wrapper that allows for future support for different types of
// random number generators (anything that implements SeedableRng is valid).
struct RngHolder {
    rng: Box<dyn Any>,
}

struct RngData {
    base_seed: u64,
    rng_holders: RefCell<HashMap<TypeId, RngHolder>>,
}

// Registers a data container which stores:
// * base_seed: A base seed for all rngs
// * rng_holders: A map of rngs, keyed by their RngId. Note that this is
//   stored in a RefCell to allow for mutable borrow without requiring a
//   mutable borrow of the Context itself.
define_data_plugin!(
    RngPlugin,
    RngData,
    RngData {
        base_seed: 0,
        rng_holders: RefCell::new(HashMap::default()),
    }
);

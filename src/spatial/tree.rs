//! The radius index of one disease state, built on the `kdtree` crate.
//!
//! Leaf buckets grow with the number of points so that large populations keep shallow trees.
use kdtree::distance::squared_euclidean;
use kdtree::{ErrorKind, KdTree};

use crate::error::EpiError;

/// Smallest leaf bucket.
pub const MIN_LEAF_SIZE: usize = 16;

/// Bucket size for `n` points: `max(MIN_LEAF_SIZE, ceil(n / 100))`.
#[must_use]
pub fn leaf_size(n: usize) -> usize {
    MIN_LEAF_SIZE.max(n.div_ceil(100))
}

fn index_error(error: ErrorKind) -> EpiError {
    match error {
        ErrorKind::NonFiniteCoordinate => {
            EpiError::InvalidFieldError(Some(vec!["x".to_string(), "y".to_string()]))
        }
        other => EpiError::EpiError(format!("spatial index: {other:?}")),
    }
}

/// Rows of one disease state indexed by position.
pub struct StatusTree {
    tree: KdTree<f64, usize, [f64; 2]>,
    leaf_size: usize,
}

impl StatusTree {
    /// Builds the tree over `(position, row)` pairs. Returns `None` for an empty set of points.
    pub fn build(points: Vec<([f64; 2], usize)>) -> Result<Option<Self>, EpiError> {
        if points.is_empty() {
            return Ok(None);
        }
        let leaf_size = leaf_size(points.len());
        let mut tree = KdTree::with_capacity(2, leaf_size);
        for (position, row) in points {
            tree.add(position, row).map_err(index_error)?;
        }
        Ok(Some(StatusTree { tree, leaf_size }))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    #[must_use]
    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    /// Rows and squared distances of the points within `radius` of `center`, boundary included,
    /// nearest first.
    pub fn query_radius(&self, center: [f64; 2], radius: f64) -> Result<Vec<(usize, f64)>, EpiError> {
        let found = self
            .tree
            .within(&center, radius * radius, &squared_euclidean)
            .map_err(index_error)?;
        Ok(found
            .into_iter()
            .map(|(distance_squared, row)| (*row, distance_squared))
            .collect())
    }
}

impl std::fmt::Debug for StatusTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusTree")
            .field("len", &self.len())
            .field("leaf_size", &self.leaf_size)
            .finish()
    }
}

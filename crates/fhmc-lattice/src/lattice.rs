//! Periodic hypercubic lattice geometry.

use serde::{Deserialize, Serialize};

use fhmc_core::{ErrorInfo, McError};

/// Periodic hypercubic lattice with precomputed neighbor table.
///
/// Sites are indexed in row-major (C) order. The neighbor table stores, for
/// every site and dimension, the forward and backward neighbor:
/// `neighbors[(i * n_dims + d) * 2 + dir]` with `dir = 0` forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lattice {
    /// Extent along each dimension.
    pub shape: Vec<usize>,
    /// Row-major strides: `strides[d] = product of shape[d+1..]`.
    pub strides: Vec<usize>,
    /// Total number of sites.
    pub n_sites: usize,
    /// Number of spatial dimensions.
    pub n_dims: usize,
    neighbors: Vec<u32>,
}

impl Lattice {
    /// Creates a hypercubic lattice with the given shape (e.g. `vec![8, 8]`).
    ///
    /// Every extent must be at least 3 so that forward and backward neighbors
    /// are distinct sites.
    pub fn new(shape: Vec<usize>) -> Result<Self, McError> {
        if shape.is_empty() {
            return Err(McError::config("lattice-shape", "lattice needs at least one dimension"));
        }
        if let Some(extent) = shape.iter().find(|&&extent| extent < 3) {
            return Err(McError::Config(
                ErrorInfo::new("lattice-shape", "every lattice extent must be >= 3")
                    .with_context("extent", extent),
            ));
        }
        let n_dims = shape.len();
        let n_sites: usize = shape.iter().product();

        let mut strides = vec![1usize; n_dims];
        for d in (0..n_dims.saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * shape[d + 1];
        }

        let mut neighbors = vec![0u32; n_sites * n_dims * 2];
        for i in 0..n_sites {
            let coords: Vec<usize> = (0..n_dims).map(|d| (i / strides[d]) % shape[d]).collect();
            for d in 0..n_dims {
                for (dir, sign) in [(0, 1isize), (1, -1isize)] {
                    let c = (coords[d] as isize + sign).rem_euclid(shape[d] as isize) as usize;
                    let flat = i - coords[d] * strides[d] + c * strides[d];
                    neighbors[(i * n_dims + d) * 2 + dir] = flat as u32;
                }
            }
        }

        Ok(Self {
            shape,
            strides,
            n_sites,
            n_dims,
            neighbors,
        })
    }

    /// Number of neighbors per site (`2 * n_dims`).
    pub fn coordination(&self) -> usize {
        2 * self.n_dims
    }

    /// Neighbor of `site` in direction `dim`, forward or backward.
    #[inline]
    pub fn neighbor(&self, site: usize, dim: usize, forward: bool) -> usize {
        self.neighbors[(site * self.n_dims + dim) * 2 + (!forward as usize)] as usize
    }

    /// Neighbor number `k` of `site`, `k < coordination()`.
    #[inline]
    pub fn nth_neighbor(&self, site: usize, k: usize) -> usize {
        self.neighbors[site * self.n_dims * 2 + k] as usize
    }

    /// Iterator over all neighbors of `site`.
    pub fn neighbors_of(&self, site: usize) -> impl Iterator<Item = usize> + '_ {
        let base = site * self.n_dims * 2;
        self.neighbors[base..base + self.n_dims * 2]
            .iter()
            .map(|&n| n as usize)
    }
}

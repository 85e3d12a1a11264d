//! Hyperslab and point selection for partial array I/O.
//!
//! A [`Selection`] describes which elements of an array to read or write.
//! Selected elements are always transferred in row-major order of their
//! coordinates, so a buffer for a selection is dense over
//! [`Selection::output_shape`].
//!
//! # Example
//!
//! ```
//! use rustyhdf5_store::Selection;
//!
//! // Select rows 20..30, columns 40..60 from a 2D array
//! let sel = Selection::slice(&[20..30, 40..60]);
//! assert_eq!(sel.num_elements(&[100, 100]), 200); // 10 * 20
//! ```

use std::ops::Range;

use crate::error::{ErrorCode, Result, StoreError};

/// A selection describing which elements of an array to access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Select all elements.
    All,

    /// A regular hyperslab selection defined by start, stride, count, and block.
    ///
    /// For each dimension:
    /// - `start[d]`: first element index
    /// - `stride[d]`: step between blocks (must be >= block[d])
    /// - `count[d]`: number of blocks
    /// - `block[d]`: number of consecutive elements per block
    Hyperslab {
        start: Vec<u64>,
        stride: Vec<u64>,
        count: Vec<u64>,
        block: Vec<u64>,
    },

    /// Select individual points by coordinate.
    Points(Vec<Vec<u64>>),
}

impl Selection {
    /// Create a simple contiguous hyperslab from ranges (one per dimension).
    pub fn slice(ranges: &[Range<u64>]) -> Self {
        let rank = ranges.len();
        let mut start = Vec::with_capacity(rank);
        let mut count = Vec::with_capacity(rank);
        for r in ranges {
            start.push(r.start);
            count.push(r.end.saturating_sub(r.start));
        }
        Selection::Hyperslab {
            start,
            stride: vec![1; rank],
            count,
            block: vec![1; rank],
        }
    }

    /// Select a single element.
    pub fn point(coords: &[u64]) -> Self {
        Selection::Points(vec![coords.to_vec()])
    }

    /// Number of selected elements for a given dataspace shape.
    pub fn num_elements(&self, dims: &[u64]) -> u64 {
        match self {
            Selection::All => dims.iter().fold(1u64, |acc, &d| acc.saturating_mul(d)),
            Selection::Hyperslab { count, block, .. } => count
                .iter()
                .zip(block.iter())
                .fold(1u64, |acc, (&c, &b)| acc.saturating_mul(c.saturating_mul(b))),
            Selection::Points(pts) => pts.len() as u64,
        }
    }

    /// The shape of the selected region.
    ///
    /// For hyperslabs this is `count[d] * block[d]` per dimension, for
    /// points it is the number of points.
    pub fn output_shape(&self, dims: &[u64]) -> Vec<u64> {
        match self {
            Selection::All => dims.to_vec(),
            Selection::Hyperslab { count, block, .. } => {
                count.iter().zip(block.iter()).map(|(&c, &b)| c * b).collect()
            }
            Selection::Points(pts) => vec![pts.len() as u64],
        }
    }

    /// Check that the selection has the rank of `dims` and stays in bounds.
    pub fn validate(&self, dims: &[u64]) -> Result<()> {
        match self {
            Selection::All => Ok(()),
            Selection::Hyperslab {
                start,
                stride,
                count,
                block,
            } => {
                let rank = dims.len();
                if start.len() != rank
                    || stride.len() != rank
                    || count.len() != rank
                    || block.len() != rank
                {
                    return Err(StoreError::invalid(format!(
                        "hyperslab rank does not match dataspace rank {rank}"
                    )));
                }
                for d in 0..rank {
                    if count[d] == 0 || block[d] == 0 {
                        continue;
                    }
                    if stride[d] < block[d] {
                        return Err(StoreError::invalid(format!(
                            "stride {} smaller than block {} in dimension {d}",
                            stride[d], block[d]
                        )));
                    }
                    let end = start[d] + (count[d] - 1) * stride[d] + block[d];
                    if end > dims[d] {
                        return Err(StoreError::new(
                            ErrorCode::OutOfBounds,
                            format!(
                                "hyperslab ends at {end} beyond extent {} in dimension {d}",
                                dims[d]
                            ),
                        ));
                    }
                }
                Ok(())
            }
            Selection::Points(pts) => {
                for pt in pts {
                    if pt.len() != dims.len() {
                        return Err(StoreError::invalid(format!(
                            "point {pt:?} does not match dataspace rank {}",
                            dims.len()
                        )));
                    }
                    if pt.iter().zip(dims).any(|(&p, &d)| p >= d) {
                        return Err(StoreError::new(
                            ErrorCode::OutOfBounds,
                            format!("point {pt:?} outside extent {dims:?}"),
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    /// Row-major linear offsets of every selected element, in transfer order.
    ///
    /// The selection must already be valid for `dims`.
    pub fn offsets(&self, dims: &[u64]) -> Vec<usize> {
        let strides = row_major_strides(dims);
        match self {
            Selection::All => (0..dims.iter().product::<u64>() as usize).collect(),
            Selection::Points(pts) => pts
                .iter()
                .map(|pt| linear_offset(pt, &strides))
                .collect(),
            Selection::Hyperslab {
                start,
                stride,
                count,
                block,
            } => {
                let shape = self.output_shape(dims);
                let total: u64 = shape.iter().product();
                let mut out = Vec::with_capacity(total as usize);
                if total == 0 {
                    return out;
                }
                let rank = shape.len();
                let mut local = vec![0u64; rank];
                let mut coord = vec![0u64; rank];
                loop {
                    for d in 0..rank {
                        let bi = local[d] / block[d];
                        coord[d] = start[d] + bi * stride[d] + local[d] % block[d];
                    }
                    out.push(linear_offset(&coord, &strides));

                    // Odometer increment, last axis fastest.
                    let mut d = rank;
                    loop {
                        if d == 0 {
                            return out;
                        }
                        d -= 1;
                        local[d] += 1;
                        if local[d] < shape[d] {
                            break;
                        }
                        local[d] = 0;
                    }
                }
            }
        }
    }
}

/// Element strides of a row-major array with the given dimensions.
pub fn row_major_strides(dims: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; dims.len()];
    for d in (0..dims.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * dims[d + 1];
    }
    strides
}

fn linear_offset(coord: &[u64], strides: &[u64]) -> usize {
    coord.iter().zip(strides).map(|(&c, &s)| c * s).sum::<u64>() as usize
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

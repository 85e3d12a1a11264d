//! Current and maximum shape of an array node.

use std::fmt;

use rustyhdf5_store::{ArrayInfo, UNLIMITED};

use crate::error::{Error, Result};

/// Dimensions of an array node plus its per-axis ceilings.
///
/// An axis whose ceiling is [`UNLIMITED`] can grow without bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extent {
    dims: Vec<u64>,
    maxdims: Vec<u64>,
}

impl Extent {
    /// Build an extent of `rank` axes.
    ///
    /// `maxdims` defaults to all-unlimited; a negative entry marks that axis
    /// unlimited.
    pub fn new(rank: usize, dims: &[u64], maxdims: Option<&[i64]>) -> Result<Self> {
        if rank == 0 {
            return Err(Error::Argument("rank must be at least 1".into()));
        }
        if dims.len() != rank {
            return Err(Error::RankMismatch {
                expected: rank,
                actual: dims.len(),
            });
        }
        let maxdims = match maxdims {
            None => vec![UNLIMITED; rank],
            Some(m) if m.len() != rank => {
                return Err(Error::RankMismatch {
                    expected: rank,
                    actual: m.len(),
                })
            }
            Some(m) => m
                .iter()
                .map(|&v| u64::try_from(v).unwrap_or(UNLIMITED))
                .collect(),
        };
        for (axis, (&d, &m)) in dims.iter().zip(&maxdims).enumerate() {
            if d > m {
                return Err(Error::IndexOutOfRange(format!(
                    "axis {axis}: size {d} exceeds maximum {m}"
                )));
            }
        }
        Ok(Extent {
            dims: dims.to_vec(),
            maxdims,
        })
    }

    pub fn from_info(info: &ArrayInfo) -> Self {
        Extent {
            dims: info.dims.clone(),
            maxdims: info.maxdims.clone(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    pub fn maxdims(&self) -> &[u64] {
        &self.maxdims
    }

    pub fn is_unlimited(&self, axis: usize) -> bool {
        self.maxdims.get(axis) == Some(&UNLIMITED)
    }

    /// Element count, saturating at `u64::MAX`.
    pub fn num_elements(&self) -> u64 {
        self.dims.iter().fold(1u64, |acc, &d| acc.saturating_mul(d))
    }

    /// Check that `new_dims` is a legal resize target.
    pub fn check_resize(&self, new_dims: &[u64]) -> Result<()> {
        if new_dims.len() != self.rank() {
            return Err(Error::RankMismatch {
                expected: self.rank(),
                actual: new_dims.len(),
            });
        }
        for (axis, (&d, &m)) in new_dims.iter().zip(&self.maxdims).enumerate() {
            if m != UNLIMITED && d > m {
                return Err(Error::IndexOutOfRange(format!(
                    "cannot resize axis {axis} to {d}: maximum is {m}"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (d, m)) in self.dims.iter().zip(&self.maxdims).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if *m == UNLIMITED {
                write!(f, "{d}/inf")?;
            } else {
                write!(f, "{d}/{m}")?;
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_to_unlimited() {
        let e = Extent::new(2, &[3, 2], None).unwrap();
        assert!(e.is_unlimited(0) && e.is_unlimited(1));
        assert_eq!(e.num_elements(), 6);
    }

    #[test]
    fn element_count_saturates() {
        let e = Extent::new(2, &[u64::MAX / 2, 4], None).unwrap();
        assert_eq!(e.num_elements(), u64::MAX);
    }

    #[test]
    fn negative_max_means_unlimited() {
        let e = Extent::new(2, &[3, 2], Some(&[6, -1])).unwrap();
        assert_eq!(e.maxdims(), &[6, UNLIMITED]);
        assert_eq!(e.to_string(), "(3/6, 2/inf)");
    }

    #[test]
    fn length_mismatch_is_rank_error() {
        assert!(matches!(
            Extent::new(2, &[3], None),
            Err(Error::RankMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            Extent::new(2, &[3, 2], Some(&[4])),
            Err(Error::RankMismatch { .. })
        ));
        assert!(matches!(Extent::new(0, &[], None), Err(Error::Argument(_))));
    }

    #[test]
    fn dims_above_max_rejected() {
        assert!(matches!(
            Extent::new(1, &[5], Some(&[4])),
            Err(Error::IndexOutOfRange(_))
        ));
    }

    #[test]
    fn resize_checks() {
        let e = Extent::new(2, &[3, 2], Some(&[6, -1])).unwrap();
        e.check_resize(&[6, 1000]).unwrap();
        e.check_resize(&[0, 0]).unwrap();
        assert!(matches!(e.check_resize(&[7, 2]), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(e.check_resize(&[6]), Err(Error::RankMismatch { .. })));
    }

    proptest! {
        #[test]
        fn dims_and_bounded_max_survive(
            dims in proptest::collection::vec(0u64..50, 1..4),
            slack in 0i64..10,
        ) {
            let max: Vec<i64> = dims.iter().map(|&d| d as i64 + slack).collect();
            let e = Extent::new(dims.len(), &dims, Some(&max)).unwrap();
            prop_assert_eq!(e.dims(), &dims[..]);
            let expected: Vec<u64> = max.iter().map(|&m| m as u64).collect();
            prop_assert_eq!(e.maxdims(), &expected[..]);
            prop_assert!(e.check_resize(&expected).is_ok());
        }
    }
}

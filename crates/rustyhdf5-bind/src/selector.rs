//! Turning user indices into store selections.
//!
//! Indices are signed so that negative values can be rejected explicitly
//! instead of wrapping.

use rustyhdf5_store::Selection;

use crate::error::{Error, Result};
use crate::extent::Extent;

/// Builds [`Selection`]s checked against an [`Extent`].
pub struct Selector;

impl Selector {
    /// Select a single element.
    pub fn point(extent: &Extent, indices: &[i64]) -> Result<Selection> {
        if indices.len() != extent.rank() {
            return Err(Error::RankMismatch {
                expected: extent.rank(),
                actual: indices.len(),
            });
        }
        let coords = indices
            .iter()
            .zip(extent.dims())
            .enumerate()
            .map(|(axis, (&i, &d))| checked_index(axis, i, d))
            .collect::<Result<Vec<_>>>()?;
        Ok(Selection::point(&coords))
    }

    /// Select `start..stop` by `step` along `axis` and everything along the
    /// other axes.
    pub fn axis_slice(
        extent: &Extent,
        axis: usize,
        start: i64,
        stop: i64,
        step: i64,
    ) -> Result<Selection> {
        let rank = extent.rank();
        if axis >= rank {
            return Err(Error::Argument(format!(
                "axis {axis} out of range for rank {rank}"
            )));
        }
        if step < 1 {
            return Err(Error::Argument(format!("step must be positive, got {step}")));
        }
        if start < 0 {
            return Err(Error::IndexOutOfRange(format!(
                "negative start {start} on axis {axis}"
            )));
        }
        if stop <= start {
            return Err(Error::Argument(format!(
                "empty slice {start}..{stop} on axis {axis}"
            )));
        }
        let len = extent.dims()[axis];
        // stop > start >= 0 here, so both convert.
        let (start, stop, step) = (start as u64, stop as u64, step as u64);
        if stop > len {
            return Err(Error::IndexOutOfRange(format!(
                "slice end {stop} past axis {axis} of length {len}"
            )));
        }

        let mut sel_start = vec![0; rank];
        let mut stride = vec![1; rank];
        let mut count = extent.dims().to_vec();
        sel_start[axis] = start;
        stride[axis] = step;
        count[axis] = (stop - start).div_ceil(step);
        Ok(Selection::Hyperslab {
            start: sel_start,
            stride,
            count,
            block: vec![1; rank],
        })
    }

    /// A contiguous block at `origin` of `counts` elements per axis, used for
    /// partial writes. Callers check bounds against the extent.
    pub(crate) fn block(origin: &[u64], counts: &[u64]) -> Selection {
        let ranges: Vec<_> = origin
            .iter()
            .zip(counts)
            .map(|(&o, &c)| o..o + c)
            .collect();
        Selection::slice(&ranges)
    }
}

pub(crate) fn checked_index(axis: usize, index: i64, len: u64) -> Result<u64> {
    match u64::try_from(index) {
        Ok(i) if i < len => Ok(i),
        _ => Err(Error::IndexOutOfRange(format!(
            "index {index} out of range for axis {axis} of length {len}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_extent() -> Extent {
        Extent::new(2, &[4, 3], None).unwrap()
    }

    #[test]
    fn point_in_bounds() {
        let sel = Selector::point(&make_extent(), &[3, 2]).unwrap();
        assert_eq!(sel, Selection::point(&[3, 2]));
    }

    #[test]
    fn point_out_of_bounds() {
        let e = make_extent();
        assert!(matches!(Selector::point(&e, &[-1, 0]), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(Selector::point(&e, &[4, 0]), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(Selector::point(&e, &[0]), Err(Error::RankMismatch { .. })));
    }

    #[test]
    fn row_and_column_slices() {
        let e = make_extent();
        let row = Selector::axis_slice(&e, 0, 1, 2, 1).unwrap();
        assert_eq!(row.output_shape(e.dims()), vec![1, 3]);
        let col = Selector::axis_slice(&e, 1, 2, 3, 1).unwrap();
        assert_eq!(col.output_shape(e.dims()), vec![4, 1]);
        let stepped = Selector::axis_slice(&e, 0, 0, 4, 3).unwrap();
        assert_eq!(stepped.num_elements(e.dims()), 6);
    }

    #[test]
    fn bad_slices() {
        let e = make_extent();
        assert!(matches!(Selector::axis_slice(&e, 2, 0, 1, 1), Err(Error::Argument(_))));
        assert!(matches!(Selector::axis_slice(&e, 0, 0, 1, 0), Err(Error::Argument(_))));
        assert!(matches!(Selector::axis_slice(&e, 0, 2, 2, 1), Err(Error::Argument(_))));
        assert!(matches!(
            Selector::axis_slice(&e, 0, -1, 0, 1),
            Err(Error::IndexOutOfRange(_))
        ));
        assert!(matches!(
            Selector::axis_slice(&e, 0, 4, 5, 1),
            Err(Error::IndexOutOfRange(_))
        ));
    }

    proptest! {
        #[test]
        fn point_accepts_exactly_in_range(
            dims in proptest::collection::vec(1u64..8, 1..4),
            raw in proptest::collection::vec(-3i64..10, 3),
        ) {
            let e = Extent::new(dims.len(), &dims, None).unwrap();
            let idx = &raw[..dims.len()];
            let in_range = idx.iter().zip(&dims).all(|(&i, &d)| i >= 0 && (i as u64) < d);
            let sel = Selector::point(&e, idx);
            prop_assert_eq!(sel.is_ok(), in_range);
            if let Ok(sel) = sel {
                prop_assert!(sel.validate(&dims).is_ok());
            }
        }
    }
}

//! Typed, bounds-checked views over array nodes.
//!
//! [`DatasetHandle`] is the untyped open array; [`Dataset<T, R>`] adds the
//! element type and rank. Addressing differs per rank, so point access is
//! available everywhere, rows and columns on rank 2, and slabs on rank 3.
//!
//! Every accessor re-reads the current extent from the store, so a resize
//! through one view is visible through every other view of the same node.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, AsArray, Ix1, Ix2, Ix3};
use rustyhdf5_store::{ArrayInfo, ElementType, Hid, Selection};

use crate::attribute::AttributeOwner;
use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::handle::Handle;
use crate::selector::{checked_index, Selector};
use crate::types::{check_type, decode_all, encode_all, Element};

/// An open array node of unknown element type and rank.
#[derive(Debug, Clone)]
pub struct DatasetHandle {
    handle: Arc<Handle>,
    path: String,
}

impl DatasetHandle {
    pub(crate) fn new(handle: Arc<Handle>, path: String) -> Self {
        DatasetHandle { handle, path }
    }

    /// Absolute path of the node.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn info(&self) -> Result<ArrayInfo> {
        let hid = self.handle.id()?;
        Ok(self.handle.store().array_info(hid)?)
    }

    pub fn element_type(&self) -> Result<ElementType> {
        Ok(self.info()?.dtype)
    }

    pub fn rank(&self) -> Result<usize> {
        Ok(self.info()?.rank())
    }

    pub fn extent(&self) -> Result<Extent> {
        Ok(Extent::from_info(&self.info()?))
    }

    /// Total number of elements.
    pub fn len(&self) -> Result<u64> {
        Ok(self.info()?.num_elements())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Change the current extent.
    ///
    /// Fails with `RankMismatch` if `new_dims` has the wrong length and
    /// `IndexOutOfRange` if any axis would exceed its maximum.
    pub fn resize(&self, new_dims: &[u64]) -> Result<()> {
        let hid = self.handle.id()?;
        let extent = Extent::from_info(&self.handle.store().array_info(hid)?);
        extent.check_resize(new_dims)?;
        self.handle.store().resize_array(hid, new_dims)?;
        tracing::debug!(path = %self.path, from = ?extent.dims(), to = ?new_dims, "resized array");
        Ok(())
    }

    /// View as a typed dataset, verifying element type and rank.
    pub fn typed<T: Element, const R: usize>(self) -> Result<Dataset<T, R>> {
        check_layout::<T, R>(&self.info()?)?;
        Ok(Dataset::from_handle(self))
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    /// Release the node handle. Other clones of this handle see it closed.
    pub fn close(&self) -> Result<()> {
        self.handle.release()
    }
}

impl AttributeOwner for DatasetHandle {
    fn owner_handle(&self) -> &Handle {
        &self.handle
    }
}

fn check_layout<T: Element, const R: usize>(info: &ArrayInfo) -> Result<()> {
    if info.rank() != R {
        return Err(Error::RankMismatch {
            expected: R,
            actual: info.rank(),
        });
    }
    check_type::<T>(&info.dtype)
}

fn to_usize(v: u64) -> Result<usize> {
    usize::try_from(v).map_err(|_| Error::IndexOutOfRange(format!("{v} does not fit in memory")))
}

fn to_index(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn shape_error(e: ndarray::ShapeError) -> Error {
    Error::InvalidState(format!("store returned a malformed block: {e}"))
}

/// A typed array node of rank `R`.
///
/// Clones share the same underlying handle.
pub struct Dataset<T, const R: usize> {
    raw: DatasetHandle,
    _marker: PhantomData<fn() -> T>,
}

pub type Dataset1<T> = Dataset<T, 1>;
pub type Dataset2<T> = Dataset<T, 2>;
pub type Dataset3<T> = Dataset<T, 3>;

impl<T, const R: usize> Clone for Dataset<T, R> {
    fn clone(&self) -> Self {
        Dataset {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, const R: usize> fmt::Debug for Dataset<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("path", &self.raw.path)
            .field("rank", &R)
            .field("element", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Element, const R: usize> Dataset<T, R> {
    /// Wrap without checking; every access still verifies type and rank.
    pub(crate) fn from_handle(raw: DatasetHandle) -> Self {
        Dataset {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &str {
        self.raw.path()
    }

    /// The untyped handle this view wraps.
    pub fn untyped(&self) -> &DatasetHandle {
        &self.raw
    }

    pub fn element_type(&self) -> Result<ElementType> {
        Ok(self.checked_info()?.1.dtype)
    }

    pub fn extent(&self) -> Result<Extent> {
        Ok(Extent::from_info(&self.checked_info()?.1))
    }

    pub fn dims(&self) -> Result<Vec<u64>> {
        Ok(self.checked_info()?.1.dims)
    }

    /// Total number of elements.
    pub fn len(&self) -> Result<u64> {
        Ok(self.checked_info()?.1.num_elements())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn resize(&self, new_dims: &[u64]) -> Result<()> {
        if new_dims.len() != R {
            return Err(Error::RankMismatch {
                expected: R,
                actual: new_dims.len(),
            });
        }
        self.checked_info()?;
        self.raw.resize(new_dims)
    }

    pub fn is_open(&self) -> bool {
        self.raw.is_open()
    }

    pub fn close(&self) -> Result<()> {
        self.raw.close()
    }

    fn checked_info(&self) -> Result<(Hid, ArrayInfo)> {
        let hid = self.raw.handle.id()?;
        let info = self.raw.handle.store().array_info(hid)?;
        check_layout::<T, R>(&info)?;
        Ok((hid, info))
    }

    fn read_sel(&self, hid: Hid, info: &ArrayInfo, sel: &Selection) -> Result<Vec<T>> {
        let bytes = self.raw.handle.store().read_selection(hid, sel)?;
        decode_all(&bytes, &info.dtype)
    }

    fn write_sel(&self, hid: Hid, info: &ArrayInfo, sel: &Selection, values: &[T]) -> Result<()> {
        let bytes = encode_all(values, &info.dtype)?;
        self.raw.handle.store().write_selection(hid, sel, &bytes)?;
        Ok(())
    }

    fn get_at(&self, indices: [i64; R]) -> Result<T> {
        let (hid, info) = self.checked_info()?;
        let sel = Selector::point(&Extent::from_info(&info), &indices)?;
        self.read_sel(hid, &info, &sel)?
            .pop()
            .ok_or_else(|| Error::InvalidState("point read returned no data".into()))
    }

    fn set_at(&self, indices: [i64; R], value: &T) -> Result<()> {
        let (hid, info) = self.checked_info()?;
        let sel = Selector::point(&Extent::from_info(&info), &indices)?;
        self.write_sel(hid, &info, &sel, std::slice::from_ref(value))
    }

    /// Read index `index` along `axis` with every other axis in full.
    /// Returns the block shape and its elements in row-major order.
    fn read_lane(&self, axis: usize, index: i64) -> Result<(Vec<u64>, Vec<T>)> {
        let (hid, info) = self.checked_info()?;
        let extent = Extent::from_info(&info);
        checked_index(axis, index, info.dims[axis])?;
        let sel = Selector::axis_slice(&extent, axis, index, index + 1, 1)?;
        let shape = sel.output_shape(&info.dims);
        Ok((shape, self.read_sel(hid, &info, &sel)?))
    }

    /// Write a block at index `index` along `axis`. `counts` gives the block
    /// size on every axis and may be smaller than the extent.
    fn write_lane(&self, axis: usize, index: i64, counts: [u64; R], values: &[T]) -> Result<()> {
        let (hid, info) = self.checked_info()?;
        let i = checked_index(axis, index, info.dims[axis])?;
        for (a, (&c, &d)) in counts.iter().zip(&info.dims).enumerate() {
            if a != axis && c > d {
                return Err(Error::IndexOutOfRange(format!(
                    "{c} values do not fit axis {a} of length {d}"
                )));
            }
        }
        let mut origin = [0u64; R];
        origin[axis] = i;
        let sel = Selector::block(&origin, &counts);
        self.write_sel(hid, &info, &sel, values)
    }

    fn axis_len(&self, axis: usize) -> Result<i64> {
        Ok(to_index(self.checked_info()?.1.dims[axis]))
    }

    fn read_all(&self) -> Result<(Vec<u64>, Vec<T>)> {
        let (hid, info) = self.checked_info()?;
        let values = self.read_sel(hid, &info, &Selection::All)?;
        Ok((info.dims, values))
    }

    /// Replace every element. The shape must equal the current extent.
    fn write_all(&self, shape: &[usize], values: &[T]) -> Result<()> {
        let (hid, info) = self.checked_info()?;
        let actual: Vec<u64> = shape.iter().map(|&d| d as u64).collect();
        if actual != info.dims {
            return Err(Error::ShapeMismatch {
                expected: info.dims,
                actual,
            });
        }
        self.write_sel(hid, &info, &Selection::All, values)
    }

    /// Every element, slab-major for rank 3 and row-major for rank 2.
    ///
    /// The leading axis length is read now; each block is read on demand.
    pub fn elements(&self) -> Result<impl Iterator<Item = Result<T>> + '_> {
        let n = self.axis_len(0)?;
        let chunks = (0..n).map(move |i| self.read_lane(0, i).map(|(_, v)| v));
        Ok(Elements {
            chunks,
            current: Vec::new().into_iter(),
        })
    }
}

impl<T: Element, const R: usize> AttributeOwner for Dataset<T, R> {
    fn owner_handle(&self) -> &Handle {
        &self.raw.handle
    }
}

/// Flattens blocks of elements into single elements.
struct Elements<I, T> {
    chunks: I,
    current: std::vec::IntoIter<T>,
}

impl<I, T> Iterator for Elements<I, T>
where
    I: Iterator<Item = Result<Vec<T>>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(v) = self.current.next() {
                return Some(Ok(v));
            }
            match self.chunks.next()? {
                Ok(chunk) => self.current = chunk.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

// ---- rank 1 ----

impl<T: Element> Dataset<T, 1> {
    pub fn get(&self, i: i64) -> Result<T> {
        self.get_at([i])
    }

    pub fn set(&self, i: i64, value: T) -> Result<()> {
        self.set_at([i], &value)
    }

    pub fn values(&self) -> Result<Array1<T>> {
        Ok(Array1::from(self.read_all()?.1))
    }

    pub fn set_values<'v, V>(&self, values: V) -> Result<()>
    where
        V: AsArray<'v, T, Ix1>,
        T: 'v,
    {
        let view: ArrayView1<'v, T> = values.into();
        let data: Vec<T> = view.iter().cloned().collect();
        self.write_all(view.shape(), &data)
    }
}

// ---- rank 2 ----

impl<T: Element> Dataset<T, 2> {
    pub fn get(&self, i: i64, j: i64) -> Result<T> {
        self.get_at([i, j])
    }

    pub fn set(&self, i: i64, j: i64, value: T) -> Result<()> {
        self.set_at([i, j], &value)
    }

    pub fn row(&self, i: i64) -> Result<Vec<T>> {
        Ok(self.read_lane(0, i)?.1)
    }

    pub fn column(&self, j: i64) -> Result<Vec<T>> {
        Ok(self.read_lane(1, j)?.1)
    }

    /// Write the leading `values.len()` cells of row `i`.
    pub fn set_row(&self, i: i64, values: &[T]) -> Result<()> {
        self.write_lane(0, i, [1, values.len() as u64], values)
    }

    /// Write the leading `values.len()` cells of column `j`.
    pub fn set_column(&self, j: i64, values: &[T]) -> Result<()> {
        self.write_lane(1, j, [values.len() as u64, 1], values)
    }

    /// Rows in ascending order. The row count is read when this is called.
    pub fn rows(&self) -> Result<impl Iterator<Item = Result<Vec<T>>> + '_> {
        let n = self.axis_len(0)?;
        Ok((0..n).map(move |i| self.row(i)))
    }

    pub fn columns(&self) -> Result<impl Iterator<Item = Result<Vec<T>>> + '_> {
        let n = self.axis_len(1)?;
        Ok((0..n).map(move |j| self.column(j)))
    }

    pub fn values(&self) -> Result<Array2<T>> {
        let (dims, data) = self.read_all()?;
        Array2::from_shape_vec((to_usize(dims[0])?, to_usize(dims[1])?), data).map_err(shape_error)
    }

    pub fn set_values<'v, V>(&self, values: V) -> Result<()>
    where
        V: AsArray<'v, T, Ix2>,
        T: 'v,
    {
        let view: ArrayView2<'v, T> = values.into();
        let data: Vec<T> = view.iter().cloned().collect();
        self.write_all(view.shape(), &data)
    }
}

// ---- rank 3 ----

impl<T: Element> Dataset<T, 3> {
    pub fn get(&self, i: i64, j: i64, k: i64) -> Result<T> {
        self.get_at([i, j, k])
    }

    pub fn set(&self, i: i64, j: i64, k: i64, value: T) -> Result<()> {
        self.set_at([i, j, k], &value)
    }

    /// The 2-D block at index `i` of the leading axis.
    pub fn slab(&self, i: i64) -> Result<Array2<T>> {
        let (shape, data) = self.read_lane(0, i)?;
        Array2::from_shape_vec((to_usize(shape[1])?, to_usize(shape[2])?), data)
            .map_err(shape_error)
    }

    /// Write `values` into the top-left corner of slab `i`.
    pub fn set_slab<'v, V>(&self, i: i64, values: V) -> Result<()>
    where
        V: AsArray<'v, T, Ix2>,
        T: 'v,
    {
        let view: ArrayView2<'v, T> = values.into();
        let (rows, cols) = view.dim();
        let data: Vec<T> = view.iter().cloned().collect();
        self.write_lane(0, i, [1, rows as u64, cols as u64], &data)
    }

    pub fn slabs(&self) -> Result<impl Iterator<Item = Result<Array2<T>>> + '_> {
        let n = self.axis_len(0)?;
        Ok((0..n).map(move |i| self.slab(i)))
    }

    pub fn values(&self) -> Result<Array3<T>> {
        let (dims, data) = self.read_all()?;
        let shape = (to_usize(dims[0])?, to_usize(dims[1])?, to_usize(dims[2])?);
        Array3::from_shape_vec(shape, data).map_err(shape_error)
    }

    pub fn set_values<'v, V>(&self, values: V) -> Result<()>
    where
        V: AsArray<'v, T, Ix3>,
        T: 'v,
    {
        let view: ArrayView3<'v, T> = values.into();
        let data: Vec<T> = view.iter().cloned().collect();
        self.write_all(view.shape(), &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleKind;
    use ndarray::{arr1, arr2, Array3};
    use rustyhdf5_store::{NativeStore, ObjectStore, OpenMode, UNLIMITED};

    // ---- helpers ----

    fn make_array(dtype: ElementType, dims: &[u64], maxdims: &[u64]) -> DatasetHandle {
        let store: Arc<dyn ObjectStore> = Arc::new(NativeStore::volatile());
        let f = store.open_container("ds", OpenMode::CreateExclusive).unwrap();
        let hid = store.create_array(f, "a", dtype, dims, maxdims).unwrap();
        store.close_container(f).unwrap();
        let h = Handle::new(store, HandleKind::Array, hid).unwrap();
        DatasetHandle::new(h, "/a".into())
    }

    fn make_1d<T: Element>(n: u64) -> Dataset1<T> {
        make_array(T::element_type(16), &[n], &[UNLIMITED]).typed().unwrap()
    }

    fn make_2d(rows: u64, cols: u64) -> Dataset2<f64> {
        make_array(ElementType::F64, &[rows, cols], &[UNLIMITED, UNLIMITED])
            .typed()
            .unwrap()
    }

    // ---- point access ----

    #[test]
    fn fresh_array_reads_defaults() {
        let ds = make_1d::<i32>(4);
        for i in 0..4 {
            assert_eq!(ds.get(i).unwrap(), 0);
        }
        assert!(matches!(ds.get(4), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(ds.get(-1), Err(Error::IndexOutOfRange(_))));

        let names = make_1d::<String>(2);
        assert_eq!(names.get(1).unwrap(), "");
    }

    #[test]
    fn set_then_get_every_type() {
        let a = make_1d::<i8>(3);
        a.set(2, -5).unwrap();
        assert_eq!(a.get(2).unwrap(), -5);
        let b = make_1d::<i64>(3);
        b.set(0, i64::MIN).unwrap();
        assert_eq!(b.get(0).unwrap(), i64::MIN);
        let c = make_1d::<f32>(3);
        c.set(1, 1.5).unwrap();
        assert_eq!(c.get(1).unwrap(), 1.5);
        let d = make_1d::<String>(3);
        d.set(1, "Chicago".into()).unwrap();
        assert_eq!(d.get(1).unwrap(), "Chicago");
    }

    #[test]
    fn typed_view_checks_layout() {
        let raw = make_array(ElementType::I32, &[2, 2], &[2, 2]);
        assert!(matches!(
            raw.clone().typed::<i32, 1>(),
            Err(Error::RankMismatch { expected: 1, actual: 2 })
        ));
        assert!(matches!(
            raw.clone().typed::<f64, 2>(),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(raw.typed::<i32, 2>().is_ok());
    }

    #[test]
    fn closed_dataset_fails() {
        let ds = make_1d::<i32>(2);
        let other = ds.clone();
        ds.close().unwrap();
        assert!(matches!(other.get(0), Err(Error::InvalidState(_))));
        assert!(matches!(other.resize(&[3]), Err(Error::InvalidState(_))));
    }

    // ---- rows and columns ----

    #[test]
    fn rows_columns_and_partial_writes() {
        let ds = make_2d(3, 2);
        ds.set_row(0, &[1.0, 2.0]).unwrap();
        ds.set_column(1, &[9.0, 8.0]).unwrap();
        assert_eq!(ds.row(0).unwrap(), vec![1.0, 9.0]);
        assert_eq!(ds.column(1).unwrap(), vec![9.0, 8.0, 0.0]);

        ds.set_row(2, &[5.0]).unwrap();
        assert_eq!(ds.row(2).unwrap(), vec![5.0, 0.0]);

        assert!(matches!(ds.set_row(0, &[1.0, 2.0, 3.0]), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(ds.row(3), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(ds.column(-1), Err(Error::IndexOutOfRange(_))));
    }

    #[test]
    fn row_iteration_rereads_extent() {
        let ds = make_2d(3, 2);
        ds.set_values(&arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]])).unwrap();
        let rows: Vec<_> = ds.rows().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows, vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);

        ds.resize(&[4, 2]).unwrap();
        assert_eq!(ds.rows().unwrap().count(), 4);
        let cols: Vec<_> = ds.columns().unwrap().map(|c| c.unwrap()).collect();
        assert_eq!(cols[0], vec![1.0, 3.0, 5.0, 0.0]);
    }

    #[test]
    fn elements_are_row_major() {
        let ds = make_2d(2, 3);
        ds.set_values(&arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]])).unwrap();
        let all: Vec<f64> = ds.elements().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(all, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    // ---- bulk values ----

    #[test]
    fn values_require_exact_shape() {
        let ds = make_2d(2, 2);
        let err = ds.set_values(&arr2(&[[1.0, 2.0, 3.0]])).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        ds.set_values(arr2(&[[1.0, 2.0], [3.0, 4.0]]).view()).unwrap();
        assert_eq!(ds.values().unwrap(), arr2(&[[1.0, 2.0], [3.0, 4.0]]));

        let v = make_1d::<i32>(3);
        v.set_values(&arr1(&[7, 8, 9])).unwrap();
        assert_eq!(v.values().unwrap(), arr1(&[7, 8, 9]));
        assert!(v.set_values(&arr1(&[1])).is_err());
    }

    // ---- rank 3 ----

    #[test]
    fn slabs() {
        let ds: Dataset3<i32> = make_array(ElementType::I32, &[2, 2, 3], &[UNLIMITED; 3])
            .typed()
            .unwrap();
        ds.set_slab(1, &arr2(&[[1, 2, 3], [4, 5, 6]])).unwrap();
        ds.set_slab(0, &arr2(&[[7]])).unwrap();
        assert_eq!(ds.slab(1).unwrap(), arr2(&[[1, 2, 3], [4, 5, 6]]));
        assert_eq!(ds.get(0, 0, 0).unwrap(), 7);
        assert_eq!(ds.get(1, 1, 2).unwrap(), 6);
        assert!(matches!(
            ds.set_slab(0, &arr2(&[[1, 2, 3, 4]])),
            Err(Error::IndexOutOfRange(_))
        ));
        assert!(matches!(ds.slab(2), Err(Error::IndexOutOfRange(_))));

        assert_eq!(ds.slabs().unwrap().count(), 2);
        let flat: Vec<i32> = ds.elements().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(flat, vec![7, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6]);

        let cube = ds.values().unwrap();
        assert_eq!(cube.dim(), (2, 2, 3));
        ds.set_values(&Array3::<i32>::zeros((2, 2, 3))).unwrap();
        assert_eq!(ds.get(1, 1, 2).unwrap(), 0);
    }

    // ---- resize ----

    #[test]
    fn resize_within_and_beyond_max() {
        let ds: Dataset2<f64> = make_array(ElementType::F64, &[3, 2], &[6, UNLIMITED])
            .typed()
            .unwrap();
        ds.resize(&[6, 5]).unwrap();
        assert_eq!(ds.dims().unwrap(), vec![6, 5]);
        assert!(matches!(ds.resize(&[7, 5]), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(ds.resize(&[6]), Err(Error::RankMismatch { .. })));
        ds.resize(&[1, 1]).unwrap();
        assert_eq!(ds.len().unwrap(), 1);
    }
}

//! Handle-based hierarchical array store.
//!
//! This crate is the storage layer underneath `rustyhdf5-bind`. It exposes
//! the primitive operations of a scientific container (groups, n-dimensional
//! typed arrays, scalar attributes) through the [`ObjectStore`] trait, using
//! integer handles the way native HDF5 bindings do.
//!
//! ```text
//! ┌───────────────────────────┐
//! │   rustyhdf5-bind          │  schemas, typed datasets
//! ├───────────────────────────┤
//! │   ObjectStore             │  ← trait defined here
//! ├───────────────────────────┤
//! │   NativeStore             │  file images / volatile images
//! └───────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use rustyhdf5_store::{ElementType, NativeStore, ObjectStore, OpenMode, Selection, UNLIMITED};
//!
//! let store = NativeStore::volatile();
//! let file = store.open_container("demo", OpenMode::CreateExclusive).unwrap();
//! let root = store.root_group(file).unwrap();
//! let ds = store
//!     .create_array(root, "counts", ElementType::I32, &[4], &[UNLIMITED])
//!     .unwrap();
//! store
//!     .write_selection(ds, &Selection::point(&[2]), &7i32.to_le_bytes())
//!     .unwrap();
//! let bytes = store.read_selection(ds, &Selection::point(&[2])).unwrap();
//! assert_eq!(bytes, 7i32.to_le_bytes());
//! # store.close_array(ds).unwrap();
//! # store.close_group(root).unwrap();
//! # store.close_container(file).unwrap();
//! ```

pub mod error;
mod image;
pub mod native;
pub mod selection;
pub mod types;

pub use error::{ErrorCode, Result, StoreError};
pub use image::MAX_ARRAY_BYTES;
pub use native::NativeStore;
pub use selection::Selection;
pub use types::{ArrayInfo, ElementType, Hid, ObjectKind, OpenMode, UNLIMITED};

/// Primitive operations of a hierarchical array store.
///
/// Every object is addressed through an integer handle. Handles derived
/// from a container keep that container alive: closing the container handle
/// only invalidates that handle, and the container itself is released once
/// its last derived handle is closed.
///
/// Create primitives take a single link name; open primitives accept
/// relative slash-separated paths.
pub trait ObjectStore: Send + Sync {
    /// Connector name (e.g. "native").
    fn name(&self) -> &str;

    // ---- containers ----

    /// Open or create the container at `location`.
    fn open_container(&self, location: &str, mode: OpenMode) -> Result<Hid>;

    /// Release a container handle. Objects opened through it stay valid.
    fn close_container(&self, container: Hid) -> Result<()>;

    /// Persist the container that `hid` belongs to.
    fn flush(&self, hid: Hid) -> Result<()>;

    /// Open the root group of a container.
    fn root_group(&self, container: Hid) -> Result<Hid>;

    /// Whether mutations are permitted through `hid`.
    fn is_writable(&self, hid: Hid) -> Result<bool>;

    // ---- links ----

    /// Whether every segment of `path` resolves below `loc`.
    fn link_exists(&self, loc: Hid, path: &str) -> Result<bool>;

    /// Kind of the object at `path` below `loc`.
    fn object_kind(&self, loc: Hid, path: &str) -> Result<ObjectKind>;

    /// Direct children of a group, ordered by name.
    fn list_links(&self, group: Hid) -> Result<Vec<(String, ObjectKind)>>;

    /// Remove the link at `path`. Storage is reclaimed when the container is
    /// finally closed.
    fn unlink(&self, loc: Hid, path: &str) -> Result<()>;

    // ---- groups ----

    fn open_group(&self, loc: Hid, path: &str) -> Result<Hid>;
    fn create_group(&self, loc: Hid, name: &str) -> Result<Hid>;
    fn close_group(&self, group: Hid) -> Result<()>;

    // ---- arrays ----

    fn open_array(&self, loc: Hid, path: &str) -> Result<Hid>;

    /// Create a zero-filled array. `maxdims` uses [`UNLIMITED`] for
    /// unbounded axes.
    fn create_array(
        &self,
        loc: Hid,
        name: &str,
        dtype: ElementType,
        dims: &[u64],
        maxdims: &[u64],
    ) -> Result<Hid>;

    fn close_array(&self, array: Hid) -> Result<()>;

    fn array_info(&self, array: Hid) -> Result<ArrayInfo>;

    /// Read the selected elements as packed little-endian bytes.
    fn read_selection(&self, array: Hid, selection: &Selection) -> Result<Vec<u8>>;

    /// Write packed little-endian bytes to the selected elements.
    fn write_selection(&self, array: Hid, selection: &Selection, data: &[u8]) -> Result<()>;

    /// Change the current extent, keeping the overlapping region.
    fn resize_array(&self, array: Hid, dims: &[u64]) -> Result<()>;

    // ---- attributes ----

    fn attribute_exists(&self, loc: Hid, name: &str) -> Result<bool>;
    fn list_attributes(&self, loc: Hid) -> Result<Vec<String>>;
    fn open_attribute(&self, loc: Hid, name: &str) -> Result<Hid>;
    /// Create an attribute holding `value`, or zeros when `value` is `None`.
    /// A value of the wrong length creates nothing.
    fn create_attribute(
        &self,
        loc: Hid,
        name: &str,
        dtype: ElementType,
        value: Option<&[u8]>,
    ) -> Result<Hid>;
    fn attribute_type(&self, attr: Hid) -> Result<ElementType>;
    fn read_attribute(&self, attr: Hid) -> Result<Vec<u8>>;
    fn write_attribute(&self, attr: Hid, data: &[u8]) -> Result<()>;
    fn close_attribute(&self, attr: Hid) -> Result<()>;
}

//! Native store connector.
//!
//! [`NativeStore`] keeps the node tree of every open container in memory.
//! Containers are persisted either as files on the local filesystem
//! ([`NativeStore::new`]) or as images kept inside the store itself
//! ([`NativeStore::volatile`]), which is convenient for tests.
//!
//! A container stays open while any handle derived from it is open. When the
//! last one is closed, unreachable nodes are dropped and a writable container
//! is written back.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{ErrorCode, Result, StoreError};
use crate::image::{buffer_len, check_single_segment, reshape_preserving, ArrayData, Image, Node, NodeId, ROOT};
use crate::selection::Selection;
use crate::types::{ArrayInfo, ElementType, Hid, ObjectKind, OpenMode, UNLIMITED};
use crate::ObjectStore;

type ContainerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persistence {
    Disk,
    Volatile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Container,
    Group(NodeId),
    Array(NodeId),
    Attribute { node: NodeId, name: String },
}

#[derive(Debug, Clone)]
struct OpenObject {
    container: ContainerId,
    target: Target,
    writable: bool,
}

#[derive(Debug)]
struct OpenContainer {
    location: String,
    image: Image,
    /// Open handles of any kind derived from this container.
    refs: usize,
    /// Set once any writable handle has been opened.
    writable: bool,
}

#[derive(Debug, Default)]
struct Inner {
    next_hid: Hid,
    next_container: ContainerId,
    handles: HashMap<Hid, OpenObject>,
    containers: HashMap<ContainerId, OpenContainer>,
    by_location: HashMap<String, ContainerId>,
    volatile: HashMap<String, Image>,
}

/// Store connector backed by in-memory node trees.
pub struct NativeStore {
    persistence: Persistence,
    inner: Mutex<Inner>,
}

impl NativeStore {
    /// A store whose containers are files on the local filesystem.
    pub fn new() -> Self {
        Self::with_persistence(Persistence::Disk)
    }

    /// A store whose containers live only in this store's memory. Closed
    /// containers can be reopened by location for as long as the store lives.
    pub fn volatile() -> Self {
        Self::with_persistence(Persistence::Volatile)
    }

    fn with_persistence(persistence: Persistence) -> Self {
        Self {
            persistence,
            inner: Mutex::new(Inner {
                next_hid: 1,
                next_container: 1,
                ..Inner::default()
            }),
        }
    }

    /// Number of handles currently open, across all containers.
    pub fn open_handle_count(&self) -> usize {
        self.inner.lock().handles.len()
    }

    /// Whether a container at `location` is currently held open.
    pub fn is_container_open(&self, location: &str) -> bool {
        self.inner.lock().by_location.contains_key(location)
    }

    fn container_exists(&self, inner: &Inner, location: &str) -> bool {
        match self.persistence {
            Persistence::Disk => Path::new(location).exists(),
            Persistence::Volatile => inner.volatile.contains_key(location),
        }
    }

    fn load_image(&self, inner: &Inner, location: &str) -> Result<Image> {
        match self.persistence {
            Persistence::Disk => Image::load(Path::new(location)),
            Persistence::Volatile => inner
                .volatile
                .get(location)
                .cloned()
                .ok_or_else(|| StoreError::not_found(location)),
        }
    }

    fn persist(&self, volatile: &mut HashMap<String, Image>, c: &OpenContainer) -> Result<()> {
        match self.persistence {
            Persistence::Disk => c.image.save(Path::new(&c.location)),
            Persistence::Volatile => {
                volatile.insert(c.location.clone(), c.image.clone());
                Ok(())
            }
        }
    }
}

impl Default for NativeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NativeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("NativeStore")
            .field("persistence", &self.persistence)
            .field("open_handles", &inner.handles.len())
            .field("open_containers", &inner.containers.len())
            .finish()
    }
}

impl Inner {
    fn object(&self, hid: Hid) -> Result<&OpenObject> {
        self.handles.get(&hid).ok_or_else(|| StoreError::bad_handle(hid))
    }

    fn container(&self, id: ContainerId) -> Result<&OpenContainer> {
        self.containers
            .get(&id)
            .ok_or_else(|| StoreError::new(ErrorCode::BadHandle, "container already released"))
    }

    fn container_mut(&mut self, id: ContainerId) -> Result<&mut OpenContainer> {
        self.containers
            .get_mut(&id)
            .ok_or_else(|| StoreError::new(ErrorCode::BadHandle, "container already released"))
    }

    /// Resolve a handle usable as a link location (container, group or array).
    fn location(&self, hid: Hid) -> Result<(ContainerId, NodeId, bool)> {
        let obj = self.object(hid)?;
        let node = match obj.target {
            Target::Container => ROOT,
            Target::Group(n) | Target::Array(n) => n,
            Target::Attribute { .. } => {
                return Err(StoreError::new(
                    ErrorCode::BadHandle,
                    format!("handle {hid} is an attribute"),
                ))
            }
        };
        Ok((obj.container, node, obj.writable))
    }

    fn group_location(&self, hid: Hid) -> Result<(ContainerId, NodeId, bool)> {
        let obj = self.object(hid)?;
        match obj.target {
            Target::Container => Ok((obj.container, ROOT, obj.writable)),
            Target::Group(n) => Ok((obj.container, n, obj.writable)),
            _ => Err(StoreError::new(
                ErrorCode::BadHandle,
                format!("handle {hid} is not a group"),
            )),
        }
    }

    fn array_target(&self, hid: Hid) -> Result<(ContainerId, NodeId, bool)> {
        let obj = self.object(hid)?;
        match obj.target {
            Target::Array(n) => Ok((obj.container, n, obj.writable)),
            _ => Err(StoreError::new(
                ErrorCode::BadHandle,
                format!("handle {hid} is not an array"),
            )),
        }
    }

    fn attribute_target(&self, hid: Hid) -> Result<(ContainerId, NodeId, String, bool)> {
        let obj = self.object(hid)?;
        match &obj.target {
            Target::Attribute { node, name } => {
                Ok((obj.container, *node, name.clone(), obj.writable))
            }
            _ => Err(StoreError::new(
                ErrorCode::BadHandle,
                format!("handle {hid} is not an attribute"),
            )),
        }
    }

    fn register(&mut self, container: ContainerId, target: Target, writable: bool) -> Result<Hid> {
        let c = self.container_mut(container)?;
        c.refs += 1;
        c.writable |= writable;
        let hid = self.next_hid;
        self.next_hid += 1;
        self.handles.insert(
            hid,
            OpenObject {
                container,
                target,
                writable,
            },
        );
        trace!(hid, "handle opened");
        Ok(hid)
    }
}

impl NativeStore {
    /// Drop `hid` after checking its kind, finalizing the container when it
    /// was the last reference.
    fn release(&self, hid: Hid, expect: fn(&Target) -> bool, what: &str) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let obj = inner.object(hid)?;
        if !expect(&obj.target) {
            return Err(StoreError::new(
                ErrorCode::BadHandle,
                format!("handle {hid} is not {what}"),
            ));
        }
        let cid = obj.container;
        inner.handles.remove(&hid);
        trace!(hid, "handle closed");

        let c = inner.container_mut(cid)?;
        c.refs -= 1;
        if c.refs > 0 {
            return Ok(());
        }
        let mut c = match inner.containers.remove(&cid) {
            Some(c) => c,
            None => return Ok(()),
        };
        inner.by_location.remove(&c.location);
        c.image.compact();
        debug!(location = %c.location, "container released");
        if c.writable {
            self.persist(&mut inner.volatile, &c)?;
        }
        Ok(())
    }

    fn check_writable(writable: bool, what: &str) -> Result<()> {
        if writable {
            Ok(())
        } else {
            Err(StoreError::read_only(what))
        }
    }
}

impl ObjectStore for NativeStore {
    fn name(&self) -> &str {
        "native"
    }

    fn open_container(&self, location: &str, mode: OpenMode) -> Result<Hid> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(&cid) = inner.by_location.get(location) {
            return match mode {
                OpenMode::CreateExclusive => Err(StoreError::new(
                    ErrorCode::AlreadyExists,
                    format!("container '{location}' already exists"),
                )),
                OpenMode::CreateTruncate => Err(StoreError::new(
                    ErrorCode::Busy,
                    format!("container '{location}' is open and cannot be truncated"),
                )),
                OpenMode::ReadOnly | OpenMode::ReadWrite => {
                    debug!(location, ?mode, "container shared");
                    inner.register(cid, Target::Container, mode.is_writable())
                }
            };
        }

        let image = match mode {
            OpenMode::ReadOnly | OpenMode::ReadWrite => self.load_image(inner, location)?,
            OpenMode::CreateExclusive => {
                if self.container_exists(inner, location) {
                    return Err(StoreError::new(
                        ErrorCode::AlreadyExists,
                        format!("container '{location}' already exists"),
                    ));
                }
                Image::new()
            }
            OpenMode::CreateTruncate => Image::new(),
        };

        let cid = inner.next_container;
        inner.next_container += 1;
        inner.containers.insert(
            cid,
            OpenContainer {
                location: location.to_string(),
                image,
                refs: 0,
                writable: false,
            },
        );
        inner.by_location.insert(location.to_string(), cid);
        debug!(location, ?mode, "container opened");
        inner.register(cid, Target::Container, mode.is_writable())
    }

    fn close_container(&self, container: Hid) -> Result<()> {
        self.release(container, |t| matches!(t, Target::Container), "a container")
    }

    fn flush(&self, hid: Hid) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let cid = inner.object(hid)?.container;
        let c = inner
            .containers
            .get(&cid)
            .ok_or_else(|| StoreError::bad_handle(hid))?;
        if c.writable {
            self.persist(&mut inner.volatile, c)?;
        }
        Ok(())
    }

    fn root_group(&self, container: Hid) -> Result<Hid> {
        let mut inner = self.inner.lock();
        let obj = inner.object(container)?.clone();
        if obj.target != Target::Container {
            return Err(StoreError::new(
                ErrorCode::BadHandle,
                format!("handle {container} is not a container"),
            ));
        }
        inner.register(obj.container, Target::Group(ROOT), obj.writable)
    }

    fn is_writable(&self, hid: Hid) -> Result<bool> {
        Ok(self.inner.lock().object(hid)?.writable)
    }

    fn link_exists(&self, loc: Hid, path: &str) -> Result<bool> {
        let inner = self.inner.lock();
        let (cid, node, _) = inner.location(loc)?;
        let image = &inner.container(cid)?.image;
        match image.resolve(node, path) {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.code, ErrorCode::NotFound | ErrorCode::InvalidArgument) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn object_kind(&self, loc: Hid, path: &str) -> Result<ObjectKind> {
        let inner = self.inner.lock();
        let (cid, node, _) = inner.location(loc)?;
        let image = &inner.container(cid)?.image;
        let id = image.resolve(node, path)?;
        Ok(image.node(id)?.object_kind())
    }

    fn list_links(&self, group: Hid) -> Result<Vec<(String, ObjectKind)>> {
        let inner = self.inner.lock();
        let (cid, node, _) = inner.group_location(group)?;
        inner.container(cid)?.image.children(node)
    }

    fn unlink(&self, loc: Hid, path: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let (cid, node, writable) = inner.group_location(loc)?;
        Self::check_writable(writable, path)?;
        inner.container_mut(cid)?.image.unlink(node, path)
    }

    fn open_group(&self, loc: Hid, path: &str) -> Result<Hid> {
        let mut inner = self.inner.lock();
        let (cid, node, writable) = inner.location(loc)?;
        let image = &inner.container(cid)?.image;
        let id = image.resolve(node, path)?;
        if image.node(id)?.object_kind() != ObjectKind::Group {
            return Err(StoreError::invalid(format!("'{path}' is not a group")));
        }
        inner.register(cid, Target::Group(id), writable)
    }

    fn create_group(&self, loc: Hid, name: &str) -> Result<Hid> {
        let mut inner = self.inner.lock();
        let (cid, node, writable) = inner.group_location(loc)?;
        Self::check_writable(writable, name)?;
        let id = inner.container_mut(cid)?.image.insert(node, name, Node::group())?;
        debug!(name, "group created");
        inner.register(cid, Target::Group(id), writable)
    }

    fn close_group(&self, group: Hid) -> Result<()> {
        self.release(group, |t| matches!(t, Target::Group(_)), "a group")
    }

    fn open_array(&self, loc: Hid, path: &str) -> Result<Hid> {
        let mut inner = self.inner.lock();
        let (cid, node, writable) = inner.location(loc)?;
        let image = &inner.container(cid)?.image;
        let id = image.resolve(node, path)?;
        if image.node(id)?.object_kind() != ObjectKind::Array {
            return Err(StoreError::invalid(format!("'{path}' is not an array")));
        }
        inner.register(cid, Target::Array(id), writable)
    }

    fn create_array(
        &self,
        loc: Hid,
        name: &str,
        dtype: ElementType,
        dims: &[u64],
        maxdims: &[u64],
    ) -> Result<Hid> {
        check_single_segment(name)?;
        if dims.is_empty() || dims.len() != maxdims.len() {
            return Err(StoreError::invalid(format!(
                "'{name}': dims {dims:?} and maxdims {maxdims:?} disagree"
            )));
        }
        if let Some(d) = (0..dims.len()).find(|&d| maxdims[d] != UNLIMITED && dims[d] > maxdims[d])
        {
            return Err(StoreError::new(
                ErrorCode::OutOfBounds,
                format!("'{name}': dimension {d} exceeds its maximum"),
            ));
        }
        if dtype.size() == 0 {
            return Err(StoreError::invalid(format!("'{name}': zero-width element type")));
        }
        let len = buffer_len(dims, dtype.size())?;
        let mut inner = self.inner.lock();
        let (cid, node, writable) = inner.group_location(loc)?;
        Self::check_writable(writable, name)?;
        let data = ArrayData {
            dtype,
            dims: dims.to_vec(),
            maxdims: maxdims.to_vec(),
            data: vec![0u8; len],
        };
        let id = inner.container_mut(cid)?.image.insert(node, name, Node::array(data))?;
        debug!(name, %dtype, ?dims, "array created");
        inner.register(cid, Target::Array(id), writable)
    }

    fn close_array(&self, array: Hid) -> Result<()> {
        self.release(array, |t| matches!(t, Target::Array(_)), "an array")
    }

    fn array_info(&self, array: Hid) -> Result<ArrayInfo> {
        let inner = self.inner.lock();
        let (cid, node, _) = inner.array_target(array)?;
        let a = inner.container(cid)?.image.array(node)?;
        Ok(ArrayInfo {
            dtype: a.dtype,
            dims: a.dims.clone(),
            maxdims: a.maxdims.clone(),
        })
    }

    fn read_selection(&self, array: Hid, selection: &Selection) -> Result<Vec<u8>> {
        let inner = self.inner.lock();
        let (cid, node, _) = inner.array_target(array)?;
        let a = inner.container(cid)?.image.array(node)?;
        selection.validate(&a.dims)?;
        let size = a.dtype.size();
        let offsets = selection.offsets(&a.dims);
        let mut out = Vec::with_capacity(offsets.len() * size);
        for off in offsets {
            out.extend_from_slice(&a.data[off * size..(off + 1) * size]);
        }
        Ok(out)
    }

    fn write_selection(&self, array: Hid, selection: &Selection, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let (cid, node, writable) = inner.array_target(array)?;
        Self::check_writable(writable, "write")?;
        let a = inner.container_mut(cid)?.image.array_mut(node)?;
        selection.validate(&a.dims)?;
        let size = a.dtype.size();
        let offsets = selection.offsets(&a.dims);
        if data.len() != offsets.len() * size {
            return Err(StoreError::invalid(format!(
                "buffer of {} bytes for {} elements of {} bytes",
                data.len(),
                offsets.len(),
                size
            )));
        }
        for (chunk, off) in data.chunks_exact(size).zip(offsets) {
            a.data[off * size..(off + 1) * size].copy_from_slice(chunk);
        }
        Ok(())
    }

    fn resize_array(&self, array: Hid, dims: &[u64]) -> Result<()> {
        let mut inner = self.inner.lock();
        let (cid, node, writable) = inner.array_target(array)?;
        Self::check_writable(writable, "resize")?;
        let a = inner.container_mut(cid)?.image.array_mut(node)?;
        if dims.len() != a.dims.len() {
            return Err(StoreError::invalid(format!(
                "resize to rank {} of a rank-{} array",
                dims.len(),
                a.dims.len()
            )));
        }
        for (d, (&new, &max)) in dims.iter().zip(&a.maxdims).enumerate() {
            if max != UNLIMITED && new > max {
                return Err(StoreError::new(
                    ErrorCode::OutOfBounds,
                    format!("dimension {d}: {new} exceeds maximum {max}"),
                ));
            }
        }
        a.data = reshape_preserving(&a.data, &a.dims, dims, a.dtype.size())?;
        a.dims = dims.to_vec();
        Ok(())
    }

    fn attribute_exists(&self, loc: Hid, name: &str) -> Result<bool> {
        let inner = self.inner.lock();
        let (cid, node, _) = inner.location(loc)?;
        Ok(inner.container(cid)?.image.node(node)?.attrs.contains_key(name))
    }

    fn list_attributes(&self, loc: Hid) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let (cid, node, _) = inner.location(loc)?;
        Ok(inner.container(cid)?.image.node(node)?.attrs.keys().cloned().collect())
    }

    fn open_attribute(&self, loc: Hid, name: &str) -> Result<Hid> {
        let mut inner = self.inner.lock();
        let (cid, node, writable) = inner.location(loc)?;
        if !inner.container(cid)?.image.node(node)?.attrs.contains_key(name) {
            return Err(StoreError::new(
                ErrorCode::NotFound,
                format!("no attribute '{name}'"),
            ));
        }
        let target = Target::Attribute {
            node,
            name: name.to_string(),
        };
        inner.register(cid, target, writable)
    }

    fn create_attribute(
        &self,
        loc: Hid,
        name: &str,
        dtype: ElementType,
        value: Option<&[u8]>,
    ) -> Result<Hid> {
        check_single_segment(name)?;
        let data = match value {
            Some(v) if v.len() != dtype.size() => {
                return Err(StoreError::invalid(format!(
                    "attribute '{name}' holds {} bytes, got {}",
                    dtype.size(),
                    v.len()
                )))
            }
            Some(v) => v.to_vec(),
            None => vec![0u8; dtype.size()],
        };
        let mut inner = self.inner.lock();
        let (cid, node, writable) = inner.location(loc)?;
        Self::check_writable(writable, name)?;
        let attrs = &mut inner.container_mut(cid)?.image.node_mut(node)?.attrs;
        if attrs.contains_key(name) {
            return Err(StoreError::new(
                ErrorCode::AlreadyExists,
                format!("attribute '{name}' already exists"),
            ));
        }
        attrs.insert(
            name.to_string(),
            crate::image::AttrSlot { dtype, data },
        );
        debug!(name, %dtype, "attribute created");
        let target = Target::Attribute {
            node,
            name: name.to_string(),
        };
        inner.register(cid, target, writable)
    }

    fn attribute_type(&self, attr: Hid) -> Result<ElementType> {
        let inner = self.inner.lock();
        let (cid, node, name, _) = inner.attribute_target(attr)?;
        let slot = inner
            .container(cid)?
            .image
            .node(node)?
            .attrs
            .get(&name)
            .ok_or_else(|| StoreError::not_found(&name))?;
        Ok(slot.dtype)
    }

    fn read_attribute(&self, attr: Hid) -> Result<Vec<u8>> {
        let inner = self.inner.lock();
        let (cid, node, name, _) = inner.attribute_target(attr)?;
        let slot = inner
            .container(cid)?
            .image
            .node(node)?
            .attrs
            .get(&name)
            .ok_or_else(|| StoreError::not_found(&name))?;
        Ok(slot.data.clone())
    }

    fn write_attribute(&self, attr: Hid, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let (cid, node, name, writable) = inner.attribute_target(attr)?;
        Self::check_writable(writable, &name)?;
        let slot = inner
            .container_mut(cid)?
            .image
            .node_mut(node)?
            .attrs
            .get_mut(&name)
            .ok_or_else(|| StoreError::not_found(&name))?;
        if data.len() != slot.dtype.size() {
            return Err(StoreError::invalid(format!(
                "attribute '{name}' holds {} bytes, got {}",
                slot.dtype.size(),
                data.len()
            )));
        }
        slot.data.copy_from_slice(data);
        Ok(())
    }

    fn close_attribute(&self, attr: Hid) -> Result<()> {
        self.release(attr, |t| matches!(t, Target::Attribute { .. }), "an attribute")
    }
}

//! In-memory node tree of one container and its on-disk encoding.
//!
//! A container image is a flat table of nodes keyed by id; groups hold
//! name-ordered links to child ids. On disk an image is the 8-byte
//! signature followed by the bincode encoding of the table.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, Result, StoreError};
use crate::selection::row_major_strides;
use crate::types::{ElementType, ObjectKind};

/// File signature written before every encoded image.
pub(crate) const SIGNATURE: [u8; 8] = *b"\x89RHB\r\n\x1a\n";

pub(crate) type NodeId = u64;

/// Id of the root group in every image.
pub(crate) const ROOT: NodeId = 0;

/// Largest array payload a single node may hold, in bytes.
pub const MAX_ARRAY_BYTES: u64 = 1 << 32;

/// Byte length of a row-major buffer of `dims` elements of `elem_size`.
///
/// Fails with `OutOfBounds` when the count overflows or the payload would
/// exceed [`MAX_ARRAY_BYTES`].
pub(crate) fn buffer_len(dims: &[u64], elem_size: usize) -> Result<usize> {
    let too_large = || {
        StoreError::new(
            ErrorCode::OutOfBounds,
            format!("extent {dims:?} exceeds the {MAX_ARRAY_BYTES}-byte array limit"),
        )
    };
    let bytes = dims
        .iter()
        .try_fold(elem_size as u64, |acc, &d| acc.checked_mul(d))
        .filter(|&b| b <= MAX_ARRAY_BYTES)
        .ok_or_else(too_large)?;
    usize::try_from(bytes).map_err(|_| too_large())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AttrSlot {
    pub dtype: ElementType,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ArrayData {
    pub dtype: ElementType,
    pub dims: Vec<u64>,
    pub maxdims: Vec<u64>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum NodeKind {
    Group { links: BTreeMap<String, NodeId> },
    Array(ArrayData),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub attrs: BTreeMap<String, AttrSlot>,
}

impl Node {
    pub fn group() -> Self {
        Node {
            kind: NodeKind::Group {
                links: BTreeMap::new(),
            },
            attrs: BTreeMap::new(),
        }
    }

    pub fn array(data: ArrayData) -> Self {
        Node {
            kind: NodeKind::Array(data),
            attrs: BTreeMap::new(),
        }
    }

    pub fn object_kind(&self) -> ObjectKind {
        match self.kind {
            NodeKind::Group { .. } => ObjectKind::Group,
            NodeKind::Array(_) => ObjectKind::Array,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Image {
    nodes: HashMap<NodeId, Node>,
    next_id: NodeId,
}

impl Image {
    /// An image holding only an empty root group.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT, Node::group());
        Image {
            nodes,
            next_id: ROOT + 1,
        }
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| StoreError::new(ErrorCode::Corrupt, format!("dangling node {id}")))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| StoreError::new(ErrorCode::Corrupt, format!("dangling node {id}")))
    }

    pub fn array(&self, id: NodeId) -> Result<&ArrayData> {
        match &self.node(id)?.kind {
            NodeKind::Array(a) => Ok(a),
            NodeKind::Group { .. } => Err(StoreError::invalid(format!("node {id} is a group"))),
        }
    }

    pub fn array_mut(&mut self, id: NodeId) -> Result<&mut ArrayData> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Array(a) => Ok(a),
            NodeKind::Group { .. } => Err(StoreError::invalid(format!("node {id} is a group"))),
        }
    }

    fn links(&self, id: NodeId) -> Result<&BTreeMap<String, NodeId>> {
        match &self.node(id)?.kind {
            NodeKind::Group { links } => Ok(links),
            NodeKind::Array(_) => Err(StoreError::invalid(format!("node {id} is not a group"))),
        }
    }

    /// Sorted `(name, kind)` pairs of the direct children of a group.
    pub fn children(&self, id: NodeId) -> Result<Vec<(String, ObjectKind)>> {
        let links = self.links(id)?;
        links
            .iter()
            .map(|(name, child)| Ok((name.clone(), self.node(*child)?.object_kind())))
            .collect()
    }

    /// Resolve a relative, slash-separated path starting at `from`.
    pub fn resolve(&self, from: NodeId, path: &str) -> Result<NodeId> {
        let mut current = from;
        for segment in split_path(path)? {
            let links = match &self.node(current)?.kind {
                NodeKind::Group { links } => links,
                NodeKind::Array(_) => return Err(StoreError::not_found(path)),
            };
            current = *links.get(segment).ok_or_else(|| StoreError::not_found(path))?;
        }
        Ok(current)
    }

    /// Link a new node under `parent` with a single-segment `name`.
    pub fn insert(&mut self, parent: NodeId, name: &str, node: Node) -> Result<NodeId> {
        check_single_segment(name)?;
        let id = self.next_id;
        match &mut self.node_mut(parent)?.kind {
            NodeKind::Group { links } => {
                if links.contains_key(name) {
                    return Err(StoreError::new(
                        ErrorCode::AlreadyExists,
                        format!("link '{name}' already exists"),
                    ));
                }
                links.insert(name.to_string(), id);
            }
            NodeKind::Array(_) => {
                return Err(StoreError::invalid(format!(
                    "cannot create '{name}' below an array"
                )))
            }
        }
        self.nodes.insert(id, node);
        self.next_id += 1;
        Ok(id)
    }

    /// Remove the link at `path`. The node itself stays in the table until
    /// the next [`Image::compact`].
    pub fn unlink(&mut self, from: NodeId, path: &str) -> Result<()> {
        let (parent_path, name) = match path.rsplit_once('/') {
            Some((p, n)) => (p, n),
            None => ("", path),
        };
        let parent = if parent_path.is_empty() {
            from
        } else {
            self.resolve(from, parent_path)?
        };
        match &mut self.node_mut(parent)?.kind {
            NodeKind::Group { links } => links
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| StoreError::not_found(path)),
            NodeKind::Array(_) => Err(StoreError::not_found(path)),
        }
    }

    /// Drop nodes no longer reachable from the root.
    pub fn compact(&mut self) {
        let mut reachable = HashSet::new();
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(Node {
                kind: NodeKind::Group { links },
                ..
            }) = self.nodes.get(&id)
            {
                stack.extend(links.values().copied());
            }
        }
        self.nodes.retain(|id, _| reachable.contains(id));
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = SIGNATURE.to_vec();
        out.extend(bincode::serialize(self)?);
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < SIGNATURE.len() || data[..SIGNATURE.len()] != SIGNATURE {
            return Err(StoreError::new(
                ErrorCode::Corrupt,
                "container signature not found",
            ));
        }
        let image: Image = bincode::deserialize(&data[SIGNATURE.len()..])?;
        if !image.nodes.contains_key(&ROOT) {
            return Err(StoreError::new(ErrorCode::Corrupt, "image has no root group"));
        }
        Ok(image)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

/// Split a relative path into segments, rejecting empty segments.
pub(crate) fn split_path(path: &str) -> Result<Vec<&str>> {
    if path.is_empty() {
        return Err(StoreError::not_found("<empty path>"));
    }
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::invalid(format!("malformed path '{path}'")));
    }
    Ok(segments)
}

pub(crate) fn check_single_segment(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(StoreError::invalid(format!(
            "'{name}' is not a single link name"
        )));
    }
    Ok(())
}

/// Copy the overlapping region of a row-major buffer into a buffer of a new
/// shape; cells outside the old extent are zero.
pub(crate) fn reshape_preserving(
    data: &[u8],
    old_dims: &[u64],
    new_dims: &[u64],
    elem_size: usize,
) -> Result<Vec<u8>> {
    let mut out = vec![0u8; buffer_len(new_dims, elem_size)?];
    let common: Vec<u64> = old_dims
        .iter()
        .zip(new_dims)
        .map(|(&a, &b)| a.min(b))
        .collect();
    let count: u64 = common.iter().product();
    if count == 0 {
        return Ok(out);
    }
    let old_strides = row_major_strides(old_dims);
    let new_strides = row_major_strides(new_dims);
    let rank = common.len();
    let mut coord = vec![0u64; rank];
    for _ in 0..count {
        let src: u64 = coord.iter().zip(&old_strides).map(|(c, s)| c * s).sum();
        let dst: u64 = coord.iter().zip(&new_strides).map(|(c, s)| c * s).sum();
        let (src, dst) = (src as usize * elem_size, dst as usize * elem_size);
        out[dst..dst + elem_size].copy_from_slice(&data[src..src + elem_size]);
        for d in (0..rank).rev() {
            coord[d] += 1;
            if coord[d] < common[d] {
                break;
            }
            coord[d] = 0;
        }
    }
    Ok(out)
}

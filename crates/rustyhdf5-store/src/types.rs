//! Element types, open modes and node descriptions shared by every store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum-dimension marker for an axis that may grow without bound.
pub const UNLIMITED: u64 = u64::MAX;

/// Opaque identifier of an open store object. Valid ids are positive.
pub type Hid = i64;

/// Element type of an array or attribute.
///
/// The set is closed: 8/32/64-bit signed integers, single and double
/// precision floats, and fixed-width byte strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    I8,
    I32,
    I64,
    F32,
    F64,
    /// NUL-padded string occupying exactly `width` bytes per element.
    FixedString { width: usize },
}

impl ElementType {
    /// Bytes occupied by one element.
    pub fn size(&self) -> usize {
        match self {
            ElementType::I8 => 1,
            ElementType::I32 | ElementType::F32 => 4,
            ElementType::I64 | ElementType::F64 => 8,
            ElementType::FixedString { width } => *width,
        }
    }

    /// True when both types belong to the same class, ignoring string width.
    pub fn same_class(&self, other: &ElementType) -> bool {
        match (self, other) {
            (ElementType::FixedString { .. }, ElementType::FixedString { .. }) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::I8 => write!(f, "i8"),
            ElementType::I32 => write!(f, "i32"),
            ElementType::I64 => write!(f, "i64"),
            ElementType::F32 => write!(f, "f32"),
            ElementType::F64 => write!(f, "f64"),
            ElementType::FixedString { width } => write!(f, "string[{width}]"),
        }
    }
}

/// How a container is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Open an existing container for reading.
    ReadOnly,
    /// Open an existing container for reading and writing.
    ReadWrite,
    /// Create a new container; fail if one already exists.
    CreateExclusive,
    /// Create a new container, discarding any existing one.
    CreateTruncate,
}

impl OpenMode {
    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }

    pub fn creates(self) -> bool {
        matches!(self, OpenMode::CreateExclusive | OpenMode::CreateTruncate)
    }
}

/// Kind of object a link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Group,
    Array,
}

/// Type and dataspace of an open array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayInfo {
    pub dtype: ElementType,
    /// Current dimension sizes.
    pub dims: Vec<u64>,
    /// Per-axis ceilings; [`UNLIMITED`] marks an unbounded axis.
    pub maxdims: Vec<u64>,
}

impl ArrayInfo {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Element count, saturating at `u64::MAX`.
    pub fn num_elements(&self) -> u64 {
        self.dims.iter().fold(1u64, |acc, &d| acc.saturating_mul(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_sizes() {
        assert_eq!(ElementType::I8.size(), 1);
        assert_eq!(ElementType::F32.size(), 4);
        assert_eq!(ElementType::I64.size(), 8);
        assert_eq!(ElementType::FixedString { width: 16 }.size(), 16);
    }

    #[test]
    fn string_class_ignores_width() {
        let a = ElementType::FixedString { width: 8 };
        let b = ElementType::FixedString { width: 256 };
        assert!(a.same_class(&b));
        assert!(!ElementType::I32.same_class(&ElementType::I64));
    }

    #[test]
    fn display_names() {
        assert_eq!(ElementType::F64.to_string(), "f64");
        assert_eq!(ElementType::FixedString { width: 4 }.to_string(), "string[4]");
    }
}

//! Declared object shapes.
//!
//! A [`Schema`] is an ordered list of fields plus group-level attribute
//! bindings. Fields are declared through [`SchemaBuilder::field`], which
//! returns a typed [`FieldKey`] used to fetch the bound dataset later.
//!
//! ```
//! use rustyhdf5_bind::{AttributeBinding, FieldOptions, Schema};
//!
//! let mut b = Schema::builder();
//! let temps = b.field::<f64, 2>(
//!     "temperature",
//!     FieldOptions::new().shape(&[200, 5]).max_shape(&[-1, 5]),
//! );
//! let names = b.field::<String, 1>("names", FieldOptions::new().shape(&[5]));
//! b.attribute(AttributeBinding::new("counter").with_default(42i32));
//! let schema = b.build().unwrap();
//! assert_eq!(schema.fields().len(), 2);
//! # let _ = (temps, names);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use rustyhdf5_store::ElementType;

use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::types::{AttrValue, Element};

/// Typed reference to a declared field.
pub struct FieldKey<T, const R: usize> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T, const R: usize> FieldKey<T, R> {
    /// Position of the field in declaration order.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T, const R: usize> Clone for FieldKey<T, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, const R: usize> Copy for FieldKey<T, R> {}

impl<T, const R: usize> fmt::Debug for FieldKey<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldKey({}, rank {R})", self.index)
    }
}

/// A metadata entry to open or create.
///
/// With neither a type nor a default the attribute is only opened when
/// present.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeBinding {
    pub name: String,
    pub element_type: Option<ElementType>,
    pub default: Option<AttrValue>,
}

impl AttributeBinding {
    pub fn new(name: impl Into<String>) -> Self {
        AttributeBinding {
            name: name.into(),
            element_type: None,
            default: None,
        }
    }

    pub fn with_type(mut self, element_type: ElementType) -> Self {
        self.element_type = Some(element_type);
        self
    }

    pub fn with_default(mut self, value: impl Into<AttrValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Type to verify against or create with, if one was declared.
    pub fn declared_type(&self, string_width: usize) -> Option<ElementType> {
        self.element_type
            .or_else(|| self.default.as_ref().map(|d| d.element_type(string_width)))
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(Error::Argument(format!(
                "invalid attribute name '{}'",
                self.name
            )));
        }
        if let (Some(ty), Some(default)) = (&self.element_type, &self.default) {
            if !ty.same_class(&default.element_type(1)) {
                return Err(Error::TypeMismatch {
                    expected: ty.to_string(),
                    actual: default.element_type(1).to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Per-field overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldOptions {
    /// Path relative to the bound group; defaults to the field name.
    pub location: Option<String>,
    /// Dimensions on create; defaults to one along every axis.
    pub initial_shape: Option<Vec<u64>>,
    /// Resize ceiling; negative entries are unlimited. Defaults to
    /// unlimited along every axis.
    pub max_shape: Option<Vec<i64>>,
    /// Never create this field; leave it unbound when absent.
    pub readonly: bool,
    pub attributes: Vec<AttributeBinding>,
    /// String width in bytes for string fields.
    pub string_width: Option<usize>,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location(mut self, path: impl Into<String>) -> Self {
        self.location = Some(path.into());
        self
    }

    pub fn shape(mut self, dims: &[u64]) -> Self {
        self.initial_shape = Some(dims.to_vec());
        self
    }

    pub fn max_shape(mut self, maxdims: &[i64]) -> Self {
        self.max_shape = Some(maxdims.to_vec());
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn attribute(mut self, binding: AttributeBinding) -> Self {
        self.attributes.push(binding);
        self
    }

    pub fn string_width(mut self, width: usize) -> Self {
        self.string_width = Some(width);
        self
    }
}

/// One declared field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    rank: usize,
    type_name: &'static str,
    make_type: fn(usize) -> ElementType,
    options: FieldOptions,
}

impl FieldDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn location(&self) -> &str {
        self.options.location.as_deref().unwrap_or(&self.name)
    }

    pub fn readonly(&self) -> bool {
        self.options.readonly
    }

    pub fn attributes(&self) -> &[AttributeBinding] {
        &self.options.attributes
    }

    pub fn options(&self) -> &FieldOptions {
        &self.options
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Element type for a newly created node.
    pub fn element_type(&self, default_string_width: usize) -> ElementType {
        (self.make_type)(self.options.string_width.unwrap_or(default_string_width))
    }

    /// Whether a stored node of type `ty` can back this field.
    pub fn accepts(&self, ty: &ElementType) -> bool {
        ty.same_class(&(self.make_type)(1))
    }

    /// Extent for a newly created node.
    pub fn extent(&self) -> Result<Extent> {
        let dims = self
            .options
            .initial_shape
            .clone()
            .unwrap_or_else(|| vec![1; self.rank]);
        Extent::new(self.rank, &dims, self.options.max_shape.as_deref())
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Argument("field name must not be empty".into()));
        }
        if !(1..=3).contains(&self.rank) {
            return Err(Error::Argument(format!(
                "field '{}': rank {} is not 1, 2 or 3",
                self.name, self.rank
            )));
        }
        let location = self.location();
        if location.is_empty() || location.split('/').any(str::is_empty) {
            return Err(Error::Argument(format!(
                "field '{}': malformed location '{location}'",
                self.name
            )));
        }
        if self.options.string_width == Some(0) {
            return Err(Error::Argument(format!(
                "field '{}': string width must be at least 1",
                self.name
            )));
        }
        self.extent()?;
        check_unique(self.attributes())
    }
}

fn check_unique(bindings: &[AttributeBinding]) -> Result<()> {
    let mut seen = HashSet::new();
    for b in bindings {
        b.validate()?;
        if !seen.insert(b.name.as_str()) {
            return Err(Error::Argument(format!("attribute '{}' declared twice", b.name)));
        }
    }
    Ok(())
}

/// A validated, ordered set of field declarations.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
    attributes: Vec<AttributeBinding>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Group-level attribute bindings.
    pub fn attributes(&self) -> &[AttributeBinding] {
        &self.attributes
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDescriptor>,
    attributes: Vec<AttributeBinding>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field of element type `T` and rank `R`.
    pub fn field<T: Element, const R: usize>(
        &mut self,
        name: impl Into<String>,
        options: FieldOptions,
    ) -> FieldKey<T, R> {
        let index = self.fields.len();
        self.fields.push(FieldDescriptor {
            name: name.into(),
            rank: R,
            type_name: T::NAME,
            make_type: T::element_type,
            options,
        });
        FieldKey {
            index,
            _marker: PhantomData,
        }
    }

    /// Declare an attribute on the bound group itself.
    pub fn attribute(&mut self, binding: AttributeBinding) -> &mut Self {
        self.attributes.push(binding);
        self
    }

    pub fn build(self) -> Result<Schema> {
        let mut names = HashSet::new();
        let mut locations = HashSet::new();
        for f in &self.fields {
            f.validate()?;
            if !names.insert(f.name.as_str()) {
                return Err(Error::Argument(format!("field '{}' declared twice", f.name)));
            }
            if !locations.insert(f.location()) {
                return Err(Error::Argument(format!(
                    "location '{}' is bound by two fields",
                    f.location()
                )));
            }
        }
        check_unique(&self.attributes)?;
        Ok(Schema {
            fields: self.fields,
            attributes: self.attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyhdf5_store::UNLIMITED;

    #[test]
    fn defaults() {
        let mut b = Schema::builder();
        let key = b.field::<i32, 2>("grid", FieldOptions::new());
        let schema = b.build().unwrap();
        let f = &schema.fields()[key.index()];
        assert_eq!(f.location(), "grid");
        let e = f.extent().unwrap();
        assert_eq!(e.dims(), &[1, 1]);
        assert_eq!(e.maxdims(), &[UNLIMITED, UNLIMITED]);
        assert_eq!(f.element_type(256), ElementType::I32);
        assert!(!f.readonly());
    }

    #[test]
    fn string_width_override() {
        let mut b = Schema::builder();
        b.field::<String, 1>("a", FieldOptions::new());
        b.field::<String, 1>("b", FieldOptions::new().string_width(12));
        let schema = b.build().unwrap();
        assert_eq!(
            schema.field("a").unwrap().element_type(256),
            ElementType::FixedString { width: 256 }
        );
        assert_eq!(
            schema.field("b").unwrap().element_type(256),
            ElementType::FixedString { width: 12 }
        );
        assert!(schema
            .field("b")
            .unwrap()
            .accepts(&ElementType::FixedString { width: 3 }));
    }

    #[test]
    fn shape_rank_must_match() {
        let mut b = Schema::builder();
        b.field::<f64, 2>("t", FieldOptions::new().shape(&[3]));
        assert!(matches!(b.build(), Err(Error::RankMismatch { .. })));

        let mut b = Schema::builder();
        b.field::<f64, 2>("t", FieldOptions::new().max_shape(&[3, 3, 3]));
        assert!(matches!(b.build(), Err(Error::RankMismatch { .. })));
    }

    #[test]
    fn rejects_bad_declarations() {
        let mut b = Schema::builder();
        b.field::<i8, 1>("x", FieldOptions::new());
        b.field::<i8, 1>("x", FieldOptions::new());
        assert!(matches!(b.build(), Err(Error::Argument(_))));

        let mut b = Schema::builder();
        b.field::<i8, 1>("x", FieldOptions::new().location("/abs"));
        assert!(matches!(b.build(), Err(Error::Argument(_))));

        let mut b = Schema::builder();
        b.field::<i8, 4>("x", FieldOptions::new());
        assert!(matches!(b.build(), Err(Error::Argument(_))));

        let mut b = Schema::builder();
        b.attribute(AttributeBinding::new("a").with_type(ElementType::F64).with_default(1i32));
        assert!(matches!(b.build(), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn declared_attribute_type() {
        let a = AttributeBinding::new("units").with_default("m");
        assert_eq!(a.declared_type(8), Some(ElementType::FixedString { width: 8 }));
        assert_eq!(AttributeBinding::new("x").declared_type(8), None);
        let t = AttributeBinding::new("x").with_type(ElementType::I64);
        assert_eq!(t.declared_type(8), Some(ElementType::I64));
    }
}

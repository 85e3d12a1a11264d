//! Applying a [`Schema`] to a [`Group`].
//!
//! For each field, in declaration order, the engine opens the node at the
//! field's location if it exists and creates it otherwise. Field-level and
//! group-level attribute bindings are resolved the same way. If any step
//! fails, every handle opened during that pass is released before the error
//! is returned.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::attribute::{Attribute, AttributeOwner};
use crate::config::{BindConfig, MissingPolicy};
use crate::dataset::{Dataset, DatasetHandle};
use crate::error::{Error, Result};
use crate::group::Group;
use crate::schema::{AttributeBinding, FieldDescriptor, FieldKey, Schema};
use crate::types::Element;

/// Lifecycle of a [`BoundObject`].
///
/// A bind starts `Unbound`, moves to `Resolving` and ends in `Bound` or
/// `Failed`. [`BindingEngine::bind`] only hands out `Bound` objects; a
/// `Failed` object has its handles released and is dropped before the
/// error is returned, so the other states only show up in trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    Unbound,
    Resolving,
    Bound,
    Failed,
}

/// Resolves schemas against groups.
///
/// By default the engine follows the [`BindConfig`] of the group it binds
/// into, which is the one given to [`Container::open_with_config`].
/// [`BindingEngine::new`] pins a config that overrides the group's.
///
/// [`Container::open_with_config`]: crate::container::Container::open_with_config
#[derive(Debug, Clone, Default)]
pub struct BindingEngine {
    config: Option<Arc<BindConfig>>,
}

impl BindingEngine {
    pub fn new(config: BindConfig) -> Self {
        BindingEngine {
            config: Some(Arc::new(config)),
        }
    }

    /// The pinned config, if any.
    pub fn config(&self) -> Option<&BindConfig> {
        self.config.as_deref()
    }

    /// Open or create every field and attribute of `schema` under `group`.
    pub fn bind(&self, schema: &Schema, group: &Group) -> Result<BoundObject> {
        let config = self.config().unwrap_or_else(|| group.config());
        let mut bound = BoundObject::new(schema);
        bound.state = BindState::Resolving;
        tracing::debug!(group = group.path(), fields = schema.fields().len(), "binding schema");

        match (Resolver { config }).resolve(schema, group, &mut bound) {
            Ok(()) => {
                bound.state = BindState::Bound;
                Ok(bound)
            }
            Err(e) => {
                bound.state = BindState::Failed;
                if let Err(release) = bound.release_all() {
                    tracing::warn!(error = %release, "failed to release partially bound handles");
                }
                tracing::debug!(
                    group = group.path(),
                    error = %e,
                    state = ?bound.state,
                    "binding failed"
                );
                Err(e)
            }
        }
    }
}

/// One binding pass under a fixed config.
struct Resolver<'a> {
    config: &'a BindConfig,
}

impl Resolver<'_> {
    fn resolve(&self, schema: &Schema, group: &Group, bound: &mut BoundObject) -> Result<()> {
        let writable = group.is_writable()?;
        for (index, field) in schema.fields().iter().enumerate() {
            let Some(ds) = self.resolve_field(field, group, writable)? else {
                continue;
            };
            // Store first so a failing attribute still releases the array.
            let ds = bound.fields[index].insert(ds);
            for binding in field.attributes() {
                if let Some(attr) = self.resolve_attribute(&*ds, binding, writable)? {
                    bound.field_attributes[index].insert(binding.name.clone(), attr);
                }
            }
        }
        for binding in schema.attributes() {
            if let Some(attr) = self.resolve_attribute(group, binding, writable)? {
                bound.attributes.insert(binding.name.clone(), attr);
            }
        }
        Ok(())
    }

    fn resolve_field(
        &self,
        field: &FieldDescriptor,
        group: &Group,
        writable: bool,
    ) -> Result<Option<DatasetHandle>> {
        let key = field.location();
        if group.exists(key)? {
            let ds = group.open_dataset(key)?;
            if self.config.verify_existing {
                verify(field, &ds)?;
            }
            tracing::debug!(field = field.name(), path = ds.path(), "opened existing field");
            return Ok(Some(ds));
        }
        if field.readonly() {
            tracing::debug!(field = field.name(), "absent read-only field left unbound");
            return Ok(None);
        }
        if !writable {
            return match self.config.missing_on_readonly {
                MissingPolicy::Skip => {
                    tracing::debug!(field = field.name(), "group is read-only, field left unbound");
                    Ok(None)
                }
                MissingPolicy::Fail => Err(Error::InvalidState(format!(
                    "cannot create field '{}' under read-only group '{}'",
                    field.name(),
                    group.path()
                ))),
            };
        }

        let (parent, leaf) = self.parent_of(group, key)?;
        let extent = field.extent()?;
        let dtype = field.element_type(self.config.default_string_width);
        let ds = parent.create_array(leaf, &extent, dtype)?;
        tracing::debug!(field = field.name(), path = ds.path(), "created field");
        Ok(Some(ds))
    }

    /// Group that will hold `key`, and the final path segment.
    fn parent_of<'k>(&self, group: &Group, key: &'k str) -> Result<(Group, &'k str)> {
        let Some((parent_path, leaf)) = key.rsplit_once('/') else {
            return Ok((group.clone(), key));
        };
        if group.exists(parent_path)? {
            return Ok((group.open_group(parent_path)?, leaf));
        }
        if !self.config.create_intermediate_groups {
            return Err(Error::InvalidState(format!(
                "parent '{parent_path}' of '{key}' does not exist; create each level first"
            )));
        }
        let mut current = group.clone();
        for segment in parent_path.split('/') {
            current = current.subgroup(segment, true)?;
        }
        Ok((current, leaf))
    }

    fn resolve_attribute(
        &self,
        owner: &impl AttributeOwner,
        binding: &AttributeBinding,
        writable: bool,
    ) -> Result<Option<Attribute>> {
        let declared = binding.declared_type(self.config.default_string_width);
        if owner.has_attribute(&binding.name)? {
            let attr = owner.attribute(&binding.name)?;
            if let Some(ty) = declared {
                if !ty.same_class(&attr.element_type()) {
                    return Err(Error::TypeMismatch {
                        expected: ty.to_string(),
                        actual: attr.element_type().to_string(),
                    });
                }
            }
            return Ok(Some(attr));
        }
        let Some(ty) = declared else {
            return Ok(None);
        };
        if !writable {
            tracing::debug!(name = %binding.name, "node is read-only, attribute left unbound");
            return Ok(None);
        }
        owner
            .set_attribute(&binding.name, ty, binding.default.as_ref())
            .map(Some)
    }
}

fn verify(field: &FieldDescriptor, ds: &DatasetHandle) -> Result<()> {
    let info = ds.info()?;
    if info.rank() != field.rank() {
        return Err(Error::RankMismatch {
            expected: field.rank(),
            actual: info.rank(),
        });
    }
    if !field.accepts(&info.dtype) {
        return Err(Error::TypeMismatch {
            expected: field.type_name().to_string(),
            actual: info.dtype.to_string(),
        });
    }
    Ok(())
}

/// The handles produced by binding a schema. Owns every handle it holds;
/// closing or dropping it releases each exactly once.
#[derive(Debug)]
pub struct BoundObject {
    state: BindState,
    names: Vec<String>,
    fields: Vec<Option<DatasetHandle>>,
    field_attributes: Vec<BTreeMap<String, Attribute>>,
    attributes: BTreeMap<String, Attribute>,
}

impl BoundObject {
    fn new(schema: &Schema) -> Self {
        let n = schema.fields().len();
        BoundObject {
            state: BindState::Unbound,
            names: schema.fields().iter().map(|f| f.name().to_string()).collect(),
            fields: vec![None; n],
            field_attributes: vec![BTreeMap::new(); n],
            attributes: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> BindState {
        self.state
    }

    /// The typed dataset for `key`, or `None` if the field was left unbound.
    pub fn get<T: Element, const R: usize>(&self, key: &FieldKey<T, R>) -> Option<Dataset<T, R>> {
        self.fields
            .get(key.index())?
            .as_ref()
            .map(|h| Dataset::from_handle(h.clone()))
    }

    fn position(&self, field: &str) -> Option<usize> {
        self.names.iter().position(|n| n == field)
    }

    pub fn dataset(&self, field: &str) -> Option<&DatasetHandle> {
        self.fields.get(self.position(field)?)?.as_ref()
    }

    pub fn is_bound(&self, field: &str) -> bool {
        self.dataset(field).is_some()
    }

    /// Group-level attribute.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn field_attribute(&self, field: &str, name: &str) -> Option<&Attribute> {
        self.field_attributes.get(self.position(field)?)?.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Release every owned handle. Safe to call repeatedly and after
    /// individual handles were closed by the caller.
    pub fn close(&mut self) -> Result<()> {
        self.release_all()
    }

    fn release_all(&mut self) -> Result<()> {
        let mut first_error = None;
        let attrs = self
            .field_attributes
            .iter()
            .flat_map(BTreeMap::values)
            .chain(self.attributes.values())
            .map(Attribute::close);
        let arrays = self.fields.iter().flatten().map(DatasetHandle::close);
        for result in attrs.chain(arrays) {
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for BoundObject {
    fn drop(&mut self) {
        if let Err(e) = self.release_all() {
            tracing::warn!(error = %e, "failed to release bound handles on drop");
        }
    }
}

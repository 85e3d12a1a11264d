//! Scalar metadata attached to groups and arrays.

use std::sync::Arc;

use rustyhdf5_store::ElementType;

use crate::error::{Error, Result};
use crate::handle::{Handle, HandleKind};
use crate::types::{check_type, AttrValue, Element};

/// An open attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    handle: Arc<Handle>,
    name: String,
    dtype: ElementType,
}

impl Attribute {
    pub(crate) fn open(owner: &Handle, name: &str) -> Result<Self> {
        let loc = owner.id()?;
        let store = owner.store();
        if !store.attribute_exists(loc, name)? {
            return Err(Error::NotFound(format!("attribute '{name}'")));
        }
        let hid = store.open_attribute(loc, name)?;
        let handle = Handle::new(store.clone(), HandleKind::Attribute, hid)?;
        let dtype = store.attribute_type(hid)?;
        Ok(Attribute {
            handle,
            name: name.to_string(),
            dtype,
        })
    }

    pub(crate) fn create(
        owner: &Handle,
        name: &str,
        dtype: ElementType,
        default: Option<&AttrValue>,
    ) -> Result<Self> {
        let loc = owner.id()?;
        let store = owner.store();
        if !store.is_writable(loc)? {
            return Err(Error::InvalidState(format!(
                "cannot create attribute '{name}': read-only"
            )));
        }
        if store.attribute_exists(loc, name)? {
            return Err(Error::AlreadyExists(format!("attribute '{name}'")));
        }
        // The default is stored by the create call itself; a failure leaves
        // no zero-filled attribute for a later bind to pick up.
        let bytes = default.map(|v| v.encode(&dtype)).transpose()?;
        let hid = store.create_attribute(loc, name, dtype, bytes.as_deref())?;
        let handle = Handle::new(store.clone(), HandleKind::Attribute, hid)?;
        tracing::debug!(name, %dtype, "created attribute");
        Ok(Attribute {
            handle,
            name: name.to_string(),
            dtype,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_type(&self) -> ElementType {
        self.dtype
    }

    /// Read the value as `T`; the stored type must be `T` exactly.
    pub fn read<T: Element>(&self) -> Result<T> {
        let hid = self.handle.id()?;
        check_type::<T>(&self.dtype)?;
        let bytes = self.handle.store().read_attribute(hid)?;
        T::decode(&self.dtype, &bytes)
    }

    pub fn write<T: Element>(&self, value: &T) -> Result<()> {
        let hid = self.handle.id()?;
        check_type::<T>(&self.dtype)?;
        let mut bytes = Vec::with_capacity(self.dtype.size());
        value.encode(&self.dtype, &mut bytes)?;
        self.handle.store().write_attribute(hid, &bytes)?;
        Ok(())
    }

    /// Read whatever primitive the attribute holds.
    pub fn read_value(&self) -> Result<AttrValue> {
        let hid = self.handle.id()?;
        let bytes = self.handle.store().read_attribute(hid)?;
        AttrValue::decode(&self.dtype, &bytes)
    }

    pub fn write_value(&self, value: &AttrValue) -> Result<()> {
        let hid = self.handle.id()?;
        let bytes = value.encode(&self.dtype)?;
        self.handle.store().write_attribute(hid, &bytes)?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    pub fn close(&self) -> Result<()> {
        self.handle.release()
    }
}

/// Nodes that carry attributes.
pub trait AttributeOwner {
    #[doc(hidden)]
    fn owner_handle(&self) -> &Handle;

    fn has_attribute(&self, name: &str) -> Result<bool> {
        let h = self.owner_handle();
        Ok(h.store().attribute_exists(h.id()?, name)?)
    }

    /// Open an existing attribute; `NotFound` if absent.
    fn attribute(&self, name: &str) -> Result<Attribute> {
        Attribute::open(self.owner_handle(), name)
    }

    /// Create a new attribute, optionally writing `default`.
    ///
    /// Fails with `InvalidState` on a read-only node and `AlreadyExists` if
    /// the name is taken.
    fn set_attribute(
        &self,
        name: &str,
        dtype: ElementType,
        default: Option<&AttrValue>,
    ) -> Result<Attribute> {
        Attribute::create(self.owner_handle(), name, dtype, default)
    }

    /// Attribute names, ascending.
    fn attribute_names(&self) -> Result<Vec<String>> {
        let h = self.owner_handle();
        Ok(h.store().list_attributes(h.id()?)?)
    }
}

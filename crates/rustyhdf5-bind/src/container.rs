//! Open containers and their root group.

use std::sync::Arc;

use rustyhdf5_store::{ObjectStore, OpenMode};

use crate::config::BindConfig;
use crate::error::Result;
use crate::group::Group;
use crate::handle::{Handle, HandleKind};

/// An open container. Owns the root group.
///
/// Dropping or closing the container releases the root group and the
/// container handle. Nodes opened from the root stay valid until they are
/// released themselves.
#[derive(Debug)]
pub struct Container {
    root: Group,
    handle: Arc<Handle>,
    location: String,
}

impl Container {
    pub fn open(store: Arc<dyn ObjectStore>, location: &str, mode: OpenMode) -> Result<Self> {
        Self::open_with_config(store, location, mode, BindConfig::default())
    }

    pub fn open_with_config(
        store: Arc<dyn ObjectStore>,
        location: &str,
        mode: OpenMode,
        config: BindConfig,
    ) -> Result<Self> {
        config.validate()?;
        let fid = store.open_container(location, mode)?;
        let handle = Handle::new(store.clone(), HandleKind::Container, fid)?;
        let rid = store.root_group(fid)?;
        let root = Handle::new(store, HandleKind::Group, rid)?;
        tracing::debug!(location, ?mode, "opened container");
        Ok(Container {
            root: Group::new(root, "/".into(), Arc::new(config)),
            handle,
            location: location.to_string(),
        })
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn is_writable(&self) -> Result<bool> {
        Ok(self.handle.store().is_writable(self.handle.id()?)?)
    }

    /// Persist pending changes without closing.
    pub fn flush(&self) -> Result<()> {
        self.handle.store().flush(self.handle.id()?)?;
        Ok(())
    }

    /// Release the root group and the container handle.
    pub fn close(self) -> Result<()> {
        let root = self.root.close();
        let container = self.handle.release();
        tracing::debug!(location = %self.location, "closed container");
        root.and(container)
    }
}

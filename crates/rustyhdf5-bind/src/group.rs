//! Groups: named interior nodes of the hierarchy.

use std::sync::Arc;

use rustyhdf5_store::{ElementType, Hid, ObjectKind, ObjectStore};

use crate::attribute::AttributeOwner;
use crate::config::BindConfig;
use crate::dataset::{Dataset, DatasetHandle};
use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::handle::{Handle, HandleKind};
use crate::types::Element;

/// Result of [`Group::child`].
#[derive(Debug)]
pub enum Child {
    Group(Group),
    Dataset(DatasetHandle),
}

/// An open group.
///
/// Relative paths passed to a group must not start or end with `/`.
#[derive(Debug, Clone)]
pub struct Group {
    handle: Arc<Handle>,
    path: String,
    config: Arc<BindConfig>,
}

impl Group {
    pub(crate) fn new(handle: Arc<Handle>, path: String, config: Arc<BindConfig>) -> Self {
        Group {
            handle,
            path,
            config,
        }
    }

    /// Absolute path; the root is `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    pub fn is_writable(&self) -> Result<bool> {
        Ok(self.store().is_writable(self.hid()?)?)
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    pub fn close(&self) -> Result<()> {
        self.handle.release()
    }

    fn hid(&self) -> Result<Hid> {
        self.handle.id()
    }

    fn store(&self) -> &Arc<dyn ObjectStore> {
        self.handle.store()
    }

    fn join(&self, rel: &str) -> String {
        if self.path == "/" {
            format!("/{rel}")
        } else {
            format!("{}/{rel}", self.path)
        }
    }

    fn check_writable(&self, what: &str) -> Result<()> {
        if self.is_writable()? {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "cannot {what} under '{}': read-only",
                self.path
            )))
        }
    }

    /// Whether a link exists at `path`. Malformed paths never exist.
    pub fn exists(&self, path: &str) -> Result<bool> {
        if check_relative(path).is_err() {
            return Ok(false);
        }
        Ok(self.store().link_exists(self.hid()?, path)?)
    }

    fn kind_of(&self, path: &str) -> Result<ObjectKind> {
        check_relative(path)?;
        let hid = self.hid()?;
        if !self.store().link_exists(hid, path)? {
            return Err(Error::NotFound(self.join(path)));
        }
        Ok(self.store().object_kind(hid, path)?)
    }

    /// The group or array at `path`.
    pub fn child(&self, path: &str) -> Result<Child> {
        Ok(match self.kind_of(path)? {
            ObjectKind::Group => Child::Group(self.open_group_unchecked(path)?),
            ObjectKind::Array => Child::Dataset(self.open_dataset_unchecked(path)?),
        })
    }

    /// Open the group at `path`, creating it if missing and
    /// `create_if_missing` is set. Only one level can be created per call.
    pub fn subgroup(&self, path: &str, create_if_missing: bool) -> Result<Group> {
        check_relative(path)?;
        if self.exists(path)? {
            return self.open_group(path);
        }
        if !create_if_missing {
            return Err(Error::NotFound(self.join(path)));
        }
        self.create_group(path)
    }

    pub fn open_group(&self, path: &str) -> Result<Group> {
        match self.kind_of(path)? {
            ObjectKind::Group => self.open_group_unchecked(path),
            ObjectKind::Array => Err(Error::NotFound(format!(
                "'{}' is an array, not a group",
                self.join(path)
            ))),
        }
    }

    fn open_group_unchecked(&self, path: &str) -> Result<Group> {
        let hid = self.store().open_group(self.hid()?, path)?;
        let handle = Handle::new(self.store().clone(), HandleKind::Group, hid)?;
        tracing::debug!(path = %self.join(path), "opened group");
        Ok(Group::new(handle, self.join(path), self.config.clone()))
    }

    /// Create a single group directly below this one.
    pub fn create_group(&self, name: &str) -> Result<Group> {
        check_name(name)?;
        self.check_writable("create a group")?;
        let hid = self.hid()?;
        if self.store().link_exists(hid, name)? {
            return Err(Error::AlreadyExists(self.join(name)));
        }
        let gid = self.store().create_group(hid, name)?;
        let handle = Handle::new(self.store().clone(), HandleKind::Group, gid)?;
        tracing::debug!(path = %self.join(name), "created group");
        Ok(Group::new(handle, self.join(name), self.config.clone()))
    }

    pub fn open_dataset(&self, path: &str) -> Result<DatasetHandle> {
        match self.kind_of(path)? {
            ObjectKind::Array => self.open_dataset_unchecked(path),
            ObjectKind::Group => Err(Error::NotFound(format!(
                "'{}' is a group, not an array",
                self.join(path)
            ))),
        }
    }

    fn open_dataset_unchecked(&self, path: &str) -> Result<DatasetHandle> {
        let hid = self.store().open_array(self.hid()?, path)?;
        let handle = Handle::new(self.store().clone(), HandleKind::Array, hid)?;
        tracing::debug!(path = %self.join(path), "opened array");
        Ok(DatasetHandle::new(handle, self.join(path)))
    }

    /// Open an existing array as a typed dataset.
    pub fn dataset<T: Element, const R: usize>(&self, path: &str) -> Result<Dataset<T, R>> {
        self.open_dataset(path)?.typed()
    }

    /// Create a zero-filled array directly below this group.
    pub fn create_array(
        &self,
        name: &str,
        extent: &Extent,
        dtype: ElementType,
    ) -> Result<DatasetHandle> {
        check_name(name)?;
        self.check_writable("create an array")?;
        let hid = self.hid()?;
        if self.store().link_exists(hid, name)? {
            return Err(Error::AlreadyExists(self.join(name)));
        }
        let aid = self
            .store()
            .create_array(hid, name, dtype, extent.dims(), extent.maxdims())?;
        let handle = Handle::new(self.store().clone(), HandleKind::Array, aid)?;
        tracing::debug!(path = %self.join(name), %dtype, %extent, "created array");
        Ok(DatasetHandle::new(handle, self.join(name)))
    }

    /// Create a typed dataset. String elements get the configured default
    /// width.
    pub fn create_dataset<T: Element, const R: usize>(
        &self,
        name: &str,
        dims: &[u64],
        maxdims: Option<&[i64]>,
    ) -> Result<Dataset<T, R>> {
        let extent = Extent::new(R, dims, maxdims)?;
        let dtype = T::element_type(self.config.default_string_width);
        Ok(Dataset::from_handle(self.create_array(name, &extent, dtype)?))
    }

    /// Unlink the group at `path`. Storage reclamation is up to the store.
    pub fn delete_group(&self, path: &str) -> Result<()> {
        self.delete(path, ObjectKind::Group)
    }

    pub fn delete_dataset(&self, path: &str) -> Result<()> {
        self.delete(path, ObjectKind::Array)
    }

    fn delete(&self, path: &str, kind: ObjectKind) -> Result<()> {
        if self.kind_of(path)? != kind {
            return Err(Error::NotFound(format!("no {kind:?} at '{}'", self.join(path))));
        }
        self.check_writable("delete")?;
        self.store().unlink(self.hid()?, path)?;
        tracing::debug!(path = %self.join(path), "unlinked");
        Ok(())
    }

    /// Direct child groups ordered by name. Each group is opened when the
    /// iterator reaches it; calling this again starts over from a fresh
    /// listing.
    pub fn subgroups(&self) -> Result<Subgroups<'_>> {
        Ok(Subgroups {
            parent: self,
            names: self.child_names(ObjectKind::Group)?.into_iter(),
        })
    }

    pub fn subgroup_names(&self) -> Result<Vec<String>> {
        self.child_names(ObjectKind::Group)
    }

    /// Names of direct child arrays, ascending.
    pub fn list_datasets(&self) -> Result<Vec<String>> {
        self.child_names(ObjectKind::Array)
    }

    fn child_names(&self, kind: ObjectKind) -> Result<Vec<String>> {
        Ok(self
            .store()
            .list_links(self.hid()?)?
            .into_iter()
            .filter(|(_, k)| *k == kind)
            .map(|(name, _)| name)
            .collect())
    }
}

impl AttributeOwner for Group {
    fn owner_handle(&self) -> &Handle {
        &self.handle
    }
}

/// Lazy iterator over child groups, see [`Group::subgroups`].
pub struct Subgroups<'a> {
    parent: &'a Group,
    names: std::vec::IntoIter<String>,
}

impl Iterator for Subgroups<'_> {
    type Item = Result<Group>;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.names.next()?;
        Some(self.parent.open_group_unchecked(&name))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.names.size_hint()
    }
}

fn check_relative(path: &str) -> Result<()> {
    if path.is_empty() || path.starts_with('/') || path.ends_with('/') {
        return Err(Error::NotFound(format!("'{path}' is not a relative node path")));
    }
    Ok(())
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Argument("empty link name".into()));
    }
    if name.contains('/') {
        return Err(Error::InvalidState(format!(
            "cannot create '{name}' in one step: create each level separately"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyhdf5_store::{NativeStore, OpenMode};

    fn make_root(mode: OpenMode) -> Group {
        let store: Arc<dyn ObjectStore> = Arc::new(NativeStore::volatile());
        let f = store.open_container("g", OpenMode::CreateExclusive).unwrap();
        store.close_container(f).unwrap();
        let f = store.open_container("g", mode).unwrap();
        let root = store.root_group(f).unwrap();
        store.close_container(f).unwrap();
        let h = Handle::new(store, HandleKind::Group, root).unwrap();
        Group::new(h, "/".into(), Arc::new(BindConfig::default()))
    }

    #[test]
    fn child_paths_must_be_relative() {
        let root = make_root(OpenMode::ReadWrite);
        root.create_group("a").unwrap();
        assert!(matches!(root.child("/a"), Err(Error::NotFound(_))));
        assert!(matches!(root.child("a/"), Err(Error::NotFound(_))));
        assert!(matches!(root.child("b"), Err(Error::NotFound(_))));
        assert!(matches!(root.child("a"), Ok(Child::Group(_))));
        assert!(!root.exists("/a").unwrap());
    }

    #[test]
    fn nested_child_lookup() {
        let root = make_root(OpenMode::ReadWrite);
        let a = root.create_group("a").unwrap();
        a.create_dataset::<i32, 1>("x", &[3], None).unwrap();
        match root.child("a/x").unwrap() {
            Child::Dataset(d) => assert_eq!(d.path(), "/a/x"),
            Child::Group(_) => panic!("expected an array"),
        }
        assert!(matches!(root.child("a/y/z"), Err(Error::NotFound(_))));
    }

    #[test]
    fn subgroup_creates_one_level_only() {
        let root = make_root(OpenMode::ReadWrite);
        assert!(matches!(root.subgroup("s", false), Err(Error::NotFound(_))));
        let s = root.subgroup("s", true).unwrap();
        assert_eq!(s.path(), "/s");
        assert!(matches!(root.subgroup("p/q", true), Err(Error::InvalidState(_))));
        s.subgroup("t", true).unwrap();
        assert_eq!(root.subgroup("s/t", false).unwrap().path(), "/s/t");
    }

    #[test]
    fn create_rules() {
        let root = make_root(OpenMode::ReadWrite);
        root.create_group("a").unwrap();
        assert!(matches!(root.create_group("a"), Err(Error::AlreadyExists(_))));
        assert!(matches!(
            root.create_dataset::<f64, 2>("a", &[1, 1], None),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            root.create_dataset::<f64, 2>("m", &[1], None),
            Err(Error::RankMismatch { .. })
        ));
    }

    #[test]
    fn read_only_group_refuses_creation() {
        let root = make_root(OpenMode::ReadOnly);
        assert!(matches!(root.create_group("a"), Err(Error::InvalidState(_))));
        assert!(matches!(
            root.create_dataset::<i8, 1>("x", &[1], None),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn listing_is_name_ordered_and_restartable() {
        let root = make_root(OpenMode::ReadWrite);
        for name in ["zeta", "alpha", "mid"] {
            root.create_group(name).unwrap();
        }
        root.create_dataset::<i32, 1>("data", &[1], None).unwrap();

        let paths: Vec<String> = root
            .subgroups()
            .unwrap()
            .map(|g| g.unwrap().path().to_string())
            .collect();
        assert_eq!(paths, vec!["/alpha", "/mid", "/zeta"]);
        assert_eq!(root.subgroups().unwrap().count(), 3);
        assert_eq!(root.list_datasets().unwrap(), vec!["data".to_string()]);
    }

    #[test]
    fn deletion() {
        let root = make_root(OpenMode::ReadWrite);
        root.create_group("g").unwrap();
        root.create_dataset::<i32, 1>("d", &[1], None).unwrap();
        assert!(matches!(root.delete_group("d"), Err(Error::NotFound(_))));
        assert!(matches!(root.delete_group("nope"), Err(Error::NotFound(_))));
        root.delete_group("g").unwrap();
        root.delete_dataset("d").unwrap();
        assert!(!root.exists("g").unwrap());
        assert!(!root.exists("d").unwrap());
    }

    #[test]
    fn string_datasets_use_configured_width() {
        let root = make_root(OpenMode::ReadWrite);
        let names = root.create_dataset::<String, 1>("names", &[5], None).unwrap();
        assert_eq!(
            names.element_type().unwrap(),
            ElementType::FixedString { width: 256 }
        );
    }

    #[test]
    fn group_attributes() {
        let root = make_root(OpenMode::ReadWrite);
        root.set_attribute("version", ElementType::I32, Some(&3i32.into()))
            .unwrap();
        assert_eq!(root.attribute("version").unwrap().read::<i32>().unwrap(), 3);
        assert_eq!(root.attribute_names().unwrap(), vec!["version".to_string()]);
    }
}

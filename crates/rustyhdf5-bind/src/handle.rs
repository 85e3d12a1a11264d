//! Owned store handles with exactly-once release.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use rustyhdf5_store::{Hid, ObjectStore};

use crate::error::{Error, Result};

/// Marks a released handle. Valid store ids are strictly positive.
const CLOSED: Hid = 0;

#[cfg(debug_assertions)]
static LIVE_HANDLES: AtomicI64 = AtomicI64::new(0);

/// Number of handles created and not yet released in this process.
///
/// Only tracked in debug builds; always 0 in release builds.
pub fn live_handles() -> i64 {
    #[cfg(debug_assertions)]
    {
        LIVE_HANDLES.load(Ordering::SeqCst)
    }
    #[cfg(not(debug_assertions))]
    {
        0
    }
}

/// Which store close primitive a handle needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Container,
    Group,
    Array,
    Attribute,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandleKind::Container => "container",
            HandleKind::Group => "group",
            HandleKind::Array => "array",
            HandleKind::Attribute => "attribute",
        };
        f.write_str(s)
    }
}

/// An open store id that is released exactly once.
///
/// The first [`release`](Handle::release) closes the id through the store;
/// later calls are no-ops. Dropping an unreleased handle releases it.
pub struct Handle {
    store: Arc<dyn ObjectStore>,
    kind: HandleKind,
    hid: AtomicI64,
}

impl Handle {
    /// Take ownership of `hid`. Non-positive ids are rejected.
    pub fn new(store: Arc<dyn ObjectStore>, kind: HandleKind, hid: Hid) -> Result<Arc<Self>> {
        if hid <= CLOSED {
            return Err(Error::BackingStore {
                code: i32::try_from(hid).unwrap_or(i32::MIN),
                message: format!("store returned invalid {kind} id {hid}"),
            });
        }
        #[cfg(debug_assertions)]
        LIVE_HANDLES.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Handle {
            store,
            kind,
            hid: AtomicI64::new(hid),
        }))
    }

    /// The raw id, or `InvalidState` once released.
    pub fn id(&self) -> Result<Hid> {
        match self.hid.load(Ordering::Acquire) {
            CLOSED => Err(Error::InvalidState(format!("{} handle is closed", self.kind))),
            hid => Ok(hid),
        }
    }

    pub fn is_open(&self) -> bool {
        self.hid.load(Ordering::Acquire) != CLOSED
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Close the id through the store. Idempotent.
    ///
    /// The handle counts as released even if the store reports a failure.
    pub fn release(&self) -> Result<()> {
        let hid = self.hid.swap(CLOSED, Ordering::AcqRel);
        if hid == CLOSED {
            return Ok(());
        }
        #[cfg(debug_assertions)]
        LIVE_HANDLES.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(kind = %self.kind, hid, "releasing handle");
        let result = match self.kind {
            HandleKind::Container => self.store.close_container(hid),
            HandleKind::Group => self.store.close_group(hid),
            HandleKind::Array => self.store.close_array(hid),
            HandleKind::Attribute => self.store.close_attribute(hid),
        };
        result.map_err(Error::from)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(kind = %self.kind, error = %e, "failed to release handle on drop");
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("store", &self.store.name())
            .field("kind", &self.kind)
            .field("hid", &self.hid.load(Ordering::Relaxed))
            .finish()
    }
}

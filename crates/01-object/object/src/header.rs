//! Identity block embedded in every runtime object.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;

use crate::manager::{ManagerShared, MemoryManager};

static NEXT_UID: AtomicU32 = AtomicU32::new(1);

/// Type tag carried by every object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeUid(u32);

impl TypeUid {
    /// Plain object with no registered class.
    pub const GENERIC: TypeUid = TypeUid(0);
    /// Built-in test class used by the launcher.
    pub const TEST: TypeUid = TypeUid(0x0000_0001);
    pub const QUEUE: TypeUid = TypeUid(0x0E00_0000);
    pub const LIST: TypeUid = TypeUid(0x0F00_0000);
    pub const SERVICE: TypeUid = TypeUid(0x2000_0000);
    pub const MESSAGE: TypeUid = TypeUid(0x2100_0000);
    pub const SUBSCRIPTION: TypeUid = TypeUid(0x2200_0000);
    pub const MODULE: TypeUid = TypeUid(0x2300_0000);
    pub const DISPATCHER: TypeUid = TypeUid(0xFFFF_FFFA);
    pub const MEMORY_MANAGER: TypeUid = TypeUid(0xFFFF_FFFF);

    pub const fn new(raw: u32) -> Self {
        TypeUid(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.0)
    }
}

/// Lifetime policy for an object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Ownership {
    /// Reference counted by the memory manager the object is bound to.
    #[default]
    Shared,
    /// Lifetime is controlled by whoever holds the allocation; `ref`/`unref`
    /// are no-ops.
    Owned,
}

/// Name, identity and manager binding of an object.
pub struct Header {
    uid: u32,
    type_uid: TypeUid,
    ownership: Ownership,
    name: RwLock<String>,
    manager: OnceLock<Weak<ManagerShared>>,
    disposed: AtomicBool,
}

impl Header {
    /// Creates an unbound header. A missing name becomes `object-<uid>`.
    pub fn new(name: Option<&str>, type_uid: TypeUid, ownership: Ownership) -> Self {
        let uid = NEXT_UID.fetch_add(1, Ordering::Relaxed);
        let name = match name {
            Some(name) => name.to_owned(),
            None => format!("object-{uid:08X}"),
        };
        Self {
            uid,
            type_uid,
            ownership,
            name: RwLock::new(name),
            manager: OnceLock::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Header for an object whose lifetime is controlled by its holder.
    pub fn owned(name: &str, type_uid: TypeUid) -> Self {
        Self::new(Some(name), type_uid, Ownership::Owned)
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn type_uid(&self) -> TypeUid {
        self.type_uid
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn is_managed(&self) -> bool {
        self.ownership == Ownership::Shared
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn rename(&self, new_name: &str) {
        let mut name = self.name.write();
        log::debug!("renaming object {} to {}", *name, new_name);
        *name = new_name.to_owned();
    }

    /// Memory manager this object is bound to, if it is bound and still alive.
    pub fn manager(&self) -> Option<MemoryManager> {
        self.manager
            .get()
            .and_then(Weak::upgrade)
            .map(MemoryManager::from_shared)
    }

    pub fn is_bound(&self) -> bool {
        self.manager.get().is_some()
    }

    /// Whether the manager has released this object. Disposed objects are
    /// never tracked again.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Set under the manager lock when the entry is removed.
    pub(crate) fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Binds the header to `shared` unless it is already bound elsewhere.
    ///
    /// On conflict the error carries the current owner, or `None` when the
    /// owner has already been dropped.
    pub(crate) fn bind(&self, shared: &Arc<ManagerShared>) -> Result<(), Option<MemoryManager>> {
        let bound = self.manager.get_or_init(|| Arc::downgrade(shared));
        if Weak::as_ptr(bound) == Arc::as_ptr(shared) {
            Ok(())
        } else {
            Err(bound.upgrade().map(MemoryManager::from_shared))
        }
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("name", &*self.name.read())
            .field("uid", &format_args!("{:#010X}", self.uid))
            .field("type_uid", &self.type_uid)
            .field("ownership", &self.ownership)
            .finish()
    }
}

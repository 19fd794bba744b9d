//! Reference-counted lifetime registry.
//!
//! The memory manager tracks one [`MemoryEntry`] per shared object. Every
//! counted reference handed out to callers is a [`Ref`]: cloning one takes a
//! reference, dropping one releases it. When the count reaches zero the entry
//! is removed under the manager lock and the object's `dispose` hook runs
//! after the lock is released, so teardown may cascade into further releases.
//!
//! Storage is owned by `Arc`s, never freed by hand: an unbalanced `unref`
//! can dispose an object early but can never free it twice.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::error::{ObjectError, ObjectResult};
use crate::header::{Header, Ownership, TypeUid};
use crate::object::Object;

struct MemoryEntry {
    object: Arc<dyn Object>,
    uid: u32,
    refcount: usize,
    seq: u64,
}

#[derive(Default)]
struct ManagerState {
    entries: HashMap<u32, MemoryEntry>,
    next_seq: u64,
    closed: bool,
}

pub(crate) struct ManagerShared {
    header: Header,
    state: Mutex<ManagerState>,
}

impl ManagerShared {
    /// Closes the registry and returns the remaining entries, newest first.
    fn close(&self) -> Vec<MemoryEntry> {
        let mut state = self.state.lock();
        state.closed = true;
        let mut entries: Vec<MemoryEntry> = state.entries.drain().map(|(_, entry)| entry).collect();
        for entry in &entries {
            entry.object.header().mark_disposed();
        }
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        entries
    }
}

impl Drop for ManagerShared {
    fn drop(&mut self) {
        let leftovers = self.close();
        if !leftovers.is_empty() {
            warn!(
                "memory manager {} dropped with {} live object(s)",
                self.header.name(),
                leftovers.len()
            );
        }
        for entry in leftovers {
            entry.object.dispose();
        }
    }
}

/// Registry of live objects and their reference counts.
///
/// Cheap to clone; clones share the same registry. The manager itself is an
/// [`Ownership::Owned`] object, so it never tracks itself.
#[derive(Clone)]
pub struct MemoryManager {
    shared: Arc<ManagerShared>,
}

impl MemoryManager {
    pub fn new(name: &str) -> Self {
        info!("creating memory manager {name}");
        Self {
            shared: Arc::new(ManagerShared {
                header: Header::owned(name, TypeUid::MEMORY_MANAGER),
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<ManagerShared>) -> Self {
        Self { shared }
    }

    /// Allocates a shared object, runs its `construct` hook and takes the
    /// first reference on it.
    pub fn create<T, F>(&self, name: Option<&str>, type_uid: TypeUid, build: F) -> ObjectResult<Ref<T>>
    where
        T: Object,
        F: FnOnce(Header) -> T,
    {
        self.try_create(name, type_uid, |header| Ok(build(header)))
    }

    /// Like [`MemoryManager::create`] with a builder that may fail.
    pub fn try_create<T, F>(
        &self,
        name: Option<&str>,
        type_uid: TypeUid,
        build: F,
    ) -> ObjectResult<Ref<T>>
    where
        T: Object,
        F: FnOnce(Header) -> ObjectResult<T>,
    {
        let header = self.new_header(name, type_uid)?;
        let object = build(header).map_err(|err| {
            error!("failed to create object {}: {err}", name.unwrap_or("<unnamed>"));
            err
        })?;
        Ok(self.track(Arc::new(object)))
    }

    /// Like [`MemoryManager::create`], handing the builder a weak pointer to
    /// the object under construction.
    pub fn create_cyclic<T, F>(
        &self,
        name: Option<&str>,
        type_uid: TypeUid,
        build: F,
    ) -> ObjectResult<Ref<T>>
    where
        T: Object,
        F: FnOnce(Header, &Weak<T>) -> T,
    {
        let header = self.new_header(name, type_uid)?;
        Ok(self.track(Arc::new_cyclic(|weak| build(header, weak))))
    }

    /// Binds an externally allocated shared object to this manager and takes
    /// a reference on it. Fails for owned and already disposed objects.
    pub fn adopt<T: Object>(&self, object: Arc<T>) -> ObjectResult<Ref<T>> {
        let header = object.header();
        if !header.is_managed() {
            return Err(ObjectError::Unmanaged(header.name()));
        }
        self.ensure_open()?;
        self.acquire(&object)?;
        Ok(Ref { ptr: object })
    }

    /// Takes a reference on `object`, binding it to this manager first if it
    /// is unbound. No-op for owned objects. A reference on an object that was
    /// already disposed is a logic error: it is logged and ignored.
    pub fn ref_object<T: ?Sized + Object>(&self, object: &Arc<T>) {
        match self.acquire(object) {
            Ok(()) | Err(ObjectError::ForeignManager { .. }) => {}
            Err(ObjectError::ManagerClosed(_)) => {
                debug!("ignoring reference on {} after shutdown", object.header().name());
            }
            Err(err) => error!("logic error: {err}"),
        }
    }

    fn acquire<T: ?Sized + Object>(&self, object: &Arc<T>) -> ObjectResult<()> {
        let header = object.header();
        if !header.is_managed() {
            return Ok(());
        }
        self.bind(header)?;

        let uid = header.uid();
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(ObjectError::ManagerClosed(self.shared.header.name()));
        }
        if header.is_disposed() {
            return Err(ObjectError::Disposed(header.name()));
        }
        if let Some(entry) = state.entries.get_mut(&uid) {
            entry.refcount += 1;
            debug!(
                "reference count for object {} increased to {}",
                header.name(),
                entry.refcount
            );
            return Ok(());
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            uid,
            MemoryEntry {
                object: Arc::clone(object).into_object_arc(),
                uid,
                refcount: 1,
                seq,
            },
        );
        debug!(
            "object {} added to memory manager {}",
            header.name(),
            self.shared.header.name()
        );
        Ok(())
    }

    /// Releases a reference on `object`; disposes it when the count hits zero.
    ///
    /// Releasing an object this manager does not track is a logic error: it is
    /// logged and otherwise ignored.
    pub fn unref_object<T: ?Sized + Object>(&self, object: &T) {
        let header = object.header();
        if !header.is_managed() {
            return;
        }

        let uid = header.uid();
        let released = {
            let mut state = self.shared.state.lock();
            let Some(entry) = state.entries.get_mut(&uid) else {
                if !state.closed {
                    error!(
                        "logic error: unref on untracked object {} ({uid:#010X})",
                        header.name()
                    );
                }
                return;
            };
            entry.refcount -= 1;
            debug!(
                "reference count for object {} decreased to {}",
                header.name(),
                entry.refcount
            );
            if entry.refcount > 0 {
                return;
            }
            header.mark_disposed();
            state.entries.remove(&uid)
        };

        if let Some(entry) = released {
            debug!("disposing object {} ({:#010X})", header.name(), entry.uid);
            entry.object.dispose();
        }
    }

    /// Uid of the first live object named `name`.
    pub fn find(&self, name: &str) -> Option<u32> {
        let state = self.shared.state.lock();
        state
            .entries
            .values()
            .filter(|entry| entry.object.header().name() == name)
            .min_by_key(|entry| entry.seq)
            .map(|entry| entry.uid)
    }

    /// Looks up a live object by uid and takes a reference on it.
    pub fn fetch(&self, uid: u32) -> Option<Ref<dyn Object>> {
        let mut state = self.shared.state.lock();
        let entry = state.entries.get_mut(&uid)?;
        entry.refcount += 1;
        Some(Ref {
            ptr: Arc::clone(&entry.object),
        })
    }

    pub fn refcount(&self, uid: u32) -> Option<usize> {
        self.shared
            .state
            .lock()
            .entries
            .get(&uid)
            .map(|entry| entry.refcount)
    }

    pub fn live_objects(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Disposes every object still tracked, newest first, and refuses new
    /// objects afterwards. Idempotent.
    pub fn shutdown(&self) {
        let leftovers = self.shared.close();
        info!(
            "shutting down memory manager {} ({} live object(s))",
            self.shared.header.name(),
            leftovers.len()
        );
        for entry in leftovers {
            entry.object.dispose();
        }
    }

    pub fn same_manager(&self, other: &MemoryManager) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn new_header(&self, name: Option<&str>, type_uid: TypeUid) -> ObjectResult<Header> {
        self.ensure_open()?;
        let header = Header::new(name, type_uid, Ownership::Shared);
        self.bind(&header)?;
        Ok(header)
    }

    fn track<T: Object>(&self, object: Arc<T>) -> Ref<T> {
        object.construct();
        self.ref_object(&object);
        Ref { ptr: object }
    }

    fn ensure_open(&self) -> ObjectResult<()> {
        if self.is_closed() {
            return Err(ObjectError::ManagerClosed(self.shared.header.name()));
        }
        Ok(())
    }

    fn bind(&self, header: &Header) -> ObjectResult<()> {
        header.bind(&self.shared).map_err(|owner| {
            let owner = owner
                .map(|owner| owner.shared.header.name())
                .unwrap_or_else(|| "<dropped>".to_owned());
            error!(
                "object {} is owned by memory manager {owner}, not {}",
                header.name(),
                self.shared.header.name()
            );
            ObjectError::ForeignManager {
                name: header.name(),
                owner,
            }
        })
    }
}

impl Object for MemoryManager {
    fn header(&self) -> &Header {
        &self.shared.header
    }
}

impl fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryManager")
            .field("name", &self.shared.header.name())
            .field("live_objects", &self.live_objects())
            .finish()
    }
}

/// Counted handle to a shared object.
///
/// `Clone` is `ref`, `Drop` is `unref`. Handles to owned objects, or to
/// objects whose manager is gone, behave like plain `Arc`s.
pub struct Ref<T: ?Sized + Object> {
    ptr: Arc<T>,
}

impl<T: ?Sized + Object> Ref<T> {
    fn acquire(ptr: Arc<T>) -> Self {
        if let Some(manager) = ptr.header().manager() {
            manager.ref_object(&ptr);
        }
        Self { ptr }
    }

    pub fn as_arc(&self) -> &Arc<T> {
        &self.ptr
    }

    /// Whether both handles point at the same object.
    pub fn same(a: &Self, b: &Self) -> bool {
        a.ptr.header().uid() == b.ptr.header().uid()
    }

    /// Current reference count, or `None` if the object is not tracked.
    pub fn refcount(&self) -> Option<usize> {
        self.ptr
            .header()
            .manager()
            .and_then(|manager| manager.refcount(self.ptr.header().uid()))
    }

    /// Re-types the handle, e.g. `r.cast(|p| p as Arc<dyn Process>)`.
    pub fn cast<U, F>(self, f: F) -> Ref<U>
    where
        U: ?Sized + Object,
        F: FnOnce(Arc<T>) -> Arc<U>,
    {
        Ref::acquire(f(Arc::clone(&self.ptr)))
    }

    pub fn into_object(self) -> Ref<dyn Object> {
        Ref::acquire(Arc::clone(&self.ptr).into_object_arc())
    }
}

impl Ref<dyn Object> {
    /// Recovers the concrete type, handing the handle back on mismatch.
    pub fn downcast<T: Object>(self) -> Result<Ref<T>, Self> {
        match Arc::clone(&self.ptr).into_any_arc().downcast::<T>() {
            Ok(ptr) => Ok(Ref::acquire(ptr)),
            Err(_) => Err(self),
        }
    }
}

impl<T: ?Sized + Object> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Ref::acquire(Arc::clone(&self.ptr))
    }
}

impl<T: ?Sized + Object> Drop for Ref<T> {
    fn drop(&mut self) {
        if let Some(manager) = self.ptr.header().manager() {
            manager.unref_object(&*self.ptr);
        }
    }
}

impl<T: ?Sized + Object> Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.ptr
    }
}

impl<T: ?Sized + Object> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ref").field(self.ptr.header()).finish()
    }
}

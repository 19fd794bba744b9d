//! Named constructors for runtime classes.

use std::sync::Arc;

use ecds_object::{MemoryManager, Object, ObjectResult, Ref};
use log::{info, warn};
use parking_lot::RwLock;

use crate::error::{RuntimeError, RuntimeResult};

/// Builds an object of a registered class under the given name.
pub type Constructor =
    Arc<dyn Fn(&MemoryManager, &str) -> ObjectResult<Ref<dyn Object>> + Send + Sync>;

/// Class uids picked automatically stay inside this mask.
pub const AUTO_CLASS_UID_MASK: u32 = 0x00FF_FFFF;

const AUTO_CLASS_UID_BASE: u32 = 0x0000_1000;

struct ClassEntry {
    name: String,
    uid: u32,
    constructor: Constructor,
}

#[derive(Default)]
pub struct ClassRegistry {
    classes: RwLock<Vec<ClassEntry>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `type_name` and returns its class uid. An existing
    /// registration wins and keeps its uid and constructor. A `type_uid` of
    /// zero picks an unused uid below [`AUTO_CLASS_UID_MASK`], failing with
    /// [`RuntimeError::ClassUidsExhausted`] when none is left.
    pub fn register<F>(&self, type_name: &str, type_uid: u32, constructor: F) -> RuntimeResult<u32>
    where
        F: Fn(&MemoryManager, &str) -> ObjectResult<Ref<dyn Object>> + Send + Sync + 'static,
    {
        let mut classes = self.classes.write();
        if let Some(entry) = classes.iter().find(|entry| entry.name == type_name) {
            return Ok(entry.uid);
        }

        let uid = if type_uid == 0 {
            let taken = |uid: u32| classes.iter().any(|entry| entry.uid == uid);
            next_auto_uid(classes.len(), AUTO_CLASS_UID_MASK, taken)
                .ok_or_else(|| RuntimeError::ClassUidsExhausted(type_name.to_owned()))?
        } else {
            type_uid
        };
        info!("registering class {type_name} ({uid:#010X})");
        classes.push(ClassEntry {
            name: type_name.to_owned(),
            uid,
            constructor: Arc::new(constructor),
        });
        Ok(uid)
    }

    /// Class uid of `type_name`, or `None` if it is not registered.
    pub fn class_uid(&self, type_name: &str) -> Option<u32> {
        self.classes
            .read()
            .iter()
            .find(|entry| entry.name == type_name)
            .map(|entry| entry.uid)
    }

    pub fn class_names(&self) -> Vec<String> {
        self.classes
            .read()
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Constructs an instance of `type_name`. Without an object name the
    /// instance is called `<type_name>-obj`.
    pub fn construct(
        &self,
        manager: &MemoryManager,
        type_name: &str,
        object_name: Option<&str>,
    ) -> RuntimeResult<Ref<dyn Object>> {
        let constructor = self
            .classes
            .read()
            .iter()
            .find(|entry| entry.name == type_name)
            .map(|entry| Arc::clone(&entry.constructor));
        let Some(constructor) = constructor else {
            warn!("unable to construct object of type {type_name}: type not registered");
            return Err(RuntimeError::UnknownClass(type_name.to_owned()));
        };

        let name = match object_name {
            Some(name) => name.to_owned(),
            None => format!("{type_name}-obj"),
        };
        Ok(constructor(manager, &name)?)
    }
}

/// First non-zero uid under `mask` that `taken` rejects, starting the search
/// after the `registered` classes and wrapping once through the whole mask.
pub(crate) fn next_auto_uid(registered: usize, mask: u32, taken: impl Fn(u32) -> bool) -> Option<u32> {
    let start = u32::try_from(registered).map_or(0, |count| AUTO_CLASS_UID_BASE.wrapping_add(count));
    let mut uid = start & mask;
    for _ in 0..=mask {
        if uid != 0 && !taken(uid) {
            return Some(uid);
        }
        uid = uid.wrapping_add(1) & mask;
    }
    None
}

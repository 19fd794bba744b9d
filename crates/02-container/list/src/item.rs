use std::fmt;
use std::sync::{Arc, Weak};

use ecds_object::{Object, Ref};
use parking_lot::Mutex;

use crate::arena::ListCore;

pub(crate) struct Link<T: ?Sized + Object> {
    pub(crate) list: Weak<ListCore<T>>,
    pub(crate) slot: usize,
}

struct ItemNode<T: ?Sized + Object> {
    payload: Ref<T>,
    link: Mutex<Option<Link<T>>>,
}

/// A list entry holding one counted reference to its payload.
///
/// Handles are cheap to clone and all clones denote the same entry. An item
/// is attached to at most one list at a time; detached items keep their
/// payload alive until the last handle goes away or [`ListItem::dispose`]
/// hands the payload reference back.
pub struct ListItem<T: ?Sized + Object> {
    node: Arc<ItemNode<T>>,
}

impl<T: ?Sized + Object> ListItem<T> {
    /// Creates a detached item, taking a reference on `payload`.
    pub fn new(payload: &Ref<T>) -> Self {
        Self::from_ref(payload.clone())
    }

    /// Creates a detached item that takes over `payload`.
    pub fn from_ref(payload: Ref<T>) -> Self {
        Self {
            node: Arc::new(ItemNode {
                payload,
                link: Mutex::new(None),
            }),
        }
    }

    pub fn payload(&self) -> &Ref<T> {
        &self.node.payload
    }

    pub fn is_attached(&self) -> bool {
        self.node
            .link
            .lock()
            .as_ref()
            .is_some_and(|link| link.list.strong_count() > 0)
    }

    /// Position of the item in its list.
    pub fn index(&self) -> Option<usize> {
        let (core, _) = self.owner()?;
        let mut state = core.state.lock();
        let slot = core.locate(self)?;
        state.index_of(slot)
    }

    /// Detaches the item from whatever list holds it. Detaching a detached
    /// item is a no-op. Returns the same item.
    pub fn drop_item(&self) -> ListItem<T> {
        while let Some((core, slot)) = self.owner() {
            let removed = {
                let mut state = core.state.lock();
                if core.locate(self) != Some(slot) {
                    // moved between lookups; retry against the new owner
                    continue;
                }
                ListCore::detach_locked(&mut state, slot)
            };
            drop(removed);
            break;
        }
        self.clone()
    }

    /// Detaches the item, destroys it and returns its payload reference.
    pub fn dispose(self) -> Ref<T> {
        self.drop_item();
        match Arc::try_unwrap(self.node) {
            Ok(node) => node.payload,
            Err(node) => node.payload.clone(),
        }
    }

    /// New detached item with the same payload.
    pub fn duplicate(&self) -> ListItem<T> {
        ListItem::new(&self.node.payload)
    }

    /// Whether both handles denote the same entry.
    pub fn same(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.node, &b.node)
    }

    pub(crate) fn link(&self) -> &Mutex<Option<Link<T>>> {
        &self.node.link
    }

    /// Current list and slot, if the list is still alive. Clears a link to a
    /// list that has been dropped.
    fn owner(&self) -> Option<(Arc<ListCore<T>>, usize)> {
        let mut link = self.node.link.lock();
        let current = link.as_ref()?;
        match current.list.upgrade() {
            Some(core) => Some((core, current.slot)),
            None => {
                link.take();
                None
            }
        }
    }
}

impl<T: ?Sized + Object> Clone for ListItem<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T: ?Sized + Object> fmt::Debug for ListItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListItem")
            .field("payload", &self.node.payload.name())
            .field("attached", &self.is_attached())
            .finish()
    }
}

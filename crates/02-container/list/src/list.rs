use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use ecds_object::{Header, MemoryManager, Object, ObjectError, ObjectResult, Ref, TypeUid};
use log::debug;

use crate::arena::ListCore;
use crate::item::ListItem;

/// Ordered sequence of items, each owning one reference to its payload.
///
/// All operations take `&self` and lock internally, so a list can be shared
/// through its [`Ref`] between threads. Operations that build a new list
/// allocate it from the manager this list belongs to.
pub struct List<T: ?Sized + Object> {
    header: Header,
    core: Arc<ListCore<T>>,
}

impl<T: ?Sized + Object> List<T> {
    pub const DEFAULT_NAME: &'static str = "ecds-list";

    pub fn new(manager: &MemoryManager, name: Option<&str>) -> ObjectResult<Ref<Self>> {
        manager.create(
            Some(name.unwrap_or(Self::DEFAULT_NAME)),
            TypeUid::LIST,
            |header| Self {
                header,
                core: ListCore::new(),
            },
        )
    }

    pub fn len(&self) -> usize {
        self.core.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a new item holding a fresh reference on `object`.
    pub fn add_item(&self, object: &Ref<T>) -> ListItem<T> {
        let item = ListItem::new(object);
        self.core.attach(&item, None);
        item
    }

    /// Appends a detached item. Returns `None` if the item already belongs
    /// to a list.
    pub fn take_item(&self, item: &ListItem<T>) -> Option<ListItem<T>> {
        self.attach(item, None)
    }

    /// Attaches a detached item so that it ends up at `index`; indices past
    /// the end append. Returns `None` if the item already belongs to a list.
    pub fn insert_item(&self, index: usize, item: &ListItem<T>) -> Option<ListItem<T>> {
        self.attach(item, Some(index))
    }

    fn attach(&self, item: &ListItem<T>, index: Option<usize>) -> Option<ListItem<T>> {
        if self.core.attach(item, index) {
            Some(item.clone())
        } else {
            debug!("{}: item is already attached to a list", self.header.name());
            None
        }
    }

    /// Appends a new item sharing the payload of `item`.
    pub fn copy_item(&self, item: &ListItem<T>) -> ListItem<T> {
        self.add_item(item.payload())
    }

    /// Payload of `item` if it belongs to this list.
    pub fn get(&self, item: &ListItem<T>) -> Option<Ref<T>> {
        let _state = self.core.state.lock();
        self.core.locate(item)?;
        Some(item.payload().clone())
    }

    pub fn contains(&self, item: &ListItem<T>) -> bool {
        let _state = self.core.state.lock();
        self.core.locate(item).is_some()
    }

    pub fn first_item(&self) -> Option<ListItem<T>> {
        let state = self.core.state.lock();
        state.first().and_then(|id| state.slot(id)).map(|slot| slot.item.clone())
    }

    pub fn last_item(&self) -> Option<ListItem<T>> {
        let state = self.core.state.lock();
        state.last().and_then(|id| state.slot(id)).map(|slot| slot.item.clone())
    }

    /// Item following `item`, or `None` at the tail or if `item` is not ours.
    pub fn next_item(&self, item: &ListItem<T>) -> Option<ListItem<T>> {
        let state = self.core.state.lock();
        let slot = self.core.locate(item)?;
        state
            .next_of(slot)
            .and_then(|id| state.slot(id))
            .map(|slot| slot.item.clone())
    }

    pub fn previous_item(&self, item: &ListItem<T>) -> Option<ListItem<T>> {
        let state = self.core.state.lock();
        let slot = self.core.locate(item)?;
        state
            .prev_of(slot)
            .and_then(|id| state.slot(id))
            .map(|slot| slot.item.clone())
    }

    /// First item whose payload is `object`.
    pub fn find_item(&self, object: &T) -> Option<ListItem<T>> {
        let uid = object.uid();
        let mut state = self.core.state.lock();
        let ids = state.ids();
        ids.into_iter()
            .filter_map(|id| state.slot(id))
            .find(|slot| slot.item.payload().uid() == uid)
            .map(|slot| slot.item.clone())
    }

    pub fn item_at(&self, index: usize) -> Option<ListItem<T>> {
        let mut state = self.core.state.lock();
        let id = state.id_at(index)?;
        state.slot(id).map(|slot| slot.item.clone())
    }

    /// Payload at `index`, with a fresh reference.
    pub fn fetch(&self, index: usize) -> Option<Ref<T>> {
        self.item_at(index).map(|item| item.payload().clone())
    }

    pub fn index_of(&self, item: &ListItem<T>) -> Option<usize> {
        let mut state = self.core.state.lock();
        let slot = self.core.locate(item)?;
        state.index_of(slot)
    }

    /// Item handles in list order.
    pub fn items(&self) -> Vec<ListItem<T>> {
        self.core.snapshot()
    }

    /// Payload references in list order.
    pub fn to_vec(&self) -> Vec<Ref<T>> {
        self.items()
            .iter()
            .map(|item| item.payload().clone())
            .collect()
    }

    /// Visits every payload in order. The list is not locked while `f` runs.
    pub fn for_each<F: FnMut(&Ref<T>)>(&self, mut f: F) {
        for item in self.items() {
            f(item.payload());
        }
    }

    /// Detaches and destroys every item, releasing their payloads.
    pub fn clear(&self) {
        let released = self.core.take_all();
        debug!("{}: releasing {} item(s)", self.header.name(), released.len());
        drop(released);
    }

    /// Sorts the list in place; equal items keep their order. The comparator
    /// runs without the list lock held.
    pub fn sort_by<F>(&self, mut compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        loop {
            let (version, mut entries) = {
                let mut state = self.core.state.lock();
                let ids = state.ids();
                let entries: Vec<(usize, Arc<T>)> = ids
                    .into_iter()
                    .filter_map(|id| {
                        state
                            .slot(id)
                            .map(|slot| (id, Arc::clone(slot.item.payload().as_arc())))
                    })
                    .collect();
                (state.version(), entries)
            };

            entries.sort_by(|(_, a), (_, b)| compare(a.as_ref(), b.as_ref()));
            let order: Vec<usize> = entries.iter().map(|(id, _)| *id).collect();
            if self.core.relink_if_unchanged(version, &order) {
                return;
            }
            debug!("{}: list changed while sorting, retrying", self.header.name());
        }
    }

    /// New empty list from the same manager.
    pub(crate) fn sibling(&self, suffix: &str) -> ObjectResult<Ref<Self>> {
        let manager = self
            .header
            .manager()
            .ok_or_else(|| ObjectError::Unbound(self.header.name()))?;
        let name = format!("{}-{suffix}", self.header.name());
        List::new(&manager, Some(&name))
    }

    pub(crate) fn core(&self) -> &Arc<ListCore<T>> {
        &self.core
    }
}

impl<T: ?Sized + Object> Object for List<T> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn dispose(&self) {
        self.clear();
    }
}

impl<T: ?Sized + Object> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("name", &self.header.name())
            .field("len", &self.len())
            .finish()
    }
}

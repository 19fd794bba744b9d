//! Slot arena backing lists and queues.
//!
//! A list keeps its links in a `Vec` of slots addressed by index; freed slots
//! are recycled through a free list. Each attached [`ListItem`] records the
//! list it belongs to and its slot, so items can be detached without a search.
//!
//! Lock order: list state first, then item link. Item handles released by a
//! structural change are returned to the caller and dropped after the list
//! lock is gone, because the last handle may release a payload whose
//! `dispose` touches this list again.

use std::sync::{Arc, Weak};

use ecds_object::Object;
use parking_lot::Mutex;

use crate::item::{Link, ListItem};

pub(crate) struct Slot<T: ?Sized + Object> {
    pub(crate) item: ListItem<T>,
    prev: Option<usize>,
    next: Option<usize>,
    index: usize,
}

pub(crate) struct ListState<T: ?Sized + Object> {
    slots: Vec<Option<Slot<T>>>,
    free: Vec<usize>,
    first: Option<usize>,
    last: Option<usize>,
    count: usize,
    order: Vec<usize>,
    stale: bool,
    version: u64,
}

impl<T: ?Sized + Object> ListState<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            first: None,
            last: None,
            count: 0,
            order: Vec::new(),
            stale: false,
            version: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn first(&self) -> Option<usize> {
        self.first
    }

    pub(crate) fn last(&self) -> Option<usize> {
        self.last
    }

    pub(crate) fn slot(&self, id: usize) -> Option<&Slot<T>> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: usize) -> Option<&mut Slot<T>> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    pub(crate) fn next_of(&self, id: usize) -> Option<usize> {
        self.slot(id).and_then(|slot| slot.next)
    }

    pub(crate) fn prev_of(&self, id: usize) -> Option<usize> {
        self.slot(id).and_then(|slot| slot.prev)
    }

    fn touch(&mut self) {
        self.stale = true;
        self.version = self.version.wrapping_add(1);
    }

    /// Links `item` in front of `before`, or at the tail when `before` is
    /// `None`. Returns the slot id.
    fn insert_before(&mut self, item: ListItem<T>, before: Option<usize>) -> usize {
        let prev = match before {
            Some(before) => self.prev_of(before),
            None => self.last,
        };
        let slot = Slot {
            item,
            prev,
            next: before,
            index: 0,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(slot);
                id
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };

        match prev.and_then(|prev| self.slot_mut(prev)) {
            Some(prev) => prev.next = Some(id),
            None => self.first = Some(id),
        }
        match before.and_then(|before| self.slot_mut(before)) {
            Some(next) => next.prev = Some(id),
            None => self.last = Some(id),
        }

        self.count += 1;
        self.touch();
        id
    }

    /// Removes a slot, repairing neighbour links and `first`/`last`.
    fn unlink(&mut self, id: usize) -> Option<ListItem<T>> {
        let slot = self.slots.get_mut(id)?.take()?;
        match slot.prev.and_then(|prev| self.slot_mut(prev)) {
            Some(prev) => prev.next = slot.next,
            None => self.first = slot.next,
        }
        match slot.next.and_then(|next| self.slot_mut(next)) {
            Some(next) => next.prev = slot.prev,
            None => self.last = slot.prev,
        }
        self.free.push(id);
        self.count -= 1;
        self.touch();
        Some(slot.item)
    }

    /// Recomputes sequence numbers if a structural change made them stale.
    pub(crate) fn ensure_indexed(&mut self) {
        if !self.stale {
            return;
        }
        self.order.clear();
        let mut cursor = self.first;
        while let Some(id) = cursor {
            let index = self.order.len();
            self.order.push(id);
            cursor = match self.slot_mut(id) {
                Some(slot) => {
                    slot.index = index;
                    slot.next
                }
                None => None,
            };
        }
        self.stale = false;
    }

    pub(crate) fn index_of(&mut self, id: usize) -> Option<usize> {
        self.ensure_indexed();
        self.slot(id).map(|slot| slot.index)
    }

    pub(crate) fn id_at(&mut self, index: usize) -> Option<usize> {
        self.ensure_indexed();
        self.order.get(index).copied()
    }

    /// Slot ids in list order.
    pub(crate) fn ids(&mut self) -> Vec<usize> {
        self.ensure_indexed();
        self.order.clone()
    }

    /// Rewires the list to follow `order`, which must be a permutation of the
    /// current slot ids.
    fn relink(&mut self, order: &[usize]) {
        for (pos, &id) in order.iter().enumerate() {
            let prev = pos.checked_sub(1).map(|p| order[p]);
            let next = order.get(pos + 1).copied();
            if let Some(slot) = self.slot_mut(id) {
                slot.prev = prev;
                slot.next = next;
            }
        }
        self.first = order.first().copied();
        self.last = order.last().copied();
        self.touch();
    }
}

pub(crate) struct ListCore<T: ?Sized + Object> {
    pub(crate) state: Mutex<ListState<T>>,
}

impl<T: ?Sized + Object> ListCore<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ListState::new()),
        })
    }

    fn owns(self: &Arc<Self>, link: &Link<T>) -> bool {
        Weak::as_ptr(&link.list) == Arc::as_ptr(self)
    }

    /// Slot of `item` in this list; the caller holds the state lock.
    pub(crate) fn locate(self: &Arc<Self>, item: &ListItem<T>) -> Option<usize> {
        let link = item.link().lock();
        link.as_ref()
            .filter(|link| self.owns(link))
            .map(|link| link.slot)
    }

    /// Attaches a detached item in front of the item at `index` (tail when
    /// out of range). Fails if the item is attached anywhere.
    pub(crate) fn attach(self: &Arc<Self>, item: &ListItem<T>, index: Option<usize>) -> bool {
        let mut state = self.state.lock();
        let mut link = item.link().lock();
        if link.is_some() {
            return false;
        }
        let before = index.and_then(|index| state.id_at(index));
        let slot = state.insert_before(item.clone(), before);
        *link = Some(Link {
            list: Arc::downgrade(self),
            slot,
        });
        true
    }

    /// Detaches the slot while the caller holds the state lock.
    pub(crate) fn detach_locked(state: &mut ListState<T>, slot: usize) -> Option<ListItem<T>> {
        let item = state.unlink(slot)?;
        item.link().lock().take();
        Some(item)
    }

    pub(crate) fn pop_front(&self) -> Option<ListItem<T>> {
        let mut state = self.state.lock();
        let first = state.first()?;
        Self::detach_locked(&mut state, first)
    }

    /// Detaches every item, front to back.
    pub(crate) fn take_all(&self) -> Vec<ListItem<T>> {
        let mut state = self.state.lock();
        let ids = state.ids();
        ids.into_iter()
            .filter_map(|id| Self::detach_locked(&mut state, id))
            .collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<ListItem<T>> {
        let mut state = self.state.lock();
        let ids = state.ids();
        ids.into_iter()
            .filter_map(|id| state.slot(id).map(|slot| slot.item.clone()))
            .collect()
    }

    /// Applies `order` if nothing changed since `version` was observed.
    pub(crate) fn relink_if_unchanged(&self, version: u64, order: &[usize]) -> bool {
        let mut state = self.state.lock();
        if state.version() != version {
            return false;
        }
        state.relink(order);
        true
    }
}

impl<T: ?Sized + Object> Drop for ListCore<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for slot in state.slots.iter_mut().filter_map(Option::take) {
            slot.item.link().lock().take();
        }
    }
}

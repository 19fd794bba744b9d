//! Whole-list operations that produce new lists.
//!
//! Copies take a fresh reference on every payload they share; `split` moves
//! items instead, so payload counts are unchanged by it.

use ecds_object::{Object, ObjectResult, Ref};

use crate::arena::ListCore;
use crate::item::ListItem;
use crate::list::List;

impl<T: ?Sized + Object> List<T> {
    /// Shallow copy: a new list whose items share this list's payloads.
    pub fn clone_list(&self) -> ObjectResult<Ref<List<T>>> {
        let copy = self.sibling("clone")?;
        self.for_each(|payload| {
            copy.add_item(payload);
        });
        Ok(copy)
    }

    /// New list holding the payloads for which `keep` returns true.
    pub fn filter<F>(&self, mut keep: F) -> ObjectResult<Ref<List<T>>>
    where
        F: FnMut(&T) -> bool,
    {
        let filtered = self.sibling("filter")?;
        self.for_each(|payload| {
            if keep(payload) {
                filtered.add_item(payload);
            }
        });
        Ok(filtered)
    }

    /// New list with this list's payloads followed by `other`'s.
    pub fn concat(&self, other: &List<T>) -> ObjectResult<Ref<List<T>>> {
        let joined = self.sibling("concat")?;
        for payload in self.to_vec().iter().chain(other.to_vec().iter()) {
            joined.add_item(payload);
        }
        Ok(joined)
    }

    /// New list alternating payloads from both lists, starting with this one.
    /// Once the shorter list runs out the rest of the longer one follows.
    pub fn zip(&self, other: &List<T>) -> ObjectResult<Ref<List<T>>> {
        let zipped = self.sibling("zip")?;
        let mut left = self.to_vec().into_iter();
        let mut right = other.to_vec().into_iter();
        loop {
            match (left.next(), right.next()) {
                (None, None) => break,
                (a, b) => {
                    for payload in a.iter().chain(b.iter()) {
                        zipped.add_item(payload);
                    }
                }
            }
        }
        Ok(zipped)
    }

    /// Cuts the list after the item at `position` and returns the tail as a
    /// new list. The items move; nothing is copied.
    pub fn split(&self, position: usize) -> ObjectResult<Ref<List<T>>> {
        let tail = self.sibling("split")?;
        let moved: Vec<ListItem<T>> = {
            let mut state = self.core().state.lock();
            let ids = state.ids();
            ids.into_iter()
                .skip(position.saturating_add(1))
                .filter_map(|id| ListCore::detach_locked(&mut state, id))
                .collect()
        };
        for item in &moved {
            tail.take_item(item);
        }
        Ok(tail)
    }

    /// New list copying the payloads at indices `from..=to`. `to` is clamped
    /// to the last index; an empty list comes back when `from` is past it.
    pub fn sublist(&self, from: usize, to: usize) -> ObjectResult<Ref<List<T>>> {
        let sub = self.sibling("sublist")?;
        if from <= to {
            for payload in self.to_vec().iter().skip(from).take((to - from).saturating_add(1)) {
                sub.add_item(payload);
            }
        }
        Ok(sub)
    }

    /// Inserts copies of `other`'s items so the first one lands at `index`.
    /// Indices past the end append.
    pub fn insert_list(&self, index: usize, other: &List<T>) {
        for (offset, payload) in other.to_vec().iter().enumerate() {
            let item = ListItem::new(payload);
            self.insert_item(index.saturating_add(offset), &item);
        }
    }
}

use std::fmt;
use std::sync::Arc;

use ecds_object::{Header, MemoryManager, Object, ObjectResult, Ref, TypeUid};
use log::debug;

use crate::arena::ListCore;
use crate::item::ListItem;

/// FIFO over list items: enqueue at the tail, dequeue from the head.
///
/// A dequeued payload reference is handed to the caller, who now owns it.
pub struct Queue<T: ?Sized + Object> {
    header: Header,
    core: Arc<ListCore<T>>,
}

impl<T: ?Sized + Object> Queue<T> {
    pub const DEFAULT_NAME: &'static str = "ecds-queue";

    pub fn new(manager: &MemoryManager, name: Option<&str>) -> ObjectResult<Ref<Self>> {
        manager.create(
            Some(name.unwrap_or(Self::DEFAULT_NAME)),
            TypeUid::QUEUE,
            |header| Self {
                header,
                core: ListCore::new(),
            },
        )
    }

    /// Enqueues a new item holding a fresh reference on `object`.
    pub fn enqueue(&self, object: &Ref<T>) -> ListItem<T> {
        let item = ListItem::new(object);
        self.core.attach(&item, None);
        item
    }

    /// Enqueues a detached item; `None` if it already belongs to a list.
    pub fn enqueue_item(&self, item: &ListItem<T>) -> Option<ListItem<T>> {
        self.core.attach(item, None).then(|| item.clone())
    }

    /// Removes the head and transfers its payload reference to the caller.
    pub fn dequeue(&self) -> Option<Ref<T>> {
        self.dequeue_item().map(ListItem::dispose)
    }

    /// Removes the head item without destroying it.
    pub fn dequeue_item(&self) -> Option<ListItem<T>> {
        self.core.pop_front()
    }

    /// Payload at the head, with a fresh reference. The queue is unchanged.
    pub fn peek(&self) -> Option<Ref<T>> {
        let state = self.core.state.lock();
        state
            .first()
            .and_then(|id| state.slot(id))
            .map(|slot| slot.item.payload().clone())
    }

    /// Dequeues until empty, handing each payload to `f`. Items enqueued by
    /// `f` itself are flushed too.
    pub fn flush<F: FnMut(Ref<T>)>(&self, mut f: F) -> usize {
        let mut flushed = 0;
        while let Some(payload) = self.dequeue() {
            f(payload);
            flushed += 1;
        }
        flushed
    }

    /// Dequeues everything at once, in order.
    pub fn drain(&self) -> Vec<Ref<T>> {
        self.core
            .take_all()
            .into_iter()
            .map(ListItem::dispose)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.core.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every queued item, releasing their payloads.
    pub fn clear(&self) {
        let released = self.core.take_all();
        if !released.is_empty() {
            debug!("{}: discarding {} queued item(s)", self.header.name(), released.len());
        }
        drop(released);
    }
}

impl<T: ?Sized + Object> Object for Queue<T> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn dispose(&self) {
        self.clear();
    }
}

impl<T: ?Sized + Object> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.header.name())
            .field("len", &self.len())
            .finish()
    }
}

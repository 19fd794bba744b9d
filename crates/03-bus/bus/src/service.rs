//! Event handler tables.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use ecds_object::{Header, MemoryManager, Object, ObjectResult, Ref, TypeUid};
use log::debug;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::dispatcher::DispatcherHandle;
use crate::message::{Message, UserData};

type HandlerFn = dyn Fn(&DispatcherHandle, &Message, UserData) + Send + Sync;

type HandlerList = SmallVec<[Arc<HandlerFn>; 2]>;

struct DispatchHook(Box<HandlerFn>);

/// Object that reacts to dispatched messages.
///
/// Handlers are keyed by event id; several handlers may share an id and run
/// in registration order. The optional dispatch hook sees every message
/// delivered to the service before any handler does.
pub struct Service {
    header: Header,
    handlers: RwLock<HashMap<u32, HandlerList>>,
    hook: ArcSwapOption<DispatchHook>,
}

impl Service {
    pub fn new(manager: &MemoryManager, name: Option<&str>) -> ObjectResult<Ref<Service>> {
        manager.create(name, TypeUid::SERVICE, |header| Service {
            header,
            handlers: RwLock::new(HashMap::new()),
            hook: ArcSwapOption::empty(),
        })
    }

    pub fn add_handler<F>(&self, event_id: u32, handler: F)
    where
        F: Fn(&DispatcherHandle, &Message, UserData) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(event_id)
            .or_default()
            .push(Arc::new(handler));
        debug!("{}: handler added for event {event_id}", self.header.name());
    }

    pub fn set_dispatch_hook<F>(&self, hook: F)
    where
        F: Fn(&DispatcherHandle, &Message, UserData) + Send + Sync + 'static,
    {
        self.hook.store(Some(Arc::new(DispatchHook(Box::new(hook)))));
    }

    pub fn clear_dispatch_hook(&self) {
        self.hook.store(None);
    }

    pub fn handler_count(&self, event_id: u32) -> usize {
        self.handlers
            .read()
            .get(&event_id)
            .map_or(0, SmallVec::len)
    }

    /// Runs the hook, then every handler registered for the message's event
    /// id. No lock is held while user code runs, so handlers may register
    /// further handlers or post new messages. Returns the number of handlers
    /// invoked, hook excluded.
    pub fn dispatch(&self, dispatcher: &DispatcherHandle, message: &Message) -> usize {
        if let Some(hook) = self.hook.load_full() {
            (hook.0)(dispatcher, message, message.user_data().clone());
        }

        let handlers: HandlerList = match self.handlers.read().get(&message.event_id()) {
            Some(handlers) => handlers.clone(),
            None => return 0,
        };
        for handler in &handlers {
            handler(dispatcher, message, message.user_data().clone());
        }
        handlers.len()
    }
}

impl Object for Service {
    fn header(&self) -> &Header {
        &self.header
    }

    fn dispose(&self) {
        let handlers = std::mem::take(&mut *self.handlers.write());
        self.hook.store(None);
        drop(handlers);
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.header.name())
            .field("events", &self.handlers.read().len())
            .finish()
    }
}

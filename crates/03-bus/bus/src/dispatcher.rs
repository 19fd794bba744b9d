//! Multi-threaded publish/subscribe bus.
//!
//! Every dispatcher owns one worker thread. Producers append to the message
//! queue under the dispatcher lock and signal the worker; the worker drains
//! the queue, releasing the lock around each delivery so handlers can post,
//! subscribe or shut the dispatcher down from inside a callback.
//!
//! Lock order: dispatcher state, then queue/list internals, then the memory
//! manager. References that may be the last one on an object are released
//! after the dispatcher lock is gone.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use ecds_list::{List, ListItem, Queue};
use ecds_object::{Header, MemoryManager, Object, ObjectError, Process, Ref, TypeUid};
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::{DispatcherConfig, ShutdownPolicy};
use crate::error::{DispatchError, DispatchResult};
use crate::message::Message;
use crate::metrics::{DispatcherMetrics, DispatcherMetricsSnapshot};
use crate::service::Service;
use crate::subscription::Subscription;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherPhase {
    Constructed,
    Running,
    Stopping,
    Stopped,
}

struct WorkerState {
    phase: DispatcherPhase,
    in_flight: bool,
    worker: Option<thread::JoinHandle<()>>,
    worker_id: Option<ThreadId>,
    /// Event id to its entry in the subscription list.
    index: HashMap<u32, Ref<Subscription>>,
}

impl WorkerState {
    fn subscription(&self, event_id: u32) -> Option<Ref<Subscription>> {
        self.index.get(&event_id).cloned()
    }
}

struct DispatcherShared {
    name: String,
    config: DispatcherConfig,
    state: Mutex<WorkerState>,
    /// Queue non-empty or stopping.
    wake: Condvar,
    /// Queue drained with nothing in flight, or worker gone.
    idle: Condvar,
    queue: Ref<Queue<Message>>,
    subscriptions: Ref<List<Subscription>>,
    metrics: DispatcherMetrics,
}

/// Outcome of looking up an event id.
enum Route {
    Services(Vec<Ref<Service>>),
    Placeholder,
}

impl DispatcherShared {
    /// Returns the entry for `event_id`, creating it if needed. Taking the
    /// state guard keeps at most one entry per id.
    fn find_or_create(
        &self,
        state: &mut WorkerState,
        event_id: u32,
    ) -> DispatchResult<Ref<Subscription>> {
        if let Some(subscription) = state.subscription(event_id) {
            return Ok(subscription);
        }
        let manager = self.manager()?;
        let subscription = Subscription::new(&manager, event_id)?;
        self.subscriptions.add_item(&subscription);
        state.index.insert(event_id, subscription.clone());
        debug!("{}: subscription entry created for event {event_id}", self.name);
        Ok(subscription)
    }

    fn manager(&self) -> DispatchResult<MemoryManager> {
        self.subscriptions
            .header()
            .manager()
            .ok_or_else(|| DispatchError::Object(ObjectError::Unbound(self.name.clone())))
    }

    fn route(&self, state: &mut WorkerState, event_id: u32) -> Route {
        if let Some(subscription) = state.subscription(event_id) {
            return Route::Services(subscription.services());
        }
        if let Err(err) = self.find_or_create(state, event_id) {
            error!("{}: cannot record event {event_id}: {err}", self.name);
        }
        Route::Placeholder
    }

    fn deliver(&self, handle: &DispatcherHandle, message: Ref<Message>, route: Route) {
        match route {
            Route::Services(services) => {
                if services.is_empty() {
                    debug!(
                        "{}: no services left for event {}",
                        self.name,
                        message.event_id()
                    );
                }
                for service in &services {
                    service.dispatch(handle, &message);
                }
                self.metrics.record_delivered(services.len());
            }
            Route::Placeholder => {
                self.metrics.record_unrouted();
                warn!(
                    "{}: no subscription for event {}, message dropped",
                    self.name,
                    message.event_id()
                );
            }
        }
    }

    fn run_worker(self: Arc<Self>) {
        let handle = DispatcherHandle {
            shared: Arc::clone(&self),
        };
        info!("{}: worker started", self.name);

        let mut state = self.state.lock();
        loop {
            let running = state.phase == DispatcherPhase::Running;
            if !running && self.config.shutdown_policy == ShutdownPolicy::Drop {
                break;
            }
            let Some(message) = self.queue.dequeue() else {
                if !running {
                    break;
                }
                self.idle.notify_all();
                self.wake.wait(&mut state);
                continue;
            };

            let route = self.route(&mut state, message.event_id());
            state.in_flight = true;
            MutexGuard::unlocked(&mut state, || self.deliver(&handle, message, route));
            state.in_flight = false;
        }

        let dropped = self.queue.drain();
        state.phase = DispatcherPhase::Stopped;
        state.in_flight = false;
        self.idle.notify_all();
        drop(state);

        if !dropped.is_empty() {
            self.metrics.record_dropped(dropped.len());
            warn!(
                "{}: dropped {} queued message(s) on shutdown",
                self.name,
                dropped.len()
            );
        }
        drop(dropped);
        info!("{}: worker stopped", self.name);
    }
}

/// Cloneable access to a running dispatcher.
///
/// Handed to every handler so callbacks can post follow-up messages. Holding
/// a handle does not keep the dispatcher object alive, only its queue and
/// subscription table.
#[derive(Clone)]
pub struct DispatcherHandle {
    shared: Arc<DispatcherShared>,
}

impl DispatcherHandle {
    pub fn dispatcher_name(&self) -> &str {
        &self.shared.name
    }

    pub fn phase(&self) -> DispatcherPhase {
        self.shared.state.lock().phase
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// Enqueues `message` and wakes the worker. Never blocks on queue depth.
    pub fn post(&self, message: Ref<Message>) -> DispatchResult<()> {
        let shared = &self.shared;
        let state = shared.state.lock();
        if matches!(
            state.phase,
            DispatcherPhase::Stopping | DispatcherPhase::Stopped
        ) {
            drop(state);
            debug!("{}: rejecting event {} after stop", shared.name, message.event_id());
            return Err(DispatchError::Stopped(shared.name.clone()));
        }
        shared.queue.enqueue_item(&ListItem::from_ref(message));
        shared.metrics.record_posted();
        shared.wake.notify_one();
        Ok(())
    }

    /// Subscribes `service` to `event_id`. There is exactly one entry per
    /// event id; a service already in the entry is not added again.
    pub fn subscribe(&self, event_id: u32, service: &Ref<Service>) -> DispatchResult<()> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.phase == DispatcherPhase::Stopped {
            return Err(DispatchError::Stopped(shared.name.clone()));
        }
        let subscription = shared.find_or_create(&mut state, event_id)?;
        if subscription.add(service) {
            info!(
                "{}: {} subscribed to event {event_id}",
                shared.name,
                service.name()
            );
        } else {
            debug!(
                "{}: {} already subscribed to event {event_id}",
                shared.name,
                service.name()
            );
        }
        drop(state);
        Ok(())
    }

    /// Removes `service` from the entry for `event_id`, keeping the entry.
    /// Returns `false` if the service was not subscribed or the dispatcher
    /// is stopped.
    pub fn unsubscribe(&self, event_id: u32, service: &Service) -> bool {
        let released = {
            let state = self.shared.state.lock();
            if state.phase == DispatcherPhase::Stopped {
                debug!("{}: ignoring unsubscribe after stop", self.shared.name);
                return false;
            }
            state
                .subscription(event_id)
                .and_then(|subscription| subscription.remove(service))
        };
        released.is_some()
    }

    /// Whether an entry, possibly empty, exists for `event_id`.
    pub fn has_subscription(&self, event_id: u32) -> bool {
        self.shared.state.lock().index.contains_key(&event_id)
    }

    /// Services subscribed to `event_id`, in subscription order.
    pub fn subscribers(&self, event_id: u32) -> Vec<Ref<Service>> {
        let subscription = self.shared.state.lock().subscription(event_id);
        subscription.map_or_else(Vec::new, |subscription| subscription.services())
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn metrics(&self) -> DispatcherMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Blocks until the queue is empty and no delivery is in flight. Returns
    /// `false` on timeout, or immediately when called from a handler.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let shared = &self.shared;
        let deadline = Instant::now() + timeout;
        let mut state = shared.state.lock();
        if state.worker_id == Some(thread::current().id()) {
            return false;
        }
        while state.in_flight || !shared.queue.is_empty() {
            if state.phase == DispatcherPhase::Stopped {
                break;
            }
            if shared.idle.wait_until(&mut state, deadline).timed_out() {
                return !state.in_flight && shared.queue.is_empty();
            }
        }
        true
    }

    /// [`wait_idle`](Self::wait_idle) bounded by the configured idle timeout.
    pub fn flush(&self) -> bool {
        self.wait_idle(self.shared.config.idle_timeout)
    }

    /// Stops the worker. Queued messages are dropped or delivered according
    /// to the shutdown policy. Safe to call from any thread, including a
    /// handler, and more than once.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        let (worker, worker_id) = {
            let mut state = shared.state.lock();
            if state.phase == DispatcherPhase::Stopped {
                return;
            }
            if state.phase != DispatcherPhase::Stopping {
                info!(
                    "{}: shutting down ({} policy, {} queued)",
                    shared.name,
                    shared.config.shutdown_policy,
                    shared.queue.len()
                );
                state.phase = DispatcherPhase::Stopping;
            }
            shared.wake.notify_all();
            (state.worker.take(), state.worker_id)
        };

        let on_worker = worker_id == Some(thread::current().id());
        match worker {
            Some(worker) if !on_worker => {
                if worker.join().is_err() {
                    error!("{}: worker panicked", shared.name);
                }
            }
            Some(_) => debug!("{}: shutdown requested by a handler", shared.name),
            None => {}
        }

        let mut state = shared.state.lock();
        if worker_id.is_none() {
            let dropped = shared.queue.drain();
            state.phase = DispatcherPhase::Stopped;
            shared.idle.notify_all();
            drop(state);
            shared.metrics.record_dropped(dropped.len());
            return;
        }
        if !on_worker {
            while state.phase != DispatcherPhase::Stopped {
                shared.idle.wait(&mut state);
            }
        }
    }

    /// Spawns the worker thread if it is not running yet.
    fn start(&self) -> DispatchResult<()> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.phase != DispatcherPhase::Constructed {
            return Ok(());
        }
        let worker_shared = Arc::clone(shared);
        let worker = thread::Builder::new()
            .name(shared.name.clone())
            .spawn(move || worker_shared.run_worker())?;
        state.worker_id = Some(worker.thread().id());
        state.worker = Some(worker);
        state.phase = DispatcherPhase::Running;
        Ok(())
    }

    fn release_tables(&self) {
        let index = std::mem::take(&mut self.shared.state.lock().index);
        self.shared.subscriptions.clear();
        self.shared.queue.clear();
        drop(index);
    }
}

impl fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("name", &self.shared.name)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Dispatcher object: a [`DispatcherHandle`] with an identity and a
/// lifecycle. Disposing it shuts the worker down and releases the queue
/// and subscription entries.
pub struct Dispatcher {
    header: Header,
    handle: DispatcherHandle,
}

impl Dispatcher {
    /// Creates a dispatcher and starts its worker. `name` overrides the
    /// configured name.
    pub fn construct(
        manager: &MemoryManager,
        name: Option<&str>,
        config: DispatcherConfig,
    ) -> DispatchResult<Ref<Dispatcher>> {
        let config = match name {
            Some(name) => config.name(name),
            None => config,
        };
        let queue = Queue::new(manager, Some(&format!("{}-queue", config.name)))?;
        let subscriptions = List::new(manager, Some(&format!("{}-subscriptions", config.name)))?;
        let handle = DispatcherHandle {
            shared: Arc::new(DispatcherShared {
                name: config.name.clone(),
                state: Mutex::new(WorkerState {
                    phase: DispatcherPhase::Constructed,
                    in_flight: false,
                    worker: None,
                    worker_id: None,
                    index: HashMap::new(),
                }),
                wake: Condvar::new(),
                idle: Condvar::new(),
                queue,
                subscriptions,
                metrics: DispatcherMetrics::default(),
                config,
            }),
        };

        let name = handle.shared.name.clone();
        let dispatcher = manager.create(Some(&name), TypeUid::DISPATCHER, |header| Dispatcher {
            header,
            handle,
        })?;
        dispatcher.handle.start()?;
        Ok(dispatcher)
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }
}

impl std::ops::Deref for Dispatcher {
    type Target = DispatcherHandle;

    fn deref(&self) -> &DispatcherHandle {
        &self.handle
    }
}

impl Object for Dispatcher {
    fn header(&self) -> &Header {
        &self.header
    }

    fn dispose(&self) {
        self.handle.shutdown();
        self.handle.release_tables();
    }
}

impl Process for Dispatcher {
    fn initialize(&self) {
        if let Err(err) = self.handle.start() {
            error!("{}: failed to start worker: {err}", self.header.name());
        }
    }

    fn shutdown(&self) {
        self.handle.shutdown();
    }

    fn is_running(&self) -> bool {
        self.handle.phase() == DispatcherPhase::Running
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.header.name())
            .field("phase", &self.handle.phase())
            .finish()
    }
}

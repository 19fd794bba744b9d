//! Explicit runtime context.
//!
//! A [`Runtime`] owns the default memory manager, the class registry, the
//! module manager and the default dispatcher. Everything that would otherwise
//! be a process-wide singleton hangs off this value, and dropping it tears
//! the system down in reverse order of construction.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ecds_bus::{Dispatcher, Message, Service};
use ecds_object::{MemoryManager, Object, ObjectResult, Process, Ref};
use log::info;
use parking_lot::Mutex;

use crate::class_registry::ClassRegistry;
use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::module::{Module, ModuleLoader, ModuleManager, StaticModuleLoader};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Runtime {
    config: RuntimeConfig,
    manager: MemoryManager,
    classes: ClassRegistry,
    modules: ModuleManager,
    dispatcher: Ref<Dispatcher>,
    processes: Mutex<Vec<Ref<dyn Process>>>,
    closed: AtomicBool,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> RuntimeResult<Self> {
        Self::with_loader(config, Arc::new(StaticModuleLoader::new()))
    }

    /// Builds the runtime and starts the default dispatcher.
    pub fn with_loader(config: RuntimeConfig, loader: Arc<dyn ModuleLoader>) -> RuntimeResult<Self> {
        info!("ECDS version {VERSION} starting up");
        let manager = MemoryManager::new("ecds-memory-manager");
        let dispatcher = Dispatcher::construct(&manager, None, config.dispatcher.clone())?;
        let runtime = Self {
            config,
            classes: ClassRegistry::new(),
            modules: ModuleManager::new(loader),
            processes: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            dispatcher,
            manager,
        };
        runtime.start_process(runtime.dispatcher.clone().cast(|p| p as Arc<dyn Process>));
        Ok(runtime)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn manager(&self) -> &MemoryManager {
        &self.manager
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn modules(&self) -> &ModuleManager {
        &self.modules
    }

    pub fn dispatcher(&self) -> &Ref<Dispatcher> {
        &self.dispatcher
    }

    /// Registers a class; see [`ClassRegistry::register`].
    pub fn register_class<F>(&self, type_name: &str, type_uid: u32, constructor: F) -> RuntimeResult<u32>
    where
        F: Fn(&MemoryManager, &str) -> ObjectResult<Ref<dyn Object>> + Send + Sync + 'static,
    {
        self.classes.register(type_name, type_uid, constructor)
    }

    /// Constructs a registered class in the default manager.
    pub fn construct(&self, type_name: &str, object_name: Option<&str>) -> RuntimeResult<Ref<dyn Object>> {
        self.ensure_open()?;
        self.classes.construct(&self.manager, type_name, object_name)
    }

    pub fn load_module(&self, path: impl AsRef<Path>) -> RuntimeResult<Ref<dyn Module>> {
        self.ensure_open()?;
        self.modules.load(self, path.as_ref())
    }

    /// Initializes `process` and tracks it for shutdown.
    pub fn start_process(&self, process: Ref<dyn Process>) {
        process.initialize();
        info!("process {} started", process.name());
        self.processes.lock().push(process);
    }

    /// Subscribes `service` to `event_id` on the default dispatcher.
    pub fn attach(&self, event_id: u32, service: &Ref<Service>) -> RuntimeResult<()> {
        self.ensure_open()?;
        self.dispatcher.subscribe(event_id, service)?;
        Ok(())
    }

    pub fn post(&self, message: Ref<Message>) -> RuntimeResult<()> {
        self.ensure_open()?;
        self.dispatcher.post(message)?;
        Ok(())
    }

    /// Creates a message in the default manager and posts it.
    pub fn post_event(
        &self,
        event_id: u32,
        sender: Option<&Ref<dyn Object>>,
        user_data: &[u8],
    ) -> RuntimeResult<()> {
        self.ensure_open()?;
        let message = Message::new(&self.manager, event_id, sender, user_data)?;
        self.post(message)
    }

    /// Waits until the default dispatcher has delivered everything queued.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.dispatcher.wait_idle(timeout)
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops processes in reverse start order, unloads modules and disposes
    /// every object still alive. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("runtime shutting down");
        let processes = std::mem::take(&mut *self.processes.lock());
        for process in processes.iter().rev() {
            info!("stopping process {}", process.name());
            process.shutdown();
        }
        drop(processes);
        self.modules.unload_all();
        self.manager.shutdown();
    }

    fn ensure_open(&self) -> RuntimeResult<()> {
        if self.is_shut_down() {
            return Err(RuntimeError::ShutDown);
        }
        Ok(())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("manager", &self.manager)
            .field("dispatcher", &self.dispatcher.name())
            .field("processes", &self.processes.lock().len())
            .field("closed", &self.is_shut_down())
            .finish()
    }
}

//! Loadable modules.
//!
//! A module is an object that registers classes or services with the runtime
//! when loaded. Loaders resolve a path to a module instance; the built-in
//! [`StaticModuleLoader`] resolves paths against entry points registered in
//! process, so modules linked into the binary load the same way shared
//! libraries would.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ecds_object::{MemoryManager, Object, ObjectResult, Ref};
use log::{info, warn};
use parking_lot::{Mutex, RwLock};

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::Runtime;

pub trait Module: Object {
    /// Called once after loading; registers whatever the module provides.
    fn register(&self, runtime: &Runtime) -> RuntimeResult<()>;
}

/// Module entry point, the equivalent of a library's constructor symbol.
pub type ModuleEntry = Arc<dyn Fn(&MemoryManager) -> ObjectResult<Ref<dyn Module>> + Send + Sync>;

pub trait ModuleLoader: Send + Sync {
    fn load(&self, manager: &MemoryManager, path: &Path) -> RuntimeResult<Ref<dyn Module>>;
}

#[derive(Default)]
pub struct StaticModuleLoader {
    entries: RwLock<HashMap<PathBuf, ModuleEntry>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `entry` loadable under `path`, replacing any earlier entry.
    pub fn register<F>(&self, path: impl Into<PathBuf>, entry: F)
    where
        F: Fn(&MemoryManager) -> ObjectResult<Ref<dyn Module>> + Send + Sync + 'static,
    {
        self.entries.write().insert(path.into(), Arc::new(entry));
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load(&self, manager: &MemoryManager, path: &Path) -> RuntimeResult<Ref<dyn Module>> {
        let entry = self.entries.read().get(path).cloned();
        let Some(entry) = entry else {
            return Err(RuntimeError::ModuleNotFound(path.to_path_buf()));
        };
        entry(manager).map_err(|err| RuntimeError::module_load(path, err.to_string()))
    }
}

/// Loaded modules, in load order.
pub struct ModuleManager {
    loader: Arc<dyn ModuleLoader>,
    modules: Mutex<Vec<Ref<dyn Module>>>,
}

impl ModuleManager {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            modules: Mutex::new(Vec::new()),
        }
    }

    /// Loads the module at `path` and lets it register with `runtime`.
    pub fn load(&self, runtime: &Runtime, path: &Path) -> RuntimeResult<Ref<dyn Module>> {
        let module = self.loader.load(runtime.manager(), path).map_err(|err| {
            warn!("unable to load module from {}: {err}", path.display());
            err
        })?;
        module.register(runtime).map_err(|err| {
            warn!("module {} failed to register: {err}", module.name());
            err
        })?;
        info!("loaded module {} from {}", module.name(), path.display());
        self.modules.lock().push(module.clone());
        Ok(module)
    }

    pub fn modules(&self) -> Vec<Ref<dyn Module>> {
        self.modules.lock().clone()
    }

    /// Releases every loaded module, newest first.
    pub fn unload_all(&self) {
        let modules = std::mem::take(&mut *self.modules.lock());
        for module in modules.into_iter().rev() {
            info!("unloading module {}", module.name());
            drop(module);
        }
    }
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new(Arc::new(StaticModuleLoader::new()))
    }
}

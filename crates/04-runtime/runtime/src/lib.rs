//! Runtime assembly: the context that owns the memory manager, class
//! registry, module manager and default dispatcher, plus logging and
//! configuration.
#![allow(missing_docs)]

mod class_registry;
mod config;
mod error;
pub mod logging;
mod module;
mod runtime;
mod test_class;

pub use class_registry::{ClassRegistry, Constructor, AUTO_CLASS_UID_MASK};
pub use config::{RuntimeConfig, LOG_LEVEL_VAR, SHUTDOWN_POLICY_VAR};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LogLevel;
pub use module::{Module, ModuleEntry, ModuleLoader, ModuleManager, StaticModuleLoader};
pub use runtime::{Runtime, VERSION};
pub use test_class::{register_test_class, TestObject, TEST_CLASS_NAME};

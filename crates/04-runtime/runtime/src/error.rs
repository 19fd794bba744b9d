use std::path::PathBuf;

use ecds_bus::DispatchError;
use ecds_object::ObjectError;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("class `{0}` is not registered")]
    UnknownClass(String),

    #[error("no free class uid left for `{0}`")]
    ClassUidsExhausted(String),

    #[error("no module registered at {0:?}")]
    ModuleNotFound(PathBuf),

    #[error("module at {path:?} failed to load: {reason}")]
    ModuleLoad { path: PathBuf, reason: String },

    #[error("invalid log level `{0}`")]
    InvalidLogLevel(String),

    #[error("runtime is shut down")]
    ShutDown,

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl RuntimeError {
    pub fn module_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RuntimeError::ModuleLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

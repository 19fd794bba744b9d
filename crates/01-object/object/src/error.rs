use thiserror::Error;

pub type ObjectResult<T> = Result<T, ObjectError>;

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("memory manager `{0}` is shut down")]
    ManagerClosed(String),

    #[error("object `{name}` is owned by memory manager `{owner}`")]
    ForeignManager { name: String, owner: String },

    #[error("object `{0}` is not bound to a memory manager")]
    Unbound(String),

    #[error("object `{0}` has externally controlled lifetime")]
    Unmanaged(String),

    #[error("object `{0}` was already disposed")]
    Disposed(String),

    #[error("failed to construct `{name}`: {reason}")]
    Construct { name: String, reason: String },

    #[error("unknown property {0:#010X}")]
    UnknownProperty(u32),

    #[error("property {0:#010X} is read-only")]
    ReadOnlyProperty(u32),

    #[error("invalid value for property {0:#010X}")]
    InvalidProperty(u32),
}

impl ObjectError {
    pub fn construct(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ObjectError::Construct {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

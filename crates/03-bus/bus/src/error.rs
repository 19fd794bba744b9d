use ecds_object::ObjectError;
use thiserror::Error;

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher `{0}` is stopped")]
    Stopped(String),

    #[error("user data of {len} bytes exceeds the {max} byte limit")]
    UserDataTooLarge { len: usize, max: usize },

    #[error("unknown shutdown policy `{0}` (expected drop or drain)")]
    UnknownPolicy(String),

    #[error("failed to spawn dispatcher worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Object(#[from] ObjectError),
}

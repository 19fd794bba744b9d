//! Object model and memory manager for the ECDS runtime.
//!
//! Every runtime entity implements [`Object`] and embeds a [`Header`] carrying
//! its name, uid, type tag and lifetime policy. Shared objects are created
//! through a [`MemoryManager`], which hands out counted [`Ref`] handles and
//! runs each object's `dispose` hook exactly once when the last reference is
//! released.
#![allow(missing_docs)]

mod error;
mod header;
mod manager;
mod object;

pub use error::{ObjectError, ObjectResult};
pub use header::{Header, Ownership, TypeUid};
pub use manager::{MemoryManager, Ref};
pub use object::{Object, ObjectCast, Process, PropertyValue};

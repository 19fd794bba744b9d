//! Ownership-transferring containers for runtime objects.
//!
//! [`List`] keeps an ordered sequence of [`ListItem`]s, each holding one
//! counted reference to its payload. [`Queue`] is the FIFO view used by the
//! dispatcher's message queue.
#![allow(missing_docs)]

mod arena;
mod item;
mod list;
mod ops;
mod queue;

pub use item::ListItem;
pub use list::List;
pub use queue::Queue;

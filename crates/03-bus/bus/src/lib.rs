//! Publish/subscribe bus for runtime objects.
//!
//! A [`Service`] maps event ids to handlers. A [`Dispatcher`] owns a message
//! queue, a table of [`Subscription`] entries and a worker thread that hands
//! each posted [`Message`] to the services subscribed to its event id.
#![allow(missing_docs)]

mod config;
mod dispatcher;
mod error;
mod message;
mod metrics;
mod service;
mod subscription;

pub use config::{DispatcherConfig, ShutdownPolicy};
pub use dispatcher::{Dispatcher, DispatcherHandle, DispatcherPhase};
pub use error::{DispatchError, DispatchResult};
pub use message::{Message, UserData, MAX_USER_DATA, PROP_EVENT_ID, PROP_USER_DATA};
pub use metrics::DispatcherMetricsSnapshot;
pub use service::Service;
pub use subscription::Subscription;

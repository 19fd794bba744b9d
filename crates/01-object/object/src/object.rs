//! Capability set shared by every runtime entity.

use std::any::Any;
use std::sync::Arc;

use crate::error::{ObjectError, ObjectResult};
use crate::header::{Header, TypeUid};

/// Value exchanged through the property accessors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Base behaviour of every runtime object.
///
/// Implementors embed a [`Header`] and override the lifecycle hooks they need.
/// `dispose` runs exactly once, when the last counted reference is released;
/// it takes `&self`, so state torn down there lives behind interior
/// mutability.
pub trait Object: ObjectCast + Send + Sync + 'static {
    fn header(&self) -> &Header;

    /// Runs once, right after the memory manager allocated the object.
    fn construct(&self) {}

    /// Releases owned sub-objects. May release further references.
    fn dispose(&self) {}

    fn get_property(&self, _property_id: u32) -> Option<PropertyValue> {
        None
    }

    fn set_property(&self, property_id: u32, _value: PropertyValue) -> ObjectResult<()> {
        Err(ObjectError::UnknownProperty(property_id))
    }

    fn name(&self) -> String {
        self.header().name()
    }

    fn uid(&self) -> u32 {
        self.header().uid()
    }

    fn type_uid(&self) -> TypeUid {
        self.header().type_uid()
    }
}

/// Conversions used to move between concrete objects and `dyn Object`.
///
/// Implemented for every sized [`Object`]; it exists so the conversions stay
/// callable through trait objects.
pub trait ObjectCast {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn into_object_arc(self: Arc<Self>) -> Arc<dyn Object>;
}

impl<T: Object> ObjectCast for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn into_object_arc(self: Arc<Self>) -> Arc<dyn Object> {
        self
    }
}

/// Long-lived object that owns work outside the caller's thread.
pub trait Process: Object {
    /// Called once when the owning runtime starts the process.
    fn initialize(&self) {}

    /// One cooperative step for processes without their own thread.
    fn run(&self) {}

    /// Stops the process. Must be idempotent.
    fn shutdown(&self);

    fn is_running(&self) -> bool;
}

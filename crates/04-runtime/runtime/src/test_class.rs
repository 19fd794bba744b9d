//! Minimal class used to smoke-test class registration and construction.

use ecds_object::{Header, MemoryManager, Object, ObjectResult, Ref, TypeUid};
use log::info;

use crate::class_registry::ClassRegistry;
use crate::error::RuntimeResult;

pub const TEST_CLASS_NAME: &str = "ecds-test-class";

pub struct TestObject {
    header: Header,
}

impl TestObject {
    pub fn create(manager: &MemoryManager, name: &str) -> ObjectResult<Ref<TestObject>> {
        manager.create(Some(name), TypeUid::TEST, |header| TestObject { header })
    }
}

impl Object for TestObject {
    fn header(&self) -> &Header {
        &self.header
    }

    fn construct(&self) {
        info!("constructing new test class {}", self.header.name());
    }

    fn dispose(&self) {
        info!("disposing test class {}", self.header.name());
    }
}

/// Registers [`TestObject`] under [`TEST_CLASS_NAME`].
pub fn register_test_class(classes: &ClassRegistry) -> RuntimeResult<u32> {
    classes.register(TEST_CLASS_NAME, TypeUid::TEST.get(), |manager, name| {
        Ok(TestObject::create(manager, name)?.into_object())
    })
}

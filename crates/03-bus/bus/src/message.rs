use std::fmt;

use ecds_object::{Header, MemoryManager, Object, PropertyValue, Ref, TypeUid};
use parking_lot::Mutex;

use crate::error::{DispatchError, DispatchResult};

/// Largest payload a message can carry.
pub const MAX_USER_DATA: usize = u16::MAX as usize;

pub const PROP_EVENT_ID: u32 = 1;
pub const PROP_USER_DATA: u32 = 2;

/// Opaque message payload. Each handler receives its own copy.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserData {
    bytes: Vec<u8>,
}

impl UserData {
    pub fn new(bytes: &[u8]) -> DispatchResult<Self> {
        if bytes.len() > MAX_USER_DATA {
            return Err(DispatchError::UserDataTooLarge {
                len: bytes.len(),
                max: MAX_USER_DATA,
            });
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn len(&self) -> u16 {
        // bounded by MAX_USER_DATA at construction
        self.bytes.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData").field("len", &self.len()).finish()
    }
}

/// An event travelling through a dispatcher.
pub struct Message {
    header: Header,
    event_id: u32,
    sender: Mutex<Option<Ref<dyn Object>>>,
    user_data: UserData,
}

impl Message {
    /// Creates a message, copying `user_data`. Payloads longer than
    /// [`MAX_USER_DATA`] are rejected.
    pub fn new(
        manager: &MemoryManager,
        event_id: u32,
        sender: Option<&Ref<dyn Object>>,
        user_data: &[u8],
    ) -> DispatchResult<Ref<Message>> {
        let user_data = UserData::new(user_data)?;
        let message = manager.create(None, TypeUid::MESSAGE, |header| Message {
            header,
            event_id,
            sender: Mutex::new(sender.cloned()),
            user_data,
        })?;
        Ok(message)
    }

    pub fn event_id(&self) -> u32 {
        self.event_id
    }

    pub fn sender(&self) -> Option<Ref<dyn Object>> {
        self.sender.lock().clone()
    }

    pub fn user_data(&self) -> &UserData {
        &self.user_data
    }
}

impl Object for Message {
    fn header(&self) -> &Header {
        &self.header
    }

    fn dispose(&self) {
        let sender = self.sender.lock().take();
        drop(sender);
    }

    fn get_property(&self, property_id: u32) -> Option<PropertyValue> {
        match property_id {
            PROP_EVENT_ID => Some(PropertyValue::UInt(u64::from(self.event_id))),
            PROP_USER_DATA => Some(PropertyValue::Bytes(self.user_data.as_bytes().to_vec())),
            _ => None,
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("uid", &self.header.uid())
            .field("event_id", &self.event_id)
            .field("user_data", &self.user_data)
            .finish()
    }
}

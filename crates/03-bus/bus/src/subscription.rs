use std::fmt;

use ecds_list::List;
use ecds_object::{Header, MemoryManager, Object, ObjectResult, Ref, TypeUid};

use crate::service::Service;

/// The services subscribed to one event id, in subscription order.
pub struct Subscription {
    header: Header,
    event_id: u32,
    services: Ref<List<Service>>,
}

impl Subscription {
    pub fn new(manager: &MemoryManager, event_id: u32) -> ObjectResult<Ref<Subscription>> {
        let name = format!("subscription-{event_id}");
        let services = List::new(manager, Some(&format!("{name}-services")))?;
        manager.create(Some(&name), TypeUid::SUBSCRIPTION, |header| Subscription {
            header,
            event_id,
            services,
        })
    }

    pub fn event_id(&self) -> u32 {
        self.event_id
    }

    pub fn services(&self) -> Vec<Ref<Service>> {
        self.services.to_vec()
    }

    pub fn contains(&self, service: &Service) -> bool {
        self.services.find_item(service).is_some()
    }

    /// Appends `service` unless it is already subscribed.
    pub fn add(&self, service: &Ref<Service>) -> bool {
        if self.contains(service) {
            return false;
        }
        self.services.add_item(service);
        true
    }

    /// Removes `service`, handing back the reference the entry held.
    pub fn remove(&self, service: &Service) -> Option<Ref<Service>> {
        self.services.find_item(service).map(|item| item.dispose())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Object for Subscription {
    fn header(&self) -> &Header {
        &self.header
    }

    fn dispose(&self) {
        self.services.clear();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event_id", &self.event_id)
            .field("services", &self.services.len())
            .finish()
    }
}

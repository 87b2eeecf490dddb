//! The "entity will be executed" notification point.
//!
//! Reactive systems announce each entity right before processing it through
//! an [`ExecutionBus`], usually with an [`ObservableSystem`]. Announcing with
//! no system (`None`) means the entity went idle.
//!
//! Dispatch is synchronous: [`ExecutionBus::publish`] only returns once every
//! subscriber ran. Subscribers must not publish from within their own
//! callback, such nested calls are skipped with a warning. Publishing from
//! several threads at once is fine, a subscriber handles one event at a time.
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use bevy::log::warn;
use bevy::prelude::Resource;

use crate::identity::{ObservedEntity, SystemHandle};

type Callback = dyn FnMut(&ObservedEntity, Option<&SystemHandle>) + Send;

struct Slot {
    id: u64,
    active: AtomicBool,
    callback: Mutex<Box<Callback>>,
}

thread_local! {
    /// Subscribers currently running on this thread.
    static DISPATCHING: RefCell<Vec<usize>> = RefCell::new(Vec::new());
}

/// Marks a subscriber as running on this thread until dropped.
struct Dispatching(usize);
impl Dispatching {
    /// `None` if `slot` is already running on this thread.
    fn enter(slot: &Arc<Slot>) -> Option<Self> {
        let id = Arc::as_ptr(slot) as usize;
        DISPATCHING.with(|running| {
            let mut running = running.borrow_mut();
            if running.contains(&id) {
                return None;
            }
            running.push(id);
            Some(Self(id))
        })
    }
}
impl Drop for Dispatching {
    fn drop(&mut self) {
        DISPATCHING.with(|running| running.borrow_mut().retain(|id| *id != self.0));
    }
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    slots: Vec<Arc<Slot>>,
}
impl Subscribers {
    fn remove(&mut self, id: u64) {
        if let Some(index) = self.slots.iter().position(|slot| slot.id == id) {
            let slot = self.slots.remove(index);
            slot.active.store(false, Ordering::Release);
        }
    }
}

/// Shared handle to the subscriber list, clone it freely.
#[derive(Resource, Clone, Default)]
pub struct ExecutionBus(Arc<Mutex<Subscribers>>);
impl ExecutionBus {
    fn subscribers(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Call `callback` on every published event until the returned
    /// [`Subscription`] is dropped or [unsubscribed](Subscription::unsubscribe).
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(
        &self,
        callback: impl FnMut(&ObservedEntity, Option<&SystemHandle>) + Send + 'static,
    ) -> Subscription {
        let mut subscribers = self.subscribers();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.slots.push(Arc::new(Slot {
            id,
            active: AtomicBool::new(true),
            callback: Mutex::new(Box::new(callback)),
        }));
        Subscription { bus: Arc::downgrade(&self.0), id: Some(id) }
    }

    /// Run all current subscribers, in registration order.
    ///
    /// Subscribers added while this runs only see later events.
    pub fn publish(&self, entity: &ObservedEntity, system: Option<&SystemHandle>) {
        let snapshot = self.subscribers().slots.clone();
        for slot in snapshot {
            if !slot.active.load(Ordering::Acquire) {
                continue;
            }
            let Some(_running) = Dispatching::enter(&slot) else {
                warn!(
                    "Subscriber re-entered the execution bus while handling {}, skipping it",
                    entity.key
                );
                continue;
            };
            let mut callback = slot.callback.lock().unwrap_or_else(PoisonError::into_inner);
            (&mut **callback)(entity, system);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().slots.len()
    }
    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() != 0
    }
}

/// Capability to stay subscribed to an [`ExecutionBus`].
///
/// Dropping it unsubscribes.
pub struct Subscription {
    bus: Weak<Mutex<Subscribers>>,
    id: Option<u64>,
}
impl Subscription {
    /// Stop receiving events. Calling this more than once does nothing.
    pub fn unsubscribe(&mut self) {
        let Some(id) = self.id.take() else { return };
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).remove(id);
        }
    }
    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.bus.strong_count() != 0
    }
}
impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// A reactive system that tells the bus which entities it is about to
/// execute.
#[derive(Clone)]
pub struct ObservableSystem {
    system: SystemHandle,
    bus: ExecutionBus,
}
impl ObservableSystem {
    pub fn new(system: SystemHandle, bus: ExecutionBus) -> Self {
        Self { system, bus }
    }
    pub fn system(&self) -> &SystemHandle {
        &self.system
    }
    /// Announce every entity of the batch, in order.
    pub fn execute<'a>(&self, entities: impl IntoIterator<Item = &'a ObservedEntity>) {
        if !self.bus.has_subscribers() {
            return;
        }
        for entity in entities {
            self.bus.publish(entity, Some(&self.system));
        }
    }
}

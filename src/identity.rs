//! Who is being executed, and by what.
//!
//! Entities are identified by value ([`EntityKey`]), systems by identity
//! ([`SystemHandle`]): two systems sharing a name are still two systems.
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use bevy::prelude::{Entity, Event, Resource};

/// Identity of an entity: the context it lives in and its creation index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub context: String,
    pub index: u32,
}
impl EntityKey {
    pub fn new(context: impl Into<String>, index: u32) -> Self {
        Self { context: context.into(), index }
    }
}
impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.context, self.index)
    }
}

/// What the ECS tells us about an entity when it gets executed.
///
/// `display` is the entity's own string form, usually its creation index
/// followed by its components, see [`crate::label`] for how it is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedEntity {
    pub key: EntityKey,
    pub display: String,
}
impl ObservedEntity {
    pub fn new(context: impl Into<String>, index: u32, display: impl Into<String>) -> Self {
        Self { key: EntityKey::new(context, index), display: display.into() }
    }
}

#[derive(Debug)]
struct SystemInfo {
    name: String,
    order: usize,
}

/// A system, compared by identity.
#[derive(Debug, Clone)]
pub struct SystemHandle(Arc<SystemInfo>);
impl SystemHandle {
    /// A system that isn't part of any [`SystemPipeline`], for systems
    /// added after startup.
    pub fn detached(name: impl Into<String>) -> Self {
        Self::with_order(name, usize::MAX)
    }
    fn with_order(name: impl Into<String>, order: usize) -> Self {
        Self(Arc::new(SystemInfo { name: name.into(), order }))
    }
    pub fn name(&self) -> &str {
        &self.0.name
    }
    /// Position in the [`SystemPipeline`] execution order, `usize::MAX` if
    /// [detached](Self::detached).
    pub fn order(&self) -> usize {
        self.0.order
    }
}
impl PartialEq for SystemHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for SystemHandle {}
impl Hash for SystemHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}
impl fmt::Display for SystemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// The configured systems, in execution order.
///
/// Systems registered here are laid out when the overlay starts, systems
/// seen later on the bus are laid out when they first show up.
#[derive(Resource, Debug, Clone, Default)]
pub struct SystemPipeline(Arc<Mutex<Vec<SystemHandle>>>);
impl SystemPipeline {
    pub fn register(&self, name: impl Into<String>) -> SystemHandle {
        let mut systems = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let handle = SystemHandle::with_order(name, systems.len());
        systems.push(handle.clone());
        handle
    }
    pub fn systems(&self) -> Vec<SystemHandle> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
    pub fn len(&self) -> usize {
        self.0.lock().map_or(0, |systems| systems.len())
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What the ECS tells the overlay about entity scene objects.
///
/// Send these with an `EventWriter<EntityLifecycle>`: entities only show up
/// in the overlay once their scene object is announced with
/// [`EntityLifecycle::Created`].
#[derive(Event, Debug, Clone)]
pub enum EntityLifecycle {
    /// `visual` is the scene object standing for `entity`, owned by the
    /// sender.
    Created { entity: ObservedEntity, visual: Entity },
    /// The entity's components changed.
    Changed(ObservedEntity),
    Destroyed(EntityKey),
}

//! Bookkeeping of which proxy stands for which system or entity.
use bevy::utils::HashMap;

use crate::identity::{EntityKey, ObservedEntity, SystemHandle};
use crate::proxy::{EntityProxy, SystemProxy};

/// System proxies by slot, slot 0 being the "no system" sentinel.
///
/// Only ever grows.
#[derive(Debug)]
pub struct SystemRegistry<N> {
    slots: Vec<SystemProxy<N>>,
    by_system: HashMap<SystemHandle, usize>,
}
impl<N> SystemRegistry<N> {
    pub fn new(sentinel: SystemProxy<N>) -> Self {
        debug_assert_eq!(sentinel.slot, 0);
        Self { slots: vec![sentinel], by_system: HashMap::default() }
    }
    /// Slot the next inserted system will occupy.
    pub fn next_slot(&self) -> usize {
        self.slots.len()
    }
    fn slot_of(&self, system: Option<&SystemHandle>) -> Option<usize> {
        match system {
            None => Some(0),
            Some(system) => self.by_system.get(system).copied(),
        }
    }
    /// `None` stands for the sentinel.
    pub fn get(&self, system: Option<&SystemHandle>) -> Option<&SystemProxy<N>> {
        self.slot_of(system).map(|slot| &self.slots[slot])
    }
    /// Panics if `slot` was never handed out.
    pub fn slot(&self, slot: usize) -> &SystemProxy<N> {
        &self.slots[slot]
    }
    /// Panics if `slot` was never handed out.
    pub fn slot_mut(&mut self, slot: usize) -> &mut SystemProxy<N> {
        &mut self.slots[slot]
    }
    /// Store `proxy`, which must have been built for [`Self::next_slot`].
    pub fn insert(&mut self, system: SystemHandle, proxy: SystemProxy<N>) -> &mut SystemProxy<N> {
        debug_assert_eq!(proxy.slot, self.next_slot());
        let slot = self.slots.len();
        self.slots.push(proxy);
        self.by_system.insert(system, slot);
        &mut self.slots[slot]
    }
    /// All proxies, sentinel included, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &SystemProxy<N>> + '_ {
        self.slots.iter()
    }
    /// Number of slots, sentinel included.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// An entity whose scene object was handed to us.
#[derive(Debug, Clone)]
struct Known<V> {
    entity: ObservedEntity,
    visual: V,
}

/// Entity proxies, and the scene objects they can be built from.
///
/// Scene objects are pushed here by whoever spawns them, proxies are only
/// created once the entity is seen executing (or at startup).
#[derive(Debug)]
pub struct EntityRegistry<V, N> {
    known: HashMap<EntityKey, Known<V>>,
    proxies: HashMap<EntityKey, EntityProxy<V, N>>,
}
impl<V, N> Default for EntityRegistry<V, N> {
    fn default() -> Self {
        Self { known: HashMap::default(), proxies: HashMap::default() }
    }
}
impl<V, N> EntityRegistry<V, N> {
    /// Returns the scene object previously registered for this entity.
    pub fn register_visual(&mut self, entity: ObservedEntity, visual: V) -> Option<V> {
        let key = entity.key.clone();
        self.known.insert(key, Known { entity, visual }).map(|known| known.visual)
    }
    pub fn forget_visual(&mut self, key: &EntityKey) -> Option<V> {
        self.known.remove(key).map(|known| known.visual)
    }
    pub fn visual(&self, key: &EntityKey) -> Option<&V> {
        self.known.get(key).map(|known| &known.visual)
    }
    /// Remember the latest string form of an entity. Returns `false` if it
    /// has no scene object.
    pub fn refresh(&mut self, entity: &ObservedEntity) -> bool {
        match self.known.get_mut(&entity.key) {
            Some(known) => {
                known.entity.display.clone_from(&entity.display);
                true
            }
            None => false,
        }
    }
    /// Every entity with a known scene object, sorted by key.
    pub fn known(&self) -> Vec<ObservedEntity> {
        let mut entities: Vec<_> = self.known.values().map(|known| known.entity.clone()).collect();
        entities.sort_unstable_by(|a, b| a.key.cmp(&b.key));
        entities
    }
    pub fn proxy(&self, key: &EntityKey) -> Option<&EntityProxy<V, N>> {
        self.proxies.get(key)
    }
    pub fn proxy_mut(&mut self, key: &EntityKey) -> Option<&mut EntityProxy<V, N>> {
        self.proxies.get_mut(key)
    }
    pub fn insert_proxy(&mut self, key: EntityKey, proxy: EntityProxy<V, N>) -> &mut EntityProxy<V, N> {
        self.proxies.entry(key).insert(proxy).into_mut()
    }
    pub fn remove_proxy(&mut self, key: &EntityKey) -> Option<EntityProxy<V, N>> {
        self.proxies.remove(key)
    }
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }
}

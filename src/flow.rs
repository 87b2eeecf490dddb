//! Move entity proxies to the system executing them.
//!
//! # Architecture Overview
//!
//! * Every system gets an anchor on a circle ([`FlowConfig::system_ring`]),
//!   slot 0 being the "no system" sentinel where idle entities rest.
//! * Entities get a proxy wrapping the scene object their owner registered
//!   through [`FlowObserver::entity_created`]. When an entity is executed,
//!   its proxy moves to the system's anchor, offset on a second, smaller
//!   circle ([`FlowConfig::entity_ring`]) and pushed a bit further in depth
//!   on every placement so that proxies sharing an anchor don't z-fight.
//! * [`FlowSession`] ties a [`FlowObserver`] to an [`ExecutionBus`]: it
//!   lays out everything known at startup, then places one entity per
//!   published event.
//!
//! The observer never touches the scene itself, it asks a [`SceneHost`] to.
use std::sync::{Arc, Mutex, MutexGuard};

use bevy::log::{debug, info, warn};
use bevy::math::Vec3;
use bevy::prelude::Resource;
use thiserror::Error;

use crate::bus::{ExecutionBus, Subscription};
use crate::identity::{EntityKey, ObservedEntity, SystemHandle};
use crate::label::{entity_label, LabelStyle, NULL_SYSTEM_NAME};
use crate::layout::CircularLayout;
use crate::proxy::{EntityProxy, LogOverflow, Proxy, ProxyLog, SystemProxy};
use crate::registry::{EntityRegistry, SystemRegistry};

/// Where to move an entity's scene object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Move<'a, N> {
    /// Make it a child of `anchor`, at `local` relative to it.
    Attach { anchor: &'a N, local: Vec3 },
    /// Set its world position.
    Reposition { position: Vec3 },
}

/// The scene the overlay draws in.
///
/// `Visual`s belong to whoever spawned the entity, `Node`s are spawned by
/// the overlay.
pub trait SceneHost {
    type Visual: Clone;
    type Node: Clone;

    fn spawn_anchor(&mut self, slot: usize, position: Vec3) -> Self::Node;
    fn spawn_system_proxy(&mut self, anchor: &Self::Node, label: &str) -> Self::Node;
    fn spawn_entity_proxy(&mut self, visual: &Self::Visual, label: &str) -> Self::Node;
    /// Remove an entity proxy spawned with [`Self::spawn_entity_proxy`].
    fn despawn_node(&mut self, node: &Self::Node);
    /// Update the text shown on `node` and/or play the named animation.
    fn present(&mut self, node: &Self::Node, label: Option<&str>, pulse: Option<&str>);
    fn move_visual(&mut self, visual: &Self::Visual, to: Move<'_, Self::Node>);
    fn draw_connector(&mut self, visual: &Self::Visual, from: Vec3, to: Vec3);
    /// Remove connectors still showing for `visual`.
    fn clear_trail(&mut self, visual: &Self::Visual);
    fn destroy_visual(&mut self, visual: &Self::Visual);
}

/// What happens to an entity's scene object when the entity is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestroyPolicy {
    /// Forget the proxy, the owner despawns the scene object.
    #[default]
    LeaveToOwner,
    /// Forget the proxy and despawn the scene object.
    DestroyVisual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowConfig {
    /// Entries kept in each proxy's log, `0` disables logs.
    pub max_logs: usize,
    /// What a full log does with new entries.
    pub log_overflow: LogOverflow,
    pub suppress_duplicate_logs: bool,
    pub system_ring: CircularLayout,
    pub entity_ring: CircularLayout,
    /// Draw a line from an entity's previous position to its new one.
    pub draw_connector: bool,
    /// Parent entity scene objects to their system's anchor instead of
    /// only moving them there.
    pub attach_to_system: bool,
    /// Animation played on proxies when they execute.
    pub executed_state: String,
    /// Depth added (towards -Z) on each placement.
    pub depth_step: f32,
    pub label_style: LabelStyle,
    pub destroy_policy: DestroyPolicy,
}
impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_logs: 32,
            log_overflow: LogOverflow::default(),
            suppress_duplicate_logs: true,
            system_ring: CircularLayout::SYSTEMS,
            entity_ring: CircularLayout::ENTITIES,
            draw_connector: false,
            attach_to_system: false,
            executed_state: "Executed".to_owned(),
            depth_step: 0.001,
            label_style: LabelStyle::default(),
            destroy_policy: DestroyPolicy::default(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("no scene object was registered for entity {0}")]
    MissingVisual(EntityKey),
}

pub struct FlowObserver<H: SceneHost> {
    config: FlowConfig,
    host: H,
    systems: SystemRegistry<H::Node>,
    entities: EntityRegistry<H::Visual, H::Node>,
    placements: u64,
}
impl<H: SceneHost> FlowObserver<H> {
    /// Create the observer, spawning the sentinel anchor right away.
    pub fn new(config: FlowConfig, mut host: H) -> Self {
        let position = config.system_ring.position(0);
        let anchor = host.spawn_anchor(0, position);
        let node = host.spawn_system_proxy(&anchor, NULL_SYSTEM_NAME);
        let proxy = Proxy::new(node, NULL_SYSTEM_NAME.to_owned(), new_log(&config));
        let sentinel = SystemProxy { proxy, anchor, slot: 0, position };
        Self {
            systems: SystemRegistry::new(sentinel),
            entities: EntityRegistry::default(),
            placements: 0,
            config,
            host,
        }
    }

    /// Lay out `pipeline` in order, then rest every known entity on the
    /// sentinel.
    pub fn synchronize(&mut self, pipeline: &[SystemHandle]) {
        for system in pipeline {
            self.ensure_system(system, false);
        }
        for entity in self.entities.known() {
            if let Err(err) = self.place(&entity, None) {
                warn!("Could not rest {} on the sentinel: {err}", entity.key);
            }
        }
        debug!(
            "Synchronized {} systems and {} entities",
            self.systems.slot_count() - 1,
            self.entities.proxy_count()
        );
    }

    /// Give `system` an anchor if it doesn't have one yet.
    pub fn register_system(&mut self, system: &SystemHandle) -> &SystemProxy<H::Node> {
        let slot = self.ensure_system(system, false);
        self.systems.slot(slot)
    }

    fn ensure_system(&mut self, system: &SystemHandle, discovered: bool) -> usize {
        if let Some(proxy) = self.systems.get(Some(system)) {
            return proxy.slot;
        }
        let slot = self.systems.next_slot();
        if discovered {
            info!("System {system} first seen executing, laying it out in slot {slot}");
        }
        let position = self.config.system_ring.position(slot);
        let anchor = self.host.spawn_anchor(slot, position);
        let label = system.to_string();
        let node = self.host.spawn_system_proxy(&anchor, &label);
        let proxy = Proxy::new(node, label, new_log(&self.config));
        self.systems.insert(system.clone(), SystemProxy { proxy, anchor, slot, position });
        slot
    }

    /// `entity` now has a scene object, owned by the caller.
    ///
    /// Any proxy left over from a previous scene object is dropped.
    pub fn entity_created(&mut self, entity: ObservedEntity, visual: H::Visual) {
        let key = entity.key.clone();
        self.entities.register_visual(entity, visual);
        if self.drop_proxy(&key) {
            debug!("Replaced scene object of {key}");
        }
    }

    fn drop_proxy(&mut self, key: &EntityKey) -> bool {
        let Some(proxy) = self.entities.remove_proxy(key) else {
            return false;
        };
        self.host.clear_trail(&proxy.visual);
        self.host.despawn_node(&proxy.proxy.node);
        true
    }

    /// The components of `entity` changed, update its label.
    pub fn entity_changed(&mut self, entity: &ObservedEntity) {
        if !self.entities.refresh(entity) {
            return;
        }
        let label = entity_label(entity, self.config.label_style);
        if let Some(proxy) = self.entities.proxy_mut(&entity.key) {
            if proxy.proxy.rename(&label) {
                self.host.present(&proxy.proxy.node, Some(&label), None);
            }
        }
    }

    /// Forget `key` and its proxy. Executions of `key` are dropped until it
    /// is [created](Self::entity_created) again.
    pub fn entity_destroyed(&mut self, key: &EntityKey) {
        self.drop_proxy(key);
        let Some(visual) = self.entities.forget_visual(key) else { return };
        if self.config.destroy_policy == DestroyPolicy::DestroyVisual {
            self.host.destroy_visual(&visual);
        }
    }

    fn ensure_entity(&mut self, entity: &ObservedEntity) -> Result<(), FlowError> {
        if self.entities.proxy(&entity.key).is_some() {
            return Ok(());
        }
        let Some(visual) = self.entities.visual(&entity.key).cloned() else {
            return Err(FlowError::MissingVisual(entity.key.clone()));
        };
        self.entities.refresh(entity);
        let label = entity_label(entity, self.config.label_style);
        let node = self.host.spawn_entity_proxy(&visual, &label);
        let proxy = Proxy::new(node, label, new_log(&self.config));
        let proxy = EntityProxy { proxy, visual, position: Vec3::ZERO };
        self.entities.insert_proxy(entity.key.clone(), proxy);
        Ok(())
    }

    /// Move `entity` to the anchor of `system` (the sentinel if `None`).
    ///
    /// Returns the new world position of the entity's scene object.
    pub fn place(
        &mut self,
        entity: &ObservedEntity,
        system: Option<&SystemHandle>,
    ) -> Result<Vec3, FlowError> {
        self.ensure_entity(entity)?;
        let slot = match system {
            Some(system) => self.ensure_system(system, true),
            None => 0,
        };
        let label = entity_label(entity, self.config.label_style);

        let Self { config, host, systems, entities, placements } = self;
        let target = systems.slot_mut(slot);
        let Some(proxy) = entities.proxy_mut(&entity.key) else {
            return Err(FlowError::MissingVisual(entity.key.clone()));
        };

        let depth = Vec3::NEG_Z * (*placements as f32 * config.depth_step);
        *placements += 1;
        let local = config.entity_ring.position(entity.key.index as usize) + depth;
        let position = target.position + local;

        let visual = &proxy.visual;
        if proxy.is_placed() && config.draw_connector {
            host.draw_connector(visual, proxy.position, position);
        } else {
            host.clear_trail(visual);
        }
        let to = if config.attach_to_system {
            Move::Attach { anchor: &target.anchor, local }
        } else {
            Move::Reposition { position }
        };
        host.move_visual(visual, to);
        proxy.position = position;

        let pulse = Some(config.executed_state.as_str());
        let renamed = proxy.proxy.rename(&label);
        proxy.proxy.log.push(target.proxy.label());
        host.present(&proxy.proxy.node, renamed.then_some(label.as_str()), pulse);
        target.proxy.log.push(&label);
        host.present(&target.proxy.node, None, pulse);
        Ok(position)
    }

    /// Anchor position of `system`, the sentinel's if `None`.
    pub fn anchor(&self, system: Option<&SystemHandle>) -> Option<Vec3> {
        self.systems.get(system).map(|proxy| proxy.position)
    }
    pub fn system_proxy(&self, system: Option<&SystemHandle>) -> Option<&SystemProxy<H::Node>> {
        self.systems.get(system)
    }
    pub fn system_proxies(&self) -> impl Iterator<Item = &SystemProxy<H::Node>> + '_ {
        self.systems.iter()
    }
    pub fn entity_proxy(&self, key: &EntityKey) -> Option<&EntityProxy<H::Visual, H::Node>> {
        self.entities.proxy(key)
    }
    pub fn entity_position(&self, key: &EntityKey) -> Option<Vec3> {
        self.entities.proxy(key).map(|proxy| proxy.position)
    }
    /// How many placements happened so far.
    pub fn placements(&self) -> u64 {
        self.placements
    }
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }
    pub fn host(&self) -> &H {
        &self.host
    }
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

fn new_log(config: &FlowConfig) -> ProxyLog {
    ProxyLog::new(config.max_logs, config.suppress_duplicate_logs)
        .with_overflow(config.log_overflow)
}

/// A [`FlowObserver`] listening to an [`ExecutionBus`].
#[derive(Resource)]
pub struct FlowSession<H: SceneHost + Send + 'static> {
    observer: Arc<Mutex<FlowObserver<H>>>,
    subscription: Option<Subscription>,
}
impl<H> FlowSession<H>
where
    H: SceneHost + Send + 'static,
    H::Visual: Send,
    H::Node: Send,
{
    pub fn new(observer: FlowObserver<H>) -> Self {
        Self { observer: Arc::new(Mutex::new(observer)), subscription: None }
    }

    /// Synchronize with `pipeline`, then place entities as `bus` reports
    /// them executing.
    ///
    /// Starting again re-synchronizes and replaces the previous
    /// subscription, events are never delivered twice.
    pub fn start(&mut self, bus: &ExecutionBus, pipeline: &[SystemHandle]) {
        self.observer().synchronize(pipeline);
        self.stop();
        let observer = Arc::clone(&self.observer);
        self.subscription = Some(bus.subscribe(move |entity, system| {
            let mut observer = observer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err(err) = observer.place(entity, system) {
                warn!("Dropped execution of {}: {err}", entity.key);
            }
        }));
    }

    /// Stop listening. Does nothing if not started.
    pub fn stop(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
    pub fn is_running(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }
    pub fn observer(&self) -> MutexGuard<'_, FlowObserver<H>> {
        self.observer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Anchor(usize, Vec3),
        SystemProxy(u32, String),
        EntityProxy(&'static str, String),
        Present(u32, Option<String>, Option<String>),
        Attach(&'static str, u32, Vec3),
        Reposition(&'static str, Vec3),
        Connector(&'static str, Vec3, Vec3),
        ClearTrail(&'static str),
        DespawnNode(u32),
        Destroy(&'static str),
    }

    #[derive(Default)]
    struct RecordingHost {
        next_node: u32,
        calls: Vec<Call>,
    }
    impl RecordingHost {
        fn node(&mut self) -> u32 {
            self.next_node += 1;
            self.next_node
        }
    }
    impl SceneHost for RecordingHost {
        type Visual = &'static str;
        type Node = u32;

        fn spawn_anchor(&mut self, slot: usize, position: Vec3) -> u32 {
            self.calls.push(Call::Anchor(slot, position));
            self.node()
        }
        fn spawn_system_proxy(&mut self, _anchor: &u32, label: &str) -> u32 {
            let node = self.node();
            self.calls.push(Call::SystemProxy(node, label.to_owned()));
            node
        }
        fn spawn_entity_proxy(&mut self, visual: &&'static str, label: &str) -> u32 {
            self.calls.push(Call::EntityProxy(*visual, label.to_owned()));
            self.node()
        }
        fn despawn_node(&mut self, node: &u32) {
            self.calls.push(Call::DespawnNode(*node));
        }
        fn present(&mut self, node: &u32, label: Option<&str>, pulse: Option<&str>) {
            let call = Call::Present(*node, label.map(Into::into), pulse.map(Into::into));
            self.calls.push(call);
        }
        fn move_visual(&mut self, visual: &&'static str, to: Move<'_, u32>) {
            self.calls.push(match to {
                Move::Attach { anchor, local } => Call::Attach(*visual, *anchor, local),
                Move::Reposition { position } => Call::Reposition(*visual, position),
            });
        }
        fn draw_connector(&mut self, visual: &&'static str, from: Vec3, to: Vec3) {
            self.calls.push(Call::Connector(*visual, from, to));
        }
        fn clear_trail(&mut self, visual: &&'static str) {
            self.calls.push(Call::ClearTrail(*visual));
        }
        fn destroy_visual(&mut self, visual: &&'static str) {
            self.calls.push(Call::Destroy(*visual));
        }
    }

    fn observer(config: FlowConfig) -> FlowObserver<RecordingHost> {
        FlowObserver::new(config, RecordingHost::default())
    }
    fn entity(index: u32) -> ObservedEntity {
        ObservedEntity::new("Game", index, format!("Entity_{index}(*1)(Position)"))
    }
    fn log_of(observer: &FlowObserver<RecordingHost>, entity: &ObservedEntity) -> Vec<String> {
        let proxy = observer.entity_proxy(&entity.key).expect("entity has a proxy");
        proxy.proxy.log.iter().map(str::to_owned).collect()
    }
    fn system_log(observer: &FlowObserver<RecordingHost>, system: &SystemHandle) -> Vec<String> {
        let proxy = observer.system_proxy(Some(system)).expect("system has a proxy");
        proxy.proxy.log.iter().map(str::to_owned).collect()
    }
    fn connectors(observer: &FlowObserver<RecordingHost>) -> usize {
        let calls = &observer.host().calls;
        calls.iter().filter(|call| matches!(call, Call::Connector(..))).count()
    }

    #[test]
    fn systems_follow_circular_layout() {
        let config = FlowConfig::default();
        let ring = config.system_ring;
        let mut observer = observer(config);
        let (a, b) = (SystemHandle::detached("A"), SystemHandle::detached("B"));
        observer.synchronize(&[a.clone(), b.clone()]);

        let sentinel = observer.anchor(None).unwrap();
        let anchor_a = observer.anchor(Some(&a)).unwrap();
        let anchor_b = observer.anchor(Some(&b)).unwrap();
        assert_eq!(sentinel, ring.position(0));
        assert_eq!(anchor_a, ring.position(1));
        assert_eq!(anchor_b, ring.position(2));
        assert_ne!(sentinel, anchor_a);
        assert_ne!(anchor_a, anchor_b);
        assert_eq!(observer.system_proxy(Some(&b)).unwrap().slot, 2);
        assert_eq!(observer.system_proxy(None).unwrap().proxy.label(), NULL_SYSTEM_NAME);
    }
    #[test]
    fn registering_twice_keeps_anchor() {
        let mut observer = observer(FlowConfig::default());
        let a = SystemHandle::detached("A");
        let first = observer.register_system(&a).position;
        let anchors = observer.host().calls.len();
        let second = observer.register_system(&a).position;
        assert_eq!(first, second);
        assert_eq!(observer.host().calls.len(), anchors);
        assert_eq!(observer.system_proxies().count(), 2);
    }
    #[test]
    fn first_execution_creates_proxy() {
        let config = FlowConfig::default();
        let ring = config.entity_ring;
        let mut observer = observer(config);
        let a = SystemHandle::detached("A");
        observer.register_system(&a);
        let e = entity(4);
        observer.entity_created(e.clone(), "sprite");

        let position = observer.place(&e, Some(&a)).unwrap();
        let expected = observer.anchor(Some(&a)).unwrap() + ring.position(4);
        assert_eq!(position, expected);
        assert_eq!(observer.entity_position(&e.key), Some(expected));
        assert_eq!(log_of(&observer, &e), vec!["A"]);
        assert_eq!(system_log(&observer, &a), vec!["Game Entity_4(Position)"]);
        let created = Call::EntityProxy("sprite", "Game Entity_4(Position)".to_owned());
        assert!(observer.host().calls.contains(&created));
    }
    #[test]
    fn unseen_system_is_laid_out_on_demand() {
        let mut observer = observer(FlowConfig::default());
        let late = SystemHandle::detached("Late");
        let e = entity(1);
        observer.entity_created(e.clone(), "sprite");
        observer.place(&e, Some(&late)).unwrap();
        assert_eq!(observer.system_proxy(Some(&late)).unwrap().slot, 1);
        assert_eq!(observer.anchor(Some(&late)), Some(observer.config().system_ring.position(1)));
    }
    #[test]
    fn replacing_only_moves_in_depth() {
        let config = FlowConfig::default();
        let step = config.depth_step;
        let mut observer = observer(config);
        let a = SystemHandle::detached("A");
        let e = entity(2);
        observer.entity_created(e.clone(), "sprite");
        let first = observer.place(&e, Some(&a)).unwrap();
        let second = observer.place(&e, Some(&a)).unwrap();
        assert_eq!(first.truncate(), second.truncate());
        assert!((first.z - second.z - step).abs() < 1e-6);
        assert_eq!(observer.placements(), 2);
        assert_eq!(log_of(&observer, &e), vec!["A"]);
    }
    #[test]
    fn missing_visual_drops_event() {
        let mut observer = observer(FlowConfig::default());
        let e = entity(9);
        let err = observer.place(&e, None).unwrap_err();
        assert_eq!(err, FlowError::MissingVisual(e.key.clone()));
        assert!(observer.entity_proxy(&e.key).is_none());
        assert_eq!(observer.placements(), 0);
    }
    #[test]
    fn destroyed_entity_comes_back_fresh() {
        let config = FlowConfig { draw_connector: true, ..FlowConfig::default() };
        let mut observer = observer(config);
        let (a, b) = (SystemHandle::detached("A"), SystemHandle::detached("B"));
        let e = entity(1);
        observer.entity_created(e.clone(), "sprite");
        observer.place(&e, Some(&a)).unwrap();
        observer.place(&e, Some(&b)).unwrap();
        assert_eq!(connectors(&observer), 1);
        let node = observer.entity_proxy(&e.key).unwrap().proxy.node;

        observer.entity_destroyed(&e.key);
        assert!(observer.entity_proxy(&e.key).is_none());
        assert!(observer.host().calls.contains(&Call::DespawnNode(node)));
        assert!(!observer.host().calls.contains(&Call::Destroy("sprite")));
        assert_eq!(observer.place(&e, Some(&a)), Err(FlowError::MissingVisual(e.key.clone())));

        observer.entity_created(e.clone(), "sprite");
        observer.place(&e, Some(&a)).unwrap();
        assert_eq!(log_of(&observer, &e), vec!["A"]);
        assert_eq!(connectors(&observer), 1, "fresh proxies snap into place");
    }
    #[test]
    fn destroyed_entity_stays_gone_after_resync() {
        let mut observer = observer(FlowConfig::default());
        let e = entity(1);
        observer.entity_created(e.clone(), "sprite");
        observer.synchronize(&[]);
        let sentinel_log = observer.system_proxy(None).unwrap().proxy.log.len();

        observer.entity_destroyed(&e.key);
        observer.synchronize(&[]);
        assert!(observer.entity_proxy(&e.key).is_none());
        assert_eq!(observer.system_proxy(None).unwrap().proxy.log.len(), sentinel_log);
    }
    #[test]
    fn replaced_visual_despawns_previous_label() {
        let mut observer = observer(FlowConfig::default());
        let e = entity(1);
        observer.entity_created(e.clone(), "sprite");
        observer.place(&e, None).unwrap();
        let first = observer.entity_proxy(&e.key).unwrap().proxy.node;

        observer.entity_created(e.clone(), "sprite");
        observer.place(&e, None).unwrap();
        let calls = &observer.host().calls;
        let spawned = calls.iter().filter(|call| matches!(call, Call::EntityProxy(..))).count();
        let despawned: Vec<_> = calls.iter().filter(|call| matches!(call, Call::DespawnNode(_))).collect();
        assert_eq!(spawned, 2);
        assert_eq!(despawned, vec![&Call::DespawnNode(first)]);
    }
    #[test]
    fn full_log_can_keep_first_entries() {
        let config = FlowConfig {
            max_logs: 2,
            log_overflow: LogOverflow::KeepFirst,
            ..FlowConfig::default()
        };
        let mut observer = observer(config);
        let (a, b, c) = (
            SystemHandle::detached("A"),
            SystemHandle::detached("B"),
            SystemHandle::detached("C"),
        );
        let e = entity(1);
        observer.entity_created(e.clone(), "sprite");
        for system in [&a, &b, &c] {
            observer.place(&e, Some(system)).unwrap();
        }
        assert_eq!(log_of(&observer, &e), vec!["A", "B"]);
    }
    #[test]
    fn destroy_policy_despawns_visual() {
        let config = FlowConfig { destroy_policy: DestroyPolicy::DestroyVisual, ..FlowConfig::default() };
        let mut observer = observer(config);
        let e = entity(1);
        observer.entity_created(e.clone(), "sprite");
        observer.place(&e, None).unwrap();
        observer.entity_destroyed(&e.key);
        assert_eq!(observer.host().calls.last(), Some(&Call::Destroy("sprite")));
        assert_eq!(observer.host().calls.iter().filter(|call| **call == Call::Destroy("sprite")).count(), 1);
        assert!(observer.place(&e, None).is_err());
    }
    #[test]
    fn going_idle_draws_connector_when_enabled() {
        let config = FlowConfig { draw_connector: true, ..FlowConfig::default() };
        let mut observer = observer(config);
        let a = SystemHandle::detached("A");
        let e = entity(1);
        observer.entity_created(e.clone(), "sprite");
        let busy = observer.place(&e, Some(&a)).unwrap();
        assert_eq!(connectors(&observer), 0);
        let idle = observer.place(&e, None).unwrap();
        assert!(observer.host().calls.contains(&Call::Connector("sprite", busy, idle)));
        assert_eq!(log_of(&observer, &e), vec!["A", NULL_SYSTEM_NAME]);
    }
    #[test]
    fn going_idle_clears_trail_when_disabled() {
        let mut observer = observer(FlowConfig::default());
        let a = SystemHandle::detached("A");
        let e = entity(1);
        observer.entity_created(e.clone(), "sprite");
        observer.place(&e, Some(&a)).unwrap();
        observer.place(&e, None).unwrap();
        let calls = &observer.host().calls;
        assert_eq!(calls.iter().filter(|call| **call == Call::ClearTrail("sprite")).count(), 2);
        assert_eq!(connectors(&observer), 0);
        let rest = observer.anchor(None).unwrap() + observer.config().entity_ring.position(1);
        let idle = observer.entity_position(&e.key).unwrap();
        assert_eq!(idle.truncate(), rest.truncate());
    }
    #[test]
    fn attach_mode_parents_to_anchor() {
        let config = FlowConfig { attach_to_system: true, ..FlowConfig::default() };
        let ring = config.entity_ring;
        let mut observer = observer(config);
        let a = SystemHandle::detached("A");
        let anchor = observer.register_system(&a).anchor;
        let e = entity(3);
        observer.entity_created(e.clone(), "sprite");
        observer.place(&e, Some(&a)).unwrap();
        assert!(observer.host().calls.contains(&Call::Attach("sprite", anchor, ring.position(3))));
    }
    #[test]
    fn logs_stay_bounded() {
        let config = FlowConfig { max_logs: 2, ..FlowConfig::default() };
        let mut observer = observer(config);
        let (a, b) = (SystemHandle::detached("A"), SystemHandle::detached("B"));
        let e = entity(1);
        observer.entity_created(e.clone(), "sprite");
        for _ in 0..5 {
            observer.place(&e, Some(&a)).unwrap();
            observer.place(&e, Some(&b)).unwrap();
        }
        assert_eq!(log_of(&observer, &e), vec!["A", "B"]);
        assert_eq!(system_log(&observer, &a).len(), 1);
    }
    #[test]
    fn startup_rests_known_entities_on_sentinel() {
        let mut observer = observer(FlowConfig::default());
        let (e1, e2) = (entity(1), entity(2));
        observer.entity_created(e1.clone(), "one");
        observer.entity_created(e2.clone(), "two");
        observer.synchronize(&[SystemHandle::detached("A")]);
        assert_eq!(log_of(&observer, &e1), vec![NULL_SYSTEM_NAME]);
        assert_eq!(log_of(&observer, &e2), vec![NULL_SYSTEM_NAME]);
        assert_eq!(observer.system_proxies().count(), 2);
    }
    #[test]
    fn changed_components_relabel() {
        let mut observer = observer(FlowConfig::default());
        let e = entity(1);
        observer.entity_created(e.clone(), "sprite");
        observer.place(&e, None).unwrap();
        let node = observer.entity_proxy(&e.key).unwrap().proxy.node;
        let calls = observer.host().calls.len();
        observer.entity_changed(&ObservedEntity::new("Game", 1, "Entity_1(*3)(Position)"));
        assert_eq!(observer.host().calls.len(), calls, "retain count alone is not a change");

        observer.entity_changed(&ObservedEntity::new("Game", 1, "Entity_1(*3)(Position, Health)"));
        let renamed = Call::Present(node, Some("Game Entity_1(Position, Health)".to_owned()), None);
        assert_eq!(observer.host().calls.last(), Some(&renamed));
    }
    #[test]
    fn session_start_twice_delivers_once() {
        let bus = ExecutionBus::default();
        let mut session = FlowSession::new(observer(FlowConfig::default()));
        let e = entity(1);
        session.observer().entity_created(e.clone(), "sprite");
        session.start(&bus, &[]);
        session.start(&bus, &[]);
        assert_eq!(bus.subscriber_count(), 1);
        let before = session.observer().placements();
        bus.publish(&e, None);
        assert_eq!(session.observer().placements(), before + 1);

        session.stop();
        session.stop();
        assert!(!session.is_running());
        assert_eq!(bus.subscriber_count(), 0);
    }
    #[test]
    fn session_places_published_entities() {
        let bus = ExecutionBus::default();
        let a = SystemHandle::detached("A");
        let mut session = FlowSession::new(observer(FlowConfig::default()));
        session.start(&bus, &[a.clone()]);
        let e = entity(1);
        bus.publish(&e, Some(&a));
        assert!(session.observer().entity_proxy(&e.key).is_none());

        session.observer().entity_created(e.clone(), "sprite");
        bus.publish(&e, Some(&a));
        assert_eq!(log_of(&session.observer(), &e), vec!["A"]);
    }
}

//! Bevy scene backend for the system flow overlay
//!
//! # Architecture Overview
//!
//! The implementation is as follow:
//! * [`FlowOverlayPlugin`] builds a [`FlowObserver`] whose [`SceneHost`] is a
//!   [`CommandQueueHost`]. The host can't touch the `World` (it runs inside
//!   [`ExecutionBus`] callbacks, from whatever system publishes), so it only
//!   pushes [`SceneCommand`]s on a channel.
//! * The observer lives in the [`OverlaySession`] resource, which also holds
//!   the bus subscription. Removing the resource unsubscribes.
//! * [`relay_entity_lifecycle`] forwards [`EntityLifecycle`] events to the
//!   observer, once before the session starts (so entities spawned at
//!   startup are laid out) then every frame.
//! * The [`apply_scene_commands`] system reads from the receiver end of the
//!   channel and spawns or updates the proxy entities. Every change touching
//!   an entity the overlay doesn't own is done through a `World` closure
//!   that checks the entity still exists, since owners may despawn their
//!   scene objects at any time.
//! * [`animate_pulses`] and [`draw_connectors`] take care of the transient
//!   effects: the "executed" pulse and the gizmo lines between consecutive
//!   positions of an entity.
use std::sync::{
    mpsc::{self, Receiver, Sender},
    Mutex,
};

use bevy::ecs::event::ManualEventReader;
use bevy::hierarchy::despawn_with_children_recursive;
use bevy::utils::{HashMap, HashSet};
use bevy::prelude::*;

use crate::bus::ExecutionBus;
use crate::flow::{FlowConfig, FlowObserver, FlowSession, Move, SceneHost};
use crate::identity::{EntityLifecycle, SystemPipeline};
use crate::proxy::PulseCurve;

/// A scene entity spawned by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

enum SceneCommand {
    SpawnAnchor { node: NodeId, slot: usize, position: Vec3 },
    SpawnSystemProxy { node: NodeId, anchor: NodeId, label: String },
    SpawnEntityProxy { node: NodeId, visual: Entity, label: String },
    DespawnNode(NodeId),
    Present { node: NodeId, label: Option<String>, pulse: Option<String> },
    Attach { visual: Entity, anchor: NodeId, local: Vec3 },
    Reposition { visual: Entity, position: Vec3 },
    Connector { visual: Entity, from: Vec3, to: Vec3 },
    ClearTrail(Entity),
    Despawn(Entity),
}

/// [`SceneHost`] queueing scene changes for [`apply_scene_commands`].
pub struct CommandQueueHost {
    next_node: u32,
    sender: Sender<SceneCommand>,
}
impl CommandQueueHost {
    fn new(sender: Sender<SceneCommand>) -> Self {
        Self { next_node: 0, sender }
    }
    fn node(&mut self) -> NodeId {
        self.next_node += 1;
        NodeId(self.next_node)
    }
    fn send(&self, command: SceneCommand) {
        if self.sender.send(command).is_err() {
            debug!("Overlay scene is gone, dropping scene command");
        }
    }
}
impl SceneHost for CommandQueueHost {
    type Visual = Entity;
    type Node = NodeId;

    fn spawn_anchor(&mut self, slot: usize, position: Vec3) -> NodeId {
        let node = self.node();
        self.send(SceneCommand::SpawnAnchor { node, slot, position });
        node
    }
    fn spawn_system_proxy(&mut self, anchor: &NodeId, label: &str) -> NodeId {
        let node = self.node();
        let label = label.to_owned();
        self.send(SceneCommand::SpawnSystemProxy { node, anchor: *anchor, label });
        node
    }
    fn spawn_entity_proxy(&mut self, visual: &Entity, label: &str) -> NodeId {
        let node = self.node();
        let label = label.to_owned();
        self.send(SceneCommand::SpawnEntityProxy { node, visual: *visual, label });
        node
    }
    fn despawn_node(&mut self, node: &NodeId) {
        self.send(SceneCommand::DespawnNode(*node));
    }
    fn present(&mut self, node: &NodeId, label: Option<&str>, pulse: Option<&str>) {
        let (label, pulse) = (label.map(str::to_owned), pulse.map(str::to_owned));
        self.send(SceneCommand::Present { node: *node, label, pulse });
    }
    fn move_visual(&mut self, visual: &Entity, to: Move<'_, NodeId>) {
        let visual = *visual;
        self.send(match to {
            Move::Attach { anchor, local } => SceneCommand::Attach { visual, anchor: *anchor, local },
            Move::Reposition { position } => SceneCommand::Reposition { visual, position },
        });
    }
    fn draw_connector(&mut self, visual: &Entity, from: Vec3, to: Vec3) {
        self.send(SceneCommand::Connector { visual: *visual, from, to });
    }
    fn clear_trail(&mut self, visual: &Entity) {
        self.send(SceneCommand::ClearTrail(*visual));
    }
    fn destroy_visual(&mut self, visual: &Entity) {
        self.send(SceneCommand::Despawn(*visual));
    }
}

/// The running overlay: its [`FlowObserver`] and bus subscription.
///
/// Use [`FlowSession::observer`] to inspect proxies, for example to read
/// their logs.
pub type OverlaySession = FlowSession<CommandQueueHost>;

#[derive(Resource)]
struct SceneQueue(Mutex<Receiver<SceneCommand>>);

#[derive(Resource, Default)]
struct LifecycleCursor(ManualEventReader<EntityLifecycle>);

struct Connector {
    visual: Entity,
    from: Vec3,
    to: Vec3,
    expiration: f64,
}
#[derive(Resource, Default)]
struct Connectors(Vec<Connector>);

#[derive(Component)]
struct Pulse {
    curve: PulseCurve,
    started: f64,
}

#[derive(Component)]
struct OverlayRoot;

#[derive(Resource)]
struct Options {
    label_color: Color,
    font_size: f32,
    connector_color: Color,
    connector_duration: f64,
    pulses: HashMap<String, PulseCurve>,
}
impl Options {
    fn text(&self, label: String) -> Text {
        let style = TextStyle { color: self.label_color, font_size: self.font_size, ..default() };
        Text::from_section(label, style)
    }
}
impl<'a> From<&'a FlowOverlayPlugin> for Options {
    fn from(plugin: &'a FlowOverlayPlugin) -> Self {
        Self {
            label_color: plugin.label_color,
            font_size: plugin.font_size,
            connector_color: plugin.connector_color,
            connector_duration: plugin.connector_duration as f64,
            pulses: plugin.pulses.clone(),
        }
    }
}

fn relay_entity_lifecycle(
    events: Res<Events<EntityLifecycle>>,
    mut cursor: ResMut<LifecycleCursor>,
    session: Res<OverlaySession>,
) {
    let mut observer = session.observer();
    for event in cursor.0.read(&events) {
        match event {
            EntityLifecycle::Created { entity, visual } => {
                observer.entity_created(entity.clone(), *visual);
            }
            EntityLifecycle::Changed(entity) => observer.entity_changed(entity),
            EntityLifecycle::Destroyed(key) => observer.entity_destroyed(key),
        }
    }
}

fn start_overlay(
    mut session: ResMut<OverlaySession>,
    bus: Res<ExecutionBus>,
    pipeline: Res<SystemPipeline>,
) {
    session.start(&bus, &pipeline.systems());
    info!("System flow overlay watching {} systems", pipeline.len());
}

#[allow(clippy::too_many_arguments)]
fn apply_scene_commands(
    mut cmds: Commands,
    mut root: Local<Option<Entity>>,
    mut nodes: Local<HashMap<NodeId, Entity>>,
    mut entity_nodes: Local<HashMap<Entity, NodeId>>,
    mut unknown_pulses: Local<HashSet<String>>,
    mut connectors: ResMut<Connectors>,
    queue: Res<SceneQueue>,
    options: Res<Options>,
    time: Res<Time>,
) {
    let current_time = time.elapsed_seconds_f64();
    let receiver = queue.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    for command in receiver.try_iter() {
        match command {
            SceneCommand::SpawnAnchor { node, slot, position } => {
                let root = *root.get_or_insert_with(|| {
                    let name = Name::new("System flow overlay");
                    cmds.spawn((SpatialBundle::default(), OverlayRoot, name)).id()
                });
                let transform = Transform::from_translation(position);
                let name = Name::new(format!("SystemPosition_{slot}"));
                let bundle = (SpatialBundle::from_transform(transform), name);
                let anchor = cmds.spawn(bundle).set_parent(root).id();
                nodes.insert(node, anchor);
            }
            SceneCommand::SpawnSystemProxy { node, anchor, label } => {
                let Some(&anchor) = nodes.get(&anchor) else {
                    warn!("System proxy {label} has no anchor");
                    continue;
                };
                let text = Text2dBundle { text: options.text(label), ..default() };
                let proxy = cmds.spawn(text).set_parent(anchor).id();
                nodes.insert(node, proxy);
            }
            SceneCommand::SpawnEntityProxy { node, visual, label } => {
                let text = Text2dBundle {
                    text: options.text(label),
                    transform: Transform::from_xyz(0.0, 0.0, 0.1),
                    ..default()
                };
                let proxy = cmds.spawn(text).id();
                nodes.insert(node, proxy);
                entity_nodes.insert(visual, node);
                cmds.add(move |world: &mut World| {
                    if world.get_entity(visual).is_some() {
                        world.entity_mut(proxy).set_parent(visual);
                    } else {
                        world.despawn(proxy);
                    }
                });
            }
            SceneCommand::DespawnNode(node) => {
                let Some(proxy) = nodes.remove(&node) else { continue };
                entity_nodes.retain(|_, owned| *owned != node);
                cmds.add(move |world: &mut World| {
                    if world.get_entity(proxy).is_some() {
                        despawn_with_children_recursive(world, proxy);
                    }
                });
            }
            SceneCommand::Present { node, label, pulse } => {
                let Some(&entity) = nodes.get(&node) else { continue };
                let pulse = pulse.and_then(|state| match options.pulses.get(&state) {
                    Some(curve) => Some(Pulse { curve: *curve, started: current_time }),
                    None => {
                        if unknown_pulses.insert(state.clone()) {
                            debug!("No pulse configured for state {state}, not animating it");
                        }
                        None
                    }
                });
                cmds.add(move |world: &mut World| {
                    let Some(mut target) = world.get_entity_mut(entity) else { return };
                    if let Some(label) = label {
                        if let Some(mut text) = target.get_mut::<Text>() {
                            if let Some(section) = text.sections.first_mut() {
                                section.value = label;
                            }
                        }
                    }
                    if let Some(pulse) = pulse {
                        target.insert(pulse);
                    }
                });
            }
            SceneCommand::Attach { visual, anchor, local } => {
                let Some(&anchor) = nodes.get(&anchor) else { continue };
                cmds.add(move |world: &mut World| {
                    if world.get_entity(anchor).is_none() {
                        return;
                    }
                    let Some(mut target) = world.get_entity_mut(visual) else { return };
                    if let Some(mut transform) = target.get_mut::<Transform>() {
                        transform.translation = local;
                    }
                    target.set_parent(anchor);
                });
            }
            SceneCommand::Reposition { visual, position } => {
                cmds.add(move |world: &mut World| {
                    if let Some(mut transform) = world.get_mut::<Transform>(visual) {
                        transform.translation = position;
                    }
                });
            }
            SceneCommand::Connector { visual, from, to } => {
                let expiration = current_time + options.connector_duration;
                connectors.0.push(Connector { visual, from, to, expiration });
            }
            SceneCommand::ClearTrail(visual) => {
                connectors.0.retain(|connector| connector.visual != visual);
            }
            SceneCommand::Despawn(visual) => {
                connectors.0.retain(|connector| connector.visual != visual);
                if let Some(node) = entity_nodes.remove(&visual) {
                    nodes.remove(&node);
                }
                cmds.add(move |world: &mut World| {
                    if world.get_entity(visual).is_some() {
                        despawn_with_children_recursive(world, visual);
                    }
                });
            }
        }
    }
}

fn animate_pulses(
    mut pulses: Query<(Entity, &Pulse, &mut Transform)>,
    mut cmds: Commands,
    time: Res<Time>,
) {
    let current_time = time.elapsed_seconds_f64();
    for (entity, pulse, mut transform) in &mut pulses {
        let elapsed = (current_time - pulse.started) as f32;
        match pulse.curve.scale_at(elapsed) {
            Some(scale) => transform.scale = Vec3::splat(scale),
            None => {
                transform.scale = Vec3::ONE;
                cmds.entity(entity).remove::<Pulse>();
            }
        }
    }
}

fn draw_connectors(
    mut connectors: ResMut<Connectors>,
    mut gizmos: Gizmos,
    options: Res<Options>,
    time: Res<Time>,
) {
    let current_time = time.elapsed_seconds_f64();
    connectors.0.retain(|connector| connector.expiration >= current_time);
    for connector in &connectors.0 {
        gizmos.line(connector.from, connector.to, options.connector_color);
    }
}

/// Forwards [`EntityLifecycle`] events to the overlay during `Update`.
///
/// Events are also forwarded every `PreUpdate`. An entity created and
/// executed in the same frame needs its `Created` event sent before this set
/// and its execution published after it, otherwise the execution is dropped.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelayLifecycle;

/// The system flow overlay plugin.
///
/// Publish executions on the [`ExecutionBus`] resource (see
/// [`crate::ObservableSystem`]), register your systems in the
/// [`SystemPipeline`] resource during `Startup` and announce the scene
/// objects of your entities with [`EntityLifecycle`] events.
///
/// Scene objects announced during `Update` are only known from the next
/// frame on, unless ordered around [`RelayLifecycle`].
///
/// Layout distances in [`FlowConfig`] are in world units.
pub struct FlowOverlayPlugin {
    /// Layout and bookkeeping settings.
    pub flow: FlowConfig,
    /// Color of proxy labels, by default it is white.
    pub label_color: Color,
    /// Size of proxy labels, by default it is 13.0
    pub font_size: f32,
    /// Color of lines drawn between consecutive positions of an entity
    /// when [`FlowConfig::draw_connector`] is set, by default it is yellow.
    pub connector_color: Color,
    /// How long connectors stay on screen, in seconds.
    pub connector_duration: f32,
    /// Pulse to play for each animation state name.
    pub pulses: HashMap<String, PulseCurve>,
}
impl Default for FlowOverlayPlugin {
    fn default() -> Self {
        let flow = FlowConfig::default();
        let pulses = [(flow.executed_state.clone(), PulseCurve::default())].into_iter().collect();
        Self {
            flow,
            label_color: Color::WHITE,
            font_size: 13.0,
            connector_color: Color::YELLOW,
            connector_duration: 1.0,
            pulses,
        }
    }
}

impl Plugin for FlowOverlayPlugin {
    fn build(&self, app: &mut App) {
        let (sender, receiver) = mpsc::channel();
        let observer = FlowObserver::new(self.flow.clone(), CommandQueueHost::new(sender));
        app.init_resource::<ExecutionBus>()
            .init_resource::<SystemPipeline>()
            .init_resource::<LifecycleCursor>()
            .init_resource::<Connectors>()
            .add_event::<EntityLifecycle>()
            .insert_resource::<Options>(self.into())
            .insert_resource(SceneQueue(Mutex::new(receiver)))
            .insert_resource(OverlaySession::new(observer))
            .add_systems(PostStartup, (relay_entity_lifecycle, start_overlay).chain())
            .add_systems(PreUpdate, relay_entity_lifecycle)
            .add_systems(Update, relay_entity_lifecycle.in_set(RelayLifecycle))
            .add_systems(
                PostUpdate,
                (apply_scene_commands, animate_pulses, draw_connectors).chain(),
            );
    }
}

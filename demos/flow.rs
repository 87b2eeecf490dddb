use bevy::prelude::*;
use bevy::render::camera::ScalingMode;
use bevy_system_flow_overlay::{
    CircularLayout, EntityKey, EntityLifecycle, ExecutionBus, FlowConfig, FlowOverlayPlugin,
    ObservableSystem, ObservedEntity, OverlaySession, SystemHandle, SystemPipeline,
};

const CONTEXT: &str = "Game";

fn main() {
    let flow = FlowConfig {
        system_ring: CircularLayout::new(Vec3::new(0.0, 250.0, 0.0), -40.0),
        entity_ring: CircularLayout::new(Vec3::new(0.0, 40.0, 0.0), -60.0),
        draw_connector: true,
        ..default()
    };
    App::new()
        .add_plugins(DefaultPlugins)
        // !!!!IMPORTANT!!!! Add the FlowOverlayPlugin here
        .add_plugins(FlowOverlayPlugin { flow, font_size: 18.0, ..default() })
        .add_systems(Startup, setup)
        .add_systems(
            Update,
            (hurt_the_weak, heal_the_hurt, late_spawner, go_idle, despawn_dead).chain(),
        )
        .add_systems(Update, print_history)
        .run();
}

#[derive(Component)]
struct Health(u32);

#[derive(Resource)]
struct Systems {
    hurt: ObservableSystem,
    heal: ObservableSystem,
    spawner: ObservableSystem,
}

fn observe(entity: Entity, health: &Health) -> ObservedEntity {
    let index = entity.index();
    ObservedEntity::new(CONTEXT, index, format!("Entity_{index}(*1)(Health: {})", health.0))
}

fn setup(
    mut cmds: Commands,
    pipeline: Res<SystemPipeline>,
    bus: Res<ExecutionBus>,
    mut lifecycle: EventWriter<EntityLifecycle>,
) {
    let mut camera = Camera2dBundle::default();
    camera.projection.scaling_mode = ScalingMode::FixedVertical(700.0);
    camera.projection.near = -100_000.0;
    camera.transform.translation.z = 0.0;
    cmds.spawn(camera);

    let observable = |name: &str| ObservableSystem::new(pipeline.register(name), bus.clone());
    cmds.insert_resource(Systems {
        hurt: observable("HurtTheWeak"),
        heal: observable("HealTheHurt"),
        // Not registered in the pipeline: laid out when it first executes.
        spawner: ObservableSystem::new(SystemHandle::detached("LateSpawner"), bus.clone()),
    });
    for health in [3, 7, 12] {
        let visual = cmds.spawn((SpatialBundle::default(), Health(health))).id();
        let entity = observe(visual, &Health(health));
        lifecycle.send(EntityLifecycle::Created { entity, visual });
    }
}

fn at_interval(time: &Time, period: f64) -> bool {
    time.elapsed_seconds_f64() % period < time.delta_seconds_f64()
}

fn hurt_the_weak(
    time: Res<Time>,
    systems: Res<Systems>,
    mut entities: Query<(Entity, &mut Health)>,
    mut lifecycle: EventWriter<EntityLifecycle>,
) {
    if !at_interval(&time, 1.5) {
        return;
    }
    let mut batch = Vec::new();
    for (entity, mut health) in &mut entities {
        if health.0 < 10 {
            health.0 = health.0.saturating_sub(2);
            let observed = observe(entity, &health);
            lifecycle.send(EntityLifecycle::Changed(observed.clone()));
            batch.push(observed);
        }
    }
    systems.hurt.execute(&batch);
}

fn heal_the_hurt(
    time: Res<Time>,
    systems: Res<Systems>,
    mut entities: Query<(Entity, &mut Health)>,
) {
    if !at_interval(&time, 2.5) {
        return;
    }
    let batch: Vec<_> = entities
        .iter_mut()
        .filter(|(_, health)| health.0 > 0 && health.0 < 12)
        .map(|(entity, mut health)| {
            health.0 += 1;
            observe(entity, &health)
        })
        .collect();
    systems.heal.execute(&batch);
}

/// Spawns a new entity next to the oldest one.
fn late_spawner(
    time: Res<Time>,
    systems: Res<Systems>,
    entities: Query<(Entity, &Health)>,
    mut cmds: Commands,
    mut lifecycle: EventWriter<EntityLifecycle>,
) {
    if !at_interval(&time, 6.0) {
        return;
    }
    let Some(parent) = entities.iter().min_by_key(|(entity, _)| entity.index()) else {
        return;
    };
    systems.spawner.execute([&observe(parent.0, parent.1)]);
    let visual = cmds.spawn((SpatialBundle::default(), Health(9))).id();
    let entity = observe(visual, &Health(9));
    lifecycle.send(EntityLifecycle::Created { entity, visual });
}

fn go_idle(time: Res<Time>, bus: Res<ExecutionBus>, entities: Query<(Entity, &Health)>) {
    if !at_interval(&time, 4.0) {
        return;
    }
    for (entity, health) in &entities {
        bus.publish(&observe(entity, health), None);
    }
}

fn despawn_dead(
    mut cmds: Commands,
    entities: Query<(Entity, &Health)>,
    mut lifecycle: EventWriter<EntityLifecycle>,
) {
    for (entity, health) in &entities {
        if health.0 == 0 {
            lifecycle.send(EntityLifecycle::Destroyed(EntityKey::new(CONTEXT, entity.index())));
            cmds.entity(entity).despawn_recursive();
        }
    }
}

fn print_history(time: Res<Time>, session: Res<OverlaySession>) {
    if !at_interval(&time, 10.0) {
        return;
    }
    let observer = session.observer();
    for system in observer.system_proxies() {
        let log: Vec<_> = system.proxy.log.iter().collect();
        info!("{}: {log:?}", system.proxy.label());
    }
}

//! Mock for [`FlowOverlayPlugin`]
//!
//! The mock still inserts the bus, the pipeline and the lifecycle event so
//! that game systems using them keep working when disabling debug mode.
//! Nothing subscribes to the bus, so [`crate::ObservableSystem::execute`]
//! returns right away.
use bevy::prelude::{App, Color, Plugin, SystemSet};
use bevy::utils::HashMap;

use crate::bus::ExecutionBus;
use crate::flow::FlowConfig;
use crate::identity::{EntityLifecycle, SystemPipeline};
use crate::proxy::PulseCurve;

/// Does nothing, ordering against it is harmless.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelayLifecycle;

#[derive(Default)]
pub struct FlowOverlayPlugin {
    pub flow: FlowConfig,
    pub label_color: Color,
    pub font_size: f32,
    pub connector_color: Color,
    pub connector_duration: f32,
    pub pulses: HashMap<String, PulseCurve>,
}
impl Plugin for FlowOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ExecutionBus>()
            .init_resource::<SystemPipeline>()
            .add_event::<EntityLifecycle>();
    }
}

#![doc = include_str!("../Readme.md")]
mod bus;
mod flow;
mod identity;
mod label;
mod layout;
mod proxy;
mod registry;

pub use bus::{ExecutionBus, ObservableSystem, Subscription};
pub use flow::{DestroyPolicy, FlowConfig, FlowError, FlowObserver, FlowSession, Move, SceneHost};
pub use identity::{EntityKey, EntityLifecycle, ObservedEntity, SystemHandle, SystemPipeline};
pub use label::{entity_label, LabelStyle, NULL_SYSTEM_NAME};
pub use layout::CircularLayout;
pub use proxy::{EntityProxy, LogOverflow, Proxy, ProxyLog, PulseCurve, SystemProxy};

#[cfg(feature = "debug")]
mod overlay;
#[cfg(feature = "debug")]
pub use overlay::{CommandQueueHost, FlowOverlayPlugin, NodeId, OverlaySession, RelayLifecycle};

#[cfg(not(feature = "debug"))]
mod mocks;
#[cfg(not(feature = "debug"))]
pub use mocks::{FlowOverlayPlugin, RelayLifecycle};

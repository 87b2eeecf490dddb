//! Stand-ins for systems and entities in the scene.
use std::collections::VecDeque;

use bevy::math::Vec3;

/// What a full [`ProxyLog`] does with new entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOverflow {
    /// Drop the oldest entry to make room.
    #[default]
    DropOldest,
    /// Ignore new entries, keeping the first ones.
    KeepFirst,
}

/// Bounded log of what happened to a proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyLog {
    entries: VecDeque<String>,
    max: usize,
    suppress_duplicates: bool,
    overflow: LogOverflow,
}
impl ProxyLog {
    /// A log keeping at most `max` entries. `max == 0` disables it.
    pub fn new(max: usize, suppress_duplicates: bool) -> Self {
        Self {
            entries: VecDeque::with_capacity(max.min(64)),
            max,
            suppress_duplicates,
            overflow: LogOverflow::default(),
        }
    }
    pub fn with_overflow(self, overflow: LogOverflow) -> Self {
        Self { overflow, ..self }
    }
    /// Returns whether `message` was added.
    pub fn push(&mut self, message: &str) -> bool {
        if self.max == 0 || message.is_empty() {
            return false;
        }
        if self.suppress_duplicates && self.entries.back().map(String::as_str) == Some(message) {
            return false;
        }
        if self.entries.len() >= self.max {
            match self.overflow {
                LogOverflow::DropOldest => drop(self.entries.pop_front()),
                LogOverflow::KeepFirst => return false,
            }
        }
        self.entries.push_back(message.to_owned());
        true
    }
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(String::as_str)
    }
    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shape of the "executed" pulse played on proxies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseCurve {
    /// Seconds until the proxy is back to its normal size.
    pub duration: f32,
    /// Scale of the proxy when the pulse starts.
    pub peak_scale: f32,
}
impl PulseCurve {
    /// Scale at `elapsed` seconds into the pulse, `None` once done.
    pub fn scale_at(&self, elapsed: f32) -> Option<f32> {
        if elapsed >= self.duration || self.duration <= 0.0 {
            return None;
        }
        let remaining = 1.0 - elapsed.max(0.0) / self.duration;
        Some(1.0 + (self.peak_scale - 1.0) * remaining)
    }
}
impl Default for PulseCurve {
    fn default() -> Self {
        Self { duration: 0.3, peak_scale: 1.6 }
    }
}

/// What both kinds of proxies share: a scene node with a label, and a log.
#[derive(Debug, Clone)]
pub struct Proxy<N> {
    pub node: N,
    label: String,
    pub log: ProxyLog,
}
impl<N> Proxy<N> {
    pub fn new(node: N, label: String, log: ProxyLog) -> Self {
        Self { node, label, log }
    }
    pub fn label(&self) -> &str {
        &self.label
    }
    /// Returns whether the label changed.
    pub fn rename(&mut self, label: &str) -> bool {
        if self.label == label {
            return false;
        }
        label.clone_into(&mut self.label);
        true
    }
}

/// A system's fixed place in the scene.
#[derive(Debug, Clone)]
pub struct SystemProxy<N> {
    pub proxy: Proxy<N>,
    pub anchor: N,
    pub slot: usize,
    pub position: Vec3,
}

/// An entity's scene object, borrowed from whoever spawned it.
#[derive(Debug, Clone)]
pub struct EntityProxy<V, N> {
    pub proxy: Proxy<N>,
    pub visual: V,
    /// World position, `Vec3::ZERO` until first placed.
    pub position: Vec3,
}
impl<V, N> EntityProxy<V, N> {
    pub fn is_placed(&self) -> bool {
        self.position != Vec3::ZERO
    }
}

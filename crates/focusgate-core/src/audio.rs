//! Sound playback.
//!
//! The audio surface is a single owned resource. [`SoundController`] wraps
//! it and keeps at most one primary sound audible: every `play` is preceded
//! by a `stop_all` issued by the caller, and the controller never plays two
//! sounds without a stop in between.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::storage::{self, keys, DurableStore, Namespace};

/// Volume used when nothing is cached or stored.
pub const DEFAULT_VOLUME: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundEffect {
    None,
    Bell,
    BellDing,
    DoorClose,
    Timer,
    Ticktock,
}

impl SoundEffect {
    pub fn as_str(self) -> &'static str {
        match self {
            SoundEffect::None => "none",
            SoundEffect::Bell => "bell",
            SoundEffect::BellDing => "bell_ding",
            SoundEffect::DoorClose => "door_close",
            SoundEffect::Timer => "timer",
            SoundEffect::Ticktock => "ticktock",
        }
    }
}

/// Host audio surface. Fire-and-forget: nothing is reported back.
pub trait AudioOutput: Send {
    fn play_sound(&mut self, effect: SoundEffect, volume: f32);
    fn stop_all(&mut self);
    /// Tear down the output surface. A later `play_sound` may recreate it.
    fn close(&mut self) {}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiSettings {
    #[serde(default)]
    pub sound_volume: Option<f32>,
}

/// Cached playback volume.
///
/// Refreshed on explicit update; otherwise loaded from the store once on
/// first use and retained.
#[derive(Debug, Default)]
pub struct VolumeCache {
    cached: Option<f32>,
}

impl VolumeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, volume: f32) {
        self.cached = Some(volume.clamp(0.0, 1.0));
    }

    pub fn cached(&self) -> Option<f32> {
        self.cached
    }

    pub fn resolve(&mut self, store: &dyn DurableStore) -> f32 {
        if let Some(volume) = self.cached {
            return volume;
        }
        match storage::load::<UiSettings>(store, Namespace::Sync, keys::UI_SETTINGS) {
            Ok(Some(UiSettings {
                sound_volume: Some(volume),
            })) => {
                self.update(volume);
                self.cached.unwrap_or(DEFAULT_VOLUME)
            }
            Ok(_) => DEFAULT_VOLUME,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read volume setting, using default");
                DEFAULT_VOLUME
            }
        }
    }
}

pub struct SoundController {
    output: Box<dyn AudioOutput>,
    volume: VolumeCache,
    store: Arc<dyn DurableStore>,
}

impl SoundController {
    pub fn new(output: Box<dyn AudioOutput>, store: Arc<dyn DurableStore>) -> Self {
        Self {
            output,
            volume: VolumeCache::new(),
            store,
        }
    }

    /// Play a one-shot effect. `None` and a muted volume are silent no-ops.
    pub fn play(&mut self, effect: SoundEffect) {
        if effect == SoundEffect::None {
            return;
        }
        let volume = self.volume.resolve(self.store.as_ref());
        if volume <= 0.0 {
            tracing::debug!(effect = effect.as_str(), "volume muted, not playing");
            return;
        }
        tracing::debug!(effect = effect.as_str(), volume, "playing sound");
        self.output.play_sound(effect, volume);
    }

    pub fn stop_all(&mut self) {
        self.output.stop_all();
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume.update(volume);
    }

    pub fn volume(&mut self) -> f32 {
        self.volume.resolve(self.store.as_ref())
    }

    pub fn close(&mut self) {
        self.output.stop_all();
        self.output.close();
    }
}

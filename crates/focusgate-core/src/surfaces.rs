//! Ready-made host surfaces.
//!
//! The `Log*` surfaces report through `tracing` and are what the CLI uses
//! when no real audio device, toolbar or notification center exists. The
//! `Recording*` surfaces keep everything in memory behind a shared handle so
//! an embedder (or a test) can inspect what the core asked for.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::{AudioOutput, SoundEffect};
use crate::notify::Notifier;
use crate::timer::{BadgeSurface, BadgeView, Phase, TimerStatus};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogAudio;

impl AudioOutput for LogAudio {
    fn play_sound(&mut self, effect: SoundEffect, volume: f32) {
        tracing::info!(effect = effect.as_str(), volume, "sound");
    }

    fn stop_all(&mut self) {
        tracing::trace!("stop all sounds");
    }

    fn close(&mut self) {
        tracing::debug!("audio surface closed");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogBadge;

impl BadgeSurface for LogBadge {
    fn render(&mut self, phase: Phase, seconds_remaining: u32, status: TimerStatus) {
        let view = BadgeView::new(phase, seconds_remaining, status);
        tracing::trace!(text = %view.text, color = view.color, "badge");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, title: &str, message: &str) {
        tracing::info!(title, message, "notification");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioCall {
    Play(SoundEffect, f32),
    StopAll,
    Close,
}

#[derive(Debug, Default)]
pub struct AudioLog {
    pub calls: Vec<AudioCall>,
    /// Sound considered audible until the next stop.
    pub playing: Option<SoundEffect>,
    /// Times a sound started while another was still audible.
    pub overlaps: usize,
}

impl AudioLog {
    pub fn played(&self) -> Vec<SoundEffect> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                AudioCall::Play(effect, _) => Some(*effect),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecordingAudio(Arc<Mutex<AudioLog>>);

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MutexGuard<'_, AudioLog> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AudioOutput for RecordingAudio {
    fn play_sound(&mut self, effect: SoundEffect, volume: f32) {
        let mut log = self.log();
        if log.playing.is_some() {
            log.overlaps += 1;
        }
        log.playing = Some(effect);
        log.calls.push(AudioCall::Play(effect, volume));
    }

    fn stop_all(&mut self) {
        let mut log = self.log();
        log.playing = None;
        log.calls.push(AudioCall::StopAll);
    }

    fn close(&mut self) {
        let mut log = self.log();
        log.playing = None;
        log.calls.push(AudioCall::Close);
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecordingBadge(Arc<Mutex<Vec<BadgeView>>>);

impl RecordingBadge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<BadgeView> {
        self.0
            .lock()
            .ok()
            .and_then(|views| views.last().cloned())
    }

    pub fn renders(&self) -> usize {
        self.0.lock().map(|views| views.len()).unwrap_or(0)
    }
}

impl BadgeSurface for RecordingBadge {
    fn render(&mut self, phase: Phase, seconds_remaining: u32, status: TimerStatus) {
        if let Ok(mut views) = self.0.lock() {
            views.push(BadgeView::new(phase, seconds_remaining, status));
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier(Arc<Mutex<Vec<(String, String)>>>);

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<(String, String)> {
        self.0.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, title: &str, message: &str) {
        if let Ok(mut shown) = self.0.lock() {
            shown.push((title.to_string(), message.to_string()));
        }
    }
}

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::engine::{AudioEngine, PlaybackState};
use crate::noise::NoiseColor;

/// Platform-level audio focus events. Delivered on whichever thread the
/// host platform uses; the manager makes no assumption about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionEvent {
    /// Another process claimed the output device.
    Began,
    /// The device came back; `should_resume` says whether the platform
    /// considers resumption appropriate.
    Ended { should_resume: bool },
}

/// Why playback last stopped. Needed so an interruption ending never
/// auto-resumes a session the user deliberately ended; the playback
/// state alone cannot make that distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCause {
    User,
    Interruption,
}

struct Inner {
    engine: AudioEngine,
    stop_cause: Option<StopCause>,
}

/// Playback state machine around the engine: explicit start/stop plus
/// the interruption triggers.
///
/// Clone freely; all clones share the same session. Interruption events
/// and UI calls may race from different threads, so the engine sits
/// behind a mutex taken only on the control path (the render context
/// never touches it).
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Mutex<Inner>>,
}

impl SessionManager {
    pub fn new(engine: AudioEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                engine,
                stop_cause: None,
            })),
        }
    }

    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.engine.start()?;
        inner.stop_cause = None;
        Ok(())
    }

    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.engine.stop();
        inner.stop_cause = Some(StopCause::User);
    }

    pub fn toggle(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.engine.is_playing() {
            inner.engine.stop();
            inner.stop_cause = Some(StopCause::User);
            Ok(())
        } else {
            inner.engine.start()?;
            inner.stop_cause = None;
            Ok(())
        }
    }

    /// Apply an interruption signal from the platform.
    ///
    /// `Began` stops playback but keeps volume, cutoff, and color so a
    /// later restart picks them up. `Ended` restarts only when playback
    /// was stopped by the interruption itself and the platform allows
    /// resumption; a failed restart leaves the session stopped and
    /// returns the failure.
    pub fn handle_interruption(&self, event: InterruptionEvent) -> Result<()> {
        let mut inner = self.inner.lock();
        match event {
            InterruptionEvent::Began => {
                if inner.engine.is_playing() {
                    inner.engine.stop();
                    inner.stop_cause = Some(StopCause::Interruption);
                    log::info!("playback interrupted by the platform");
                }
                Ok(())
            }
            InterruptionEvent::Ended { should_resume } => {
                if !should_resume || inner.stop_cause != Some(StopCause::Interruption) {
                    return Ok(());
                }
                match inner.engine.start() {
                    Ok(()) => {
                        inner.stop_cause = None;
                        log::info!("playback resumed after interruption");
                        Ok(())
                    }
                    Err(e) => {
                        log::warn!("could not resume after interruption: {e:#}");
                        Err(e)
                    }
                }
            }
        }
    }

    pub fn set_volume(&self, volume: f32) {
        self.inner.lock().engine.set_volume(volume);
    }

    pub fn set_filter_cutoff(&self, cutoff_hz: f32) {
        self.inner.lock().engine.set_filter_cutoff(cutoff_hz);
    }

    pub fn set_noise_color(&self, color: NoiseColor) {
        self.inner.lock().engine.set_noise_color(color);
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.inner.lock().engine.playback_state()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().engine.is_playing()
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().engine.volume()
    }

    pub fn filter_cutoff(&self) -> f32 {
        self.inner.lock().engine.filter_cutoff()
    }

    pub fn noise_color(&self) -> NoiseColor {
        self.inner.lock().engine.noise_color()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.inner.lock().engine.elapsed_seconds()
    }
}

use anyhow::{anyhow, Context, Result};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audio_io::{AudioBackend, CpalBackend, StreamHandle, StreamSpec};
use crate::command::Command;
use crate::noise::{NoiseColor, RenderState, SharedControls};

pub const MIN_CUTOFF_HZ: f32 = 200.0;
pub const MAX_CUTOFF_HZ: f32 = 20_000.0;

// Drained once per block; 64 slots is far more than a control surface
// can produce between two blocks.
const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Plain value parameters copied into the stream and filter on change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Output gain, clamped to [0, 1] at assignment.
    pub volume: f32,
    /// Low-pass cutoff in Hz, clamped to [200, 20000] at assignment.
    pub cutoff_hz: f32,
    pub color: NoiseColor,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            volume: 0.5,
            cutoff_hz: MAX_CUTOFF_HZ,
            color: NoiseColor::White,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
}

/// The value moved into the output callback: generator, filter stage,
/// gain, and the command queue consumer.
///
/// `process_block` is the whole render-context surface. It must never
/// block, allocate, log, or perform I/O; missing the deadline is an
/// audible dropout.
pub struct RenderPipeline {
    render: RenderState,
    commands: HeapCons<Command>,
    filter: DirectForm2Transposed<f32>,
    gain: f32,
    sample_rate: f32,
    frames_done: u64,
    controls: Arc<SharedControls>,
}

impl RenderPipeline {
    fn new(
        controls: Arc<SharedControls>,
        commands: HeapCons<Command>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let sample_rate = config.sample_rate as f32;
        let coeffs = lowpass_coefficients(sample_rate, config.cutoff_hz)?;
        Ok(Self {
            render: RenderState::new(controls.clone()),
            commands,
            filter: DirectForm2Transposed::<f32>::new(coeffs),
            gain: config.volume,
            sample_rate,
            frames_done: 0,
            controls,
        })
    }

    /// Fill one interleaved output block. The mono sample is duplicated
    /// across all `channels` of each frame.
    pub fn process_block(&mut self, data: &mut [f32], channels: usize) {
        while let Some(cmd) = self.commands.try_pop() {
            self.apply_command(cmd);
        }

        let channels = channels.max(1);
        for frame in data.chunks_mut(channels) {
            let raw = self.render.next_sample();
            let sample = self.filter.run(raw) * self.gain;
            for slot in frame.iter_mut() {
                *slot = sample;
            }
            self.frames_done += 1;
        }
        self.controls.store_elapsed(self.frames_done);
    }

    fn apply_command(&mut self, cmd: Command) {
        match cmd {
            Command::SetVolume(volume) => self.gain = volume,
            Command::SetFilterCutoff(hz) => {
                // Inputs are clamped control-side; if the coefficients
                // still fail the previous ones stay in effect.
                if let Ok(coeffs) = Coefficients::<f32>::from_params(
                    Type::LowPass,
                    self.sample_rate.hz(),
                    hz.hz(),
                    Q_BUTTERWORTH_F32,
                ) {
                    self.filter.update_coefficients(coeffs);
                }
            }
        }
    }
}

fn lowpass_coefficients(sample_rate: f32, cutoff_hz: f32) -> Result<Coefficients<f32>> {
    Coefficients::<f32>::from_params(
        Type::LowPass,
        sample_rate.hz(),
        cutoff_hz.hz(),
        Q_BUTTERWORTH_F32,
    )
    .map_err(|e| anyhow!("invalid low-pass parameters ({cutoff_hz} Hz at {sample_rate} Hz): {e:?}"))
}

struct ActiveStream {
    handle: StreamHandle,
    commands: HeapProd<Command>,
}

/// Owns the output stream lifecycle and bridges control-thread intent to
/// render-thread behavior.
///
/// Construct one per session at the composition root and pass it (or a
/// `SessionManager` wrapping it) to whatever needs playback control.
pub struct AudioEngine {
    config: EngineConfig,
    controls: Arc<SharedControls>,
    backend: Arc<dyn AudioBackend>,
    active: Option<ActiveStream>,
    state: PlaybackState,
}

impl AudioEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_backend(config, Arc::new(CpalBackend))
    }

    pub fn with_backend(mut config: EngineConfig, backend: Arc<dyn AudioBackend>) -> Self {
        config.volume = config.volume.clamp(0.0, 1.0);
        config.cutoff_hz = config.cutoff_hz.clamp(MIN_CUTOFF_HZ, MAX_CUTOFF_HZ);
        config.channels = config.channels.max(1);
        let controls = Arc::new(SharedControls::new(config.color));
        Self {
            config,
            controls,
            backend,
            active: None,
            state: PlaybackState::Stopped,
        }
    }

    /// Open the output stream and begin rendering. Idempotent while
    /// playing. On failure the engine stays Stopped and the reason is
    /// returned; retrying is the caller's decision.
    pub fn start(&mut self) -> Result<()> {
        if self.state == PlaybackState::Playing {
            return Ok(());
        }

        let (producer, consumer) = HeapRb::<Command>::new(COMMAND_QUEUE_CAPACITY).split();
        self.controls.store_elapsed(0);
        let pipeline = RenderPipeline::new(self.controls.clone(), consumer, &self.config)?;
        let spec = StreamSpec {
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
        };

        let handle = self
            .backend
            .open(spec, pipeline)
            .context("failed to open output stream")?;

        self.active = Some(ActiveStream {
            handle,
            commands: producer,
        });
        self.state = PlaybackState::Playing;
        log::info!(
            "engine started: {} noise at {} Hz, volume {:.2}, cutoff {:.0} Hz",
            self.config.color,
            self.config.sample_rate,
            self.config.volume,
            self.config.cutoff_hz
        );
        Ok(())
    }

    /// Tear the stream down. Idempotent. Returns only once the render
    /// callback can no longer be invoked.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.stop();
            log::info!("engine stopped");
        }
        self.state = PlaybackState::Stopped;
    }

    pub fn toggle(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Playing => {
                self.stop();
                Ok(())
            }
            PlaybackState::Stopped => self.start(),
        }
    }

    /// Clamped to [0, 1]; forwarded to the live stream if playing,
    /// otherwise stored for the next `start`.
    pub fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.config.volume = volume;
        if let Some(active) = self.active.as_mut() {
            let _ = active.commands.try_push(Command::SetVolume(volume));
        }
    }

    /// Clamped to [200, 20000] Hz; forwarded to the live filter stage if
    /// present.
    pub fn set_filter_cutoff(&mut self, cutoff_hz: f32) {
        let cutoff_hz = cutoff_hz.clamp(MIN_CUTOFF_HZ, MAX_CUTOFF_HZ);
        self.config.cutoff_hz = cutoff_hz;
        if let Some(active) = self.active.as_mut() {
            let _ = active.commands.try_push(Command::SetFilterCutoff(cutoff_hz));
        }
    }

    /// Valid whether or not a stream is open; the render context
    /// observes the change at its next sample and resets derived state.
    pub fn set_noise_color(&mut self, color: NoiseColor) {
        self.config.color = color;
        self.controls.set_color(color);
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn volume(&self) -> f32 {
        self.config.volume
    }

    pub fn filter_cutoff(&self) -> f32 {
        self.config.cutoff_hz
    }

    pub fn noise_color(&self) -> NoiseColor {
        self.config.color
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn elapsed_frames(&self) -> u64 {
        self.controls.elapsed_frames()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.controls.elapsed_frames() as f64 / self.config.sample_rate as f64
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

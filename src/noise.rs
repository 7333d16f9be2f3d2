use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// --- Voss-McCartney row count ---
// 16 octave-spaced rows cover the audible band at 44.1 kHz; row k is
// redrawn every 2^k samples on average, so the slowest row turns over
// roughly every 1.5 seconds.
pub const PINK_ROWS: usize = 16;

// --- Brown noise step range ---
// Each sample moves the random walk by a uniform step in
// [-BROWN_STEP, BROWN_STEP] before clamping to [-1, 1]. Larger steps
// brighten the spectrum; 0.1 matches the expected rumble.
pub const BROWN_STEP: f32 = 0.1;

/// Which generator the render callback consults.
///
/// Written by the control context, read every sample by the render
/// context through a single `AtomicU8` in [`SharedControls`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum NoiseColor {
    White = 0,
    Pink = 1,
    Brown = 2,
}

impl NoiseColor {
    pub(crate) fn to_bits(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            1 => NoiseColor::Pink,
            2 => NoiseColor::Brown,
            _ => NoiseColor::White,
        }
    }
}

impl std::fmt::Display for NoiseColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NoiseColor::White => "white",
            NoiseColor::Pink => "pink",
            NoiseColor::Brown => "brown",
        };
        f.write_str(name)
    }
}

impl FromStr for NoiseColor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "white" => Ok(NoiseColor::White),
            "pink" => Ok(NoiseColor::Pink),
            "brown" => Ok(NoiseColor::Brown),
            other => Err(anyhow::anyhow!(
                "unknown noise color '{other}' (expected white, pink, or brown)"
            )),
        }
    }
}

/// Uniform white sample in [-1, 1].
#[inline]
pub fn white_sample<R: Rng>(rng: &mut R) -> f32 {
    rng.gen_range(-1.0..=1.0)
}

/// Per-octave row state for the Voss-McCartney pink noise generator.
///
/// `running_sum` always equals the sum of `rows`; it is maintained
/// incrementally so a sample costs one subtraction and one addition
/// rather than a 16-element scan.
#[derive(Debug, Clone)]
pub struct PinkState {
    rows: [f32; PINK_ROWS],
    running_sum: f32,
    counter: u64,
}

impl PinkState {
    pub fn new() -> Self {
        Self {
            rows: [0.0; PINK_ROWS],
            running_sum: 0.0,
            counter: 0,
        }
    }

    pub fn reset(&mut self) {
        self.rows = [0.0; PINK_ROWS];
        self.running_sum = 0.0;
        self.counter = 0;
    }

    /// One pink sample. O(1), allocation-free.
    ///
    /// The row index is the trailing-zero count of the sample counter,
    /// capped at the last row; counter 0 maps to row 0 so the very first
    /// call after a reset touches row 0 only. The octave sum is
    /// normalized by the row count, one fresh white sample is added for
    /// the top of the spectrum, and the total is renormalized by
    /// rows / (rows - 1). Keep this exact formula: it is a deliberate
    /// approximation of a 1/f spectrum, not a textbook one, and it is
    /// the character listeners expect.
    #[inline]
    pub fn next<R: Rng>(&mut self, rng: &mut R) -> f32 {
        let k = if self.counter == 0 {
            0
        } else {
            (self.counter.trailing_zeros() as usize).min(PINK_ROWS - 1)
        };

        self.running_sum -= self.rows[k];
        self.rows[k] = rng.gen_range(-1.0..=1.0);
        self.running_sum += self.rows[k];

        let white: f32 = rng.gen_range(-1.0..=1.0);
        let rows = PINK_ROWS as f32;
        let out = (self.running_sum / rows + white) / (rows / (rows - 1.0));

        self.counter = self.counter.wrapping_add(1);
        out
    }
}

impl Default for PinkState {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamped-random-walk state for brown noise.
///
/// `last` stays in [-1, 1] after every update. The clamp is essential:
/// an unbounded walk drifts until the output saturates or goes silent
/// for long stretches.
#[derive(Debug, Clone)]
pub struct BrownState {
    last: f32,
}

impl BrownState {
    pub fn new() -> Self {
        Self { last: 0.0 }
    }

    pub fn reset(&mut self) {
        self.last = 0.0;
    }

    #[inline]
    pub fn next<R: Rng>(&mut self, rng: &mut R) -> f32 {
        let step: f32 = rng.gen_range(-BROWN_STEP..=BROWN_STEP);
        self.last = (self.last + step).clamp(-1.0, 1.0);
        self.last
    }
}

impl Default for BrownState {
    fn default() -> Self {
        Self::new()
    }
}

/// The only state shared between the control and render contexts.
///
/// The color selector is a single-word atomic rather than a locked
/// field: a lock here could be held by the control context while the
/// render thread needs it, and the worst outcome of the unsynchronized
/// read is a handful of stale-color samples, inaudible for noise. All
/// accesses are `Relaxed`; no ordering is promised beyond "the write is
/// observed at some later sample boundary".
pub struct SharedControls {
    color: AtomicU8,
    elapsed_frames: AtomicU64,
}

impl SharedControls {
    pub fn new(color: NoiseColor) -> Self {
        Self {
            color: AtomicU8::new(color.to_bits()),
            elapsed_frames: AtomicU64::new(0),
        }
    }

    pub fn set_color(&self, color: NoiseColor) {
        self.color.store(color.to_bits(), Ordering::Relaxed);
    }

    pub fn color(&self) -> NoiseColor {
        NoiseColor::from_bits(self.color.load(Ordering::Relaxed))
    }

    /// Frames rendered since the stream was opened, published by the
    /// render context once per block for position display.
    pub fn elapsed_frames(&self) -> u64 {
        self.elapsed_frames.load(Ordering::Relaxed)
    }

    pub(crate) fn store_elapsed(&self, frames: u64) {
        self.elapsed_frames.store(frames, Ordering::Relaxed);
    }
}

/// Render-context half of the generator.
///
/// Owns the per-algorithm derived state and the RNG; nothing here is
/// touched by the control context. A color change is observed at the top
/// of `next_sample`, and the full derived-state reset runs before the
/// first sample of the new color is produced, so switching away from a
/// color and back never resumes a stale walk or a half-built octave sum.
pub struct RenderState {
    controls: Arc<SharedControls>,
    active_color: NoiseColor,
    pink: PinkState,
    brown: BrownState,
    rng: SmallRng,
}

impl RenderState {
    pub fn new(controls: Arc<SharedControls>) -> Self {
        Self::with_rng(controls, SmallRng::from_entropy())
    }

    /// Deterministic construction for offline rendering and tests.
    pub fn with_rng(controls: Arc<SharedControls>, rng: SmallRng) -> Self {
        let active_color = controls.color();
        Self {
            controls,
            active_color,
            pink: PinkState::new(),
            brown: BrownState::new(),
            rng,
        }
    }

    /// Zero all derived state. Idempotent.
    pub fn reset(&mut self) {
        self.pink.reset();
        self.brown.reset();
    }

    /// Produce the next sample. Bounded time, no allocation, no locks;
    /// safe to call from a real-time deadline.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let color = self.controls.color();
        if color != self.active_color {
            self.reset();
            self.active_color = color;
        }

        match color {
            NoiseColor::White => white_sample(&mut self.rng),
            NoiseColor::Pink => self.pink.next(&mut self.rng),
            NoiseColor::Brown => self.brown.next(&mut self.rng),
        }
    }
}

//! Real-time procedural noise synthesis engine.
//!
//! Three generators (white, pink via Voss-McCartney, brown as a clamped
//! random walk) feed a mono render callback through a low-pass filter
//! and output gain. The control context mutates parameters through a
//! lock-free path (a single-word atomic for the color selector, an SPSC
//! command queue for gain and cutoff) while the render context owns all
//! per-algorithm derived state; nothing on the callback path blocks,
//! allocates, or logs.
//!
//! [`AudioEngine`] owns the stream lifecycle; [`SessionManager`] adds
//! the interruption/resume state machine on top. Construct both at the
//! composition root and hand them to whatever drives playback.

pub mod audio_io;
pub mod command;
pub mod engine;
pub mod logging;
pub mod noise;
pub mod session;

pub use audio_io::{AudioBackend, CpalBackend, StreamHandle, StreamSpec};
pub use command::Command;
pub use engine::{
    AudioEngine, EngineConfig, PlaybackState, RenderPipeline, MAX_CUTOFF_HZ, MIN_CUTOFF_HZ,
};
pub use logging::init_logging;
pub use noise::{BrownState, NoiseColor, PinkState, RenderState, SharedControls};
pub use session::{InterruptionEvent, SessionManager};

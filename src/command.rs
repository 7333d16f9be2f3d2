/// Control-context requests delivered to the render callback over a
/// lock-free SPSC ring buffer and drained at the top of each block.
///
/// The noise color selector is not a command: it travels through the
/// `SharedControls` atomic so it keeps working while no stream is open.
#[derive(Debug, Clone, Copy)]
pub enum Command {
    /// Set the output gain (already clamped to 0.0 - 1.0).
    SetVolume(f32),
    /// Retune the low-pass stage (already clamped to 200 - 20000 Hz).
    SetFilterCutoff(f32),
}

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use crossbeam::channel::{bounded, Receiver, Sender};
use std::thread::JoinHandle;

use crate::engine::RenderPipeline;

/// What the engine asks the backend to open.
#[derive(Debug, Clone, Copy)]
pub struct StreamSpec {
    pub sample_rate: u32,
    /// Channel count of the generated signal. The device may expose a
    /// different layout; the mono sample is written to every channel of
    /// each output frame.
    pub channels: u16,
}

/// Handle to a running output stream.
///
/// `stop` (or dropping the handle) signals the stream thread and joins
/// it, so once it returns the render callback cannot run again.
pub struct StreamHandle {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn new(stop_tx: Sender<()>, thread: JoinHandle<()>) -> Self {
        Self {
            stop_tx,
            thread: Some(thread),
        }
    }

    /// Tear the stream down. Blocks until the owning thread has dropped
    /// the platform stream; no fire-and-forget.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.stop_tx.send(());
            let _ = thread.join();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Output-stream boundary.
///
/// `open` hands the pipeline to a platform stream and returns once the
/// stream is live (or with the open failure). Implementations must
/// guarantee that after `StreamHandle::stop` returns the pipeline is no
/// longer invoked.
pub trait AudioBackend: Send + Sync {
    fn open(&self, spec: StreamSpec, pipeline: RenderPipeline) -> Result<StreamHandle>;
}

/// cpal-based backend. A dedicated thread owns the device and stream
/// (cpal streams are not `Send` on every platform) and parks on a stop
/// channel while the callback runs on the platform's audio thread.
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn open(&self, spec: StreamSpec, pipeline: RenderPipeline) -> Result<StreamHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        let thread = std::thread::Builder::new()
            .name("noise-output".into())
            .spawn(move || run_output_stream(spec, pipeline, stop_rx, ready_tx))
            .context("failed to spawn output stream thread")?;

        // Block until the stream is playing or the open failed; open
        // failures surface here so the engine can stay Stopped.
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(StreamHandle::new(stop_tx, thread)),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(anyhow!("output stream thread exited before reporting status"))
            }
        }
    }
}

fn run_output_stream(
    spec: StreamSpec,
    pipeline: RenderPipeline,
    stop_rx: Receiver<()>,
    ready_tx: Sender<Result<()>>,
) {
    match open_stream(spec, pipeline) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            // Parked until stop() sends or the engine drops the sender.
            let _ = stop_rx.recv();
            drop(stream);
            log::debug!("output stream torn down");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn open_stream(spec: StreamSpec, mut pipeline: RenderPipeline) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no output device available"))?;

    let config = pick_config(&device, spec)?;
    let channels = config.channels.max(1) as usize;
    log::info!(
        "opening output stream: {} Hz, {} channel(s) on {:?}",
        config.sample_rate.0,
        config.channels,
        host.id()
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                pipeline.process_block(data, channels);
            },
            |err| log::error!("output stream error: {err}"),
            None,
        )
        .context("failed to build output stream")?;

    stream.play().context("failed to start output stream")?;
    Ok(stream)
}

/// Negotiate a stream config for the requested rate, preferring the
/// requested channel layout and falling back to whatever the device
/// offers at that rate.
fn pick_config(device: &cpal::Device, spec: StreamSpec) -> Result<StreamConfig> {
    let supported = device
        .default_output_config()
        .context("no default output config")?;
    if supported.sample_format() != SampleFormat::F32 {
        bail!(
            "unsupported sample format {:?} (only f32 output is handled)",
            supported.sample_format()
        );
    }

    let default_config: StreamConfig = supported.into();
    if default_config.sample_rate.0 == spec.sample_rate && default_config.channels == spec.channels
    {
        return Ok(default_config);
    }

    let ranges: Vec<_> = device
        .supported_output_configs()
        .context("could not query supported output configs")?
        .filter(|r| {
            r.sample_format() == SampleFormat::F32
                && r.min_sample_rate().0 <= spec.sample_rate
                && spec.sample_rate <= r.max_sample_rate().0
        })
        .collect();

    if let Some(range) = ranges.iter().find(|r| r.channels() == spec.channels) {
        return Ok(range
            .clone()
            .with_sample_rate(SampleRate(spec.sample_rate))
            .config());
    }
    if let Some(range) = ranges.into_iter().next() {
        return Ok(range.with_sample_rate(SampleRate(spec.sample_rate)).config());
    }

    bail!(
        "output device does not support {} Hz playback",
        spec.sample_rate
    )
}

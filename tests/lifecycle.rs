//! End-to-end lifecycle scenarios against a fake output backend.
//!
//! The fake backend drives the render pipeline from its own thread at a
//! fixed cadence, which exercises the same control/render split as a
//! real device without needing audio hardware.

use anyhow::{bail, Result};
use crossbeam::channel::{bounded, RecvTimeoutError};
use noise_engine::{
    AudioBackend, AudioEngine, EngineConfig, InterruptionEvent, NoiseColor, PlaybackState,
    RenderPipeline, SessionManager, StreamHandle, StreamSpec, MAX_CUTOFF_HZ,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const BLOCK_FRAMES: usize = 256;
const CAPTURE_LIMIT: usize = 1 << 16;

#[derive(Clone, Default)]
struct FakeBackend {
    blocks_rendered: Arc<AtomicU64>,
    fail_next_open: Arc<AtomicBool>,
    captured: Arc<Mutex<Vec<f32>>>,
}

impl AudioBackend for FakeBackend {
    fn open(&self, spec: StreamSpec, mut pipeline: RenderPipeline) -> Result<StreamHandle> {
        if self.fail_next_open.load(Ordering::SeqCst) {
            bail!("output device unavailable");
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let blocks = self.blocks_rendered.clone();
        let captured = self.captured.clone();
        let channels = spec.channels.max(1) as usize;

        let thread = thread::spawn(move || {
            let mut buf = vec![0.0f32; BLOCK_FRAMES * channels];
            loop {
                match stop_rx.recv_timeout(Duration::from_millis(2)) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                pipeline.process_block(&mut buf, channels);
                blocks.fetch_add(1, Ordering::SeqCst);
                let mut captured = captured.lock().unwrap();
                if captured.len() < CAPTURE_LIMIT {
                    captured.extend_from_slice(&buf);
                }
            }
        });

        Ok(StreamHandle::new(stop_tx, thread))
    }
}

fn engine_with(backend: &FakeBackend, config: EngineConfig) -> AudioEngine {
    AudioEngine::with_backend(config, Arc::new(backend.clone()))
}

fn wait_for_blocks(backend: &FakeBackend, at_least: u64) {
    for _ in 0..500 {
        if backend.blocks_rendered.load(Ordering::SeqCst) >= at_least {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("backend never rendered {at_least} blocks");
}

#[test]
fn start_with_white_noise_reports_playing() {
    let backend = FakeBackend::default();
    let mut engine = engine_with(
        &backend,
        EngineConfig {
            color: NoiseColor::White,
            volume: 0.5,
            ..EngineConfig::default()
        },
    );

    engine.start().unwrap();
    assert_eq!(engine.playback_state(), PlaybackState::Playing);
    wait_for_blocks(&backend, 3);
    engine.stop();
}

#[test]
fn start_is_idempotent_while_playing() {
    let backend = FakeBackend::default();
    let mut engine = engine_with(&backend, EngineConfig::default());
    engine.start().unwrap();
    engine.start().unwrap();
    assert_eq!(engine.playback_state(), PlaybackState::Playing);
    engine.stop();
}

#[test]
fn stop_is_synchronous_and_idempotent() {
    let backend = FakeBackend::default();
    let mut engine = engine_with(&backend, EngineConfig::default());
    engine.start().unwrap();
    wait_for_blocks(&backend, 3);

    engine.stop();
    assert_eq!(engine.playback_state(), PlaybackState::Stopped);

    // Once stop() has returned the render thread is gone; the block
    // count must not move again.
    let after_stop = backend.blocks_rendered.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(backend.blocks_rendered.load(Ordering::SeqCst), after_stop);

    engine.stop();
    assert_eq!(engine.playback_state(), PlaybackState::Stopped);
}

#[test]
fn failed_start_leaves_engine_stopped() {
    let backend = FakeBackend::default();
    backend.fail_next_open.store(true, Ordering::SeqCst);
    let mut engine = engine_with(&backend, EngineConfig::default());

    let err = engine.start().unwrap_err();
    assert!(err.to_string().contains("output stream"));
    assert_eq!(engine.playback_state(), PlaybackState::Stopped);

    // The failure is not sticky; the caller may retry.
    backend.fail_next_open.store(false, Ordering::SeqCst);
    engine.start().unwrap();
    assert_eq!(engine.playback_state(), PlaybackState::Playing);
    engine.stop();
}

#[test]
fn toggle_flips_between_states() {
    let backend = FakeBackend::default();
    let mut engine = engine_with(&backend, EngineConfig::default());

    engine.toggle().unwrap();
    assert!(engine.is_playing());
    engine.toggle().unwrap();
    assert!(!engine.is_playing());
}

#[test]
fn parameter_boundaries_are_clamped() {
    let backend = FakeBackend::default();
    let mut engine = engine_with(&backend, EngineConfig::default());

    engine.set_filter_cutoff(100_000.0);
    assert_eq!(engine.filter_cutoff(), MAX_CUTOFF_HZ);
    engine.set_volume(-0.3);
    assert_eq!(engine.volume(), 0.0);
    engine.set_volume(2.5);
    assert_eq!(engine.volume(), 1.0);
}

#[test]
fn rendered_output_is_bounded_and_audible() {
    let backend = FakeBackend::default();
    let mut engine = engine_with(
        &backend,
        EngineConfig {
            color: NoiseColor::White,
            volume: 0.5,
            ..EngineConfig::default()
        },
    );
    engine.start().unwrap();
    wait_for_blocks(&backend, 8);
    engine.stop();

    let captured = backend.captured.lock().unwrap();
    assert!(!captured.is_empty());
    let mut peak = 0.0f32;
    for s in captured.iter() {
        assert!(s.is_finite());
        peak = peak.max(s.abs());
    }
    assert!(peak > 0.0, "engine rendered silence");
    assert!(peak <= 1.0, "peak {peak} exceeds full scale");
}

#[test]
fn elapsed_position_advances_while_playing() {
    let backend = FakeBackend::default();
    let mut engine = engine_with(&backend, EngineConfig::default());
    engine.start().unwrap();
    wait_for_blocks(&backend, 4);
    engine.stop();

    assert!(engine.elapsed_frames() >= 4 * BLOCK_FRAMES as u64);
    assert!(engine.elapsed_seconds() > 0.0);
}

#[test]
fn interruption_stops_and_resume_restarts() {
    let backend = FakeBackend::default();
    let session = SessionManager::new(engine_with(&backend, EngineConfig::default()));
    session.start().unwrap();
    assert_eq!(session.playback_state(), PlaybackState::Playing);

    session
        .handle_interruption(InterruptionEvent::Began)
        .unwrap();
    assert_eq!(session.playback_state(), PlaybackState::Stopped);

    // Resume happens without the caller issuing start() again, and the
    // configuration survives the interruption.
    session.set_noise_color(NoiseColor::Brown);
    session
        .handle_interruption(InterruptionEvent::Ended {
            should_resume: true,
        })
        .unwrap();
    assert_eq!(session.playback_state(), PlaybackState::Playing);
    assert_eq!(session.noise_color(), NoiseColor::Brown);
    session.stop();
}

#[test]
fn explicit_stop_suppresses_auto_resume() {
    let backend = FakeBackend::default();
    let session = SessionManager::new(engine_with(&backend, EngineConfig::default()));
    session.start().unwrap();

    session
        .handle_interruption(InterruptionEvent::Began)
        .unwrap();
    session.stop();
    session
        .handle_interruption(InterruptionEvent::Ended {
            should_resume: true,
        })
        .unwrap();
    assert_eq!(session.playback_state(), PlaybackState::Stopped);
}

#[test]
fn resume_is_skipped_when_platform_disallows_it() {
    let backend = FakeBackend::default();
    let session = SessionManager::new(engine_with(&backend, EngineConfig::default()));
    session.start().unwrap();

    session
        .handle_interruption(InterruptionEvent::Began)
        .unwrap();
    session
        .handle_interruption(InterruptionEvent::Ended {
            should_resume: false,
        })
        .unwrap();
    assert_eq!(session.playback_state(), PlaybackState::Stopped);
}

#[test]
fn failed_resume_reports_and_stays_stopped() {
    let backend = FakeBackend::default();
    let session = SessionManager::new(engine_with(&backend, EngineConfig::default()));
    session.start().unwrap();

    session
        .handle_interruption(InterruptionEvent::Began)
        .unwrap();
    backend.fail_next_open.store(true, Ordering::SeqCst);
    let result = session.handle_interruption(InterruptionEvent::Ended {
        should_resume: true,
    });
    assert!(result.is_err());
    assert_eq!(session.playback_state(), PlaybackState::Stopped);
}

#[test]
fn interruption_while_stopped_is_a_no_op() {
    let backend = FakeBackend::default();
    let session = SessionManager::new(engine_with(&backend, EngineConfig::default()));

    session
        .handle_interruption(InterruptionEvent::Began)
        .unwrap();
    session
        .handle_interruption(InterruptionEvent::Ended {
            should_resume: true,
        })
        .unwrap();
    assert_eq!(session.playback_state(), PlaybackState::Stopped);
}

#[test]
fn live_volume_change_reaches_the_render_thread() {
    let backend = FakeBackend::default();
    let mut engine = engine_with(
        &backend,
        EngineConfig {
            volume: 0.8,
            ..EngineConfig::default()
        },
    );
    engine.start().unwrap();
    wait_for_blocks(&backend, 2);

    engine.set_volume(0.0);
    let seen = backend.blocks_rendered.load(Ordering::SeqCst);
    wait_for_blocks(&backend, seen + 3);
    engine.stop();

    // Everything rendered after the command drained must be silent;
    // check the tail of the capture.
    let captured = backend.captured.lock().unwrap();
    let tail = &captured[captured.len().saturating_sub(BLOCK_FRAMES)..];
    assert!(tail.iter().all(|s| *s == 0.0), "tail still audible");
}

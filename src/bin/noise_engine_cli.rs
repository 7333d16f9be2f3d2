use anyhow::{Context, Result};
use clap::Parser;
use noise_engine::{init_logging, AudioEngine, EngineConfig, SessionManager};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "noise_engine_cli")]
#[command(about = "Play procedurally generated noise from the terminal")]
struct Args {
    /// Noise color: white, pink, or brown
    #[arg(short, long, default_value = "pink")]
    color: String,

    /// Output volume in [0, 1]
    #[arg(short, long)]
    volume: Option<f32>,

    /// Low-pass cutoff in Hz (200 - 20000)
    #[arg(long)]
    cutoff: Option<f32>,

    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(short, long)]
    duration: Option<f64>,

    /// TOML file with engine defaults; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("could not read config file {}", path.display()))?;
            toml::from_str::<EngineConfig>(&text)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    config.color = args.color.parse()?;
    if let Some(volume) = args.volume {
        config.volume = volume;
    }
    if let Some(cutoff) = args.cutoff {
        config.cutoff_hz = cutoff;
    }

    let session = SessionManager::new(AudioEngine::new(config));
    session.start()?;
    println!(
        "Playing {} noise at volume {:.2}, cutoff {:.0} Hz (Ctrl-C to stop)",
        session.noise_color(),
        session.volume(),
        session.filter_cutoff()
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::Relaxed))
            .context("failed to install Ctrl-C handler")?;
    }

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    while running.load(Ordering::Relaxed) {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    session.stop();
    println!("Stopped after {:.1}s", session.elapsed_seconds());
    Ok(())
}

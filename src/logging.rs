use std::panic;
use std::sync::Once;

static INIT: Once = Once::new();

/// Install the platform logger and the panic hook. Safe to call more
/// than once; only the first call does anything.
pub fn init_logging() {
    INIT.call_once(|| {
        #[cfg(target_os = "android")]
        {
            android_logger::init_once(
                android_logger::Config::default()
                    .with_max_level(log::LevelFilter::Info)
                    .with_tag("NoiseEngine"),
            );
        }

        #[cfg(target_os = "ios")]
        {
            let _ = oslog::OsLogger::new("dev.noise-engine")
                .level_filter(log::LevelFilter::Info)
                .init();
        }

        #[cfg(not(any(target_os = "android", target_os = "ios")))]
        {
            let _ = env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or("info"),
            )
            .try_init();
        }

        set_panic_hook();
        log::info!("logging initialized");
    });
}

/// Route panic messages (with backtraces) through the logger before the
/// default hook runs, so crashes on worker threads reach the platform
/// log instead of a discarded stderr.
fn set_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Box<Any>"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        let bt = backtrace::Backtrace::new();
        log::error!("panic at {location}: {msg}\nbacktrace:\n{bt:?}");

        default_hook(panic_info);
    }));
}

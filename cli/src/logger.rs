use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use std::sync::OnceLock;

/// Routes log records through the progress bars so they do not tear each other
pub struct Logger {
    multi_progress: MultiProgress,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

impl Logger {
    pub fn init() -> &'static Self {
        LOGGER.get_or_init(|| {
            // Only warnings by default, e.g. overlapping routes; more with RUST_LOG=debug
            let logger =
                env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
                    .build();

            let level = logger.filter();
            let multi_progress = MultiProgress::new();

            if let Err(error) = LogWrapper::new(multi_progress.clone(), logger).try_init() {
                eprintln!("Logger is not available: {error}");
            }

            log::set_max_level(level);
            Self { multi_progress }
        })
    }

    pub fn multi_progress() -> &'static MultiProgress {
        &Self::init().multi_progress
    }
}

mod config;
mod daemon;
mod scheduler;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::{default_config_path, default_ics_path, ConfigFile, ServiceConfig};
pub use daemon::{build_calendar_sync, build_notifier, build_sound_player, run_daemon};
pub use scheduler::{start_engine_threads, EngineControl};

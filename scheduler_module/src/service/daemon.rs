use std::future::Future;
use std::sync::Arc;

use alert_module::{
    CommandNotifier, CommandSoundPlayer, DeviceSoundPlayer, LogNotifier, Notifier, SilentPlayer,
    SoundPlayer,
};
use tokio::task;
use tracing::{info, warn};

use crate::alerts::AlertController;
use crate::broadcast::{BroadcastOptions, BroadcastServer};
use crate::calendar_sync::{CalendarSync, FeedFileSync, IcsFileSync, MultiSync, NoopSync};
use crate::scheduler::{ReminderEngine, TaskStore};

use super::config::ServiceConfig;
use super::scheduler::start_engine_threads;
use super::BoxError;

/// Device playback of `sound_file` by default; `sound_command` replaces it
/// with an external player. Anything unusable degrades to silence.
pub fn build_sound_player(config: &ServiceConfig) -> Arc<dyn SoundPlayer> {
    let Some(sound_file) = &config.sound_file else {
        if config.sound_command.is_some() {
            warn!("sound_command is set but sound_file is not; red alerts will be silent");
        }
        return Arc::new(SilentPlayer);
    };
    if let Some(player) = config
        .sound_command
        .as_deref()
        .and_then(|command| CommandSoundPlayer::new(command, sound_file))
    {
        return Arc::new(player);
    }
    match DeviceSoundPlayer::new(sound_file) {
        Ok(player) => Arc::new(player),
        Err(err) => {
            warn!(
                "alert sound {} unusable, red alerts will be silent: {}",
                sound_file.display(),
                err
            );
            Arc::new(SilentPlayer)
        }
    }
}

pub fn build_notifier(config: &ServiceConfig) -> Arc<dyn Notifier> {
    match config.notify_command.as_deref().and_then(CommandNotifier::new) {
        Some(notifier) => Arc::new(notifier),
        None => Arc::new(LogNotifier),
    }
}

pub fn build_calendar_sync(config: &ServiceConfig) -> Box<dyn CalendarSync> {
    let mut multi = MultiSync::default();
    for path in &config.ics_paths {
        multi.push(Box::new(IcsFileSync::new(path)));
    }
    for path in &config.feed_paths {
        multi.push(Box::new(FeedFileSync::new(path)));
    }
    if multi.is_empty() {
        return Box::new(NoopSync);
    }
    Box::new(multi)
}

/// Runs the reminder daemon until `shutdown` resolves.
///
/// Shutdown order: polling engine (no new alerts, running ones silenced),
/// then any alert still registered, then the broadcast server.
pub async fn run_daemon(
    config: ServiceConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let store = TaskStore::new(&config.db_path)?;
    info!("task store at {}", store.path().display());

    let alerts = Arc::new(AlertController::new(
        build_notifier(&config),
        build_sound_player(&config),
    ));
    let (ack_tx, ack_rx) = crossbeam_channel::unbounded();
    let server = Arc::new(BroadcastServer::bind(
        config.socket_addr()?,
        BroadcastOptions {
            write_timeout: config.client_write_timeout,
            inbound: Some(ack_tx),
        },
    )?);

    let engine = Arc::new(ReminderEngine::new(
        store,
        alerts.clone(),
        build_calendar_sync(&config),
        server.clone(),
        config.engine_settings(),
    ));
    let mut engine_control = start_engine_threads(engine, Some(ack_rx));

    shutdown.await;
    info!("shutdown requested");

    task::spawn_blocking(move || {
        engine_control.stop_and_join();
        let leftover = alerts.stop_all();
        if leftover > 0 {
            warn!("{} alert(s) were still registered after engine stop", leftover);
        }
        server.shutdown();
    })
    .await?;
    info!("reminder daemon stopped");
    Ok(())
}

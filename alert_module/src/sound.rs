use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use tracing::debug;

use crate::command::split_command;
use crate::errors::PlaybackError;

/// Starts one burst of alert sound.
///
/// The returned handle keeps playing until it is stopped; the caller owns
/// the burst/rest timing.
pub trait SoundPlayer: Send + Sync {
    fn play(&self) -> Result<Box<dyn ActivePlayback>, PlaybackError>;
}

/// A sound that is currently playing.
pub trait ActivePlayback: Send {
    fn stop(self: Box<Self>) -> Result<(), PlaybackError>;
}

/// Override player: runs an external program, e.g. `mpv --loop=inf`
/// or `paplay`. The file path is appended as the last argument.
#[derive(Debug, Clone)]
pub struct CommandSoundPlayer {
    program: String,
    args: Vec<String>,
    sound_file: PathBuf,
}

impl CommandSoundPlayer {
    pub fn new(command: &str, sound_file: impl Into<PathBuf>) -> Option<Self> {
        let (program, args) = split_command(command)?;
        Some(Self {
            program,
            args,
            sound_file: sound_file.into(),
        })
    }

    pub fn sound_file(&self) -> &PathBuf {
        &self.sound_file
    }
}

impl SoundPlayer for CommandSoundPlayer {
    fn play(&self) -> Result<Box<dyn ActivePlayback>, PlaybackError> {
        if !self.sound_file.exists() {
            return Err(PlaybackError::SoundFileMissing(self.sound_file.clone()));
        }
        let child = match Command::new(&self.program)
            .args(&self.args)
            .arg(&self.sound_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(PlaybackError::CommandNotFound(self.program.clone()))
            }
            Err(err) => return Err(PlaybackError::Io(err)),
        };
        debug!("sound playback started (pid {})", child.id());
        Ok(Box::new(CommandPlayback { child }))
    }
}

struct CommandPlayback {
    child: Child,
}

impl ActivePlayback for CommandPlayback {
    fn stop(mut self: Box<Self>) -> Result<(), PlaybackError> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}

/// Used when no usable sound file is configured.
#[derive(Debug, Default, Clone)]
pub struct SilentPlayer;

impl SoundPlayer for SilentPlayer {
    fn play(&self) -> Result<Box<dyn ActivePlayback>, PlaybackError> {
        debug!("silent player: no sound configured");
        Ok(Box::new(SilentPlayback))
    }
}

struct SilentPlayback;

impl ActivePlayback for SilentPlayback {
    fn stop(self: Box<Self>) -> Result<(), PlaybackError> {
        Ok(())
    }
}

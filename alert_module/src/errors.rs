use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sound file not found: {}", .0.display())]
    SoundFileMissing(PathBuf),
    #[error("sound command not found on PATH: {0}")]
    CommandNotFound(String),
    #[error("sound decode error: {0}")]
    Decode(String),
    #[error("audio device error: {0}")]
    Device(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("notification command not found on PATH: {0}")]
    CommandNotFound(String),
    #[error("notification command failed (status: {status:?}): {output}")]
    CommandFailed { status: Option<i32>, output: String },
}

//! Side-effect collaborators driven by the reminder alert controller.
//!
//! The scheduler never plays sound or draws notifications itself; it calls
//! through the [`SoundPlayer`] and [`Notifier`] traits defined here.

mod command;
mod device;
mod errors;
mod notify;
mod sound;

pub use command::split_command;
pub use device::DeviceSoundPlayer;
pub use errors::{NotificationError, PlaybackError};
pub use notify::{CommandNotifier, LogNotifier, Notifier};
pub use sound::{ActivePlayback, CommandSoundPlayer, SilentPlayer, SoundPlayer};

use std::io;
use std::process::{Command, Stdio};

use tracing::info;

use crate::command::{split_command, tail_string};
use crate::errors::NotificationError;

/// One-shot, fire-and-forget user notification.
pub trait Notifier: Send + Sync {
    fn show(&self, title: &str, message: &str) -> Result<(), NotificationError>;
}

/// Runs an external notifier such as `notify-send`, passing title and
/// message as the last two arguments.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    pub fn new(command: &str) -> Option<Self> {
        let (program, args) = split_command(command)?;
        Some(Self { program, args })
    }
}

impl Notifier for CommandNotifier {
    fn show(&self, title: &str, message: &str) -> Result<(), NotificationError> {
        let output = match Command::new(&self.program)
            .args(&self.args)
            .arg(title)
            .arg(message)
            .stdin(Stdio::null())
            .output()
        {
            Ok(output) => output,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(NotificationError::CommandNotFound(self.program.clone()))
            }
            Err(err) => return Err(NotificationError::Io(err)),
        };
        if !output.status.success() {
            let mut combined = String::new();
            combined.push_str(&String::from_utf8_lossy(&output.stdout));
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(NotificationError::CommandFailed {
                status: output.status.code(),
                output: tail_string(&combined, 500),
            });
        }
        Ok(())
    }
}

/// Writes notifications to the log. Default when no notifier command is set.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, title: &str, message: &str) -> Result<(), NotificationError> {
        info!("notification: {} ({})", title, message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_command_is_rejected() {
        assert!(CommandNotifier::new("").is_none());
    }

    #[test]
    fn missing_program_is_reported() {
        let notifier = CommandNotifier::new("anchor-no-such-notifier-xyz").expect("notifier");
        let err = notifier.show("Due: pills", "Open checklist").err().expect("error");
        assert!(matches!(err, NotificationError::CommandNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn successful_command_returns_ok() {
        let notifier = CommandNotifier::new("true").expect("notifier");
        notifier.show("Due: pills", "Open checklist").expect("show");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_reports_status() {
        let notifier = CommandNotifier::new("false").expect("notifier");
        let err = notifier.show("Due: pills", "Open checklist").err().expect("error");
        match err {
            NotificationError::CommandFailed { status, .. } => assert_eq!(status, Some(1)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn log_notifier_never_fails() {
        LogNotifier.show("Due: pills", "Open checklist").expect("show");
    }
}

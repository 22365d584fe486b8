use std::env;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::alerts::{AlertSettings, DEFAULT_RED_ALERT_BURST, DEFAULT_RED_ALERT_REPEAT};
use crate::broadcast::DEFAULT_CLIENT_WRITE_TIMEOUT;
use crate::scheduler::{EngineSettings, DEFAULT_CHECK_INTERVAL};

use super::BoxError;

pub const DEFAULT_SOCKET_HOST: &str = "127.0.0.1";
pub const DEFAULT_SOCKET_PORT: u16 = 8765;

/// Optional on-disk configuration. Every key may be omitted.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub db_path: Option<PathBuf>,
    pub ics_paths: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub feed_paths: Vec<PathBuf>,
    pub check_interval_seconds: Option<u64>,
    pub red_alert_burst_seconds: Option<u64>,
    pub red_alert_repeat_seconds: Option<u64>,
    pub sound_file: Option<PathBuf>,
    pub sound_command: Option<String>,
    pub notify_command: Option<String>,
    pub socket_host: Option<String>,
    pub socket_port: Option<u16>,
    pub client_write_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub ics_paths: Vec<PathBuf>,
    pub feed_paths: Vec<PathBuf>,
    pub check_interval: Duration,
    pub red_alert_burst: Duration,
    pub red_alert_repeat: Duration,
    pub sound_file: Option<PathBuf>,
    pub sound_command: Option<String>,
    pub notify_command: Option<String>,
    pub socket_host: String,
    pub socket_port: u16,
    pub client_write_timeout: Duration,
}

impl ServiceConfig {
    /// `.env`, then the TOML file (`ANCHOR_CONFIG_PATH` or
    /// `~/.anchor_note/config.toml`), then `ANCHOR_*` environment overrides.
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let file = match env_string("ANCHOR_CONFIG_PATH") {
            Some(path) => load_config_file(Path::new(&path))?,
            None => match default_config_path() {
                Some(path) if path.exists() => load_config_file(&path)?,
                _ => ConfigFile::default(),
            },
        };
        Self::from_file_and_env(file)
    }

    pub fn from_file_and_env(file: ConfigFile) -> Result<Self, BoxError> {
        let db_path = match env_string("ANCHOR_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => match file.db_path {
                Some(path) => path,
                None => default_state_dir()
                    .ok_or("unable to resolve home directory for db_path")?
                    .join("tasks.db"),
            },
        };
        let ics_paths = match env_string("ANCHOR_ICS_PATHS") {
            Some(raw) => env::split_paths(&raw).collect(),
            None => match file.ics_paths {
                Some(paths) => paths,
                None => default_ics_path().into_iter().collect(),
            },
        };
        let feed_paths = match env_string("ANCHOR_FEED_PATHS") {
            Some(raw) => env::split_paths(&raw).collect(),
            None => file.feed_paths,
        };

        let check_interval = seconds(
            env_parse::<u64>("ANCHOR_CHECK_INTERVAL_SECS")?.or(file.check_interval_seconds),
            DEFAULT_CHECK_INTERVAL,
        );
        let red_alert_burst = seconds(
            env_parse::<u64>("ANCHOR_RED_ALERT_BURST_SECS")?.or(file.red_alert_burst_seconds),
            DEFAULT_RED_ALERT_BURST,
        );
        let red_alert_repeat = seconds(
            env_parse::<u64>("ANCHOR_RED_ALERT_REPEAT_SECS")?.or(file.red_alert_repeat_seconds),
            DEFAULT_RED_ALERT_REPEAT,
        );
        let client_write_timeout = env_parse::<u64>("ANCHOR_CLIENT_WRITE_TIMEOUT_MS")?
            .or(file.client_write_timeout_ms)
            .filter(|value| *value > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CLIENT_WRITE_TIMEOUT);

        let sound_file = env_string("ANCHOR_SOUND_FILE")
            .map(PathBuf::from)
            .or(file.sound_file)
            .or_else(|| {
                default_state_dir()
                    .map(|dir| dir.join("alert.wav"))
                    .filter(|path| path.exists())
            });
        let sound_command = env_string("ANCHOR_SOUND_COMMAND").or(non_blank(file.sound_command));
        let notify_command = env_string("ANCHOR_NOTIFY_COMMAND").or(non_blank(file.notify_command));
        let socket_host = env_string("ANCHOR_SOCKET_HOST")
            .or(non_blank(file.socket_host))
            .unwrap_or_else(|| DEFAULT_SOCKET_HOST.to_string());
        let socket_port = env_parse::<u16>("ANCHOR_SOCKET_PORT")?
            .or(file.socket_port)
            .unwrap_or(DEFAULT_SOCKET_PORT);

        Ok(Self {
            db_path,
            ics_paths,
            feed_paths,
            check_interval,
            red_alert_burst,
            red_alert_repeat,
            sound_file,
            sound_command,
            notify_command,
            socket_host,
            socket_port,
            client_write_timeout,
        })
    }

    /// Resolves `socket_host` (an IP literal or a name such as
    /// `localhost`), preferring a loopback address when the name has several.
    pub fn socket_addr(&self) -> Result<SocketAddr, BoxError> {
        let candidates: Vec<SocketAddr> = (self.socket_host.as_str(), self.socket_port)
            .to_socket_addrs()
            .map_err(|err| format!("invalid socket host {}: {}", self.socket_host, err))?
            .collect();
        candidates
            .iter()
            .find(|addr| addr.ip().is_loopback())
            .or_else(|| candidates.first())
            .copied()
            .ok_or_else(|| format!("socket host {} resolved to no address", self.socket_host).into())
    }

    pub fn alert_settings(&self) -> AlertSettings {
        AlertSettings {
            burst: self.red_alert_burst,
            repeat_interval: self.red_alert_repeat,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            check_interval: self.check_interval,
            alert: self.alert_settings(),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    default_state_dir().map(|dir| dir.join("config.toml"))
}

/// `~/calendar.ics`; a missing file simply syncs nothing.
pub fn default_ics_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("calendar.ics"))
}

fn default_state_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".anchor_note"))
}

fn load_config_file(path: &Path) -> Result<ConfigFile, BoxError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
    let file = toml::from_str::<ConfigFile>(&content)
        .map_err(|err| format!("failed to parse config {}: {}", path.display(), err))?;
    Ok(file)
}

/// Zero would make the loops spin; clamp to one second.
fn seconds(value: Option<u64>, default: Duration) -> Duration {
    value
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or(default)
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, BoxError> {
    match env_string(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("invalid value for {}: {}", key, raw).into()),
        None => Ok(None),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const KEYS: &[&str] = &[
        "ANCHOR_CONFIG_PATH",
        "ANCHOR_DB_PATH",
        "ANCHOR_ICS_PATHS",
        "ANCHOR_FEED_PATHS",
        "ANCHOR_CHECK_INTERVAL_SECS",
        "ANCHOR_RED_ALERT_BURST_SECS",
        "ANCHOR_RED_ALERT_REPEAT_SECS",
        "ANCHOR_SOUND_FILE",
        "ANCHOR_SOUND_COMMAND",
        "ANCHOR_NOTIFY_COMMAND",
        "ANCHOR_SOCKET_HOST",
        "ANCHOR_SOCKET_PORT",
        "ANCHOR_CLIENT_WRITE_TIMEOUT_MS",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_without_file_or_env() {
        clear_env();
        env::set_var("ANCHOR_DB_PATH", "/tmp/anchor-test/tasks.db");
        let config = ServiceConfig::from_file_and_env(ConfigFile::default()).expect("config");
        clear_env();

        assert_eq!(config.db_path, PathBuf::from("/tmp/anchor-test/tasks.db"));
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert_eq!(config.red_alert_burst, Duration::from_secs(30));
        assert_eq!(config.red_alert_repeat, Duration::from_secs(120));
        assert_eq!(config.socket_host, "127.0.0.1");
        assert_eq!(config.socket_port, 8765);
        assert!(config.feed_paths.is_empty());
        assert_eq!(config.ics_paths, default_ics_path().into_iter().collect::<Vec<_>>());
        assert!(config.sound_command.is_none());
        assert_eq!(
            config.socket_addr().expect("addr").to_string(),
            "127.0.0.1:8765"
        );
    }

    #[test]
    #[serial]
    fn toml_file_is_read_and_env_overrides_it() {
        clear_env();
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
db_path = "/var/lib/anchor/tasks.db"
feed_paths = ["/var/lib/anchor/feed.json"]
ics_paths = ["/var/lib/anchor/work.ics"]
check_interval_seconds = 15
red_alert_burst_seconds = 0
sound_command = "paplay"
socket_port = 9000
"#,
        )
        .expect("write config");
        env::set_var("ANCHOR_CONFIG_PATH", &path);
        env::set_var("ANCHOR_SOCKET_PORT", "9100");

        let config = ServiceConfig::from_env().expect("config");
        clear_env();

        assert_eq!(config.db_path, PathBuf::from("/var/lib/anchor/tasks.db"));
        assert_eq!(
            config.feed_paths,
            vec![PathBuf::from("/var/lib/anchor/feed.json")]
        );
        assert_eq!(config.ics_paths, vec![PathBuf::from("/var/lib/anchor/work.ics")]);
        assert_eq!(config.check_interval, Duration::from_secs(15));
        assert_eq!(config.red_alert_burst, Duration::from_secs(1));
        assert_eq!(config.sound_command.as_deref(), Some("paplay"));
        assert_eq!(config.socket_port, 9100);
        assert_eq!(config.engine_settings().alert.burst, Duration::from_secs(1));
    }

    #[test]
    #[serial]
    fn invalid_env_value_is_an_error() {
        clear_env();
        env::set_var("ANCHOR_DB_PATH", "/tmp/anchor-test/tasks.db");
        env::set_var("ANCHOR_SOCKET_PORT", "not-a-port");
        let result = ServiceConfig::from_file_and_env(ConfigFile::default());
        clear_env();
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn unparsable_config_file_is_an_error() {
        clear_env();
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "check_interval_seconds = \"soon\"").expect("write config");
        env::set_var("ANCHOR_CONFIG_PATH", &path);
        let result = ServiceConfig::from_env();
        clear_env();
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn invalid_socket_host_is_rejected() {
        clear_env();
        let mut config = ServiceConfig::from_file_and_env(ConfigFile {
            db_path: Some(PathBuf::from("tasks.db")),
            ..ConfigFile::default()
        })
        .expect("config");
        config.socket_host = "localhost:bad".to_string();
        assert!(config.socket_addr().is_err());
    }

    #[test]
    #[serial]
    fn localhost_socket_host_resolves_to_loopback() {
        clear_env();
        let mut config = ServiceConfig::from_file_and_env(ConfigFile {
            db_path: Some(PathBuf::from("tasks.db")),
            ..ConfigFile::default()
        })
        .expect("config");
        config.socket_host = "localhost".to_string();
        config.socket_port = 8766;

        let addr = config.socket_addr().expect("addr");
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 8766);
    }
}

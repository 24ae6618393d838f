//! Configuration for emuterm.
//!
//! Settings are read from `~/.emuterm/config.toml`. Every field is optional;
//! a missing file gives the defaults, an unreadable one is reported and
//! ignored. Command line flags override file values.
//!
//! # Configuration File
//!
//! ```toml
//! # Render every Nth emulated frame
//! frame_advance = 1
//!
//! # Emulation speed multiplier
//! speed_factor = 1.0
//!
//! # auto, grey, 16, 256 or truecolor
//! color_mode = "auto"
//!
//! # Try to open an audio device
//! audio = true
//!
//! [flow_control]
//! enabled = true
//! ack_timeout_ms = 500
//!
//! [timing]
//! sleep_epsilon_us = 1000
//! resync_after_ms = 1000
//!
//! [logging]
//! level = "info"
//! file = "/tmp/emuterm.log"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use crate::core::scheduler::SchedulerOptions;
use crate::error::{Error, Result};
use crate::ui::color::ColorMode;

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Render at most every Nth tick
    pub frame_advance: u32,
    /// Emulation speed multiplier
    pub speed_factor: f64,
    /// Color mode name, `auto` to detect
    pub color_mode: String,
    /// Try to open an audio device
    pub audio: bool,
    pub flow_control: FlowControlConfig,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_advance: 1,
            speed_factor: 1.0,
            color_mode: "auto".to_string(),
            audio: true,
            flow_control: FlowControlConfig::default(),
            timing: TimingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Acknowledgement based flow control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowControlConfig {
    pub enabled: bool,
    pub ack_timeout_ms: u64,
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ack_timeout_ms: 500,
        }
    }
}

/// Deadline pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub sleep_epsilon_us: u64,
    pub resync_after_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sleep_epsilon_us: 1000,
            resync_after_ms: 1000,
        }
    }
}

/// Log output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A broken file gives the defaults along with the error, for the
    /// caller to report once logging is up.
    pub fn load() -> (Self, Option<Error>) {
        match Self::get_config_path() {
            Some(path) => Self::load_or_default(&path),
            None => (Self::default(), None),
        }
    }

    fn load_or_default(path: &Path) -> (Self, Option<Error>) {
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::load_from(path) {
            Ok(config) => (config, None),
            Err(e) => (
                Self::default(),
                Some(Error::Config(format!("{}: {}", path.display(), e))),
            ),
        }
    }

    /// Load configuration from a file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Directory holding the config and log files
    pub fn config_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".emuterm"))
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Default log file location
    pub fn log_path(&self) -> PathBuf {
        self.logging
            .file
            .clone()
            .or_else(|| Self::config_dir().map(|dir| dir.join("emuterm.log")))
            .unwrap_or_else(|| PathBuf::from("emuterm.log"))
    }

    /// Requested color mode; `None` means detect from the environment
    pub fn color_mode(&self) -> Result<Option<ColorMode>> {
        ColorMode::from_name(&self.color_mode)
            .ok_or_else(|| Error::Config(format!("unknown color mode {:?}", self.color_mode)))
    }

    /// Validated scheduler options for the given color mode
    pub fn scheduler_options(&self, color_mode: ColorMode) -> Result<SchedulerOptions> {
        let options = SchedulerOptions {
            frame_advance: self.frame_advance,
            speed_factor: self.speed_factor,
            break_after: None,
            color_mode,
            cpr_sync: self.flow_control.enabled,
            ack_timeout: Duration::from_millis(self.flow_control.ack_timeout_ms),
            sleep_epsilon: Duration::from_micros(self.timing.sleep_epsilon_us),
            resync_after: Duration::from_millis(self.timing.resync_after_ms),
        };
        options.validate()?;
        Ok(options)
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_file() {
        let config = Config::parse(
            r#"
            speed_factor = 2.0
            color_mode = "256"

            [flow_control]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.speed_factor, 2.0);
        assert_eq!(config.frame_advance, 1);
        assert_eq!(config.color_mode().unwrap(), Some(ColorMode::Color256));
        assert!(!config.flow_control.enabled);
        assert_eq!(config.flow_control.ack_timeout_ms, 500);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "frame_advance = 3\n[timing]\nresync_after_ms = 250").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        let options = config.scheduler_options(ColorMode::TrueColor).unwrap();
        assert_eq!(options.frame_advance, 3);
        assert_eq!(options.resync_after, Duration::from_millis(250));
        assert_eq!(options.sleep_epsilon, Duration::from_millis(1));
        assert!(options.cpr_sync);
    }

    #[test]
    fn test_broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let (config, problem) = Config::load_or_default(&path);
        assert_eq!(config, Config::default());
        assert!(problem.is_none());

        fs::write(&path, "frame_advance = \"often\"").unwrap();
        let (config, problem) = Config::load_or_default(&path);
        assert_eq!(config, Config::default());
        match problem {
            Some(Error::Config(message)) => assert!(message.contains("config.toml")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(Config::parse("audio = 3"), Err(Error::Config(_))));

        let config = Config {
            frame_advance: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.scheduler_options(ColorMode::TrueColor),
            Err(Error::Config(_))
        ));

        let config = Config {
            color_mode: "sepia".into(),
            ..Config::default()
        };
        assert!(config.color_mode().is_err());
        assert_eq!(Config::default().color_mode().unwrap(), None);
    }

    #[test]
    fn test_log_path_override() {
        let config = Config {
            logging: LoggingConfig {
                level: "debug".into(),
                file: Some(PathBuf::from("/tmp/x.log")),
            },
            ..Config::default()
        };
        assert_eq!(config.log_path(), PathBuf::from("/tmp/x.log"));
    }
}

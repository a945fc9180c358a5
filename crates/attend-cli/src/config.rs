use anyhow::{Context, Result};
use attend_core::DEFAULT_SESSION_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration.
///
/// Built from defaults under the data directory, then an optional TOML file,
/// then `ATTEND_*` environment variables, each layer overriding the last.
/// The match threshold is not configurable here; it is fixed in
/// `attend_core::MATCH_DISTANCE_THRESHOLD`.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory of `<name>.<ext>` reference images.
    pub reference_dir: PathBuf,
    /// Directory holding one `Attendance_YYYY-MM-DD.csv` per day.
    pub ledger_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Wall-clock bound on a recognition session.
    pub session_timeout_secs: u64,
}

/// Optional overrides read from `attend.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    reference_dir: Option<PathBuf>,
    ledger_dir: Option<PathBuf>,
    model_dir: Option<PathBuf>,
    session_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_sources(|key| std::env::var(key).ok())
    }

    fn from_sources(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = env("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("attend");

        let mut config = Self {
            reference_dir: data_dir.join("images"),
            ledger_dir: data_dir.join("ledger"),
            model_dir: data_dir.join("models"),
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT.as_secs(),
        };

        // An explicitly named file must exist; the default one is optional.
        let file = match env("ATTEND_CONFIG") {
            Some(path) => Some(read_file_config(Path::new(&path))?),
            None => {
                let default_path = data_dir.join("attend.toml");
                if default_path.exists() {
                    Some(read_file_config(&default_path)?)
                } else {
                    None
                }
            }
        };
        if let Some(file) = file {
            config.apply_file(file);
        }

        if let Some(dir) = env("ATTEND_REFERENCE_DIR") {
            config.reference_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env("ATTEND_LEDGER_DIR") {
            config.ledger_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env("ATTEND_MODEL_DIR") {
            config.model_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env("ATTEND_SESSION_TIMEOUT_SECS") {
            config.session_timeout_secs = secs.parse().with_context(|| {
                format!("ATTEND_SESSION_TIMEOUT_SECS={secs:?} is not a number of seconds")
            })?;
        }

        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(dir) = file.reference_dir {
            self.reference_dir = dir;
        }
        if let Some(dir) = file.ledger_dir {
            self.ledger_dir = dir;
        }
        if let Some(dir) = file.model_dir {
            self.model_dir = dir;
        }
        if let Some(secs) = file.session_timeout_secs {
            self.session_timeout_secs = secs;
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

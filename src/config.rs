//! Directory layout resolved from `~/.tractseg/config.txt` and the environment.
//!
//! The settings file holds `key=value` lines. Three keys are recognised:
//!
//! | key           | meaning                                         |
//! |---------------|-------------------------------------------------|
//! | `working_dir` | local working directory, default `~/TractSeg`   |
//! | `network_dir` | shared drive holding the raw training data      |
//! | `weights_dir` | pretrained weights, default `~/.tractseg`       |
//!
//! `TRACTSEG_WEIGHTS_DIR` overrides `weights_dir` and `TRACTSEG_DATA_DIR`
//! overrides the data path. [`SystemConfig`] is resolved once at startup and
//! passed by reference from then on.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Directory under the user's home holding settings and default weights.
pub const SETTINGS_DIR: &str = ".tractseg";
/// Settings file name inside [`SETTINGS_DIR`].
pub const SETTINGS_FILE: &str = "config.txt";
/// Environment variable overriding the weights directory.
pub const WEIGHTS_DIR_ENV: &str = "TRACTSEG_WEIGHTS_DIR";
/// Environment variable overriding the data path.
pub const DATA_DIR_ENV: &str = "TRACTSEG_DATA_DIR";

/// Parsed `key=value` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Parse settings text.
    ///
    /// Blank lines and `#` comments are skipped. Keys and values are trimmed
    /// and the value runs to the end of the line, so it may contain `=`.
    /// Lines without `=` and entries with an empty key or value are ignored
    /// with a warning. A repeated key keeps its last value.
    pub fn parse(text: &str) -> Self {
        let mut values = BTreeMap::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
                    values.insert(key.trim().to_string(), value.trim().to_string());
                }
                _ => warn!(line = number + 1, content = line, "ignoring malformed settings line"),
            }
        }
        Self { values }
    }

    /// Read a settings file; a missing file yields empty settings.
    pub fn read(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), "read settings file");
                Ok(Self::parse(&text))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(Error::Configuration(format!(
                "cannot read settings file {}: {e}",
                path.display()
            ))),
        }
    }

    /// Value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no entries were found.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolved directory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    /// `~/.tractseg`, home of the settings file.
    pub tractseg_home: PathBuf,
    /// Working directory.
    pub home: PathBuf,
    /// Shared drive with raw datasets, when configured.
    pub network_drive: Option<PathBuf>,
    /// Pretrained weights.
    pub weights_dir: PathBuf,
    /// Root of local datasets, including preprocessed output.
    pub data_path: PathBuf,
    /// Experiment output directory.
    pub exp_path: PathBuf,
}

impl SystemConfig {
    /// Resolve from the user's home directory, the settings file and the process environment.
    pub fn load() -> Result<Self> {
        let user_home = dirs::home_dir()
            .ok_or_else(|| Error::Configuration("cannot determine the home directory".into()))?;
        let settings = Settings::read(&user_home.join(SETTINGS_DIR).join(SETTINGS_FILE))?;
        Ok(Self::from_sources(&user_home, &settings, |key| {
            std::env::var_os(key)
        }))
    }

    /// Resolve from explicit sources. `env` looks up an environment variable;
    /// empty values count as unset.
    pub fn from_sources<F>(user_home: &Path, settings: &Settings, env: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let env_path = |key: &str| env(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        let tractseg_home = user_home.join(SETTINGS_DIR);

        let home = settings
            .get("working_dir")
            .map_or_else(|| user_home.join("TractSeg"), PathBuf::from);
        let network_drive = settings.get("network_dir").map(PathBuf::from);
        let weights_dir = env_path(WEIGHTS_DIR_ENV)
            .or_else(|| settings.get("weights_dir").map(PathBuf::from))
            .unwrap_or_else(|| tractseg_home.clone());
        let data_path = env_path(DATA_DIR_ENV).unwrap_or_else(|| home.clone());
        let exp_path = match &network_drive {
            Some(drive) => drive.join("hcp_exp_nodes"),
            None => home.join("hcp_exp"),
        };

        Self {
            tractseg_home,
            home,
            network_drive,
            weights_dir,
            data_path,
            exp_path,
        }
    }
}

impl fmt::Display for SystemConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "tractseg_home: {}", self.tractseg_home.display())?;
        writeln!(f, "home:          {}", self.home.display())?;
        match &self.network_drive {
            Some(drive) => writeln!(f, "network_drive: {}", drive.display())?,
            None => writeln!(f, "network_drive: (none)")?,
        }
        writeln!(f, "weights_dir:   {}", self.weights_dir.display())?;
        writeln!(f, "data_path:     {}", self.data_path.display())?;
        write!(f, "exp_path:      {}", self.exp_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_parse_skips_comments_and_malformed_lines() {
        let settings = Settings::parse(
            "# paths\n\n working_dir = /data/work \nnot a pair\nnetwork_dir=/mnt/a=b\n=orphan\n",
        );
        assert_eq!(settings.len(), 2);
        assert_eq!(settings.get("working_dir"), Some("/data/work"));
        assert_eq!(settings.get("network_dir"), Some("/mnt/a=b"));
    }

    #[test]
    fn test_defaults_without_settings_or_env() {
        let config = SystemConfig::from_sources(Path::new("/home/u"), &Settings::default(), env_from(&[]));
        assert_eq!(config.tractseg_home, PathBuf::from("/home/u/.tractseg"));
        assert_eq!(config.home, PathBuf::from("/home/u/TractSeg"));
        assert_eq!(config.network_drive, None);
        assert_eq!(config.weights_dir, PathBuf::from("/home/u/.tractseg"));
        assert_eq!(config.data_path, PathBuf::from("/home/u/TractSeg"));
        assert_eq!(config.exp_path, PathBuf::from("/home/u/TractSeg/hcp_exp"));
    }

    #[test]
    fn test_settings_file_values() {
        let settings = Settings::parse("working_dir=/w\nnetwork_dir=/net\nweights_dir=/wt\n");
        let config = SystemConfig::from_sources(Path::new("/home/u"), &settings, env_from(&[]));
        assert_eq!(config.home, PathBuf::from("/w"));
        assert_eq!(config.data_path, PathBuf::from("/w"));
        assert_eq!(config.weights_dir, PathBuf::from("/wt"));
        assert_eq!(config.exp_path, PathBuf::from("/net/hcp_exp_nodes"));
    }

    #[test]
    fn test_environment_beats_settings() {
        let settings = Settings::parse("working_dir=/w\nweights_dir=/wt\n");
        let env = env_from(&[(WEIGHTS_DIR_ENV, "/env/weights"), (DATA_DIR_ENV, "/env/data")]);
        let config = SystemConfig::from_sources(Path::new("/home/u"), &settings, env);
        assert_eq!(config.weights_dir, PathBuf::from("/env/weights"));
        assert_eq!(config.data_path, PathBuf::from("/env/data"));
        assert_eq!(config.home, PathBuf::from("/w"));
    }

    #[test]
    fn test_empty_environment_value_is_unset() {
        let env = env_from(&[(DATA_DIR_ENV, "")]);
        let config = SystemConfig::from_sources(Path::new("/h"), &Settings::default(), env);
        assert_eq!(config.data_path, PathBuf::from("/h/TractSeg"));
    }

    #[test]
    fn test_missing_settings_file_is_empty() {
        let dir = tempdir().unwrap();
        let settings = Settings::read(&dir.path().join("config.txt")).unwrap();
        assert!(settings.is_empty());

        let path = dir.path().join("present.txt");
        std::fs::write(&path, "network_dir=/net\n").unwrap();
        assert_eq!(Settings::read(&path).unwrap().get("network_dir"), Some("/net"));
    }
}

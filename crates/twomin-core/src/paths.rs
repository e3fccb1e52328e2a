//! Standard paths used by twomin

use std::path::PathBuf;

/// Standard twomin paths
pub struct Paths {
    /// Data directory (~/.local/share/twomin)
    pub data: PathBuf,
    /// Config directory (~/.config/twomin)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("twomin");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("twomin");

        Self { data, config }
    }

    /// Paths rooted somewhere other than the user's home (tests, `--data-dir`)
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data: root.join("data"),
            config: root.join("config"),
        }
    }

    /// Persisted key-value state (counters, session log, timer anchor)
    pub fn state_file(&self) -> PathBuf {
        self.data.join("state.json")
    }

    /// User configuration file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }
}

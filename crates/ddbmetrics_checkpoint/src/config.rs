use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How `create` names operations when the caller does not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStyle {
    /// `<type>_<YYYY-MM-DDTHH-MM-SS>`, suffixed `_<n>` on collision
    #[default]
    Timestamp,
    Uuid,
}

/// Checkpoint store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_true")]
    pub enable_compression: bool,

    /// Run the retention sweep on construction and after every save
    #[serde(default = "default_true")]
    pub auto_cleanup: bool,

    #[serde(default = "default_max_age_days")]
    pub max_checkpoint_age_days: u32,

    #[serde(default)]
    pub id_style: IdStyle,
}

fn default_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_true() -> bool {
    true
}

fn default_max_age_days() -> u32 {
    7
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            enable_compression: true,
            auto_cleanup: true,
            max_checkpoint_age_days: default_max_age_days(),
            id_style: IdStyle::default(),
        }
    }
}

impl CheckpointConfig {
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.max_checkpoint_age_days))
    }
}

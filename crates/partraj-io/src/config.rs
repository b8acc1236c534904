use std::fs;
use std::path::{Path, PathBuf};

use partraj_core::error::{TrajError, TrajResult};
use partraj_core::Dtype;
use serde::{Deserialize, Serialize};

use crate::Format;

/// Digits kept when rounding decoded POS numbers.
pub const POS_FLOAT_DIGITS: u32 = 11;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Overrides extension-based format detection.
    #[serde(default)]
    pub format: Option<Format>,
    #[serde(default = "default_precision")]
    pub precision: u32,
    /// Type name for dialects that carry no type information.
    #[serde(default = "default_type")]
    pub default_type: String,
    #[serde(default)]
    pub dtype: Dtype,
    /// File whose first frame supplies types, shapes and per-particle
    /// properties to dialects that store only coordinates (DCD).
    #[serde(default)]
    pub template: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteOptions {
    #[serde(default)]
    pub format: Option<Format>,
    /// Bake the view rotation into box and particles instead of writing it
    /// as a separate line.
    #[serde(default)]
    pub rotate: bool,
}

fn default_precision() -> u32 {
    POS_FLOAT_DIGITS
}

fn default_type() -> String {
    "A".to_string()
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            format: None,
            precision: default_precision(),
            default_type: default_type(),
            dtype: Dtype::default(),
            template: None,
        }
    }
}

impl ReadOptions {
    pub fn from_json_str(content: &str) -> TrajResult<Self> {
        let opts: Self = serde_json::from_str(content)
            .map_err(|e| TrajError::Validation(format!("invalid read options: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn from_path(path: impl AsRef<Path>) -> TrajResult<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> TrajResult<()> {
        if self.precision == 0 || self.precision > 15 {
            return Err(TrajError::Validation(format!(
                "precision must be in 1..=15, got {}",
                self.precision
            )));
        }
        let name = self.default_type.trim();
        if name.is_empty() || name.split_whitespace().count() != 1 {
            return Err(TrajError::Validation(format!(
                "default_type must be a single token, got '{}'",
                self.default_type
            )));
        }
        Ok(())
    }
}

impl WriteOptions {
    pub fn from_json_str(content: &str) -> TrajResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| TrajError::Validation(format!("invalid write options: {e}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> TrajResult<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }
}

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::Result;

pub const HPARAMS_FILE: &str = "hparams.json";

// Decode-time settings stored as hparams.json next to the checkpoint.
// Fields missing from the file keep their defaults, so old parameter
// files stay loadable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Hyperparameters {
    pub attention: bool,
    // "standard", "gnmt" or "gnmt_v2"
    pub attention_architecture: String,
    pub eos: String,
    // Subword marker to strip when assembling replies
    pub subword_delimiter: Option<String>,
    pub num_units: usize,
    pub num_layers: usize,
    // Hard cap on reply length, in tokens
    pub max_reply_len: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            attention: true,
            attention_architecture: "standard".to_string(),
            eos: crate::core::vocab::EOS.to_string(),
            subword_delimiter: None,
            num_units: 512,
            num_layers: 2,
            max_reply_len: 50,
        }
    }
}

impl Hyperparameters {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading hyperparameters {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing hyperparameters {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)
            .with_context(|| format!("writing hyperparameters {}", path.display()))
    }

    // Writes the defaults first when the model directory has none yet.
    pub fn load_or_create(model_dir: &Path) -> Result<Self> {
        let path = model_dir.join(HPARAMS_FILE);
        if path.exists() {
            let hparams = Self::load(&path)?;
            tracing::debug!(path = %path.display(), "loaded hyperparameters");
            return Ok(hparams);
        }
        fs::create_dir_all(model_dir)
            .with_context(|| format!("creating model directory {}", model_dir.display()))?;
        let hparams = Self::default();
        hparams.save(&path)?;
        tracing::info!(path = %path.display(), "wrote default hyperparameters");
        Ok(hparams)
    }
}

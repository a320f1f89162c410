use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use candle_core::Device;
use chrono::{DateTime, Utc};

use crate::core::error::ChatError;
use crate::core::vocab::Vocabulary;
use crate::core::Result;

use super::{Hyperparameters, InferenceModel, ModelArchitecture, Seq2SeqModel};

// The indirection lets the bot defer loading to request time or keep
// one instance resident, and gives tests a place to substitute stubs.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn InferenceModel>>;
}

// Newest *.safetensors checkpoint in a directory. Files named with a
// trailing step number (ckpt-12000.safetensors) are ranked by step;
// otherwise modification time decides.
pub fn latest_checkpoint(dir: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("reading model directory {}", dir.display()))?;
    let mut best: Option<((bool, u64, SystemTime), PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("safetensors") {
            continue;
        }
        let step = path.file_stem().and_then(|s| s.to_str()).and_then(parse_step);
        let modified = entry.metadata()?.modified()?;
        let key = (step.is_some(), step.unwrap_or(0), modified);
        if best.as_ref().map_or(true, |(current, _)| key > *current) {
            best = Some((key, path));
        }
    }
    match best {
        Some(((_, _, modified), path)) => {
            let when: DateTime<Utc> = modified.into();
            tracing::info!(
                checkpoint = %path.display(),
                modified = %when.to_rfc3339(),
                "selected checkpoint"
            );
            Ok(path)
        }
        None => Err(ChatError::CheckpointNotFound(dir.to_path_buf()).into()),
    }
}

fn parse_step(stem: &str) -> Option<u64> {
    stem.rsplit('-').next()?.parse().ok()
}

// Best device available at runtime.
pub fn select_device() -> Result<Device> {
    if candle_core::utils::cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if candle_core::utils::metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        Ok(Device::Cpu)
    }
}

// Construction validates the architecture selection and the presence
// of a checkpoint, so bad deployments fail before serving.
pub struct CheckpointLoader {
    model_dir: PathBuf,
    hparams: Hyperparameters,
    vocab: Arc<Vocabulary>,
    device: Device,
}

impl CheckpointLoader {
    pub fn new(
        model_dir: &Path,
        hparams: Hyperparameters,
        vocab: Arc<Vocabulary>,
        device: Device,
    ) -> Result<Self> {
        ModelArchitecture::select(&hparams)?;
        latest_checkpoint(model_dir)?;
        Ok(Self {
            model_dir: model_dir.to_path_buf(),
            hparams,
            vocab,
            device,
        })
    }
}

impl ModelLoader for CheckpointLoader {
    fn load(&self) -> Result<Box<dyn InferenceModel>> {
        // Re-resolved on every load so a freshly written checkpoint is
        // picked up without a restart under the per-request policy.
        let checkpoint = latest_checkpoint(&self.model_dir)?;
        let tensors = candle_core::safetensors::load(&checkpoint, &self.device)?;
        let model = Seq2SeqModel::build(
            &self.hparams,
            self.vocab.clone(),
            tensors,
            self.device.clone(),
        )?;
        tracing::debug!(architecture = ?model.architecture(), "model loaded");
        Ok(Box::new(model))
    }
}

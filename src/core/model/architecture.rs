use crate::core::error::ChatError;
use crate::core::Result;

use super::Hyperparameters;

// Decode graphs this crate knows how to build. Anything outside this
// set is a configuration error, raised when the model is constructed
// and never during a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelArchitecture {
    // Encoder-decoder without attention
    Plain,
    // Luong-style attention over encoder outputs
    StandardAttention,
    // Additive attention at the bottom decoder layer, fed to the
    // layers above it
    Gnmt,
}

impl ModelArchitecture {
    // Disabled attention wins over whatever the architecture field says.
    pub fn select(hparams: &Hyperparameters) -> Result<Self> {
        if !hparams.attention {
            return Ok(Self::Plain);
        }
        match hparams.attention_architecture.as_str() {
            "standard" => Ok(Self::StandardAttention),
            "gnmt" | "gnmt_v2" => Ok(Self::Gnmt),
            other => Err(ChatError::UnsupportedArchitecture(other.to_string()).into()),
        }
    }
}

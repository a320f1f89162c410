use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::detokenize::detokenize;
use crate::core::error::ChatError;
use crate::core::model::{Hyperparameters, InferenceModel, ModelArchitecture, ModelLoader};
use crate::core::tokenizer::{normalize_digits, Tokenizer};
use crate::core::vocab::{Vocabulary, UNK};
use crate::core::Result;

// Resident loads once at construction and serializes decode calls
// through a mutex. PerRequest reloads from disk on every call, trading
// latency for always serving the newest checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPolicy {
    Resident,
    PerRequest,
}

impl FromStr for ModelPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "resident" => Ok(Self::Resident),
            "per-request" | "per_request" => Ok(Self::PerRequest),
            other => anyhow::bail!("unknown model policy: {other:?}"),
        }
    }
}

enum ModelState {
    Resident(Mutex<Box<dyn InferenceModel>>),
    PerRequest(Arc<dyn ModelLoader>),
}

// Turns a raw chat line into a reply. Holds the tokenizer and
// vocabulary; the model comes from the loader according to the policy.
pub struct ChatBot {
    tokenizer: Box<dyn Tokenizer>,
    vocab: Arc<Vocabulary>,
    hparams: Hyperparameters,
    normalize: bool,
    state: ModelState,
}

impl ChatBot {
    pub fn new(
        tokenizer: Box<dyn Tokenizer>,
        vocab: Arc<Vocabulary>,
        hparams: Hyperparameters,
        loader: Arc<dyn ModelLoader>,
        policy: ModelPolicy,
        normalize: bool,
    ) -> Result<Self> {
        // A bad architecture string must surface here, never mid-request.
        let arch = ModelArchitecture::select(&hparams)?;
        let state = match policy {
            ModelPolicy::Resident => ModelState::Resident(Mutex::new(loader.load()?)),
            ModelPolicy::PerRequest => ModelState::PerRequest(loader),
        };
        tracing::info!(architecture = ?arch, policy = ?policy, "chat bot ready");
        Ok(Self {
            tokenizer,
            vocab,
            hparams,
            normalize,
            state,
        })
    }

    // Inputs that tokenize to nothing short-circuit to an empty reply
    // without touching the model.
    pub fn reply(&self, input: &str) -> Result<String> {
        let mut words = self.tokenizer.tokenize(input);
        if self.normalize {
            words = normalize_digits(&words);
        }
        if words.is_empty() {
            return Ok(String::new());
        }
        let sentence = words.join(" ");

        let batch = match &self.state {
            ModelState::Resident(model) => {
                let model = model.lock();
                model.decode(std::slice::from_ref(&sentence))?
            }
            ModelState::PerRequest(loader) => {
                let model = loader.load()?;
                model.decode(std::slice::from_ref(&sentence))?
            }
        };
        if batch.batch_size() != 1 {
            return Err(ChatError::BatchShape(batch.batch_size()).into());
        }
        let row = batch.row(0).unwrap_or(&[]);

        let tokens: Vec<&str> = row
            .iter()
            .map(|id| self.vocab.token(*id).unwrap_or(UNK))
            .collect();
        Ok(detokenize(
            &tokens,
            &self.hparams.eos,
            self.hparams.subword_delimiter.as_deref(),
        ))
    }
}

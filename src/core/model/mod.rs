pub mod architecture;
pub mod hparams;
pub mod loader;
pub mod seq2seq;

pub use architecture::ModelArchitecture;
pub use hparams::Hyperparameters;
pub use loader::{latest_checkpoint, select_device, CheckpointLoader, ModelLoader};
pub use seq2seq::Seq2SeqModel;

use crate::core::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId(pub u32);

impl TokenId {
    pub const PAD: Self = Self(0);
    pub const GO: Self = Self(1);
    pub const EOS: Self = Self(2);
    pub const UNK: Self = Self(3);
}

// Token id rows produced by one decode call, one row per input
// sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBatch {
    rows: Vec<Vec<TokenId>>,
}

impl DecodedBatch {
    pub fn new(rows: Vec<Vec<TokenId>>) -> Self {
        Self { rows }
    }

    pub fn batch_size(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, index: usize) -> Option<&[TokenId]> {
        self.rows.get(index).map(Vec::as_slice)
    }
}

// Turns tokenized source sentences into reply token ids.
// Implementations must be safe to share across threads.
pub trait InferenceModel: Send + Sync {
    fn decode(&self, sentences: &[String]) -> Result<DecodedBatch>;
}

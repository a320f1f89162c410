pub mod detokenize;
pub mod error;
pub mod model;
pub mod tokenizer;
pub mod vocab;

pub use detokenize::detokenize;
pub use error::ChatError;
pub use model::{
    CheckpointLoader, DecodedBatch, Hyperparameters, InferenceModel, ModelArchitecture,
    ModelLoader, Seq2SeqModel, TokenId,
};
pub use tokenizer::{create_tokenizer, Tokenizer, TokenizerKind};
pub use vocab::Vocabulary;

pub type Result<T> = anyhow::Result<T>;

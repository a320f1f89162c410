pub mod bot;
pub mod cmd;
pub mod core;
pub mod envconfig;
pub mod server;

pub use crate::bot::{ChatBot, ModelPolicy};
pub use crate::core::{
    create_tokenizer, detokenize, ChatError, CheckpointLoader, DecodedBatch, Hyperparameters,
    InferenceModel, ModelArchitecture, ModelLoader, Result, Seq2SeqModel, TokenId, Tokenizer,
    TokenizerKind, Vocabulary,
};
pub use crate::envconfig::ServiceConfig;

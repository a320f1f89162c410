use std::path::PathBuf;

use thiserror::Error;

// Configuration problems abort startup; BatchShape is an internal
// consistency failure and maps to a 5xx at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("unknown model architecture: {0:?}")]
    UnsupportedArchitecture(String),

    #[error("no checkpoint found under {}", .0.display())]
    CheckpointNotFound(PathBuf),

    #[error("morphological tokenizer selected but no segmenter dictionary configured")]
    DictionaryNotConfigured,

    #[error("segmenter dictionary unavailable at {}", .path.display())]
    DictionaryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed vocabulary {}: {reason}", .path.display())]
    MalformedVocabulary { path: PathBuf, reason: String },

    #[error("decoder returned {0} sentences for a single-sentence request")]
    BatchShape(usize),
}

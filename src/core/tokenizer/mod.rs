pub mod basic;
pub mod morphological;
pub mod normalize;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use basic::BasicTokenizer;
pub use morphological::MorphologicalTokenizer;
pub use normalize::{collapse_blanks, fold_digits, normalize_digits};

use crate::core::error::ChatError;
use crate::core::Result;

// Tokens never contain whitespace; empty input produces an empty
// sequence.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    Basic,
    Morphological,
}

impl FromStr for TokenizerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "morphological" => Ok(Self::Morphological),
            other => anyhow::bail!("unknown tokenizer kind: {other:?}"),
        }
    }
}

impl fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Morphological => write!(f, "morphological"),
        }
    }
}

// The morphological kind needs a segmenter dictionary and fails here
// when none is usable.
pub fn create_tokenizer(kind: TokenizerKind, dict: Option<&Path>) -> Result<Box<dyn Tokenizer>> {
    match kind {
        TokenizerKind::Basic => Ok(Box::new(BasicTokenizer::new())),
        TokenizerKind::Morphological => {
            let dict = dict.ok_or(ChatError::DictionaryNotConfigured)?;
            Ok(Box::new(MorphologicalTokenizer::from_dict(dict)?))
        }
    }
}

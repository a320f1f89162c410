use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::core::error::ChatError;
use crate::core::model::TokenId;
use crate::core::tokenizer::{collapse_blanks, fold_digits, Tokenizer};
use crate::core::Result;

pub const PAD: &str = "_PAD";
pub const GO: &str = "_GO";
pub const EOS: &str = "_EOS";
pub const UNK: &str = "_UNK";

// Sentinels every vocabulary starts with, in id order 0..=3.
pub const RESERVED: [&str; 4] = [PAD, GO, EOS, UNK];

// One token per line on disk; the line number is the token id.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    index: HashMap<String, TokenId>,
}

impl Vocabulary {
    // The list must begin with the four reserved sentinels.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self> {
        if let Err(reason) = validate(&tokens) {
            anyhow::bail!("invalid vocabulary: {reason}");
        }
        Ok(Self::index_tokens(tokens))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading vocabulary {}", path.display()))?;
        let tokens: Vec<String> = raw.lines().map(str::to_string).collect();
        if let Err(reason) = validate(&tokens) {
            return Err(ChatError::MalformedVocabulary {
                path: PathBuf::from(path),
                reason,
            }
            .into());
        }
        tracing::debug!(tokens = tokens.len(), path = %path.display(), "loaded vocabulary");
        Ok(Self::index_tokens(tokens))
    }

    fn index_tokens(tokens: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(tokens.len());
        for (pos, token) in tokens.iter().enumerate() {
            // First occurrence wins when a file carries duplicates.
            index
                .entry(token.clone())
                .or_insert(TokenId(pos as u32));
        }
        Self { tokens, index }
    }

    // Falls back to the unknown sentinel for out-of-vocabulary tokens.
    pub fn id(&self, token: &str) -> TokenId {
        self.index.get(token).copied().unwrap_or(TokenId::UNK)
    }

    pub fn token(&self, id: TokenId) -> Option<&str> {
        self.tokens.get(id.0 as usize).map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    pub fn size(&self) -> usize {
        self.tokens.len()
    }

    // Scan a corpus and write a frequency-sorted vocabulary of at most
    // max_size entries, sentinels included. Ties keep encounter order so
    // repeated runs produce byte-identical files. Existing files are
    // left alone unless overwrite is set.
    pub fn create(
        corpus_path: &Path,
        vocab_path: &Path,
        max_size: usize,
        tokenizer: &dyn Tokenizer,
        normalize_digits: bool,
        overwrite: bool,
    ) -> Result<()> {
        if vocab_path.exists() && !overwrite {
            tracing::info!(path = %vocab_path.display(), "vocabulary already exists, skipping");
            return Ok(());
        }
        tracing::info!(
            corpus = %corpus_path.display(),
            path = %vocab_path.display(),
            "building vocabulary"
        );

        let corpus = File::open(corpus_path)
            .with_context(|| format!("opening corpus {}", corpus_path.display()))?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut lines = 0u64;
        for line in BufReader::new(corpus).lines() {
            let line = line?;
            lines += 1;
            if lines % 100_000 == 0 {
                tracing::info!(lines, "processed corpus lines");
            }
            for token in tokenizer.tokenize(&line) {
                let token = collapse_blanks(&token);
                let token = if normalize_digits {
                    fold_digits(&token)
                } else {
                    token
                };
                match counts.get_mut(&token) {
                    Some(count) => *count += 1,
                    None => {
                        counts.insert(token.clone(), 1);
                        order.push(token);
                    }
                }
            }
        }

        // Stable sort: equal counts keep their encounter order.
        order.sort_by_key(|token| Reverse(counts[token]));

        let mut vocab: Vec<&str> = RESERVED.to_vec();
        vocab.extend(order.iter().map(String::as_str));
        vocab.truncate(max_size);

        if let Some(parent) = vocab_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut out = BufWriter::new(
            File::create(vocab_path)
                .with_context(|| format!("writing vocabulary {}", vocab_path.display()))?,
        );
        for token in &vocab {
            writeln!(out, "{token}")?;
        }
        out.flush()?;
        tracing::info!(tokens = vocab.len(), "vocabulary written");
        Ok(())
    }
}

fn validate(tokens: &[String]) -> std::result::Result<(), String> {
    if tokens.len() < RESERVED.len() {
        return Err(format!(
            "{} tokens, need at least the {} reserved sentinels",
            tokens.len(),
            RESERVED.len()
        ));
    }
    for (pos, expected) in RESERVED.iter().enumerate() {
        if tokens[pos] != *expected {
            return Err(format!(
                "token {pos} is {:?}, expected the sentinel {expected:?}",
                tokens[pos]
            ));
        }
    }
    if let Some(pos) = tokens.iter().position(|t| t.is_empty()) {
        return Err(format!("empty token at line {}", pos + 1));
    }
    Ok(())
}

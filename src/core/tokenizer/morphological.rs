use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::ChatError;
use crate::core::Result;

use super::Tokenizer;

// Greedy longest-match segmenter for languages written without word
// boundaries. The lexicon is a plain text file with one surface form
// per line; uncovered characters come back as single-char tokens.
pub struct MorphologicalTokenizer {
    lexicon: HashSet<String>,
    max_chars: usize,
}

impl MorphologicalTokenizer {
    // An unreadable lexicon fails here so a misconfigured deployment
    // dies at startup rather than at the first request.
    pub fn from_dict(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ChatError::DictionaryUnavailable {
            path: PathBuf::from(path),
            source,
        })?;

        let mut lexicon = HashSet::new();
        let mut max_chars = 0;
        for line in raw.lines() {
            let entry = line.trim();
            if entry.is_empty() || entry.chars().any(char::is_whitespace) {
                continue;
            }
            max_chars = max_chars.max(entry.chars().count());
            lexicon.insert(entry.to_string());
        }
        if lexicon.is_empty() {
            tracing::warn!(dict = %path.display(), "segmenter dictionary has no usable entries");
        }
        tracing::debug!(entries = lexicon.len(), "loaded segmenter dictionary");

        Ok(Self { lexicon, max_chars })
    }

    fn longest_match(&self, chars: &[char]) -> Option<usize> {
        let upper = self.max_chars.min(chars.len());
        for len in (1..=upper).rev() {
            let candidate: String = chars[..len].iter().collect();
            if self.lexicon.contains(&candidate) {
                return Some(len);
            }
        }
        None
    }
}

impl Tokenizer for MorphologicalTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut tokens = Vec::new();
        let mut pos = 0;
        while pos < chars.len() {
            if chars[pos].is_whitespace() {
                pos += 1;
                continue;
            }
            match self.longest_match(&chars[pos..]) {
                Some(len) => {
                    tokens.push(chars[pos..pos + len].iter().collect());
                    pos += len;
                }
                None => {
                    tokens.push(chars[pos].to_string());
                    pos += 1;
                }
            }
        }
        tokens
    }
}

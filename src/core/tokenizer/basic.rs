use once_cell::sync::Lazy;
use regex::Regex;

use super::Tokenizer;

static WORD_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[.,!?"':;)(]"#).unwrap());

// Whitespace split with common punctuation broken out into tokens of
// their own. Suited to space-delimited languages.
#[derive(Debug, Default)]
pub struct BasicTokenizer;

impl BasicTokenizer {
    pub fn new() -> Self {
        Self
    }
}

impl Tokenizer for BasicTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut words = Vec::new();
        for fragment in text.split_whitespace() {
            let mut last = 0;
            for m in WORD_SPLIT.find_iter(fragment) {
                if m.start() > last {
                    words.push(fragment[last..m.start()].to_string());
                }
                words.push(m.as_str().to_string());
                last = m.end();
            }
            if last < fragment.len() {
                words.push(fragment[last..].to_string());
            }
        }
        words
    }
}

use once_cell::sync::Lazy;
use regex::Regex;

static DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]").unwrap());
static BLANK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s　]+").unwrap());

// Fold every ASCII digit to 0. Non-ASCII numerals pass through.
pub fn fold_digits(token: &str) -> String {
    DIGIT_RE.replace_all(token, "0").into_owned()
}

pub fn normalize_digits(tokens: &[String]) -> Vec<String> {
    tokens.iter().map(|t| fold_digits(t)).collect()
}

// Collapse runs of whitespace and full-width space inside a token to a
// single underscore. Used when building vocabularies from raw corpora.
pub fn collapse_blanks(token: &str) -> String {
    BLANK_RE.replace_all(token, "_").into_owned()
}

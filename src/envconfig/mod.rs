use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::bot::ModelPolicy;
use crate::core::tokenizer::TokenizerKind;
use crate::core::Result;

pub const DEFAULT_HOST: &str = "0.0.0.0:8888";
pub const DEFAULT_MODEL_DIR: &str = "~/.seq2chat/model";
pub const DEFAULT_DECODE_TIMEOUT_SECS: u64 = 30;

// Read from SEQ2CHAT_* environment variables. Values that merely tune
// behavior fall back to defaults; values that select components fail
// loudly so a typo cannot silently serve the wrong pipeline.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub model_dir: PathBuf,
    pub vocab_path: PathBuf,
    pub tokenizer: TokenizerKind,
    pub dict_path: Option<PathBuf>,
    pub normalize_digits: bool,
    pub policy: ModelPolicy,
    pub decode_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let model_dir = expand_home(DEFAULT_MODEL_DIR);
        Self {
            host: DEFAULT_HOST.to_string(),
            vocab_path: model_dir.join("vocab.txt"),
            model_dir,
            tokenizer: TokenizerKind::Basic,
            dict_path: None,
            normalize_digits: false,
            policy: ModelPolicy::Resident,
            decode_timeout: Duration::from_secs(DEFAULT_DECODE_TIMEOUT_SECS),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let model_dir = env::var("SEQ2CHAT_MODEL_DIR")
            .map(|raw| expand_home(&raw))
            .unwrap_or_else(|_| expand_home(DEFAULT_MODEL_DIR));

        let vocab_path = env::var("SEQ2CHAT_VOCAB")
            .map(|raw| expand_home(&raw))
            .unwrap_or_else(|_| model_dir.join("vocab.txt"));

        let tokenizer = match env::var("SEQ2CHAT_TOKENIZER") {
            Ok(raw) => raw
                .parse::<TokenizerKind>()
                .map_err(|e| e.context("SEQ2CHAT_TOKENIZER"))?,
            Err(_) => TokenizerKind::Basic,
        };

        let policy = match env::var("SEQ2CHAT_MODEL_POLICY") {
            Ok(raw) => raw
                .parse::<ModelPolicy>()
                .map_err(|e| e.context("SEQ2CHAT_MODEL_POLICY"))?,
            Err(_) => ModelPolicy::Resident,
        };

        Ok(Self {
            host: env::var("SEQ2CHAT_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            model_dir,
            vocab_path,
            tokenizer,
            dict_path: env::var("SEQ2CHAT_DICT").ok().map(|raw| expand_home(&raw)),
            normalize_digits: env::var("SEQ2CHAT_NORMALIZE_DIGITS")
                .map(|raw| parse_bool(&raw))
                .unwrap_or(false),
            policy,
            decode_timeout: Duration::from_secs(
                env::var("SEQ2CHAT_DECODE_TIMEOUT")
                    .unwrap_or_else(|_| DEFAULT_DECODE_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(DEFAULT_DECODE_TIMEOUT_SECS),
            ),
        })
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return PathBuf::from(path.replacen('~', &home.to_string_lossy(), 1));
        }
    }
    PathBuf::from(path)
}

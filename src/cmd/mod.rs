use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::bot::ChatBot;
use crate::core::model::{select_device, CheckpointLoader, Hyperparameters};
use crate::core::tokenizer::{create_tokenizer, TokenizerKind};
use crate::core::vocab::Vocabulary;
use crate::core::Result;
use crate::envconfig::ServiceConfig;
use crate::server;

// Fails before binding if the model, vocabulary or tokenizer cannot be
// set up.
pub async fn serve() -> Result<()> {
    let config = ServiceConfig::from_env()?;
    let bot = Arc::new(build_bot(&config)?);
    server::serve(&config, bot).await
}

// One-shot decode for the command line.
pub async fn talk(text: &str) -> Result<()> {
    let config = ServiceConfig::from_env()?;
    let bot = build_bot(&config)?;
    let reply = bot.reply(text)?;
    println!("{reply}");
    Ok(())
}

fn build_bot(config: &ServiceConfig) -> Result<ChatBot> {
    let hparams = Hyperparameters::load_or_create(&config.model_dir)?;
    let vocab = Arc::new(Vocabulary::load(&config.vocab_path)?);
    let tokenizer = create_tokenizer(config.tokenizer, config.dict_path.as_deref())?;
    let device = select_device()?;
    let loader = Arc::new(CheckpointLoader::new(
        &config.model_dir,
        hparams.clone(),
        vocab.clone(),
        device,
    )?);
    ChatBot::new(
        tokenizer,
        vocab,
        hparams,
        loader,
        config.policy,
        config.normalize_digits,
    )
}

pub async fn build_vocab(
    corpus: &Path,
    output: &Path,
    max_size: usize,
    tokenizer: &str,
    dict: Option<&Path>,
    normalize_digits: bool,
    overwrite: bool,
) -> Result<()> {
    let kind: TokenizerKind = tokenizer.parse()?;
    let tokenizer = create_tokenizer(kind, dict)?;
    Vocabulary::create(
        corpus,
        output,
        max_size,
        tokenizer.as_ref(),
        normalize_digits,
        overwrite,
    )
}

// Draw a random sample of aligned lines from a parallel corpus, for
// dev and test splits. Both output files carry the same line indices.
pub async fn sample_data(src: &Path, tgt: &Path, size: usize, prefix: &str) -> Result<()> {
    let src_lines = count_lines(src)?;
    let tgt_lines = count_lines(tgt)?;
    if src_lines != tgt_lines {
        anyhow::bail!(
            "parallel files differ in length: {} has {src_lines} lines, {} has {tgt_lines}",
            src.display(),
            tgt.display()
        );
    }
    let amount = size.min(src_lines);
    let mut rng = rand::thread_rng();
    let picked: HashSet<usize> = rand::seq::index::sample(&mut rng, src_lines, amount)
        .into_iter()
        .collect();
    write_sample(src, prefix, &picked)?;
    write_sample(tgt, prefix, &picked)?;
    tracing::info!(sampled = amount, from = src_lines, "wrote parallel sample");
    Ok(())
}

fn count_lines(path: &Path) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut count = 0;
    for line in BufReader::new(file).lines() {
        line?;
        count += 1;
    }
    Ok(count)
}

fn write_sample(path: &Path, prefix: &str, picked: &HashSet<usize>) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .with_context(|| format!("{} has no extension to carry over", path.display()))?;
    // Samples land next to their source file, not in the working
    // directory.
    let file_name = format!("{prefix}.{ext}");
    let out_path = match path.parent() {
        Some(parent) => parent.join(&file_name),
        None => PathBuf::from(file_name),
    };
    let reader = BufReader::new(File::open(path)?);
    let mut out = BufWriter::new(
        File::create(&out_path)
            .with_context(|| format!("writing sample {}", out_path.display()))?,
    );
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if picked.contains(&index) {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;
    Ok(())
}

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::{Device, Tensor};

use seq2chat::{
    create_tokenizer, ChatBot, CheckpointLoader, Hyperparameters, ModelPolicy, TokenizerKind,
    Vocabulary,
};

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("seq2chat-e2e-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn tiny_hparams() -> Hyperparameters {
    Hyperparameters {
        attention: false,
        num_units: 1,
        num_layers: 1,
        max_reply_len: 10,
        ..Hyperparameters::default()
    }
}

// One-unit network with hand-picked weights. The update gate is biased
// shut and the state weights are zero, so the hidden state is just
// tanh(5 * embedding) of the current input token. The _GO embedding
// drives it positive, which the projection maps to "fine"; the "fine"
// embedding drives it negative, which maps to _EOS.
fn crafted_checkpoint(go_embedding: f32) -> HashMap<String, Tensor> {
    let dev = &Device::Cpu;
    let zeros31 = || Tensor::zeros((3, 1), candle_core::DType::F32, dev).unwrap();
    let zeros3 = || Tensor::zeros(3, candle_core::DType::F32, dev).unwrap();

    let mut tensors = HashMap::new();
    tensors.insert(
        "embedding.weight".to_string(),
        Tensor::from_vec(vec![0.0f32, go_embedding, 0.0, 0.0, 0.0, -1.0], (6, 1), dev).unwrap(),
    );
    tensors.insert("encoder.l0.w_ih".to_string(), zeros31());
    tensors.insert("encoder.l0.w_hh".to_string(), zeros31());
    tensors.insert("encoder.l0.b_ih".to_string(), zeros3());
    tensors.insert("encoder.l0.b_hh".to_string(), zeros3());
    tensors.insert(
        "decoder.l0.w_ih".to_string(),
        Tensor::from_vec(vec![0.0f32, 0.0, 5.0], (3, 1), dev).unwrap(),
    );
    tensors.insert("decoder.l0.w_hh".to_string(), zeros31());
    tensors.insert(
        "decoder.l0.b_ih".to_string(),
        Tensor::from_vec(vec![0.0f32, -100.0, 0.0], 3, dev).unwrap(),
    );
    tensors.insert("decoder.l0.b_hh".to_string(), zeros3());
    tensors.insert(
        "projection.weight".to_string(),
        Tensor::from_vec(vec![0.0f32, 0.0, -1.0, 0.0, 0.0, 1.0], (6, 1), dev).unwrap(),
    );
    tensors
}

fn write_checkpoint(path: &Path, go_embedding: f32) {
    candle_core::safetensors::save(&crafted_checkpoint(go_embedding), path).unwrap();
}

fn build_bot(dir: &Path, policy: ModelPolicy) -> ChatBot {
    let hparams = Hyperparameters::load_or_create(dir).unwrap();
    let vocab = Arc::new(Vocabulary::load(&dir.join("vocab.txt")).unwrap());
    let tokenizer = create_tokenizer(TokenizerKind::Basic, None).unwrap();
    let loader = Arc::new(
        CheckpointLoader::new(dir, hparams.clone(), vocab.clone(), Device::Cpu).unwrap(),
    );
    ChatBot::new(tokenizer, vocab, hparams, loader, policy, false).unwrap()
}

fn set_up_model_dir() -> PathBuf {
    let dir = temp_dir();
    tiny_hparams().save(&dir.join("hparams.json")).unwrap();

    // Corpus frequencies put "hi" at id 4 and "fine" at id 5.
    let corpus = dir.join("corpus.txt");
    fs::write(&corpus, "hi fine\nhi\n").unwrap();
    let tokenizer = create_tokenizer(TokenizerKind::Basic, None).unwrap();
    Vocabulary::create(&corpus, &dir.join("vocab.txt"), 100, tokenizer.as_ref(), false, true)
        .unwrap();

    write_checkpoint(&dir.join("ckpt-1.safetensors"), 1.0);
    dir
}

#[test]
fn test_a_trained_checkpoint_replies_through_the_whole_pipeline() {
    let dir = set_up_model_dir();
    let bot = build_bot(&dir, ModelPolicy::Resident);
    assert_eq!(bot.reply("hi").unwrap(), "fine");
    // Unknown words fall back to _UNK on the source side and still decode.
    assert_eq!(bot.reply("completely unseen words").unwrap(), "fine");
    assert_eq!(bot.reply("").unwrap(), "");
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_per_request_policy_picks_up_a_newer_checkpoint() {
    let dir = set_up_model_dir();
    let fresh = build_bot(&dir, ModelPolicy::PerRequest);
    let resident = build_bot(&dir, ModelPolicy::Resident);
    assert_eq!(fresh.reply("hi").unwrap(), "fine");

    // A negated _GO embedding makes the first decode step emit _EOS, so
    // the reply from the new checkpoint is empty.
    write_checkpoint(&dir.join("ckpt-2.safetensors"), -1.0);
    assert_eq!(fresh.reply("hi").unwrap(), "");
    // The resident model keeps serving what it loaded at startup.
    assert_eq!(resident.reply("hi").unwrap(), "fine");
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_hparams_written_at_first_run_are_reused() {
    let dir = temp_dir();
    let first = Hyperparameters::load_or_create(&dir).unwrap();
    assert_eq!(first, Hyperparameters::default());
    let again = Hyperparameters::load_or_create(&dir).unwrap();
    assert_eq!(again, first);
    fs::remove_dir_all(dir).unwrap();
}

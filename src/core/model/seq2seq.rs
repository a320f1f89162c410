use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::ops::{sigmoid, softmax};
use candle_nn::{Embedding, Linear, Module};

use crate::core::vocab::Vocabulary;
use crate::core::Result;

use super::{DecodedBatch, Hyperparameters, InferenceModel, ModelArchitecture, TokenId};

// Greedy-decoding GRU encoder-decoder. The graph variant is fixed when
// the model is built; requests only ever run the selected variant.
pub struct Seq2SeqModel {
    arch: ModelArchitecture,
    vocab: Arc<Vocabulary>,
    embedding: Embedding,
    encoder: Vec<GruCell>,
    decoder: Vec<GruCell>,
    attention: AttentionKind,
    projection: Linear,
    num_units: usize,
    max_reply_len: usize,
    device: Device,
}

enum AttentionKind {
    None,
    Luong(LuongAttention),
    Bahdanau(BahdanauAttention),
}

struct GruCell {
    w_ih: Tensor,
    w_hh: Tensor,
    b_ih: Tensor,
    b_hh: Tensor,
    units: usize,
}

impl GruCell {
    fn take(
        tensors: &mut HashMap<String, Tensor>,
        prefix: &str,
        input: usize,
        units: usize,
    ) -> Result<Self> {
        Ok(Self {
            w_ih: take_tensor(tensors, &format!("{prefix}.w_ih"), &[3 * units, input])?,
            w_hh: take_tensor(tensors, &format!("{prefix}.w_hh"), &[3 * units, units])?,
            b_ih: take_tensor(tensors, &format!("{prefix}.b_ih"), &[3 * units])?,
            b_hh: take_tensor(tensors, &format!("{prefix}.b_hh"), &[3 * units])?,
            units,
        })
    }

    // Gates follow the reset/update/candidate layout, stacked along the
    // first axis of w_ih and w_hh.
    fn step(&self, x: &Tensor, h: &Tensor) -> Result<Tensor> {
        let gx = x.matmul(&self.w_ih.t()?)?.broadcast_add(&self.b_ih)?;
        let gh = h.matmul(&self.w_hh.t()?)?.broadcast_add(&self.b_hh)?;
        let u = self.units;
        let (xr, xz, xn) = (gx.narrow(1, 0, u)?, gx.narrow(1, u, u)?, gx.narrow(1, 2 * u, u)?);
        let (hr, hz, hn) = (gh.narrow(1, 0, u)?, gh.narrow(1, u, u)?, gh.narrow(1, 2 * u, u)?);
        let r = sigmoid(&(&xr + &hr)?)?;
        let z = sigmoid(&(&xz + &hz)?)?;
        let n = (&xn + &(&r * &hn)?)?.tanh()?;
        let keep = z.affine(-1.0, 1.0)?;
        let h_new = ((&keep * &n)? + (&z * h)?)?;
        Ok(h_new)
    }
}

struct LuongAttention {
    combine: Linear,
}

impl LuongAttention {
    // Dot-product attention over encoder outputs, combined with the
    // query state through a tanh projection.
    fn attend(&self, query: &Tensor, enc_outs: &Tensor) -> Result<Tensor> {
        let scores = query.unsqueeze(1)?.matmul(&enc_outs.transpose(1, 2)?)?;
        let weights = softmax(&scores, D::Minus1)?;
        let context = weights.matmul(enc_outs)?.squeeze(1)?;
        let combined = Tensor::cat(&[&context, query], 1)?;
        Ok(self.combine.forward(&combined)?.tanh()?)
    }
}

struct BahdanauAttention {
    memory_proj: Linear,
    query_proj: Linear,
    score: Linear,
}

impl BahdanauAttention {
    fn project_memory(&self, enc_outs: &Tensor) -> Result<Tensor> {
        Ok(self.memory_proj.forward(enc_outs)?)
    }

    // Scores come from the projected memory plus the projected query;
    // the context is the weighted sum of encoder outputs.
    fn attend(&self, query: &Tensor, memory: &Tensor, enc_outs: &Tensor) -> Result<Tensor> {
        let query = self.query_proj.forward(query)?.unsqueeze(1)?;
        let act = memory.broadcast_add(&query)?.tanh()?;
        let scores = self.score.forward(&act)?.squeeze(2)?;
        let weights = softmax(&scores, D::Minus1)?.unsqueeze(1)?;
        Ok(weights.matmul(enc_outs)?.squeeze(1)?)
    }
}

impl Seq2SeqModel {
    // Tensor names and shapes are fixed by the architecture; anything
    // missing, extra or mis-shaped is an error here, before the model
    // serves.
    pub fn build(
        hparams: &Hyperparameters,
        vocab: Arc<Vocabulary>,
        mut tensors: HashMap<String, Tensor>,
        device: Device,
    ) -> Result<Self> {
        let arch = ModelArchitecture::select(hparams)?;
        let units = hparams.num_units;
        let layers = hparams.num_layers;
        let vocab_size = vocab.size();
        if units == 0 || layers == 0 {
            anyhow::bail!("num_units and num_layers must be at least 1");
        }

        let embedding = Embedding::new(
            take_tensor(&mut tensors, "embedding.weight", &[vocab_size, units])?,
            units,
        );

        let mut encoder = Vec::with_capacity(layers);
        for l in 0..layers {
            encoder.push(GruCell::take(&mut tensors, &format!("encoder.l{l}"), units, units)?);
        }

        // GNMT decoder cells see [embedding-or-lower-layer; context].
        let dec_input = match arch {
            ModelArchitecture::Gnmt => 2 * units,
            _ => units,
        };
        let mut decoder = Vec::with_capacity(layers);
        for l in 0..layers {
            decoder.push(GruCell::take(
                &mut tensors,
                &format!("decoder.l{l}"),
                dec_input,
                units,
            )?);
        }

        let attention = match arch {
            ModelArchitecture::Plain => AttentionKind::None,
            ModelArchitecture::StandardAttention => AttentionKind::Luong(LuongAttention {
                combine: Linear::new(
                    take_tensor(&mut tensors, "attention.combine.weight", &[units, 2 * units])?,
                    None,
                ),
            }),
            ModelArchitecture::Gnmt => AttentionKind::Bahdanau(BahdanauAttention {
                memory_proj: Linear::new(
                    take_tensor(&mut tensors, "attention.memory.weight", &[units, units])?,
                    None,
                ),
                query_proj: Linear::new(
                    take_tensor(&mut tensors, "attention.query.weight", &[units, units])?,
                    None,
                ),
                score: Linear::new(
                    take_tensor(&mut tensors, "attention.score.weight", &[1, units])?,
                    None,
                ),
            }),
        };

        let projection = Linear::new(
            take_tensor(&mut tensors, "projection.weight", &[vocab_size, units])?,
            None,
        );

        if !tensors.is_empty() {
            let mut extra: Vec<String> = tensors.into_keys().collect();
            extra.sort();
            anyhow::bail!("checkpoint has unexpected tensors: {}", extra.join(", "));
        }

        Ok(Self {
            arch,
            vocab,
            embedding,
            encoder,
            decoder,
            attention,
            projection,
            num_units: units,
            max_reply_len: hparams.max_reply_len,
            device,
        })
    }

    pub fn architecture(&self) -> ModelArchitecture {
        self.arch
    }

    fn embed_token(&self, id: u32) -> Result<Tensor> {
        let input = Tensor::new(&[id], &self.device)?;
        Ok(self.embedding.forward(&input)?)
    }

    fn zero_state(&self) -> Result<Vec<Tensor>> {
        let zero = Tensor::zeros((1, self.num_units), DType::F32, &self.device)?;
        Ok(vec![zero; self.encoder.len()])
    }

    // Returns the per-step top-layer outputs as (1, T, units) plus the
    // final state of every layer, which seeds the decoder.
    fn encode(&self, ids: &[u32]) -> Result<(Tensor, Vec<Tensor>)> {
        let src = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let embedded = self.embedding.forward(&src)?;
        let mut states = self.zero_state()?;
        let mut outputs = Vec::with_capacity(ids.len());
        for t in 0..ids.len() {
            let x = embedded.narrow(1, t, 1)?.squeeze(1)?;
            outputs.push(step_stack(&self.encoder, x, &mut states)?);
        }
        let enc_outs = Tensor::stack(&outputs, 1)?;
        Ok((enc_outs, states))
    }

    fn decode_one(&self, sentence: &str) -> Result<Vec<TokenId>> {
        let ids: Vec<u32> = sentence
            .split_whitespace()
            .map(|token| self.vocab.id(token).0)
            .collect();
        if ids.is_empty() {
            anyhow::bail!("cannot decode an empty source sentence");
        }
        let (enc_outs, states) = self.encode(&ids)?;
        match &self.attention {
            AttentionKind::None => self.greedy_plain(states),
            AttentionKind::Luong(att) => self.greedy_luong(att, &enc_outs, states),
            AttentionKind::Bahdanau(att) => self.greedy_gnmt(att, &enc_outs, states),
        }
    }

    fn greedy_plain(&self, mut states: Vec<Tensor>) -> Result<Vec<TokenId>> {
        let mut reply = Vec::new();
        let mut current = TokenId::GO.0;
        for _ in 0..self.max_reply_len {
            let emb = self.embed_token(current)?;
            let top = step_stack(&self.decoder, emb, &mut states)?;
            let logits = self.projection.forward(&top)?;
            let next = argmax_id(&logits)?;
            reply.push(TokenId(next));
            if next == TokenId::EOS.0 {
                break;
            }
            current = next;
        }
        Ok(reply)
    }

    fn greedy_luong(
        &self,
        att: &LuongAttention,
        enc_outs: &Tensor,
        mut states: Vec<Tensor>,
    ) -> Result<Vec<TokenId>> {
        let mut reply = Vec::new();
        let mut current = TokenId::GO.0;
        for _ in 0..self.max_reply_len {
            let emb = self.embed_token(current)?;
            let top = step_stack(&self.decoder, emb, &mut states)?;
            let attn = att.attend(&top, enc_outs)?;
            let logits = self.projection.forward(&attn)?;
            let next = argmax_id(&logits)?;
            reply.push(TokenId(next));
            if next == TokenId::EOS.0 {
                break;
            }
            current = next;
        }
        Ok(reply)
    }

    fn greedy_gnmt(
        &self,
        att: &BahdanauAttention,
        enc_outs: &Tensor,
        mut states: Vec<Tensor>,
    ) -> Result<Vec<TokenId>> {
        let memory = att.project_memory(enc_outs)?;
        let mut context = Tensor::zeros((1, self.num_units), DType::F32, &self.device)?;
        let mut reply = Vec::new();
        let mut current = TokenId::GO.0;
        for _ in 0..self.max_reply_len {
            let emb = self.embed_token(current)?;
            let bottom_in = Tensor::cat(&[&emb, &context], 1)?;
            let bottom = self.decoder[0].step(&bottom_in, &states[0])?;
            states[0] = bottom.clone();
            context = att.attend(&bottom, &memory, enc_outs)?;

            let mut below = bottom;
            for (l, cell) in self.decoder.iter().enumerate().skip(1) {
                let x = Tensor::cat(&[&below, &context], 1)?;
                let mut h = cell.step(&x, &states[l])?;
                // Residual connections start above the second layer.
                if l >= 2 {
                    h = (&h + &below)?;
                }
                states[l] = h.clone();
                below = h;
            }

            let logits = self.projection.forward(&below)?;
            let next = argmax_id(&logits)?;
            reply.push(TokenId(next));
            if next == TokenId::EOS.0 {
                break;
            }
            current = next;
        }
        Ok(reply)
    }
}

impl InferenceModel for Seq2SeqModel {
    fn decode(&self, sentences: &[String]) -> Result<DecodedBatch> {
        let mut rows = Vec::with_capacity(sentences.len());
        for sentence in sentences {
            rows.push(self.decode_one(sentence)?);
        }
        Ok(DecodedBatch::new(rows))
    }
}

fn step_stack(cells: &[GruCell], input: Tensor, states: &mut [Tensor]) -> Result<Tensor> {
    let mut x = input;
    for (l, cell) in cells.iter().enumerate() {
        let h = cell.step(&x, &states[l])?;
        states[l] = h.clone();
        x = h;
    }
    Ok(x)
}

fn argmax_id(logits: &Tensor) -> Result<u32> {
    let ids = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
    ids.first().copied().context("argmax over an empty batch")
}

fn take_tensor(
    tensors: &mut HashMap<String, Tensor>,
    name: &str,
    dims: &[usize],
) -> Result<Tensor> {
    let tensor = tensors
        .remove(name)
        .with_context(|| format!("checkpoint is missing tensor {name}"))?;
    if tensor.dims() != dims {
        anyhow::bail!(
            "tensor {name} has shape {:?}, expected {dims:?}",
            tensor.dims()
        );
    }
    Ok(tensor.to_dtype(DType::F32)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vocab() -> Arc<Vocabulary> {
        Arc::new(
            Vocabulary::from_tokens(
                ["_PAD", "_GO", "_EOS", "_UNK", "hello", "world"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            )
            .unwrap(),
        )
    }

    fn sample_hparams(attention: bool, architecture: &str) -> Hyperparameters {
        Hyperparameters {
            attention,
            attention_architecture: architecture.to_string(),
            num_units: 4,
            num_layers: 2,
            max_reply_len: 5,
            ..Hyperparameters::default()
        }
    }

    fn zeros(dims: &[usize]) -> Tensor {
        Tensor::zeros(dims, DType::F32, &Device::Cpu).unwrap()
    }

    fn gru_tensors(tensors: &mut HashMap<String, Tensor>, prefix: &str, input: usize, units: usize) {
        tensors.insert(format!("{prefix}.w_ih"), zeros(&[3 * units, input]));
        tensors.insert(format!("{prefix}.w_hh"), zeros(&[3 * units, units]));
        tensors.insert(format!("{prefix}.b_ih"), zeros(&[3 * units]));
        tensors.insert(format!("{prefix}.b_hh"), zeros(&[3 * units]));
    }

    fn zero_checkpoint(hparams: &Hyperparameters, vocab_size: usize) -> HashMap<String, Tensor> {
        let units = hparams.num_units;
        let mut tensors = HashMap::new();
        tensors.insert("embedding.weight".to_string(), zeros(&[vocab_size, units]));
        tensors.insert("projection.weight".to_string(), zeros(&[vocab_size, units]));
        let arch = ModelArchitecture::select(hparams).unwrap();
        let dec_input = if arch == ModelArchitecture::Gnmt { 2 * units } else { units };
        for l in 0..hparams.num_layers {
            gru_tensors(&mut tensors, &format!("encoder.l{l}"), units, units);
            gru_tensors(&mut tensors, &format!("decoder.l{l}"), dec_input, units);
        }
        match arch {
            ModelArchitecture::Plain => {}
            ModelArchitecture::StandardAttention => {
                tensors.insert("attention.combine.weight".to_string(), zeros(&[units, 2 * units]));
            }
            ModelArchitecture::Gnmt => {
                tensors.insert("attention.memory.weight".to_string(), zeros(&[units, units]));
                tensors.insert("attention.query.weight".to_string(), zeros(&[units, units]));
                tensors.insert("attention.score.weight".to_string(), zeros(&[1, units]));
            }
        }
        tensors
    }

    fn build_zero_model(attention: bool, architecture: &str) -> Seq2SeqModel {
        let hparams = sample_hparams(attention, architecture);
        let vocab = sample_vocab();
        let tensors = zero_checkpoint(&hparams, vocab.size());
        Seq2SeqModel::build(&hparams, vocab, tensors, Device::Cpu).unwrap()
    }

    #[test]
    fn test_zero_weights_decode_to_pad_for_every_variant() {
        for (attention, architecture) in
            [(false, "standard"), (true, "standard"), (true, "gnmt"), (true, "gnmt_v2")]
        {
            let model = build_zero_model(attention, architecture);
            let batch = model.decode(&["hello world".to_string()]).unwrap();
            assert_eq!(batch.batch_size(), 1);
            // All-zero logits tie; argmax resolves to id 0, never EOS.
            assert_eq!(batch.row(0).unwrap(), vec![TokenId::PAD; 5]);
        }
    }

    #[test]
    fn test_decode_keeps_row_order() {
        let model = build_zero_model(false, "standard");
        let batch = model
            .decode(&["hello".to_string(), "world".to_string()])
            .unwrap();
        assert_eq!(batch.batch_size(), 2);
    }

    #[test]
    fn test_crafted_bias_makes_the_decoder_emit_eos() {
        let hparams = Hyperparameters {
            num_layers: 1,
            ..sample_hparams(false, "standard")
        };
        let vocab = sample_vocab();
        let units = hparams.num_units;
        let mut tensors = zero_checkpoint(&hparams, vocab.size());

        // Positive candidate-gate bias drives the hidden state positive.
        let mut bias = vec![0f32; 3 * units];
        for slot in bias.iter_mut().skip(2 * units) {
            *slot = 1.0;
        }
        tensors.insert(
            "decoder.l0.b_ih".to_string(),
            Tensor::from_vec(bias, 3 * units, &Device::Cpu).unwrap(),
        );
        // Projection row for EOS is all ones, so EOS wins the argmax.
        let mut proj = vec![0f32; vocab.size() * units];
        for slot in proj.iter_mut().skip(2 * units).take(units) {
            *slot = 1.0;
        }
        tensors.insert(
            "projection.weight".to_string(),
            Tensor::from_vec(proj, (vocab.size(), units), &Device::Cpu).unwrap(),
        );

        let model = Seq2SeqModel::build(&hparams, vocab, tensors, Device::Cpu).unwrap();
        let batch = model.decode(&["hello".to_string()]).unwrap();
        assert_eq!(batch.row(0).unwrap(), &[TokenId::EOS]);
    }

    #[test]
    fn test_unknown_source_tokens_map_to_unk_before_decoding() {
        let model = build_zero_model(true, "standard");
        // Decodes fine even though no token is in the vocabulary.
        let batch = model.decode(&["zzz qqq".to_string()]).unwrap();
        assert_eq!(batch.batch_size(), 1);
    }

    #[test]
    fn test_empty_source_sentence_is_rejected() {
        let model = build_zero_model(false, "standard");
        assert!(model.decode(&["   ".to_string()]).is_err());
    }

    #[test]
    fn test_missing_tensor_is_named_in_the_error() {
        let hparams = sample_hparams(true, "standard");
        let vocab = sample_vocab();
        let mut tensors = zero_checkpoint(&hparams, vocab.size());
        tensors.remove("attention.combine.weight");
        let err = Seq2SeqModel::build(&hparams, vocab, tensors, Device::Cpu).err().unwrap();
        assert!(err.to_string().contains("attention.combine.weight"));
    }

    #[test]
    fn test_unexpected_tensor_is_rejected() {
        let hparams = sample_hparams(false, "standard");
        let vocab = sample_vocab();
        let mut tensors = zero_checkpoint(&hparams, vocab.size());
        tensors.insert("optimizer.step".to_string(), zeros(&[1]));
        let err = Seq2SeqModel::build(&hparams, vocab, tensors, Device::Cpu).err().unwrap();
        assert!(err.to_string().contains("optimizer.step"));
    }

    #[test]
    fn test_mis_shaped_tensor_is_rejected() {
        let hparams = sample_hparams(false, "standard");
        let vocab = sample_vocab();
        let mut tensors = zero_checkpoint(&hparams, vocab.size());
        tensors.insert("embedding.weight".to_string(), zeros(&[2, 2]));
        let err = Seq2SeqModel::build(&hparams, vocab, tensors, Device::Cpu).err().unwrap();
        assert!(err.to_string().contains("embedding.weight"));
    }
}

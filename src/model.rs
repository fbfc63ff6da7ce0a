/* ------------------------------------------------------------------ */
/* Fixed-context FFN language model: params, grads, running stats     */
/* ------------------------------------------------------------------ */
//
// Architecture: embed the context_size previous token ids, concatenate,
// linear to hidden, batch-normalize, tanh, linear to vocabulary logits,
// mean cross-entropy. During training the normalization uses statistics
// of the current minibatch (and updates the running EMA as a side
// effect); during inference it uses the stored running statistics only.
// That split is carried by the explicit `Phase` argument.

use std::fmt;

use crate::config::{BN_EPS, BN_MOMENTUM};
use crate::ops::{add_bias, col_mean, col_std, cross_entropy, matmul_bwd, matmul_fwd, softmax_rows};
use crate::rng::Rng;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Training,
    Inference,
}

// Activations cached by a training forward pass for backward.
struct BatchActs {
    batch: usize,
    xb: Vec<usize>,    // batch × context_size
    targets: Vec<usize>,
    embcat: Vec<f32>,  // batch × (context_size · embedding_dim)
    hnorm: Vec<f32>,   // batch × hidden (normalized pre-activation)
    h: Vec<f32>,       // batch × hidden (tanh output)
    bn_std: Vec<f32>,  // hidden (this batch's std)
    probs: Vec<f32>,   // batch × vocab
}

pub struct FfnModel {
    pub vocab_size: usize,
    pub context_size: usize,
    pub embedding_dim: usize,
    pub hidden_dim: usize,

    // Parameters
    pub c_embed: Vec<f32>, // vocab × embedding_dim
    pub w1: Vec<f32>,      // (context_size · embedding_dim) × hidden
    pub w2: Vec<f32>,      // hidden × vocab
    pub b2: Vec<f32>,      // vocab
    pub bn_gain: Vec<f32>, // hidden
    pub bn_bias: Vec<f32>, // hidden

    // Gradients
    pub d_c_embed: Vec<f32>,
    pub d_w1: Vec<f32>,
    pub d_w2: Vec<f32>,
    pub d_b2: Vec<f32>,
    pub d_bn_gain: Vec<f32>,
    pub d_bn_bias: Vec<f32>,

    // Running statistics: EMA of the per-batch mean/std, updated once per
    // training forward pass, read-only everywhere else.
    pub bn_mean_running: Vec<f32>,
    pub bn_std_running: Vec<f32>,

    pub steps_trained: usize,
    acts: Option<BatchActs>,
}

impl FfnModel {
    pub fn new(
        vocab_size: usize,
        context_size: usize,
        embedding_dim: usize,
        hidden_dim: usize,
        rng: &mut Rng,
    ) -> Self {
        let fan_in = context_size * embedding_dim;
        // Kaiming-style scale for the tanh nonlinearity.
        let w1_scale = (5.0 / 3.0) / (fan_in as f32).sqrt();

        let c_embed: Vec<f32> = (0..vocab_size * embedding_dim)
            .map(|_| rng.gauss(0.0, 1.0))
            .collect();
        let w1: Vec<f32> = (0..fan_in * hidden_dim)
            .map(|_| rng.gauss(0.0, 1.0) * w1_scale)
            .collect();
        // Output layer scaled down sharply so initial logits are near
        // uniform and initial loss sits close to ln(vocab_size).
        let w2: Vec<f32> = (0..hidden_dim * vocab_size)
            .map(|_| rng.gauss(0.0, 1.0) * 0.01)
            .collect();

        Self {
            vocab_size,
            context_size,
            embedding_dim,
            hidden_dim,
            c_embed,
            w1,
            w2,
            b2: vec![0.0; vocab_size],
            bn_gain: vec![1.0; hidden_dim],
            bn_bias: vec![0.0; hidden_dim],
            d_c_embed: vec![0.0; vocab_size * embedding_dim],
            d_w1: vec![0.0; fan_in * hidden_dim],
            d_w2: vec![0.0; hidden_dim * vocab_size],
            d_b2: vec![0.0; vocab_size],
            d_bn_gain: vec![0.0; hidden_dim],
            d_bn_bias: vec![0.0; hidden_dim],
            bn_mean_running: vec![0.0; hidden_dim],
            bn_std_running: vec![0.0; hidden_dim],
            steps_trained: 0,
            acts: None,
        }
    }

    /// Zero-filled model with the given shape; used by checkpoint loading.
    pub fn with_dims(
        vocab_size: usize,
        context_size: usize,
        embedding_dim: usize,
        hidden_dim: usize,
    ) -> Self {
        let mut rng = Rng::new(1);
        let mut model = Self::new(vocab_size, context_size, embedding_dim, hidden_dim, &mut rng);
        model.c_embed.fill(0.0);
        model.w1.fill(0.0);
        model.w2.fill(0.0);
        model
    }

    pub fn num_params(&self) -> usize {
        self.c_embed.len()
            + self.w1.len()
            + self.w2.len()
            + self.b2.len()
            + self.bn_gain.len()
            + self.bn_bias.len()
    }

    // Embedding lookup + concatenation. A token id outside the table is a
    // data-integrity error from the corpus side and fails loudly.
    fn embed(&self, xb: &[usize], batch: usize, embcat: &mut [f32]) {
        let e = self.embedding_dim;
        let ce = self.context_size * e;
        for b in 0..batch {
            for t in 0..self.context_size {
                let id = xb[b * self.context_size + t];
                assert!(
                    id < self.vocab_size,
                    "token id {} out of range for vocabulary of size {}",
                    id,
                    self.vocab_size
                );
                embcat[b * ce + t * e..b * ce + (t + 1) * e]
                    .copy_from_slice(&self.c_embed[id * e..(id + 1) * e]);
            }
        }
    }

    // Inference hidden layer: normalize with running statistics.
    fn infer_hidden(&self, embcat: &[f32], batch: usize, h: &mut [f32]) {
        let ce = self.context_size * self.embedding_dim;
        let hd = self.hidden_dim;
        let mut hpre = vec![0.0f32; batch * hd];
        matmul_fwd(embcat, &self.w1, batch, ce, hd, &mut hpre);
        for b in 0..batch {
            for i in 0..hd {
                let denom = self.bn_std_running[i].max(BN_EPS);
                let hnorm = (hpre[b * hd + i] - self.bn_mean_running[i]) / denom;
                h[b * hd + i] = (self.bn_gain[i] * hnorm + self.bn_bias[i]).tanh();
            }
        }
    }

    // Inference softmax probabilities for a batch of contexts.
    fn infer_probs(&self, xb: &[usize], batch: usize, probs: &mut [f32]) {
        let ce = self.context_size * self.embedding_dim;
        let mut embcat = vec![0.0f32; batch * ce];
        self.embed(xb, batch, &mut embcat);
        let mut h = vec![0.0f32; batch * self.hidden_dim];
        self.infer_hidden(&embcat, batch, &mut h);
        let mut logits = vec![0.0f32; batch * self.vocab_size];
        matmul_fwd(&h, &self.w2, batch, self.hidden_dim, self.vocab_size, &mut logits);
        add_bias(&mut logits, &self.b2, batch, self.vocab_size);
        softmax_rows(&logits, batch, self.vocab_size, probs);
    }

    /// Forward pass over a minibatch, returning the mean cross-entropy
    /// loss. `Phase::Training` normalizes with the current batch
    /// statistics, caches activations for `backward`, and updates the
    /// running statistics; `Phase::Inference` reads running statistics
    /// and leaves the model untouched.
    pub fn forward(&mut self, xb: &[usize], yb: &[usize], phase: Phase) -> f32 {
        let batch = yb.len();
        assert_eq!(xb.len(), batch * self.context_size, "context batch shape mismatch");

        if phase == Phase::Inference {
            let mut probs = vec![0.0f32; batch * self.vocab_size];
            self.infer_probs(xb, batch, &mut probs);
            let v = self.vocab_size;
            let total: f32 = yb
                .iter()
                .enumerate()
                .map(|(b, &y)| cross_entropy(&probs[b * v..(b + 1) * v], y))
                .sum();
            return total / batch as f32;
        }

        assert!(batch >= 2, "training minibatch must have at least 2 examples");

        let ce = self.context_size * self.embedding_dim;
        let hd = self.hidden_dim;
        let v = self.vocab_size;

        let mut embcat = vec![0.0f32; batch * ce];
        self.embed(xb, batch, &mut embcat);

        let mut hpre = vec![0.0f32; batch * hd];
        matmul_fwd(&embcat, &self.w1, batch, ce, hd, &mut hpre);

        // Batch statistics of the pre-activation.
        let mut bn_mean = vec![0.0f32; hd];
        let mut bn_std = vec![0.0f32; hd];
        col_mean(&hpre, batch, hd, &mut bn_mean);
        col_std(&hpre, &bn_mean, batch, hd, &mut bn_std);

        let mut hnorm = vec![0.0f32; batch * hd];
        let mut h = vec![0.0f32; batch * hd];
        for b in 0..batch {
            for i in 0..hd {
                let n = (hpre[b * hd + i] - bn_mean[i]) / bn_std[i];
                hnorm[b * hd + i] = n;
                h[b * hd + i] = (self.bn_gain[i] * n + self.bn_bias[i]).tanh();
            }
        }

        let mut logits = vec![0.0f32; batch * v];
        matmul_fwd(&h, &self.w2, batch, hd, v, &mut logits);
        add_bias(&mut logits, &self.b2, batch, v);

        let mut probs = vec![0.0f32; batch * v];
        softmax_rows(&logits, batch, v, &mut probs);
        let total: f32 = yb
            .iter()
            .enumerate()
            .map(|(b, &y)| cross_entropy(&probs[b * v..(b + 1) * v], y))
            .sum();
        let loss = total / batch as f32;

        // Training-only side effect: move the running stats toward this
        // batch's statistics.
        for i in 0..hd {
            self.bn_mean_running[i] =
                (1.0 - BN_MOMENTUM) * self.bn_mean_running[i] + BN_MOMENTUM * bn_mean[i];
            self.bn_std_running[i] =
                (1.0 - BN_MOMENTUM) * self.bn_std_running[i] + BN_MOMENTUM * bn_std[i];
        }

        self.acts = Some(BatchActs {
            batch,
            xb: xb.to_vec(),
            targets: yb.to_vec(),
            embcat,
            hnorm,
            h,
            bn_std,
            probs,
        });

        loss
    }

    /// Reverse-mode gradients of the last training forward pass. All
    /// gradient buffers are zeroed first; no accumulation across steps.
    pub fn backward(&mut self) {
        self.d_c_embed.fill(0.0);
        self.d_w1.fill(0.0);
        self.d_w2.fill(0.0);
        self.d_b2.fill(0.0);
        self.d_bn_gain.fill(0.0);
        self.d_bn_bias.fill(0.0);

        let Some(acts) = self.acts.take() else {
            return;
        };
        let batch = acts.batch;
        let bf = batch as f32;
        let ce = self.context_size * self.embedding_dim;
        let hd = self.hidden_dim;
        let v = self.vocab_size;
        let e = self.embedding_dim;

        // Softmax + cross-entropy backward in one step.
        let mut d_logits = acts.probs;
        for (b, &y) in acts.targets.iter().enumerate() {
            d_logits[b * v + y] -= 1.0;
        }
        for g in d_logits.iter_mut() {
            *g /= bf;
        }

        for b in 0..batch {
            for j in 0..v {
                self.d_b2[j] += d_logits[b * v + j];
            }
        }

        let mut d_h = vec![0.0f32; batch * hd];
        matmul_bwd(&d_logits, &acts.h, &self.w2, batch, hd, v, &mut d_h, &mut self.d_w2);

        // Through tanh, then gain/bias.
        let mut d_scaled = vec![0.0f32; batch * hd];
        for k in 0..batch * hd {
            d_scaled[k] = d_h[k] * (1.0 - acts.h[k] * acts.h[k]);
        }
        for b in 0..batch {
            for i in 0..hd {
                let ds = d_scaled[b * hd + i];
                self.d_bn_bias[i] += ds;
                self.d_bn_gain[i] += ds * acts.hnorm[b * hd + i];
            }
        }

        // Batch-norm backward. With g = dL/dhnorm and Bessel-corrected
        // std: d_hpre = (g - mean(g) - hnorm * Σ(g·hnorm)/(batch-1)) / std.
        let mut d_hpre = vec![0.0f32; batch * hd];
        for i in 0..hd {
            let mut g_sum = 0.0f32;
            let mut gx_sum = 0.0f32;
            for b in 0..batch {
                let g = d_scaled[b * hd + i] * self.bn_gain[i];
                g_sum += g;
                gx_sum += g * acts.hnorm[b * hd + i];
            }
            let g_mean = g_sum / bf;
            let gx = gx_sum / (bf - 1.0);
            let inv_std = 1.0 / acts.bn_std[i];
            for b in 0..batch {
                let g = d_scaled[b * hd + i] * self.bn_gain[i];
                d_hpre[b * hd + i] = (g - g_mean - acts.hnorm[b * hd + i] * gx) * inv_std;
            }
        }

        let mut d_embcat = vec![0.0f32; batch * ce];
        matmul_bwd(&d_hpre, &acts.embcat, &self.w1, batch, ce, hd, &mut d_embcat, &mut self.d_w1);

        // Scatter concatenated embedding gradients back into the table.
        for b in 0..batch {
            for t in 0..self.context_size {
                let id = acts.xb[b * self.context_size + t];
                for k in 0..e {
                    self.d_c_embed[id * e + k] += d_embcat[b * ce + t * e + k];
                }
            }
        }
    }

    /// Plain SGD: p -= lr * g.
    pub fn update(&mut self, lr: f32) {
        sgd(&mut self.c_embed, &self.d_c_embed, lr);
        sgd(&mut self.w1, &self.d_w1, lr);
        sgd(&mut self.w2, &self.d_w2, lr);
        sgd(&mut self.b2, &self.d_b2, lr);
        sgd(&mut self.bn_gain, &self.d_bn_gain, lr);
        sgd(&mut self.bn_bias, &self.d_bn_bias, lr);
    }

    /// Mean loss over a full example set, computed in fixed-size chunks on
    /// the inference path. Per-example losses are summed and divided by
    /// the total count, so a short final chunk carries its true weight.
    pub fn chunked_loss(&self, contexts: &[usize], targets: &[usize], chunk_size: usize) -> f32 {
        let n = targets.len();
        assert!(n > 0, "cannot evaluate loss on an empty example set");
        let cs = self.context_size;
        let v = self.vocab_size;
        let mut total = 0.0f32;
        let mut start = 0;
        while start < n {
            let batch = chunk_size.min(n - start);
            let xb = &contexts[start * cs..(start + batch) * cs];
            let mut probs = vec![0.0f32; batch * v];
            self.infer_probs(xb, batch, &mut probs);
            for b in 0..batch {
                total += cross_entropy(&probs[b * v..(b + 1) * v], targets[start + b]);
            }
            start += batch;
        }
        total / n as f32
    }

    /// Predictive distribution over the next token for a single context.
    pub fn next_token_probs(&self, context: &[usize]) -> Vec<f32> {
        assert_eq!(context.len(), self.context_size);
        let mut probs = vec![0.0f32; self.vocab_size];
        self.infer_probs(context, 1, &mut probs);
        probs
    }

    /// Sample one sentence autoregressively: start from an all-[PAD]
    /// window, sample from the predictive distribution, slide the window,
    /// stop on [EOS] (never emitted) or after max_len tokens.
    pub fn sample_sentence(
        &self,
        pad_id: usize,
        eos_id: usize,
        max_len: usize,
        rng: &mut Rng,
    ) -> Vec<usize> {
        let cs = self.context_size;
        let mut out = Vec::new();
        let mut context = vec![pad_id; cs];
        loop {
            let probs = self.next_token_probs(&context);
            let ix = rng.categorical(&probs);
            context.rotate_left(1);
            context[cs - 1] = ix;
            if ix == eos_id {
                break;
            }
            out.push(ix);
            if out.len() >= max_len {
                break;
            }
        }
        out
    }

    /// Sample n sentences sequentially from one shared rng, so a fixed
    /// seed and count reproduce exactly.
    pub fn sample_sentences(
        &self,
        n: usize,
        pad_id: usize,
        eos_id: usize,
        max_len: usize,
        rng: &mut Rng,
    ) -> Vec<Vec<usize>> {
        (0..n)
            .map(|_| self.sample_sentence(pad_id, eos_id, max_len, rng))
            .collect()
    }
}

fn sgd(params: &mut [f32], grads: &[f32], lr: f32) {
    for (p, g) in params.iter_mut().zip(grads.iter()) {
        *p -= lr * g;
    }
}

impl fmt::Display for FfnModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FfnModel")?;
        writeln!(f, "  vocab_size:    {}", self.vocab_size)?;
        writeln!(f, "  context_size:  {}", self.context_size)?;
        writeln!(f, "  embedding_dim: {}", self.embedding_dim)?;
        writeln!(f, "  hidden_dim:    {}", self.hidden_dim)?;
        writeln!(f, "  parameters:    {}", self.num_params())?;
        write!(f, "  steps trained: {}", self.steps_trained)
    }
}

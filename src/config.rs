/* ------------------------------------------------------------------ */
/* Hyperparameters and global constants                               */
/* ------------------------------------------------------------------ */

use anyhow::{bail, Result};

// ── Model defaults ────────────────────────────────────────────────────────

pub const CONTEXT_SIZE: usize = 5;
pub const EMBEDDING_DIM: usize = 10;
pub const HIDDEN_DIM: usize = 200;

// ── Training ──────────────────────────────────────────────────────────────

pub const SEED: u64 = 42;
pub const MAX_STEPS: usize = 200_000;
pub const MINIBATCH_SIZE: usize = 32;

// Stepped learning-rate schedule: LR_INITIAL below LR_DECAY_STEP, LR_DECAYED after.
pub const LR_INITIAL: f32 = 0.2;
pub const LR_DECAYED: f32 = 0.02;
pub const LR_DECAY_STEP: usize = 100_000;

// Batch-norm running statistics: new = (1 - BN_MOMENTUM) * old + BN_MOMENTUM * batch.
pub const BN_MOMENTUM: f32 = 0.001;
// Floor for normalization denominators (fresh models have zero running std).
pub const BN_EPS: f32 = 1e-5;

pub const LOG_INTERVAL: usize = 100;
// Early stopping (when enabled) checks dev loss every this many steps.
pub const EVAL_INTERVAL: usize = 1000;

// ── Evaluation / generation ───────────────────────────────────────────────

// Chunk size for full-dataset loss evaluation.
pub const EVAL_CHUNK: usize = 1024;
// Safety cap on generated sentence length; the sampler otherwise stops only on [EOS].
pub const MAX_GEN_TOKENS: usize = 128;
pub const N_GENERATE: usize = 20;

/* ------------------------------------------------------------------ */
/* Runtime configuration                                              */
/* ------------------------------------------------------------------ */

/// Flat training configuration, filled from CLI flags in main.rs.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub context_size: usize,
    pub embedding_dim: usize,
    pub hidden_dim: usize,
    pub seed: u64,
    pub max_steps: usize,
    pub minibatch_size: usize,
    pub lr_initial: f32,
    pub lr_decayed: f32,
    pub lr_decay_step: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            context_size: CONTEXT_SIZE,
            embedding_dim: EMBEDDING_DIM,
            hidden_dim: HIDDEN_DIM,
            seed: SEED,
            max_steps: MAX_STEPS,
            minibatch_size: MINIBATCH_SIZE,
            lr_initial: LR_INITIAL,
            lr_decayed: LR_DECAYED,
            lr_decay_step: LR_DECAY_STEP,
        }
    }
}

impl TrainConfig {
    /// Reject configurations before any computation happens.
    pub fn validate(&self) -> Result<()> {
        if self.context_size == 0 {
            bail!("context size must be at least 1");
        }
        if self.embedding_dim == 0 || self.hidden_dim == 0 {
            bail!("embedding and hidden dimensions must be at least 1");
        }
        // Batch std uses Bessel's correction (n - 1); a minibatch of 1 has no
        // defined variance and would propagate non-finite values.
        if self.minibatch_size < 2 {
            bail!(
                "minibatch size must be at least 2, got {}",
                self.minibatch_size
            );
        }
        if self.lr_initial <= 0.0 || self.lr_decayed <= 0.0 {
            bail!("learning rates must be positive");
        }
        Ok(())
    }
}

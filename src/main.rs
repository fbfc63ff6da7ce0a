mod checkpoint;
mod config;
mod dataset;
mod model;
mod ops;
mod rng;
mod train;
mod vocab;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::checkpoint::load_checkpoint;
use crate::config::{TrainConfig, EVAL_CHUNK, MAX_GEN_TOKENS, N_GENERATE};
use crate::dataset::{load_sentences, shuffle, Datasets, Examples};
use crate::model::FfnModel;
use crate::rng::Rng;
use crate::train::{train, TrainOpts};
use crate::vocab::Vocab;

fn usage() {
    println!("civil-lm — fixed-context feedforward language model");
    println!();
    println!("Options:");
    println!("  --data PATH        corpus file, one sentence per line (default data/civil_sentences.txt)");
    println!("  --vocab PATH       vocabulary JSON; omit to build a word-level one from the corpus");
    println!("  --context N        context window length (default 5)");
    println!("  --embeddings N     embedding dimension (default 10)");
    println!("  --hidden N         hidden dimension (default 200)");
    println!("  --seed N           rng seed (default 42)");
    println!("  --steps N          training steps (default 200000)");
    println!("  --batch N          minibatch size (default 32)");
    println!("  --generate N       sentences to sample after training (default 20)");
    println!("  --checkpoint PATH  save the trained model here");
    println!("  --resume PATH      continue training from a saved checkpoint");
    println!("  --save-vocab PATH  write the vocabulary as JSON");
    println!("  --patience N       early-stop patience in dev checks, 0 disables (default 0)");
}

fn main() -> Result<()> {
    let mut cfg = TrainConfig::default();
    let mut data_path = PathBuf::from("data/civil_sentences.txt");
    let mut vocab_path: Option<PathBuf> = None;
    let mut checkpoint_path: Option<PathBuf> = None;
    let mut resume_path: Option<PathBuf> = None;
    let mut save_vocab_path: Option<PathBuf> = None;
    let mut n_generate = N_GENERATE;
    let mut patience = 0usize;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut take = |name: &str| {
            args.next()
                .with_context(|| format!("missing value for {}", name))
        };
        match arg.as_str() {
            "--data" => data_path = PathBuf::from(take("--data")?),
            "--vocab" => vocab_path = Some(PathBuf::from(take("--vocab")?)),
            "--context" => cfg.context_size = take("--context")?.parse()?,
            "--embeddings" => cfg.embedding_dim = take("--embeddings")?.parse()?,
            "--hidden" => cfg.hidden_dim = take("--hidden")?.parse()?,
            "--seed" => cfg.seed = take("--seed")?.parse()?,
            "--steps" => cfg.max_steps = take("--steps")?.parse()?,
            "--batch" => cfg.minibatch_size = take("--batch")?.parse()?,
            "--generate" => n_generate = take("--generate")?.parse()?,
            "--checkpoint" => checkpoint_path = Some(PathBuf::from(take("--checkpoint")?)),
            "--resume" => resume_path = Some(PathBuf::from(take("--resume")?)),
            "--save-vocab" => save_vocab_path = Some(PathBuf::from(take("--save-vocab")?)),
            "--patience" => patience = take("--patience")?.parse()?,
            "--help" | "-h" => {
                usage();
                return Ok(());
            }
            other => bail!("unknown argument {} (try --help)", other),
        }
    }
    cfg.validate()?;

    println!("=== civil-lm ===");

    let mut sentences = load_sentences(&data_path)?;
    shuffle(&mut sentences, &mut Rng::new(cfg.seed));

    let vocab = match &vocab_path {
        Some(path) => Vocab::load(path)?,
        None => Vocab::from_sentences(&sentences),
    };
    println!(
        "Corpus: {} sentences | Vocabulary: {} tokens",
        sentences.len(),
        vocab.len()
    );
    if let Some(path) = &save_vocab_path {
        vocab.save(path)?;
        println!("Saved vocabulary to {}", path.display());
    }

    let mut rng = Rng::new(cfg.seed);
    let mut model = match &resume_path {
        Some(path) => {
            let model = load_checkpoint(path)
                .with_context(|| format!("cannot load checkpoint {}", path.display()))?;
            if model.vocab_size != vocab.len() {
                bail!(
                    "checkpoint was trained with a vocabulary of {} tokens, corpus has {}",
                    model.vocab_size,
                    vocab.len()
                );
            }
            // Shape comes from the checkpoint, not the flags.
            cfg.context_size = model.context_size;
            cfg.embedding_dim = model.embedding_dim;
            cfg.hidden_dim = model.hidden_dim;
            model
        }
        None => FfnModel::new(
            vocab.len(),
            cfg.context_size,
            cfg.embedding_dim,
            cfg.hidden_dim,
            &mut rng,
        ),
    };
    println!("{}", model);
    println!();

    let encoded = vocab.encode_all(&sentences);
    let datasets = Datasets::from_sentences(&encoded, cfg.context_size, vocab.pad_id, vocab.eos_id);
    println!(
        "Examples: train {} | dev {} | test {}",
        datasets.train.len(),
        datasets.dev.len(),
        datasets.test.len()
    );
    println!();

    let opts = TrainOpts {
        checkpoint_path,
        early_stop_patience: patience,
    };
    let history = train(
        &mut model,
        &datasets.train,
        Some(&datasets.dev),
        &cfg,
        &opts,
        &mut rng,
    )?;
    println!();
    println!("Trained {} steps", history.len());

    let report = |name: &str, split: &Examples| {
        if !split.is_empty() {
            let loss = model.chunked_loss(&split.contexts, &split.targets, EVAL_CHUNK);
            println!("{} loss: {:.4}", name, loss);
        }
    };
    report("train", &datasets.train);
    report("dev", &datasets.dev);
    report("test", &datasets.test);

    println!();
    println!("=== Samples ===");
    let mut gen_rng = Rng::new(cfg.seed.wrapping_add(10));
    for ids in model.sample_sentences(n_generate, vocab.pad_id, vocab.eos_id, MAX_GEN_TOKENS, &mut gen_rng)
    {
        println!("{}", vocab.decode(&ids));
    }

    Ok(())
}

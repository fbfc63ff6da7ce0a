/* ------------------------------------------------------------------ */
/* Vocabulary: token ↔ id mapping with reserved [PAD]/[UNK]/[EOS]     */
/* ------------------------------------------------------------------ */
//
// Two ways to obtain a vocabulary:
//   Vocab::load(path)            → saved vocab.json (ordered token list)
//   Vocab::from_sentences(&strs) → word-level fallback built from the corpus
//
// The reserved tokens must resolve to ids at construction time; a vocab
// file without them is rejected. Subword vocabulary *training* is out of
// scope — a saved file from an external tokenizer is consumed as-is.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const EOS_TOKEN: &str = "[EOS]";

// On-disk format: token list in id order.
#[derive(Serialize, Deserialize)]
struct VocabFile {
    tokens: Vec<String>,
}

pub struct Vocab {
    token_to_id: HashMap<String, usize>,
    id_to_token: Vec<String>,
    pub pad_id: usize,
    pub unk_id: usize,
    pub eos_id: usize,
}

impl Vocab {
    fn from_token_list(id_to_token: Vec<String>) -> Result<Self> {
        let token_to_id: HashMap<String, usize> = id_to_token
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        if token_to_id.len() != id_to_token.len() {
            bail!("vocabulary contains duplicate tokens");
        }
        let reserved = |name: &str| -> Result<usize> {
            token_to_id
                .get(name)
                .copied()
                .with_context(|| format!("vocabulary is missing reserved token {}", name))
        };
        let pad_id = reserved(PAD_TOKEN)?;
        let unk_id = reserved(UNK_TOKEN)?;
        let eos_id = reserved(EOS_TOKEN)?;
        Ok(Self {
            token_to_id,
            id_to_token,
            pad_id,
            unk_id,
            eos_id,
        })
    }

    /// Word-level vocabulary from the corpus: reserved tokens first, then
    /// every distinct lowercased whitespace-separated word, sorted.
    pub fn from_sentences(sentences: &[String]) -> Self {
        let mut words: Vec<String> = sentences
            .iter()
            .flat_map(|s| s.split_whitespace())
            .map(|w| w.to_lowercase())
            .collect();
        words.sort();
        words.dedup();

        let mut id_to_token =
            vec![PAD_TOKEN.to_string(), UNK_TOKEN.to_string(), EOS_TOKEN.to_string()];
        id_to_token.extend(words);
        // Reserved tokens are inserted by construction; cannot fail.
        Self::from_token_list(id_to_token).expect("fallback vocabulary is well-formed")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("cannot read vocabulary file {}", path.display()))?;
        let file: VocabFile = serde_json::from_str(&json)
            .with_context(|| format!("malformed vocabulary file {}", path.display()))?;
        Self::from_token_list(file.tokens)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = VocabFile {
            tokens: self.id_to_token.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(path, json)
            .with_context(|| format!("cannot write vocabulary file {}", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    pub fn token_to_id(&self, token: &str) -> Option<usize> {
        self.token_to_id.get(token).copied()
    }

    pub fn id_to_token(&self, id: usize) -> Option<&str> {
        self.id_to_token.get(id).map(|s| s.as_str())
    }

    /// Encode one sentence; unknown words map to [UNK].
    pub fn encode(&self, sentence: &str) -> Vec<usize> {
        sentence
            .split_whitespace()
            .map(|w| {
                self.token_to_id
                    .get(&w.to_lowercase())
                    .copied()
                    .unwrap_or(self.unk_id)
            })
            .collect()
    }

    /// Encode the whole corpus, sentences in parallel, order preserved.
    pub fn encode_all(&self, sentences: &[String]) -> Vec<Vec<usize>> {
        sentences.par_iter().map(|s| self.encode(s)).collect()
    }

    pub fn decode(&self, ids: &[usize]) -> String {
        ids.iter()
            .filter_map(|&id| self.id_to_token(id))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

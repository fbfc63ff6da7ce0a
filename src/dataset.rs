/* ------------------------------------------------------------------ */
/* Corpus loading, example building, train/dev/test split             */
/* ------------------------------------------------------------------ */
//
// A sentence [t1 .. tk] becomes k+1 supervised examples: the window of
// the context_size ids preceding each token (left-padded with [PAD] at
// the sentence start) predicts that token, and the final window predicts
// [EOS]. Windows never cross sentence boundaries. An empty sentence
// degenerates to a single all-[PAD] → [EOS] example.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;

use crate::rng::Rng;

/// Parallel (context, target) collections. `contexts` is a flat
/// [len × context_size] row-major buffer of token ids.
pub struct Examples {
    pub contexts: Vec<usize>,
    pub targets: Vec<usize>,
    pub context_size: usize,
}

impl Examples {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn context(&self, i: usize) -> &[usize] {
        &self.contexts[i * self.context_size..(i + 1) * self.context_size]
    }
}

/// Sliding-window example builder. Sentences are expanded in parallel
/// and concatenated back in corpus order.
pub fn build_examples(
    sentences: &[Vec<usize>],
    context_size: usize,
    pad_id: usize,
    eos_id: usize,
) -> Examples {
    let per_sentence: Vec<(Vec<usize>, Vec<usize>)> = sentences
        .par_iter()
        .map(|ids| {
            let mut contexts = Vec::with_capacity((ids.len() + 1) * context_size);
            let mut targets = Vec::with_capacity(ids.len() + 1);
            let mut window = vec![pad_id; context_size];
            for &id in ids.iter().chain(std::iter::once(&eos_id)) {
                contexts.extend_from_slice(&window);
                targets.push(id);
                // Crop and append: drop the oldest id, push the target.
                window.rotate_left(1);
                window[context_size - 1] = id;
            }
            (contexts, targets)
        })
        .collect();

    let mut contexts = Vec::new();
    let mut targets = Vec::new();
    for (c, t) in per_sentence {
        contexts.extend_from_slice(&c);
        targets.extend_from_slice(&t);
    }
    Examples {
        contexts,
        targets,
        context_size,
    }
}

/// Sentence-count boundaries of the 80/10/10 split: train is
/// [0, n1), dev [n1, n2), test [n2, S).
pub fn split_points(n_sentences: usize) -> (usize, usize) {
    (n_sentences * 8 / 10, n_sentences * 9 / 10)
}

pub struct Datasets {
    pub train: Examples,
    pub dev: Examples,
    pub test: Examples,
}

impl Datasets {
    /// Split an already-shuffled corpus by sentence count, then expand
    /// each slice independently into examples.
    pub fn from_sentences(
        sentences: &[Vec<usize>],
        context_size: usize,
        pad_id: usize,
        eos_id: usize,
    ) -> Self {
        let (n1, n2) = split_points(sentences.len());
        Self {
            train: build_examples(&sentences[..n1], context_size, pad_id, eos_id),
            dev: build_examples(&sentences[n1..n2], context_size, pad_id, eos_id),
            test: build_examples(&sentences[n2..], context_size, pad_id, eos_id),
        }
    }
}

/// Read a newline-separated sentence file. Blank lines are dropped.
pub fn load_sentences(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read corpus file {}", path.display()))?;
    let sentences: Vec<String> = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect();
    if sentences.is_empty() {
        bail!("corpus file {} contains no sentences", path.display());
    }
    Ok(sentences)
}

/// In-place Fisher-Yates shuffle driven by the explicit rng.
pub fn shuffle<T>(items: &mut [T], rng: &mut Rng) {
    for i in (1..items.len()).rev() {
        let j = rng.choice(i + 1);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAD: usize = 0;
    const EOS: usize = 1;

    #[test]
    fn sentence_of_length_k_yields_k_plus_one_examples() {
        for k in 0..6 {
            let sentence: Vec<usize> = (2..2 + k).collect();
            let ex = build_examples(&[sentence], 3, PAD, EOS);
            assert_eq!(ex.len(), k + 1);
        }
    }

    #[test]
    fn empty_sentence_yields_single_pad_to_eos_example() {
        let ex = build_examples(&[vec![]], 3, PAD, EOS);
        assert_eq!(ex.len(), 1);
        assert_eq!(ex.context(0), &[PAD, PAD, PAD]);
        assert_eq!(ex.targets[0], EOS);
    }

    #[test]
    fn contexts_form_a_strict_sliding_window() {
        let ex = build_examples(&[vec![5, 6, 7, 8]], 3, PAD, EOS);
        assert_eq!(ex.context(0), &[PAD, PAD, PAD]);
        for i in 1..ex.len() {
            let prev = ex.context(i - 1);
            let cur = ex.context(i);
            // New context is the previous one shifted by one with the
            // previous target appended.
            assert_eq!(&cur[..2], &prev[1..]);
            assert_eq!(cur[2], ex.targets[i - 1]);
        }
        assert_eq!(ex.targets, vec![5, 6, 7, 8, EOS]);
    }

    #[test]
    fn window_resets_at_sentence_boundaries() {
        let ex = build_examples(&[vec![5, 6], vec![7, 8]], 2, PAD, EOS);
        assert_eq!(ex.len(), 6);
        // First example of the second sentence starts from all-PAD again.
        assert_eq!(ex.context(3), &[PAD, PAD]);
        assert_eq!(ex.targets[3], 7);
    }

    #[test]
    fn split_points_floor_semantics() {
        assert_eq!(split_points(10), (8, 9));
        assert_eq!(split_points(35), (28, 31));
        assert_eq!(split_points(7), (5, 6));
        assert_eq!(split_points(0), (0, 0));
    }

    #[test]
    fn splits_are_disjoint_and_reconstruct_the_corpus() {
        let sentences: Vec<Vec<usize>> = (0..23).map(|i| vec![i + 2]).collect();
        let (n1, n2) = split_points(sentences.len());
        let rebuilt: Vec<Vec<usize>> = sentences[..n1]
            .iter()
            .chain(&sentences[n1..n2])
            .chain(&sentences[n2..])
            .cloned()
            .collect();
        assert_eq!(rebuilt, sentences);
        assert_eq!(n1 + (n2 - n1) + (sentences.len() - n2), sentences.len());
    }

    #[test]
    fn end_to_end_scenario_ten_sentences() {
        // 10 sentences of 3 tokens, context 2: 4 examples each, 40 total,
        // split 8/1/1 sentences → 32/4/4 examples.
        let sentences: Vec<Vec<usize>> = (0..10).map(|i| vec![i + 2, i + 3, i + 4]).collect();
        let total = build_examples(&sentences, 2, PAD, EOS);
        assert_eq!(total.len(), 40);
        let ds = Datasets::from_sentences(&sentences, 2, PAD, EOS);
        assert_eq!(ds.train.len(), 32);
        assert_eq!(ds.dev.len(), 4);
        assert_eq!(ds.test.len(), 4);
    }

    #[test]
    fn shuffle_is_deterministic_and_a_permutation() {
        let mut a: Vec<usize> = (0..50).collect();
        let mut b: Vec<usize> = (0..50).collect();
        shuffle(&mut a, &mut Rng::new(42));
        shuffle(&mut b, &mut Rng::new(42));
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_ne!(a, sorted);
    }
}

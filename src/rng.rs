/* ------------------------------------------------------------------ */
/* Minimal xorshift PRNG                                              */
/* ------------------------------------------------------------------ */
//
// The single source of randomness in the whole system. It is always
// passed explicitly (`&mut Rng`) into the operation that consumes it —
// weight init, minibatch index sampling, shuffling, generation — so a
// fixed seed reproduces a run bit for bit.

pub struct Rng {
    pub state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        // Xorshift has an all-zero fixed point; keep seed 0 usable.
        let state = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state }
    }

    pub fn next(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Uniform f64 in [0, 1).
    pub fn uniform(&mut self) -> f64 {
        (self.next() >> 11) as f64 * (1.0 / 9007199254740992.0)
    }

    /// Box-Muller gaussian sample.
    pub fn gauss(&mut self, mean: f32, std: f32) -> f32 {
        let mut u1 = self.uniform();
        let u2 = self.uniform();
        if u1 < 1e-30 {
            u1 = 1e-30;
        }
        let mag = ((-2.0 * u1.ln()).sqrt()) as f32;
        mean + std * mag * ((2.0 * std::f64::consts::PI * u2).cos() as f32)
    }

    /// Uniform index in [0, n).
    pub fn choice(&mut self, n: usize) -> usize {
        (self.uniform() * n as f64) as usize
    }

    /// Sample an index from a categorical distribution given as
    /// probabilities summing to ~1. Walks the cumulative sum; any
    /// floating-point shortfall falls through to the last index.
    pub fn categorical(&mut self, probs: &[f32]) -> usize {
        let r = self.uniform() as f32;
        let mut cumulative = 0.0f32;
        for (i, &p) in probs.iter().enumerate() {
            cumulative += p;
            if r < cumulative {
                return i;
            }
        }
        probs.len() - 1
    }
}

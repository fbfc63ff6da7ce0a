/* ------------------------------------------------------------------ */
/* Math primitives: batched linear layers, norm stats, softmax, loss  */
/* ------------------------------------------------------------------ */
//
// All tensors are flat row-major f32 buffers:
//   x  [batch × nin]
//   w  [nin × nout]
//   out[batch × nout]

use crate::config::BN_EPS;

// Batched linear forward: out = x @ w
pub fn matmul_fwd(x: &[f32], w: &[f32], batch: usize, nin: usize, nout: usize, out: &mut [f32]) {
    out[..batch * nout].fill(0.0);
    for b in 0..batch {
        let x_row = &x[b * nin..(b + 1) * nin];
        let out_row = &mut out[b * nout..(b + 1) * nout];
        for (k, &xv) in x_row.iter().enumerate() {
            let w_row = &w[k * nout..(k + 1) * nout];
            for j in 0..nout {
                out_row[j] += xv * w_row[j];
            }
        }
    }
}

// Batched linear backward:
//   d_x[b,k]  = Σ_j d_out[b,j] · w[k,j]     (overwritten)
//   d_w[k,j] += Σ_b x[b,k]     · d_out[b,j] (accumulated)
pub fn matmul_bwd(
    d_out: &[f32],
    x: &[f32],
    w: &[f32],
    batch: usize,
    nin: usize,
    nout: usize,
    d_x: &mut [f32],
    d_w: &mut [f32],
) {
    d_x[..batch * nin].fill(0.0);
    for b in 0..batch {
        let d_row = &d_out[b * nout..(b + 1) * nout];
        let x_row = &x[b * nin..(b + 1) * nin];
        for k in 0..nin {
            let w_row = &w[k * nout..(k + 1) * nout];
            let dw_row = &mut d_w[k * nout..(k + 1) * nout];
            let xv = x_row[k];
            let mut acc = 0.0f32;
            for j in 0..nout {
                acc += d_row[j] * w_row[j];
                dw_row[j] += xv * d_row[j];
            }
            d_x[b * nin + k] = acc;
        }
    }
}

pub fn add_bias(out: &mut [f32], bias: &[f32], batch: usize, nout: usize) {
    for b in 0..batch {
        let row = &mut out[b * nout..(b + 1) * nout];
        for j in 0..nout {
            row[j] += bias[j];
        }
    }
}

// Per-column mean over the batch dimension.
pub fn col_mean(x: &[f32], batch: usize, n: usize, out: &mut [f32]) {
    out[..n].fill(0.0);
    for b in 0..batch {
        let row = &x[b * n..(b + 1) * n];
        for j in 0..n {
            out[j] += row[j];
        }
    }
    let inv = 1.0 / batch as f32;
    for j in 0..n {
        out[j] *= inv;
    }
}

// Per-column standard deviation with Bessel's correction (n - 1),
// floored by BN_EPS inside the square root. Requires batch >= 2.
pub fn col_std(x: &[f32], means: &[f32], batch: usize, n: usize, out: &mut [f32]) {
    debug_assert!(batch >= 2, "column std undefined for batch < 2");
    out[..n].fill(0.0);
    for b in 0..batch {
        let row = &x[b * n..(b + 1) * n];
        for j in 0..n {
            let d = row[j] - means[j];
            out[j] += d * d;
        }
    }
    let inv = 1.0 / (batch - 1) as f32;
    for j in 0..n {
        out[j] = (out[j] * inv + BN_EPS).sqrt();
    }
}

// Row-wise numerically stable softmax.
pub fn softmax_rows(logits: &[f32], batch: usize, n: usize, probs: &mut [f32]) {
    for b in 0..batch {
        let row = &logits[b * n..(b + 1) * n];
        let out = &mut probs[b * n..(b + 1) * n];
        let mx = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for j in 0..n {
            out[j] = (row[j] - mx).exp();
            sum += out[j];
        }
        let inv = 1.0 / sum;
        for j in 0..n {
            out[j] *= inv;
        }
    }
}

// Negative log-likelihood of the target under one softmax row.
pub fn cross_entropy(probs_row: &[f32], target: usize) -> f32 {
    -probs_row[target].max(1e-10).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matmul_small_known_values() {
        // [1 2; 3 4] @ [1 0 2; 0 1 1] = [1 2 4; 3 4 10]
        let x = [1.0, 2.0, 3.0, 4.0];
        let w = [1.0, 0.0, 2.0, 0.0, 1.0, 1.0];
        let mut out = [0.0f32; 6];
        matmul_fwd(&x, &w, 2, 2, 3, &mut out);
        assert_eq!(out, [1.0, 2.0, 4.0, 3.0, 4.0, 10.0]);
    }

    #[test]
    fn matmul_bwd_matches_finite_differences() {
        let x = [0.5, -1.0, 2.0, 0.25, 1.5, -0.75];
        let mut w = [0.3, -0.2, 0.1, 0.7, -0.5, 0.4];
        let d_out = [1.0, -0.5, 0.25, 2.0];
        let (batch, nin, nout) = (2, 3, 2);

        let mut d_x = [0.0f32; 6];
        let mut d_w = [0.0f32; 6];
        matmul_bwd(&d_out, &x, &w, batch, nin, nout, &mut d_x, &mut d_w);

        // Scalar objective: sum(out * d_out). Its gradient wrt w is d_w.
        let objective = |w: &[f32]| {
            let mut out = [0.0f32; 4];
            matmul_fwd(&x, w, batch, nin, nout, &mut out);
            out.iter().zip(d_out.iter()).map(|(o, d)| o * d).sum::<f32>()
        };
        let delta = 1e-2f32;
        for k in 0..w.len() {
            let orig = w[k];
            w[k] = orig + delta;
            let hi = objective(&w);
            w[k] = orig - delta;
            let lo = objective(&w);
            w[k] = orig;
            let numeric = (hi - lo) / (2.0 * delta);
            assert!(
                (numeric - d_w[k]).abs() < 1e-3,
                "d_w[{}]: numeric {} vs analytic {}",
                k,
                numeric,
                d_w[k]
            );
        }
    }

    #[test]
    fn col_stats_use_bessel_correction() {
        // Columns {1,3} and {2,4}: mean (2,3), sample variance 2.
        let x = [1.0, 2.0, 3.0, 4.0];
        let mut means = [0.0f32; 2];
        let mut stds = [0.0f32; 2];
        col_mean(&x, 2, 2, &mut means);
        col_std(&x, &means, 2, 2, &mut stds);
        assert_eq!(means, [2.0, 3.0]);
        assert!((stds[0] - 2.0f32.sqrt()).abs() < 1e-4);
        assert!((stds[1] - 2.0f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let logits = [1.0, 2.0, 3.0, -1.0, 0.0, 1.0];
        let mut probs = [0.0f32; 6];
        softmax_rows(&logits, 2, 3, &mut probs);
        for b in 0..2 {
            let sum: f32 = probs[b * 3..(b + 1) * 3].iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
        // Larger logit, larger probability.
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn cross_entropy_of_certain_prediction_is_zero() {
        assert!(cross_entropy(&[0.0, 1.0, 0.0], 1) < 1e-6);
        assert!(cross_entropy(&[0.5, 0.25, 0.25], 1) > 1.0);
    }
}

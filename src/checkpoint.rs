/* ------------------------------------------------------------------ */
/* Checkpoint save / load                                             */
/* ------------------------------------------------------------------ */
//
// File format (little-endian):
//   [0..8]   magic         b"CVLM0001"
//   [8..12]  vocab_size    u32
//   [12..16] context_size  u32
//   [16..20] embedding_dim u32
//   [20..24] hidden_dim    u32
//   [24..28] steps_trained u32
//   [28..]   flat f32 arrays:
//              c_embed, w1, w2, b2, bn_gain, bn_bias,
//              bn_mean_running, bn_std_running
//
// Running statistics are part of the checkpoint: inference after a
// reload must behave exactly like inference before it.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::model::FfnModel;

const MAGIC: &[u8; 8] = b"CVLM0001";

fn write_f32s(buf: &mut Vec<u8>, s: &[f32]) {
    buf.reserve(s.len() * 4);
    for &v in s {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

fn read_f32_slice(f: &mut File, n: usize) -> std::io::Result<Vec<f32>> {
    let mut raw = vec![0u8; n * 4];
    f.read_exact(&mut raw)?;
    Ok(raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn read_u32(f: &mut File) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    f.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Serialize parameters + running statistics and flush atomically
/// (write to .tmp, then rename).
pub fn save_checkpoint(model: &FfnModel, path: &Path) -> std::io::Result<()> {
    let mut buf: Vec<u8> = Vec::with_capacity(28 + model.num_params() * 4);

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&(model.vocab_size as u32).to_le_bytes());
    buf.extend_from_slice(&(model.context_size as u32).to_le_bytes());
    buf.extend_from_slice(&(model.embedding_dim as u32).to_le_bytes());
    buf.extend_from_slice(&(model.hidden_dim as u32).to_le_bytes());
    buf.extend_from_slice(&(model.steps_trained as u32).to_le_bytes());

    write_f32s(&mut buf, &model.c_embed);
    write_f32s(&mut buf, &model.w1);
    write_f32s(&mut buf, &model.w2);
    write_f32s(&mut buf, &model.b2);
    write_f32s(&mut buf, &model.bn_gain);
    write_f32s(&mut buf, &model.bn_bias);
    write_f32s(&mut buf, &model.bn_mean_running);
    write_f32s(&mut buf, &model.bn_std_running);

    let tmp = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(&buf)?;
        f.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a checkpoint into a fresh model with the saved shape.
pub fn load_checkpoint(path: &Path) -> std::io::Result<FfnModel> {
    let mut f = File::open(path)?;

    let mut magic = [0u8; 8];
    f.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("bad magic bytes in checkpoint {}", path.display()),
        ));
    }

    let vocab_size = read_u32(&mut f)? as usize;
    let context_size = read_u32(&mut f)? as usize;
    let embedding_dim = read_u32(&mut f)? as usize;
    let hidden_dim = read_u32(&mut f)? as usize;
    let steps_trained = read_u32(&mut f)? as usize;

    let mut model = FfnModel::with_dims(vocab_size, context_size, embedding_dim, hidden_dim);
    model.steps_trained = steps_trained;

    model.c_embed = read_f32_slice(&mut f, vocab_size * embedding_dim)?;
    model.w1 = read_f32_slice(&mut f, context_size * embedding_dim * hidden_dim)?;
    model.w2 = read_f32_slice(&mut f, hidden_dim * vocab_size)?;
    model.b2 = read_f32_slice(&mut f, vocab_size)?;
    model.bn_gain = read_f32_slice(&mut f, hidden_dim)?;
    model.bn_bias = read_f32_slice(&mut f, hidden_dim)?;
    model.bn_mean_running = read_f32_slice(&mut f, hidden_dim)?;
    model.bn_std_running = read_f32_slice(&mut f, hidden_dim)?;

    Ok(model)
}

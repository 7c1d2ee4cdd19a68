//! Embedding persistence.
//!
//! One embedding is stored as a pair of JSON files in the latents
//! directory: `{name}_w.json` holds the latent code and `{name}_noise.json`
//! the ordered noise maps. Loading rebuilds both and revalidates the shape
//! contract, so a stale file for a different generator geometry fails at
//! load time rather than at the next synthesis call.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::state::TensorState;
use crate::error::{Error, Result};
use crate::latent::{Embedding, LatentCode, NoiseList};

#[derive(Serialize, Deserialize)]
struct LatentFile {
    latent: TensorState,
}

#[derive(Serialize, Deserialize)]
struct NoiseFile {
    noise: Vec<TensorState>,
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Serialization(format!("encode of {} failed: {e}", path.display())))?;
    fs::write(path, json)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json)
        .map_err(|e| Error::Serialization(format!("decode of {} failed: {e}", path.display())))
}

/// Save an embedding under `dir` as `{name}_w.json` and `{name}_noise.json`.
pub fn save_embedding(embedding: &Embedding, dir: impl AsRef<Path>, name: &str) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let latent_file = LatentFile {
        latent: TensorState::from_array(embedding.latent().as_array()),
    };
    write_json(&latent_file, &dir.join(format!("{name}_w.json")))?;

    let noise_file = NoiseFile {
        noise: embedding
            .noise()
            .maps()
            .iter()
            .map(TensorState::from_array)
            .collect(),
    };
    write_json(&noise_file, &dir.join(format!("{name}_noise.json")))
}

/// Load the embedding saved under `dir` as `name`.
pub fn load_embedding(dir: impl AsRef<Path>, name: &str) -> Result<Embedding> {
    let dir = dir.as_ref();

    let latent_file: LatentFile = read_json(&dir.join(format!("{name}_w.json")))?;
    let noise_file: NoiseFile = read_json(&dir.join(format!("{name}_noise.json")))?;

    let latent = LatentCode::new(latent_file.latent.to_array()?)?;
    let maps = noise_file
        .noise
        .iter()
        .map(TensorState::to_array)
        .collect::<Result<Vec<_>>>()?;
    let noise = NoiseList::new(maps)?;
    Embedding::new(latent, noise)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn embedding() -> Embedding {
        let latent = LatentCode::new(ArrayD::from_shape_fn(IxDyn(&[1, 2, 3]), |idx| {
            idx[1] as f32 + 0.1 * idx[2] as f32
        }))
        .expect("latent");
        let noise = NoiseList::new(vec![
            ArrayD::from_elem(IxDyn(&[1, 1, 4, 4]), 0.25),
            ArrayD::from_elem(IxDyn(&[1, 1, 8, 8]), -0.5),
        ])
        .expect("noise");
        Embedding::new(latent, noise).expect("embedding")
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let original = embedding();

        save_embedding(&original, dir.path(), "face_01").expect("save");
        assert!(dir.path().join("face_01_w.json").exists());
        assert!(dir.path().join("face_01_noise.json").exists());

        let loaded = load_embedding(dir.path(), "face_01").expect("load");
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_load_missing_name_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_embedding(dir.path(), "absent");
        assert!(matches!(err, Err(Error::Io(_))));
    }

    #[test]
    fn test_load_rejects_corrupt_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("bad_w.json"), "{not json").expect("write");
        std::fs::write(dir.path().join("bad_noise.json"), "{}").expect("write");
        let err = load_embedding(dir.path(), "bad");
        assert!(matches!(err, Err(Error::Serialization(_))));
    }
}

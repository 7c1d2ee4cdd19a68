//! Batch orchestration over directories of images and saved embeddings.
//!
//! These functions wire the invertor, the latent algebra and persistence
//! together: embed every image in a directory, then explore the recovered
//! embeddings by resampling, mixing or style transfer, writing PNGs to the
//! configured results directory.

use std::path::{Path, PathBuf};

use ndarray::{concatenate, ArrayD, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::invertor::{EmbedOptions, Invertor};
use crate::io::{load_embedding, load_image, save_embedding, save_image};
use crate::latent::{self, Embedding};

/// Sorted stems of the image files directly under `dir`.
fn image_stems(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"));
        if !is_image {
            continue;
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                Error::Configuration(format!("unreadable file name: {}", path.display()))
            })?
            .to_string();
        entries.push((stem, path));
    }
    entries.sort();
    Ok(entries)
}

/// Embed every PNG/JPEG under `input_dir` in batches of `batch_size`,
/// saving one embedding per image (named by file stem) to the configured
/// latents directory. Returns the stems in processing order.
pub fn embed_directory(
    invertor: &mut Invertor,
    input_dir: impl AsRef<Path>,
    batch_size: usize,
    opts: &EmbedOptions,
) -> Result<Vec<String>> {
    if batch_size == 0 {
        return Err(Error::Configuration("batch size must be positive".to_string()));
    }
    let entries = image_stems(input_dir.as_ref())?;
    if entries.is_empty() {
        return Err(Error::Configuration(format!(
            "no images found under {}",
            input_dir.as_ref().display()
        )));
    }

    let r = invertor.generator().resolution();
    let latents_dir = invertor.config().latents_dir.clone();
    let mut processed = Vec::with_capacity(entries.len());

    for chunk in entries.chunks(batch_size) {
        let mut images = Vec::with_capacity(chunk.len());
        let mut names = Vec::with_capacity(chunk.len());
        for (stem, path) in chunk {
            let image = load_image(path)?;
            if image.shape() != [1, 3, r, r] {
                return Err(Error::Configuration(format!(
                    "{} is {:?}, generator expects [1, 3, {r}, {r}]",
                    path.display(),
                    image.shape()
                )));
            }
            images.push(image);
            names.push(stem.clone());
        }

        let views: Vec<_> = images.iter().map(ArrayD::view).collect();
        let batch = concatenate(Axis(0), &views)
            .map_err(|e| Error::Configuration(format!("batch assembly failed: {e}")))?;

        let embedding = invertor.embed(&batch, &names, opts)?;
        for (index, name) in names.iter().enumerate() {
            save_embedding(&embedding.example(index)?, &latents_dir, name)?;
        }
        processed.extend(names);
    }
    Ok(processed)
}

fn load_checked(invertor: &Invertor, name: &str) -> Result<Embedding> {
    let embedding = load_embedding(&invertor.config().latents_dir, name)?;
    embedding.noise().validate_against(invertor.generator())?;
    let g = invertor.generator();
    if embedding.latent().num_layers() != g.num_layers()
        || embedding.latent().dim() != g.latent_dim()
    {
        return Err(Error::Configuration(format!(
            "embedding '{name}' has latent geometry [{}, {}], generator expects [{}, {}]",
            embedding.latent().num_layers(),
            embedding.latent().dim(),
            g.num_layers(),
            g.latent_dim()
        )));
    }
    Ok(embedding)
}

fn save_result(
    invertor: &Invertor,
    image: &ArrayD<f32>,
    file_name: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(&invertor.config().results_dir)?;
    let path = invertor.config().results_dir.join(file_name);
    save_image(&image.index_axis(Axis(0), 0).to_owned(), &path)?;
    Ok(path)
}

/// Generate `count` perturbed variants of a saved embedding, each with an
/// independent Gaussian nudge of std `scale` on the latent. The recovered
/// noise becomes the invertor's working noise.
pub fn resample_run(
    invertor: &mut Invertor,
    name: &str,
    count: usize,
    scale: f32,
    seed: u64,
) -> Result<Vec<PathBuf>> {
    let embedding = load_checked(invertor, name)?;
    invertor.update_noise(embedding.noise().clone())?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut paths = Vec::with_capacity(count);
    for index in 0..count {
        let image = latent::resample(
            invertor.generator(),
            embedding.latent(),
            embedding.noise(),
            scale,
            &mut rng,
        )?;
        paths.push(save_result(
            invertor,
            &image,
            &format!("{name}_resample_{index:02}.png"),
        )?);
    }
    Ok(paths)
}

/// Sweep the mix threshold from 0.0 to 1.0 in eleven steps between two
/// saved embeddings, synthesizing with `name_a`'s noise throughout.
pub fn mix_run(invertor: &mut Invertor, name_a: &str, name_b: &str) -> Result<Vec<PathBuf>> {
    let a = load_checked(invertor, name_a)?;
    let b = load_checked(invertor, name_b)?;

    let mut paths = Vec::with_capacity(11);
    for step in 0..=10u32 {
        let threshold = step as f32 / 10.0;
        let image = latent::mix(
            invertor.generator(),
            a.latent(),
            b.latent(),
            a.noise(),
            threshold,
        )?;
        paths.push(save_result(
            invertor,
            &image,
            &format!("{name_a}_{name_b}_mix_{step:02}.png"),
        )?);
    }
    Ok(paths)
}

/// Style transfer between two saved embeddings: coarse layers from
/// `content_name`, fine layers from `style_name`.
pub fn style_transfer_run(
    invertor: &mut Invertor,
    content_name: &str,
    style_name: &str,
    add_random_noise: bool,
    seed: u64,
) -> Result<PathBuf> {
    let content = load_checked(invertor, content_name)?;
    let style = load_checked(invertor, style_name)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let image = latent::style_transfer(
        invertor.generator(),
        content.latent(),
        style.latent(),
        style.noise(),
        content.noise(),
        add_random_noise,
        &mut rng,
    )?;
    save_result(
        invertor,
        &image,
        &format!("{content_name}_to_{style_name}_transfer.png"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratorConfig;
    use crate::invertor::InvertorConfig;
    use crate::latent::{LatentCode, NoiseList};
    use ndarray::IxDyn;

    fn invertor_in(dir: &Path) -> Invertor {
        let cfg = InvertorConfig {
            generator: GeneratorConfig {
                resolution: 8,
                base_resolution: 4,
                latent_dim: 4,
                channels: 3,
                ..GeneratorConfig::default()
            },
            w_epochs: 2,
            n_epochs: 2,
            mean_latent_samples: 4,
            noise_reg_weight: 10.0,
            latents_dir: dir.join("latents"),
            results_dir: dir.join("results"),
            ..InvertorConfig::default()
        };
        Invertor::new(cfg).expect("invertor")
    }

    fn seed_embedding(invertor: &Invertor, name: &str, fill: f32) {
        let g = invertor.generator();
        let latent = LatentCode::new(ArrayD::from_elem(
            IxDyn(&[1, g.num_layers(), g.latent_dim()]),
            fill,
        ))
        .expect("latent");
        let maps = g
            .layer_noise_shapes()
            .iter()
            .map(|s| ArrayD::from_elem(IxDyn(&[1, 1, s.height, s.width]), fill))
            .collect();
        let noise = NoiseList::new(maps).expect("noise");
        let embedding = Embedding::new(latent, noise).expect("embedding");
        save_embedding(&embedding, &invertor.config().latents_dir, name).expect("save");
    }

    #[test]
    fn test_embed_directory_saves_per_stem() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("input");
        std::fs::create_dir_all(&input).expect("mkdir");

        let image = ArrayD::from_elem(IxDyn(&[3, 8, 8]), 0.5);
        save_image(&image, input.join("b_face.png")).expect("save");
        save_image(&image, input.join("a_face.png")).expect("save");

        let mut invertor = invertor_in(dir.path());
        let processed =
            embed_directory(&mut invertor, &input, 2, &EmbedOptions::default()).expect("embed");

        assert_eq!(processed, vec!["a_face".to_string(), "b_face".to_string()]);
        let latents = invertor.config().latents_dir.clone();
        assert!(latents.join("a_face_w.json").exists());
        assert!(latents.join("b_face_noise.json").exists());
    }

    #[test]
    fn test_embed_directory_rejects_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("empty");
        std::fs::create_dir_all(&input).expect("mkdir");
        let mut invertor = invertor_in(dir.path());
        assert!(embed_directory(&mut invertor, &input, 2, &EmbedOptions::default()).is_err());
    }

    #[test]
    fn test_resample_run_writes_count_images() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut invertor = invertor_in(dir.path());
        seed_embedding(&invertor, "face", 0.1);

        let paths = resample_run(&mut invertor, "face", 3, 0.15, 9).expect("resample");
        assert_eq!(paths.len(), 3);
        for path in &paths {
            assert!(path.exists());
        }
        assert!(invertor.working_noise().is_some());
    }

    #[test]
    fn test_mix_run_writes_eleven_images() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut invertor = invertor_in(dir.path());
        seed_embedding(&invertor, "a", 0.1);
        seed_embedding(&invertor, "b", -0.1);

        let paths = mix_run(&mut invertor, "a", "b").expect("mix");
        assert_eq!(paths.len(), 11);
        assert!(paths[0].file_name().unwrap().to_str().unwrap().contains("mix_00"));
        assert!(paths[10].file_name().unwrap().to_str().unwrap().contains("mix_10"));
    }

    #[test]
    fn test_style_transfer_run_writes_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut invertor = invertor_in(dir.path());
        seed_embedding(&invertor, "content", 0.2);
        seed_embedding(&invertor, "style", -0.2);

        let path =
            style_transfer_run(&mut invertor, "content", "style", true, 4).expect("transfer");
        assert!(path.exists());
    }

    #[test]
    fn test_missing_embedding_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut invertor = invertor_in(dir.path());
        assert!(mix_run(&mut invertor, "nope", "nada").is_err());
    }
}

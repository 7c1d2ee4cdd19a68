//! Pure latent-space operations over recovered embeddings.
//!
//! These never optimize anything: they perturb, splice or swap latent rows
//! and hand the result straight to the generator.

use ndarray::ArrayD;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use super::{LatentCode, NoiseList};
use crate::error::{Error, Result};
use crate::generator::Generator;
use crate::Tensor;

/// Default standard deviation for [`resample`] perturbations.
pub const DEFAULT_RESAMPLE_SCALE: f32 = 0.15;

fn synthesize_detached(
    generator: &dyn Generator,
    latent: &LatentCode,
    noise: &NoiseList,
) -> Result<ArrayD<f32>> {
    let latent_t = latent.to_tensor(false);
    let noise_t: Vec<Tensor> = noise.to_tensors(false);
    Ok(generator.synthesize(&latent_t, &noise_t)?.data())
}

/// Add independent Gaussian perturbation (std = `scale`) to the latent and
/// synthesize with the supplied noise unchanged. `scale = 0` reproduces the
/// unperturbed image exactly.
pub fn resample(
    generator: &dyn Generator,
    latent: &LatentCode,
    noise: &NoiseList,
    scale: f32,
    rng: &mut StdRng,
) -> Result<ArrayD<f32>> {
    noise.validate_against(generator)?;
    let unit = Normal::new(0.0f32, 1.0).expect("valid normal");
    let perturbed = latent.as_array().mapv(|v| v + scale * unit.sample(rng));
    synthesize_detached(generator, &LatentCode::new(perturbed)?, noise)
}

/// Splice two latent codes at a layer cut-over derived from `threshold`.
///
/// The first `round(threshold * layers)` rows come from `a`, the remainder
/// from `b`: threshold 1.0 is entirely `a`, threshold 0.0 entirely `b`, and
/// the cut-over moves monotonically through the layer stack in between.
pub fn mix_latent(a: &LatentCode, b: &LatentCode, threshold: f32) -> Result<LatentCode> {
    if a.as_array().shape() != b.as_array().shape() {
        return Err(Error::Configuration(format!(
            "cannot mix latents of shapes {:?} and {:?}",
            a.as_array().shape(),
            b.as_array().shape()
        )));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::Configuration(format!(
            "mix threshold {threshold} outside [0, 1]"
        )));
    }

    let layers = a.num_layers();
    let cut = ((threshold * layers as f32).round() as usize).min(layers);

    let mut mixed = b.as_array().clone();
    let (batch, dim) = (a.batch(), a.dim());
    for bi in 0..batch {
        for l in 0..cut {
            for di in 0..dim {
                mixed[[bi, l, di]] = a.as_array()[[bi, l, di]];
            }
        }
    }
    LatentCode::new(mixed)
}

/// Mix two embeddings' latents at `threshold` and synthesize with the
/// caller-chosen noise list.
pub fn mix(
    generator: &dyn Generator,
    latent_a: &LatentCode,
    latent_b: &LatentCode,
    noise: &NoiseList,
    threshold: f32,
) -> Result<ArrayD<f32>> {
    noise.validate_against(generator)?;
    let mixed = mix_latent(latent_a, latent_b, threshold)?;
    synthesize_detached(generator, &mixed, noise)
}

/// Coarse rows (below the split index) from `content`, fine rows from
/// `style`. The split defaults to half the layer stack.
pub fn transfer_latent(
    content: &LatentCode,
    style: &LatentCode,
    split: usize,
) -> Result<LatentCode> {
    if content.as_array().shape() != style.as_array().shape() {
        return Err(Error::Configuration(format!(
            "cannot transfer between latents of shapes {:?} and {:?}",
            content.as_array().shape(),
            style.as_array().shape()
        )));
    }
    let layers = content.num_layers();
    if split > layers {
        return Err(Error::Configuration(format!(
            "split {split} exceeds layer count {layers}"
        )));
    }

    let mut combined = style.as_array().clone();
    let (batch, dim) = (content.batch(), content.dim());
    for bi in 0..batch {
        for l in 0..split {
            for di in 0..dim {
                combined[[bi, l, di]] = content.as_array()[[bi, l, di]];
            }
        }
    }
    LatentCode::new(combined)
}

/// Style transfer between two recovered embeddings: structure layers from
/// `content`, texture layers from `style`. With `add_random_noise` the
/// synthesis uses fresh standard-normal maps instead of either recovered
/// noise list, which probes how much structure the recovered noise encodes.
#[allow(clippy::too_many_arguments)]
pub fn style_transfer(
    generator: &dyn Generator,
    latent_content: &LatentCode,
    latent_style: &LatentCode,
    noise_style: &NoiseList,
    noise_content: &NoiseList,
    add_random_noise: bool,
    rng: &mut StdRng,
) -> Result<ArrayD<f32>> {
    noise_style.validate_against(generator)?;
    noise_content.validate_against(generator)?;

    let split = latent_content.num_layers() / 2;
    let combined = transfer_latent(latent_content, latent_style, split)?;

    let noise = if add_random_noise {
        random_noise(generator, latent_content.batch(), rng)?
    } else {
        noise_content.clone()
    };
    synthesize_detached(generator, &combined, &noise)
}

/// Fresh standard-normal noise list at the generator's declared shapes.
pub fn random_noise(
    generator: &dyn Generator,
    batch: usize,
    rng: &mut StdRng,
) -> Result<NoiseList> {
    let unit = Normal::new(0.0f32, 1.0).expect("valid normal");
    let maps = generator
        .layer_noise_shapes()
        .iter()
        .map(|s| {
            ArrayD::from_shape_fn(ndarray::IxDyn(&[batch, 1, s.height, s.width]), |_| {
                unit.sample(rng)
            })
        })
        .collect();
    NoiseList::new(maps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GeneratorConfig, SyntheticGenerator};
    use ndarray::IxDyn;
    use rand::SeedableRng;

    fn generator() -> SyntheticGenerator {
        let cfg = GeneratorConfig {
            resolution: 8,
            base_resolution: 4,
            latent_dim: 4,
            channels: 3,
            ..GeneratorConfig::default()
        };
        SyntheticGenerator::from_config(&cfg).expect("generator")
    }

    fn embedding_parts(g: &SyntheticGenerator, fill: f32) -> (LatentCode, NoiseList) {
        let latent = LatentCode::new(ArrayD::from_elem(
            IxDyn(&[1, g.num_layers(), g.latent_dim()]),
            fill,
        ))
        .expect("latent");
        let mut rng = StdRng::seed_from_u64(fill.to_bits() as u64);
        let noise = random_noise(g, 1, &mut rng).expect("noise");
        (latent, noise)
    }

    #[test]
    fn test_resample_zero_scale_is_identity() {
        let g = generator();
        let (latent, noise) = embedding_parts(&g, 0.3);
        let direct = synthesize_detached(&g, &latent, &noise).expect("direct");
        let mut rng = StdRng::seed_from_u64(11);
        let resampled = resample(&g, &latent, &noise, 0.0, &mut rng).expect("resample");
        assert_eq!(direct, resampled);
    }

    #[test]
    fn test_resample_nonzero_scale_changes_image() {
        let g = generator();
        let (latent, noise) = embedding_parts(&g, 0.3);
        let direct = synthesize_detached(&g, &latent, &noise).expect("direct");
        let mut rng = StdRng::seed_from_u64(11);
        let resampled = resample(&g, &latent, &noise, 0.5, &mut rng).expect("resample");
        assert_ne!(direct, resampled);
    }

    #[test]
    fn test_mix_boundaries() {
        let g = generator();
        let (latent_a, noise_a) = embedding_parts(&g, 0.2);
        let (latent_b, _) = embedding_parts(&g, -0.4);

        let image_a = synthesize_detached(&g, &latent_a, &noise_a).expect("a");
        let image_b = synthesize_detached(&g, &latent_b, &noise_a).expect("b");

        let all_a = mix(&g, &latent_a, &latent_b, &noise_a, 1.0).expect("mix 1.0");
        let all_b = mix(&g, &latent_a, &latent_b, &noise_a, 0.0).expect("mix 0.0");
        assert_eq!(all_a, image_a);
        assert_eq!(all_b, image_b);
    }

    #[test]
    fn test_mix_cut_is_monotonic_in_threshold() {
        let a = LatentCode::new(ArrayD::from_elem(IxDyn(&[1, 10, 2]), 1.0)).expect("a");
        let b = LatentCode::new(ArrayD::from_elem(IxDyn(&[1, 10, 2]), 0.0)).expect("b");
        let mut previous = -1.0f32;
        for step in 0..=10 {
            let threshold = step as f32 / 10.0;
            let mixed = mix_latent(&a, &b, threshold).expect("mix");
            // rows from `a` are 1.0, so the sum counts the cut position
            let taken = mixed.as_array().sum() / 2.0;
            assert!(taken >= previous, "cut moved backwards at {threshold}");
            previous = taken;
        }
        assert_eq!(previous, 10.0);
    }

    #[test]
    fn test_mix_rejects_out_of_range_threshold() {
        let g = generator();
        let (latent, noise) = embedding_parts(&g, 0.1);
        assert!(mix(&g, &latent, &latent, &noise, 1.5).is_err());
    }

    #[test]
    fn test_style_transfer_idempotent_when_content_is_style() {
        let g = generator();
        let (latent, noise) = embedding_parts(&g, 0.25);
        let direct = synthesize_detached(&g, &latent, &noise).expect("direct");

        let mut rng = StdRng::seed_from_u64(3);
        let transferred = style_transfer(&g, &latent, &latent, &noise, &noise, false, &mut rng)
            .expect("style transfer");
        assert_eq!(direct, transferred);
    }

    #[test]
    fn test_style_transfer_random_noise_differs() {
        let g = generator();
        let (latent, noise) = embedding_parts(&g, 0.25);
        let direct = synthesize_detached(&g, &latent, &noise).expect("direct");

        let mut rng = StdRng::seed_from_u64(3);
        let transferred = style_transfer(&g, &latent, &latent, &noise, &noise, true, &mut rng)
            .expect("style transfer");
        assert_ne!(direct, transferred);
    }
}

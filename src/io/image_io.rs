//! PNG input and output for `[3, h, w]` float images in `[0, 1]`.

use std::path::Path;

use image::{ImageBuffer, Rgb};
use ndarray::{ArrayD, IxDyn};

use crate::error::{Error, Result};

fn check_chw(image: &ArrayD<f32>) -> Result<(usize, usize)> {
    let shape = image.shape();
    if shape.len() != 3 || shape[0] != 3 {
        return Err(Error::Configuration(format!(
            "expected a [3, h, w] image, got {shape:?}"
        )));
    }
    Ok((shape[1], shape[2]))
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Load an image file as a `[1, 3, h, w]` array with values in `[0, 1]`.
pub fn load_image(path: impl AsRef<Path>) -> Result<ArrayD<f32>> {
    let rgb = image::open(path)?.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    let data = ArrayD::from_shape_fn(IxDyn(&[1, 3, h, w]), |idx| {
        rgb.get_pixel(idx[3] as u32, idx[2] as u32).0[idx[1]] as f32 / 255.0
    });
    Ok(data)
}

/// Write a `[3, h, w]` image as PNG, clamping values into `[0, 1]`.
pub fn save_image(image: &ArrayD<f32>, path: impl AsRef<Path>) -> Result<()> {
    let (h, w) = check_chw(image)?;
    let buffer = ImageBuffer::from_fn(w as u32, h as u32, |x, y| {
        Rgb([
            to_byte(image[[0, y as usize, x as usize]]),
            to_byte(image[[1, y as usize, x as usize]]),
            to_byte(image[[2, y as usize, x as usize]]),
        ])
    });
    buffer.save(path)?;
    Ok(())
}

/// Write target and reconstruction side by side in one PNG.
pub fn save_comparison(
    target: &ArrayD<f32>,
    reconstruction: &ArrayD<f32>,
    path: impl AsRef<Path>,
) -> Result<()> {
    let (h, w) = check_chw(target)?;
    let (rh, rw) = check_chw(reconstruction)?;
    if (h, w) != (rh, rw) {
        return Err(Error::Configuration(format!(
            "comparison shapes differ: {h}x{w} vs {rh}x{rw}"
        )));
    }

    let buffer = ImageBuffer::from_fn((2 * w) as u32, h as u32, |x, y| {
        let (src, col) = if (x as usize) < w {
            (target, x as usize)
        } else {
            (reconstruction, x as usize - w)
        };
        Rgb([
            to_byte(src[[0, y as usize, col]]),
            to_byte(src[[1, y as usize, col]]),
            to_byte(src[[2, y as usize, col]]),
        ])
    });
    buffer.save(path)?;
    Ok(())
}

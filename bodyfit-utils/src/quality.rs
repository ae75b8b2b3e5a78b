//! Photo sharpness scoring.
//!
//! The quality gate rejects photos whose focus score falls under a configured
//! floor (200 by default). The score is the variance of the 4-neighbour
//! Laplacian response over the grayscale image: crisp edges produce large
//! second derivatives and therefore a wide spread of responses, while blur and
//! motion smear flatten it. The floor was tuned on full-resolution phone
//! photos, so the image is scored at its native size rather than a downscaled
//! preview.

use image::{DynamicImage, GrayImage};
use ndarray::Array2;

/// Compute the Laplacian variance of an image. Higher means sharper.
///
/// Every pixel contributes. Neighbours outside the image are mirrored about
/// the edge pixel without repeating it (`dcb|abcd|cba`), so scores on small
/// images match the usual reflect-101 convolution. An empty image scores `0.0`.
pub fn laplacian_variance(img: &DynamicImage) -> f64 {
    let gray: GrayImage = img.to_luma8();
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }
    let (w, h) = (w as usize, h as usize);

    let arr = Array2::from_shape_fn((h, w), |(y, x)| gray.get_pixel(x as u32, y as u32)[0] as f64);

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..h {
        let (up, down) = (reflect_101(y as isize - 1, h), reflect_101(y as isize + 1, h));
        for x in 0..w {
            let (left, right) = (reflect_101(x as isize - 1, w), reflect_101(x as isize + 1, w));
            let response = arr[[up, x]] + arr[[down, x]] + arr[[y, left]] + arr[[y, right]]
                - 4.0 * arr[[y, x]];
            sum += response;
            sum_sq += response * response;
        }
    }

    let count = (w * h) as f64;
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// Mirror a neighbour index that is at most one step outside `0..len`.
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mirrored = if index < 0 {
        -index
    } else if index > last {
        2 * last - index
    } else {
        index
    };
    mirrored as usize
}

/// Focus score used by the quality gate.
pub fn focus_score(img: &DynamicImage) -> f64 {
    laplacian_variance(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn flat_image_has_zero_focus() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 64, Rgba([128, 128, 128, 255])));
        assert_eq!(focus_score(&img), 0.0);
    }

    #[test]
    fn checkerboard_is_far_above_default_floor() {
        let mut img = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 255]));
        for y in 0..64 {
            for x in 0..64 {
                let v = if (x + y) % 2 == 0 { 255u8 } else { 0u8 };
                img.put_pixel(x, y, Rgba([v, v, v, 255]));
            }
        }
        let score = focus_score(&DynamicImage::ImageRgba8(img));
        assert!(score > 200.0, "checkerboard scored {score}");
    }

    #[test]
    fn flat_and_empty_images_score_zero() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(2, 2));
        assert_eq!(laplacian_variance(&img), 0.0);
        let single = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([9, 9, 9, 255])));
        assert_eq!(laplacian_variance(&single), 0.0);
        let empty = DynamicImage::ImageRgba8(RgbaImage::new(0, 0));
        assert_eq!(laplacian_variance(&empty), 0.0);
    }

    #[test]
    fn border_pixels_use_mirrored_neighbours() {
        let mut img = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 1, Rgba([255, 255, 255, 255]));
        // Responses: centre -1020, edge midpoints 510 each, corners 0.
        let expected = 17_686_800.0 / 81.0;
        let score = laplacian_variance(&DynamicImage::ImageRgba8(img));
        assert!((score - expected).abs() < 1e-6, "scored {score}");
    }

    #[test]
    fn reflect_101_mirrors_without_repeating_edge() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-1, 1), 0);
    }
}

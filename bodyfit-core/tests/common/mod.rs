#![allow(dead_code)]

use std::io::Cursor;

use base64::{Engine, engine::general_purpose::STANDARD};
use bodyfit_core::{CalibrationConfig, CalibrationRequest, Calibrator, PrecomputedKeypoints};
use bodyfit_utils::fixtures::fixture_path;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;

pub const PHOTO_W: u32 = 400;
pub const PHOTO_H: u32 = 800;

fn encode_png(img: RgbImage) -> String {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("encode png");
    STANDARD.encode(bytes.into_inner())
}

/// A sharp checkerboard photo, far above the default focus floor.
pub fn sharp_photo(width: u32, height: u32) -> String {
    let img = RgbImage::from_fn(width, height, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            Rgb([235, 235, 235])
        } else {
            Rgb([20, 20, 20])
        }
    });
    encode_png(img)
}

/// A uniform photo whose focus score is zero.
pub fn flat_photo(width: u32, height: u32) -> String {
    encode_png(RgbImage::from_pixel(width, height, Rgb([128, 128, 128])))
}

/// Keypoints for a front photo at index 0 and a side photo at index 1.
pub fn session_keypoints() -> PrecomputedKeypoints {
    let path = fixture_path("keypoints/session.json").expect("session fixture");
    PrecomputedKeypoints::from_path(path).expect("load session keypoints")
}

pub fn session_calibrator() -> Calibrator {
    Calibrator::new(
        CalibrationConfig::default(),
        session_keypoints().into_adapter(),
    )
}

pub fn request(value: Value) -> CalibrationRequest {
    CalibrationRequest::from_value(value).expect("request")
}

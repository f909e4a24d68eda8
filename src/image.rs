use image::{imageops, RgbImage};

use crate::my_types::*;

/// Row-major grayscale image storage
#[derive(Clone, Debug)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Image {
    /// Create an empty image
    pub fn empty() -> Image {
        Image {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    /// Overwrite this image with the luma of `rgb`, reusing the allocation.
    pub fn set_from_rgb(&mut self, rgb: &RgbImage) {
        self.data.clear();
        self.width = rgb.width() as usize;
        self.height = rgb.height() as usize;
        let gray = imageops::grayscale(rgb);
        self.data.extend_from_slice(gray.as_raw());
    }

    #[inline(always)]
    #[cfg(test)]
    pub fn value(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Value at (x, y) with coordinates clamped to the image
    #[inline(always)]
    pub fn value_clamped(&self, x: i64, y: i64) -> u8 {
        let x = x.clamp(0, self.width as i64 - 1);
        let y = y.clamp(0, self.height as i64 - 1);
        self.data[y as usize * self.width + x as usize]
    }

    pub fn contains(&self, point: Vector2d) -> bool {
        self.width > 0
            && self.height > 0
            && point.x >= 0.
            && point.y >= 0.
            && point.x <= (self.width - 1) as f64
            && point.y <= (self.height - 1) as f64
    }

    #[inline(always)]
    #[cfg(test)]
    pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }
}

/// Bilinear interpolation. Samples outside the image take the nearest border value.
pub fn bilinear(image: &Image, point: Vector2d) -> f64 {
    let x0 = point.x.floor();
    let y0 = point.y.floor();
    let a = point.x - x0;
    let b = point.y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let v00 = image.value_clamped(x0, y0) as f64;
    let v10 = image.value_clamped(x0 + 1, y0) as f64;
    let v01 = image.value_clamped(x0, y0 + 1) as f64;
    let v11 = image.value_clamped(x0 + 1, y0 + 1) as f64;

    (1. - b) * ((1. - a) * v00 + a * v10) + b * ((1. - a) * v01 + a * v11)
}

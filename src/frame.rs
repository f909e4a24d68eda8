use image::RgbImage;

use crate::image::Image;
use crate::pyramid::Pyramid;

/// Grayscale frame together with its downscaled levels
#[derive(Debug)]
pub struct PyramidFrame {
    /// original image
    pub image: Image,
    /// downsized images
    pub pyramid: Pyramid,
}

impl PyramidFrame {
    pub fn empty() -> Self {
        Self {
            image: Image::empty(),
            pyramid: Pyramid::empty(),
        }
    }

    /// Rebuild in place from a color frame. `level_count` includes the
    /// full resolution image.
    pub fn rebuild(&mut self, rgb: &RgbImage, level_count: usize) {
        self.image.set_from_rgb(rgb);
        self.pyramid
            .compute(&self.image, level_count.saturating_sub(1));
    }

    /// Number of usable levels, full resolution included
    pub fn level_count(&self) -> usize {
        if self.image.width == 0 {
            0
        } else {
            self.pyramid.level_count + 1
        }
    }

    pub fn get_image_at_level(&self, level: usize) -> &Image {
        if level == 0 {
            &self.image
        } else {
            &self.pyramid.levels[level - 1]
        }
    }
}

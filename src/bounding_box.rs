use serde::{Deserialize, Serialize};

use crate::my_types::*;

/// Axis-aligned box in pixel units, top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    #[inline]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Uniform `n` x `n` grid spanning the box, edges included.
    pub fn sample_grid(&self, n: usize) -> impl Iterator<Item = Vector2d> + '_ {
        let steps = n.saturating_sub(1).max(1) as f64;
        let dx = self.width / steps;
        let dy = self.height / steps;
        (0..n).flat_map(move |i| {
            (0..n).map(move |j| Vector2d::new(self.x + i as f64 * dx, self.y + j as f64 * dy))
        })
    }

    /// Shift the box, round its corners to whole pixels and clamp it to an
    /// image of the given size. The far edges stay `2 * border` pixels
    /// inside the image. Returns None when nothing is left.
    pub fn translated_within(
        &self,
        translation: Vector2d,
        image_width: usize,
        image_height: usize,
        border: usize,
    ) -> Option<BoundingBox> {
        let min_x = (self.x + translation.x).round().max(0.);
        let min_y = (self.y + translation.y).round().max(0.);
        let max_x = (self.x + self.width + translation.x)
            .round()
            .min(image_width as f64 - 2. * border as f64);
        let max_y = (self.y + self.height + translation.y)
            .round()
            .min(image_height as f64 - 2. * border as f64);

        let width = max_x - min_x;
        let height = max_y - min_y;
        if width > 0. && height > 0. {
            Some(BoundingBox::new(min_x, min_y, width, height))
        } else {
            None
        }
    }
}

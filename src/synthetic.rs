use anyhow::{bail, Result};
use image::{Rgb, RgbImage};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::bounding_box::BoundingBox;
use crate::my_types::*;
use crate::video::VideoSource;

const BACKGROUND_CELL: u32 = 16;
const SPRITE_CELL: u32 = 5;

/// Deterministic test video: a value noise background with a textured
/// rectangle moving over it at constant velocity.
#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    background: RgbImage,
    sprite: Option<Sprite>,
    duration: f64,
    ready: bool,
}

#[derive(Debug, Clone)]
struct Sprite {
    texture: RgbImage,
    origin: Vector2d,
    /// pixels per second
    velocity: Vector2d,
}

impl SyntheticVideo {
    pub fn new(width: u32, height: u32, duration: f64, seed: u64) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        Self {
            background: value_noise(width, height, BACKGROUND_CELL, &mut rng),
            sprite: None,
            duration,
            ready: true,
        }
    }

    /// Add a moving rectangle of `width` x `height` starting at `origin`.
    pub fn with_sprite(
        mut self,
        origin: Vector2d,
        width: u32,
        height: u32,
        velocity: Vector2d,
        seed: u64,
    ) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        self.sprite = Some(Sprite {
            texture: value_noise(width, height, SPRITE_CELL, &mut rng),
            origin,
            velocity,
        });
        self
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Where the sprite is drawn at `time`, unclipped
    pub fn sprite_box(&self, time: f64) -> Option<BoundingBox> {
        self.sprite.as_ref().map(|sprite| {
            let position = sprite.position(time);
            BoundingBox::new(
                position.0 as f64,
                position.1 as f64,
                sprite.texture.width() as f64,
                sprite.texture.height() as f64,
            )
        })
    }

    fn render(&self, time: f64) -> RgbImage {
        let mut frame = self.background.clone();
        if let Some(sprite) = &self.sprite {
            let (x0, y0) = sprite.position(time);
            for (x, y, pixel) in sprite.texture.enumerate_pixels() {
                let x = x0 + x as i64;
                let y = y0 + y as i64;
                if x >= 0 && y >= 0 && x < frame.width() as i64 && y < frame.height() as i64 {
                    frame.put_pixel(x as u32, y as u32, *pixel);
                }
            }
        }
        frame
    }
}

impl Sprite {
    fn position(&self, time: f64) -> (i64, i64) {
        let p = self.origin + self.velocity * time;
        (p.x.round() as i64, p.y.round() as i64)
    }
}

impl VideoSource for SyntheticVideo {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn decode(&mut self, time: f64) -> Result<RgbImage> {
        if time < 0. || time >= self.duration {
            bail!("time {time:.3}s is outside of the video");
        }
        Ok(self.render(time))
    }
}

/// Random lattice values every `cell` pixels, smoothly interpolated.
fn value_noise(width: u32, height: u32, cell: u32, rng: &mut impl Rng) -> RgbImage {
    let lattice_w = (width / cell + 2) as usize;
    let lattice_h = (height / cell + 2) as usize;
    let lattice: Vec<f64> = (0..lattice_w * lattice_h)
        .map(|_| rng.gen_range(20.0..235.0))
        .collect();
    let smooth = |t: f64| t * t * (3. - 2. * t);

    RgbImage::from_fn(width, height, |x, y| {
        let cx = (x / cell) as usize;
        let cy = (y / cell) as usize;
        let tx = smooth((x % cell) as f64 / cell as f64);
        let ty = smooth((y % cell) as f64 / cell as f64);
        let l = |i: usize, j: usize| lattice[j * lattice_w + i];
        let top = l(cx, cy) * (1. - tx) + l(cx + 1, cy) * tx;
        let bottom = l(cx, cy + 1) * (1. - tx) + l(cx + 1, cy + 1) * tx;
        let v = (top * (1. - ty) + bottom * ty) as u8;
        Rgb([v, v, v])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_video() {
        let mut a = SyntheticVideo::new(64, 48, 1., 7);
        let mut b = SyntheticVideo::new(64, 48, 1., 7);
        let mut c = SyntheticVideo::new(64, 48, 1., 8);
        assert_eq!(a.decode(0.5).unwrap(), b.decode(0.5).unwrap());
        assert_ne!(a.decode(0.5).unwrap(), c.decode(0.5).unwrap());
    }

    #[test]
    fn test_sprite_moves() {
        let mut video = SyntheticVideo::new(64, 48, 1., 1).with_sprite(
            Vector2d::new(10., 10.),
            8,
            8,
            Vector2d::new(20., 0.),
            2,
        );
        assert_eq!(video.sprite_box(0.5), Some(BoundingBox::new(20., 10., 8., 8.)));

        let frame0 = video.decode(0.).unwrap();
        let frame1 = video.decode(0.5).unwrap();
        assert_eq!(frame0.get_pixel(10, 10), frame1.get_pixel(20, 10));
        assert_eq!(frame0.get_pixel(17, 17), frame1.get_pixel(27, 17));
    }

    #[test]
    fn test_decode_outside_duration_fails() {
        let mut video = SyntheticVideo::new(16, 16, 1., 0);
        assert!(video.decode(1.).is_err());
        assert!(video.decode(-0.1).is_err());
    }
}

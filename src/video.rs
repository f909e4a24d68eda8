use std::fmt::Debug;
use std::path::PathBuf;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use image::RgbImage;

/// Something that can deliver frames at arbitrary times.
pub trait VideoSource: Debug {
    /// False while the source still loads. Frames are not requested then.
    fn is_ready(&self) -> bool;

    /// Length of the video in seconds
    fn duration(&self) -> f64;

    fn decode(&mut self, time: f64) -> Result<RgbImage>;
}

/// Frames stored as individual image files with their timestamps.
#[derive(Debug)]
pub struct ImageSequence {
    /// sorted by time
    frames: Vec<(f64, PathBuf)>,
    frame_period: f64,
}

impl ImageSequence {
    pub fn new(mut frames: Vec<(f64, PathBuf)>, fps: f64) -> Self {
        frames.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            frames,
            frame_period: 1. / fps,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.frames.iter().map(|(time, _)| *time)
    }

    /// Latest frame shown at `time`
    fn frame_index(&self, time: f64) -> Option<usize> {
        // tolerate timestamps a hair before the frame they denote
        let time = time + 0.5 * self.frame_period;
        let count = self.frames.partition_point(|(t, _)| *t <= time);
        count.checked_sub(1)
    }
}

impl VideoSource for ImageSequence {
    fn is_ready(&self) -> bool {
        !self.frames.is_empty()
    }

    fn duration(&self) -> f64 {
        self.frames
            .last()
            .map(|(time, _)| time + self.frame_period)
            .unwrap_or(0.)
    }

    fn decode(&mut self, time: f64) -> Result<RgbImage> {
        let index = self
            .frame_index(time)
            .ok_or(anyhow!("No frame at {time:.3}s"))?;
        let path = &self.frames[index].1;
        let image = image::open(path)
            .with_context(|| format!("Failed to read frame {}", path.display()))?;
        Ok(image.to_rgb8())
    }
}

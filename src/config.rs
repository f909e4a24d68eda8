use serde::{Deserialize, Serialize};

/// Tracking session configuration.
///
/// `fps` sets both the tracking step and the time matching tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[derive(clap::Parser)]
pub struct Config {
    #[clap(long, default_value = "30")]
    pub fps: f64,

    /// Upper bound on decoded frames kept in memory
    #[clap(long, default_value = "50")]
    pub max_images: usize,

    #[clap(long, default_value = "1.0")]
    pub playback_rate: f64,

    /// Seed of the synthetic video source
    #[clap(long, default_value = "0")]
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fps: 30.,
            max_images: 50,
            playback_rate: 1.,
            seed: 0,
        }
    }
}

impl Config {
    pub fn with_fps(fps: f64) -> Self {
        Self {
            fps,
            ..Default::default()
        }
    }

    /// Frame period, ε = 1 / fps
    pub fn epsilon(&self) -> f64 {
        1. / self.fps
    }

    /// Two timestamps denote the same frame when they are closer than half a
    /// frame period. Neighbouring frames sit exactly ε apart, so a full ε
    /// window would merge them under rounding (0.3 - 0.2 < 0.1).
    #[inline]
    pub fn same_frame(&self, a: f64, b: f64) -> bool {
        (a - b).abs() < 0.5 * self.epsilon()
    }
}

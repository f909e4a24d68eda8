use std::collections::VecDeque;

use image::RgbImage;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{TrackError, TrackResult};
use crate::video::VideoSource;

#[derive(Debug)]
struct CachedFrame {
    image: RgbImage,
    time: f64,
}

/// Decoded frames of the current video plus the timestamps seen so far.
///
/// The image cache is bounded by `Config::max_images` and drops the oldest
/// insertion first. Known timestamps are kept separately, in decode order,
/// and outlive cache eviction.
#[derive(Debug)]
pub struct FrameStore {
    config: Config,
    source: Option<Box<dyn VideoSource>>,
    images: VecDeque<CachedFrame>,
    known_times: Vec<f64>,
    /// playback position in seconds
    position: f64,
}

impl FrameStore {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            source: None,
            images: VecDeque::new(),
            known_times: vec![],
            position: 0.,
        }
    }

    /// Drop all state and switch to `source`
    pub fn load(&mut self, source: Box<dyn VideoSource>) {
        self.reset();
        self.source = Some(source);
    }

    pub fn reset(&mut self) {
        self.source = None;
        self.images.clear();
        self.known_times.clear();
        self.position = 0.;
    }

    pub fn is_ready(&self) -> bool {
        self.source.as_ref().map_or(false, |source| source.is_ready())
    }

    pub fn duration(&self) -> f64 {
        self.source.as_ref().map_or(0., |source| source.duration())
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn known_times(&self) -> &[f64] {
        &self.known_times
    }

    pub fn cached_len(&self) -> usize {
        self.images.len()
    }

    fn capacity(&self) -> usize {
        self.config.max_images.max(1)
    }

    fn cached_index(&self, time: f64) -> Option<usize> {
        self.images
            .iter()
            .rposition(|frame| self.config.same_frame(frame.time, time))
    }

    fn known_index(&self, time: f64) -> Option<usize> {
        self.known_times
            .iter()
            .rposition(|known| self.config.same_frame(*known, time))
    }

    #[cfg(test)]
    pub fn is_cached(&self, time: f64) -> bool {
        self.cached_index(time).is_some()
    }

    /// Frame at `time`, decoded and cached when missing. Only `capture`
    /// records known timestamps, so the index stays in playback order.
    pub fn try_decode_at(&mut self, time: f64) -> TrackResult<&RgbImage> {
        if let Some(i) = self.cached_index(time) {
            return Ok(&self.images[i].image);
        }
        let image = self.decode_uncached(time)?;
        Ok(self.insert(image, time))
    }

    /// Like `try_decode_at`, but a source that is not ready or fails to decode
    /// simply yields no frame.
    pub fn decode_at(&mut self, time: f64) -> Option<&RgbImage> {
        match self.try_decode_at(time) {
            Ok(image) => Some(image),
            Err(TrackError::NotReady) => None,
            Err(err) => {
                warn!("{err}");
                None
            }
        }
    }

    /// Decode the frame at the playback position. This is how playback
    /// records timestamps: an already known time is re-recorded as the latest
    /// one, dropping what was recorded after it.
    pub fn capture(&mut self) -> Option<&RgbImage> {
        let time = self.position;
        if self.cached_index(time).is_none() {
            let image = match self.decode_uncached(time) {
                Ok(image) => image,
                Err(TrackError::NotReady) => return None,
                Err(err) => {
                    warn!("{err}");
                    return None;
                }
            };
            self.insert(image, time);
        }
        self.record_latest(time);
        self.cached_index(time).map(|i| &self.images[i].image)
    }

    fn decode_uncached(&mut self, time: f64) -> TrackResult<RgbImage> {
        let source = match self.source.as_mut() {
            Some(source) if source.is_ready() => source,
            _ => return Err(TrackError::NotReady),
        };
        source.decode(time).map_err(|err| TrackError::Decode {
            time,
            message: format!("{err:#}"),
        })
    }

    fn insert(&mut self, image: RgbImage, time: f64) -> &RgbImage {
        self.images.push_back(CachedFrame { image, time });
        while self.images.len() > self.capacity() {
            if let Some(evicted) = self.images.pop_front() {
                debug!("evict frame at {:.3}s", evicted.time);
            }
        }
        // capacity is at least one, so the frame just pushed is still there
        &self.images[self.images.len() - 1].image
    }

    fn record_latest(&mut self, time: f64) {
        if let Some(i) = self.known_index(time) {
            self.known_times.truncate(i);
        }
        self.known_times.push(time);
    }

    /// Known timestamp preceding `time`, or 0 when there is none.
    pub fn previous_known_time(&self, time: f64) -> f64 {
        if let Some(i) = self.known_index(time) {
            return if i > 0 { self.known_times[i - 1] } else { 0. };
        }
        self.known_times
            .iter()
            .copied()
            .filter(|known| *known < time)
            .fold(None, |latest: Option<f64>, known| {
                Some(latest.map_or(known, |latest| latest.max(known)))
            })
            .unwrap_or(0.)
    }

    /// Known timestamp following `time`, or the playback position when there
    /// is none.
    pub fn next_known_time(&self, time: f64) -> f64 {
        if let Some(i) = self.known_index(time) {
            return self.known_times.get(i + 1).copied().unwrap_or(self.position);
        }
        self.known_times
            .iter()
            .copied()
            .filter(|known| *known > time)
            .fold(None, |earliest: Option<f64>, known| {
                Some(earliest.map_or(known, |earliest| earliest.min(known)))
            })
            .unwrap_or(self.position)
    }

    /// Move the playback position. Going backwards forgets the known
    /// timestamps from `time` on, since later frames have to be decoded again
    /// before they count as known.
    pub fn seek(&mut self, time: f64) -> TrackResult<()> {
        if !self.is_ready() {
            return Err(TrackError::NotReady);
        }
        let last = (self.duration() - self.config.epsilon()).max(0.);
        let time = time.clamp(0., last);
        if time < self.position {
            let from = self
                .known_times
                .iter()
                .position(|known| self.config.same_frame(*known, time) || *known > time);
            if let Some(from) = from {
                debug!(
                    "seek back to {:.3}s forgets {} known timestamps",
                    time,
                    self.known_times.len() - from
                );
                self.known_times.truncate(from);
            }
        }
        self.position = time;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticVideo;

    fn store(max_images: usize) -> FrameStore {
        let config = Config {
            max_images,
            ..Config::with_fps(10.)
        };
        let mut store = FrameStore::new(config);
        store.load(Box::new(SyntheticVideo::new(32, 32, 2., 0)));
        store
    }

    /// Play from 0 to `last` frame, capturing each one.
    fn play(store: &mut FrameStore, last: usize) {
        for i in 0..=last {
            store.seek(i as f64 / 10.).unwrap();
            assert!(store.capture().is_some());
        }
    }

    #[test]
    fn test_eviction_bound() {
        let mut store = store(3);
        play(&mut store, 9);
        assert_eq!(store.cached_len(), 3);
        assert!(store.is_cached(0.9));
        assert!(store.is_cached(0.7));
        assert!(!store.is_cached(0.6));
        // the index outlives eviction
        assert_eq!(store.known_times().len(), 10);

        // decoding an evicted frame evicts the oldest insertion, not the least used
        assert!(store.decode_at(0.2).is_some());
        assert_eq!(store.cached_len(), 3);
        assert!(!store.is_cached(0.7));
        assert_eq!(store.known_times().len(), 10);
    }

    #[test]
    fn test_known_time_navigation() {
        let mut store = store(50);
        play(&mut store, 5);

        assert!((store.previous_known_time(0.3) - 0.2).abs() < 1e-9);
        assert!((store.previous_known_time(0.31) - 0.2).abs() < 1e-9);
        assert_eq!(store.previous_known_time(0.), 0.);

        assert!((store.next_known_time(0.3) - 0.4).abs() < 1e-9);
        // nothing after the last known time but the playback position
        assert_eq!(store.next_known_time(0.5), store.position());
    }

    #[test]
    fn test_navigation_between_known_times() {
        let mut store = store(50);
        for time in [0., 0.5, 1.] {
            store.seek(time).unwrap();
            store.capture();
        }
        assert!((store.previous_known_time(0.8) - 0.5).abs() < 1e-9);
        assert!((store.next_known_time(0.2) - 0.5).abs() < 1e-9);
        assert_eq!(store.previous_known_time(-0.5), 0.);
        assert_eq!(store.next_known_time(1.4), store.position());
    }

    #[test]
    fn test_backward_seek_truncates() {
        let mut store = store(50);
        play(&mut store, 8);
        store.seek(0.4).unwrap();
        assert_eq!(store.known_times().len(), 4);
        assert!(store.known_times().iter().all(|t| *t < 0.35));
        assert!((store.previous_known_time(0.4) - 0.3).abs() < 1e-9);
        assert!(store.next_known_time(0.3) <= 0.4 + 1e-9);

        // a forward seek leaves the index alone
        store.seek(1.5).unwrap();
        assert_eq!(store.known_times().len(), 4);

        // clamped to the video
        store.seek(5.).unwrap();
        assert!(store.position() < 2.);
        store.seek(-1.).unwrap();
        assert_eq!(store.position(), 0.);
        assert!(store.known_times().is_empty());
    }

    #[test]
    fn test_decoding_does_not_record_known_times() {
        let mut store = store(50);
        for time in [0., 0.2, 0.4] {
            store.seek(time).unwrap();
            store.capture();
        }
        // decoded between and ahead of captured frames
        assert!(store.decode_at(0.1).is_some());
        assert!(store.decode_at(0.6).is_some());
        assert!(store.is_cached(0.1));
        assert_eq!(store.known_times(), &[0., 0.2, 0.4]);
        assert_eq!(store.previous_known_time(0.1), 0.);
        assert!((store.next_known_time(0.1) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_capture_makes_position_latest() {
        let mut store = store(50);
        play(&mut store, 2);
        store.capture();
        assert_eq!(store.known_times().len(), 3);
        assert!((store.known_times()[2] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_irregular_capture_times_stay_apart() {
        let mut store = store(50);
        // 0.6 frame periods apart, more than the half period tolerance
        for time in [0., 0.06, 0.12] {
            store.seek(time).unwrap();
            store.capture();
        }
        assert_eq!(store.known_times().len(), 3);
        assert_eq!(store.cached_len(), 3);
        assert!((store.previous_known_time(0.06) - 0.).abs() < 1e-9);
        assert!((store.next_known_time(0.06) - 0.12).abs() < 1e-9);
    }

    #[test]
    fn test_not_ready_is_a_no_op() {
        let config = Config::with_fps(10.);
        let mut store = FrameStore::new(config);
        assert!(store.decode_at(0.).is_none());
        assert!(matches!(store.seek(0.5), Err(TrackError::NotReady)));

        let mut video = SyntheticVideo::new(32, 32, 2., 0);
        video.set_ready(false);
        store.load(Box::new(video));
        assert!(store.capture().is_none());
        assert!(matches!(store.try_decode_at(0.), Err(TrackError::NotReady)));
        assert!(store.known_times().is_empty());
    }

    #[test]
    fn test_decode_failure_yields_no_frame() {
        let mut store = store(50);
        assert!(store.decode_at(3.).is_none());
        assert!(matches!(store.try_decode_at(3.), Err(TrackError::Decode { .. })));
        assert!(store.known_times().is_empty());
    }

    #[test]
    fn test_reset() {
        let mut store = store(50);
        play(&mut store, 3);
        store.reset();
        assert!(!store.is_ready());
        assert_eq!(store.cached_len(), 0);
        assert!(store.known_times().is_empty());
        assert_eq!(store.position(), 0.);
    }
}

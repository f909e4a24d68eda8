use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::config::Config;

/// A box, or its absence, for one object at one time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub time: f64,
    /// None means the object is not visible
    pub bbox: Option<BoundingBox>,
    pub is_ground_truth: bool,
}

impl Annotation {
    pub fn new(time: f64, bbox: Option<BoundingBox>, is_ground_truth: bool) -> Self {
        Self {
            time,
            bbox,
            is_ground_truth,
        }
    }

    pub fn ground_truth(time: f64, bbox: Option<BoundingBox>) -> Self {
        Self::new(time, bbox, true)
    }

    pub fn computed(time: f64, bbox: Option<BoundingBox>) -> Self {
        Self::new(time, bbox, false)
    }

    pub fn is_visible(&self) -> bool {
        self.bbox.is_some()
    }
}

/// Annotations of one object, sorted by time with at most one entry per
/// frame. Once anything is annotated, an absent entry at time 0 marks the
/// object as "not yet appeared".
#[derive(Debug, Clone)]
pub struct AnnotationTimeline {
    annotations: Vec<Annotation>,
    config: Config,
}

impl AnnotationTimeline {
    pub fn new(config: Config) -> Self {
        Self {
            annotations: vec![],
            config,
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Insert or replace the entry for `annotation.time`, then drop the run of
    /// computed entries that follows it up to the next ground truth.
    pub fn upsert(&mut self, annotation: Annotation) {
        for i in 0..self.annotations.len() {
            if self.config.same_frame(self.annotations[i].time, annotation.time) {
                self.annotations[i] = annotation;
                self.remove_computed_from(i + 1);
                self.inject_origin();
                return;
            }
            if self.annotations[i].time > annotation.time {
                self.annotations.insert(i, annotation);
                self.remove_computed_from(i + 1);
                self.inject_origin();
                return;
            }
        }
        self.annotations.push(annotation);
        self.inject_origin();
    }

    /// Exact lookup, tolerant to the frame period
    pub fn at(&self, time: f64) -> Option<&Annotation> {
        for annotation in &self.annotations {
            if self.config.same_frame(annotation.time, time) {
                return Some(annotation);
            }
            if annotation.time > time {
                break;
            }
        }
        None
    }

    fn remove_computed_from(&mut self, index: usize) {
        let count = self.annotations[index..]
            .iter()
            .take_while(|a| !a.is_ground_truth)
            .count();
        if count > 0 {
            self.annotations.drain(index..index + count);
        }
    }

    fn inject_origin(&mut self) {
        let missing = match self.annotations.first() {
            Some(first) => !self.config.same_frame(first.time, 0.),
            None => true,
        };
        if missing {
            self.annotations.insert(0, Annotation::computed(0., None));
        }
    }
}

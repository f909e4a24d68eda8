use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::annotation::{Annotation, AnnotationTimeline};
use crate::bounding_box::BoundingBox;
use crate::config::Config;
use crate::error::TrackResult;
use crate::frame_store::FrameStore;
use crate::my_types::*;
use crate::optical_flow::OpticalFlowTracker;
use crate::video::VideoSource;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackedObject {
    pub object_id: ObjectId,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectsAtTime {
    pub time: f64,
    pub objects: Vec<TrackedObject>,
}

impl ObjectsAtTime {
    pub fn get(&self, object_id: ObjectId) -> Option<&Annotation> {
        self.objects
            .iter()
            .find(|object| object.object_id == object_id)
            .map(|object| &object.annotation)
    }
}

/// Work counters, mostly useful to check memoization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// optical flow (re)initialisations from a decoded frame
    pub flow_inits: usize,
    /// optical flow steps from one frame to the next
    pub flow_tracks: usize,
}

#[derive(Debug)]
struct AnnotatedObject {
    id: ObjectId,
    timeline: AnnotationTimeline,
}

/// An in-flight resolution of one timestamp. Each `ObjectsTracker::advance`
/// resolves one frame; dropping the walk abandons it. Whatever it wrote to the
/// timelines so far stays valid.
#[derive(Debug, Clone)]
pub struct Walk {
    target: f64,
    state: WalkState,
}

#[derive(Debug, Clone, Copy)]
enum WalkState {
    /// no timestamp has data for every object
    Unanchored,
    Step { time: f64, previous: Option<f64> },
    Done,
}

impl Walk {
    pub fn is_done(&self) -> bool {
        matches!(self.state, WalkState::Done)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WalkStatus {
    /// An intermediate frame was resolved, more steps follow
    Pending(ObjectsAtTime),
    Complete(ObjectsAtTime),
}

/// Propagates ground truth boxes to arbitrary times.
///
/// To answer for a time, it goes back to the latest known frame where every
/// object is annotated and then tracks forward one known frame at a time,
/// writing a computed annotation for each object and frame on the way.
#[derive(Debug)]
pub struct ObjectsTracker {
    config: Config,
    frames: FrameStore,
    objects: Vec<AnnotatedObject>,
    optical_flow: OpticalFlowTracker,
    /// time of the frame the optical flow currently holds as previous
    last_flow_time: Option<f64>,
    next_id: usize,
    stats: TrackerStats,
}

impl ObjectsTracker {
    pub fn new(config: Config) -> Self {
        Self {
            frames: FrameStore::new(config.clone()),
            config,
            objects: vec![],
            optical_flow: OpticalFlowTracker::new(),
            last_flow_time: None,
            next_id: 0,
            stats: TrackerStats::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn frames(&self) -> &FrameStore {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut FrameStore {
        &mut self.frames
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Switch to a new video. Annotations are kept.
    pub fn load(&mut self, source: Box<dyn VideoSource>) {
        self.frames.load(source);
        self.optical_flow.reset();
        self.last_flow_time = None;
    }

    pub fn add_object(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.push(AnnotatedObject {
            id,
            timeline: AnnotationTimeline::new(self.config.clone()),
        });
        id
    }

    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        let count = self.objects.len();
        self.objects.retain(|object| object.id != id);
        self.objects.len() != count
    }

    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.iter().map(|object| object.id).collect()
    }

    pub fn timeline(&self, id: ObjectId) -> Option<&AnnotationTimeline> {
        self.objects
            .iter()
            .find(|object| object.id == id)
            .map(|object| &object.timeline)
    }

    /// Record a user supplied box, None meaning "not visible". Computed boxes
    /// after `time` up to the next ground truth are dropped. Unknown ids are
    /// registered.
    pub fn set_ground_truth(&mut self, id: ObjectId, time: f64, bbox: Option<BoundingBox>) {
        let index = match self.objects.iter().position(|object| object.id == id) {
            Some(index) => index,
            None => {
                self.next_id = self.next_id.max(id.0 + 1);
                self.objects.push(AnnotatedObject {
                    id,
                    timeline: AnnotationTimeline::new(self.config.clone()),
                });
                self.objects.len() - 1
            }
        };
        debug!(?id, time, ?bbox, "ground truth");
        self.objects[index]
            .timeline
            .upsert(Annotation::ground_truth(time, bbox));
    }

    /// Annotation of every object at `time`, tracking forward as needed.
    #[instrument(skip(self))]
    pub fn get_objects(&mut self, time: f64) -> TrackResult<ObjectsAtTime> {
        let mut walk = self.begin(time);
        loop {
            match self.advance(&mut walk)? {
                WalkStatus::Pending(_) => continue,
                WalkStatus::Complete(result) => return Ok(result),
            }
        }
    }

    /// Start resolving `time`. Drive the walk with `advance`.
    pub fn begin(&mut self, time: f64) -> Walk {
        // objects without any annotation are absent, here and from the origin on
        for object in self.objects.iter_mut().filter(|o| o.timeline.is_empty()) {
            object.timeline.upsert(Annotation::computed(time, None));
        }

        let state = match self.find_anchor(time) {
            Some(anchor) => {
                debug!(anchor, target = time, "walk");
                WalkState::Step {
                    time: anchor,
                    previous: None,
                }
            }
            None => WalkState::Unanchored,
        };
        Walk {
            target: time,
            state,
        }
    }

    /// Resolve the next frame of `walk`.
    pub fn advance(&mut self, walk: &mut Walk) -> TrackResult<WalkStatus> {
        let (time, previous) = match walk.state {
            WalkState::Step { time, previous } => (time, previous),
            WalkState::Unanchored => {
                walk.state = WalkState::Done;
                return Ok(WalkStatus::Complete(self.mark_absent(walk.target)));
            }
            WalkState::Done => {
                return Ok(WalkStatus::Complete(self.snapshot(walk.target)));
            }
        };

        let (result, complete) = self.track_step(time, previous)?;
        if !complete {
            warn!("no frame at {:.3}s, stopping short of {:.3}s", time, walk.target);
            walk.state = WalkState::Done;
            return Ok(WalkStatus::Complete(result));
        }
        if self.config.same_frame(time, walk.target) {
            walk.state = WalkState::Done;
            return Ok(WalkStatus::Complete(result));
        }

        match self.next_step(time, walk.target) {
            Some(next) => {
                walk.state = WalkState::Step {
                    time: next,
                    previous: Some(time),
                };
                Ok(WalkStatus::Pending(result))
            }
            None => {
                warn!("no known frame after {:.3}s, stopping short of {:.3}s", time, walk.target);
                walk.state = WalkState::Done;
                Ok(WalkStatus::Complete(result))
            }
        }
    }

    /// Latest known time at or before `time` where every object has an
    /// annotation.
    fn find_anchor(&self, time: f64) -> Option<f64> {
        let mut time = time;
        loop {
            if self.objects.iter().all(|o| o.timeline.at(time).is_some()) {
                return Some(time);
            }
            if time <= 0. || self.config.same_frame(time, 0.) {
                return None;
            }
            let previous = self.frames.previous_known_time(time);
            if previous >= time {
                return None;
            }
            time = previous;
        }
    }

    /// Following known frame, or the target itself when the next known frame
    /// lies beyond it. None when playback has not got any further.
    fn next_step(&self, time: f64, target: f64) -> Option<f64> {
        let next = self.frames.next_known_time(time);
        if next <= time || self.config.same_frame(next, time) {
            return None;
        }
        if next > target {
            return Some(target);
        }
        Some(next)
    }

    /// Fill in the frame at `time` from the frame at `previous`. The flag is
    /// false when a frame was missing and only part of the objects could be
    /// resolved.
    fn track_step(
        &mut self,
        time: f64,
        previous: Option<f64>,
    ) -> TrackResult<(ObjectsAtTime, bool)> {
        let mut resolved: Vec<(usize, Annotation)> = Vec::with_capacity(self.objects.len());
        let mut queued: Vec<(usize, Option<BoundingBox>)> = vec![];

        for (index, object) in self.objects.iter_mut().enumerate() {
            if let Some(annotation) = object.timeline.at(time) {
                resolved.push((index, *annotation));
                continue;
            }
            match previous.and_then(|previous| object.timeline.at(previous)) {
                Some(annotation) => queued.push((index, annotation.bbox)),
                None => {
                    // nothing to track from
                    let annotation = Annotation::computed(time, None);
                    object.timeline.upsert(annotation);
                    resolved.push((index, annotation));
                }
            }
        }

        let mut complete = true;
        if !queued.is_empty() {
            let boxes: Vec<Option<BoundingBox>> = queued.iter().map(|(_, bbox)| *bbox).collect();
            let tracked = match previous {
                Some(previous) if boxes.iter().any(Option::is_some) => {
                    self.track_boxes(previous, time, &boxes)?
                }
                _ => Some(boxes),
            };

            match tracked {
                Some(tracked) => {
                    for ((index, _), bbox) in queued.iter().zip(tracked) {
                        let annotation = Annotation::computed(time, bbox);
                        if bbox.is_none() {
                            debug!(id = ?self.objects[*index].id, time, "not visible");
                        }
                        self.objects[*index].timeline.upsert(annotation);
                        resolved.push((*index, annotation));
                    }
                }
                None => complete = false,
            }
        }

        resolved.sort_by_key(|(index, _)| *index);
        let objects = resolved
            .into_iter()
            .map(|(index, annotation)| TrackedObject {
                object_id: self.objects[index].id,
                annotation,
            })
            .collect();
        Ok((ObjectsAtTime { time, objects }, complete))
    }

    /// None when either frame could not be decoded
    fn track_boxes(
        &mut self,
        previous: f64,
        time: f64,
        boxes: &[Option<BoundingBox>],
    ) -> TrackResult<Option<Vec<Option<BoundingBox>>>> {
        if !self.prepare_flow(previous) {
            return Ok(None);
        }
        let image = match self.frames.decode_at(time) {
            Some(image) => image,
            None => return Ok(None),
        };
        let tracked = self.optical_flow.track(image, boxes)?;
        self.last_flow_time = Some(time);
        self.stats.flow_tracks += 1;
        debug!(previous, time, "tracked {} boxes", boxes.len());
        Ok(Some(tracked))
    }

    /// Make the optical flow hold the frame at `time` as its previous frame.
    /// Consecutive steps find it there already.
    fn prepare_flow(&mut self, time: f64) -> bool {
        let up_to_date = self.optical_flow.is_initialized()
            && self
                .last_flow_time
                .map_or(false, |last| self.config.same_frame(last, time));
        if up_to_date {
            return true;
        }

        self.optical_flow.reset();
        self.last_flow_time = None;
        let image = match self.frames.decode_at(time) {
            Some(image) => image,
            None => return false,
        };
        self.optical_flow.init(image);
        self.last_flow_time = Some(time);
        self.stats.flow_inits += 1;
        true
    }

    /// Objects missing at `time` become absent there
    fn mark_absent(&mut self, time: f64) -> ObjectsAtTime {
        for object in self.objects.iter_mut() {
            if object.timeline.at(time).is_none() {
                object.timeline.upsert(Annotation::computed(time, None));
            }
        }
        self.snapshot(time)
    }

    fn snapshot(&self, time: f64) -> ObjectsAtTime {
        let objects = self
            .objects
            .iter()
            .filter_map(|object| {
                object.timeline.at(time).map(|annotation| TrackedObject {
                    object_id: object.id,
                    annotation: *annotation,
                })
            })
            .collect();
        ObjectsAtTime { time, objects }
    }
}

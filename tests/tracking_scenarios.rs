use boxtrack_rust::bounding_box::BoundingBox;
use boxtrack_rust::config::Config;
use boxtrack_rust::my_types::*;
use boxtrack_rust::synthetic::SyntheticVideo;
use boxtrack_rust::tracker::ObjectsTracker;

const FPS: f64 = 10.;

fn at(i: usize) -> f64 {
    i as f64 / FPS
}

fn session(video: SyntheticVideo, max_images: usize) -> ObjectsTracker {
    let config = Config {
        max_images,
        ..Config::with_fps(FPS)
    };
    let mut tracker = ObjectsTracker::new(config);
    tracker.load(Box::new(video));
    tracker
}

/// Seek to every frame in `frames` and capture it, as playback does.
fn play(tracker: &mut ObjectsTracker, frames: std::ops::RangeInclusive<usize>) {
    for i in frames {
        tracker.frames_mut().seek(at(i)).unwrap();
        assert!(tracker.frames_mut().capture().is_some(), "frame {i}");
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_static_box_between_ground_truths() {
    let mut tracker = session(SyntheticVideo::new(64, 64, 2., 11), 50);
    let id = tracker.add_object();
    let bbox = BoundingBox::new(0., 0., 10., 10.);
    tracker.set_ground_truth(id, 0., Some(bbox));
    tracker.set_ground_truth(id, 1., Some(bbox));
    play(&mut tracker, 0..=5);

    let result = tracker.get_objects(at(5)).unwrap();
    assert!(close(result.time, at(5)));
    assert_eq!(result.get(id).unwrap().bbox, Some(bbox));
    assert!(!result.get(id).unwrap().is_ground_truth);

    // one tracking step per intermediate frame
    assert_eq!(tracker.stats().flow_tracks, 5);
    assert_eq!(tracker.stats().flow_inits, 1);

    let timeline = tracker.timeline(id).unwrap();
    for i in 1..=5 {
        let annotation = timeline.at(at(i)).unwrap();
        assert!(!annotation.is_ground_truth);
        assert_eq!(annotation.bbox, Some(bbox));
    }
    // the later ground truth is untouched
    assert!(timeline.at(1.).unwrap().is_ground_truth);
}

#[test]
fn test_absent_without_ground_truth() {
    let mut tracker = session(SyntheticVideo::new(64, 64, 2., 11), 50);
    play(&mut tracker, 0..=3);
    assert!(tracker.get_objects(at(3)).unwrap().objects.is_empty());

    let id = tracker.add_object();
    let result = tracker.get_objects(at(3)).unwrap();
    assert_eq!(result.objects.len(), 1);
    assert_eq!(result.objects[0].object_id, id);
    assert!(!result.objects[0].annotation.is_visible());
    assert_eq!(tracker.stats().flow_tracks, 0);
}

#[test]
fn test_box_follows_moving_texture() {
    // 2 px per frame to the right, 1 px per frame down
    let video = SyntheticVideo::new(160, 120, 2., 4).with_sprite(
        Vector2d::new(20., 10.),
        100,
        80,
        Vector2d::new(20., 10.),
        5,
    );
    let sprite = video.sprite_box(0.).unwrap();
    let expected = video.sprite_box(0.5).unwrap();
    let mut tracker = session(video, 50);

    // the inner part of the sprite, so every flow window sees only the sprite
    let inset = 20.;
    let bbox = BoundingBox::new(
        sprite.x + inset,
        sprite.y + inset,
        sprite.width - 2. * inset,
        sprite.height - 2. * inset,
    );
    let id = tracker.add_object();
    tracker.set_ground_truth(id, 0., Some(bbox));
    play(&mut tracker, 0..=5);

    let tracked = tracker.get_objects(at(5)).unwrap().get(id).unwrap().bbox.unwrap();
    assert!((tracked.x - (expected.x + inset)).abs() <= 1., "{tracked:?}");
    assert!((tracked.y - (expected.y + inset)).abs() <= 1., "{tracked:?}");
    assert_eq!(tracked.width, bbox.width);
    assert_eq!(tracked.height, bbox.height);
}

#[test]
fn test_lost_box_until_next_ground_truth() {
    let mut tracker = session(SyntheticVideo::new(64, 64, 2., 2), 50);
    let lost = tracker.add_object();
    let kept = tracker.add_object();
    // squeezed against the right border, nothing remains after clamping
    tracker.set_ground_truth(lost, 0., Some(BoundingBox::new(62., 20., 5., 5.)));
    tracker.set_ground_truth(kept, 0., Some(BoundingBox::new(20., 20., 12., 12.)));
    play(&mut tracker, 0..=4);

    let result = tracker.get_objects(at(3)).unwrap();
    assert!(!result.get(lost).unwrap().is_visible());
    assert!(result.get(kept).unwrap().is_visible());
    for i in 1..=3 {
        assert!(!tracker.timeline(lost).unwrap().at(at(i)).unwrap().is_visible());
    }

    // a new ground truth brings it back for the frames after it
    let bbox = BoundingBox::new(30., 30., 10., 10.);
    tracker.set_ground_truth(lost, at(2), Some(bbox));
    let result = tracker.get_objects(at(4)).unwrap();
    assert_eq!(result.get(lost).unwrap().bbox, Some(bbox));
    assert!(!tracker.timeline(lost).unwrap().at(at(1)).unwrap().is_visible());
}

#[test]
fn test_repeated_queries_are_idempotent() {
    let mut tracker = session(SyntheticVideo::new(64, 64, 2., 6), 50);
    let id = tracker.add_object();
    tracker.set_ground_truth(id, 0., Some(BoundingBox::new(16., 16., 20., 20.)));
    play(&mut tracker, 0..=6);

    let first = tracker.get_objects(at(6)).unwrap();
    let stats = tracker.stats();
    assert_eq!(stats.flow_tracks, 6);

    let second = tracker.get_objects(at(6)).unwrap();
    assert_eq!(first, second);
    assert_eq!(tracker.stats(), stats);

    // an earlier frame is already known, nothing is tracked again
    tracker.get_objects(at(3)).unwrap();
    assert_eq!(tracker.stats(), stats);
}

#[test]
fn test_ground_truth_invalidates_later_computed_boxes() {
    let mut tracker = session(SyntheticVideo::new(64, 64, 2., 6), 50);
    let id = tracker.add_object();
    tracker.set_ground_truth(id, 0., Some(BoundingBox::new(16., 16., 20., 20.)));
    tracker.set_ground_truth(id, at(8), None);
    play(&mut tracker, 0..=6);
    tracker.get_objects(at(6)).unwrap();
    assert_eq!(tracker.timeline(id).unwrap().len(), 8);

    let bbox = BoundingBox::new(10., 12., 14., 16.);
    tracker.set_ground_truth(id, at(3), Some(bbox));
    let timeline = tracker.timeline(id).unwrap();
    let times: Vec<f64> = timeline.annotations().iter().map(|a| a.time).collect();
    assert_eq!(times.len(), 5);
    for (time, expected) in times.iter().zip([0, 1, 2, 3, 8]) {
        assert!(close(*time, at(expected)));
    }
    assert!(timeline.at(at(8)).unwrap().is_ground_truth);

    // tracked again from the new ground truth
    let tracks = tracker.stats().flow_tracks;
    let result = tracker.get_objects(at(6)).unwrap();
    assert_eq!(result.get(id).unwrap().bbox, Some(bbox));
    assert_eq!(tracker.stats().flow_tracks, tracks + 3);
}

#[test]
fn test_tracking_survives_eviction() {
    let mut tracker = session(SyntheticVideo::new(64, 64, 3., 9), 4);
    let id = tracker.add_object();
    let bbox = BoundingBox::new(16., 16., 20., 20.);
    tracker.set_ground_truth(id, 0., Some(bbox));
    play(&mut tracker, 0..=12);
    assert_eq!(tracker.frames().cached_len(), 4);

    // evicted frames are decoded again on the way
    let result = tracker.get_objects(at(12)).unwrap();
    assert_eq!(result.get(id).unwrap().bbox, Some(bbox));
    assert!(tracker.frames().cached_len() <= 4);
    assert_eq!(tracker.stats().flow_tracks, 12);
}

#[test]
fn test_seeking_back_forgets_later_frames() {
    let mut tracker = session(SyntheticVideo::new(64, 64, 2., 3), 50);
    let id = tracker.add_object();
    tracker.set_ground_truth(id, 0., Some(BoundingBox::new(16., 16., 20., 20.)));
    play(&mut tracker, 0..=8);

    tracker.frames_mut().seek(at(4)).unwrap();
    tracker.frames_mut().capture();
    assert_eq!(tracker.frames().known_times().len(), 5);

    // the walk stops at the latest known frame
    let result = tracker.get_objects(at(8)).unwrap();
    assert!(close(result.time, at(4)));
    assert!(result.get(id).unwrap().is_visible());
    assert!(tracker.timeline(id).unwrap().at(at(4)).is_some());
    assert!(tracker.timeline(id).unwrap().at(at(6)).is_none());
}

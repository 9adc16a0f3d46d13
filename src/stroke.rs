//! Derivation of `ShaderPaintPoint`s from raw touch samples.
//!
//! Tracks one pointer at a time. The first sample of a stroke has zero speed
//! and distance; later samples carry rolling averages of size and speed and
//! the accumulated Chebyshev distance travelled.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::point::{Coordinate, PaintPoint, ShaderPaintPoint};
use crate::point_queue::PointQueue;
use crate::rolling_average::RollingAverage;

/// A raw event from the touch-capture side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SampleEvent {
    Point {
        pointer: u32,
        x: f32,
        y: f32,
        time: f32,
        size: f32,
    },
    /// The pointer was lifted.
    Up { pointer: u32 },
}

impl SampleEvent {
    pub fn point(pointer: u32, sample: PaintPoint) -> Self {
        SampleEvent::Point {
            pointer,
            x: sample.pos.x,
            y: sample.pos.y,
            time: sample.time,
            size: sample.size,
        }
    }
}

/// What the tracker produced for one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrokeStep {
    Sample(ShaderPaintPoint),
    End,
    Ignored,
}

pub struct StrokeTracker {
    active_pointer: Option<u32>,
    last: Option<ShaderPaintPoint>,
    size_avg: RollingAverage,
    speed_avg: RollingAverage,
    next_counter: u32,
}

impl StrokeTracker {
    pub fn new(size_window: usize, speed_window: usize) -> Self {
        Self {
            active_pointer: None,
            last: None,
            size_avg: RollingAverage::new(size_window),
            speed_avg: RollingAverage::new(speed_window),
            next_counter: 0,
        }
    }

    pub fn active_pointer(&self) -> Option<u32> {
        self.active_pointer
    }

    pub fn step(&mut self, event: SampleEvent) -> StrokeStep {
        match event {
            SampleEvent::Point { pointer, x, y, time, size } => {
                if self.active_pointer.is_some_and(|p| p != pointer) {
                    return StrokeStep::Ignored;
                }
                let pos = Coordinate::new(x, y);
                let point = match self.last {
                    Some(prev) => {
                        let displacement = (Vec2::from(prev.pos) - Vec2::from(pos)).length();
                        ShaderPaintPoint {
                            pos,
                            time,
                            size: self.size_avg.push(size),
                            speed: self.speed_avg.push(displacement),
                            distance: prev.distance + prev.pos.chebyshev(pos),
                            counter: prev.counter,
                        }
                    }
                    None => {
                        self.active_pointer = Some(pointer);
                        let counter = self.next_counter;
                        self.next_counter += 1;
                        self.size_avg.push(size);
                        log::debug!("stroke {} started by pointer {}", counter, pointer);
                        ShaderPaintPoint {
                            pos,
                            time,
                            size,
                            speed: 0.0,
                            distance: 0.0,
                            counter: counter as f32,
                        }
                    }
                };
                self.last = Some(point);
                StrokeStep::Sample(point)
            }
            SampleEvent::Up { pointer } => {
                if self.active_pointer != Some(pointer) {
                    return StrokeStep::Ignored;
                }
                self.active_pointer = None;
                self.last = None;
                self.size_avg.clear();
                self.speed_avg.clear();
                StrokeStep::End
            }
        }
    }

    /// Feed an event straight into a point queue.
    pub fn feed(&mut self, event: SampleEvent, queue: &mut PointQueue) {
        match self.step(event) {
            StrokeStep::Sample(p) => queue.push(p),
            StrokeStep::End => queue.end_stroke(),
            StrokeStep::Ignored => {}
        }
    }
}

impl Default for StrokeTracker {
    fn default() -> Self {
        Self::new(16, 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down(pointer: u32, x: f32, y: f32, size: f32) -> SampleEvent {
        SampleEvent::Point { pointer, x, y, time: 0.0, size }
    }

    #[test]
    fn test_first_sample_of_stroke() {
        let mut tracker = StrokeTracker::default();
        let StrokeStep::Sample(p) = tracker.step(down(3, 10.0, 20.0, 4.0)) else {
            panic!("expected a sample");
        };
        assert_eq!(p.pos, Coordinate::new(10.0, 20.0));
        assert_eq!(p.size, 4.0);
        assert_eq!(p.speed, 0.0);
        assert_eq!(p.distance, 0.0);
        assert_eq!(p.counter, 0.0);
        assert_eq!(tracker.active_pointer(), Some(3));
    }

    #[test]
    fn test_derived_fields() {
        let mut tracker = StrokeTracker::default();
        tracker.step(down(0, 0.0, 0.0, 2.0));
        let StrokeStep::Sample(p) = tracker.step(down(0, 3.0, 4.0, 4.0)) else {
            panic!("expected a sample");
        };
        assert_eq!(p.size, 3.0);
        assert_eq!(p.speed, 5.0);
        assert_eq!(p.distance, 4.0);

        let StrokeStep::Sample(p) = tracker.step(down(0, 3.0, 5.0, 6.0)) else {
            panic!("expected a sample");
        };
        assert_eq!(p.size, 4.0);
        assert_eq!(p.speed, 3.0);
        assert_eq!(p.distance, 5.0);
    }

    #[test]
    fn test_counter_increments_per_stroke() {
        let mut tracker = StrokeTracker::default();
        tracker.step(down(0, 0.0, 0.0, 1.0));
        assert_eq!(tracker.step(SampleEvent::Up { pointer: 0 }), StrokeStep::End);
        let StrokeStep::Sample(p) = tracker.step(down(1, 5.0, 5.0, 1.0)) else {
            panic!("expected a sample");
        };
        assert_eq!(p.counter, 1.0);
        assert_eq!(p.distance, 0.0);
    }

    #[test]
    fn test_second_pointer_ignored() {
        let mut tracker = StrokeTracker::default();
        tracker.step(down(0, 0.0, 0.0, 1.0));
        assert_eq!(tracker.step(down(1, 9.0, 9.0, 1.0)), StrokeStep::Ignored);
        assert_eq!(tracker.step(SampleEvent::Up { pointer: 1 }), StrokeStep::Ignored);
    }

    #[test]
    fn test_feed_into_queue() {
        let mut tracker = StrokeTracker::default();
        let mut queue = PointQueue::new();
        tracker.feed(down(0, 0.0, 0.0, 1.0), &mut queue);
        tracker.feed(down(0, 1.0, 0.0, 1.0), &mut queue);
        tracker.feed(SampleEvent::Up { pointer: 0 }, &mut queue);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_event_json() {
        let json = r#"[{"kind":"point","pointer":0,"x":1.0,"y":2.0,"time":0.5,"size":3.0},{"kind":"up","pointer":0}]"#;
        let events: Vec<SampleEvent> = serde_json::from_str(json).unwrap();
        assert_eq!(events[1], SampleEvent::Up { pointer: 0 });
        assert!(matches!(events[0], SampleEvent::Point { x, .. } if x == 1.0));
    }
}

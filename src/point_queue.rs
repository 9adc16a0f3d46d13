//! Pending sample buffer owned by the render thread.
//!
//! Between frames the queue holds fresh samples plus, if a sample was left
//! unconsumed, exactly one anchor carried over from the previous frame so the
//! first pair of the next frame continues the stroke.

use std::collections::VecDeque;

use crate::point::ShaderPaintPoint;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Entry {
    Sample(ShaderPaintPoint),
    /// Stroke boundary: the sample after it does not pair with the one before.
    Break,
}

/// Result of pulling from the queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pull {
    Empty,
    /// Only the anchor remains. It is left in the queue.
    Anchor(ShaderPaintPoint),
    /// A consecutive pair. The first sample is consumed, the second stays as the new anchor.
    Pair(ShaderPaintPoint, ShaderPaintPoint),
}

impl Pull {
    /// Number of samples returned, as seen by `pullPointPair`.
    pub fn count(&self) -> i64 {
        match self {
            Pull::Empty => 0,
            Pull::Anchor(_) => 1,
            Pull::Pair(..) => 2,
        }
    }
}

#[derive(Debug, Default)]
pub struct PointQueue {
    entries: VecDeque<Entry>,
}

impl PointQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, point: ShaderPaintPoint) {
        self.entries.push_back(Entry::Sample(point));
    }

    /// Mark the end of the current stroke. Consecutive breaks collapse.
    pub fn end_stroke(&mut self) {
        if !matches!(self.entries.back(), None | Some(Entry::Break)) {
            self.entries.push_back(Entry::Break);
        }
    }

    /// Pull the next pair, skipping strokes that ended before they could form one.
    pub fn pull(&mut self) -> Pull {
        loop {
            match (self.entries.front().copied(), self.entries.get(1).copied()) {
                (None, _) => return Pull::Empty,
                (Some(Entry::Break), _) => {
                    self.entries.pop_front();
                }
                (Some(Entry::Sample(a)), None) => return Pull::Anchor(a),
                (Some(Entry::Sample(a)), Some(Entry::Sample(b))) => {
                    self.entries.pop_front();
                    return Pull::Pair(a, b);
                }
                (Some(Entry::Sample(_)), Some(Entry::Break)) => {
                    self.entries.pop_front();
                    self.entries.pop_front();
                }
            }
        }
    }

    /// Consume every remaining pair without returning them, keeping the final
    /// sample as the anchor. Returns how many pairs were skipped.
    pub fn skip_pairs(&mut self) -> usize {
        let mut skipped = 0;
        while let Pull::Pair(..) = self.pull() {
            skipped += 1;
        }
        skipped
    }

    /// The sample that would seed the next pair, if any.
    pub fn anchor(&self) -> Option<ShaderPaintPoint> {
        match self.entries.front() {
            Some(Entry::Sample(p)) => Some(*p),
            _ => None,
        }
    }

    /// Number of queued samples (breaks excluded).
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Sample(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

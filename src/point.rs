//! Point types shared between the host and sandboxed scripts.
//!
//! `ShaderPaintPoint` is the cross-boundary ABI: seven packed `f32`s in the
//! fixed order `(x, y, time, size, speed, distance, counter)`. Output layers are
//! handed to the GPU path as raw bytes in exactly this layout.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Size in bytes of one `ShaderPaintPoint` on the wire.
pub const SHADER_POINT_SIZE: usize = 7 * std::mem::size_of::<f32>();

/// Field names in wire order. Never reorder.
pub const SHADER_POINT_FIELDS: [&str; 7] = ["x", "y", "time", "size", "speed", "distance", "counter"];

#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Coordinate {
    pub x: f32,
    pub y: f32,
}

impl Coordinate {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance, used for stroke distance and line step counts.
    pub fn chebyshev(self, other: Coordinate) -> f32 {
        let d = (Vec2::from(self) - Vec2::from(other)).abs();
        d.x.max(d.y)
    }
}

impl From<Coordinate> for Vec2 {
    fn from(c: Coordinate) -> Self {
        Vec2::new(c.x, c.y)
    }
}

impl From<Vec2> for Coordinate {
    fn from(v: Vec2) -> Self {
        Coordinate { x: v.x, y: v.y }
    }
}

/// Raw touch sample, and the reduced `{pos, time, size}` layer variant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct PaintPoint {
    pub pos: Coordinate,
    /// Seconds.
    pub time: f32,
    pub size: f32,
}

/// One brush-stroke sample plus derived temporal/geometric fields.
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct ShaderPaintPoint {
    pub pos: Coordinate,
    pub time: f32,
    pub size: f32,
    pub speed: f32,
    pub distance: f32,
    pub counter: f32,
}

impl ShaderPaintPoint {
    pub fn new(x: f32, y: f32, time: f32, size: f32, speed: f32, distance: f32, counter: f32) -> Self {
        Self {
            pos: Coordinate { x, y },
            time,
            size,
            speed,
            distance,
            counter,
        }
    }

    /// Fields in wire order.
    pub fn to_array(&self) -> [f32; 7] {
        [
            self.pos.x,
            self.pos.y,
            self.time,
            self.size,
            self.speed,
            self.distance,
            self.counter,
        ]
    }

    pub fn from_array(v: [f32; 7]) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4], v[5], v[6])
    }

    /// Bit-exact comparison, so NaN payloads and signed zeros count.
    pub fn bits_eq(&self, other: &ShaderPaintPoint) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl From<ShaderPaintPoint> for PaintPoint {
    fn from(p: ShaderPaintPoint) -> Self {
        PaintPoint {
            pos: p.pos,
            time: p.time,
            size: p.size,
        }
    }
}

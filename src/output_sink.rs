//! Per-layer output buffers filled by scripts and read by the GPU submission path.

use crate::point::{PaintPoint, ShaderPaintPoint};

/// Index of the base layer. It always exists.
pub const BASE_LAYER: usize = 0;

/// Append-only (from the script side) point buffers, one per paint layer.
#[derive(Debug, Clone)]
pub struct OutputSink {
    layers: Vec<Vec<ShaderPaintPoint>>,
}

/// Per-layer lengths captured before a script call, used to roll back its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkMark(Vec<usize>);

impl OutputSink {
    pub fn new() -> Self {
        Self::with_layers(1)
    }

    /// Create a sink with `count` layers (at least the base layer).
    pub fn with_layers(count: usize) -> Self {
        Self {
            layers: vec![Vec::new(); count.max(1)],
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Append a layer and return its index.
    pub fn add_layer(&mut self) -> usize {
        self.layers.push(Vec::new());
        self.layers.len() - 1
    }

    /// Drop every layer except the base layer.
    pub fn clear_layers(&mut self) {
        self.layers.truncate(1);
    }

    /// Push a point onto `layer`. Returns false if the layer does not exist.
    pub fn push(&mut self, layer: usize, point: ShaderPaintPoint) -> bool {
        match self.layers.get_mut(layer) {
            Some(points) => {
                points.push(point);
                true
            }
            None => false,
        }
    }

    pub fn layer(&self, layer: usize) -> &[ShaderPaintPoint] {
        self.layers.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A layer in the reduced `{pos, time, size}` protocol.
    pub fn layer_paint_points(&self, layer: usize) -> Vec<PaintPoint> {
        self.layer(layer).iter().copied().map(PaintPoint::from).collect()
    }

    /// A layer as raw bytes in the 28-byte wire layout.
    pub fn layer_bytes(&self, layer: usize) -> &[u8] {
        bytemuck::cast_slice(self.layer(layer))
    }

    /// Total number of points across all layers.
    pub fn total_points(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    pub fn mark(&self) -> SinkMark {
        SinkMark(self.layers.iter().map(Vec::len).collect())
    }

    /// Discard everything pushed since `mark`.
    pub fn rollback(&mut self, mark: &SinkMark) {
        for (points, &len) in self.layers.iter_mut().zip(mark.0.iter()) {
            points.truncate(len);
        }
    }

    /// Hand the frame's points to the caller, leaving empty layers behind.
    pub fn take_layers(&mut self) -> Vec<Vec<ShaderPaintPoint>> {
        let count = self.layers.len();
        std::mem::replace(&mut self.layers, vec![Vec::new(); count])
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::new()
    }
}

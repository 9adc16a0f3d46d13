use serde::Deserialize;

use crate::script_log::DEFAULT_MAX_LOGS_PER_FRAME;

/// Resource limits applied to the script engine.
///
/// `max_operations` bounds the work a single script call may do, so a script
/// that never terminates fails with an error instead of stalling the frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_string_size: 10_000,
            max_array_size: 10_000,
            max_map_size: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InterpolatorConfig {
    pub limits: SandboxLimits,
    pub max_logs_per_frame: u32,
    /// Output layers created up front, including the base layer.
    pub layers: usize,
    /// Rolling-average window for stroke size.
    pub size_window: usize,
    /// Rolling-average window for stroke speed.
    pub speed_window: usize,
}

impl Default for InterpolatorConfig {
    fn default() -> Self {
        Self {
            limits: SandboxLimits::default(),
            max_logs_per_frame: DEFAULT_MAX_LOGS_PER_FRAME,
            layers: 1,
            size_window: 16,
            speed_window: 16,
        }
    }
}

impl InterpolatorConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

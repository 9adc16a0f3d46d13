// Point data and the wire layout
pub mod point;
pub mod point_queue;
pub mod output_sink;
pub mod rolling_average;
pub mod stroke;

// Scripting
pub mod config;
pub mod error;
pub mod point_rhai;
pub mod script_log;
pub mod script_diagnostics;
pub mod script_host;
pub mod script_registry;

// Frame driver
pub mod commands;
pub mod interpolator;

pub mod cli;

pub use config::{InterpolatorConfig, SandboxLimits};
pub use error::{ClientError, CompileError, HandleError, RuntimeError};
pub use interpolator::{FrameReport, Interpolator};
pub use point::{Coordinate, PaintPoint, ShaderPaintPoint};
pub use script_registry::{ScriptHandle, ScriptRegistry};

use thiserror::Error;

use crate::script_diagnostics::{ScriptDiagnostic, ScriptDiagnosticKind};
use crate::script_registry::ScriptHandle;

/// Reported to the caller of `compile`. Never disturbs the active script.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("syntax error: {0}")]
    Syntax(ScriptDiagnostic),
    #[error("script does not define fn main(a, b, width, height, sink)")]
    MissingEntryPoint,
    #[error("script failed while running its top-level statements: {0}")]
    Startup(ScriptDiagnostic),
}

impl CompileError {
    pub fn diagnostic(&self) -> ScriptDiagnostic {
        match self {
            CompileError::Syntax(d) | CompileError::Startup(d) => d.clone(),
            CompileError::MissingEntryPoint => crate::script_diagnostics::missing_entry_point(),
        }
    }
}

/// A script failure during a frame. Caught at the driver boundary.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("script exception: {0}")]
    ScriptException(ScriptDiagnostic),
    #[error("boundary type mismatch: {0}")]
    BoundaryTypeMismatch(ScriptDiagnostic),
}

impl RuntimeError {
    pub fn diagnostic(&self) -> &ScriptDiagnostic {
        match self {
            RuntimeError::ScriptException(d) | RuntimeError::BoundaryTypeMismatch(d) => d,
        }
    }
}

impl From<ScriptDiagnostic> for RuntimeError {
    fn from(diag: ScriptDiagnostic) -> Self {
        match diag.kind {
            ScriptDiagnosticKind::BoundaryTypeMismatch => RuntimeError::BoundaryTypeMismatch(diag),
            _ => RuntimeError::ScriptException(diag),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("unknown script handle {0}")]
    UnknownHandle(ScriptHandle),
}

/// The render thread that owns the interpolator has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("interpolator is no longer running")]
    Disconnected,
}

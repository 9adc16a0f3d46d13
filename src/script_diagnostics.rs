//! Structured script diagnostics.
//!
//! Rhai provides rich error types (parse + runtime) with positions. These are
//! wrapped into a stable, JSON-serializable diagnostic format so a host UI can
//! surface script problems without reading Rust logs.

use rhai::{EvalAltResult, Position};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptDiagnosticKind {
    /// Syntax/parse errors (compile time).
    ParseError,
    /// The script compiled but does not define `main(a, b, width, height, sink)`.
    MissingEntryPoint,
    /// Runtime errors in user code, including operation-limit aborts.
    ScriptException,
    /// A value crossing the host boundary had the wrong type or shape
    /// (wrong argument types, unknown point field, bad layer index).
    BoundaryTypeMismatch,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPhase {
    Compile,
    /// Top-level statements run once right after compilation.
    Startup,
    OnFrame,
    Main,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScriptLocation {
    /// 1-based line number in the user script.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptDiagnostic {
    pub kind: ScriptDiagnosticKind,
    pub phase: ScriptPhase,
    /// Error text without the engine's position suffix.
    pub message: String,
    pub location: Option<ScriptLocation>,
    /// Raw engine error string (useful for bug reports).
    #[serde(default)]
    pub raw: Option<String>,
}

impl std::fmt::Display for ScriptDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{} (line {}, column {})", self.message, loc.line, loc.column),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Prefix used by host functions when rejecting a value at the boundary.
pub const BOUNDARY_ERROR_PREFIX: &str = "boundary:";

/// Host functions and constructors scripts reach across the boundary.
const BOUNDARY_FUNCTIONS: &[&str] = &["pushPoint", "pullPointPair", "log", "ShaderPaintPoint", "PointPairBuffer"];

/// Walk through nested function-call errors to the error that actually happened.
fn innermost(err: &EvalAltResult) -> &EvalAltResult {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => innermost(inner),
        _ => err,
    }
}

/// Whether a missing-function signature names part of the host surface
/// rather than a function the script itself should have defined.
fn is_boundary_signature(signature: &str) -> bool {
    let name = signature
        .split(|c: char| c == ' ' || c == '(')
        .next()
        .unwrap_or_default();
    BOUNDARY_FUNCTIONS.contains(&name)
        || name.starts_with("index$")
        || name.starts_with("get$")
        || name.starts_with("set$")
}

fn classify(err: &EvalAltResult) -> ScriptDiagnosticKind {
    match innermost(err) {
        EvalAltResult::ErrorMismatchDataType(..)
        | EvalAltResult::ErrorMismatchOutputType(..)
        | EvalAltResult::ErrorPropertyNotFound(..)
        | EvalAltResult::ErrorIndexingType(..)
        | EvalAltResult::ErrorArrayBounds(..) => ScriptDiagnosticKind::BoundaryTypeMismatch,
        EvalAltResult::ErrorFunctionNotFound(signature, _) if is_boundary_signature(signature) => {
            ScriptDiagnosticKind::BoundaryTypeMismatch
        }
        EvalAltResult::ErrorRuntime(value, _)
            if value
                .clone()
                .into_string()
                .is_ok_and(|s| s.starts_with(BOUNDARY_ERROR_PREFIX)) =>
        {
            ScriptDiagnosticKind::BoundaryTypeMismatch
        }
        _ => ScriptDiagnosticKind::ScriptException,
    }
}

/// Where to report an error. Errors raised inside a prelude helper are
/// reported at the user's call into that helper.
fn user_position(err: &EvalAltResult, prelude_helpers: &[String]) -> Position {
    match err {
        EvalAltResult::ErrorInFunctionCall(name, _, inner, pos) => {
            if !pos.is_none() && prelude_helpers.iter().any(|h| h == name) {
                return *pos;
            }
            let inner_pos = user_position(inner, prelude_helpers);
            if inner_pos.is_none() {
                *pos
            } else {
                inner_pos
            }
        }
        _ => err.position(),
    }
}

/// Drop the trailing " (line N, position M)" the engine appends to its messages.
fn strip_position(text: &str) -> &str {
    match text.rfind(" (line ") {
        Some(idx) if text.ends_with(')') => &text[..idx],
        _ => text,
    }
}

fn to_location(pos: Position) -> Option<ScriptLocation> {
    let line = pos.line()? as u32;
    Some(ScriptLocation {
        line,
        column: (pos.position().unwrap_or(0) as u32).max(1),
    })
}

pub fn from_parse_error(err: &rhai::ParseError) -> ScriptDiagnostic {
    let raw = err.to_string();
    ScriptDiagnostic {
        kind: ScriptDiagnosticKind::ParseError,
        phase: ScriptPhase::Compile,
        message: strip_position(&raw).to_string(),
        location: to_location(err.position()),
        raw: Some(raw),
    }
}

/// `prelude_helpers` lists the prelude functions the script did not replace.
pub fn from_eval_error(phase: ScriptPhase, err: &EvalAltResult, prelude_helpers: &[String]) -> ScriptDiagnostic {
    let message = innermost(err).to_string();
    ScriptDiagnostic {
        kind: classify(err),
        phase,
        message: strip_position(&message).to_string(),
        location: to_location(user_position(err, prelude_helpers)),
        raw: Some(err.to_string()),
    }
}

pub fn missing_entry_point() -> ScriptDiagnostic {
    ScriptDiagnostic {
        kind: ScriptDiagnosticKind::MissingEntryPoint,
        phase: ScriptPhase::Compile,
        message: "script must define fn main(a, b, width, height, sink)".to_string(),
        location: None,
        raw: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::Dynamic;

    fn helpers() -> Vec<String> {
        vec!["pushLine".to_string(), "lerpPoint".to_string()]
    }

    #[test]
    fn test_classify_runtime_errors() {
        let err = EvalAltResult::ErrorRuntime(Dynamic::from("oops"), Position::NONE);
        assert_eq!(classify(&err), ScriptDiagnosticKind::ScriptException);

        let err = EvalAltResult::ErrorRuntime(
            Dynamic::from(format!("{} layer 9 does not exist", BOUNDARY_ERROR_PREFIX)),
            Position::NONE,
        );
        assert_eq!(classify(&err), ScriptDiagnosticKind::BoundaryTypeMismatch);

        let err = EvalAltResult::ErrorPropertyNotFound("speedx".into(), Position::NONE);
        assert_eq!(classify(&err), ScriptDiagnosticKind::BoundaryTypeMismatch);
    }

    #[test]
    fn test_missing_function_kind_depends_on_name() {
        let err = EvalAltResult::ErrorFunctionNotFound("helperTypo (ShaderPaintPoint)".into(), Position::NONE);
        assert_eq!(classify(&err), ScriptDiagnosticKind::ScriptException);

        let err = EvalAltResult::ErrorFunctionNotFound(
            "pushPoint (FrameSink, i64, string)".into(),
            Position::NONE,
        );
        assert_eq!(classify(&err), ScriptDiagnosticKind::BoundaryTypeMismatch);

        let err = EvalAltResult::ErrorFunctionNotFound("index$get$ (PointPairBuffer, string)".into(), Position::NONE);
        assert_eq!(classify(&err), ScriptDiagnosticKind::BoundaryTypeMismatch);
    }

    #[test]
    fn test_nested_call_is_unwrapped() {
        let inner = EvalAltResult::ErrorMismatchDataType("f32".into(), "string".into(), Position::NONE);
        let err = EvalAltResult::ErrorInFunctionCall("main".into(), String::new(), Box::new(inner), Position::NONE);
        assert_eq!(classify(&err), ScriptDiagnosticKind::BoundaryTypeMismatch);
    }

    #[test]
    fn test_error_inside_helper_reported_at_call_site() {
        let inner = EvalAltResult::ErrorRuntime(
            Dynamic::from(format!("{} pushPoint: layer 4 does not exist", BOUNDARY_ERROR_PREFIX)),
            Position::new(20, 9),
        );
        let err = EvalAltResult::ErrorInFunctionCall("pushLine".into(), String::new(), Box::new(inner), Position::new(2, 5));

        let diag = from_eval_error(ScriptPhase::Main, &err, &helpers());
        assert_eq!(diag.location, Some(ScriptLocation { line: 2, column: 5 }));
        assert_eq!(diag.kind, ScriptDiagnosticKind::BoundaryTypeMismatch);

        // A script-defined pushLine is user code: report the real position.
        let diag = from_eval_error(ScriptPhase::Main, &err, &[]);
        assert_eq!(diag.location, Some(ScriptLocation { line: 20, column: 9 }));
    }

    #[test]
    fn test_message_has_single_position() {
        let err = EvalAltResult::ErrorRuntime(Dynamic::from("bad pair"), Position::new(3, 7));
        let diag = from_eval_error(ScriptPhase::Main, &err, &[]);
        assert!(!diag.message.contains("(line"));
        assert_eq!(diag.to_string().matches("line").count(), 1);
        assert!(diag.raw.as_deref().is_some_and(|raw| raw.contains("line 3")));
    }

    #[test]
    fn test_strip_position() {
        assert_eq!(strip_position("Unknown variable: x (line 2, position 5)"), "Unknown variable: x");
        assert_eq!(strip_position("no position here"), "no position here");
        assert_eq!(to_location(Position::NONE), None);
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&missing_entry_point()).unwrap();
        assert!(json.contains("\"missing_entry_point\""));
        assert!(json.contains("\"compile\""));
    }
}

//! The sandboxed Rhai engine shared by every compiled script.
//!
//! One engine is created per registry, lazily on the first compile. Each
//! script is compiled into its own AST and runs its top-level statements once
//! in its own scope; that (AST, scope) pair is the script's snapshot. Nothing
//! is looked up in a shared namespace afterwards, so compiling or unloading one
//! script can never change what another script's `main` does.
//!
//! Every script is merged over a small prelude. The prelude only defines
//! helpers in script code on top of the host capabilities; it adds no host
//! functions of its own. A script that defines a function with the same name
//! and arity as a helper replaces it.

use rhai::{CallFnOptions, Dynamic, Engine, FuncArgs, Scope, AST};

use crate::config::SandboxLimits;
use crate::error::CompileError;
use crate::point_rhai::{register_capabilities, register_point_api};
use crate::script_diagnostics::{from_eval_error, from_parse_error, ScriptDiagnostic, ScriptPhase};
use crate::script_log::{script_log, LogLevel};

/// Helpers available to every script.
pub const PRELUDE: &str = r#"// ShaderPaintPoint fields, in wire order: x, y, time, size, speed, distance, counter

// Linear blend of every point field.
fn lerpPoint(a, b, t) {
    let p = a;
    p.x = a.x + (b.x - a.x) * t;
    p.y = a.y + (b.y - a.y) * t;
    p.time = a.time + (b.time - a.time) * t;
    p.size = a.size + (b.size - a.size) * t;
    p.speed = a.speed + (b.speed - a.speed) * t;
    p.distance = a.distance + (b.distance - a.distance) * t;
    p.counter = a.counter + (b.counter - a.counter) * t;
    p
}

// Push evenly spaced points from a toward b (b excluded), one per pixel of
// the larger axis distance.
fn pushLine(sink, layer, a, b) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    if dx < 0.0 { dx = -dx; }
    if dy < 0.0 { dy = -dy; }
    let count = if dx > dy { dx.to_int() } else { dy.to_int() };
    if count <= 0 {
        return;
    }
    let n = count.to_float();
    for i in 0..count {
        pushPoint(sink, layer, lerpPoint(a, b, i.to_float() / n));
    }
}
"#;

/// Name and arity of the required entry point.
pub const MAIN_FN: (&str, usize) = ("main", 5);
/// Name and arity of the optional per-frame hook.
pub const ONFRAME_FN: (&str, usize) = ("onframe", 3);

/// A script's compile-time snapshot.
#[derive(Debug)]
pub struct CompiledScript {
    ast: AST,
    scope: Scope<'static>,
    has_onframe: bool,
    /// Prelude functions the script did not replace.
    prelude_helpers: Vec<String>,
}

impl CompiledScript {
    pub fn has_onframe(&self) -> bool {
        self.has_onframe
    }
}

pub struct ScriptHost {
    engine: Engine,
    prelude: AST,
}

impl ScriptHost {
    /// Create the engine with sandboxed settings and the fixed capability surface.
    pub fn new(limits: &SandboxLimits) -> Self {
        let mut engine = Engine::new();

        // Sandbox settings
        engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_operations(limits.max_operations);
        engine.set_max_string_size(limits.max_string_size);
        engine.set_max_array_size(limits.max_array_size);
        engine.set_max_map_size(limits.max_map_size);
        engine.disable_symbol("eval");

        // print/debug go to the script log, never straight to stdout
        engine.on_print(|text| script_log(LogLevel::Info, text));
        engine.on_debug(|text, _source, pos| {
            script_log(LogLevel::Debug, &format!("{} ({})", text, pos));
        });

        register_point_api(&mut engine);
        register_capabilities(&mut engine);

        let prelude = match engine.compile(PRELUDE) {
            Ok(ast) => ast,
            Err(e) => {
                log::error!("script prelude failed to compile, helpers unavailable: {}", e);
                AST::empty()
            }
        };

        log::info!("script engine created (max {} operations per call)", limits.max_operations);

        Self { engine, prelude }
    }

    /// Names of the helper functions every script can call.
    pub fn prelude_helpers(&self) -> Vec<String> {
        self.prelude.iter_functions().map(|f| f.name.to_string()).collect()
    }

    /// Compile `source`, merge it over the prelude and run its top-level
    /// statements once in a fresh scope.
    pub fn compile(&self, source: &str) -> Result<CompiledScript, CompileError> {
        let user_ast = self
            .engine
            .compile(source)
            .map_err(|e| CompileError::Syntax(from_parse_error(&e)))?;

        let prelude_helpers: Vec<String> = self
            .prelude
            .iter_functions()
            .filter(|helper| !user_ast.iter_functions().any(|f| f.name == helper.name))
            .map(|helper| helper.name.to_string())
            .collect();

        // Later definitions win, so the script's functions replace the helpers.
        let ast = self.prelude.merge(&user_ast);

        // Fresh scope per script: nothing from an earlier compile is visible.
        let mut scope = Scope::new();
        self.engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| CompileError::Startup(from_eval_error(ScriptPhase::Startup, &e, &prelude_helpers)))?;

        if !defines(&ast, MAIN_FN) {
            return Err(CompileError::MissingEntryPoint);
        }
        let has_onframe = defines(&ast, ONFRAME_FN);

        Ok(CompiledScript {
            ast,
            scope,
            has_onframe,
            prelude_helpers,
        })
    }

    /// Call a function of a compiled script. Top-level statements are not
    /// re-run, and variables the call creates do not outlive it.
    pub fn call(
        &self,
        script: &mut CompiledScript,
        phase: ScriptPhase,
        name: &str,
        args: impl FuncArgs,
    ) -> Result<(), ScriptDiagnostic> {
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result = self
            .engine
            .call_fn_with_options::<Dynamic>(options, &mut script.scope, &script.ast, name, args);
        result
            .map(|_| ())
            .map_err(|e| from_eval_error(phase, &e, &script.prelude_helpers))
    }
}

fn defines(ast: &AST, (name, arity): (&str, usize)) -> bool {
    ast.iter_functions()
        .any(|f| f.name == name && f.params.len() == arity)
}

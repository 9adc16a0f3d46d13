//! Compiled scripts, their handles, and which one is active.
//!
//! Handles are issued from a monotonically increasing counter and never reused
//! within a process. Activation is deferred: `activate` only records the
//! request, and `begin_frame` promotes it, so the script a frame runs is fixed
//! before its first call.

use std::collections::BTreeMap;

use rhai::Dynamic;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::SandboxLimits;
use crate::error::{CompileError, HandleError, RuntimeError};
use crate::point::ShaderPaintPoint;
use crate::point_rhai::FrameSink;
use crate::script_diagnostics::{ScriptDiagnostic, ScriptPhase};
use crate::script_host::{CompiledScript, ScriptHost, MAIN_FN, ONFRAME_FN};

/// Pass-through script used whenever no script is active.
pub const DEFAULT_SCRIPT: &str = include_str!("scripts/default_interpolator.rhai");

/// Keep a bounded queue so repeated runtime errors don't grow without limit.
const MAX_DIAGNOSTICS: usize = 32;

/// Opaque identifier for a compiled script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ScriptHandle(u64);

impl ScriptHandle {
    pub fn get(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for ScriptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "script#{}", self.0)
    }
}

struct RegisteredScript {
    compiled: CompiledScript,
    source: String,
    digest: String,
}

/// Public description of a registered script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptInfo {
    pub handle: ScriptHandle,
    /// Lowercase hex SHA-256 of the source.
    pub digest: String,
    pub source_len: usize,
    pub has_onframe: bool,
    pub active: bool,
}

fn digest_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct ScriptRegistry {
    limits: SandboxLimits,
    /// Created on the first compile, dropped by `shutdown`.
    host: Option<ScriptHost>,
    scripts: BTreeMap<ScriptHandle, RegisteredScript>,
    next_handle: u64,
    active: Option<ScriptHandle>,
    /// Requested by `activate`, promoted at the next frame boundary.
    pending: Option<ScriptHandle>,
    /// Compiled lazily the first time a frame runs without an active script.
    default_script: Option<CompiledScript>,
    diagnostics: Vec<ScriptDiagnostic>,
}

impl ScriptRegistry {
    pub fn new(limits: SandboxLimits) -> Self {
        Self {
            limits,
            host: None,
            scripts: BTreeMap::new(),
            next_handle: 1,
            active: None,
            pending: None,
            default_script: None,
            diagnostics: Vec::new(),
        }
    }

    fn push_diagnostic(&mut self, diag: ScriptDiagnostic) {
        self.diagnostics.push(diag);
        if self.diagnostics.len() > MAX_DIAGNOSTICS {
            let excess = self.diagnostics.len() - MAX_DIAGNOSTICS;
            self.diagnostics.drain(0..excess);
        }
    }

    fn host(&mut self) -> &ScriptHost {
        let limits = &self.limits;
        self.host.get_or_insert_with(|| ScriptHost::new(limits))
    }

    /// Compile a script and register it under a fresh handle.
    ///
    /// On failure nothing is registered and the active script is untouched.
    pub fn compile(&mut self, source: &str) -> Result<ScriptHandle, CompileError> {
        let result = self.host().compile(source);
        let compiled = match result {
            Ok(compiled) => compiled,
            Err(e) => {
                log::warn!("script compile failed: {}", e);
                self.push_diagnostic(e.diagnostic());
                return Err(e);
            }
        };

        let handle = ScriptHandle(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);

        let digest = digest_source(source);
        log::info!(
            "compiled {} (sha256 {}, onframe: {})",
            handle,
            &digest[..12],
            compiled.has_onframe()
        );
        self.scripts.insert(
            handle,
            RegisteredScript {
                compiled,
                source: source.to_string(),
                digest,
            },
        );
        Ok(handle)
    }

    /// Release a script. Unloading the active script clears the active slot,
    /// so the next frame falls back to the default script.
    pub fn unload(&mut self, handle: ScriptHandle) -> Result<(), HandleError> {
        if self.scripts.remove(&handle).is_none() {
            return Err(HandleError::UnknownHandle(handle));
        }
        if self.active == Some(handle) {
            log::info!("unloaded active {}; falling back to the default script", handle);
            self.active = None;
        } else {
            log::info!("unloaded {}", handle);
        }
        Ok(())
    }

    /// Request that `handle` become active at the next frame boundary.
    pub fn activate(&mut self, handle: ScriptHandle) -> Result<(), HandleError> {
        if !self.scripts.contains_key(&handle) {
            return Err(HandleError::UnknownHandle(handle));
        }
        self.pending = Some(handle);
        Ok(())
    }

    /// Fix the script for the coming frame. Returns its handle, or `None` when
    /// the default script will run.
    pub fn begin_frame(&mut self) -> Result<Option<ScriptHandle>, CompileError> {
        if let Some(handle) = self.pending.take() {
            if self.scripts.contains_key(&handle) {
                if self.active != Some(handle) {
                    log::info!("activated {}", handle);
                }
                self.active = Some(handle);
            } else {
                log::warn!("{} was unloaded before it could be activated", handle);
            }
        }

        if self.active.is_none() && self.default_script.is_none() {
            let compiled = self.host().compile(DEFAULT_SCRIPT);
            self.default_script = Some(compiled?);
        }
        Ok(self.active)
    }

    fn current(&mut self) -> Option<(&ScriptHost, &mut CompiledScript)> {
        let host = self.host.as_ref()?;
        let script = match self.active {
            Some(handle) => &mut self.scripts.get_mut(&handle)?.compiled,
            None => self.default_script.as_mut()?,
        };
        Some((host, script))
    }

    fn record_failure(&mut self, diag: ScriptDiagnostic) -> RuntimeError {
        self.push_diagnostic(diag.clone());
        RuntimeError::from(diag)
    }

    /// Run the current script's `main` for one pair.
    pub fn call_main(
        &mut self,
        a: ShaderPaintPoint,
        b: ShaderPaintPoint,
        width: f32,
        height: f32,
        sink: &FrameSink,
    ) -> Result<(), RuntimeError> {
        let Some((host, script)) = self.current() else {
            return Ok(());
        };
        let result = host.call(
            script,
            ScriptPhase::Main,
            MAIN_FN.0,
            (a, b, Dynamic::from(width), Dynamic::from(height), sink.clone()),
        );
        result.map_err(|diag| self.record_failure(diag))
    }

    /// Run the current script's `onframe`, if it defines one. Returns whether
    /// it was called.
    pub fn call_onframe(&mut self, width: f32, height: f32, sink: &FrameSink) -> Result<bool, RuntimeError> {
        let Some((host, script)) = self.current() else {
            return Ok(false);
        };
        if !script.has_onframe() {
            return Ok(false);
        }
        let result = host.call(
            script,
            ScriptPhase::OnFrame,
            ONFRAME_FN.0,
            (Dynamic::from(width), Dynamic::from(height), sink.clone()),
        );
        result
            .map(|_| true)
            .map_err(|diag| self.record_failure(diag))
    }

    /// The script frames currently run. `None` means the default script.
    pub fn active(&self) -> Option<ScriptHandle> {
        self.active
    }

    pub fn contains(&self, handle: ScriptHandle) -> bool {
        self.scripts.contains_key(&handle)
    }

    pub fn handles(&self) -> Vec<ScriptHandle> {
        self.scripts.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn info(&self, handle: ScriptHandle) -> Option<ScriptInfo> {
        self.scripts.get(&handle).map(|s| ScriptInfo {
            handle,
            digest: s.digest.clone(),
            source_len: s.source.len(),
            has_onframe: s.compiled.has_onframe(),
            active: self.active == Some(handle),
        })
    }

    pub fn source(&self, handle: ScriptHandle) -> Option<&str> {
        self.scripts.get(&handle).map(|s| s.source.as_str())
    }

    /// Drain and return all pending diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<ScriptDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Drop every script and the engine. Handles issued afterwards still never
    /// repeat earlier ones.
    pub fn shutdown(&mut self) {
        let count = self.scripts.len();
        self.scripts.clear();
        self.active = None;
        self.pending = None;
        self.default_script = None;
        self.host = None;
        log::info!("script registry shut down ({} scripts released)", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;

    const PASS: &str = "fn main(a, b, w, h, sink) { pushPoint(sink, 0, a); }";

    fn registry() -> ScriptRegistry {
        ScriptRegistry::new(SandboxLimits::default())
    }

    #[test]
    fn test_handles_are_unique_and_monotonic() {
        let mut reg = registry();
        let a = reg.compile(PASS).unwrap();
        let b = reg.compile(PASS).unwrap();
        assert_ne!(a, b);
        reg.unload(a).unwrap();
        let c = reg.compile(PASS).unwrap();
        assert!(c > b);
        assert_eq!(reg.handles(), vec![b, c]);
    }

    #[test]
    fn test_failed_compile_registers_nothing() {
        let mut reg = registry();
        assert!(matches!(reg.compile("fn main( {"), Err(CompileError::Syntax(_))));
        assert!(matches!(reg.compile("let x = 1;"), Err(CompileError::MissingEntryPoint)));
        assert!(reg.is_empty());
        assert_eq!(reg.take_diagnostics().len(), 2);
        assert!(reg.take_diagnostics().is_empty());
    }

    #[test]
    fn test_activation_is_deferred() {
        let mut reg = registry();
        let h = reg.compile(PASS).unwrap();
        reg.activate(h).unwrap();
        assert_eq!(reg.active(), None);
        assert_eq!(reg.begin_frame().unwrap(), Some(h));
        assert_eq!(reg.active(), Some(h));
    }

    #[test]
    fn test_unknown_handle() {
        let mut reg = registry();
        let h = reg.compile(PASS).unwrap();
        reg.unload(h).unwrap();
        assert_eq!(reg.unload(h), Err(HandleError::UnknownHandle(h)));
        assert_eq!(reg.activate(h), Err(HandleError::UnknownHandle(h)));
    }

    #[test]
    fn test_unload_active_falls_back_to_default() {
        let mut reg = registry();
        let h = reg.compile(PASS).unwrap();
        reg.activate(h).unwrap();
        reg.begin_frame().unwrap();
        reg.unload(h).unwrap();
        assert_eq!(reg.active(), None);
        assert_eq!(reg.begin_frame().unwrap(), None);
    }

    #[test]
    fn test_pending_unloaded_keeps_previous() {
        let mut reg = registry();
        let first = reg.compile(PASS).unwrap();
        let second = reg.compile(PASS).unwrap();
        reg.activate(first).unwrap();
        reg.begin_frame().unwrap();
        reg.activate(second).unwrap();
        reg.unload(second).unwrap();
        assert_eq!(reg.begin_frame().unwrap(), Some(first));
    }

    #[test]
    fn test_info_digest() {
        let mut reg = registry();
        let h = reg.compile(PASS).unwrap();
        let info = reg.info(h).unwrap();
        assert_eq!(info.digest.len(), 64);
        assert_eq!(info.digest, digest_source(PASS));
        assert!(!info.has_onframe);
        assert!(!info.active);
        assert_eq!(reg.source(h), Some(PASS));
    }

    #[test]
    fn test_shutdown_keeps_handles_monotonic() {
        let mut reg = registry();
        let a = reg.compile(PASS).unwrap();
        reg.shutdown();
        assert!(!reg.contains(a));
        let b = reg.compile(PASS).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(ScriptHandle(7).to_string(), "script#7");
        assert_eq!(ScriptHandle(7).get(), 7);
    }
}

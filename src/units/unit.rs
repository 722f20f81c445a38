//! A compiled unit: one generation of a source file.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rhai::{CallFnOptions, Dynamic, Engine, Scope, AST};

use crate::http::context::RequestContext;
use crate::http::error::DispatchError;
use crate::http::response::Outcome;
use crate::units::verb::{Verb, VerbTable};

/// An isolated, invokable unit. Owns its engine and AST, so dropping it
/// releases everything the generation holds.
pub struct CompiledUnit {
    location: PathBuf,
    modified: SystemTime,
    generation: u64,
    verbs: VerbTable,
    engine: Engine,
    ast: AST,
    snapshot: Option<PathBuf>,
}

impl CompiledUnit {
    pub(crate) fn new(
        location: PathBuf,
        modified: SystemTime,
        generation: u64,
        verbs: VerbTable,
        engine: Engine,
        ast: AST,
        snapshot: Option<PathBuf>,
    ) -> Self {
        Self {
            location,
            modified,
            generation,
            verbs,
            engine,
            ast,
            snapshot,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Source modification time this generation was built from.
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn verbs(&self) -> &VerbTable {
        &self.verbs
    }

    pub fn has(&self, verb: Verb) -> bool {
        self.verbs.has(verb)
    }

    /// Run the operation for `verb` against `ctx`.
    pub fn invoke(&self, verb: Verb, ctx: &RequestContext) -> Result<Outcome, DispatchError> {
        if !self.has(verb) {
            return Err(DispatchError::Internal(format!(
                "unit {:?} does not declare {verb}",
                self.location
            )));
        }

        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let value = self
            .engine
            .call_fn_with_options::<Dynamic>(
                options,
                &mut Scope::new(),
                &self.ast,
                verb.fn_name(),
                (ctx.clone(),),
            )
            .map_err(DispatchError::from_script)?;

        Ok(Outcome::from_dynamic(value))
    }

    /// Release on-disk artifacts of this generation. Best effort.
    pub(crate) fn dispose(&self) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        match std::fs::remove_file(snapshot) {
            Ok(()) => tracing::debug!(
                location = ?self.location,
                generation = self.generation,
                "Disposed unit generation"
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                location = ?self.location,
                generation = self.generation,
                error = %e,
                "Failed to dispose unit generation"
            ),
        }
    }
}

impl std::fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("location", &self.location)
            .field("generation", &self.generation)
            .field("verbs", &self.verbs)
            .finish_non_exhaustive()
    }
}

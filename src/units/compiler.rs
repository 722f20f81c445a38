//! Turns unit source files into isolated compiled units.
//!
//! # Responsibilities
//! - Build a fresh engine per compile (the unit's private execution context)
//! - Parse the source and collect diagnostics with line numbers
//! - Extract the verb table from the AST, once
//! - Stage each generation in the per-location artifact area and compile
//!   the staged copy
//!
//! # Artifact area
//! ```text
//! <cache_dir>/
//!     <sha256 of absolute location>/
//!         gen-<n>.rhai    snapshot of the exact source compiled
//!         unit.json       manifest of the current generation
//! ```
//!
//! A new process resumes numbering from the manifest and clears the
//! snapshots the previous one left behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rhai::{Engine, FnAccess, ParseError, AST};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::units::bindings;
use crate::units::error::{Diagnostic, UnitError};
use crate::units::unit::CompiledUnit;
use crate::units::verb::{Verb, VerbTable};

const MANIFEST_FILE: &str = "unit.json";

/// Compiles units with a shared configuration.
#[derive(Debug, Clone)]
pub struct UnitCompiler {
    artifacts: ArtifactStore,
    max_operations: u64,
}

impl UnitCompiler {
    /// `max_operations == 0` leaves script execution unbounded.
    pub fn new(cache_dir: impl Into<PathBuf>, max_operations: u64) -> Self {
        Self {
            artifacts: ArtifactStore::new(cache_dir),
            max_operations,
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Compile the current source of `location` as generation `generation`.
    ///
    /// `modified` is the timestamp observed before reading, so a write that
    /// lands during compilation is picked up by the next load.
    pub fn compile(
        &self,
        location: &Path,
        modified: SystemTime,
        generation: u64,
    ) -> Result<CompiledUnit, UnitError> {
        let source = fs::read_to_string(location).map_err(|source| UnitError::Read {
            location: location.to_path_buf(),
            source,
        })?;

        // Compile the staged copy: the snapshot on disk is the served generation.
        let (text, snapshot) = match self.artifacts.stage(location, &source, generation) {
            Ok(staged) => (staged.text, Some(staged.path)),
            Err(e) => {
                tracing::warn!(error = %e, "Compiling without a snapshot");
                (source, None)
            }
        };

        let engine = self.build_engine(location);
        let ast = match engine.compile(&text) {
            Ok(ast) => ast,
            Err(err) => {
                if let Some(snapshot) = &snapshot {
                    self.artifacts.discard(snapshot);
                }
                return Err(UnitError::Compile {
                    location: location.to_path_buf(),
                    diagnostics: vec![diagnostic(&err)],
                });
            }
        };
        let verbs = verb_table(&ast);

        if snapshot.is_some() {
            if let Err(e) = self.artifacts.write_manifest(location, modified, &verbs, generation) {
                tracing::warn!(error = %e, "Unit manifest not written");
            }
        }

        tracing::debug!(
            location = ?location,
            generation,
            verbs = %verbs.allow_header(),
            "Compiled unit"
        );

        Ok(CompiledUnit::new(
            location.to_path_buf(),
            modified,
            generation,
            verbs,
            engine,
            ast,
            snapshot,
        ))
    }

    fn build_engine(&self, location: &Path) -> Engine {
        let mut engine = Engine::new();
        engine.set_strict_variables(true);
        if self.max_operations > 0 {
            engine.set_max_operations(self.max_operations);
        }

        let unit = location.display().to_string();
        let print_unit = unit.clone();
        engine.on_print(move |text| {
            tracing::info!(target: "unit", unit = %print_unit, "{text}");
        });
        engine.on_debug(move |text, _source, pos| {
            tracing::debug!(target: "unit", unit = %unit, line = ?pos.line(), "{text}");
        });

        bindings::register(&mut engine);
        engine
    }
}

fn diagnostic(err: &ParseError) -> Diagnostic {
    Diagnostic {
        line: err.position().line(),
        message: err.err_type().to_string(),
    }
}

/// Public single-argument functions named after a verb.
fn verb_table(ast: &AST) -> VerbTable {
    ast.iter_functions()
        .filter(|f| f.access != FnAccess::Private && f.params.len() == 1)
        .filter_map(|f| Verb::from_fn_name(f.name))
        .collect()
}

/// Per-location output directories under one cache root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitManifest {
    pub location: PathBuf,
    pub modified_ms: u64,
    pub verbs: Vec<String>,
    pub generation: u64,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stable directory for `location`, distinct for distinct locations.
    pub fn dir_for(&self, location: &Path) -> PathBuf {
        let digest = Sha256::digest(location.as_os_str().as_encoded_bytes());
        let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.root.join(name)
    }

    pub fn snapshot_path(&self, location: &Path, generation: u64) -> PathBuf {
        self.dir_for(location).join(format!("gen-{generation}.rhai"))
    }

    pub fn read_manifest(&self, location: &Path) -> Option<UnitManifest> {
        let raw = fs::read(self.dir_for(location).join(MANIFEST_FILE)).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// Last generation a previous process recorded for `location`, after
    /// removing the snapshots it left behind. `0` when there is none.
    pub fn resume(&self, location: &Path) -> u64 {
        let last = self
            .read_manifest(location)
            .filter(|manifest| manifest.location == location)
            .map_or(0, |manifest| manifest.generation);

        let Ok(entries) = fs::read_dir(self.dir_for(location)) else {
            return last;
        };
        let stale = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_snapshot(path));
        for path in stale {
            self.discard(&path);
        }
        last
    }

    /// Write the source of `generation` and read it back.
    fn stage(&self, location: &Path, source: &str, generation: u64) -> Result<Staged, UnitError> {
        let artifact_err = |e: std::io::Error| UnitError::Artifact {
            location: location.to_path_buf(),
            message: e.to_string(),
        };

        fs::create_dir_all(self.dir_for(location)).map_err(artifact_err)?;
        let path = self.snapshot_path(location, generation);
        fs::write(&path, source).map_err(artifact_err)?;
        let text = fs::read_to_string(&path).map_err(artifact_err)?;
        Ok(Staged { path, text })
    }

    fn write_manifest(
        &self,
        location: &Path,
        modified: SystemTime,
        verbs: &VerbTable,
        generation: u64,
    ) -> Result<(), UnitError> {
        let artifact_err = |message: String| UnitError::Artifact {
            location: location.to_path_buf(),
            message,
        };

        let manifest = UnitManifest {
            location: location.to_path_buf(),
            modified_ms: modified
                .duration_since(UNIX_EPOCH)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or(0),
            verbs: verbs.verbs().map(|v| v.fn_name().to_string()).collect(),
            generation,
        };
        let json = serde_json::to_vec_pretty(&manifest).map_err(|e| artifact_err(e.to_string()))?;
        fs::write(self.dir_for(location).join(MANIFEST_FILE), json)
            .map_err(|e| artifact_err(e.to_string()))
    }

    fn discard(&self, snapshot: &Path) {
        match fs::remove_file(snapshot) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(snapshot = ?snapshot, error = %e, "Failed to remove snapshot"),
        }
    }
}

struct Staged {
    path: PathBuf,
    text: String,
}

fn is_snapshot(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("gen-") && name.ends_with(".rhai"))
}

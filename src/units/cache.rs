//! Compile-on-demand unit cache keyed by location.
//!
//! # Data Flow
//! ```text
//! load(location)
//!     → stat mtime
//!     → current entry has same mtime? → return it (lock-free)
//!     → lock the location's slot
//!         → re-check (another caller may have compiled meanwhile)
//!         → first compile in this process? resume n from the artifact manifest
//!         → compile generation n+1
//!             failure → entry untouched, error returned
//!             success → swap entry, dispose the previous generation
//! ```
//!
//! # Design Decisions
//! - One slot per location, each with its own compile lock: loads of the same
//!   key never overlap, distinct keys never contend
//! - Readers see entries through `ArcSwapOption`, so a swap is atomic and an
//!   in-flight request keeps its generation alive until it finishes
//! - Slots are never removed from the map, which keeps the per-key lock stable
//! - Timestamp-only change detection: two edits with the same mtime look
//!   like no change

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;

use crate::observability::metrics;
use crate::units::compiler::UnitCompiler;
use crate::units::error::UnitError;
use crate::units::unit::CompiledUnit;

struct CacheEntry {
    modified: SystemTime,
    unit: Arc<CompiledUnit>,
}

#[derive(Default)]
struct UnitSlot {
    current: ArcSwapOption<CacheEntry>,
    /// Serializes compile/invalidate for this key. Holds the last generation
    /// number handed out, `None` until resumed from the artifact area.
    compile: Mutex<Option<u64>>,
}

impl UnitSlot {
    fn fresh(&self, modified: SystemTime) -> Option<Arc<CompiledUnit>> {
        self.current
            .load()
            .as_ref()
            .filter(|entry| entry.modified == modified)
            .map(|entry| Arc::clone(&entry.unit))
    }
}

/// Shared store of compiled units.
pub struct UnitCache {
    compiler: UnitCompiler,
    slots: DashMap<PathBuf, Arc<UnitSlot>>,
    compilations: AtomicU64,
}

impl UnitCache {
    pub fn new(compiler: UnitCompiler) -> Self {
        Self {
            compiler,
            slots: DashMap::new(),
            compilations: AtomicU64::new(0),
        }
    }

    /// The compiled unit for `location`, recompiling if the source changed.
    pub fn load(&self, location: &Path) -> Result<Arc<CompiledUnit>, UnitError> {
        let modified = modified_time(location)?;
        let slot = self.slot(location);

        if let Some(unit) = slot.fresh(modified) {
            return Ok(unit);
        }

        let mut generation = slot.compile.lock().unwrap_or_else(PoisonError::into_inner);

        // Re-stat under the lock: the waiting period may have seen another edit.
        let modified = modified_time(location)?;
        if let Some(unit) = slot.fresh(modified) {
            return Ok(unit);
        }

        let last = *generation.get_or_insert_with(|| self.compiler.artifacts().resume(location));
        self.compilations.fetch_add(1, Ordering::Relaxed);
        let next = last + 1;
        let unit = match self.compiler.compile(location, modified, next) {
            Ok(unit) => Arc::new(unit),
            Err(e) => {
                metrics::record_compilation("failure");
                return Err(e);
            }
        };
        *generation = Some(next);
        metrics::record_compilation("success");

        let previous = slot.current.swap(Some(Arc::new(CacheEntry {
            modified,
            unit: Arc::clone(&unit),
        })));
        if let Some(previous) = previous {
            previous.unit.dispose();
        }
        drop(generation);

        metrics::record_cached_units(self.len());
        tracing::info!(location = ?location, generation = next, "Unit loaded");
        Ok(unit)
    }

    /// Drop any cached unit for `location`; the next load recompiles.
    pub fn invalidate(&self, location: &Path) {
        let Some(slot) = self.slots.get(location).map(|s| Arc::clone(s.value())) else {
            return;
        };
        let _guard = slot.compile.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.current.swap(None) {
            previous.unit.dispose();
            tracing::debug!(location = ?location, "Unit invalidated");
            metrics::record_cached_units(self.len());
        }
    }

    /// Invalidate every cached unit located under `dir`.
    pub fn invalidate_under(&self, dir: &Path) -> usize {
        let locations: Vec<PathBuf> = self
            .slots
            .iter()
            .filter(|slot| slot.key().starts_with(dir) && slot.value().current.load().is_some())
            .map(|slot| slot.key().clone())
            .collect();
        for location in &locations {
            self.invalidate(location);
        }
        locations.len()
    }

    /// Number of compile attempts that reached the compiler.
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Number of locations with a live compiled unit.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().current.load().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_cached(&self, location: &Path) -> bool {
        self.slots
            .get(location)
            .is_some_and(|slot| slot.current.load().is_some())
    }

    /// Generation currently cached for `location`, if any.
    pub fn generation(&self, location: &Path) -> Option<u64> {
        let slot = self.slots.get(location).map(|s| Arc::clone(s.value()))?;
        let current = slot.current.load();
        current.as_ref().map(|entry| entry.unit.generation())
    }

    fn slot(&self, location: &Path) -> Arc<UnitSlot> {
        if let Some(slot) = self.slots.get(location) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.slots.entry(location.to_path_buf()).or_default().value())
    }
}

fn modified_time(location: &Path) -> Result<SystemTime, UnitError> {
    std::fs::metadata(location)
        .and_then(|meta| meta.modified())
        .map_err(|source| UnitError::Stat {
            location: location.to_path_buf(),
            source,
        })
}

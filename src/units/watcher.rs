//! Background watcher that keeps the unit cache warm.
//!
//! # Responsibilities
//! - Register every directory of the route tree, including new ones
//! - Precompile all units at startup so compile errors surface early
//! - Recompile written units, invalidate removed ones
//!
//! # Data Flow
//! ```text
//! notify (OS events) → std mpsc channel → "unit-watcher" thread
//!     → batch (first event + everything already queued), dedup by path
//!     → per path, by what is on disk now:
//!         directory, not yet watched → register subtree, precompile it
//!         unit file                  → invalidate + load
//!         gone, unit file            → invalidate
//!         gone, anything else        → invalidate everything below it
//! ```
//!
//! # Design Decisions
//! - Decisions use the current filesystem state, not the event kind, so
//!   coalesced or reordered events (rename pairs, delete + recreate) settle on
//!   what actually exists
//! - Directories are watched non-recursively and tracked explicitly
//! - Stop is cooperative: clear the flag, drop the OS watcher, join the thread.
//!   Events still queued at that point are discarded

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use walkdir::WalkDir;

use crate::routing::PathResolver;
use crate::units::cache::UnitCache;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

type SharedWatcher = Arc<Mutex<Option<RecommendedWatcher>>>;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("route root {0:?} is not a directory")]
    MissingRoot(PathBuf),

    #[error("failed to watch {path:?}: {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error("failed to spawn watcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Totals from a precompile pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrecompileReport {
    pub compiled: usize,
    pub failed: usize,
}

/// Load every unit under `dir`, logging failures.
pub fn precompile_tree(dir: &Path, resolver: &PathResolver, cache: &UnitCache) -> PrecompileReport {
    let mut report = PrecompileReport::default();
    let units = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable route entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && resolver.is_unit_file(entry.path()));

    for entry in units {
        match cache.load(entry.path()) {
            Ok(_) => report.compiled += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!(error = %e, "Unit failed to precompile");
            }
        }
    }
    report
}

/// Handle to the running watcher thread.
pub struct UnitWatcher {
    running: Arc<AtomicBool>,
    watcher: SharedWatcher,
    thread: Option<JoinHandle<()>>,
}

impl UnitWatcher {
    /// Register the tree under the resolver's root, precompile it and start
    /// the background loop. Failing to watch the root itself is fatal.
    pub fn start(resolver: PathResolver, cache: Arc<UnitCache>) -> Result<Self, WatchError> {
        let root = resolver.root().to_path_buf();
        if !root.is_dir() {
            return Err(WatchError::MissingRoot(root));
        }

        let (tx, rx) = mpsc::channel();
        let watcher: SharedWatcher = Arc::new(Mutex::new(Some(RecommendedWatcher::new(
            tx,
            Config::default(),
        )?)));

        let mut registered = HashSet::new();
        let dirs = register_tree(&watcher, &root, &mut registered)?;
        let report = precompile_tree(&root, &resolver, &cache);
        tracing::info!(
            root = ?root,
            directories = dirs,
            compiled = report.compiled,
            failed = report.failed,
            "Unit watcher started"
        );

        let running = Arc::new(AtomicBool::new(true));
        let mut event_loop = WatchLoop {
            root,
            resolver,
            cache,
            watcher: Arc::clone(&watcher),
            registered,
            running: Arc::clone(&running),
        };
        let thread = std::thread::Builder::new()
            .name("unit-watcher".into())
            .spawn(move || event_loop.run(rx))
            .map_err(WatchError::Spawn)?;

        Ok(Self {
            running,
            watcher,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.thread.is_some()
    }

    /// Stop the loop and wait for the thread. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        drop(
            self.watcher
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Unit watcher thread panicked");
            } else {
                tracing::info!("Unit watcher stopped");
            }
        }
    }
}

impl Drop for UnitWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WatchLoop {
    root: PathBuf,
    resolver: PathResolver,
    cache: Arc<UnitCache>,
    watcher: SharedWatcher,
    registered: HashSet<PathBuf>,
    running: Arc<AtomicBool>,
}

impl WatchLoop {
    fn run(&mut self, rx: Receiver<notify::Result<Event>>) {
        while self.running.load(Ordering::SeqCst) {
            let first = match rx.recv_timeout(POLL_INTERVAL) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let mut paths: Vec<PathBuf> = Vec::new();
            let mut seen: HashSet<PathBuf> = HashSet::new();
            for event in std::iter::once(first).chain(rx.try_iter()) {
                match event {
                    Ok(event) => {
                        for path in changed_paths(event) {
                            if seen.insert(path.clone()) {
                                paths.push(path);
                            }
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Watch error"),
                }
            }

            for path in paths {
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                self.apply(&path);
            }
        }
    }

    fn apply(&mut self, path: &Path) {
        if !path.starts_with(&self.root) {
            return;
        }

        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => {
                if self.registered.contains(path) {
                    return;
                }
                match register_tree(&self.watcher, path, &mut self.registered) {
                    Ok(dirs) => {
                        let report = precompile_tree(path, &self.resolver, &self.cache);
                        tracing::info!(
                            dir = ?path,
                            directories = dirs,
                            compiled = report.compiled,
                            failed = report.failed,
                            "Watching new route directory"
                        );
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to watch new directory"),
                }
            }
            Ok(_) => {
                if self.resolver.is_unit_file(path) {
                    self.recompile(path);
                }
            }
            Err(_) => {
                if self.resolver.is_unit_file(path) {
                    self.cache.invalidate(path);
                    tracing::info!(location = ?path, "Unit removed");
                } else {
                    let dropped = self.cache.invalidate_under(path);
                    self.registered.retain(|dir| !dir.starts_with(path));
                    if dropped > 0 {
                        tracing::info!(dir = ?path, units = dropped, "Route directory removed");
                    }
                }
            }
        }
    }

    fn recompile(&self, path: &Path) {
        self.cache.invalidate(path);
        match self.cache.load(path) {
            Ok(unit) => tracing::info!(
                location = ?path,
                generation = unit.generation(),
                "Unit recompiled"
            ),
            Err(e) if e.is_not_found() => self.cache.invalidate(path),
            Err(e) => tracing::error!(error = %e, "Unit failed to recompile"),
        }
    }
}

/// Watch `dir` and every directory below it. Only a failure on `dir`
/// itself is returned; nested failures are logged.
fn register_tree(
    watcher: &Mutex<Option<RecommendedWatcher>>,
    dir: &Path,
    registered: &mut HashSet<PathBuf>,
) -> Result<usize, WatchError> {
    let mut guard = watcher.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(watcher) = guard.as_mut() else {
        return Ok(0);
    };

    let mut count = 0;
    for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_dir() || registered.contains(entry.path()) {
            continue;
        }
        match watcher.watch(entry.path(), RecursiveMode::NonRecursive) {
            Ok(()) => {
                registered.insert(entry.path().to_path_buf());
                count += 1;
            }
            Err(source) if entry.depth() == 0 => {
                return Err(WatchError::Register {
                    path: entry.path().to_path_buf(),
                    source,
                });
            }
            Err(e) => tracing::warn!(dir = ?entry.path(), error = %e, "Failed to watch directory"),
        }
    }
    Ok(count)
}

/// Paths an event touches that may need attention.
fn changed_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Access(_) | EventKind::Other => Vec::new(),
        // Rename pairs carry both the old and the new path.
        _ => event.paths,
    }
}

// ABOUTME: Debounced watch loop that turns filesystem notifications into build passes
// ABOUTME: Bridges notify callbacks into a tokio channel and coalesces bursts into one pass

use crate::packer::Packer;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use packer_core::{PackerError, PathWatcher, Result};
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_BUFFER: usize = 1024;

/// `PathWatcher` backed by the platform's notify watcher.
///
/// Files are watched through their directories, so a save that renames a temp file over
/// the original keeps being seen. Sibling events are filtered out by the watch loop.
pub struct NotifyWatcher {
    watcher: RecommendedWatcher,
    dirs: FxHashSet<PathBuf>,
}

impl NotifyWatcher {
    /// The receiver yields every path touched by a create, modify or remove event.
    pub fn new() -> Result<(Self, mpsc::Receiver<PathBuf>)> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_change(&event.kind) {
                    for path in event.paths {
                        let _ = tx.blocking_send(path);
                    }
                }
            }
            Err(e) => error!("File watcher error: {}", e),
        })
        .map_err(|e| PackerError::Watch(e.to_string()))?;
        Ok((
            Self {
                watcher,
                dirs: FxHashSet::default(),
            },
            rx,
        ))
    }
}

impl PathWatcher for NotifyWatcher {
    fn watch(&mut self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or(path);
        if self.dirs.contains(dir) {
            return Ok(());
        }
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| PackerError::Watch(format!("{}: {}", dir.display(), e)))?;
        debug!("Watching directory {}", dir.display());
        self.dirs.insert(dir.to_path_buf());
        Ok(())
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

impl Packer {
    /// Build once, then rebuild on every settled burst of changes until `shutdown`.
    pub async fn watch(&mut self, shutdown: CancellationToken) -> Result<()> {
        let (watcher, events) = NotifyWatcher::new()?;
        self.ctx.cache.set_watcher(Box::new(watcher));
        if let Err(e) = self.run().await {
            warn!("Initial build failed, waiting for changes: {}", e);
        }
        self.watch_with(events, shutdown).await
    }

    /// The watch loop over an arbitrary source of changed paths.
    ///
    /// Only absolute paths the cache is watching are accepted. Each accepted path restarts
    /// the debounce timer; when it fires, the pending set is drained into exactly one pass.
    /// Paths arriving during a pass are picked up afterwards.
    pub async fn watch_with(
        &mut self,
        mut events: mpsc::Receiver<PathBuf>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let debounce = Duration::from_millis(self.ctx.config.watch.debounce_ms);
        let mut pending: FxHashSet<PathBuf> = FxHashSet::default();
        let timer = tokio::time::sleep(debounce);
        tokio::pin!(timer);
        let mut armed = false;
        info!("Watching {} files", self.ctx.cache.watched_len());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Watch loop stopped");
                    return Ok(());
                }
                event = events.recv() => {
                    let Some(path) = event else {
                        info!("Change feed closed, leaving watch mode");
                        return Ok(());
                    };
                    if !self.accepts(&path) {
                        debug!("Ignoring change to {}", path.display());
                        continue;
                    }
                    pending.insert(path);
                    timer.as_mut().reset(Instant::now() + debounce);
                    armed = true;
                }
                _ = &mut timer, if armed => {
                    armed = false;
                    let mut changed: Vec<PathBuf> = pending.drain().collect();
                    changed.sort();
                    self.rebuild(&changed).await;
                }
            }
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        path.is_absolute() && self.ctx.cache.is_watched(path)
    }

    /// Reload the changed files, mark their importers dirty and run one pass.
    ///
    /// A deleted file is forgotten by the cache, so the pass fails on its importers. A file
    /// that cannot be read is left unloaded and the pass reports the read error.
    async fn rebuild(&mut self, changed: &[PathBuf]) {
        let cache = &mut self.ctx.cache;
        for path in changed {
            let refreshed = match cache.refresh(path) {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    warn!("{}", e);
                    cache.lookup(path)
                }
            };
            let Some(id) = refreshed else {
                continue;
            };
            if cache.node(id).is_updated() {
                let marked = cache.invalidate_dependents(id);
                debug!(
                    "{} changed, {} dependents marked",
                    cache.relative_name(id),
                    marked.len()
                );
            }
        }

        info!("Rebuilding after {} changed files", changed.len());
        if let Err(e) = self.run().await {
            error!("Pass failed, keeping previous output: {}", e);
        }
    }
}

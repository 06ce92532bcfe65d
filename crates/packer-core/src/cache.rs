use crate::error::{PackerError, Result};
use crate::node::{FileStat, Import, NodeId, SourceNode};
use crate::paths::{absolutize, in_dependency_dir, relative_url};
use crate::traits::PathWatcher;
use globset::GlobBuilder;
use ignore::WalkBuilder;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
enum Slot {
    Node(NodeId),
    /// A probe found nothing on disk; answered without touching the filesystem again.
    Absent,
}

/// Owns every [`SourceNode`] of a build, keyed by absolute normalized path.
///
/// Nodes live in an arena and are referred to by [`NodeId`]; import edges and created-file
/// lists hold ids, so a rename only re-keys the path index.
pub struct FileCache {
    context: PathBuf,
    nodes: Vec<SourceNode>,
    index: FxHashMap<PathBuf, Slot>,
    renamed: FxHashMap<PathBuf, NodeId>,
    /// Nodes whose file vanished, keyed by path, so a file that comes back keeps its id.
    removed: FxHashMap<PathBuf, NodeId>,
    dependents: FxHashMap<NodeId, FxHashSet<NodeId>>,
    watched: FxHashSet<PathBuf>,
    watcher: Option<Box<dyn PathWatcher + Send>>,
    skip_dependency_dirs: bool,
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("context", &self.context)
            .field("nodes", &self.nodes.len())
            .field("watched", &self.watched.len())
            .finish()
    }
}

impl FileCache {
    pub fn new(context: impl Into<PathBuf>) -> Self {
        Self {
            context: context.into(),
            nodes: Vec::new(),
            index: FxHashMap::default(),
            renamed: FxHashMap::default(),
            removed: FxHashMap::default(),
            dependents: FxHashMap::default(),
            watched: FxHashSet::default(),
            watcher: None,
            skip_dependency_dirs: true,
        }
    }

    pub fn with_skip_dependency_dirs(mut self, skip: bool) -> Self {
        self.skip_dependency_dirs = skip;
        self
    }

    pub fn context(&self) -> &Path {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &SourceNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut SourceNode {
        &mut self.nodes[id.index()]
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    /// Absolute normalized form of `path`, relative paths taken from the context root.
    pub fn normalize_name(&self, path: impl AsRef<Path>) -> PathBuf {
        absolutize(&self.context, path.as_ref())
    }

    /// Node path relative to the context root, `/`-separated.
    pub fn relative_name(&self, id: NodeId) -> String {
        relative_url(&self.context, self.node(id).path())
    }

    /// Cached node at `path`, without touching the disk.
    pub fn lookup(&self, path: impl AsRef<Path>) -> Option<NodeId> {
        match self.index.get(&self.normalize_name(path)) {
            Some(Slot::Node(id)) => Some(*id),
            _ => None,
        }
    }

    /// Like [`FileCache::lookup`], but also finds a node renamed away from `path`.
    pub fn lookup_generated(&self, path: impl AsRef<Path>) -> Option<NodeId> {
        let path = self.normalize_name(path);
        match self.index.get(&path) {
            Some(Slot::Node(id)) => Some(*id),
            _ => self.renamed.get(&path).copied(),
        }
    }

    fn insert_node(&mut self, path: PathBuf, stat: FileStat) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SourceNode::new(id, path.clone(), stat));
        self.removed.remove(&path);
        self.index.insert(path, Slot::Node(id));
        id
    }

    /// Stat `path`, returning the cached node or `None` when nothing exists there.
    /// Misses are remembered until [`FileCache::forget_absent`].
    pub fn stat(&mut self, path: impl AsRef<Path>) -> Result<Option<NodeId>> {
        let path = self.normalize_name(path);
        match self.index.get(&path) {
            Some(Slot::Node(id)) => return Ok(Some(*id)),
            Some(Slot::Absent) => return Ok(None),
            None => {}
        }

        match std::fs::metadata(&path) {
            Ok(meta) => {
                let stat = FileStat::from_metadata(&meta);
                if let Some(id) = self.removed.remove(&path) {
                    debug!("{} is back", path.display());
                    let node = self.node_mut(id);
                    node.stat = stat;
                    node.updated = true;
                    self.index.insert(path, Slot::Node(id));
                    return Ok(Some(id));
                }
                Ok(Some(self.insert_node(path, stat)))
            }
            Err(e) if is_missing(&e) => {
                self.index.insert(path, Slot::Absent);
                Ok(None)
            }
            Err(e) => Err(PackerError::file_io(path, e)),
        }
    }

    /// Drop remembered misses so files created since the last pass become visible.
    pub fn forget_absent(&mut self) {
        self.index.retain(|_, slot| matches!(slot, Slot::Node(_)));
    }

    /// Existing node for `path`, or a fresh file node if nothing is cached there.
    pub fn find_or_create(&mut self, path: impl AsRef<Path>) -> Result<NodeId> {
        if let Some(id) = self.stat(path.as_ref())? {
            return Ok(id);
        }
        let path = self.normalize_name(path);
        Ok(self.insert_node(path, FileStat::file()))
    }

    /// Load the node's bytes, once; `force` re-reads from disk. Generated nodes are
    /// never read from disk.
    pub fn read_content(&mut self, id: NodeId, force: bool) -> Result<Arc<[u8]>> {
        let node = self.node(id);
        if let Some(content) = node.content() {
            if !force || node.is_generated() {
                return Ok(content);
            }
        }
        if node.is_generated() {
            return Ok(Arc::from(Vec::new()));
        }

        let path = node.path().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|e| PackerError::file_io(&path, e))?;
        if self.node_mut(id).set_content(Arc::from(bytes)) {
            debug!("Loaded {}", path.display());
        }
        self.watch(id);
        Ok(self.node(id).content().unwrap_or_else(|| Arc::from(Vec::new())))
    }

    /// Bring the node at `path` in line with the disk after a change notification.
    ///
    /// A file that vanished is forgotten through [`FileCache::mark_removed`], so importers
    /// fail to resolve it on their next scan. A file that comes back gets its old id.
    /// Any other read failure unloads the node, so the next pass reports it. Returns the
    /// affected node, or `None` when nothing was known at `path`.
    pub fn refresh(&mut self, path: impl AsRef<Path>) -> Result<Option<NodeId>> {
        let path = self.normalize_name(path);
        let slot = self.index.get(&path).copied();
        let id = match slot {
            Some(Slot::Node(id)) => id,
            _ if self.removed.contains_key(&path) => {
                self.index.remove(&path);
                match self.stat(&path)? {
                    Some(id) => id,
                    None => return Ok(None),
                }
            }
            _ => return Ok(None),
        };
        if self.node(id).is_generated() {
            return Ok(Some(id));
        }

        match std::fs::read(&path) {
            Ok(bytes) => {
                if self.node_mut(id).set_content(Arc::from(bytes)) {
                    debug!("Reloaded {}", path.display());
                }
                Ok(Some(id))
            }
            Err(e) if is_missing(&e) => {
                self.mark_removed(id);
                Ok(Some(id))
            }
            Err(e) => {
                self.node_mut(id).unload();
                Err(PackerError::file_io(path, e))
            }
        }
    }

    /// Forget a node whose file is gone. Its path probes as absent from now on and its
    /// own imports are dropped; importers keep their edges so they can be invalidated.
    pub fn mark_removed(&mut self, id: NodeId) {
        self.clear_imports(id);
        let node = self.node_mut(id);
        node.unload();
        node.stat = FileStat::missing();
        let path = node.path().to_path_buf();
        debug!("{} was removed", path.display());
        self.index.insert(path.clone(), Slot::Absent);
        self.removed.insert(path, id);
    }

    pub fn read_text(&mut self, id: NodeId, force: bool) -> Result<Arc<str>> {
        self.read_content(id, force)?;
        Ok(self.node(id).text().unwrap_or_else(|| Arc::from("")))
    }

    /// Replace content in memory. Returns whether the bytes differed.
    pub fn set_content(&mut self, id: NodeId, content: impl AsRef<[u8]>) -> bool {
        self.node_mut(id).set_content(Arc::from(content.as_ref()))
    }

    /// Create, or overwrite in place, a generated node at `path`.
    ///
    /// A node previously renamed away from `path` is found again by its original path,
    /// so the identity is stable across passes. `attributed_to` records the new node among
    /// that node's created files.
    pub fn create_generated_from(
        &mut self,
        path: impl AsRef<Path>,
        content: impl AsRef<[u8]>,
        attributed_to: Option<NodeId>,
    ) -> NodeId {
        let path = self.normalize_name(path);
        let id = match self.lookup_generated(&path) {
            Some(id) => id,
            None => self.insert_node(path, FileStat::file()),
        };

        let node = self.node_mut(id);
        node.generated = true;
        node.stat = FileStat::file();
        node.set_content(Arc::from(content.as_ref()));

        if let Some(owner) = attributed_to {
            if owner != id {
                self.node_mut(owner).add_created_file(id);
            }
        }
        id
    }

    /// Re-key a node under `new_path`, keeping identity, content and edges.
    pub fn rename(&mut self, id: NodeId, new_path: impl AsRef<Path>) {
        let new_path = self.normalize_name(new_path);
        let old_path = self.node(id).path().to_path_buf();
        if old_path == new_path {
            return;
        }

        if let Some(Slot::Node(current)) = self.index.get(&old_path) {
            if *current == id {
                self.index.remove(&old_path);
            }
        }
        self.removed.remove(&new_path);
        self.index.insert(new_path.clone(), Slot::Node(id));

        let node = self.node_mut(id);
        let original = node.original_path.get_or_insert(old_path).clone();
        node.path = new_path;
        self.renamed.insert(original, id);
    }

    /// Register the node's path with the watcher. Generated nodes and, when configured,
    /// anything under a dependency directory are skipped.
    pub fn watch(&mut self, id: NodeId) {
        let node = self.node(id);
        if node.is_generated() {
            return;
        }
        if self.skip_dependency_dirs && in_dependency_dir(node.path()) {
            return;
        }
        let path = node.path().to_path_buf();
        if !self.watched.insert(path.clone()) {
            return;
        }
        if let Some(watcher) = self.watcher.as_mut() {
            if let Err(e) = watcher.watch(&path) {
                warn!("Failed to watch {}: {}", path.display(), e);
            }
        }
    }

    /// Attach a watcher; every path registered so far is handed to it.
    pub fn set_watcher(&mut self, mut watcher: Box<dyn PathWatcher + Send>) {
        for path in &self.watched {
            if let Err(e) = watcher.watch(path) {
                warn!("Failed to watch {}: {}", path.display(), e);
            }
        }
        self.watcher = Some(watcher);
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }

    pub fn watched_len(&self) -> usize {
        self.watched.len()
    }

    /// Clear every dirty flag after a pass consumed them.
    pub fn reset_updated_files(&mut self) {
        for node in &mut self.nodes {
            node.updated = false;
        }
    }

    pub fn generated_files(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_generated())
            .map(|n| n.id)
            .collect()
    }

    /// Expand a glob (relative to the context root) into file nodes, sorted by path.
    /// Matches reuse cached nodes.
    pub fn find_files(&mut self, pattern: &str) -> Result<Vec<NodeId>> {
        let absolute = self.normalize_name(pattern);
        let root = literal_prefix(&absolute);

        if root == absolute {
            return Ok(match self.stat(&root)? {
                Some(id) if self.node(id).is_file() => vec![id],
                _ => Vec::new(),
            });
        }

        let matcher = GlobBuilder::new(&absolute.to_string_lossy())
            .literal_separator(true)
            .build()?
            .compile_matcher();

        let mut matches = Vec::new();
        let walker = WalkBuilder::new(&root).standard_filters(false).build();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Walker error: {}", e);
                    continue;
                }
            };
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false)
                && matcher.is_match(entry.path())
            {
                matches.push(entry.into_path());
            }
        }
        matches.sort();

        let mut ids = Vec::with_capacity(matches.len());
        for path in matches {
            if let Some(id) = self.stat(&path)? {
                ids.push(id);
            }
        }
        debug!("Pattern {} matched {} files", pattern, ids.len());
        Ok(ids)
    }

    /// Replace a node's import list, keeping the reverse dependency index in step.
    pub fn set_imports(&mut self, id: NodeId, imports: Vec<Import>) {
        self.clear_imports(id);
        for target in imports.iter().filter_map(|i| i.target.node()) {
            self.dependents.entry(target).or_default().insert(id);
        }
        self.nodes[id.index()].imports = Some(imports);
    }

    fn clear_imports(&mut self, id: NodeId) {
        if let Some(old) = self.nodes[id.index()].imports.take() {
            for target in old.iter().filter_map(|i| i.target.node()) {
                if let Some(set) = self.dependents.get_mut(&target) {
                    set.remove(&id);
                }
            }
        }
    }

    /// Nodes whose recorded imports point at `id`.
    pub fn dependents_of(&self, id: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .dependents
            .get(&id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Transitively mark every importer of `id` dirty. Returns the nodes marked.
    pub fn invalidate_dependents(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut seen: FxHashSet<NodeId> = FxHashSet::default();
        seen.insert(id);
        let mut queue: VecDeque<NodeId> = VecDeque::from([id]);
        let mut marked = Vec::new();

        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents_of(current) {
                if seen.insert(dependent) {
                    self.nodes[dependent.index()].updated = true;
                    marked.push(dependent);
                    queue.push_back(dependent);
                }
            }
        }
        marked
    }
}

fn is_missing(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// Leading components of a glob path that contain no glob syntax.
fn literal_prefix(pattern: &Path) -> PathBuf {
    let mut prefix = PathBuf::new();
    for comp in pattern.components() {
        let s = comp.as_os_str().to_string_lossy();
        if s.contains(['*', '?', '[', '{']) {
            break;
        }
        prefix.push(comp.as_os_str());
    }
    prefix
}

use crate::paths::extension_of;
use rustc_hash::FxHashMap;
use std::cell::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stable identity of a node inside a [`crate::FileCache`]. Survives renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_dir: bool,
    pub is_file: bool,
}

impl FileStat {
    pub fn file() -> Self {
        Self {
            is_dir: false,
            is_file: true,
        }
    }

    /// Stat of a path that no longer exists on disk.
    pub fn missing() -> Self {
        Self {
            is_dir: false,
            is_file: false,
        }
    }

    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        Self {
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
        }
    }
}

/// What an import edge points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportTarget {
    Node(NodeId),
    /// Platform module supplied by the host runtime; never bundled.
    Runtime,
}

impl ImportTarget {
    pub fn node(self) -> Option<NodeId> {
        match self {
            ImportTarget::Node(id) => Some(id),
            ImportTarget::Runtime => None,
        }
    }
}

/// One `require("...")` site. `start..end` spans the quoted literal, quotes included,
/// so an id substitution can rewrite it in place. `line`/`column` are 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub specifier: String,
    pub target: ImportTarget,
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

/// One file known to the cache, read from disk or generated by a plugin.
#[derive(Debug)]
pub struct SourceNode {
    pub(crate) id: NodeId,
    pub(crate) path: PathBuf,
    pub(crate) original_path: Option<PathBuf>,
    pub(crate) stat: FileStat,
    pub(crate) content: Option<Arc<[u8]>>,
    pub(crate) text: OnceCell<Arc<str>>,
    pub(crate) generated: bool,
    pub(crate) updated: bool,
    pub(crate) name_can_be_hashed: bool,
    pub(crate) imports: Option<Vec<Import>>,
    pub(crate) created_files: Vec<NodeId>,
    pub attributes: FxHashMap<String, String>,
}

impl SourceNode {
    pub(crate) fn new(id: NodeId, path: PathBuf, stat: FileStat) -> Self {
        Self {
            id,
            path,
            original_path: None,
            stat,
            content: None,
            text: OnceCell::new(),
            generated: false,
            updated: true,
            name_can_be_hashed: true,
            imports: None,
            created_files: Vec::new(),
            attributes: FxHashMap::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the node had before its first rename (equal to `path()` if never renamed).
    pub fn original_path(&self) -> &Path {
        self.original_path.as_deref().unwrap_or(&self.path)
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("/"))
    }

    pub fn extension(&self) -> String {
        extension_of(&self.path)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_dir(&self) -> bool {
        self.stat.is_dir
    }

    pub fn is_file(&self) -> bool {
        self.stat.is_file
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub fn set_updated(&mut self, updated: bool) {
        self.updated = updated;
    }

    pub fn name_can_be_hashed(&self) -> bool {
        self.name_can_be_hashed
    }

    pub fn set_name_can_be_hashed(&mut self, value: bool) {
        self.name_can_be_hashed = value;
    }

    pub fn is_loaded(&self) -> bool {
        self.content.is_some()
    }

    pub fn content(&self) -> Option<Arc<[u8]>> {
        self.content.clone()
    }

    /// Lossy UTF-8 view of the content, built once per content version.
    pub fn text(&self) -> Option<Arc<str>> {
        let bytes = self.content.as_ref()?;
        Some(
            self.text
                .get_or_init(|| Arc::from(String::from_utf8_lossy(bytes).as_ref()))
                .clone(),
        )
    }

    pub fn imports(&self) -> Option<&[Import]> {
        self.imports.as_deref()
    }

    pub fn created_files(&self) -> &[NodeId] {
        &self.created_files
    }

    /// Replace content. Returns whether anything changed; a change marks the node dirty,
    /// drops the text view and forgets scanned imports.
    pub(crate) fn set_content(&mut self, bytes: Arc<[u8]>) -> bool {
        if let Some(existing) = &self.content {
            if existing.as_ref() == bytes.as_ref() {
                return false;
            }
        }
        self.content = Some(bytes);
        self.text = OnceCell::new();
        self.updated = true;
        self.imports = None;
        true
    }

    /// Drop loaded content so the next read goes back to disk. Marks the node dirty.
    pub(crate) fn unload(&mut self) {
        self.content = None;
        self.text = OnceCell::new();
        self.updated = true;
    }

    pub(crate) fn add_created_file(&mut self, id: NodeId) {
        if !self.created_files.contains(&id) {
            self.created_files.push(id);
        }
    }
}

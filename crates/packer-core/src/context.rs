use crate::cache::FileCache;
use crate::config::PackerConfig;
use crate::error::Result;
use crate::node::NodeId;
use crate::stage::Stage;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a plugin sees during a pass.
#[derive(Debug)]
pub struct BuildContext {
    pub config: Arc<PackerConfig>,
    pub cache: FileCache,
    pub stage: Stage,
    /// Script entries registered for the current pass.
    pub js_entries: Vec<NodeId>,
}

impl BuildContext {
    pub fn new(config: PackerConfig) -> Self {
        let cache = FileCache::new(config.context.clone())
            .with_skip_dependency_dirs(config.watch.skip_dependency_dirs);
        Self {
            config: Arc::new(config),
            cache,
            stage: Stage::new(),
            js_entries: Vec::new(),
        }
    }

    pub fn normalize_name(&self, name: impl AsRef<Path>) -> PathBuf {
        self.cache.normalize_name(name)
    }

    pub fn normalize_dest_name(&self, name: impl AsRef<Path>) -> PathBuf {
        self.config.normalize_dest_name(name)
    }

    pub fn relative_to_dest(&self, id: NodeId) -> String {
        self.config.relative_to_dest(self.cache.node(id).path())
    }

    pub fn in_dest_folder(&self, id: NodeId) -> bool {
        self.config.in_dest_folder(self.cache.node(id).path())
    }

    pub fn add_js_entry(&mut self, id: NodeId) {
        if !self.js_entries.contains(&id) {
            self.js_entries.push(id);
        }
    }

    /// Forget per-pass state before the pipeline runs again.
    pub fn begin_pass(&mut self) {
        self.stage.clear();
        self.js_entries.clear();
        self.cache.forget_absent();
    }
}

/// A named asynchronous build step. State a plugin carries between passes lives in
/// its own fields.
#[async_trait]
pub trait Plugin: Send {
    fn name(&self) -> &str;

    async fn apply(&mut self, ctx: &mut BuildContext) -> Result<()>;
}

// ABOUTME: Build orchestrator that runs the plugin pipeline once per pass
// ABOUTME: Writes dirty staged outputs under the destination root and reports what changed

use crate::performance::Performance;
use packer_core::{BuildContext, PackerConfig, PackerError, Plugin, Result};
use rustc_hash::FxHashSet;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackerState {
    Idle,
    Running,
    Failed,
}

/// Outputs of one pass, as paths relative to the destination root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackerResult {
    pub emitted_files: Vec<String>,
    /// Outputs written to disk this pass.
    pub changed_files: Vec<String>,
    pub emitted_js_files: Vec<String>,
    pub emitted_css_files: Vec<String>,
}

/// Owns the file graph and the pipeline for the lifetime of the process.
pub struct Packer {
    pub(crate) ctx: BuildContext,
    plugins: Vec<Box<dyn Plugin>>,
    state: PackerState,
    performance: Performance,
    written: FxHashSet<PathBuf>,
    runs: u64,
    last_result: Option<PackerResult>,
}

impl Packer {
    pub fn new(config: PackerConfig) -> Self {
        Self {
            ctx: BuildContext::new(config),
            plugins: Vec::new(),
            state: PackerState::Idle,
            performance: Performance::new(),
            written: FxHashSet::default(),
            runs: 0,
            last_result: None,
        }
    }

    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut BuildContext {
        &mut self.ctx
    }

    pub fn state(&self) -> PackerState {
        self.state
    }

    pub fn performance(&self) -> &Performance {
        &self.performance
    }

    /// Passes attempted so far, failed ones included.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn last_result(&self) -> Option<&PackerResult> {
        self.last_result.as_ref()
    }

    /// Run every plugin, then write the dirty outputs. Dirty flags survive a failed pass
    /// so the next one sees the same changes.
    pub async fn run(&mut self) -> Result<PackerResult> {
        self.state = PackerState::Running;
        self.runs += 1;
        let started = Instant::now();
        self.ctx.begin_pass();

        let outcome = match self.run_plugins().await {
            Ok(()) => self.emit().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                self.ctx.cache.reset_updated_files();
                self.state = PackerState::Idle;
                self.performance.report(started.elapsed());
                info!(
                    "Emitted {} files, {} changed",
                    result.emitted_files.len(),
                    result.changed_files.len()
                );
                self.last_result = Some(result.clone());
                Ok(result)
            }
            Err(e) => {
                self.state = PackerState::Failed;
                error!("Build failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run_plugins(&mut self) -> Result<()> {
        for plugin in self.plugins.iter_mut() {
            let started = Instant::now();
            let applied = plugin.apply(&mut self.ctx).await;
            self.performance.record(plugin.name(), started.elapsed());
            if let Err(e) = applied {
                debug!("Plugin {} stopped the pass", plugin.name());
                return Err(e);
            }
        }
        Ok(())
    }

    async fn emit(&mut self) -> Result<PackerResult> {
        let mut result = PackerResult::default();

        for id in self.ctx.stage.to_vec() {
            if !self.ctx.in_dest_folder(id) || self.ctx.cache.node(id).is_dir() {
                continue;
            }
            let rel = self.ctx.relative_to_dest(id);
            let path = self.ctx.cache.node(id).path().to_path_buf();
            let extension = self.ctx.cache.node(id).extension();
            let dirty = self.ctx.cache.node(id).is_updated() || !self.written.contains(&path);

            if dirty {
                let content = self.ctx.cache.read_content(id, false)?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| PackerError::file_io(parent, e))?;
                }
                tokio::fs::write(&path, &content)
                    .await
                    .map_err(|e| PackerError::file_io(&path, e))?;
                info!("Wrote {}", rel);
                self.written.insert(path);
                result.changed_files.push(rel.clone());
            }

            match extension.as_str() {
                "js" => result.emitted_js_files.push(rel.clone()),
                "css" => result.emitted_css_files.push(rel.clone()),
                _ => {}
            }
            result.emitted_files.push(rel);
        }
        Ok(result)
    }
}

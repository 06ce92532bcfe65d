use crate::sourcemap::SourceMap;
use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use packer_core::hash::short_hash;
use packer_core::{BuildContext, NodeId, Plugin, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rename staged outputs to `<stem>_<hash>.<ext>`.
#[derive(Debug, Clone, Default)]
pub struct ContentHash {
    filter: Option<GlobMatcher>,
}

impl ContentHash {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only hash outputs whose dest-relative path matches `pattern`.
    pub fn with_filter(pattern: &str) -> Result<Self> {
        Ok(Self {
            filter: Some(Glob::new(pattern)?.compile_matcher()),
        })
    }

    fn accepts(&self, ctx: &BuildContext, id: NodeId) -> bool {
        let node = ctx.cache.node(id);
        if !node.name_can_be_hashed() || node.extension() == "map" || !ctx.in_dest_folder(id) {
            return false;
        }
        self.filter
            .as_ref()
            .map_or(true, |m| m.is_match(ctx.relative_to_dest(id)))
    }
}

/// `<stem>_<hash>.<ext>` beside `original`.
pub fn hashed_name(original: &Path, content: &[u8]) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match original.extension() {
        Some(ext) => format!("{stem}_{}.{}", short_hash(content), ext.to_string_lossy()),
        None => format!("{stem}_{}", short_hash(content)),
    };
    original.with_file_name(name)
}

/// Point the bundle's sibling map at the bundle's current name.
fn sync_map_file(ctx: &mut BuildContext, id: NodeId) -> Result<()> {
    let map_path = PathBuf::from(format!(
        "{}.map",
        ctx.cache.node(id).original_path().display()
    ));
    let Some(map_id) = ctx.cache.lookup_generated(&map_path) else {
        return Ok(());
    };
    if !ctx.cache.node(map_id).is_generated() {
        return Ok(());
    }
    let mut map = SourceMap::from_json(&map_path, &ctx.cache.read_text(map_id, false)?)?;
    let name = ctx.cache.node(id).file_name();
    if map.file.as_deref() == Some(name.as_str()) {
        return Ok(());
    }
    map.file = Some(name);
    ctx.cache.set_content(map_id, map.to_json()?);
    Ok(())
}

#[async_trait]
impl Plugin for ContentHash {
    fn name(&self) -> &str {
        "hash"
    }

    async fn apply(&mut self, ctx: &mut BuildContext) -> Result<()> {
        for id in ctx.stage.to_vec() {
            if !self.accepts(ctx, id) {
                continue;
            }
            let content = ctx.cache.read_content(id, false)?;
            let renamed = hashed_name(ctx.cache.node(id).original_path(), &content);
            if renamed != ctx.cache.node(id).path() {
                debug!("{} -> {}", ctx.relative_to_dest(id), renamed.display());
                ctx.cache.rename(id, renamed);
            }
            sync_map_file(ctx, id)?;
        }
        Ok(())
    }
}

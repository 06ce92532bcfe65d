use async_trait::async_trait;
use packer_core::{BuildContext, PackerError, Plugin, Result};
use std::path::PathBuf;

/// Register one more script entry for the bundling step.
#[derive(Debug, Clone)]
pub struct JsEntry {
    path: PathBuf,
}

impl JsEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Plugin for JsEntry {
    fn name(&self) -> &str {
        "js-entry"
    }

    async fn apply(&mut self, ctx: &mut BuildContext) -> Result<()> {
        let path = ctx.normalize_name(&self.path);
        match ctx.cache.stat(&path)? {
            Some(id) if ctx.cache.node(id).is_file() => {
                ctx.add_js_entry(id);
                Ok(())
            }
            _ => Err(PackerError::EntryNotFound(path)),
        }
    }
}

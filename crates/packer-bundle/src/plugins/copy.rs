use async_trait::async_trait;
use packer_core::{BuildContext, Plugin, Result};
use tracing::debug;

/// Mirror matching files into the output root under the same relative path.
#[derive(Debug, Clone)]
pub struct CopyFiles {
    patterns: Vec<String>,
}

impl CopyFiles {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Plugin for CopyFiles {
    fn name(&self) -> &str {
        "copy"
    }

    async fn apply(&mut self, ctx: &mut BuildContext) -> Result<()> {
        for pattern in &self.patterns {
            for id in ctx.cache.find_files(pattern)? {
                if !ctx.cache.node(id).is_file() || ctx.in_dest_folder(id) {
                    continue;
                }
                let dest = ctx.normalize_dest_name(ctx.cache.relative_name(id));

                if !ctx.cache.node(id).is_updated() {
                    if let Some(existing) = ctx.cache.lookup_generated(&dest) {
                        ctx.stage.add(existing);
                        continue;
                    }
                }
                let content = ctx.cache.read_content(id, false)?;
                let copy = ctx.cache.create_generated_from(&dest, content, Some(id));
                debug!("Copied {} to {}", ctx.cache.relative_name(id), dest.display());
                ctx.stage.add(copy);
            }
        }
        Ok(())
    }
}

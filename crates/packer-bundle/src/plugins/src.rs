use async_trait::async_trait;
use packer_core::{BuildContext, Plugin, Result};
use tracing::debug;

/// Stage every file matching the given globs.
#[derive(Debug, Clone)]
pub struct Src {
    patterns: Vec<String>,
}

impl Src {
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
impl Plugin for Src {
    fn name(&self) -> &str {
        "src"
    }

    async fn apply(&mut self, ctx: &mut BuildContext) -> Result<()> {
        for pattern in &self.patterns {
            let matches = ctx.cache.find_files(pattern)?;
            debug!("{} matched {} files", pattern, matches.len());
            for id in matches {
                if ctx.cache.node(id).is_file() {
                    ctx.stage.add(id);
                }
            }
        }
        Ok(())
    }
}

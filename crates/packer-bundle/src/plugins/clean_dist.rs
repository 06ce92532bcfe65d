use async_trait::async_trait;
use packer_core::{BuildContext, Plugin, Result};
use tracing::{debug, warn};

/// Delete files under the output root that no plugin generated, such as bundles left
/// behind under an older hashed name.
#[derive(Debug, Clone, Default)]
pub struct CleanDist;

impl CleanDist {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for CleanDist {
    fn name(&self) -> &str {
        "clean-dist"
    }

    async fn apply(&mut self, ctx: &mut BuildContext) -> Result<()> {
        let pattern = format!("{}/**/*", ctx.config.dest.display());
        for id in ctx.cache.find_files(&pattern)? {
            let node = ctx.cache.node(id);
            if !node.is_file() || node.is_generated() {
                continue;
            }
            let path = node.path().to_path_buf();
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed stale {}", ctx.relative_to_dest(id));
                    ctx.cache.mark_removed(id);
                }
                Err(e) => warn!("Cannot remove {}: {}", path.display(), e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packer_core::PackerConfig;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_only_files_nobody_generated_are_removed() {
        let dir = TempDir::new().unwrap();
        let config = PackerConfig::for_context(dir.path()).unwrap();
        let dest = config.dest.clone();
        fs::create_dir_all(dest.join("css")).unwrap();
        fs::write(dest.join("app_0000aaaa.js"), "old").unwrap();
        fs::write(dest.join("css/old.css"), "old").unwrap();
        fs::write(dest.join("app_1111bbbb.js"), "current").unwrap();

        let mut ctx = BuildContext::new(config);
        let current = ctx
            .cache
            .create_generated_from(dest.join("app.js"), "current", None);
        ctx.cache.rename(current, dest.join("app_1111bbbb.js"));

        tokio_test::block_on(CleanDist::new().apply(&mut ctx)).unwrap();
        assert!(!dest.join("app_0000aaaa.js").exists());
        assert!(!dest.join("css/old.css").exists());
        assert!(dest.join("app_1111bbbb.js").exists());
        assert_eq!(ctx.cache.lookup(dest.join("app_0000aaaa.js")), None);
        assert_eq!(ctx.cache.lookup(dest.join("app_1111bbbb.js")), Some(current));
    }

    #[test]
    fn test_missing_output_root_is_fine() {
        let dir = TempDir::new().unwrap();
        let mut ctx = BuildContext::new(PackerConfig::for_context(dir.path()).unwrap());
        tokio_test::block_on(CleanDist::new().apply(&mut ctx)).unwrap();
    }
}

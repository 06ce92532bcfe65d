use async_trait::async_trait;
use packer_core::{BuildContext, Plugin, Result};
use tracing::debug;

type Predicate = Box<dyn Fn(&BuildContext) -> bool + Send>;

/// Run the wrapped plugin only on passes where `enabled` holds.
pub struct Conditional {
    enabled: Predicate,
    plugin: Box<dyn Plugin>,
}

impl Conditional {
    pub fn new(
        enabled: impl Fn(&BuildContext) -> bool + Send + 'static,
        plugin: impl Plugin + 'static,
    ) -> Self {
        Self {
            enabled: Box::new(enabled),
            plugin: Box::new(plugin),
        }
    }
}

#[async_trait]
impl Plugin for Conditional {
    fn name(&self) -> &str {
        self.plugin.name()
    }

    async fn apply(&mut self, ctx: &mut BuildContext) -> Result<()> {
        if !(self.enabled)(&*ctx) {
            debug!("Skipping {}", self.plugin.name());
            return Ok(());
        }
        self.plugin.apply(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packer_core::PackerConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Plugin for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn apply(&mut self, _ctx: &mut BuildContext) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_wrapped_plugin_runs_only_when_enabled() {
        let dir = TempDir::new().unwrap();
        let mut ctx = BuildContext::new(PackerConfig::for_context(dir.path()).unwrap());
        let runs = Arc::new(AtomicUsize::new(0));
        let mut off = Conditional::new(|_| false, Counting(runs.clone()));
        let mut on = Conditional::new(|ctx| ctx.js_entries.is_empty(), Counting(runs.clone()));

        tokio_test::block_on(off.apply(&mut ctx)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        tokio_test::block_on(on.apply(&mut ctx)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(on.name(), "counting");
    }
}

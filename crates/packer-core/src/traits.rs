use crate::Result;
use std::path::Path;

/// Registers paths with a filesystem notification backend. Change events flow back
/// through whatever channel the implementation was built with.
pub trait PathWatcher {
    fn watch(&mut self, path: &Path) -> Result<()>;
}

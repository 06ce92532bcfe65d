use crate::combiner::{combine, BundleKind, CombineOutcome, CombineRequest};
use async_trait::async_trait;
use packer_core::{
    BuildContext, FileCache, ImportTarget, NodeId, PackerError, Plugin, Result, Target,
};
use packer_parser::{is_script, ImportScanner, Resolver};
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

const REGISTRY: &str = "(function (__hostRequire) {
var __modules = {};
var __instances = {};
function __packer(id, factory) {
  __modules[id] = factory;
}
function require(id) {
  if (typeof id === 'string') {
    if (__hostRequire) return __hostRequire(id);
    throw new Error('Cannot find module \\'' + id + '\\'');
  }
  var cached = __instances[id];
  if (cached) return cached.exports;
  var module = __instances[id] = { exports: {} };
  __modules[id].call(module.exports, require, module, module.exports);
  return module.exports;
}
";

const BROWSER_GLOBALS: &str = "var global = window;
var process = { env: {}, browser: true };
";

const CLOSING: &str = "\n})(typeof require === 'function' ? require : null);\n";

/// Bundle every script reachable from the pass's entries into one file.
#[derive(Debug)]
pub struct CombineJs {
    entry: Option<PathBuf>,
    outfile: PathBuf,
    resolver: Option<Resolver>,
}

impl CombineJs {
    /// `outfile` is taken relative to the output root.
    pub fn new(outfile: impl Into<PathBuf>) -> Self {
        Self {
            entry: None,
            outfile: outfile.into(),
            resolver: None,
        }
    }

    pub fn with_entry(mut self, entry: impl Into<PathBuf>) -> Self {
        self.entry = Some(entry.into());
        self
    }
}

/// Module ids in depth-first preorder from the entries. Non-script targets get ids too
/// and are returned separately.
fn number_modules(
    cache: &FileCache,
    entries: &[NodeId],
) -> (Vec<NodeId>, Vec<NodeId>, FxHashMap<NodeId, usize>) {
    let mut ids = FxHashMap::default();
    let mut scripts = Vec::new();
    let mut assets = Vec::new();
    let mut stack: Vec<NodeId> = entries.iter().rev().copied().collect();

    while let Some(id) = stack.pop() {
        if ids.contains_key(&id) {
            continue;
        }
        ids.insert(id, ids.len());
        if !is_script(cache, id) {
            assets.push(id);
            continue;
        }
        scripts.push(id);
        for import in cache.node(id).imports().unwrap_or_default().iter().rev() {
            if let ImportTarget::Node(target) = import.target {
                if !ids.contains_key(&target) {
                    stack.push(target);
                }
            }
        }
    }
    (scripts, assets, ids)
}

/// Module text with every bundled import literal swapped for its id, padded to the
/// literal's width so later offsets stay put.
fn substitute_ids(
    cache: &mut FileCache,
    id: NodeId,
    ids: &FxHashMap<NodeId, usize>,
) -> Result<String> {
    let mut text = cache.read_text(id, false)?.to_string();
    let imports = cache.node(id).imports().unwrap_or_default();
    for import in imports.iter().rev() {
        let ImportTarget::Node(target) = import.target else {
            continue;
        };
        let Some(module_id) = ids.get(&target) else {
            continue;
        };
        if text.get(import.start..import.end).is_none() {
            warn!(
                "Stale import span for {} in {}",
                import.specifier,
                cache.relative_name(id)
            );
            continue;
        }
        let width = import.end - import.start;
        text.replace_range(import.start..import.end, &format!("{module_id:<width$}"));
    }
    Ok(text)
}

#[async_trait]
impl Plugin for CombineJs {
    fn name(&self) -> &str {
        "combine-js"
    }

    async fn apply(&mut self, ctx: &mut BuildContext) -> Result<()> {
        if let Some(entry) = &self.entry {
            let path = ctx.normalize_name(entry);
            match ctx.cache.stat(&path)? {
                Some(id) if ctx.cache.node(id).is_file() => ctx.add_js_entry(id),
                _ => return Err(PackerError::EntryNotFound(path)),
            }
        }
        let entries = ctx.js_entries.clone();
        if entries.is_empty() {
            debug!("No script entries this pass");
            return Ok(());
        }

        let config = ctx.config.clone();
        let resolver = self
            .resolver
            .get_or_insert_with(|| Resolver::from_config(&config));
        let mut scanner = ImportScanner::new(resolver);
        for &entry in &entries {
            scanner.scan(&mut ctx.cache, &mut ctx.stage, entry)?;
        }

        let (scripts, assets, ids) = number_modules(&ctx.cache, &entries);
        let mut prelude = String::from(REGISTRY);
        if config.target == Target::Browser {
            prelude.push_str(BROWSER_GLOBALS);
        }
        let mut epilogue = String::new();
        for asset in &assets {
            epilogue.push_str(&format!("\n__packer({}, function() {{}});", ids[asset]));
        }
        for entry in &entries {
            epilogue.push_str(&format!("\nrequire({});", ids[entry]));
        }
        epilogue.push_str(CLOSING);

        let header = |id: NodeId| {
            format!(
                "__packer({}, function(require, module, exports) {{\n",
                ids[&id]
            )
        };
        let footer = |_: NodeId| "\n});\n".to_string();
        let outfile = ctx.normalize_dest_name(&self.outfile);
        let request = CombineRequest {
            kind: BundleKind::Script,
            files: &scripts,
            outfile: &outfile,
            prelude: &prelude,
            epilogue: &epilogue,
            header: Some(&header),
            footer: Some(&footer),
            source_maps: config.source_map,
        };

        let outcome = combine(&mut ctx.cache, &mut ctx.stage, &request, |cache, id| {
            substitute_ids(cache, id, &ids)
        })?;
        if let CombineOutcome::Written { warnings, .. } = &outcome {
            debug!(
                "{} modules bundled, {} map warnings",
                scripts.len(),
                warnings.len()
            );
        }
        Ok(())
    }
}

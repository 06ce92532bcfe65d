use crate::combiner::{combine, BundleKind, CombineRequest};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use packer_core::paths::absolutize;
use packer_core::{
    BuildContext, FileCache, Import, ImportTarget, NodeId, PackerConfig, PackerError, Plugin,
    Result,
};
use packer_parser::css::strip_query;
use packer_parser::{find_references, is_local_reference, CssReference, CssReferenceKind};
use rustc_hash::FxHashSet;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Bundle every staged stylesheet that lives outside the output root.
#[derive(Debug, Clone)]
pub struct CombineCss {
    outfile: PathBuf,
}

impl CombineCss {
    /// `outfile` is taken relative to the output root.
    pub fn new(outfile: impl Into<PathBuf>) -> Self {
        Self {
            outfile: outfile.into(),
        }
    }
}

pub fn mime_type(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        _ => "application/octet-stream",
    }
}

/// 0-based line and character column of a byte offset.
fn position(text: &str, offset: usize) -> (u32, u32) {
    let before = &text[..offset];
    let line = before.matches('\n').count();
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    (line as u32, before[line_start..].chars().count() as u32)
}

/// Root-relative references are taken from the project root.
fn reference_path(cache: &FileCache, id: NodeId, value: &str) -> PathBuf {
    let path = strip_query(value);
    match path.strip_prefix('/') {
        Some(rooted) => absolutize(cache.context(), rooted.as_ref()),
        None => absolutize(cache.node(id).dir(), path.as_ref()),
    }
}

/// Resolve the stylesheet's references, record them as its imports and return the
/// files it pulls in with `@import`, in order.
fn record_references(cache: &mut FileCache, id: NodeId) -> Result<Vec<NodeId>> {
    let text = cache.read_text(id, false)?;
    let mut imports = Vec::new();
    let mut nested = Vec::new();

    for reference in find_references(&text) {
        if !is_local_reference(&reference.value) {
            continue;
        }
        let path = reference_path(cache, id, &reference.value);
        let target = cache.stat(&path)?.filter(|&t| cache.node(t).is_file());
        let (line, column) = position(&text, reference.value_start);

        match (reference.kind, target) {
            (CssReferenceKind::Import, None) => {
                return Err(PackerError::Resolution {
                    specifier: reference.value,
                    file: cache.node(id).path().to_path_buf(),
                    line: line + 1,
                    column: column + 1,
                    start: reference.value_start,
                    end: reference.value_end,
                });
            }
            (CssReferenceKind::Url, None) => {
                warn!(
                    "{}:{}:{} references missing file {}",
                    cache.relative_name(id),
                    line + 1,
                    column + 1,
                    reference.value
                );
                continue;
            }
            (CssReferenceKind::Import, Some(t)) => nested.push(t),
            (CssReferenceKind::Url, Some(_)) => {}
        }

        if let Some(t) = target {
            imports.push(Import {
                specifier: reference.value,
                target: ImportTarget::Node(t),
                start: reference.value_start,
                end: reference.value_end,
                line,
                column,
            });
        }
    }

    let node = cache.node(id);
    if node.is_updated() || node.imports().is_none() {
        cache.set_imports(id, imports);
    }
    Ok(nested)
}

/// Stylesheets in output order: every `@import`ed file ahead of its importer, each once.
fn stylesheet_order(cache: &mut FileCache, roots: &[NodeId]) -> Result<Vec<NodeId>> {
    fn visit(
        cache: &mut FileCache,
        id: NodeId,
        seen: &mut FxHashSet<NodeId>,
        order: &mut Vec<NodeId>,
    ) -> Result<()> {
        if !seen.insert(id) {
            return Ok(());
        }
        for nested in record_references(cache, id)? {
            visit(cache, nested, seen, order)?;
        }
        order.push(id);
        Ok(())
    }

    let mut seen = FxHashSet::default();
    let mut order = Vec::new();
    for &root in roots {
        visit(cache, root, &mut seen, &mut order)?;
    }
    Ok(order)
}

fn blank(statement: &str) -> String {
    statement
        .chars()
        .map(|c| if c == '\n' { '\n' } else { ' ' })
        .collect()
}

/// Stylesheet text with `@import`s blanked and local `url()`s pointing at inlined data or
/// at copies inside the output root. Copies are pushed onto `copies`.
fn rewrite(
    cache: &mut FileCache,
    config: &PackerConfig,
    id: NodeId,
    copies: &mut Vec<NodeId>,
) -> Result<String> {
    let mut text = cache.read_text(id, false)?.to_string();
    let references: Vec<CssReference> = find_references(&text);

    for reference in references.iter().rev() {
        if !is_local_reference(&reference.value) {
            continue;
        }
        if reference.kind == CssReferenceKind::Import {
            let blanked = blank(&text[reference.start..reference.end]);
            text.replace_range(reference.start..reference.end, &blanked);
            continue;
        }

        let path = reference_path(cache, id, &reference.value);
        let Some(asset) = cache.stat(&path)?.filter(|&a| cache.node(a).is_file()) else {
            continue;
        };
        let content = cache.read_content(asset, false)?;
        let replacement = if content.len() as u64 <= config.inline_size_limit {
            format!(
                "data:{};base64,{}",
                mime_type(&cache.node(asset).extension()),
                STANDARD.encode(&content)
            )
        } else {
            let dest = config.normalize_dest_name(cache.relative_name(asset));
            let copy = cache.create_generated_from(&dest, &content, Some(id));
            copies.push(copy);
            let suffix = &reference.value[strip_query(&reference.value).len()..];
            format!(
                "{}{}{}",
                config.public_path,
                config.relative_to_dest(&dest),
                suffix
            )
        };
        text.replace_range(reference.value_start..reference.value_end, &replacement);
    }
    Ok(text)
}

#[async_trait]
impl Plugin for CombineCss {
    fn name(&self) -> &str {
        "combine-css"
    }

    async fn apply(&mut self, ctx: &mut BuildContext) -> Result<()> {
        let roots: Vec<NodeId> = ctx
            .stage
            .iter()
            .filter(|&id| ctx.cache.node(id).extension() == "css" && !ctx.in_dest_folder(id))
            .collect();
        if roots.is_empty() {
            debug!("No stylesheets staged");
            return Ok(());
        }

        let files = stylesheet_order(&mut ctx.cache, &roots)?;
        let config = ctx.config.clone();
        let outfile = ctx.normalize_dest_name(&self.outfile);
        let footer = |_: NodeId| "\n".to_string();
        let request = CombineRequest {
            kind: BundleKind::Stylesheet,
            files: &files,
            outfile: &outfile,
            prelude: "",
            epilogue: "",
            header: None,
            footer: Some(&footer),
            source_maps: config.source_map,
        };

        let mut copies = Vec::new();
        combine(&mut ctx.cache, &mut ctx.stage, &request, |cache, id| {
            rewrite(cache, &config, id, &mut copies)
        })?;
        for copy in copies {
            ctx.stage.add(copy);
        }
        Ok(())
    }
}

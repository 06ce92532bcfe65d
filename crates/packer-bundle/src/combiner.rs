use crate::sourcemap::{extract_map_reference, MapReference, SourceMap, SourceMapWriter};
use packer_core::paths::{normalize_path, relative_url};
use packer_core::{FileCache, NodeId, Result, Stage};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    Script,
    Stylesheet,
}

impl BundleKind {
    fn map_reference(self, map_name: &str) -> String {
        match self {
            BundleKind::Script => format!("\n//# sourceMappingURL={map_name}"),
            BundleKind::Stylesheet => format!("\n/*# sourceMappingURL={map_name} */"),
        }
    }
}

type Wrapper<'a> = &'a dyn Fn(NodeId) -> String;

/// One bundle to assemble.
pub struct CombineRequest<'a> {
    pub kind: BundleKind,
    /// Inputs in output order.
    pub files: &'a [NodeId],
    pub outfile: &'a Path,
    /// Boilerplate before the first input.
    pub prelude: &'a str,
    /// Boilerplate after the last input.
    pub epilogue: &'a str,
    pub header: Option<Wrapper<'a>>,
    pub footer: Option<Wrapper<'a>>,
    pub source_maps: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombineOutcome {
    /// No input was dirty; the previous outputs were re-staged.
    Reused,
    Written {
        bundle: NodeId,
        map: Option<NodeId>,
        warnings: Vec<String>,
    },
    /// Nothing to combine.
    Empty,
}

/// Merge `request.files` into one generated bundle (plus a sibling `.map`), attributed
/// to the first input. `content` supplies each input's text.
pub fn combine(
    cache: &mut FileCache,
    stage: &mut Stage,
    request: &CombineRequest<'_>,
    mut content: impl FnMut(&mut FileCache, NodeId) -> Result<String>,
) -> Result<CombineOutcome> {
    let Some(&first) = request.files.first() else {
        return Ok(CombineOutcome::Empty);
    };

    let dirty = request.files.iter().any(|&id| cache.node(id).is_updated());
    if !dirty && cache.lookup_generated(request.outfile).is_some() {
        for &id in request.files {
            for created in cache.node(id).created_files().to_vec() {
                stage.add(created);
            }
        }
        for &id in request.files {
            stage.remove(id);
        }
        debug!("Reusing {}", request.outfile.display());
        return Ok(CombineOutcome::Reused);
    }

    let out_dir = request
        .outfile
        .parent()
        .unwrap_or(Path::new("/"))
        .to_path_buf();
    let mut writer = SourceMapWriter::new();
    let mut bulk = String::from(request.prelude);
    writer.skip_code(request.prelude);

    for &id in request.files {
        let header = request.header.map(|h| h(id)).unwrap_or_default();
        let footer = request.footer.map(|f| f(id)).unwrap_or_default();
        let mut text = content(cache, id)?;

        if request.source_maps {
            let (stripped, reference) = extract_map_reference(&text);
            text = stripped;
            writer.skip_code(&header);
            match load_upstream_map(cache, stage, id, reference, &out_dir)? {
                Some(map) => writer.put_exist_source_map(&text, &map, cache.node(id).path())?,
                None => {
                    let name = relative_url(&out_dir, cache.node(id).path());
                    writer.put_file(&text, &name);
                }
            }
            writer.skip_code(&footer);
        }

        stage.remove(id);
        bulk.push_str(&header);
        bulk.push_str(&text);
        bulk.push_str(&footer);
    }

    bulk.push_str(request.epilogue);
    let mut map_id = None;
    let mut warnings = Vec::new();
    if request.source_maps {
        writer.skip_code(request.epilogue);
        warnings = writer.warnings().to_vec();
        let mut map = writer.into_source_map();
        let bundle_name = file_name(request.outfile);
        map.file = Some(bundle_name.clone());

        let map_path = PathBuf::from(format!("{}.map", request.outfile.display()));
        let id = cache.create_generated_from(&map_path, map.to_json()?, Some(first));
        cache.node_mut(id).set_name_can_be_hashed(false);
        stage.add(id);
        bulk.push_str(&request.kind.map_reference(&file_name(&map_path)));
        map_id = Some(id);
    }

    let bundle = cache.create_generated_from(request.outfile, bulk, Some(first));
    stage.add(bundle);
    info!(
        "Combined {} files into {}",
        request.files.len(),
        request.outfile.display()
    );
    Ok(CombineOutcome::Written {
        bundle,
        map: map_id,
        warnings,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Load the map an input points at and rewrite its sources relative to `out_dir`.
fn load_upstream_map(
    cache: &mut FileCache,
    stage: &mut Stage,
    id: NodeId,
    reference: Option<MapReference>,
    out_dir: &Path,
) -> Result<Option<SourceMap>> {
    let file_path = cache.node(id).path().to_path_buf();
    let file_dir = cache.node(id).dir().to_path_buf();

    let (mut map, map_dir) = match reference {
        None => return Ok(None),
        Some(MapReference::Inline(json)) => (SourceMap::from_json(&file_path, &json)?, file_dir),
        Some(MapReference::External(url)) => {
            let map_path = normalize_path(&file_dir.join(&url));
            let Some(map_id) = cache.stat(&map_path)? else {
                warn!(
                    "{} references missing source map {}",
                    file_path.display(),
                    map_path.display()
                );
                return Ok(None);
            };
            let json = cache.read_text(map_id, false)?;
            stage.remove(map_id);
            if cache.node(map_id).is_generated() {
                cache.node_mut(map_id).set_updated(false);
            }
            (
                SourceMap::from_json(&map_path, &json)?,
                cache.node(map_id).dir().to_path_buf(),
            )
        }
    };

    let root = map_dir.join(map.source_root.as_deref().unwrap_or(""));
    let mut contents = Vec::with_capacity(map.sources.len());
    for (i, source) in map.sources.iter_mut().enumerate() {
        let real = normalize_path(&root.join(source.as_str()));
        let embedded = map.sources_content.get(i).cloned().flatten();
        let content = match embedded {
            Some(c) => Some(c),
            None => match cache.stat(&real)? {
                Some(src) if cache.node(src).is_file() => {
                    Some(cache.read_text(src, false)?.to_string())
                }
                _ => None,
            },
        };
        contents.push(content);
        *source = relative_url(out_dir, &real);
    }
    map.sources_content = contents;
    map.source_root = None;
    Ok(Some(map))
}

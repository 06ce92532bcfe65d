use crate::vlq::{decode_mappings, encode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use packer_core::{PackerError, Result};
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

/// Version 3 source map document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub source_root: Option<String>,
    pub sources: Vec<String>,
    #[serde(default)]
    pub sources_content: Vec<Option<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn from_json(origin: &Path, text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| PackerError::SourceMap {
            file: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Where a file said its map lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapReference {
    /// Decoded JSON of an inline `data:` URI.
    Inline(String),
    /// URL of a sibling `.map` file, relative to the referencing file.
    External(String),
}

static MAP_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?://[#@][ \t]+sourceMappingURL=([^\s'\x22]+)[ \t]*|/\*[#@][ \t]+sourceMappingURL=([^\s*'\x22]+)[ \t]*\*/[ \t]*)\r?$",
    )
    .expect("source map comment pattern is valid")
});

/// Remove every `sourceMappingURL` comment from `content`. The last one wins.
pub fn extract_map_reference(content: &str) -> (String, Option<MapReference>) {
    let mut last = None;
    for caps in MAP_COMMENT.captures_iter(content) {
        if let Some(url) = caps.get(1).or_else(|| caps.get(2)) {
            last = Some(url.as_str().to_string());
        }
    }
    let Some(url) = last else {
        return (content.to_string(), None);
    };
    let stripped = MAP_COMMENT.replace_all(content, "").into_owned();

    let reference = if let Some(data) = url.strip_prefix("data:") {
        match data.split_once(";base64,") {
            Some((_, payload)) => match STANDARD.decode(payload) {
                Ok(bytes) => Some(MapReference::Inline(
                    String::from_utf8_lossy(&bytes).into_owned(),
                )),
                Err(e) => {
                    warn!("Ignoring undecodable inline source map: {}", e);
                    None
                }
            },
            None => {
                warn!("Ignoring inline source map without base64 payload");
                None
            }
        }
    } else {
        Some(MapReference::External(url))
    };
    (stripped, reference)
}

/// Incrementally builds one composed map for a bundle.
///
/// Generated columns count UTF-16 code units. Sources and names are deduplicated in
/// first-seen order.
#[derive(Debug, Default)]
pub struct SourceMapWriter {
    mappings: String,
    sources: Vec<String>,
    sources_content: Vec<Option<String>>,
    source_index: FxHashMap<String, u32>,
    names: Vec<String>,
    name_index: FxHashMap<String, u32>,
    gen_line: u32,
    gen_column: u32,
    prev_gen_column: u32,
    prev_source: i64,
    prev_line: i64,
    prev_column: i64,
    prev_name: i64,
    line_has_segment: bool,
    warnings: Vec<String>,
}

impl SourceMapWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generated_line(&self) -> u32 {
        self.gen_line
    }

    pub fn generated_column(&self) -> u32 {
        self.gen_column
    }

    /// Line-count mismatches recovered while splicing upstream maps.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn add_source(&mut self, name: &str, content: Option<&str>) -> u32 {
        if let Some(&idx) = self.source_index.get(name) {
            let slot = &mut self.sources_content[idx as usize];
            if slot.is_none() {
                *slot = content.map(str::to_string);
            }
            return idx;
        }
        let idx = self.sources.len() as u32;
        self.sources.push(name.to_string());
        self.sources_content.push(content.map(str::to_string));
        self.source_index.insert(name.to_string(), idx);
        idx
    }

    fn add_name(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.name_index.get(name) {
            return idx;
        }
        let idx = self.names.len() as u32;
        self.names.push(name.to_string());
        self.name_index.insert(name.to_string(), idx);
        idx
    }

    fn push_segment(&mut self, gen_column: u32, source: u32, line: u32, column: u32, name: Option<u32>) {
        if self.line_has_segment {
            self.mappings.push(',');
        }
        encode(gen_column as i64 - self.prev_gen_column as i64, &mut self.mappings);
        encode(source as i64 - self.prev_source, &mut self.mappings);
        encode(line as i64 - self.prev_line, &mut self.mappings);
        encode(column as i64 - self.prev_column, &mut self.mappings);
        if let Some(name) = name {
            encode(name as i64 - self.prev_name, &mut self.mappings);
            self.prev_name = name as i64;
        }
        self.prev_gen_column = gen_column;
        self.prev_source = source as i64;
        self.prev_line = line as i64;
        self.prev_column = column as i64;
        self.line_has_segment = true;
    }

    fn new_line(&mut self) {
        self.mappings.push(';');
        self.gen_line += 1;
        self.gen_column = 0;
        self.prev_gen_column = 0;
        self.line_has_segment = false;
    }

    /// Move the cursor over text that contains no newline.
    fn advance_inline(&mut self, text: &str) {
        self.gen_column += text.encode_utf16().count() as u32;
    }

    /// Account for emitted text that maps to no source.
    pub fn skip_code(&mut self, text: &str) {
        let mut pieces = text.split('\n');
        if let Some(first) = pieces.next() {
            self.advance_inline(first);
        }
        for piece in pieces {
            self.new_line();
            self.advance_inline(piece);
        }
    }

    /// Append an untransformed file: every generated line maps to the same line of
    /// `source_name`, column 0.
    pub fn put_file(&mut self, text: &str, source_name: &str) {
        let source = self.add_source(source_name, Some(text));
        let pieces: Vec<&str> = text.split('\n').collect();
        let last = pieces.len() - 1;

        for (line, piece) in pieces.iter().enumerate() {
            if line < last || !piece.is_empty() {
                self.push_segment(self.gen_column, source, line as u32, 0, None);
            }
            self.advance_inline(piece);
            if line < last {
                self.new_line();
            }
        }
    }

    /// Append text produced by an upstream transform together with that transform's
    /// map. `upstream.sources` must already be named the way the composed map should
    /// name them. `origin` is only used in diagnostics.
    pub fn put_exist_source_map(
        &mut self,
        generated: &str,
        upstream: &SourceMap,
        origin: &Path,
    ) -> Result<()> {
        let decoded = decode_mappings(&upstream.mappings).map_err(|message| {
            PackerError::SourceMap {
                file: origin.to_path_buf(),
                message,
            }
        })?;

        let source_ids: Vec<u32> = upstream
            .sources
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let content = upstream.sources_content.get(i).and_then(|c| c.as_deref());
                self.add_source(name, content)
            })
            .collect();
        let name_ids: Vec<u32> = upstream.names.iter().map(|n| self.add_name(n)).collect();

        let pieces: Vec<&str> = generated.split('\n').collect();
        let text_lines = pieces.len();
        let trailing_empty = pieces.last().is_some_and(|p| p.is_empty());
        let map_lines = decoded.len();
        if map_lines > text_lines || map_lines + usize::from(trailing_empty) < text_lines {
            let message = format!(
                "{}: source map describes {} lines but the generated text has {}",
                origin.display(),
                map_lines,
                text_lines
            );
            warn!("{}", message);
            self.warnings.push(message);
        }

        for (line, piece) in pieces.iter().enumerate() {
            let base = self.gen_column;
            for segment in decoded.get(line).map(Vec::as_slice).unwrap_or_default() {
                let Some(original) = segment.original else {
                    continue;
                };
                let source = source_ids.get(original.source as usize).copied().ok_or_else(|| {
                    PackerError::SourceMap {
                        file: origin.to_path_buf(),
                        message: format!("segment refers to missing source {}", original.source),
                    }
                })?;
                let name = original
                    .name
                    .and_then(|n| name_ids.get(n as usize).copied());
                self.push_segment(
                    base + segment.gen_column,
                    source,
                    original.line,
                    original.column,
                    name,
                );
            }
            self.advance_inline(piece);
            if line + 1 < text_lines {
                self.new_line();
            }
        }
        Ok(())
    }

    pub fn into_source_map(self) -> SourceMap {
        SourceMap {
            version: 3,
            file: None,
            source_root: Some(String::new()),
            sources: self.sources,
            sources_content: self.sources_content,
            names: self.names,
            mappings: self.mappings,
        }
    }
}

use crate::resolver::{Resolution, Resolver};
use crate::tokenizer::{Token, TokenKind, Tokenizer};
use packer_core::hash::short_hash;
use packer_core::{FileCache, Import, ImportTarget, NodeId, PackerError, Result, Stage};
use rustc_hash::FxHashSet;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const SKIPPED_MODULE_BODY: &str = "/*skipped file*/\nmodule.exports = {}";

/// A `require(` call that does not take exactly one string literal. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub file: PathBuf,
    /// 1-based.
    pub line: u32,
    /// 1-based.
    pub column: u32,
    pub snippet: String,
}

impl std::fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Incorrect {} in {}:{}:{}",
            self.snippet,
            self.file.display(),
            self.line,
            self.column
        )
    }
}

/// A `require("...")` site found in source text, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireSite {
    pub specifier: String,
    /// Span of the literal including its quotes.
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

/// Byte offsets where each line starts.
struct LineIndex(Vec<usize>);

impl LineIndex {
    fn new(code: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(code.match_indices('\n').map(|(i, _)| i + 1));
        Self(starts)
    }

    /// 0-based line and character column of a byte offset.
    fn position(&self, code: &str, offset: usize) -> (u32, u32) {
        let line = self.0.partition_point(|&s| s <= offset).saturating_sub(1);
        let column = code[self.0[line]..offset].chars().count();
        (line as u32, column as u32)
    }
}

fn next_significant(tokens: &[Token], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&i| !tokens[i].is_trivia())
}

fn prev_significant(tokens: &[Token], before: usize) -> Option<usize> {
    (0..before).rev().find(|&i| !tokens[i].is_trivia())
}

fn is_punct(code: &str, tok: &Token, ch: u8) -> bool {
    tok.kind == TokenKind::Punct && code.as_bytes()[tok.start] == ch
}

/// The `.` at `dot` ends a `...` token.
fn is_spread(code: &str, tokens: &[Token], dot: usize) -> bool {
    dot >= 2
        && (dot - 2..dot).all(|j| {
            is_punct(code, &tokens[j], b'.') && tokens[j].end == tokens[j + 1].start
        })
}

/// Find `require("literal")` call sites. Property accesses (`x.require(...)`) and calls
/// whose argument is anything but a single string literal are not imports; the latter
/// come back as `Err` entries so the caller can report them.
pub fn find_requires(code: &str) -> Vec<std::result::Result<RequireSite, (usize, usize)>> {
    let tokens: Vec<Token> = Tokenizer::new(code).collect();
    let lines = LineIndex::new(code);
    let mut out = Vec::new();

    for (i, tok) in tokens.iter().enumerate() {
        if tok.kind != TokenKind::Identifier || tok.text(code) != "require" {
            continue;
        }
        if let Some(prev) = prev_significant(&tokens, i) {
            if is_punct(code, &tokens[prev], b'.') && !is_spread(code, &tokens, prev) {
                continue;
            }
        }
        let Some(open) = next_significant(&tokens, i + 1) else {
            continue;
        };
        if !is_punct(code, &tokens[open], b'(') {
            continue;
        }
        let Some(arg) = next_significant(&tokens, open + 1) else {
            continue;
        };
        let literal = tokens[arg];
        if literal.kind != TokenKind::String || literal.end - literal.start < 2 {
            continue;
        }

        match next_significant(&tokens, arg + 1) {
            Some(close) if is_punct(code, &tokens[close], b')') => {
                let (line, column) = lines.position(code, literal.start);
                out.push(Ok(RequireSite {
                    specifier: code[literal.start + 1..literal.end - 1].to_string(),
                    start: literal.start,
                    end: literal.end,
                    line,
                    column,
                }));
            }
            other => {
                let end = other.map_or(code.len(), |c| tokens[c].end);
                out.push(Err((tok.start, end)));
            }
        }
    }
    out
}

/// Walks the script graph from an entry, resolving and recording import edges.
///
/// One scanner is used per pass: each node is visited at most once, so shared
/// dependencies are expanded a single time.
pub struct ImportScanner<'r> {
    resolver: &'r mut Resolver,
    scanned: FxHashSet<NodeId>,
    diagnostics: Vec<ParseDiagnostic>,
}

impl<'r> ImportScanner<'r> {
    pub fn new(resolver: &'r mut Resolver) -> Self {
        Self {
            resolver,
            scanned: FxHashSet::default(),
            diagnostics: Vec::new(),
        }
    }

    pub fn diagnostics(&self) -> &[ParseDiagnostic] {
        &self.diagnostics
    }

    pub fn is_scanned(&self, id: NodeId) -> bool {
        self.scanned.contains(&id)
    }

    /// Expand `root` and everything it reaches. Clean nodes keep their recorded imports;
    /// their targets are still visited and their created files re-staged.
    pub fn scan(&mut self, cache: &mut FileCache, stage: &mut Stage, root: NodeId) -> Result<()> {
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            if !self.scanned.insert(id) {
                continue;
            }

            let node = cache.node(id);
            let imports = if !node.is_updated() && node.imports().is_some() {
                for created in node.created_files().to_vec() {
                    stage.add(created);
                }
                node.imports().map(<[Import]>::to_vec).unwrap_or_default()
            } else {
                self.rescan(cache, id)?
            };

            for import in imports.iter().rev() {
                let Some(target) = import.target.node() else {
                    continue;
                };
                if is_script(cache, target) {
                    stack.push(target);
                } else {
                    stage.add(target);
                    for created in cache.node(target).created_files().to_vec() {
                        stage.add(created);
                    }
                }
            }
        }
        Ok(())
    }

    fn rescan(&mut self, cache: &mut FileCache, id: NodeId) -> Result<Vec<Import>> {
        let code = cache.read_text(id, false)?;
        let file = cache.node(id).path().to_path_buf();
        let dir = cache.node(id).dir().to_path_buf();
        debug!("Scanning {}", cache.relative_name(id));

        let mut imports = Vec::new();
        for site in find_requires(&code) {
            let site = match site {
                Ok(site) => site,
                Err((start, end)) => {
                    let (line, column) = LineIndex::new(&code).position(&code, start);
                    let diagnostic = ParseDiagnostic {
                        file: file.clone(),
                        line: line + 1,
                        column: column + 1,
                        snippet: code[start..end].to_string(),
                    };
                    warn!("{}", diagnostic);
                    self.diagnostics.push(diagnostic);
                    continue;
                }
            };

            let target = match self.resolver.resolve(cache, &site.specifier, &dir)? {
                Resolution::Found(path) => match cache.stat(&path)? {
                    Some(target) => ImportTarget::Node(target),
                    None => return Err(resolution_error(&file, &site)),
                },
                Resolution::Skip => {
                    let stub = cache.normalize_name(format!(
                        "tmp_{}.js",
                        short_hash(site.specifier.as_bytes())
                    ));
                    ImportTarget::Node(cache.create_generated_from(
                        stub,
                        SKIPPED_MODULE_BODY,
                        Some(id),
                    ))
                }
                Resolution::Runtime => ImportTarget::Runtime,
                Resolution::NotFound => return Err(resolution_error(&file, &site)),
            };

            imports.push(Import {
                specifier: site.specifier,
                target,
                start: site.start,
                end: site.end,
                line: site.line,
                column: site.column,
            });
        }

        cache.set_imports(id, imports.clone());
        Ok(imports)
    }
}

/// Nodes that are walked for further `require` calls.
pub fn is_script(cache: &FileCache, id: NodeId) -> bool {
    cache.node(id).extension() == "js"
}

fn resolution_error(file: &std::path::Path, site: &RequireSite) -> PackerError {
    PackerError::Resolution {
        specifier: site.specifier.clone(),
        file: file.to_path_buf(),
        line: site.line + 1,
        column: site.column + 1,
        start: site.start,
        end: site.end,
    }
}

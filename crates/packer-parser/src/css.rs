//! Finds `url(...)` and `@import` references in stylesheet text.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssReferenceKind {
    Url,
    Import,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssReference {
    pub kind: CssReferenceKind,
    /// Referenced URL with quotes and surrounding whitespace removed.
    pub value: String,
    /// Span of `value` inside the stylesheet.
    pub value_start: usize,
    pub value_end: usize,
    /// Span of the whole construct: `url(...)`, or an `@import` statement through its `;`.
    pub start: usize,
    pub end: usize,
}

/// False for data URIs, absolute URLs with a scheme or host, and bare fragments.
pub fn is_local_reference(url: &str) -> bool {
    if url.is_empty() || url.starts_with('#') || url.starts_with("//") {
        return false;
    }
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("data:") {
        return false;
    }
    match url.find(':') {
        Some(colon) => !url[..colon]
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')),
        None => true,
    }
}

/// Path part of a local reference, without `?query` or `#fragment`.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

struct CssScanner<'a> {
    css: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> CssScanner<'a> {
    fn skip_whitespace(&mut self) {
        while self.bytes.get(self.pos).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn skip_string(&mut self, quote: u8) {
        self.pos += 1;
        while let Some(&b) = self.bytes.get(self.pos) {
            self.pos += 1;
            if b == b'\\' {
                self.pos += 1;
            } else if b == quote || b == b'\n' {
                break;
            }
        }
        self.pos = self.pos.min(self.bytes.len());
    }

    fn skip_comment(&mut self) {
        self.pos += 2;
        match self.css[self.pos.min(self.css.len())..].find("*/") {
            Some(i) => self.pos += i + 2,
            None => self.pos = self.bytes.len(),
        }
    }

    fn starts_with_ci(&self, word: &str) -> bool {
        self.bytes
            .get(self.pos..self.pos + word.len())
            .is_some_and(|s| s.eq_ignore_ascii_case(word.as_bytes()))
    }

    /// At `url(`; returns the value span and leaves `pos` after `)`.
    fn read_url(&mut self) -> Option<(usize, usize)> {
        self.pos += 4;
        self.skip_whitespace();
        let quote = match self.bytes.get(self.pos) {
            Some(&q @ (b'"' | b'\'')) => {
                self.pos += 1;
                Some(q)
            }
            _ => None,
        };
        let value_start = self.pos;
        let value_end;
        match quote {
            Some(q) => {
                let rel = self.bytes[self.pos..].iter().position(|&b| b == q)?;
                value_end = self.pos + rel;
                self.pos = value_end + 1;
                self.skip_whitespace();
                if self.bytes.get(self.pos) != Some(&b')') {
                    return None;
                }
            }
            None => {
                let rel = self.bytes[self.pos..].iter().position(|&b| b == b')')?;
                let mut end = self.pos + rel;
                self.pos = end;
                while end > value_start && self.bytes[end - 1].is_ascii_whitespace() {
                    end -= 1;
                }
                value_end = end;
            }
        }
        self.pos += 1;
        Some((value_start, value_end))
    }

    /// At a quoted string; returns the span between the quotes.
    fn read_string(&mut self) -> (usize, usize) {
        let start = self.pos + 1;
        self.skip_string(self.bytes[self.pos]);
        let end = if self.pos > start && matches!(self.bytes[self.pos - 1], b'"' | b'\'') {
            self.pos - 1
        } else {
            self.pos
        };
        (start, end.max(start))
    }

    fn statement_end(&mut self) -> usize {
        match self.bytes[self.pos..].iter().position(|&b| b == b';') {
            Some(rel) => {
                self.pos += rel + 1;
                self.pos
            }
            None => {
                self.pos = self.bytes.len();
                self.pos
            }
        }
    }
}

pub fn find_references(css: &str) -> Vec<CssReference> {
    let mut s = CssScanner {
        css,
        bytes: css.as_bytes(),
        pos: 0,
    };
    let mut refs = Vec::new();

    while s.pos < s.bytes.len() {
        let b = s.bytes[s.pos];
        let prev_is_ident = s.pos > 0 && is_ident_byte(s.bytes[s.pos - 1]);

        if b == b'/' && s.bytes.get(s.pos + 1) == Some(&b'*') {
            s.skip_comment();
        } else if b == b'"' || b == b'\'' {
            s.skip_string(b);
        } else if b == b'@' && s.starts_with_ci("@import") {
            let start = s.pos;
            s.pos += "@import".len();
            s.skip_whitespace();
            let span = match s.bytes.get(s.pos) {
                Some(b'"' | b'\'') => Some(s.read_string()),
                _ if s.starts_with_ci("url(") => s.read_url(),
                _ => None,
            };
            let end = s.statement_end();
            if let Some((value_start, value_end)) = span {
                refs.push(CssReference {
                    kind: CssReferenceKind::Import,
                    value: css[value_start..value_end].trim().to_string(),
                    value_start,
                    value_end,
                    start,
                    end,
                });
            }
        } else if !prev_is_ident && s.starts_with_ci("url(") {
            let start = s.pos;
            match s.read_url() {
                Some((value_start, value_end)) => refs.push(CssReference {
                    kind: CssReferenceKind::Url,
                    value: css[value_start..value_end].to_string(),
                    value_start,
                    value_end,
                    start,
                    end: s.pos,
                }),
                None => s.pos = start + 4,
            }
        } else {
            s.pos += 1;
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(css: &str) -> Vec<String> {
        find_references(css)
            .into_iter()
            .filter(|r| r.kind == CssReferenceKind::Url)
            .map(|r| r.value)
            .collect()
    }

    #[test]
    fn test_url_forms() {
        let css = "b{background:url(data:a0);}\n\
                   a{background: url(a1);}\n\
                   b{background: url(\"a2\");}\n\
                   b{background:Url('a3');}\n\
                   /*b{background: url(/comment1);}*/\n\
                   b{background: url(\n a5     );}\n\
                   b{background: 10%url(\"a7\");}\n\
                   b{background:url( 'a8'),url(a9 );}\n\
                   b{content: \"url(quoted)\"; x: myurl(no)}";
        assert_eq!(
            urls(css),
            vec!["data:a0", "a1", "a2", "a3", "a5", "a7", "a8", "a9"]
        );
    }

    #[test]
    fn test_value_span_points_into_source() {
        let css = "a { background: url( \"img/x.png\" ) }";
        let r = &find_references(css)[0];
        assert_eq!(&css[r.value_start..r.value_end], "img/x.png");
        assert_eq!(&css[r.start..r.end], "url( \"img/x.png\" )");
    }

    #[test]
    fn test_imports_cover_whole_statement() {
        let css = "@import \"base.css\";\n@import url(theme.css) screen;\nbody{}";
        let refs = find_references(css);
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.kind == CssReferenceKind::Import));
        assert_eq!(refs[0].value, "base.css");
        assert_eq!(&css[refs[0].start..refs[0].end], "@import \"base.css\";");
        assert_eq!(refs[1].value, "theme.css");
        assert_eq!(
            &css[refs[1].start..refs[1].end],
            "@import url(theme.css) screen;"
        );
    }

    #[test]
    fn test_local_reference_filter() {
        assert!(is_local_reference("img/a.png"));
        assert!(is_local_reference("../fonts/x.woff?v=2"));
        assert!(is_local_reference("/abs/a.png"));
        assert!(!is_local_reference("data:image/png;base64,AAA"));
        assert!(!is_local_reference("https://cdn/x.png"));
        assert!(!is_local_reference("//cdn/x.png"));
        assert!(!is_local_reference("#filter"));
        assert_eq!(strip_query("x.woff?v=2#iefix"), "x.woff");
    }
}

//! Lightweight script lexer. It classifies spans well enough to tell code from
//! strings, comments and regular expressions; it does not build a syntax tree.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    /// Single or double quoted, quotes included in the span.
    String,
    Template,
    Regex,
    Comment,
    Whitespace,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    pub fn text<'a>(&self, code: &'a str) -> &'a str {
        &code[self.start..self.end]
    }
}

/// Keywords after which a `/` starts a regular expression rather than a division.
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

pub struct Tokenizer<'a> {
    code: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Last non-trivia token, for the regex/division decision.
    last: Option<Token>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(code: &'a str) -> Self {
        Self {
            code,
            bytes: code.as_bytes(),
            pos: 0,
            last: None,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn regex_allowed(&self) -> bool {
        match self.last {
            None => true,
            Some(tok) => match tok.kind {
                TokenKind::Number | TokenKind::String | TokenKind::Template | TokenKind::Regex => {
                    false
                }
                TokenKind::Identifier => REGEX_PREFIX_KEYWORDS.contains(&tok.text(self.code)),
                TokenKind::Punct => !matches!(self.bytes[tok.start], b')' | b']' | b'}'),
                TokenKind::Comment | TokenKind::Whitespace => true,
            },
        }
    }

    fn scan_quoted(&mut self, quote: u8) {
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos += 2,
                b'\n' => return,
                _ if b == quote => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.bytes.len());
    }

    fn scan_template(&mut self) {
        self.pos += 1;
        let mut depth = 0usize;
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos += 2,
                b'$' if depth == 0 && self.peek(1) == Some(b'{') => {
                    depth = 1;
                    self.pos += 2;
                }
                b'{' if depth > 0 => {
                    depth += 1;
                    self.pos += 1;
                }
                b'}' if depth > 0 => {
                    depth -= 1;
                    self.pos += 1;
                }
                b'\'' | b'"' if depth > 0 => self.scan_quoted(b),
                b'`' if depth == 0 => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.bytes.len());
    }

    fn scan_regex(&mut self) {
        self.pos += 1;
        let mut in_class = false;
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos += 2,
                b'\n' => return,
                b'[' => {
                    in_class = true;
                    self.pos += 1;
                }
                b']' => {
                    in_class = false;
                    self.pos += 1;
                }
                b'/' if !in_class => {
                    self.pos += 1;
                    while self.peek(0).is_some_and(is_ident_byte) {
                        self.pos += 1;
                    }
                    return;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.bytes.len());
    }

    fn next_token(&mut self) -> Option<Token> {
        let start = self.pos;
        let b = self.peek(0)?;

        let kind = if b.is_ascii_whitespace() {
            while self.peek(0).is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            TokenKind::Whitespace
        } else if b == b'/' && self.peek(1) == Some(b'/') {
            while self.peek(0).is_some_and(|b| b != b'\n') {
                self.pos += 1;
            }
            TokenKind::Comment
        } else if b == b'/' && self.peek(1) == Some(b'*') {
            self.pos += 2;
            loop {
                match self.peek(0) {
                    None => break,
                    Some(b'*') if self.peek(1) == Some(b'/') => {
                        self.pos += 2;
                        break;
                    }
                    Some(_) => self.pos += 1,
                }
            }
            TokenKind::Comment
        } else if b == b'\'' || b == b'"' {
            self.scan_quoted(b);
            TokenKind::String
        } else if b == b'`' {
            self.scan_template();
            TokenKind::Template
        } else if b == b'/' && self.regex_allowed() {
            self.scan_regex();
            TokenKind::Regex
        } else if b.is_ascii_digit() {
            while self
                .peek(0)
                .is_some_and(|b| is_ident_byte(b) || b == b'.')
            {
                self.pos += 1;
            }
            TokenKind::Number
        } else if is_ident_byte(b) {
            while self.peek(0).is_some_and(is_ident_byte) {
                self.pos += 1;
            }
            TokenKind::Identifier
        } else {
            self.pos += 1;
            TokenKind::Punct
        };

        // Escapes at end of input can step past it; multi-byte chars never split because
        // every stop condition above is an ASCII byte.
        self.pos = self.pos.min(self.bytes.len());
        let token = Token {
            kind,
            start,
            end: self.pos,
        };
        if !token.is_trivia() {
            self.last = Some(token);
        }
        Some(token)
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

pub fn tokenize(code: &str) -> Vec<Token> {
    Tokenizer::new(code).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(code: &str) -> Vec<(TokenKind, &str)> {
        tokenize(code)
            .into_iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| (t.kind, t.text(code)))
            .collect()
    }

    #[test]
    fn test_strings_comments_and_identifiers() {
        let code = "var a = 'x\\'y'; // note\n/* block */ b(\"z\")";
        assert_eq!(
            kinds(code),
            vec![
                (TokenKind::Identifier, "var"),
                (TokenKind::Identifier, "a"),
                (TokenKind::Punct, "="),
                (TokenKind::String, "'x\\'y'"),
                (TokenKind::Punct, ";"),
                (TokenKind::Comment, "// note"),
                (TokenKind::Comment, "/* block */"),
                (TokenKind::Identifier, "b"),
                (TokenKind::Punct, "("),
                (TokenKind::String, "\"z\""),
                (TokenKind::Punct, ")"),
            ]
        );
    }

    #[test]
    fn test_regex_versus_division() {
        let code = "x = a / b; y = /re\"q[/]/g.test(s); return /\"/";
        let toks = kinds(code);
        assert!(toks.contains(&(TokenKind::Punct, "/")));
        assert!(toks.contains(&(TokenKind::Regex, "/re\"q[/]/g")));
        assert!(toks.contains(&(TokenKind::Regex, "/\"/")));
        assert!(!toks.iter().any(|(k, _)| *k == TokenKind::String));
    }

    #[test]
    fn test_template_with_interpolation() {
        let code = "`a ${ {b: '`'} } c` + d";
        let toks = kinds(code);
        assert_eq!(toks[0], (TokenKind::Template, "`a ${ {b: '`'} } c`"));
        assert_eq!(toks[2], (TokenKind::Identifier, "d"));
    }

    #[test]
    fn test_unterminated_input_does_not_overrun() {
        for code in ["'abc\\", "/* open", "`tpl", "/re\\"] {
            let toks = tokenize(code);
            assert_eq!(toks.last().map(|t| t.end), Some(code.len()));
        }
    }
}

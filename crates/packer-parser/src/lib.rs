pub mod css;
pub mod resolver;
pub mod scanner;
pub mod tokenizer;

pub use css::{find_references, is_local_reference, CssReference, CssReferenceKind};
pub use resolver::{Resolution, Resolver};
pub use scanner::{find_requires, is_script, ImportScanner, ParseDiagnostic, RequireSite};
pub use tokenizer::{tokenize, Token, TokenKind, Tokenizer};

//! Twine Lexer
//!
//! Turns template source into a [`TokenStream`]. Literal text, `{{ ... }}`
//! print tags, `{% ... %}` statement tags and `{# ... #}` comments are
//! recognised with one regex scan per lexer state, so arbitrarily long
//! inputs are tokenized in linear time.
//!
//! # Example
//!
//! ```
//! use twine_lexer::{Lexer, TokenKind};
//!
//! let lexer = Lexer::new(["+"]);
//! let stream = lexer.tokenize("Hello {{ name }}", "index").unwrap();
//! assert_eq!(stream.peek(0).kind, TokenKind::Text);
//! ```

pub mod lexer;
pub mod stream;
pub mod token;

use std::fmt;

pub use lexer::Lexer;
pub use stream::TokenStream;
pub use token::{Token, TokenKind};

/// The template being compiled: its logical name and full text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Source {
    pub name: String,
    pub code: String,
}

impl Source {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// The only error kind a template author ever sees.
///
/// Rendered as `<message> in "<source>" at line <n>.`; a trailing period or
/// question mark on the message is moved after the location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub source_name: String,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: usize, source_name: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line,
            source_name: source_name.into(),
        }
    }

    /// Append text to the message.
    pub fn append_message(&mut self, extra: &str) {
        self.message.push_str(extra);
    }

    /// Append a `Did you mean "..."?` hint when `name` is close to one of the
    /// candidates.
    pub fn add_suggestions<'a>(&mut self, name: &str, candidates: impl IntoIterator<Item = &'a str>) {
        let threshold = name.chars().count() / 3;
        let mut alternatives: Vec<(usize, &str)> = candidates
            .into_iter()
            .filter_map(|candidate| {
                let distance = strsim::levenshtein(name, candidate);
                (distance <= threshold || candidate.contains(name)).then_some((distance, candidate))
            })
            .collect();
        if alternatives.is_empty() {
            return;
        }
        alternatives.sort();
        let names: Vec<&str> = alternatives.into_iter().map(|(_, n)| n).collect();
        self.message
            .push_str(&format!(" Did you mean \"{}\"?", names.join("\", \"")));
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (message, tail) = match self.message.strip_suffix(['.', '?']) {
            Some(stripped) => (stripped, &self.message[stripped.len()..]),
            None => (self.message.as_str(), ""),
        };
        write!(f, "{message}")?;
        if !self.source_name.is_empty() {
            write!(f, " in \"{}\"", self.source_name)?;
        }
        if self.line > 0 {
            write!(f, " at line {}", self.line)?;
        }
        write!(f, "{tail}")
    }
}

impl std::error::Error for SyntaxError {}

/// Pipeline error. `Syntax` is the author-facing kind; `Internal` reports a
/// broken invariant inside the compiler itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl Error {
    /// The syntax error, when this is one.
    pub fn as_syntax(&self) -> Option<&SyntaxError> {
        match self {
            Error::Syntax(e) => Some(e),
            Error::Internal(_) => None,
        }
    }
}

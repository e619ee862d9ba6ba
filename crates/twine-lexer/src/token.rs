use std::fmt;

/// Token classification for template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Text,
    BlockStart,
    VarStart,
    BlockEnd,
    VarEnd,
    Name,
    Number,
    String,
    Operator,
    Punctuation,
    InterpolationStart,
    InterpolationEnd,
}

impl TokenKind {
    /// Human-readable name used in error messages.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Eof => "end of template",
            TokenKind::Text => "text",
            TokenKind::BlockStart => "begin of statement block",
            TokenKind::VarStart => "begin of print statement",
            TokenKind::BlockEnd => "end of statement block",
            TokenKind::VarEnd => "end of print statement",
            TokenKind::Name => "name",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Operator => "operator",
            TokenKind::Punctuation => "punctuation",
            TokenKind::InterpolationStart => "begin of string interpolation",
            TokenKind::InterpolationEnd => "end of string interpolation",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A token produced by the lexer.
///
/// `value` is the token text after unescaping (strings) or normalisation
/// (operators with inner whitespace). Number literals keep their source
/// spelling so integers wider than any native type survive intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            line,
        }
    }

    /// Does this token have the given kind and, if provided, value?
    pub fn test(&self, kind: TokenKind, value: Option<&str>) -> bool {
        self.kind == kind && value.map_or(true, |v| v == self.value)
    }

    /// Shorthand for a NAME token with the given value.
    pub fn is_name(&self, value: &str) -> bool {
        self.test(TokenKind::Name, Some(value))
    }

    /// Shorthand for a NAME token matching any of the given values.
    pub fn is_any_name(&self, values: &[&str]) -> bool {
        self.kind == TokenKind::Name && values.contains(&self.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_kind_and_value() {
        let token = Token::new(TokenKind::Operator, "and", 1);
        assert!(token.test(TokenKind::Operator, None));
        assert!(token.test(TokenKind::Operator, Some("and")));
        assert!(!token.test(TokenKind::Operator, Some("or")));
        assert!(!token.test(TokenKind::Name, Some("and")));
    }

    #[test]
    fn test_name_helpers() {
        let token = Token::new(TokenKind::Name, "endblock", 4);
        assert!(token.is_name("endblock"));
        assert!(token.is_any_name(&["endif", "endblock"]));
        assert!(!token.is_any_name(&["else"]));
    }

    #[test]
    fn test_describe() {
        assert_eq!(TokenKind::BlockEnd.to_string(), "end of statement block");
        assert_eq!(TokenKind::Eof.describe(), "end of template");
    }
}

use crate::token::{Token, TokenKind};
use crate::{Source, SyntaxError};

/// A fully materialised sequence of tokens with a forward-only cursor.
///
/// The lexer guarantees the last token is the only `Eof`, so `peek` can
/// always clamp to it instead of returning `Option`.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    current: usize,
    source: Source,
}

impl TokenStream {
    /// Build a stream. An `Eof` token is appended when `tokens` does not
    /// already end with one.
    pub fn new(mut tokens: Vec<Token>, source: Source) -> Self {
        if tokens.last().map_or(true, |t| t.kind != TokenKind::Eof) {
            let line = tokens.last().map_or(1, |t| t.line);
            tokens.push(Token::new(TokenKind::Eof, "", line));
        }
        Self {
            tokens,
            current: 0,
            source,
        }
    }

    /// The token `offset` positions ahead of the cursor (0 = current).
    pub fn peek(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.current + offset).min(last)]
    }

    /// The current token.
    pub fn current(&self) -> &Token {
        self.peek(0)
    }

    /// Consume and return the current token. Consuming the `Eof` token is an
    /// error: nothing may follow the end of the template.
    pub fn next(&mut self) -> Result<Token, SyntaxError> {
        if self.current + 1 >= self.tokens.len() {
            return Err(self.error("Unexpected end of template.", self.current().line));
        }
        let token = self.tokens[self.current].clone();
        self.current += 1;
        Ok(token)
    }

    /// Consume the current token only if it matches.
    pub fn next_if(&mut self, kind: TokenKind, value: Option<&str>) -> Option<Token> {
        if self.current().test(kind, value) && !self.is_eof() {
            self.next().ok()
        } else {
            None
        }
    }

    /// Does the current token match, without consuming it?
    pub fn test(&self, kind: TokenKind, value: Option<&str>) -> bool {
        self.current().test(kind, value)
    }

    /// Consume the current token, failing when it does not match.
    pub fn expect(&mut self, kind: TokenKind, value: Option<&str>) -> Result<Token, SyntaxError> {
        self.expect_with(kind, value, None)
    }

    /// Like [`expect`](Self::expect), with a message prefix for the failure.
    pub fn expect_with(
        &mut self,
        kind: TokenKind,
        value: Option<&str>,
        message: Option<&str>,
    ) -> Result<Token, SyntaxError> {
        let token = self.current();
        if !token.test(kind, value) {
            let prefix = message.map(|m| format!("{m}. ")).unwrap_or_default();
            let actual_value = if token.kind == TokenKind::Eof {
                String::new()
            } else {
                format!(" of value \"{}\"", token.value)
            };
            let expected_value = value
                .map(|v| format!(" with value \"{v}\""))
                .unwrap_or_default();
            let message = format!(
                "{prefix}Unexpected token \"{}\"{actual_value} (\"{}\" expected{expected_value}).",
                token.kind, kind
            );
            return Err(self.error(message, token.line));
        }
        self.next()
    }

    pub fn is_eof(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// A syntax error attributed to this stream's source.
    pub fn error(&self, message: impl Into<String>, line: usize) -> SyntaxError {
        SyntaxError::new(message, line, self.source.name.clone())
    }

    /// All tokens, regardless of the cursor.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stream(tokens: Vec<Token>) -> TokenStream {
        TokenStream::new(tokens, Source::new("", "index"))
    }

    fn sample() -> TokenStream {
        stream(vec![
            Token::new(TokenKind::VarStart, "", 1),
            Token::new(TokenKind::Name, "foo", 1),
            Token::new(TokenKind::VarEnd, "", 1),
            Token::new(TokenKind::Eof, "", 1),
        ])
    }

    #[test]
    fn test_appends_eof() {
        let s = stream(vec![Token::new(TokenKind::Text, "hi", 2)]);
        assert_eq!(s.tokens().len(), 2);
        assert_eq!(s.tokens()[1].kind, TokenKind::Eof);
        assert_eq!(s.tokens()[1].line, 2);
    }

    #[test]
    fn test_peek_clamps_to_eof() {
        let s = sample();
        assert_eq!(s.peek(1).value, "foo");
        assert_eq!(s.peek(42).kind, TokenKind::Eof);
    }

    #[test]
    fn test_next_and_next_if() {
        let mut s = sample();
        assert_eq!(s.next().unwrap().kind, TokenKind::VarStart);
        assert!(s.next_if(TokenKind::Name, Some("bar")).is_none());
        assert_eq!(s.next_if(TokenKind::Name, None).unwrap().value, "foo");
        assert!(s.test(TokenKind::VarEnd, None));
    }

    #[test]
    fn test_next_past_eof_fails() {
        let mut s = stream(vec![]);
        assert!(s.is_eof());
        let err = s.next().unwrap_err();
        assert_eq!(err.message, "Unexpected end of template.");
    }

    #[test]
    fn test_expect_mismatch_message() {
        let mut s = sample();
        s.next().unwrap();
        let err = s.expect(TokenKind::Punctuation, Some("(")).unwrap_err();
        assert_eq!(
            err.message,
            "Unexpected token \"name\" of value \"foo\" (\"punctuation\" expected with value \"(\")."
        );
        assert_eq!(err.source_name, "index");
    }

    #[test]
    fn test_expect_with_prefix() {
        let mut s = sample();
        let err = s
            .expect_with(TokenKind::Name, None, Some("Only variables can be assigned to"))
            .unwrap_err();
        assert!(err.message.starts_with("Only variables can be assigned to. Unexpected token"));
    }

    #[test]
    fn test_expect_at_eof() {
        let mut s = stream(vec![]);
        let err = s.expect(TokenKind::BlockEnd, None).unwrap_err();
        assert_eq!(
            err.message,
            "Unexpected token \"end of template\" (\"end of statement block\" expected)."
        );
    }
}

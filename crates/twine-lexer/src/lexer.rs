use std::sync::LazyLock;

use regex::Regex;

use crate::stream::TokenStream;
use crate::token::{Token, TokenKind};
use crate::{Error, Source, SyntaxError};

const PUNCTUATION: &str = "()[]{}?:.,|";

static TOKEN_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\{\{|\{%|\{#)([-~])?").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s+").expect("valid regex"));
static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_\x{7f}-\x{10FFFF}][a-zA-Z0-9_\x{7f}-\x{10FFFF}]*").expect("valid regex")
});
static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(?:\.[0-9]+)?(?:[eE][+\-][0-9]+)?").expect("valid regex")
});
static STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)^(?:"([^#"\\]*(?:\\.[^#"\\]*)*)"|'([^'\\]*(?:\\.[^'\\]*)*)')"#)
        .expect("valid regex")
});
// A run of double-quoted string content up to (not including) the closing
// quote or an unescaped `#{`. The trailing `#*` may swallow the `#` of a
// following `#{`; `dq_string_part_len` gives it back.
static DQ_STRING_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"(?s)^(?:[^#"\\]|\\.|#+[^#{"\\]|#+\\.)*#*"##).expect("valid regex")
});
static VAR_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:-\}\}\s*|~\}\}[ \t\x00\x0B]*|\}\})").expect("valid regex")
});
static BLOCK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:-%\}\s*|~%\}[ \t\x00\x0B]*|%\})\n?").expect("valid regex")
});
static BLOCK_RAW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(raw|verbatim)\s*(?:-%\}\s*|~%\}[ \t\x00\x0B]*|%\})").expect("valid regex")
});
static BLOCK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*line\s+(\d+)\s*%\}").expect("valid regex"));
static COMMENT_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:-#\}\s*|~#\}[ \t\x00\x0B]*|#\})\n?").expect("valid regex")
});
static END_RAW: LazyLock<Regex> = LazyLock::new(|| raw_end_regex("endraw"));
static END_VERBATIM: LazyLock<Regex> = LazyLock::new(|| raw_end_regex("endverbatim"));
static INTERPOLATION_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\{\s*").expect("valid regex"));
static INTERPOLATION_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\}").expect("valid regex"));

fn raw_end_regex(tag: &str) -> Regex {
    Regex::new(&format!(
        r"\{{%([-~]?)\s*{tag}\s*(?:-%\}}\s*|~%\}}[ \t\x00\x0B]*|%\}})"
    ))
    .expect("valid regex")
}

/// Lexer mode. Comments and verbatim sections are consumed in one step
/// from `Data`, so they never sit on the state stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Block,
    Var,
    String,
    Interpolation,
}

/// Template tokenizer.
///
/// Holds the operator table; all per-template state lives in a private
/// scanner created by [`tokenize`](Lexer::tokenize), so one `Lexer` can
/// serve many threads.
#[derive(Debug, Clone)]
pub struct Lexer {
    operators: Regex,
}

impl Lexer {
    /// Build a lexer recognising `=` plus the given operator spellings.
    pub fn new<I, S>(operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spellings: Vec<String> = operators
            .into_iter()
            .map(|op| op.as_ref().to_string())
            .chain(std::iter::once("=".to_string()))
            .collect();
        // Longest first so `**` wins over `*` and `not in` over `not`.
        spellings.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        spellings.dedup();

        let pattern = |op: &String| {
            op.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        };
        let (words, symbols): (Vec<&String>, Vec<&String>) = spellings
            .iter()
            .partition(|op| op.ends_with(|c: char| c.is_ascii_alphabetic()));

        let mut branches = Vec::new();
        if !words.is_empty() {
            // Operators ending in a letter must be followed by whitespace or
            // a parenthesis; only group 1 is consumed.
            let alternation: Vec<String> = words.into_iter().map(pattern).collect();
            branches.push(format!(r"({})(?:[\s()]|$)", alternation.join("|")));
        }
        let alternation: Vec<String> = symbols.into_iter().map(pattern).collect();
        branches.push(format!("({})", alternation.join("|")));

        let operators = Regex::new(&format!("^(?:{})", branches.join("|")))
            .expect("escaped operator patterns are always valid");
        Self { operators }
    }

    /// Tokenize `code`; `name` is only used in diagnostics.
    pub fn tokenize(&self, code: &str, name: &str) -> Result<TokenStream, Error> {
        let normalized = code.replace("\r\n", "\n").replace('\r', "\n");
        let mut scanner = Scanner::new(&normalized, name, &self.operators);
        scanner.run()?;
        tracing::debug!(
            template = name,
            tokens = scanner.tokens.len(),
            "tokenized template"
        );
        Ok(TokenStream::new(scanner.tokens, Source::new(code, name)))
    }
}

/// A `{{`, `{%` or `{#` found during the initial scan.
#[derive(Debug, Clone, Copy)]
struct TagStart {
    start: usize,
    end: usize,
    delimiter: u8,
    trim: Option<u8>,
}

struct Scanner<'a> {
    code: &'a str,
    name: &'a str,
    operators: &'a Regex,
    cursor: usize,
    line: usize,
    tokens: Vec<Token>,
    state: State,
    states: Vec<State>,
    brackets: Vec<(&'static str, usize)>,
    positions: Vec<TagStart>,
    position: usize,
    var_block_line: usize,
}

impl<'a> Scanner<'a> {
    fn new(code: &'a str, name: &'a str, operators: &'a Regex) -> Self {
        let positions = TOKEN_START
            .captures_iter(code)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some(TagStart {
                    start: whole.start(),
                    end: whole.end(),
                    delimiter: caps[1].as_bytes()[1],
                    trim: caps.get(2).map(|m| m.as_str().as_bytes()[0]),
                })
            })
            .collect();
        Self {
            code,
            name,
            operators,
            cursor: 0,
            line: 1,
            tokens: Vec::new(),
            state: State::Data,
            states: Vec::new(),
            brackets: Vec::new(),
            positions,
            position: 0,
            var_block_line: 1,
        }
    }

    fn run(&mut self) -> Result<(), Error> {
        while self.cursor < self.code.len() {
            match self.state {
                State::Data => self.lex_data()?,
                State::Block => self.lex_block()?,
                State::Var => self.lex_var()?,
                State::String => self.lex_string()?,
                State::Interpolation => self.lex_interpolation()?,
            }
        }

        self.push(TokenKind::Eof, "");

        if let Some((expect, line)) = self.brackets.pop() {
            return Err(self.error(format!("Unclosed \"{expect}\"."), line));
        }
        match self.state {
            State::Var => Err(self.error("Unclosed \"variable\".", self.var_block_line)),
            State::Block => Err(self.error("Unclosed \"block\".", self.var_block_line)),
            _ => Ok(()),
        }
    }

    // --- States ---

    fn lex_data(&mut self) -> Result<(), Error> {
        let code = self.code;

        // Skip tag starts that were swallowed by a comment or verbatim body.
        while self
            .positions
            .get(self.position)
            .is_some_and(|p| p.start < self.cursor)
        {
            self.position += 1;
        }

        let Some(tag) = self.positions.get(self.position).copied() else {
            self.push(TokenKind::Text, &code[self.cursor..]);
            self.cursor = code.len();
            return Ok(());
        };
        self.position += 1;

        let content = &code[self.cursor..tag.start];
        let text = match tag.trim {
            Some(b'-') => content.trim_end(),
            Some(b'~') => content.trim_end_matches([' ', '\t', '\0', '\x0B']),
            _ => content,
        };
        self.push(TokenKind::Text, text);
        self.move_cursor(tag.end - self.cursor);

        match tag.delimiter {
            b'#' => self.lex_comment(),
            b'%' => {
                let rest = &code[self.cursor..];
                if let Some(caps) = BLOCK_RAW.captures(rest) {
                    self.move_cursor(caps[0].len());
                    let end_tag = if &caps[1] == "raw" { &*END_RAW } else { &*END_VERBATIM };
                    self.lex_raw_data(end_tag)
                } else if let Some(caps) = BLOCK_LINE.captures(rest) {
                    self.move_cursor(caps[0].len());
                    let Ok(line) = caps[1].parse() else {
                        let message = format!("Invalid line number \"{}\".", &caps[1]);
                        return Err(self.error(message, self.line));
                    };
                    self.line = line;
                    Ok(())
                } else {
                    self.push(TokenKind::BlockStart, "");
                    self.push_state(State::Block);
                    self.var_block_line = self.line;
                    Ok(())
                }
            }
            _ => {
                self.push(TokenKind::VarStart, "");
                self.push_state(State::Var);
                self.var_block_line = self.line;
                Ok(())
            }
        }
    }

    fn lex_block(&mut self) -> Result<(), Error> {
        let code = self.code;
        if self.brackets.is_empty() {
            if let Some(m) = BLOCK_END.find(&code[self.cursor..]) {
                self.push(TokenKind::BlockEnd, "");
                self.move_cursor(m.end());
                return self.pop_state();
            }
        }
        self.lex_expression()
    }

    fn lex_var(&mut self) -> Result<(), Error> {
        let code = self.code;
        if self.brackets.is_empty() {
            if let Some(m) = VAR_END.find(&code[self.cursor..]) {
                self.push(TokenKind::VarEnd, "");
                self.move_cursor(m.end());
                return self.pop_state();
            }
        }
        self.lex_expression()
    }

    fn lex_expression(&mut self) -> Result<(), Error> {
        let code = self.code;

        if let Some(m) = WHITESPACE.find(&code[self.cursor..]) {
            self.move_cursor(m.end());
            if self.cursor >= code.len() {
                let what = self.enclosing_tag();
                return Err(self.error(format!("Unclosed \"{what}\"."), self.var_block_line));
            }
        }

        let rest = &code[self.cursor..];

        if let Some(op) = self.match_operator(rest) {
            let normalized = op.split_whitespace().collect::<Vec<_>>().join(" ");
            self.push(TokenKind::Operator, &normalized);
            self.move_cursor(op.len());
        } else if let Some(m) = NAME.find(rest) {
            self.push(TokenKind::Name, m.as_str());
            self.move_cursor(m.end());
        } else if let Some(m) = NUMBER.find(rest) {
            self.push(TokenKind::Number, m.as_str());
            self.move_cursor(m.end());
        } else if let Some(c) = rest.chars().next().filter(|c| PUNCTUATION.contains(*c)) {
            match c {
                '(' => self.brackets.push(("(", self.line)),
                '[' => self.brackets.push(("[", self.line)),
                '{' => self.brackets.push(("{", self.line)),
                ')' | ']' | '}' => {
                    let Some((expect, line)) = self.brackets.pop() else {
                        return Err(self.error(format!("Unexpected \"{c}\"."), self.line));
                    };
                    let matches = matches!((expect, c), ("(", ')') | ("[", ']') | ("{", '}'));
                    if !matches {
                        return Err(self.error(format!("Unclosed \"{expect}\"."), line));
                    }
                }
                _ => {}
            }
            self.push(TokenKind::Punctuation, c.encode_utf8(&mut [0; 4]));
            self.move_cursor(1);
        } else if let Some(caps) = STRING.captures(rest) {
            let body = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            self.push(TokenKind::String, &unescape(body));
            self.move_cursor(caps[0].len());
        } else if rest.starts_with('"') {
            self.brackets.push(("\"", self.line));
            self.push_state(State::String);
            self.move_cursor(1);
        } else {
            let c = rest.chars().next().unwrap_or_default();
            return Err(self.error(format!("Unexpected character \"{c}\"."), self.line));
        }
        Ok(())
    }

    fn lex_string(&mut self) -> Result<(), Error> {
        let code = self.code;
        let rest = &code[self.cursor..];

        if let Some(m) = INTERPOLATION_START.find(rest) {
            self.brackets.push(("#{", self.line));
            self.push(TokenKind::InterpolationStart, "");
            self.move_cursor(m.end());
            self.push_state(State::Interpolation);
            return Ok(());
        }

        let len = dq_string_part_len(rest);
        if len > 0 {
            self.push(TokenKind::String, &unescape(&rest[..len]));
            self.move_cursor(len);
            return Ok(());
        }

        let (expect, line) = self
            .brackets
            .pop()
            .ok_or_else(|| Error::Internal("string state without an opening quote".into()))?;
        if !rest.starts_with('"') || expect != "\"" {
            return Err(self.error(format!("Unclosed \"{expect}\"."), line));
        }
        self.move_cursor(1);
        self.pop_state()
    }

    fn lex_interpolation(&mut self) -> Result<(), Error> {
        let code = self.code;
        let in_interpolation = self.brackets.last().is_some_and(|(open, _)| *open == "#{");
        if in_interpolation {
            if let Some(m) = INTERPOLATION_END.find(&code[self.cursor..]) {
                self.brackets.pop();
                self.push(TokenKind::InterpolationEnd, "");
                self.move_cursor(m.end());
                return self.pop_state();
            }
        }
        self.lex_expression()
    }

    fn lex_comment(&mut self) -> Result<(), Error> {
        let Some(m) = COMMENT_END.find_at(self.code, self.cursor) else {
            return Err(self.error("Unclosed comment.", self.line));
        };
        self.move_cursor(m.end() - self.cursor);
        Ok(())
    }

    fn lex_raw_data(&mut self, end_tag: &Regex) -> Result<(), Error> {
        let code = self.code;
        let Some(caps) = end_tag.captures_at(code, self.cursor) else {
            return Err(self.error(
                "Unexpected end of file: Unclosed \"verbatim\" block.",
                self.line,
            ));
        };
        let whole = caps.get(0).map_or(self.cursor..self.cursor, |m| m.range());
        let content = &code[self.cursor..whole.start];
        let text = match caps.get(1).map(|m| m.as_str()) {
            Some("-") => content.trim_end(),
            Some("~") => content.trim_end_matches([' ', '\t', '\0', '\x0B']),
            _ => content,
        };
        let line = self.line;
        if !text.is_empty() {
            self.tokens.push(Token::new(TokenKind::Text, text, line));
        }
        self.move_cursor(whole.end - self.cursor);
        Ok(())
    }

    // --- Helpers ---

    /// Match an operator at the start of `rest`, honouring the word
    /// boundary rule for operators that end in a letter.
    fn match_operator(&self, rest: &'a str) -> Option<&'a str> {
        let caps = self.operators.captures(rest)?;
        let op = caps.iter().skip(1).flatten().next()?;
        Some(op.as_str())
    }

    fn push(&mut self, kind: TokenKind, value: &str) {
        if kind == TokenKind::Text && value.is_empty() {
            return;
        }
        self.tokens.push(Token::new(kind, value, self.line));
    }

    fn move_cursor(&mut self, len: usize) {
        let end = (self.cursor + len).min(self.code.len());
        self.line += self.code[self.cursor..end].matches('\n').count();
        self.cursor = end;
    }

    fn push_state(&mut self, state: State) {
        self.states.push(self.state);
        self.state = state;
    }

    fn pop_state(&mut self) -> Result<(), Error> {
        self.state = self
            .states
            .pop()
            .ok_or_else(|| Error::Internal("cannot pop lexer state without a previous state".into()))?;
        Ok(())
    }

    /// Name of the `{{ }}` or `{% %}` construct being lexed, looking
    /// through any string interpolation in between.
    fn enclosing_tag(&self) -> &'static str {
        let tag = std::iter::once(self.state)
            .chain(self.states.iter().rev().copied())
            .find(|state| matches!(state, State::Block | State::Var));
        match tag {
            Some(State::Block) => "block",
            _ => "variable",
        }
    }

    fn error(&self, message: impl Into<String>, line: usize) -> Error {
        Error::Syntax(SyntaxError::new(message, line, self.name))
    }
}

/// Length of the double-quoted string content at the start of `rest`.
fn dq_string_part_len(rest: &str) -> usize {
    let len = DQ_STRING_PART.find(rest).map_or(0, |m| m.end());
    if len > 0 && rest[len..].starts_with('{') && rest[..len].ends_with('#') {
        len - 1
    } else {
        len
    }
}

/// Resolve C-style backslash escapes. Unknown escapes drop the backslash.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(esc) = chars.next() else {
            break;
        };
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'v' => out.push('\x0B'),
            'f' => out.push('\x0C'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'e' => out.push('\x1B'),
            'x' => {
                let mut digits = String::new();
                while digits.len() < 2 && chars.peek().is_some_and(|d| d.is_ascii_hexdigit()) {
                    digits.extend(chars.next());
                }
                match u8::from_str_radix(&digits, 16) {
                    Ok(byte) => out.push(char::from(byte)),
                    Err(_) => out.push('x'),
                }
            }
            '0'..='7' => {
                let mut digits = String::from(esc);
                while digits.len() < 3 && chars.peek().is_some_and(|d| ('0'..='7').contains(d)) {
                    digits.extend(chars.next());
                }
                let value = u32::from_str_radix(&digits, 8).unwrap_or(0) & 0xFF;
                out.extend(char::from_u32(value));
            }
            other => out.push(other),
        }
    }

    out
}

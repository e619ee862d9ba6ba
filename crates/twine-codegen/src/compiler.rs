//! The output buffer the node compilers write into.

use std::collections::BTreeMap;

use twine_lexer::{Error, SyntaxError};
use twine_parser::Node;

use crate::registry::Registry;
use crate::CodegenOptions;

const INDENT: &str = "  ";

/// Accumulates generated JavaScript.
///
/// Besides the code itself the compiler tracks the indentation level, a
/// counter for temporaries and the mapping from generated lines to template
/// lines. A `// line N` marker is written before every statement whose
/// template line differs from the previous one.
pub struct Compiler<'a> {
    registry: &'a Registry,
    options: &'a CodegenOptions,
    source_name: &'a str,
    code: String,
    indentation: usize,
    /// Newlines written so far.
    lines: usize,
    last_line: Option<usize>,
    debug_info: BTreeMap<usize, usize>,
    next_var: usize,
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a Registry, options: &'a CodegenOptions, source_name: &'a str) -> Self {
        Self {
            registry,
            options,
            source_name,
            code: String::new(),
            indentation: 0,
            lines: 0,
            last_line: None,
            debug_info: BTreeMap::new(),
            next_var: 0,
        }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn options(&self) -> &'a CodegenOptions {
        self.options
    }

    pub fn source_name(&self) -> &'a str {
        self.source_name
    }

    /// Code generated so far.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Generated line (1-based) -> template line.
    pub fn debug_info(&self) -> &BTreeMap<usize, usize> {
        &self.debug_info
    }

    pub fn into_parts(self) -> (String, BTreeMap<usize, usize>) {
        (self.code, self.debug_info)
    }

    /// Write `text` at the current indentation.
    pub fn write(&mut self, text: &str) -> &mut Self {
        for _ in 0..self.indentation {
            self.code.push_str(INDENT);
        }
        self.raw(text)
    }

    /// Write `text` as is.
    pub fn raw(&mut self, text: &str) -> &mut Self {
        self.lines += text.matches('\n').count();
        self.code.push_str(text);
        self
    }

    /// Write `value` as a JavaScript string literal.
    pub fn string(&mut self, value: &str) -> &mut Self {
        let literal = js_string(value);
        self.raw(&literal)
    }

    pub fn indent(&mut self) -> &mut Self {
        self.indentation += 1;
        self
    }

    pub fn outdent(&mut self) -> Result<&mut Self, Error> {
        if self.indentation == 0 {
            return Err(Error::Internal(
                "Unable to call outdent() as the indentation would become negative.".into(),
            ));
        }
        self.indentation -= 1;
        Ok(self)
    }

    /// Write a `// line N` marker when `node` starts a new template line.
    pub fn add_debug_info(&mut self, node: &Node) -> &mut Self {
        if self.last_line != Some(node.line) {
            self.write(&format!("// line {}\n", node.line));
            self.debug_info.insert(self.lines + 1, node.line);
            self.last_line = Some(node.line);
        }
        self
    }

    /// Force a line marker before the next statement, e.g. at the start of a
    /// new function.
    pub fn reset_line_marker(&mut self) -> &mut Self {
        self.last_line = None;
        self
    }

    /// A fresh name for a temporary.
    pub fn var_name(&mut self) -> String {
        let name = format!("_v{}", self.next_var);
        self.next_var += 1;
        name
    }

    /// Compile `body` between `out.begin();` and the caller's `out.end()`.
    ///
    /// Everything `body` writes at render time is buffered by the runtime;
    /// the caller decides what to do with the captured text.
    pub fn capture_output(&mut self, body: &Node) -> Result<&mut Self, Error> {
        self.write("out.begin();\n");
        self.subcompile(body)
    }

    /// An author-facing error at `line` of the template being compiled.
    pub fn error(&self, message: impl Into<String>, line: usize) -> Error {
        SyntaxError::new(message, line, self.source_name).into()
    }
}

/// `value` as a double-quoted JavaScript string literal.
pub fn js_string(value: &str) -> String {
    let mut literal = String::with_capacity(value.len() + 2);
    literal.push('"');
    for c in value.chars() {
        match c {
            '"' => literal.push_str("\\\""),
            '\\' => literal.push_str("\\\\"),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            '\t' => literal.push_str("\\t"),
            '\u{8}' => literal.push_str("\\b"),
            '\u{b}' => literal.push_str("\\v"),
            '\u{c}' => literal.push_str("\\f"),
            '\u{2028}' => literal.push_str("\\u2028"),
            '\u{2029}' => literal.push_str("\\u2029"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                literal.push_str(&format!("\\x{:02x}", c as u32))
            }
            c => literal.push(c),
        }
    }
    literal.push('"');
    literal
}

//! Statement parser.
//!
//! Walks the token stream turning text into [`NodeKind::Text`], `{{ }}` into
//! [`NodeKind::Print`] and dispatching every `{% tag %}` to the handler the
//! [`Grammar`] registers for it. Expression parsing lives in
//! `expr_parser.rs` as a second `impl` block on the same [`Parser`].

use std::ops::{Deref, DerefMut};

use indexmap::{IndexMap, IndexSet};
use twine_lexer::{Error, Token, TokenKind, TokenStream};

use crate::ast::{Block, Module, Node};
use crate::grammar::Grammar;

/// The tag names that end a body, and the tag that opened it.
#[derive(Debug, Clone, Copy)]
pub struct Closing<'a> {
    pub tag: &'a str,
    pub line: usize,
    pub names: &'a [&'a str],
}

impl<'a> Closing<'a> {
    pub fn new(tag: &'a str, line: usize, names: &'a [&'a str]) -> Self {
        Self { tag, line, names }
    }

    pub fn matches(&self, token: &Token) -> bool {
        token.is_any_name(self.names)
    }
}

/// Template parser.
///
/// Holds the stream being parsed, the blocks defined so far and two
/// strictly nested stacks: the names of the blocks being parsed and one
/// set of locally assigned names per block. Both stacks are only pushed
/// through [`Parser::enter_block`], whose guard pops them again.
pub struct Parser<'g> {
    stream: TokenStream,
    grammar: &'g Grammar,
    blocks: IndexMap<String, Block>,
    block_stack: Vec<String>,
    local_scopes: Vec<IndexSet<String>>,
}

impl<'g> Parser<'g> {
    pub fn new(stream: TokenStream, grammar: &'g Grammar) -> Self {
        Self {
            stream,
            grammar,
            blocks: IndexMap::new(),
            block_stack: Vec::new(),
            local_scopes: Vec::new(),
        }
    }

    /// Parse the whole stream into a module.
    pub fn parse(mut self) -> Result<Module, Error> {
        let body = self.subparse(None, false)?;

        if !self.block_stack.is_empty() || !self.local_scopes.is_empty() {
            return Err(Error::Internal(format!(
                "parser stacks not empty after parsing \"{}\"",
                self.stream.source().name
            )));
        }

        tracing::debug!(
            template = %self.stream.source().name,
            blocks = self.blocks.len(),
            "parsed template"
        );

        Ok(Module {
            body,
            blocks: self.blocks,
            source: self.stream.source().clone(),
        })
    }

    /// Parse nodes until the end of the stream or until a `{% name %}` tag
    /// matching `closing`. The result is always a body node.
    ///
    /// On a match the stream is left on the closing tag's name, or just past
    /// it when `drop_needle` is set.
    pub fn subparse(&mut self, closing: Option<&Closing<'_>>, drop_needle: bool) -> Result<Node, Error> {
        let line = self.stream.current().line;
        let mut nodes = Vec::new();

        while !self.stream.is_eof() {
            let token = self.stream.next()?;
            match token.kind {
                TokenKind::Text => nodes.push(Node::text(token.value, token.line)),
                TokenKind::VarStart => {
                    let expr = self.parse_expression()?;
                    self.stream.expect(TokenKind::VarEnd, None)?;
                    nodes.push(Node::print(expr, token.line));
                }
                TokenKind::BlockStart => {
                    let tag = self.stream.current().clone();
                    if tag.kind != TokenKind::Name {
                        return Err(self.error("A block must start with a tag name.", tag.line));
                    }

                    if let Some(closing) = closing {
                        if closing.matches(&tag) {
                            if drop_needle {
                                self.stream.next()?;
                            }
                            return Ok(Node::body(nodes, line));
                        }
                    }

                    let grammar = self.grammar;
                    let Some(handler) = grammar.tag(&tag.value) else {
                        return Err(self.unknown_tag(&tag, closing));
                    };
                    self.stream.next()?;

                    if let Some(node) = handler.parse(&tag, self)? {
                        nodes.push(node.with_tag(tag.value));
                    }
                }
                _ => {
                    return Err(Error::Internal(format!(
                        "parser reached an unsupported token ({}) at line {}",
                        token.kind, token.line
                    )));
                }
            }
        }

        if let Some(closing) = closing {
            let message = format!(
                "Unexpected end of template (expecting closing tag for the \"{}\" tag defined near line {}).",
                closing.tag, closing.line
            );
            return Err(self.error(message, self.stream.current().line));
        }

        Ok(Node::body(nodes, line))
    }

    fn unknown_tag(&self, token: &Token, closing: Option<&Closing<'_>>) -> Error {
        let error = match closing {
            Some(closing) => self.stream.error(
                format!(
                    "Unexpected \"{}\" tag (expecting closing tag for the \"{}\" tag defined near line {}).",
                    token.value, closing.tag, closing.line
                ),
                token.line,
            ),
            None => {
                let mut error = self
                    .stream
                    .error(format!("Unknown \"{}\" tag.", token.value), token.line);
                error.add_suggestions(&token.value, self.grammar.tag_names());
                error
            }
        };
        Error::Syntax(error)
    }

    // =========================================================================
    // Accessors for tag handlers
    // =========================================================================

    pub fn stream(&self) -> &TokenStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TokenStream {
        &mut self.stream
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    /// A syntax error in the template being parsed.
    pub fn error(&self, message: impl Into<String>, line: usize) -> Error {
        Error::Syntax(self.stream.error(message, line))
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name)
    }

    /// Register or replace a block. Replacing keeps its original position.
    pub fn set_block(&mut self, block: Block) {
        self.blocks.insert(block.name.clone(), block);
    }

    /// Enter the body of block `name` until the returned guard is dropped.
    pub fn enter_block(&mut self, name: &str) -> BlockScope<'_, 'g> {
        self.block_stack.push(name.to_string());
        self.local_scopes.push(IndexSet::new());
        BlockScope { parser: self }
    }

    /// Names of the blocks currently being parsed, outermost first.
    pub fn block_stack(&self) -> &[String] {
        &self.block_stack
    }

    /// Record a name assigned inside the innermost block. Assignments at
    /// the top level are not tracked.
    pub fn declare_local(&mut self, name: &str) {
        if let Some(scope) = self.local_scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    /// Was `name` assigned earlier in the innermost block?
    pub fn is_local(&self, name: &str) -> bool {
        self.local_scopes
            .last()
            .is_some_and(|scope| scope.contains(name))
    }
}

/// Guard returned by [`Parser::enter_block`]; pops the block stack and the
/// local scope when dropped, on every exit path.
pub struct BlockScope<'p, 'g> {
    parser: &'p mut Parser<'g>,
}

impl<'g> Deref for BlockScope<'_, 'g> {
    type Target = Parser<'g>;

    fn deref(&self) -> &Self::Target {
        self.parser
    }
}

impl DerefMut for BlockScope<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.parser
    }
}

impl Drop for BlockScope<'_, '_> {
    fn drop(&mut self) {
        self.parser.block_stack.pop();
        self.parser.local_scopes.pop();
    }
}

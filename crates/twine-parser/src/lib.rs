//! Twine Parser
//!
//! Turns a [`TokenStream`] into a [`Module`]: the template body plus its
//! named blocks. Statement tags are dispatched through the [`Grammar`]'s
//! tag registry and expressions are parsed by precedence climbing over its
//! operator tables.
//!
//! # Example
//!
//! ```
//! use twine_parser::{Grammar, NodeKind};
//!
//! let grammar = Grammar::new();
//! let stream = grammar.lexer().tokenize("{% block title %}Hi{% endblock %}", "index").unwrap();
//! let module = twine_parser::parse(stream, &grammar).unwrap();
//! assert!(module.blocks.contains_key("title"));
//! assert!(matches!(module.body.kind, NodeKind::Body(_)));
//! ```

pub mod ast;
pub mod expr_parser;
pub mod grammar;
pub mod parser;
pub mod tags;

pub use ast::{Argument, Block, Constant, Module, Node, NodeKind};
pub use grammar::Grammar;
pub use parser::{BlockScope, Closing, Parser};
pub use tags::{TagHandler, TagParser};
pub use twine_lexer::{Error, SyntaxError, TokenStream};

/// Parse a whole token stream.
pub fn parse(stream: TokenStream, grammar: &Grammar) -> Result<Module, Error> {
    Parser::new(stream, grammar).parse()
}

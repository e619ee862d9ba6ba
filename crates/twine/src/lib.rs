//! Twine
//!
//! Compiles Twig-style templates to JavaScript render modules.
//!
//! ```text
//! source → Lexer → TokenStream → Parser → Module → Optimizer → Compiler → JS
//! ```
//!
//! # Example
//!
//! ```
//! let template = twine::compile_source("Hello {{ name|upper }}!", "hello").unwrap();
//! assert!(template.code.contains("env.filters[\"upper\"]"));
//! ```
//!
//! Use an [`Environment`] to change options or register extensions:
//!
//! ```
//! use twine::{Environment, Optimizations};
//!
//! let env = Environment::builder()
//!     .strict_variables(true)
//!     .optimizations(Optimizations::empty())
//!     .build()
//!     .unwrap();
//! let template = env.compile_source("{{ name }}", "page").unwrap();
//! assert!(template.code.contains("env.undefinedVariable(\"name\", 1)"));
//! ```

pub mod environment;

pub use environment::{Environment, EnvironmentBuilder, EnvironmentError, Extension, Options};
pub use twine_codegen::{Callable, CallableKind, CompiledTemplate, Param, Registry};
pub use twine_lexer::{Error, Source, SyntaxError, Token, TokenKind, TokenStream};
pub use twine_optimizer::{NodeVisitor, Optimizations, Optimizer};
pub use twine_parser::{Argument, Constant, Grammar, Module, Node, NodeKind, Parser, TagParser};

/// Compile `source` with default options and no extensions.
pub fn compile_source(source: &str, name: &str) -> Result<CompiledTemplate, Error> {
    Environment::default().compile_source(source, name)
}

//! Operator tables, tag handlers and test names known to the parser.
//!
//! A [`Grammar`] is assembled once, before any template is parsed, and only
//! read afterwards; parsers borrow it immutably so one grammar can serve
//! any number of concurrent compilations.

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use twine_lexer::Lexer;

use crate::ast::{BinaryOp, UnaryOp};
use crate::tags::{BuiltinTag, TagHandler, TagParser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryOperator {
    pub precedence: u32,
    pub op: UnaryOp,
}

/// What an infix operator builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryKind {
    Operator(BinaryOp),
    /// `is` / `is not`: the right-hand side is a test name, not an expression.
    Test { negated: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryOperator {
    pub precedence: u32,
    pub associativity: Associativity,
    pub kind: BinaryKind,
}

impl BinaryOperator {
    pub fn left(precedence: u32, op: BinaryOp) -> Self {
        Self {
            precedence,
            associativity: Associativity::Left,
            kind: BinaryKind::Operator(op),
        }
    }

    pub fn right(precedence: u32, op: BinaryOp) -> Self {
        Self {
            precedence,
            associativity: Associativity::Right,
            kind: BinaryKind::Operator(op),
        }
    }
}

#[derive(Clone)]
pub struct Grammar {
    unary: IndexMap<String, UnaryOperator>,
    binary: IndexMap<String, BinaryOperator>,
    tags: IndexMap<String, TagHandler>,
    tests: IndexSet<String>,
}

impl Grammar {
    /// The built-in operators and tags.
    pub fn new() -> Self {
        let mut grammar = Self {
            unary: IndexMap::new(),
            binary: IndexMap::new(),
            tags: IndexMap::new(),
            tests: IndexSet::new(),
        };

        for (spelling, precedence, op) in [
            ("not", 50, UnaryOp::Not),
            ("-", 500, UnaryOp::Neg),
            ("+", 500, UnaryOp::Pos),
        ] {
            grammar.add_unary_operator(spelling, UnaryOperator { precedence, op });
        }

        use BinaryOp::*;
        let left = [
            ("or", 10, Or),
            ("and", 15, And),
            ("b-or", 16, BitOr),
            ("b-xor", 17, BitXor),
            ("b-and", 18, BitAnd),
            ("==", 20, Eq),
            ("!=", 20, NotEq),
            ("<=>", 20, Spaceship),
            ("<", 20, Less),
            (">", 20, Greater),
            (">=", 20, GreaterEq),
            ("<=", 20, LessEq),
            ("not in", 20, NotIn),
            ("in", 20, In),
            ("matches", 20, Matches),
            ("starts with", 20, StartsWith),
            ("ends with", 20, EndsWith),
            ("..", 25, Range),
            ("+", 30, Add),
            ("-", 30, Sub),
            ("~", 40, Concat),
            ("*", 60, Mul),
            ("/", 60, Div),
            ("//", 60, FloorDiv),
            ("%", 60, Mod),
        ];
        for (spelling, precedence, op) in left {
            grammar.add_binary_operator(spelling, BinaryOperator::left(precedence, op));
        }
        for (spelling, negated) in [("is", false), ("is not", true)] {
            grammar.add_binary_operator(
                spelling,
                BinaryOperator {
                    precedence: 100,
                    associativity: Associativity::Left,
                    kind: BinaryKind::Test { negated },
                },
            );
        }
        grammar.add_binary_operator("**", BinaryOperator::right(200, Power));
        grammar.add_binary_operator("??", BinaryOperator::right(300, NullCoalesce));

        for tag in BuiltinTag::ALL {
            grammar
                .tags
                .insert(tag.name().to_string(), TagHandler::Builtin(tag));
        }

        grammar
    }

    pub fn add_unary_operator(&mut self, spelling: impl Into<String>, operator: UnaryOperator) -> &mut Self {
        self.unary.insert(spelling.into(), operator);
        self
    }

    pub fn add_binary_operator(&mut self, spelling: impl Into<String>, operator: BinaryOperator) -> &mut Self {
        self.binary.insert(spelling.into(), operator);
        self
    }

    /// Register a tag handler; replaces any handler with the same tag name.
    pub fn add_tag(&mut self, parser: Arc<dyn TagParser>) -> &mut Self {
        self.tags
            .insert(parser.tag().to_string(), TagHandler::Extension(parser));
        self
    }

    /// Make a test name known, so that two-word names such as
    /// `divisible by` are recognised after `is`.
    pub fn add_test(&mut self, name: impl Into<String>) -> &mut Self {
        self.tests.insert(name.into());
        self
    }

    pub fn unary_operator(&self, spelling: &str) -> Option<&UnaryOperator> {
        self.unary.get(spelling)
    }

    pub fn binary_operator(&self, spelling: &str) -> Option<&BinaryOperator> {
        self.binary.get(spelling)
    }

    pub fn tag(&self, name: &str) -> Option<&TagHandler> {
        self.tags.get(name)
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    pub fn has_test(&self, name: &str) -> bool {
        self.tests.contains(name)
    }

    /// Every operator spelling, for building the lexer's operator regex.
    pub fn operator_spellings(&self) -> impl Iterator<Item = &str> {
        self.unary.keys().chain(self.binary.keys()).map(String::as_str)
    }

    /// A lexer that recognises exactly this grammar's operators.
    pub fn lexer(&self) -> Lexer {
        Lexer::new(self.operator_spellings())
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("unary", &self.unary.keys().collect::<Vec<_>>())
            .field("binary", &self.binary.keys().collect::<Vec<_>>())
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .field("tests", &self.tests)
            .finish()
    }
}

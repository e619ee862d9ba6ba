//! Abstract Syntax Tree for twine templates.
//!
//! Statements and expressions share one [`Node`] type so that optimizer
//! passes can walk and rewrite any part of the tree uniformly. Every node
//! carries the template line it came from and, for nodes built by a tag
//! handler, the tag that produced it.

use indexmap::IndexMap;
use twine_lexer::Source;

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Top-level body; always a [`NodeKind::Body`].
    pub body: Node,
    /// Named blocks in definition order. The body only holds a
    /// [`NodeKind::BlockReference`] where each one was defined.
    pub blocks: IndexMap<String, Block>,
    pub source: Source,
}

/// A `{% block %}` definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub body: Node,
    pub line: usize,
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub line: usize,
    /// Name of the tag whose handler built this node, if any.
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // --- Statements ---
    /// An ordered list of statements.
    Body(Vec<Node>),

    /// Literal template text.
    Text(String),

    /// `{{ expr }}`
    Print(Box<Node>),

    /// `{% set a, b = x, y %}` or the capturing `{% set a %}...{% endset %}`.
    /// A capture holds exactly one value: the captured body.
    Set {
        capture: bool,
        names: Vec<String>,
        values: Vec<Node>,
    },

    /// Renders the named block at this position.
    BlockReference(String),

    /// Renders the parent version of the enclosing block.
    ParentBlock,

    /// `{% spaceless %}...{% endspaceless %}`
    Spaceless(Box<Node>),

    /// `{% if %}` with its `elseif` branches as (condition, body) pairs.
    If {
        tests: Vec<(Node, Node)>,
        otherwise: Option<Box<Node>>,
    },

    /// `{% for %}`
    For(Box<ForLoop>),

    // --- Expressions ---
    /// Literal value: `'text'`, `42`, `true`, `null`
    Constant(Constant),

    /// Variable lookup: `user`
    Name(String),

    /// Prefix operator: `not ok`, `-count`
    Unary { op: UnaryOp, node: Box<Node> },

    /// Infix operator: `a + b`, `x in list`
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// `test ? then : otherwise`
    Conditional {
        test: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },

    /// `[1, 2, 3]`
    Array(Vec<Node>),

    /// `{ key: value }`, as (key, value) pairs in source order.
    Hash(Vec<(Node, Node)>),

    /// `user.name`, `user['name']`, `user.greet('hi')`
    GetAttr {
        node: Box<Node>,
        attribute: Box<Node>,
        arguments: Vec<Node>,
        access: AccessType,
    },

    /// `expr|name(args)`. `filter` is a string constant holding the name.
    Filter {
        node: Box<Node>,
        filter: Box<Node>,
        arguments: Vec<Argument>,
    },

    /// `name(args)`
    Function {
        name: String,
        arguments: Vec<Argument>,
    },

    /// `expr is name(args)`
    Test {
        node: Box<Node>,
        name: String,
        arguments: Vec<Argument>,
    },
}

/// Body and bindings of a `{% for %}` loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub key_target: String,
    pub value_target: String,
    pub seq: Node,
    pub body: Node,
    pub otherwise: Option<Node>,
    /// Whether the body needs the `loop` variable. Cleared by the optimizer
    /// when nothing reads it.
    pub with_loop: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    String(String),
    /// Number literal in source spelling; never rounded.
    Number(String),
    Bool(bool),
    Null,
}

/// A call argument, optionally named (`name = value`).
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub value: Node,
}

impl Argument {
    pub fn positional(value: Node) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: Node) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }
}

/// How an attribute was accessed in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// `a.b`
    Any,
    /// `a[b]`
    Array,
    /// `a.b()`
    Method,
}

impl AccessType {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessType::Any => "any",
            AccessType::Array => "array",
            AccessType::Method => "method",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    /// Extension operator, compiled as a call to the given JS callable.
    Call(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    NotEq,
    Spaceship,
    Less,
    Greater,
    GreaterEq,
    LessEq,
    NotIn,
    In,
    Matches,
    StartsWith,
    EndsWith,
    Range,
    Add,
    Sub,
    Concat,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Power,
    NullCoalesce,
    /// Extension operator, compiled as a call to the given JS callable.
    Call(String),
}

// ---------------------------------------------------------------------------
// Constructors and traversal helpers
// ---------------------------------------------------------------------------

impl Node {
    pub fn new(kind: NodeKind, line: usize) -> Self {
        Self {
            kind,
            line,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// An empty body, used wherever a slot must hold "nothing".
    pub fn empty(line: usize) -> Self {
        Self::new(NodeKind::Body(Vec::new()), line)
    }

    pub fn body(nodes: Vec<Node>, line: usize) -> Self {
        Self::new(NodeKind::Body(nodes), line)
    }

    pub fn text(text: impl Into<String>, line: usize) -> Self {
        Self::new(NodeKind::Text(text.into()), line)
    }

    pub fn constant(value: Constant, line: usize) -> Self {
        Self::new(NodeKind::Constant(value), line)
    }

    pub fn string(value: impl Into<String>, line: usize) -> Self {
        Self::constant(Constant::String(value.into()), line)
    }

    pub fn name(name: impl Into<String>, line: usize) -> Self {
        Self::new(NodeKind::Name(name.into()), line)
    }

    pub fn unary(op: UnaryOp, node: Node, line: usize) -> Self {
        Self::new(
            NodeKind::Unary {
                op,
                node: Box::new(node),
            },
            line,
        )
    }

    pub fn binary(op: BinaryOp, left: Node, right: Node, line: usize) -> Self {
        Self::new(
            NodeKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            line,
        )
    }

    pub fn print(expr: Node, line: usize) -> Self {
        Self::new(NodeKind::Print(Box::new(expr)), line)
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.kind {
            NodeKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// The string value of a string constant.
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Constant(Constant::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_body(&self) -> bool {
        matches!(self.kind, NodeKind::Body(_))
    }

    /// Does this node write directly to the rendered output?
    pub fn is_output(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Text(_)
                | NodeKind::Print(_)
                | NodeKind::BlockReference(_)
                | NodeKind::ParentBlock
                | NodeKind::Spaceless(_)
        )
    }

    /// Rebuild this node with every direct child passed through `f`.
    ///
    /// Returning `None` removes the child. Bodies drop removed entries and
    /// optional slots become empty; any other slot is filled with an empty
    /// body, since the tree has no other notion of an absent child.
    pub fn map_children<F>(self, f: &mut F) -> Node
    where
        F: FnMut(Node) -> Option<Node>,
    {
        let Node { kind, line, tag } = self;

        let kind = match kind {
            NodeKind::Body(nodes) => NodeKind::Body(nodes.into_iter().filter_map(|n| f(n)).collect()),
            NodeKind::Print(expr) => NodeKind::Print(boxed(expr, f)),
            NodeKind::Set {
                capture,
                names,
                values,
            } => NodeKind::Set {
                capture,
                names,
                values: values.into_iter().map(|v| required(v, f)).collect(),
            },
            NodeKind::Spaceless(body) => NodeKind::Spaceless(boxed(body, f)),
            NodeKind::If { tests, otherwise } => NodeKind::If {
                tests: tests
                    .into_iter()
                    .map(|(cond, body)| (required(cond, f), required(body, f)))
                    .collect(),
                otherwise: otherwise.and_then(|n| f(*n)).map(Box::new),
            },
            NodeKind::For(for_loop) => {
                let ForLoop {
                    key_target,
                    value_target,
                    seq,
                    body,
                    otherwise,
                    with_loop,
                } = *for_loop;
                NodeKind::For(Box::new(ForLoop {
                    key_target,
                    value_target,
                    seq: required(seq, f),
                    body: required(body, f),
                    otherwise: otherwise.and_then(|n| f(n)),
                    with_loop,
                }))
            }
            NodeKind::Unary { op, node } => NodeKind::Unary {
                op,
                node: boxed(node, f),
            },
            NodeKind::Binary { op, left, right } => NodeKind::Binary {
                op,
                left: boxed(left, f),
                right: boxed(right, f),
            },
            NodeKind::Conditional {
                test,
                then,
                otherwise,
            } => NodeKind::Conditional {
                test: boxed(test, f),
                then: boxed(then, f),
                otherwise: boxed(otherwise, f),
            },
            NodeKind::Array(items) => {
                NodeKind::Array(items.into_iter().map(|n| required(n, f)).collect())
            }
            NodeKind::Hash(pairs) => NodeKind::Hash(
                pairs
                    .into_iter()
                    .map(|(k, v)| (required(k, f), required(v, f)))
                    .collect(),
            ),
            NodeKind::GetAttr {
                node,
                attribute,
                arguments: args,
                access,
            } => NodeKind::GetAttr {
                node: boxed(node, f),
                attribute: boxed(attribute, f),
                arguments: args.into_iter().map(|n| required(n, f)).collect(),
                access,
            },
            NodeKind::Filter {
                node,
                filter,
                arguments: args,
            } => NodeKind::Filter {
                node: boxed(node, f),
                filter: boxed(filter, f),
                arguments: map_arguments(args, f),
            },
            NodeKind::Function {
                name,
                arguments: args,
            } => NodeKind::Function {
                name,
                arguments: map_arguments(args, f),
            },
            NodeKind::Test {
                node,
                name,
                arguments: args,
            } => NodeKind::Test {
                node: boxed(node, f),
                name,
                arguments: map_arguments(args, f),
            },
            leaf @ (NodeKind::Text(_)
            | NodeKind::BlockReference(_)
            | NodeKind::ParentBlock
            | NodeKind::Constant(_)
            | NodeKind::Name(_)) => leaf,
        };

        Node { kind, line, tag }
    }
}

fn required<F>(node: Node, f: &mut F) -> Node
where
    F: FnMut(Node) -> Option<Node>,
{
    let line = node.line;
    f(node).unwrap_or_else(|| Node::empty(line))
}

fn boxed<F>(node: Box<Node>, f: &mut F) -> Box<Node>
where
    F: FnMut(Node) -> Option<Node>,
{
    Box::new(required(*node, f))
}

fn map_arguments<F>(args: Vec<Argument>, f: &mut F) -> Vec<Argument>
where
    F: FnMut(Node) -> Option<Node>,
{
    args.into_iter()
        .map(|arg| Argument {
            name: arg.name,
            value: required(arg.value, f),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_if() -> Node {
        Node::new(
            NodeKind::If {
                tests: vec![(
                    Node::name("ok", 1),
                    Node::body(vec![Node::text("a", 1), Node::text("b", 1)], 1),
                )],
                otherwise: Some(Box::new(Node::body(vec![Node::text("c", 2)], 2))),
            },
            1,
        )
    }

    #[test]
    fn test_output_nodes() {
        assert!(Node::text("x", 1).is_output());
        assert!(Node::print(Node::name("x", 1), 1).is_output());
        assert!(Node::new(NodeKind::BlockReference("b".into()), 1).is_output());
        assert!(Node::new(NodeKind::ParentBlock, 1).is_output());
        assert!(!Node::name("x", 1).is_output());
        assert!(!sample_if().is_output());
    }

    #[test]
    fn test_map_children_identity() {
        let node = sample_if();
        assert_eq!(node.clone().map_children(&mut Some), node);
    }

    #[test]
    fn test_map_children_removal() {
        let node = sample_if().map_children(&mut |child: Node| match child.kind {
            NodeKind::Name(_) => None,
            NodeKind::Body(ref nodes) if nodes.len() == 1 => None,
            _ => Some(child),
        });
        let NodeKind::If { tests, otherwise } = node.kind else {
            panic!("Expected if");
        };
        // A removed condition is replaced; a removed else branch disappears.
        assert_eq!(tests[0].0, Node::empty(1));
        assert!(otherwise.is_none());
    }

    #[test]
    fn test_map_children_keeps_line_and_tag() {
        let node = Node::new(NodeKind::Spaceless(Box::new(Node::empty(3))), 3).with_tag("spaceless");
        let mapped = node.map_children(&mut Some);
        assert_eq!(mapped.line, 3);
        assert_eq!(mapped.tag.as_deref(), Some("spaceless"));
    }

    #[test]
    fn test_map_children_visits_arguments() {
        let node = Node::new(
            NodeKind::Function {
                name: "range".into(),
                arguments: vec![
                    Argument::positional(Node::constant(Constant::Number("1".into()), 1)),
                    Argument::named("step", Node::constant(Constant::Number("2".into()), 1)),
                ],
            },
            1,
        );
        let mut seen = 0;
        node.map_children(&mut |child| {
            seen += 1;
            Some(child)
        });
        assert_eq!(seen, 2);
    }
}

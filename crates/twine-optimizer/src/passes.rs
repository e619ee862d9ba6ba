use twine_parser::ast::{Constant, NodeKind};
use twine_parser::Node;

use crate::NodeVisitor;

// =========================================================================
// for
// =========================================================================

/// Clears `with_loop` on `for` loops whose body never reads `loop`.
///
/// Reading `loop.parent`, rendering a block or calling `parent()`,
/// `block()` or `include()` may read any enclosing loop, so those mark
/// every open loop as used.
#[derive(Debug, Default)]
pub struct LoopUsage {
    open: Vec<bool>,
}

impl LoopUsage {
    fn mark_current(&mut self) {
        if let Some(used) = self.open.last_mut() {
            *used = true;
        }
    }

    fn mark_all(&mut self) {
        self.open.iter_mut().for_each(|used| *used = true);
    }
}

impl NodeVisitor for LoopUsage {
    fn enter(&mut self, node: Node) -> Node {
        match &node.kind {
            NodeKind::For(_) => self.open.push(false),
            NodeKind::Name(name) if name == "loop" => self.mark_current(),
            NodeKind::GetAttr {
                node: target,
                attribute,
                ..
            } if matches!(&target.kind, NodeKind::Name(n) if n == "loop")
                && attribute.as_str() == Some("parent") =>
            {
                self.mark_all()
            }
            NodeKind::BlockReference(_) | NodeKind::ParentBlock => self.mark_all(),
            NodeKind::Function { name, .. }
                if matches!(name.as_str(), "parent" | "block" | "include") =>
            {
                self.mark_all()
            }
            _ => {}
        }
        node
    }

    fn leave(&mut self, mut node: Node) -> Option<Node> {
        if let NodeKind::For(for_loop) = &mut node.kind {
            for_loop.with_loop = self.open.pop().unwrap_or(true);
        }
        Some(node)
    }
}

// =========================================================================
// raw_filter
// =========================================================================

/// Replaces `expr|raw` with `expr`.
#[derive(Debug, Default)]
pub struct RawFilter;

impl NodeVisitor for RawFilter {
    fn leave(&mut self, node: Node) -> Option<Node> {
        match node.kind {
            NodeKind::Filter { node: inner, filter, .. } if filter.as_str() == Some("raw") => {
                Some(*inner)
            }
            kind => Some(Node { kind, ..node }),
        }
    }
}

// =========================================================================
// print_block
// =========================================================================

/// Turns `{{ block('name') }}` and `{{ parent() }}` into direct block
/// output, skipping the intermediate string.
///
/// Only a literal block name is folded; `block()` with a dynamic name or a
/// `template` argument stays a function call.
#[derive(Debug, Default)]
pub struct PrintBlock;

impl NodeVisitor for PrintBlock {
    fn leave(&mut self, node: Node) -> Option<Node> {
        let NodeKind::Print(expr) = &node.kind else {
            return Some(node);
        };
        let NodeKind::Function { name, arguments } = &expr.kind else {
            return Some(node);
        };
        let kind = match (name.as_str(), arguments.as_slice()) {
            ("parent", []) => NodeKind::ParentBlock,
            ("block", [argument]) if matches!(argument.name.as_deref(), None | Some("name")) => {
                match argument.value.as_constant() {
                    Some(Constant::String(block)) => NodeKind::BlockReference(block.clone()),
                    _ => return Some(node),
                }
            }
            _ => return Some(node),
        };
        Some(Node { kind, ..node })
    }
}

// =========================================================================
// print_constant
// =========================================================================

/// Turns `{{ 'text' }}` and `{{ 42 }}` into plain text.
///
/// Only integers whose decimal spelling survives a round trip through the
/// runtime's number type are folded; anything else is left to the runtime
/// to format.
#[derive(Debug, Default)]
pub struct PrintConstant;

impl NodeVisitor for PrintConstant {
    fn leave(&mut self, node: Node) -> Option<Node> {
        let NodeKind::Print(expr) = &node.kind else {
            return Some(node);
        };
        let text = match expr.as_constant() {
            Some(Constant::String(s)) => s.clone(),
            Some(Constant::Number(n)) if is_exact_integer(n) => n.clone(),
            _ => return Some(node),
        };
        Some(Node {
            kind: NodeKind::Text(text),
            ..node
        })
    }
}

/// Plain decimal integer without a leading zero, small enough to be
/// represented exactly by a double.
fn is_exact_integer(literal: &str) -> bool {
    let digits_only = !literal.is_empty() && literal.bytes().all(|b| b.is_ascii_digit());
    let canonical = literal == "0" || !literal.starts_with('0');
    digits_only && canonical && literal.len() <= 15
}

// =========================================================================
// text_merge
// =========================================================================

/// Merges runs of adjacent text nodes in a body and drops empty ones.
#[derive(Debug, Default)]
pub struct TextMerge;

impl NodeVisitor for TextMerge {
    fn leave(&mut self, node: Node) -> Option<Node> {
        let NodeKind::Body(nodes) = node.kind else {
            return Some(node);
        };

        let mut merged: Vec<Node> = Vec::with_capacity(nodes.len());
        for child in nodes {
            let NodeKind::Text(text) = &child.kind else {
                merged.push(child);
                continue;
            };
            if text.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(Node {
                    kind: NodeKind::Text(previous),
                    ..
                }) => previous.push_str(text),
                _ => merged.push(child),
            }
        }

        Some(Node {
            kind: NodeKind::Body(merged),
            ..node
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traverse;
    use pretty_assertions::assert_eq;
    use twine_parser::{Grammar, Module};

    fn parse(source: &str) -> Module {
        let grammar = Grammar::new();
        let stream = grammar.lexer().tokenize(source, "index").unwrap();
        twine_parser::parse(stream, &grammar).unwrap()
    }

    fn apply(visitor: &mut dyn NodeVisitor, source: &str) -> Vec<Node> {
        match traverse(visitor, parse(source).body).map(|n| n.kind) {
            Some(NodeKind::Body(nodes)) => nodes,
            other => panic!("Expected body, got {other:?}"),
        }
    }

    fn loops(nodes: &[Node]) -> Vec<bool> {
        fn collect(node: &Node, out: &mut Vec<bool>) {
            match &node.kind {
                NodeKind::For(for_loop) => {
                    out.push(for_loop.with_loop);
                    collect(&for_loop.body, out);
                }
                NodeKind::Body(nodes) => nodes.iter().for_each(|n| collect(n, out)),
                _ => {}
            }
        }
        let mut out = Vec::new();
        nodes.iter().for_each(|n| collect(n, &mut out));
        out
    }

    // =========================================================================
    // for
    // =========================================================================

    #[test]
    fn test_loop_unused() {
        let nodes = apply(&mut LoopUsage::default(), "{% for i in items %}{{ i }}{% endfor %}");
        assert_eq!(loops(&nodes), vec![false]);
    }

    #[test]
    fn test_loop_used_by_inner_only() {
        let nodes = apply(
            &mut LoopUsage::default(),
            "{% for i in items %}{% for j in i %}{{ loop.index }}{% endfor %}{% endfor %}",
        );
        assert_eq!(loops(&nodes), vec![false, true]);
    }

    #[test]
    fn test_loop_parent_marks_all() {
        let nodes = apply(
            &mut LoopUsage::default(),
            "{% for i in items %}{% for j in i %}{{ loop.parent.x }}{% endfor %}{% endfor %}",
        );
        assert_eq!(loops(&nodes), vec![true, true]);
    }

    #[test]
    fn test_block_reference_marks_all() {
        let nodes = apply(
            &mut LoopUsage::default(),
            "{% for i in items %}{% block row %}{{ i }}{% endblock %}{% endfor %}",
        );
        assert_eq!(loops(&nodes), vec![true]);
    }

    // =========================================================================
    // raw_filter / print_block / print_constant
    // =========================================================================

    #[test]
    fn test_raw_filter_removed() {
        let nodes = apply(&mut RawFilter, "{{ a|raw|upper|raw }}");
        let NodeKind::Print(expr) = &nodes[0].kind else {
            panic!("Expected print");
        };
        let NodeKind::Filter { filter, node, .. } = &expr.kind else {
            panic!("Expected filter");
        };
        assert_eq!(filter.as_str(), Some("upper"));
        assert_eq!(**node, Node::name("a", 1));
    }

    #[test]
    fn test_print_constant() {
        let nodes = apply(&mut PrintConstant, "{{ 'a' }}{{ 12 }}{{ 1.5 }}{{ 007 }}{{ x }}");
        assert_eq!(nodes[0], Node::text("a", 1));
        assert_eq!(nodes[1], Node::text("12", 1));
        assert!(matches!(nodes[2].kind, NodeKind::Print(_)));
        assert!(matches!(nodes[3].kind, NodeKind::Print(_)));
        assert!(matches!(nodes[4].kind, NodeKind::Print(_)));
    }

    #[test]
    fn test_print_block() {
        let nodes = apply(
            &mut PrintBlock,
            "{{ block('title') }}{{ block(name = 'nav') }}{{ parent() }}{{ block(x) }}{{ block('a', 'b.twig') }}",
        );
        assert_eq!(nodes[0].kind, NodeKind::BlockReference("title".into()));
        assert_eq!(nodes[1].kind, NodeKind::BlockReference("nav".into()));
        assert_eq!(nodes[2].kind, NodeKind::ParentBlock);
        assert!(matches!(nodes[3].kind, NodeKind::Print(_)));
        assert!(matches!(nodes[4].kind, NodeKind::Print(_)));
    }

    #[test]
    fn test_block_call_outside_print_is_kept() {
        let nodes = apply(&mut PrintBlock, "{{ block('title')|upper }}");
        assert!(matches!(nodes[0].kind, NodeKind::Print(_)));
    }

    #[test]
    fn test_exact_integer() {
        assert!(is_exact_integer("0"));
        assert!(is_exact_integer("123456789012345"));
        assert!(!is_exact_integer("922337203685477580700"));
        assert!(!is_exact_integer("1e5"));
    }

    // =========================================================================
    // text_merge
    // =========================================================================

    #[test]
    fn test_text_merge() {
        let node = Node::body(
            vec![
                Node::text("a", 1),
                Node::text("", 1),
                Node::text("b", 2),
                Node::print(Node::name("x", 2), 2),
                Node::text("c", 3),
            ],
            1,
        );
        let merged = traverse(&mut TextMerge, node).unwrap();
        assert_eq!(
            merged,
            Node::body(
                vec![
                    Node::text("ab", 1),
                    Node::print(Node::name("x", 2), 2),
                    Node::text("c", 3),
                ],
                1
            )
        );
    }
}

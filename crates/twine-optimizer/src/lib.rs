//! Twine Optimizer
//!
//! Rewrites a parsed [`Module`] with a fixed sequence of passes, each one
//! a [`NodeVisitor`] run as its own depth-first traversal over the module
//! body and every block body. Which passes run is chosen with
//! [`Optimizations`] flags; all of them are on by default.
//!
//! ```text
//! Module → [for] → [raw_filter] → [print_block] → [print_constant] → [text_merge] → Module
//! ```

mod passes;

use bitflags::bitflags;
use twine_parser::{Module, Node};

pub use passes::{LoopUsage, PrintBlock, PrintConstant, RawFilter, TextMerge};

bitflags! {
    /// Optimizer passes to run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Optimizations: u32 {
        /// Drop the `loop` variable from `for` loops that never read it.
        const FOR = 1 << 0;
        /// Remove `|raw` filters.
        const RAW_FILTER = 1 << 1;
        /// Turn prints of literal strings and integers into text.
        const PRINT_CONSTANT = 1 << 2;
        /// Merge adjacent text nodes.
        const TEXT_MERGE = 1 << 3;
        /// Display `block()` and `parent()` directly instead of printing
        /// their rendered string.
        const PRINT_BLOCK = 1 << 4;
    }
}

impl Default for Optimizations {
    fn default() -> Self {
        Self::all()
    }
}

/// A tree-rewriting pass.
///
/// [`traverse`] calls `enter` on the way down and `leave` on the way up,
/// after every child slot has been replaced by the child's own `leave`
/// result. Returning `None` from `leave` removes the node where the tree
/// allows it (see [`Node::map_children`]).
pub trait NodeVisitor {
    fn enter(&mut self, node: Node) -> Node {
        node
    }

    fn leave(&mut self, node: Node) -> Option<Node> {
        Some(node)
    }
}

/// Depth-first traversal of `node` with `visitor`.
pub fn traverse<V: NodeVisitor + ?Sized>(visitor: &mut V, node: Node) -> Option<Node> {
    let node = visitor.enter(node);
    let node = node.map_children(&mut |child| traverse(&mut *visitor, child));
    visitor.leave(node)
}

/// Runs the enabled passes, in their fixed order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Optimizer {
    optimizations: Optimizations,
}

impl Optimizer {
    pub fn new(optimizations: Optimizations) -> Self {
        Self { optimizations }
    }

    pub fn optimizations(&self) -> Optimizations {
        self.optimizations
    }

    pub fn optimize(&self, module: Module) -> Module {
        let Module {
            mut body,
            mut blocks,
            source,
        } = module;

        for (flag, name) in PASSES {
            if !self.optimizations.contains(flag) {
                continue;
            }
            tracing::trace!(pass = name, template = %source.name, "running optimizer pass");

            body = run(flag, body);
            for block in blocks.values_mut() {
                let block_body = std::mem::replace(&mut block.body, Node::empty(block.line));
                block.body = run(flag, block_body);
            }
        }

        Module {
            body,
            blocks,
            source,
        }
    }
}

const PASSES: [(Optimizations, &str); 5] = [
    (Optimizations::FOR, "for"),
    (Optimizations::RAW_FILTER, "raw_filter"),
    (Optimizations::PRINT_BLOCK, "print_block"),
    (Optimizations::PRINT_CONSTANT, "print_constant"),
    (Optimizations::TEXT_MERGE, "text_merge"),
];

/// One traversal with a fresh visitor for the pass behind `flag`.
fn run(flag: Optimizations, root: Node) -> Node {
    let line = root.line;
    let mut visitor: Box<dyn NodeVisitor> = if flag == Optimizations::FOR {
        Box::new(LoopUsage::default())
    } else if flag == Optimizations::RAW_FILTER {
        Box::new(RawFilter)
    } else if flag == Optimizations::PRINT_BLOCK {
        Box::new(PrintBlock)
    } else if flag == Optimizations::PRINT_CONSTANT {
        Box::new(PrintConstant)
    } else {
        Box::new(TextMerge)
    };
    traverse(visitor.as_mut(), root).unwrap_or_else(|| Node::empty(line))
}

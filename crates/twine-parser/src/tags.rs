//! Tag handlers: the built-in `block`, `set`, `spaceless`, `if` and `for`
//! tags, and the [`TagParser`] trait for tags added by extensions.

use std::fmt;
use std::sync::Arc;

use twine_lexer::{Error, Token, TokenKind};

use crate::ast::{Block, ForLoop, Node, NodeKind};
use crate::parser::{Closing, Parser};

/// A parser for one `{% tag %}` added by an extension.
///
/// `parse` is called with the tag-name token already consumed and must
/// consume the rest of its construct, including the closing `%}`.
/// Returning `Ok(None)` leaves nothing in the tree.
pub trait TagParser: Send + Sync {
    fn tag(&self) -> &str;

    fn parse(&self, token: &Token, parser: &mut Parser<'_>) -> Result<Option<Node>, Error>;
}

#[derive(Clone)]
pub enum TagHandler {
    Builtin(BuiltinTag),
    Extension(Arc<dyn TagParser>),
}

impl TagHandler {
    pub fn parse(&self, token: &Token, parser: &mut Parser<'_>) -> Result<Option<Node>, Error> {
        match self {
            TagHandler::Builtin(tag) => tag.parse(token, parser).map(Some),
            TagHandler::Extension(handler) => handler.parse(token, parser),
        }
    }
}

impl fmt::Debug for TagHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagHandler::Builtin(tag) => write!(f, "Builtin({})", tag.name()),
            TagHandler::Extension(handler) => write!(f, "Extension({})", handler.tag()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTag {
    Block,
    Set,
    Spaceless,
    If,
    For,
}

impl BuiltinTag {
    pub const ALL: [BuiltinTag; 5] = [
        BuiltinTag::Block,
        BuiltinTag::Set,
        BuiltinTag::Spaceless,
        BuiltinTag::If,
        BuiltinTag::For,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinTag::Block => "block",
            BuiltinTag::Set => "set",
            BuiltinTag::Spaceless => "spaceless",
            BuiltinTag::If => "if",
            BuiltinTag::For => "for",
        }
    }

    fn parse(self, token: &Token, parser: &mut Parser<'_>) -> Result<Node, Error> {
        match self {
            BuiltinTag::Block => parse_block(token, parser),
            BuiltinTag::Set => parse_set(token, parser),
            BuiltinTag::Spaceless => parse_spaceless(token, parser),
            BuiltinTag::If => parse_if(token, parser),
            BuiltinTag::For => parse_for(token, parser),
        }
    }
}

// =========================================================================
// block
// =========================================================================

/// `{% block name %}...{% endblock [name] %}` or `{% block name expr %}`.
fn parse_block(token: &Token, parser: &mut Parser<'_>) -> Result<Node, Error> {
    let line = token.line;
    let name = parser.stream_mut().expect(TokenKind::Name, None)?.value;

    if let Some(existing) = parser.block(&name) {
        let message = format!(
            "The block '{name}' has already been defined line {}.",
            existing.line
        );
        return Err(parser.error(message, parser.stream().current().line));
    }
    // Registered before the body is parsed so a nested redefinition fails.
    parser.set_block(Block {
        name: name.clone(),
        body: Node::empty(line),
        line,
    });

    let body = {
        let mut scope = parser.enter_block(&name);
        let body = if scope.stream_mut().next_if(TokenKind::BlockEnd, None).is_some() {
            let body = scope.subparse(Some(&Closing::new("block", line, &["endblock"])), true)?;
            if let Some(end_name) = scope.stream_mut().next_if(TokenKind::Name, None) {
                if end_name.value != name {
                    let message = format!(
                        "Expected endblock for block \"{name}\" (but \"{}\" given).",
                        end_name.value
                    );
                    return Err(scope.error(message, scope.stream().current().line));
                }
            }
            body
        } else {
            let expr = scope.parse_expression()?;
            Node::body(vec![Node::print(expr, line)], line)
        };
        scope.stream_mut().expect(TokenKind::BlockEnd, None)?;
        body
    };

    parser.set_block(Block {
        name: name.clone(),
        body,
        line,
    });
    Ok(Node::new(NodeKind::BlockReference(name), line))
}

// =========================================================================
// set
// =========================================================================

/// `{% set a, b = x, y %}` or `{% set a %}...{% endset %}`.
fn parse_set(token: &Token, parser: &mut Parser<'_>) -> Result<Node, Error> {
    let line = token.line;
    let names = parser.parse_assignment_targets()?;

    let (capture, values) = if parser.stream_mut().next_if(TokenKind::Operator, Some("=")).is_some() {
        let values = parser.parse_multitarget_expression()?;
        parser.stream_mut().expect(TokenKind::BlockEnd, None)?;
        if names.len() != values.len() {
            return Err(parser.error(
                "When using set, you must have the same number of variables and assignments.",
                parser.stream().current().line,
            ));
        }
        (false, values)
    } else {
        if names.len() > 1 {
            return Err(parser.error(
                "When using set with a block, you cannot have a multi-target.",
                parser.stream().current().line,
            ));
        }
        parser.stream_mut().expect(TokenKind::BlockEnd, None)?;
        let body = parser.subparse(Some(&Closing::new("set", line, &["endset"])), true)?;
        parser.stream_mut().expect(TokenKind::BlockEnd, None)?;
        (true, vec![body])
    };

    for name in &names {
        parser.declare_local(name);
    }
    Ok(Node::new(
        NodeKind::Set {
            capture,
            names,
            values,
        },
        line,
    ))
}

// =========================================================================
// spaceless
// =========================================================================

fn parse_spaceless(token: &Token, parser: &mut Parser<'_>) -> Result<Node, Error> {
    let line = token.line;
    parser.stream_mut().expect(TokenKind::BlockEnd, None)?;
    let body = parser.subparse(Some(&Closing::new("spaceless", line, &["endspaceless"])), true)?;
    parser.stream_mut().expect(TokenKind::BlockEnd, None)?;
    Ok(Node::new(NodeKind::Spaceless(Box::new(body)), line))
}

// =========================================================================
// if
// =========================================================================

fn parse_if(token: &Token, parser: &mut Parser<'_>) -> Result<Node, Error> {
    let line = token.line;
    let fork = Closing::new("if", line, &["elseif", "else", "endif"]);
    let end = Closing::new("if", line, &["endif"]);

    let condition = parser.parse_expression()?;
    parser.stream_mut().expect(TokenKind::BlockEnd, None)?;
    let body = parser.subparse(Some(&fork), false)?;

    let mut tests = vec![(condition, body)];
    let mut otherwise = None;
    loop {
        let branch = parser.stream_mut().next()?;
        match branch.value.as_str() {
            "else" => {
                parser.stream_mut().expect(TokenKind::BlockEnd, None)?;
                otherwise = Some(Box::new(parser.subparse(Some(&end), false)?));
            }
            "elseif" => {
                let condition = parser.parse_expression()?;
                parser.stream_mut().expect(TokenKind::BlockEnd, None)?;
                let body = parser.subparse(Some(&fork), false)?;
                tests.push((condition, body));
            }
            "endif" => break,
            _ => {
                let message = format!(
                    "Unexpected end of template. Expected \"else\", \"elseif\" or \"endif\" to close the \"if\" block started at line {line}."
                );
                return Err(parser.error(message, branch.line));
            }
        }
    }
    parser.stream_mut().expect(TokenKind::BlockEnd, None)?;

    Ok(Node::new(NodeKind::If { tests, otherwise }, line))
}

// =========================================================================
// for
// =========================================================================

/// `{% for [key,] value in seq %}...[{% else %}...]{% endfor %}`.
fn parse_for(token: &Token, parser: &mut Parser<'_>) -> Result<Node, Error> {
    let line = token.line;
    let mut targets = parser.parse_assignment_targets()?.into_iter();
    parser.stream_mut().expect(TokenKind::Operator, Some("in"))?;
    let seq = parser.parse_expression()?;
    parser.stream_mut().expect(TokenKind::BlockEnd, None)?;

    let body = parser.subparse(Some(&Closing::new("for", line, &["else", "endfor"])), false)?;
    let otherwise = if parser.stream_mut().next()?.value == "else" {
        parser.stream_mut().expect(TokenKind::BlockEnd, None)?;
        Some(parser.subparse(Some(&Closing::new("for", line, &["endfor"])), true)?)
    } else {
        None
    };
    parser.stream_mut().expect(TokenKind::BlockEnd, None)?;

    let first = targets.next().unwrap_or_default();
    let (key_target, value_target) = match targets.next() {
        Some(value) => (first, value),
        None => ("_key".to_string(), first),
    };

    Ok(Node::new(
        NodeKind::For(Box::new(ForLoop {
            key_target,
            value_target,
            seq,
            body,
            otherwise,
            with_loop: true,
        })),
        line,
    ))
}

//! Binding parsed call arguments to a callable's declared parameters.
//!
//! Named arguments go to the parameter of the same name, positional ones
//! fill the remaining parameters left to right, skipped optional
//! parameters get their default, and a variadic callable receives whatever
//! is left over as one trailing collection.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use twine_lexer::Error;
use twine_parser::{Argument, Constant, Node, NodeKind};

use crate::compiler::Compiler;
use crate::registry::{Callable, CallableKind};

static UPPER_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("valid regex"));
static LOWER_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z\d])([A-Z])").expect("valid regex"));

/// A call whose callable has been looked up and whose arguments are in
/// parameter order.
#[derive(Debug)]
pub struct ResolvedCall<'r> {
    pub callable: &'r Callable,
    pub arguments: Vec<Node>,
}

/// `camelCase` and `HTMLParser` become `camel_case` and `html_parser`.
pub fn normalize_name(name: &str) -> String {
    let name = UPPER_RUN.replace_all(name, "${1}_${2}");
    let name = LOWER_UPPER.replace_all(&name, "${1}_${2}");
    name.to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Position(usize),
    Name(String),
}

impl Key {
    fn label(&self) -> String {
        match self {
            Key::Position(position) => position.to_string(),
            Key::Name(name) => name.clone(),
        }
    }
}

impl<'a> Compiler<'a> {
    /// Look up `name` and bind `arguments` to it.
    pub fn resolve_call(
        &self,
        kind: CallableKind,
        name: &str,
        arguments: &[Argument],
        line: usize,
    ) -> Result<ResolvedCall<'a>, Error> {
        let registry = self.registry();
        let Some(callable) = registry.get(kind, name) else {
            let mut err = twine_lexer::SyntaxError::new(
                format!("Unknown \"{name}\" {kind}."),
                line,
                self.source_name(),
            );
            err.add_suggestions(name, registry.names(kind));
            return Err(err.into());
        };

        let arguments = self.bind_arguments(callable, arguments, line)?;
        Ok(ResolvedCall {
            callable,
            arguments,
        })
    }

    fn bind_arguments(
        &self,
        callable: &Callable,
        arguments: &[Argument],
        line: usize,
    ) -> Result<Vec<Node>, Error> {
        let kind = callable.kind;
        let mut given: IndexMap<Key, &Node> = IndexMap::new();
        let mut named = false;
        for (position, argument) in arguments.iter().enumerate() {
            match &argument.name {
                Some(name) => {
                    named = true;
                    given.insert(Key::Name(normalize_name(name)), &argument.value);
                }
                None if named => {
                    return Err(self.error(
                        format!(
                            "Positional arguments cannot be used after named arguments for {kind} \"{}\".",
                            callable.name
                        ),
                        line,
                    ));
                }
                None => {
                    given.insert(Key::Position(position), &argument.value);
                }
            }
        }

        let Some(params) = &callable.params else {
            if named {
                return Err(self.error(
                    format!(
                        "Named arguments are not supported for {kind} \"{}\".",
                        callable.name
                    ),
                    line,
                ));
            }
            return Ok(given.into_values().cloned().collect());
        };

        let mut bound = Vec::new();
        let mut pending_defaults = Vec::new();
        let mut position = 0;
        for param in params {
            let name = normalize_name(&param.name);
            if let Some(value) = given.shift_remove(&Key::Name(name.clone())) {
                if given.contains_key(&Key::Position(position)) {
                    return Err(self.error(
                        format!(
                            "Argument \"{name}\" is defined twice for {kind} \"{}\".",
                            callable.name
                        ),
                        line,
                    ));
                }
                bound.append(&mut pending_defaults);
                bound.push(value.clone());
            } else if let Some(value) = given.shift_remove(&Key::Position(position)) {
                bound.append(&mut pending_defaults);
                bound.push(value.clone());
                position += 1;
            } else if let Some(default) = &param.default {
                pending_defaults.push(Node::constant(default.clone(), line));
            } else {
                return Err(self.error(
                    format!(
                        "Value for argument \"{name}\" is required for {kind} \"{}\".",
                        callable.name
                    ),
                    line,
                ));
            }
        }

        if callable.variadic && !given.is_empty() {
            bound.append(&mut pending_defaults);
            bound.push(collect_rest(std::mem::take(&mut given), line));
        }

        if !given.is_empty() {
            let unknown_line = given.values().next().map_or(line, |node| node.line);
            let labels: Vec<String> = given.keys().map(Key::label).collect();
            return Err(self.error(
                format!(
                    "Unknown argument{} \"{}\" for {kind} \"{}\".",
                    if labels.len() > 1 { "s" } else { "" },
                    labels.join("\", \""),
                    callable.signature()
                ),
                unknown_line,
            ));
        }

        Ok(bound)
    }
}

/// Left-over arguments of a variadic call: an array when all of them are
/// positional, a hash keyed by position or name otherwise.
fn collect_rest(rest: IndexMap<Key, &Node>, line: usize) -> Node {
    if rest.keys().all(|key| matches!(key, Key::Position(_))) {
        let values = rest.into_values().cloned().collect();
        return Node::new(NodeKind::Array(values), line);
    }

    let mut next_index = 0;
    let pairs = rest
        .into_iter()
        .map(|(key, value)| {
            let key = match key {
                Key::Position(_) => {
                    let index = next_index;
                    next_index += 1;
                    Node::constant(Constant::Number(index.to_string()), line)
                }
                Key::Name(name) => Node::string(name, line),
            };
            (key, value.clone())
        })
        .collect();
    Node::new(NodeKind::Hash(pairs), line)
}

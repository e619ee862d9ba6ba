//! Expression parser.
//!
//! Precedence climbing over the [`Grammar`](crate::Grammar) operator
//! tables. Postfix forms (`.attr`, `[key]`, `|filter`) are applied to each
//! primary before any binary operator is considered, so they bind tightest.

use twine_lexer::{Error, TokenKind};

use crate::ast::{AccessType, Argument, BinaryOp, Constant, Node, NodeKind, UnaryOp};
use crate::grammar::{Associativity, BinaryKind};
use crate::parser::Parser;

const RESERVED_NAMES: [&str; 4] = ["true", "false", "none", "null"];

/// Operators spelled like identifiers (`in`, `matches`) may also be used
/// as variable and attribute names.
fn is_name_like(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl Parser<'_> {
    /// Parse a full expression, including a trailing conditional.
    pub fn parse_expression(&mut self) -> Result<Node, Error> {
        self.parse_expression_with(0)
    }

    /// Parse an expression whose binary operators all bind at least as
    /// tightly as `precedence`.
    pub fn parse_expression_with(&mut self, precedence: u32) -> Result<Node, Error> {
        let mut expr = self.parse_primary()?;

        loop {
            let token = self.stream().current();
            if token.kind != TokenKind::Operator {
                break;
            }
            let Some(operator) = self
                .grammar()
                .binary_operator(&token.value)
                .filter(|op| op.precedence >= precedence)
                .cloned()
            else {
                break;
            };
            let line = token.line;
            self.stream_mut().next()?;

            expr = match operator.kind {
                BinaryKind::Test { negated } => {
                    let test = self.parse_test_expression(expr)?;
                    if negated {
                        Node::unary(UnaryOp::Not, test, line)
                    } else {
                        test
                    }
                }
                BinaryKind::Operator(op) => {
                    let next = match operator.associativity {
                        Associativity::Left => operator.precedence + 1,
                        Associativity::Right => operator.precedence,
                    };
                    let right = self.parse_expression_with(next)?;
                    Node::binary(op, expr, right, line)
                }
            };
        }

        if precedence == 0 {
            self.parse_conditional(expr)
        } else {
            Ok(expr)
        }
    }

    /// `a ? b : c`, `a ?: b` and `a ? b`.
    fn parse_conditional(&mut self, mut expr: Node) -> Result<Node, Error> {
        while let Some(question) = self.stream_mut().next_if(TokenKind::Punctuation, Some("?")) {
            let line = question.line;
            let (then, otherwise) = if self
                .stream_mut()
                .next_if(TokenKind::Punctuation, Some(":"))
                .is_some()
            {
                (expr.clone(), self.parse_expression()?)
            } else {
                let then = self.parse_expression()?;
                let otherwise = if self
                    .stream_mut()
                    .next_if(TokenKind::Punctuation, Some(":"))
                    .is_some()
                {
                    self.parse_expression()?
                } else {
                    Node::string("", line)
                };
                (then, otherwise)
            };
            expr = Node::new(
                NodeKind::Conditional {
                    test: Box::new(expr),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
                line,
            );
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Node, Error> {
        let token = self.stream().current().clone();

        if token.kind == TokenKind::Operator {
            if let Some(operator) = self.grammar().unary_operator(&token.value).cloned() {
                self.stream_mut().next()?;
                let operand = self.parse_expression_with(operator.precedence)?;
                return self.parse_postfix(Node::unary(operator.op, operand, token.line));
            }
        }

        if token.test(TokenKind::Punctuation, Some("(")) {
            self.stream_mut().next()?;
            let expr = self.parse_expression()?;
            self.stream_mut().expect_with(
                TokenKind::Punctuation,
                Some(")"),
                Some("An opened parenthesis is not properly closed"),
            )?;
            return self.parse_postfix(expr);
        }

        self.parse_primary_expression()
    }

    fn parse_primary_expression(&mut self) -> Result<Node, Error> {
        let token = self.stream().current().clone();

        let node = match token.kind {
            TokenKind::Name => {
                self.stream_mut().next()?;
                match token.value.to_ascii_lowercase().as_str() {
                    "true" => Node::constant(Constant::Bool(true), token.line),
                    "false" => Node::constant(Constant::Bool(false), token.line),
                    "none" | "null" => Node::constant(Constant::Null, token.line),
                    _ if self.stream().test(TokenKind::Punctuation, Some("(")) => {
                        let arguments = self.parse_arguments(true)?;
                        Node::new(
                            NodeKind::Function {
                                name: token.value,
                                arguments,
                            },
                            token.line,
                        )
                    }
                    _ => Node::name(token.value, token.line),
                }
            }
            TokenKind::Number => {
                self.stream_mut().next()?;
                Node::constant(Constant::Number(token.value), token.line)
            }
            TokenKind::String | TokenKind::InterpolationStart => self.parse_string_expression()?,
            TokenKind::Operator if is_name_like(&token.value) => {
                self.stream_mut().next()?;
                Node::name(token.value, token.line)
            }
            TokenKind::Punctuation if token.value == "[" => self.parse_array_expression()?,
            TokenKind::Punctuation if token.value == "{" => self.parse_hash_expression()?,
            _ => {
                let message = format!(
                    "Unexpected token \"{}\" of value \"{}\".",
                    token.kind, token.value
                );
                return Err(self.error(message, token.line));
            }
        };

        self.parse_postfix(node)
    }

    /// Adjacent string parts and `#{...}` interpolations, folded into a
    /// left-nested `~` concatenation.
    fn parse_string_expression(&mut self) -> Result<Node, Error> {
        let line = self.stream().current().line;
        let mut parts = Vec::new();
        let mut next_can_be_string = true;

        loop {
            if next_can_be_string {
                if let Some(token) = self.stream_mut().next_if(TokenKind::String, None) {
                    parts.push(Node::string(token.value, token.line));
                    next_can_be_string = false;
                    continue;
                }
            }
            if self
                .stream_mut()
                .next_if(TokenKind::InterpolationStart, None)
                .is_some()
            {
                parts.push(self.parse_expression()?);
                self.stream_mut().expect(TokenKind::InterpolationEnd, None)?;
                next_can_be_string = true;
                continue;
            }
            break;
        }

        let mut parts = parts.into_iter();
        let first = parts
            .next()
            .ok_or_else(|| Error::Internal(format!("empty string expression at line {line}")))?;
        Ok(parts.fold(first, |acc, part| {
            let line = part.line;
            Node::binary(BinaryOp::Concat, acc, part, line)
        }))
    }

    fn parse_array_expression(&mut self) -> Result<Node, Error> {
        let line = self
            .stream_mut()
            .expect_with(TokenKind::Punctuation, Some("["), Some("An array element was expected"))?
            .line;
        let mut items = Vec::new();

        while !self.stream().test(TokenKind::Punctuation, Some("]")) {
            if !items.is_empty() {
                self.stream_mut().expect_with(
                    TokenKind::Punctuation,
                    Some(","),
                    Some("An array element must be followed by a comma"),
                )?;
                // Trailing comma.
                if self.stream().test(TokenKind::Punctuation, Some("]")) {
                    break;
                }
            }
            items.push(self.parse_expression()?);
        }
        self.stream_mut().expect_with(
            TokenKind::Punctuation,
            Some("]"),
            Some("An opened array is not properly closed"),
        )?;

        Ok(Node::new(NodeKind::Array(items), line))
    }

    fn parse_hash_expression(&mut self) -> Result<Node, Error> {
        let line = self
            .stream_mut()
            .expect_with(TokenKind::Punctuation, Some("{"), Some("A hash element was expected"))?
            .line;
        let mut pairs = Vec::new();

        while !self.stream().test(TokenKind::Punctuation, Some("}")) {
            if !pairs.is_empty() {
                self.stream_mut().expect_with(
                    TokenKind::Punctuation,
                    Some(","),
                    Some("A hash value must be followed by a comma"),
                )?;
                if self.stream().test(TokenKind::Punctuation, Some("}")) {
                    break;
                }
            }

            let token = self.stream().current().clone();
            let key = match token.kind {
                TokenKind::String | TokenKind::Name => {
                    self.stream_mut().next()?;
                    Node::string(token.value, token.line)
                }
                TokenKind::Number => {
                    self.stream_mut().next()?;
                    Node::constant(Constant::Number(token.value), token.line)
                }
                TokenKind::Punctuation if token.value == "(" => self.parse_expression()?,
                _ => {
                    let message = format!(
                        "A hash key must be a quoted string, a number, a name, or an expression enclosed in parentheses (unexpected token \"{}\" of value \"{}\".",
                        token.kind, token.value
                    );
                    return Err(self.error(message, token.line));
                }
            };

            self.stream_mut().expect_with(
                TokenKind::Punctuation,
                Some(":"),
                Some("A hash key must be followed by a colon (:)"),
            )?;
            let value = self.parse_expression()?;
            pairs.push((key, value));
        }
        self.stream_mut().expect_with(
            TokenKind::Punctuation,
            Some("}"),
            Some("An opened hash is not properly closed"),
        )?;

        Ok(Node::new(NodeKind::Hash(pairs), line))
    }

    fn parse_postfix(&mut self, mut node: Node) -> Result<Node, Error> {
        loop {
            let stream = self.stream();
            if stream.test(TokenKind::Punctuation, Some("."))
                || stream.test(TokenKind::Punctuation, Some("["))
            {
                node = self.parse_subscript_expression(node)?;
            } else if stream.test(TokenKind::Punctuation, Some("|")) {
                node = self.parse_filter_expression(node)?;
            } else {
                return Ok(node);
            }
        }
    }

    /// `.attr`, `.method(args)`, `[key]` and the `[start:length]` slice.
    fn parse_subscript_expression(&mut self, node: Node) -> Result<Node, Error> {
        let token = self.stream_mut().next()?;
        let line = token.line;

        if token.value == "." {
            let token = self.stream_mut().next()?;
            let attribute = match token.kind {
                TokenKind::Number => Node::constant(Constant::Number(token.value), token.line),
                TokenKind::Name => Node::string(token.value, token.line),
                TokenKind::Operator if is_name_like(&token.value) => {
                    Node::string(token.value, token.line)
                }
                _ => return Err(self.error("Expected name or number.", line)),
            };

            let (arguments, access) = if self.stream().test(TokenKind::Punctuation, Some("(")) {
                let arguments = self
                    .parse_arguments(false)?
                    .into_iter()
                    .map(|argument| argument.value)
                    .collect();
                (arguments, AccessType::Method)
            } else {
                (Vec::new(), AccessType::Any)
            };

            return Ok(Node::new(
                NodeKind::GetAttr {
                    node: Box::new(node),
                    attribute: Box::new(attribute),
                    arguments,
                    access,
                },
                line,
            ));
        }

        let mut slice = false;
        let start = if self.stream().test(TokenKind::Punctuation, Some(":")) {
            slice = true;
            Node::constant(Constant::Number("0".into()), line)
        } else {
            self.parse_expression()?
        };
        if self
            .stream_mut()
            .next_if(TokenKind::Punctuation, Some(":"))
            .is_some()
        {
            slice = true;
        }

        if slice {
            let length = if self.stream().test(TokenKind::Punctuation, Some("]")) {
                Node::constant(Constant::Null, line)
            } else {
                self.parse_expression()?
            };
            self.stream_mut().expect(TokenKind::Punctuation, Some("]"))?;
            return Ok(Node::new(
                NodeKind::Filter {
                    node: Box::new(node),
                    filter: Box::new(Node::string("slice", line)),
                    arguments: vec![Argument::positional(start), Argument::positional(length)],
                },
                line,
            ));
        }

        self.stream_mut().expect(TokenKind::Punctuation, Some("]"))?;
        Ok(Node::new(
            NodeKind::GetAttr {
                node: Box::new(node),
                attribute: Box::new(start),
                arguments: Vec::new(),
                access: AccessType::Array,
            },
            line,
        ))
    }

    /// `|name`, `|name(args)`, chained.
    fn parse_filter_expression(&mut self, mut node: Node) -> Result<Node, Error> {
        self.stream_mut().next()?;

        loop {
            let token = self.stream_mut().expect(TokenKind::Name, None)?;
            let arguments = if self.stream().test(TokenKind::Punctuation, Some("(")) {
                self.parse_arguments(true)?
            } else {
                Vec::new()
            };
            node = Node::new(
                NodeKind::Filter {
                    node: Box::new(node),
                    filter: Box::new(Node::string(token.value, token.line)),
                    arguments,
                },
                token.line,
            );

            if self
                .stream_mut()
                .next_if(TokenKind::Punctuation, Some("|"))
                .is_none()
            {
                return Ok(node);
            }
        }
    }

    /// `(a, b, name = c)`. Named arguments are only accepted when `named`.
    pub fn parse_arguments(&mut self, named: bool) -> Result<Vec<Argument>, Error> {
        self.stream_mut().expect_with(
            TokenKind::Punctuation,
            Some("("),
            Some("A list of arguments must begin with an opening parenthesis"),
        )?;

        let mut arguments = Vec::new();
        while !self.stream().test(TokenKind::Punctuation, Some(")")) {
            if !arguments.is_empty() {
                self.stream_mut().expect_with(
                    TokenKind::Punctuation,
                    Some(","),
                    Some("Arguments must be separated by a comma"),
                )?;
            }

            let value = self.parse_expression()?;
            if !named {
                arguments.push(Argument::positional(value));
                continue;
            }
            match self.stream_mut().next_if(TokenKind::Operator, Some("=")) {
                Some(equals) => {
                    let name = match value.kind {
                        NodeKind::Name(name) => name,
                        _ => {
                            return Err(self.error(
                                "A parameter name must be a plain name.",
                                equals.line,
                            ));
                        }
                    };
                    let value = self.parse_expression()?;
                    arguments.push(Argument::named(name, value));
                }
                None => arguments.push(Argument::positional(value)),
            }
        }

        self.stream_mut().expect_with(
            TokenKind::Punctuation,
            Some(")"),
            Some("A list of arguments must be closed by a parenthesis"),
        )?;
        Ok(arguments)
    }

    /// The part after `is`: a test name, possibly two words, and its
    /// optional arguments.
    fn parse_test_expression(&mut self, node: Node) -> Result<Node, Error> {
        let token = self.stream_mut().expect(TokenKind::Name, None)?;
        let mut name = token.value;

        if !self.grammar().has_test(&name) {
            let next = self.stream().current();
            if next.kind == TokenKind::Name {
                let two_words = format!("{name} {}", next.value);
                if self.grammar().has_test(&two_words) {
                    self.stream_mut().next()?;
                    name = two_words;
                }
            }
        }

        let arguments = if self.stream().test(TokenKind::Punctuation, Some("(")) {
            self.parse_arguments(true)?
        } else {
            Vec::new()
        };

        Ok(Node::new(
            NodeKind::Test {
                node: Box::new(node),
                name,
                arguments,
            },
            token.line,
        ))
    }

    /// Comma-separated names on the left of `=` in `set` and `for`.
    pub fn parse_assignment_targets(&mut self) -> Result<Vec<String>, Error> {
        let mut targets = Vec::new();

        loop {
            let current = self.stream().current();
            let token = if current.kind == TokenKind::Operator && is_name_like(&current.value) {
                self.stream_mut().next()?
            } else {
                self.stream_mut().expect_with(
                    TokenKind::Name,
                    None,
                    Some("Only variables can be assigned to"),
                )?
            };

            if RESERVED_NAMES.contains(&token.value.to_ascii_lowercase().as_str()) {
                let message = format!("You cannot assign a value to \"{}\".", token.value);
                return Err(self.error(message, token.line));
            }
            targets.push(token.value);

            if self
                .stream_mut()
                .next_if(TokenKind::Punctuation, Some(","))
                .is_none()
            {
                return Ok(targets);
            }
        }
    }

    /// Comma-separated expressions on the right of `=` in `set`.
    pub fn parse_multitarget_expression(&mut self) -> Result<Vec<Node>, Error> {
        let mut values = vec![self.parse_expression()?];
        while self
            .stream_mut()
            .next_if(TokenKind::Punctuation, Some(","))
            .is_some()
        {
            values.push(self.parse_expression()?);
        }
        Ok(values)
    }
}

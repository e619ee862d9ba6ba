//! Per-node JavaScript emission.
//!
//! Statements are written as indented lines preceded by their `// line N`
//! marker; expressions are written inline with [`Compiler::raw`] and are
//! always fully parenthesised, so operator precedence never depends on
//! JavaScript's own table.

use twine_lexer::Error;
use twine_parser::ast::{BinaryOp, Constant, ForLoop, UnaryOp};
use twine_parser::{Node, NodeKind};

use crate::calls::ResolvedCall;
use crate::compiler::{js_string, Compiler};
use crate::registry::CallableKind;

/// `>` whitespace `<` runs collapsed, then trimmed.
const SPACELESS: &str = "out.write(out.end().replace(/>\\s+</g, \"><\").trim());\n";

impl Compiler<'_> {
    /// Compile a statement or an expression.
    pub fn subcompile(&mut self, node: &Node) -> Result<&mut Self, Error> {
        match &node.kind {
            NodeKind::Body(nodes) => {
                for child in nodes {
                    self.subcompile(child)?;
                }
                Ok(self)
            }
            NodeKind::Text(text) => {
                self.add_debug_info(node)
                    .write("out.write(")
                    .string(text)
                    .raw(");\n");
                Ok(self)
            }
            NodeKind::Print(expr) => {
                self.add_debug_info(node).write("out.write(env.toString(");
                self.subcompile(expr)?.raw("));\n");
                Ok(self)
            }
            NodeKind::Set {
                capture,
                names,
                values,
            } => self.compile_set(node, *capture, names, values),
            NodeKind::BlockReference(name) => {
                self.add_debug_info(node)
                    .write("env.displayBlock(template, ")
                    .string(name)
                    .raw(", context, out);\n");
                Ok(self)
            }
            NodeKind::ParentBlock => {
                self.add_debug_info(node)
                    .write("env.displayParentBlock(env, context, out);\n");
                Ok(self)
            }
            NodeKind::Spaceless(body) => {
                self.add_debug_info(node);
                self.capture_output(body)?.write(SPACELESS);
                Ok(self)
            }
            NodeKind::If { tests, otherwise } => self.compile_if(node, tests, otherwise.as_deref()),
            NodeKind::For(for_loop) => self.compile_for(node, for_loop),

            NodeKind::Constant(constant) => {
                self.raw(&constant_literal(constant));
                Ok(self)
            }
            NodeKind::Name(name) => self.compile_name(name, node.line),
            NodeKind::Unary { op, node: operand } => {
                match op {
                    UnaryOp::Not => self.raw("(!"),
                    UnaryOp::Neg => self.raw("(-"),
                    UnaryOp::Pos => self.raw("(+"),
                    UnaryOp::Call(callee) => self.raw(&format!("{callee}(")),
                };
                self.subcompile(operand)?.raw(")");
                Ok(self)
            }
            NodeKind::Binary { op, left, right } => self.compile_binary(op, left, right),
            NodeKind::Conditional {
                test,
                then,
                otherwise,
            } => {
                self.raw("(");
                self.subcompile(test)?.raw(" ? ");
                self.subcompile(then)?.raw(" : ");
                self.subcompile(otherwise)?.raw(")");
                Ok(self)
            }
            NodeKind::Array(items) => {
                self.raw("[");
                self.compile_list(items)?.raw("]");
                Ok(self)
            }
            NodeKind::Hash(pairs) => self.compile_hash(pairs),
            NodeKind::GetAttr {
                node: object,
                attribute,
                arguments,
                access,
            } => {
                self.raw("env.getAttribute(");
                self.subcompile(object)?.raw(", ");
                self.subcompile(attribute)?.raw(", [");
                self.compile_list(arguments)?
                    .raw("], ")
                    .string(access.as_str())
                    .raw(&format!(", {})", node.line));
                Ok(self)
            }
            NodeKind::Filter {
                node: subject,
                filter,
                arguments,
            } => {
                let Some(name) = filter.as_str() else {
                    return Err(Error::Internal("filter name is not a string constant".into()));
                };
                let call = self.resolve_call(CallableKind::Filter, name, arguments, node.line)?;
                self.compile_call(&call, Some(subject))
            }
            NodeKind::Function { name, arguments } => {
                let call = self.resolve_call(CallableKind::Function, name, arguments, node.line)?;
                self.compile_call(&call, None)
            }
            NodeKind::Test {
                node: subject,
                name,
                arguments,
            } => {
                let call = self.resolve_call(CallableKind::Test, name, arguments, node.line)?;
                self.compile_call(&call, Some(subject))
            }
        }
    }

    fn compile_list(&mut self, items: &[Node]) -> Result<&mut Self, Error> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.raw(", ");
            }
            self.subcompile(item)?;
        }
        Ok(self)
    }

    fn compile_hash(&mut self, pairs: &[(Node, Node)]) -> Result<&mut Self, Error> {
        self.raw("{");
        for (i, (key, value)) in pairs.iter().enumerate() {
            if i > 0 {
                self.raw(", ");
            }
            match key.as_constant() {
                Some(Constant::String(s)) => {
                    self.string(s);
                }
                Some(Constant::Number(n)) => {
                    self.raw(&number_literal(n));
                }
                _ => {
                    self.raw("[");
                    self.subcompile(key)?.raw("]");
                }
            }
            self.raw(": ");
            self.subcompile(value)?;
        }
        self.raw("}");
        Ok(self)
    }

    fn compile_name(&mut self, name: &str, line: usize) -> Result<&mut Self, Error> {
        match name {
            "_self" => self.raw("template.name"),
            "_context" => self.raw("context"),
            "_charset" => {
                let charset = self.options().charset.clone();
                self.string(&charset)
            }
            _ if self.options().strict_variables => {
                let key = js_string(name);
                self.raw(&format!(
                    "({key} in context ? context[{key}] : env.undefinedVariable({key}, {line}))"
                ))
            }
            _ => self.raw(&format!("(context[{}] ?? null)", js_string(name))),
        };
        Ok(self)
    }

    /// Like `subcompile`, but a missing variable along `node`'s access
    /// chain reads as `null` even with strict variables.
    fn compile_lenient(&mut self, node: &Node) -> Result<&mut Self, Error> {
        match &node.kind {
            NodeKind::Name(name) if !matches!(name.as_str(), "_self" | "_context" | "_charset") => {
                self.raw(&format!("(context[{}] ?? null)", js_string(name)));
                Ok(self)
            }
            NodeKind::GetAttr {
                node: object,
                attribute,
                arguments,
                access,
            } => {
                self.raw("env.getAttribute(");
                self.compile_lenient(object)?.raw(", ");
                self.subcompile(attribute)?.raw(", [");
                self.compile_list(arguments)?
                    .raw("], ")
                    .string(access.as_str())
                    .raw(&format!(", {}, true)", node.line));
                Ok(self)
            }
            _ => self.subcompile(node),
        }
    }

    fn compile_binary(&mut self, op: &BinaryOp, left: &Node, right: &Node) -> Result<&mut Self, Error> {
        let infix = match op {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::LessEq => "<=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Power => "**",
            BinaryOp::Concat => {
                self.raw("(env.toString(");
                self.subcompile(left)?.raw(") + env.toString(");
                self.subcompile(right)?.raw("))");
                return Ok(self);
            }
            BinaryOp::FloorDiv => {
                self.raw("Math.floor(");
                self.subcompile(left)?.raw(" / ");
                self.subcompile(right)?.raw(")");
                return Ok(self);
            }
            BinaryOp::NotIn => {
                self.raw("(!");
                self.compile_binary_call("env.inArray", left, right)?.raw(")");
                return Ok(self);
            }
            BinaryOp::NullCoalesce => {
                self.raw("(");
                self.compile_lenient(left)?.raw(" ?? ");
                self.subcompile(right)?.raw(")");
                return Ok(self);
            }
            BinaryOp::Spaceship => return self.compile_binary_call("env.compare", left, right),
            BinaryOp::In => return self.compile_binary_call("env.inArray", left, right),
            BinaryOp::Matches => return self.compile_binary_call("env.matches", left, right),
            BinaryOp::StartsWith => return self.compile_binary_call("env.startsWith", left, right),
            BinaryOp::EndsWith => return self.compile_binary_call("env.endsWith", left, right),
            BinaryOp::Range => return self.compile_binary_call("env.range", left, right),
            BinaryOp::Call(callee) => return self.compile_binary_call(callee, left, right),
        };

        self.raw("(");
        self.subcompile(left)?.raw(&format!(" {infix} "));
        self.subcompile(right)?.raw(")");
        Ok(self)
    }

    fn compile_binary_call(&mut self, callee: &str, left: &Node, right: &Node) -> Result<&mut Self, Error> {
        self.raw(&format!("{callee}("));
        self.subcompile(left)?.raw(", ");
        self.subcompile(right)?.raw(")");
        Ok(self)
    }

    /// `callee(env, context, subject, ...arguments)`, with the leading
    /// implicit arguments only when the callable asks for them.
    fn compile_call(&mut self, call: &ResolvedCall<'_>, subject: Option<&Node>) -> Result<&mut Self, Error> {
        let callable = call.callable;
        self.raw(&callable.callee()).raw("(");

        let mut first = true;
        let mut separator = |compiler: &mut Self| {
            if !first {
                compiler.raw(", ");
            }
            first = false;
        };
        if callable.needs_environment {
            separator(self);
            self.raw("env");
        }
        if callable.needs_context {
            separator(self);
            self.raw("context");
        }
        for argument in subject.into_iter().chain(&call.arguments) {
            separator(self);
            self.subcompile(argument)?;
        }

        self.raw(")");
        Ok(self)
    }

    fn compile_set(
        &mut self,
        node: &Node,
        capture: bool,
        names: &[String],
        values: &[Node],
    ) -> Result<&mut Self, Error> {
        self.add_debug_info(node);

        if capture {
            let (Some(name), Some(body)) = (names.first(), values.first()) else {
                return Err(Error::Internal("capturing set without a target".into()));
            };
            self.capture_output(body)?
                .write(&format!("context[{}] = out.end();\n", js_string(name)));
            return Ok(self);
        }

        if let ([name], [value]) = (names, values) {
            self.write(&format!("context[{}] = ", js_string(name)));
            self.subcompile(value)?.raw(";\n");
            return Ok(self);
        }

        let targets: Vec<String> = names
            .iter()
            .map(|name| format!("context[{}]", js_string(name)))
            .collect();
        self.write(&format!("[{}] = [", targets.join(", ")));
        self.compile_list(values)?.raw("];\n");
        Ok(self)
    }

    fn compile_if(
        &mut self,
        node: &Node,
        tests: &[(Node, Node)],
        otherwise: Option<&Node>,
    ) -> Result<&mut Self, Error> {
        self.add_debug_info(node);
        for (i, (condition, body)) in tests.iter().enumerate() {
            if i == 0 {
                self.write("if (");
            } else {
                self.outdent()?.write("} else if (");
            }
            self.subcompile(condition)?.raw(") {\n").indent();
            self.subcompile(body)?;
        }
        if let Some(otherwise) = otherwise {
            self.outdent()?.write("} else {\n").indent();
            self.subcompile(otherwise)?;
        }
        self.outdent()?.write("}\n");
        Ok(self)
    }

    /// The loop body runs in a copy of the context; afterwards the
    /// variables that existed before the loop keep their new values and
    /// everything the loop introduced is dropped.
    fn compile_for(&mut self, node: &Node, for_loop: &ForLoop) -> Result<&mut Self, Error> {
        let seq = self.var_name();
        let parent = self.var_name();
        let iterated = self.var_name();
        let key = js_string(&for_loop.key_target);
        let value = js_string(&for_loop.value_target);

        self.add_debug_info(node).write(&format!("const {seq} = env.ensureIterable("));
        self.subcompile(&for_loop.seq)?.raw(");\n");
        self.write(&format!("const {parent} = context;\n"))
            .write(&format!("context = {{ ...context, _parent: {parent} }};\n"));
        if for_loop.otherwise.is_some() {
            self.write(&format!("let {iterated} = false;\n"));
        }
        if for_loop.with_loop {
            self.write(&format!(
                "context[\"loop\"] = env.createLoop({seq}, {parent});\n"
            ));
        }

        self.write(&format!(
            "for ([context[{key}], context[{value}]] of env.entries({seq})) {{\n"
        ))
        .indent();
        self.subcompile(&for_loop.body)?;
        if for_loop.otherwise.is_some() {
            self.write(&format!("{iterated} = true;\n"));
        }
        if for_loop.with_loop {
            self.write("context[\"loop\"].next();\n");
        }
        self.outdent()?.write("}\n");

        if let Some(otherwise) = &for_loop.otherwise {
            self.write(&format!("if (!{iterated}) {{\n")).indent();
            self.subcompile(otherwise)?;
            self.outdent()?.write("}\n");
        }

        self.write(&format!(
            "context = env.restoreContext({parent}, context, [{key}, {value}, \"_parent\", \"loop\"]);\n"
        ));
        Ok(self)
    }
}

/// Largest integer a JavaScript number holds exactly.
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// A constant as a JavaScript literal.
fn constant_literal(constant: &Constant) -> String {
    match constant {
        Constant::String(s) => js_string(s),
        Constant::Number(n) => number_literal(n),
        Constant::Bool(b) => b.to_string(),
        Constant::Null => "null".to_string(),
    }
}

/// A number token as a strict-mode literal. Leading zeros are dropped, and
/// integers past [`MAX_SAFE_INTEGER`] stay exact as numeric strings.
fn number_literal(number: &str) -> String {
    let number = strip_leading_zeros(number);
    let is_integer = number.bytes().all(|b| b.is_ascii_digit());
    if is_integer && number.parse::<u64>().map_or(true, |n| n > MAX_SAFE_INTEGER) {
        return js_string(number);
    }
    number.to_string()
}

/// `007` -> `7`, `00.5` -> `0.5`, `000` -> `0`.
fn strip_leading_zeros(number: &str) -> &str {
    let digits = number.len() - number.trim_start_matches('0').len();
    let rest = &number[digits..];
    if digits > 0 && !rest.starts_with(|c: char| c.is_ascii_digit()) {
        &number[digits - 1..]
    } else {
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::CodegenOptions;
    use pretty_assertions::assert_eq;
    use twine_parser::{Grammar, Module};

    fn parse(source: &str) -> Module {
        let grammar = Grammar::new();
        let stream = grammar.lexer().tokenize(source, "index").unwrap();
        twine_parser::parse(stream, &grammar).unwrap()
    }

    fn compile_with(source: &str, options: &CodegenOptions) -> Result<String, Error> {
        let registry = Registry::with_builtins();
        let module = parse(source);
        let mut compiler = Compiler::new(&registry, options, "index");
        compiler.subcompile(&module.body)?;
        Ok(compiler.code().to_string())
    }

    fn compile(source: &str) -> String {
        compile_with(source, &CodegenOptions::default()).unwrap()
    }

    /// The JavaScript of the single printed expression in `source`.
    fn expr(source: &str) -> String {
        let code = compile(&format!("{{{{ {source} }}}}"));
        code.strip_prefix("// line 1\nout.write(env.toString(")
            .and_then(|rest| rest.strip_suffix("));\n"))
            .unwrap_or_else(|| panic!("unexpected code: {code}"))
            .to_string()
    }

    fn message(err: Error) -> String {
        err.as_syntax().unwrap().message.clone()
    }

    // =========================================================================
    // Statements
    // =========================================================================

    #[test]
    fn test_text_and_print() {
        assert_eq!(
            compile("Hi \"you\"\n{{ name }}"),
            "// line 1\nout.write(\"Hi \\\"you\\\"\\n\");\n// line 2\nout.write(env.toString((context[\"name\"] ?? null)));\n"
        );
    }

    #[test]
    fn test_set() {
        assert_eq!(
            compile("{% set a = 1 %}"),
            "// line 1\ncontext[\"a\"] = 1;\n"
        );
        assert_eq!(
            compile("{% set a, b = 1, 2 %}"),
            "// line 1\n[context[\"a\"], context[\"b\"]] = [1, 2];\n"
        );
    }

    #[test]
    fn test_set_capture() {
        assert_eq!(
            compile("{% set a %}x{% endset %}"),
            "// line 1\nout.begin();\nout.write(\"x\");\ncontext[\"a\"] = out.end();\n"
        );
    }

    #[test]
    fn test_block_reference() {
        assert_eq!(
            compile("{% block title %}x{% endblock %}"),
            "// line 1\nenv.displayBlock(template, \"title\", context, out);\n"
        );
    }

    #[test]
    fn test_parent_block() {
        let registry = Registry::with_builtins();
        let options = CodegenOptions::default();
        let mut compiler = Compiler::new(&registry, &options, "index");
        compiler.subcompile(&Node::new(NodeKind::ParentBlock, 3)).unwrap();
        assert_eq!(
            compiler.code(),
            "// line 3\nenv.displayParentBlock(env, context, out);\n"
        );
    }

    #[test]
    fn test_spaceless() {
        assert_eq!(
            compile("{% spaceless %}<b> </b>{% endspaceless %}"),
            "// line 1\nout.begin();\nout.write(\"<b> </b>\");\nout.write(out.end().replace(/>\\s+</g, \"><\").trim());\n"
        );
    }

    #[test]
    fn test_if_elseif_else() {
        assert_eq!(
            compile("{% if a %}1{% elseif b %}2{% else %}3{% endif %}"),
            [
                "// line 1",
                "if ((context[\"a\"] ?? null)) {",
                "  out.write(\"1\");",
                "} else if ((context[\"b\"] ?? null)) {",
                "  out.write(\"2\");",
                "} else {",
                "  out.write(\"3\");",
                "}",
                "",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_for_with_else() {
        assert_eq!(
            compile("{% for k, v in items %}{{ loop.index }}{% else %}none{% endfor %}"),
            [
                "// line 1",
                "const _v0 = env.ensureIterable((context[\"items\"] ?? null));",
                "const _v1 = context;",
                "context = { ...context, _parent: _v1 };",
                "let _v2 = false;",
                "context[\"loop\"] = env.createLoop(_v0, _v1);",
                "for ([context[\"k\"], context[\"v\"]] of env.entries(_v0)) {",
                "  out.write(env.toString(env.getAttribute((context[\"loop\"] ?? null), \"index\", [], \"any\", 1)));",
                "  _v2 = true;",
                "  context[\"loop\"].next();",
                "}",
                "if (!_v2) {",
                "  out.write(\"none\");",
                "}",
                "context = env.restoreContext(_v1, context, [\"k\", \"v\", \"_parent\", \"loop\"]);",
                "",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_for_without_loop_variable() {
        let registry = Registry::with_builtins();
        let options = CodegenOptions::default();
        let mut module = parse("{% for i in items %}{{ i }}{% endfor %}");
        if let NodeKind::Body(nodes) = &mut module.body.kind {
            if let NodeKind::For(for_loop) = &mut nodes[0].kind {
                for_loop.with_loop = false;
            }
        }
        let mut compiler = Compiler::new(&registry, &options, "index");
        compiler.subcompile(&module.body).unwrap();
        assert!(!compiler.code().contains("createLoop"));
        assert!(!compiler.code().contains(".next()"));
        assert!(compiler.code().contains("[context[\"_key\"], context[\"i\"]]"));
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    #[test]
    fn test_constants() {
        assert_eq!(expr("'a\"b'"), "\"a\\\"b\"");
        assert_eq!(expr("12345678901234567890"), "\"12345678901234567890\"");
        assert_eq!(expr("true"), "true");
        assert_eq!(expr("null"), "null");
    }

    #[test]
    fn test_numbers_are_strict_mode_literals() {
        assert_eq!(expr("007"), "7");
        assert_eq!(expr("08 + 1"), "(8 + 1)");
        assert_eq!(expr("000"), "0");
        assert_eq!(expr("00.5"), "0.5");
        assert_eq!(expr("1.5e+3"), "1.5e+3");
        assert_eq!(expr("{010: 1}"), "{10: 1}");
    }

    #[test]
    fn test_unsafe_integers_keep_their_digits() {
        assert_eq!(expr("9007199254740991"), "9007199254740991");
        assert_eq!(expr("9007199254740992"), "\"9007199254740992\"");
        assert_eq!(
            expr("922337203685477580700 ~ ''"),
            "(env.toString(\"922337203685477580700\") + env.toString(\"\"))"
        );
        assert_eq!(
            expr("{99999999999999999999: 1}"),
            "{\"99999999999999999999\": 1}"
        );
    }

    #[test]
    fn test_not_in_as_power_base() {
        assert_eq!(
            expr("(1 not in [2]) ** 2"),
            "((!env.inArray(1, [2])) ** 2)"
        );
    }

    #[test]
    fn test_null_coalesce_under_strict_variables() {
        let options = CodegenOptions {
            strict_variables: true,
            ..CodegenOptions::default()
        };
        let code = compile_with("{{ missing ?? 'fallback' }}", &options).unwrap();
        assert_eq!(
            code,
            "// line 1\nout.write(env.toString(((context[\"missing\"] ?? null) ?? \"fallback\")));\n"
        );

        let code = compile_with("{{ user.name ?? b }}", &options).unwrap();
        assert!(code.contains(
            "(env.getAttribute((context[\"user\"] ?? null), \"name\", [], \"any\", 1, true) ?? (\"b\" in context ? context[\"b\"] : env.undefinedVariable(\"b\", 1)))"
        ));
    }

    #[test]
    fn test_special_names() {
        assert_eq!(expr("_self"), "template.name");
        assert_eq!(expr("_context"), "context");
        assert_eq!(expr("_charset"), "\"UTF-8\"");
    }

    #[test]
    fn test_strict_variables() {
        let options = CodegenOptions {
            strict_variables: true,
            ..CodegenOptions::default()
        };
        let code = compile_with("{{ a }}", &options).unwrap();
        assert!(code.contains(
            "(\"a\" in context ? context[\"a\"] : env.undefinedVariable(\"a\", 1))"
        ));
    }

    #[test]
    fn test_unary_and_binary() {
        assert_eq!(expr("not a"), "(!(context[\"a\"] ?? null))");
        assert_eq!(expr("-1 + 2 * 3"), "((-1) + (2 * 3))");
        assert_eq!(expr("1 ~ 2"), "(env.toString(1) + env.toString(2))");
        assert_eq!(expr("7 // 2"), "Math.floor(7 / 2)");
        assert_eq!(expr("1 not in [1]"), "(!env.inArray(1, [1]))");
        assert_eq!(expr("1..3"), "env.range(1, 3)");
        assert_eq!(expr("2 ** 3 ** 2"), "(2 ** (3 ** 2))");
        assert_eq!(expr("'ab' starts with 'a'"), "env.startsWith(\"ab\", \"a\")");
    }

    #[test]
    fn test_conditional() {
        assert_eq!(expr("1 ? 2 : 3"), "(1 ? 2 : 3)");
        assert_eq!(expr("1 ?: 3"), "(1 ? 1 : 3)");
    }

    #[test]
    fn test_array_and_hash() {
        assert_eq!(expr("[1, 'a']"), "[1, \"a\"]");
        assert_eq!(
            expr("{a: 1, 'b': 2, 3: 4, (x): 5}"),
            "{\"a\": 1, \"b\": 2, 3: 4, [(context[\"x\"] ?? null)]: 5}"
        );
    }

    #[test]
    fn test_get_attr() {
        assert_eq!(
            expr("user.greet('hi')"),
            "env.getAttribute((context[\"user\"] ?? null), \"greet\", [\"hi\"], \"method\", 1)"
        );
        assert_eq!(
            expr("user[0]"),
            "env.getAttribute((context[\"user\"] ?? null), 0, [], \"array\", 1)"
        );
    }

    // =========================================================================
    // Calls
    // =========================================================================

    #[test]
    fn test_filter_call() {
        assert_eq!(expr("a|upper"), "env.filters[\"upper\"]((context[\"a\"] ?? null))");
        assert_eq!(
            expr("a|join(', ')"),
            "env.filters[\"join\"]((context[\"a\"] ?? null), \", \")"
        );
        assert_eq!(
            expr("a|length"),
            "env.filters[\"length\"](env, (context[\"a\"] ?? null))"
        );
    }

    #[test]
    fn test_function_call_with_context() {
        assert_eq!(
            expr("block('title')"),
            "env.renderBlock(env, context, \"title\")"
        );
        assert_eq!(expr("range(1, 3)"), "env.functions[\"range\"](1, 3)");
        assert_eq!(expr("max(1, 2)"), "env.functions[\"max\"]([1, 2])");
    }

    #[test]
    fn test_test_call() {
        assert_eq!(expr("3 is odd"), "env.tests[\"odd\"](3)");
        assert_eq!(expr("3 is not odd"), "(!env.tests[\"odd\"](3))");
    }

    #[test]
    fn test_unknown_filter() {
        let err = compile_with("{{ a|uper }}", &CodegenOptions::default()).unwrap_err();
        assert_eq!(message(err), "Unknown \"uper\" filter. Did you mean \"upper\"?");
    }

    #[test]
    fn test_missing_argument() {
        let err = compile_with("{{ a|split }}", &CodegenOptions::default()).unwrap_err();
        assert_eq!(
            message(err),
            "Value for argument \"delimiter\" is required for filter \"split\"."
        );
    }
}

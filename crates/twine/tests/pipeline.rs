//! End-to-end tests: template source in, JavaScript module out.

use std::sync::{Arc, Once};
use std::thread;

use pretty_assertions::assert_eq;
use twine::environment::Extension;
use twine_parser::ast::{BinaryOp, UnaryOp};
use twine_parser::grammar::{BinaryOperator, UnaryOperator};
use twine::{
    Callable, Environment, Error, Node, Optimizations, Param, Parser, TagParser, Token, TokenKind,
};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .with_target(false)
            .init();
    });
}

fn compile(source: &str) -> String {
    init_tracing();
    twine::compile_source(source, "index").unwrap().code
}

fn compile_err(source: &str) -> String {
    init_tracing();
    twine::compile_source(source, "index")
        .unwrap_err()
        .to_string()
}

/// The lines of the `render` function body, without indentation.
fn render_body(code: &str) -> Vec<String> {
    code.lines()
        .skip_while(|line| !line.contains("render(env, context, out) {"))
        .skip(1)
        .take_while(|line| line.trim() != "},")
        .map(|line| line.trim().to_string())
        .collect()
}

// ============================================================================
// Whole pipeline
// ============================================================================

#[test]
fn test_constant_output_collapses_to_one_write() {
    let code = compile("Hello {{ 'world' }}{{ '!'|raw }}");
    assert_eq!(render_body(&code), vec!["// line 1", "out.write(\"Hello world!\");"]);
}

#[test]
fn test_unoptimized_output_keeps_prints() {
    init_tracing();
    let env = Environment::builder()
        .optimizations(Optimizations::empty())
        .build()
        .unwrap();
    let code = env.compile_source("Hello {{ 'world' }}", "index").unwrap().code;
    assert_eq!(
        render_body(&code),
        vec![
            "// line 1",
            "out.write(\"Hello \");",
            "out.write(env.toString(\"world\"));",
        ]
    );
}

#[test]
fn test_unused_loop_variable_is_not_created() {
    let code = compile("{% for user in users %}{{ user.name }}{% endfor %}");
    assert!(!code.contains("createLoop"));

    let code = compile("{% for user in users %}{{ loop.index }}{% endfor %}");
    assert!(code.contains("env.createLoop("));
}

#[test]
fn test_blocks_are_exported() {
    let code = compile("{% block title %}Hi {{ name }}{% endblock %}");
    assert!(code.contains("env.displayBlock(template, \"title\", context, out);"));
    assert!(code.contains("\"title\": function (env, context, out) {"));
    assert!(code.ends_with("export default template;\n"));
}

#[test]
fn test_block_calls_display_directly() {
    let code = compile("{% block title %}T{% endblock %}{{ block('title') }}{{ 007 }}");
    assert_eq!(
        render_body(&code),
        vec![
            "// line 1",
            "env.displayBlock(template, \"title\", context, out);",
            "env.displayBlock(template, \"title\", context, out);",
            "out.write(env.toString(7));",
        ]
    );
}

#[test]
fn test_spaceless_is_a_runtime_transformation() {
    let code = compile("{% spaceless %}<p>\n  {{ x }}\n</p>{% endspaceless %}");
    let body = render_body(&code);
    assert_eq!(body.first().map(String::as_str), Some("// line 1"));
    assert_eq!(body[1], "out.begin();");
    assert_eq!(
        body.last().map(String::as_str),
        Some("out.write(out.end().replace(/>\\s+</g, \"><\").trim());")
    );
}

#[test]
fn test_line_directive_reaches_debug_info() {
    init_tracing();
    let env = Environment::builder().debug(true).build().unwrap();
    let template = env
        .compile_source("a{% line 10 %}\n{{ b }}", "index")
        .unwrap();
    assert_eq!(template.debug_info.values().copied().collect::<Vec<_>>(), vec![1, 11]);
    assert!(template.code.contains("debugInfo: {"));
}

#[test]
fn test_interpolation_compiles_to_concatenation() {
    let code = compile("{{ \"a#{b}c\" }}");
    assert!(code.contains(
        "(env.toString((env.toString(\"a\") + env.toString((context[\"b\"] ?? null)))) + env.toString(\"c\"))"
    ));
}

#[test]
fn test_named_arguments() {
    let code = compile("{{ items|slice(preserveKeys = true, start = 1) }}");
    assert!(code.contains(
        "env.filters[\"slice\"](env, (context[\"items\"] ?? null), 1, null, true)"
    ));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_unclosed_variable() {
    assert_eq!(
        compile_err("line 1\n{{\n\nfoo"),
        "Unclosed \"variable\" in \"index\" at line 2."
    );
}

#[test]
fn test_set_errors() {
    assert_eq!(
        compile_err("{% set a, b = 1 %}"),
        "When using set, you must have the same number of variables and assignments in \"index\" at line 1."
    );
    assert_eq!(
        compile_err("{% set a, b %}x{% endset %}"),
        "When using set with a block, you cannot have a multi-target in \"index\" at line 1."
    );
}

#[test]
fn test_duplicate_block() {
    assert_eq!(
        compile_err("{% block x %}{% endblock %}\n{% block x %}{% endblock %}"),
        "The block 'x' has already been defined line 1 in \"index\" at line 2."
    );
}

#[test]
fn test_unknown_tag_suggests() {
    assert_eq!(
        compile_err("{% fore x in y %}{% endfor %}"),
        "Unknown \"fore\" tag. Did you mean \"for\" in \"index\" at line 1?"
    );
}

#[test]
fn test_unknown_filter() {
    assert_eq!(
        compile_err("\n{{ x|lowr }}"),
        "Unknown \"lowr\" filter. Did you mean \"lower\" in \"index\" at line 2?"
    );
}

#[test]
fn test_missing_argument() {
    assert_eq!(
        compile_err("{{ range(1) }}"),
        "Value for argument \"high\" is required for function \"range\" in \"index\" at line 1."
    );
}

#[test]
fn test_errors_are_syntax_errors() {
    init_tracing();
    let err = twine::compile_source("{% if %}", "index").unwrap_err();
    assert!(matches!(err, Error::Syntax(_)));
}

// ============================================================================
// Extensions
// ============================================================================

/// `{% echo expr %}` prints an expression.
struct EchoTag;

impl TagParser for EchoTag {
    fn tag(&self) -> &str {
        "echo"
    }

    fn parse(&self, token: &Token, parser: &mut Parser<'_>) -> Result<Option<Node>, Error> {
        let expr = parser.parse_expression()?;
        parser.stream_mut().expect(TokenKind::BlockEnd, None)?;
        Ok(Some(Node::print(expr, token.line).with_tag("echo")))
    }
}

struct Helpers;

impl Extension for Helpers {
    fn name(&self) -> &str {
        "helpers"
    }

    fn tags(&self) -> Vec<Arc<dyn TagParser>> {
        vec![Arc::new(EchoTag)]
    }

    fn unary_operators(&self) -> Vec<(String, UnaryOperator)> {
        vec![(
            "twice".into(),
            UnaryOperator {
                precedence: 500,
                op: UnaryOp::Call("helpers.twice".into()),
            },
        )]
    }

    fn binary_operators(&self) -> Vec<(String, BinaryOperator)> {
        vec![(
            "xor".into(),
            BinaryOperator::left(12, BinaryOp::Call("helpers.xor".into())),
        )]
    }

    fn filters(&self) -> Vec<Callable> {
        vec![Callable::filter("shout")
            .with_callee("helpers.shout")
            .with_params([Param::optional("marks", twine::Constant::Number("1".into()))])]
    }

    fn tests(&self) -> Vec<Callable> {
        vec![Callable::test("prime number").no_params()]
    }
}

fn helpers_env() -> Environment {
    init_tracing();
    Environment::builder().extension(Helpers).build().unwrap()
}

#[test]
fn test_extension_tag_and_operators() {
    let env = helpers_env();
    let code = env
        .compile_source("{% echo twice a xor b %}", "index")
        .unwrap()
        .code;
    assert_eq!(
        render_body(&code),
        vec![
            "// line 1",
            "out.write(env.toString(helpers.xor(helpers.twice((context[\"a\"] ?? null)), (context[\"b\"] ?? null))));",
        ]
    );
}

#[test]
fn test_extension_filter_and_two_word_test() {
    let env = helpers_env();
    let code = env
        .compile_source("{{ a|shout(marks = 3) }}{{ 7 is prime number }}", "index")
        .unwrap()
        .code;
    assert!(code.contains("helpers.shout((context[\"a\"] ?? null), 3)"));
    assert!(code.contains("env.tests[\"prime number\"](7)"));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_shared_environment_across_threads() {
    let env = Arc::new(helpers_env());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let env = Arc::clone(&env);
            thread::spawn(move || {
                env.compile_source(&format!("{{{{ {i} }}}}"), &format!("t{i}"))
                    .map(|template| template.code)
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let code = handle.join().unwrap().unwrap();
        assert!(code.contains(&format!("out.write(\"{i}\");")));
        assert!(code.contains(&format!("name: \"t{i}\"")));
    }
}

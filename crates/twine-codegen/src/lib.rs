//! Twine Code Generator
//!
//! Compiles an optimized [`Module`] into a JavaScript ES module whose
//! default export renders the template against a runtime environment.
//!
//! ```text
//! Module → compile() → CompiledTemplate { name, code, debug_info }
//! ```
//!
//! The generated module looks like this:
//!
//! ```text
//! const template = {
//!   name: "index",
//!   render(env, context, out) { ... },
//!   blocks: {
//!     "title": function (env, context, out) { ... },
//!   },
//! };
//!
//! export default template;
//! ```
//!
//! Filters, functions and tests are resolved against a [`Registry`] while
//! compiling, so unknown names and bad arguments are reported before the
//! template ever runs.

pub mod calls;
pub mod compiler;
pub mod nodes;
pub mod registry;

use std::collections::BTreeMap;

use twine_lexer::Error;
use twine_parser::Module;

pub use calls::{normalize_name, ResolvedCall};
pub use compiler::{js_string, Compiler};
pub use registry::{Callable, CallableKind, Param, Registry};

/// Options that change the generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Embed the generated-line to template-line table as `debugInfo`.
    pub debug: bool,
    /// Compile variable lookups to a checked access.
    pub strict_variables: bool,
    /// Value of `_charset`.
    pub charset: String,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            debug: false,
            strict_variables: false,
            charset: "UTF-8".into(),
        }
    }
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    pub name: String,
    /// The JavaScript module.
    pub code: String,
    /// Generated line (1-based) -> template line.
    pub debug_info: BTreeMap<usize, usize>,
}

/// Compile `module` to a JavaScript module.
pub fn compile(module: &Module, registry: &Registry, options: &CodegenOptions) -> Result<CompiledTemplate, Error> {
    let name = module.source.name.as_str();
    let mut compiler = Compiler::new(registry, options, name);

    compiler
        .write(&format!("// {}\n", js_string(name)))
        .write("const template = {\n")
        .indent()
        .write("name: ")
        .string(name)
        .raw(",\n")
        .write("render(env, context, out) {\n")
        .indent();
    compiler.subcompile(&module.body)?;
    compiler.outdent()?.write("},\n");

    if module.blocks.is_empty() {
        compiler.write("blocks: {},\n");
    } else {
        compiler.write("blocks: {\n").indent();
        for block in module.blocks.values() {
            compiler
                .write("")
                .string(&block.name)
                .raw(": function (env, context, out) {\n")
                .indent()
                .reset_line_marker();
            compiler.subcompile(&block.body)?;
            compiler.outdent()?.write("},\n");
        }
        compiler.outdent()?.write("},\n");
    }

    if options.debug {
        let entries: Vec<String> = compiler
            .debug_info()
            .iter()
            .map(|(generated, line)| format!("{generated}: {line}"))
            .collect();
        compiler.write(&format!("debugInfo: {{{}}},\n", entries.join(", ")));
    }

    compiler.outdent()?.write("};\n\nexport default template;\n");

    let (code, debug_info) = compiler.into_parts();
    tracing::debug!(
        template = name,
        bytes = code.len(),
        blocks = module.blocks.len(),
        "generated template code"
    );

    Ok(CompiledTemplate {
        name: name.to_string(),
        code,
        debug_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use twine_parser::Grammar;

    fn compile_source(source: &str, options: &CodegenOptions) -> CompiledTemplate {
        let grammar = Grammar::new();
        let stream = grammar.lexer().tokenize(source, "index").unwrap();
        let module = twine_parser::parse(stream, &grammar).unwrap();
        compile(&module, &Registry::with_builtins(), options).unwrap()
    }

    // =========================================================================
    // Module shape
    // =========================================================================

    #[test]
    fn test_module_without_blocks() {
        let template = compile_source("Hello", &CodegenOptions::default());
        assert_eq!(
            template.code,
            [
                "// \"index\"",
                "const template = {",
                "  name: \"index\",",
                "  render(env, context, out) {",
                "    // line 1",
                "    out.write(\"Hello\");",
                "  },",
                "  blocks: {},",
                "};",
                "",
                "export default template;",
                "",
            ]
            .join("\n")
        );
        assert_eq!(template.name, "index");
        assert_eq!(template.debug_info.get(&6), Some(&1));
    }

    #[test]
    fn test_module_with_blocks() {
        let template = compile_source(
            "{% block title %}T{% endblock %}\n{% block body %}{{ 1 }}{% endblock %}",
            &CodegenOptions::default(),
        );
        assert_eq!(
            template.code,
            [
                "// \"index\"",
                "const template = {",
                "  name: \"index\",",
                "  render(env, context, out) {",
                "    // line 1",
                "    env.displayBlock(template, \"title\", context, out);",
                "    // line 2",
                "    env.displayBlock(template, \"body\", context, out);",
                "  },",
                "  blocks: {",
                "    \"title\": function (env, context, out) {",
                "      // line 1",
                "      out.write(\"T\");",
                "    },",
                "    \"body\": function (env, context, out) {",
                "      // line 2",
                "      out.write(env.toString(1));",
                "    },",
                "  },",
                "};",
                "",
                "export default template;",
                "",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_debug_embeds_table() {
        let options = CodegenOptions {
            debug: true,
            ..CodegenOptions::default()
        };
        let template = compile_source("a\n{{ b }}", &options);
        assert!(template.code.contains("  debugInfo: {6: 1, 8: 2},\n"));
        assert_eq!(
            template.debug_info.into_iter().collect::<Vec<_>>(),
            vec![(6, 1), (8, 2)]
        );
    }

    #[test]
    fn test_error_aborts() {
        let grammar = Grammar::new();
        let stream = grammar.lexer().tokenize("{{ nope() }}", "page").unwrap();
        let module = twine_parser::parse(stream, &grammar).unwrap();
        let err = compile(&module, &Registry::with_builtins(), &CodegenOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "Unknown \"nope\" function in \"page\" at line 1.");
    }
}

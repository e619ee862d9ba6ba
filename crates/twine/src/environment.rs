//! Compilation environment: options plus everything extensions register.

use std::collections::HashSet;
use std::sync::Arc;

use twine_codegen::{Callable, CallableKind, CodegenOptions, CompiledTemplate, Registry};
use twine_lexer::{Error, Lexer, TokenStream};
use twine_optimizer::{Optimizations, Optimizer};
use twine_parser::grammar::{BinaryOperator, UnaryOperator};
use twine_parser::{Grammar, Module, TagParser};

/// Compiler options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Embed the generated-line to template-line table in the output.
    pub debug: bool,
    /// Report undefined variables through `env.undefinedVariable`.
    pub strict_variables: bool,
    pub optimizations: Optimizations,
    /// Exposed to templates as `_charset`.
    pub charset: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debug: false,
            strict_variables: false,
            optimizations: Optimizations::all(),
            charset: "UTF-8".into(),
        }
    }
}

/// A bundle of tags, operators and callables added to an [`Environment`].
///
/// Every method has an empty default, so an extension only implements what
/// it contributes.
pub trait Extension: Send + Sync {
    /// Unique name of the extension.
    fn name(&self) -> &str;

    fn tags(&self) -> Vec<Arc<dyn TagParser>> {
        Vec::new()
    }

    fn unary_operators(&self) -> Vec<(String, UnaryOperator)> {
        Vec::new()
    }

    fn binary_operators(&self) -> Vec<(String, BinaryOperator)> {
        Vec::new()
    }

    fn filters(&self) -> Vec<Callable> {
        Vec::new()
    }

    fn functions(&self) -> Vec<Callable> {
        Vec::new()
    }

    fn tests(&self) -> Vec<Callable> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvironmentError {
    #[error("Unable to register extension \"{0}\" as it is already registered.")]
    DuplicateExtension(String),
    #[error("The {kind} \"{name}\" registered by extension \"{extension}\" is declared as a {declared}.")]
    MisplacedCallable {
        extension: String,
        name: String,
        kind: CallableKind,
        declared: CallableKind,
    },
}

/// Collects options and extensions; [`build`](Self::build) freezes them.
#[derive(Default)]
pub struct EnvironmentBuilder {
    options: Options,
    extensions: Vec<Box<dyn Extension>>,
}

impl EnvironmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    pub fn strict_variables(mut self, strict: bool) -> Self {
        self.options.strict_variables = strict;
        self
    }

    pub fn optimizations(mut self, optimizations: Optimizations) -> Self {
        self.options.optimizations = optimizations;
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.options.charset = charset.into();
        self
    }

    pub fn extension(mut self, extension: impl Extension + 'static) -> Self {
        self.extensions.push(Box::new(extension));
        self
    }

    pub fn build(self) -> Result<Environment, EnvironmentError> {
        let mut grammar = Grammar::new();
        let mut registry = Registry::with_builtins();
        let mut names = HashSet::new();

        for extension in &self.extensions {
            let name = extension.name().to_string();
            if !names.insert(name.clone()) {
                return Err(EnvironmentError::DuplicateExtension(name));
            }

            for tag in extension.tags() {
                grammar.add_tag(tag);
            }
            for (spelling, operator) in extension.unary_operators() {
                grammar.add_unary_operator(spelling, operator);
            }
            for (spelling, operator) in extension.binary_operators() {
                grammar.add_binary_operator(spelling, operator);
            }

            let callables = [
                (CallableKind::Filter, extension.filters()),
                (CallableKind::Function, extension.functions()),
                (CallableKind::Test, extension.tests()),
            ];
            for (kind, callables) in callables {
                for callable in callables {
                    if callable.kind != kind {
                        return Err(EnvironmentError::MisplacedCallable {
                            extension: name,
                            name: callable.name,
                            kind,
                            declared: callable.kind,
                        });
                    }
                    registry.add(callable);
                }
            }
            tracing::debug!(extension = %name, "registered extension");
        }

        Ok(Environment::assemble(self.options, grammar, registry))
    }
}

/// Everything needed to compile templates. Immutable once built, so one
/// environment can be shared by any number of threads.
#[derive(Debug)]
pub struct Environment {
    options: Options,
    grammar: Grammar,
    registry: Registry,
    lexer: Lexer,
    optimizer: Optimizer,
    codegen: CodegenOptions,
}

impl Default for Environment {
    /// Default options and no extensions.
    fn default() -> Self {
        Self::with_options(Options::default())
    }
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::new()
    }

    /// An environment without extensions.
    pub fn with_options(options: Options) -> Self {
        Self::assemble(options, Grammar::new(), Registry::with_builtins())
    }

    /// Makes every registered test name known to the parser and builds the
    /// lexer for the final operator set.
    fn assemble(options: Options, mut grammar: Grammar, registry: Registry) -> Self {
        for test in registry.names(CallableKind::Test) {
            grammar.add_test(test);
        }
        let lexer = grammar.lexer();
        Self {
            codegen: CodegenOptions {
                debug: options.debug,
                strict_variables: options.strict_variables,
                charset: options.charset.clone(),
            },
            optimizer: Optimizer::new(options.optimizations),
            options,
            grammar,
            registry,
            lexer,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tokenize(&self, source: &str, name: &str) -> Result<TokenStream, Error> {
        self.lexer.tokenize(source, name)
    }

    pub fn parse(&self, stream: TokenStream) -> Result<Module, Error> {
        twine_parser::parse(stream, &self.grammar)
    }

    pub fn optimize(&self, module: Module) -> Module {
        self.optimizer.optimize(module)
    }

    pub fn compile(&self, module: &Module) -> Result<CompiledTemplate, Error> {
        twine_codegen::compile(module, &self.registry, &self.codegen)
    }

    /// Lex, parse, optimize and compile `source`.
    pub fn compile_source(&self, source: &str, name: &str) -> Result<CompiledTemplate, Error> {
        let _span = tracing::debug_span!("compile", template = name).entered();
        let stream = self.tokenize(source, name)?;
        let module = self.parse(stream)?;
        let module = self.optimize(module);
        self.compile(&module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Named(&'static str);

    impl Extension for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    struct Misplaced;

    impl Extension for Misplaced {
        fn name(&self) -> &str {
            "misplaced"
        }

        fn filters(&self) -> Vec<Callable> {
            vec![Callable::function("oops")]
        }
    }

    // =========================================================================
    // Builder
    // =========================================================================

    #[test]
    fn test_builder_sets_options() {
        let env = Environment::builder()
            .debug(true)
            .strict_variables(true)
            .charset("ISO-8859-1")
            .optimizations(Optimizations::empty())
            .build()
            .unwrap();
        assert_eq!(
            env.options(),
            &Options {
                debug: true,
                strict_variables: true,
                optimizations: Optimizations::empty(),
                charset: "ISO-8859-1".into(),
            }
        );
    }

    #[test]
    fn test_duplicate_extension() {
        let err = Environment::builder()
            .extension(Named("a"))
            .extension(Named("a"))
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to register extension \"a\" as it is already registered."
        );
    }

    #[test]
    fn test_misplaced_callable() {
        let err = Environment::builder().extension(Misplaced).build().unwrap_err();
        assert_eq!(
            err.to_string(),
            "The filter \"oops\" registered by extension \"misplaced\" is declared as a function."
        );
    }

    #[test]
    fn test_registry_tests_reach_grammar() {
        let env = Environment::default();
        assert!(env.grammar().has_test("divisible by"));
        assert!(env.grammar().has_test("same as"));
    }

    #[test]
    fn test_environment_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Environment>();
    }
}

//! Filters, functions and tests callable from template expressions.
//!
//! The code generator only needs the calling convention of each callable:
//! its declared parameters, whether it collects extra arguments, whether the
//! environment or the context is passed in front, and the JavaScript
//! expression to call. The implementation itself lives in the runtime.

use std::fmt;

use indexmap::IndexMap;
use twine_parser::Constant;

/// Which registry a callable belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallableKind {
    Filter,
    Function,
    Test,
}

impl CallableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallableKind::Filter => "filter",
            CallableKind::Function => "function",
            CallableKind::Test => "test",
        }
    }

    /// The runtime registry object, e.g. `env.filters`.
    fn runtime_table(self) -> &'static str {
        match self {
            CallableKind::Filter => "env.filters",
            CallableKind::Function => "env.functions",
            CallableKind::Test => "env.tests",
        }
    }
}

impl fmt::Display for CallableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared parameter. Parameters without a default are required.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Constant>,
}

impl Param {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: Constant) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }
}

/// Calling convention of one filter, function or test.
///
/// For filters and tests the subject (`x` in `x|upper` or `x is even`) is
/// always the first argument and is not part of `params`.
#[derive(Debug, Clone, PartialEq)]
pub struct Callable {
    pub kind: CallableKind,
    pub name: String,
    /// `None` when the parameters are unknown: arguments are then passed
    /// positionally as written and named arguments are rejected.
    pub params: Option<Vec<Param>>,
    pub variadic: bool,
    pub needs_environment: bool,
    pub needs_context: bool,
    callee: Option<String>,
}

impl Callable {
    pub fn new(kind: CallableKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            params: None,
            variadic: false,
            needs_environment: false,
            needs_context: false,
            callee: None,
        }
    }

    pub fn filter(name: impl Into<String>) -> Self {
        Self::new(CallableKind::Filter, name)
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self::new(CallableKind::Function, name)
    }

    pub fn test(name: impl Into<String>) -> Self {
        Self::new(CallableKind::Test, name)
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params = Some(params.into_iter().collect());
        self
    }

    /// Declares that the callable takes no parameters besides its subject.
    pub fn no_params(mut self) -> Self {
        self.params = Some(Vec::new());
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn needs_environment(mut self) -> Self {
        self.needs_environment = true;
        self
    }

    pub fn needs_context(mut self) -> Self {
        self.needs_context = true;
        self
    }

    /// Call this JavaScript expression instead of the runtime registry entry.
    pub fn with_callee(mut self, callee: impl Into<String>) -> Self {
        self.callee = Some(callee.into());
        self
    }

    /// The JavaScript expression that is called.
    pub fn callee(&self) -> String {
        match &self.callee {
            Some(callee) => callee.clone(),
            None => format!(
                "{}[{}]",
                self.kind.runtime_table(),
                crate::compiler::js_string(&self.name)
            ),
        }
    }

    /// `name(a, b)`, as used in argument error messages.
    pub fn signature(&self) -> String {
        let names: Vec<&str> = self
            .params
            .iter()
            .flatten()
            .map(|p| p.name.as_str())
            .collect();
        format!("{}({})", self.name, names.join(", "))
    }
}

/// Every callable known to the code generator, by kind and name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    filters: IndexMap<String, Callable>,
    functions: IndexMap<String, Callable>,
    tests: IndexMap<String, Callable>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The core filters, functions and tests.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for callable in builtins() {
            registry.add(callable);
        }
        registry
    }

    /// Register a callable; replaces one of the same kind and name.
    pub fn add(&mut self, callable: Callable) -> &mut Self {
        self.table_mut(callable.kind)
            .insert(callable.name.clone(), callable);
        self
    }

    pub fn get(&self, kind: CallableKind, name: &str) -> Option<&Callable> {
        self.table(kind).get(name)
    }

    pub fn names(&self, kind: CallableKind) -> impl Iterator<Item = &str> {
        self.table(kind).keys().map(String::as_str)
    }

    fn table(&self, kind: CallableKind) -> &IndexMap<String, Callable> {
        match kind {
            CallableKind::Filter => &self.filters,
            CallableKind::Function => &self.functions,
            CallableKind::Test => &self.tests,
        }
    }

    fn table_mut(&mut self, kind: CallableKind) -> &mut IndexMap<String, Callable> {
        match kind {
            CallableKind::Filter => &mut self.filters,
            CallableKind::Function => &mut self.functions,
            CallableKind::Test => &mut self.tests,
        }
    }
}

fn builtins() -> Vec<Callable> {
    use Constant::{Bool, Null};
    let string = |s: &str| Constant::String(s.into());
    let number = |n: &str| Constant::Number(n.into());

    vec![
        // filters
        Callable::filter("raw").no_params(),
        Callable::filter("escape")
            .needs_environment()
            .with_params([
                Param::optional("strategy", string("html")),
                Param::optional("charset", Null),
                Param::optional("autoescape", Bool(false)),
            ]),
        Callable::filter("e")
            .needs_environment()
            .with_callee("env.filters[\"escape\"]")
            .with_params([
                Param::optional("strategy", string("html")),
                Param::optional("charset", Null),
                Param::optional("autoescape", Bool(false)),
            ]),
        Callable::filter("upper").no_params(),
        Callable::filter("lower").no_params(),
        Callable::filter("title").no_params(),
        Callable::filter("capitalize").no_params(),
        Callable::filter("trim").with_params([
            Param::optional("character_mask", Null),
            Param::optional("side", string("both")),
        ]),
        Callable::filter("length").needs_environment().no_params(),
        Callable::filter("join").with_params([
            Param::optional("glue", string("")),
            Param::optional("and", Null),
        ]),
        Callable::filter("split").with_params([
            Param::required("delimiter"),
            Param::optional("limit", Null),
        ]),
        Callable::filter("slice").needs_environment().with_params([
            Param::required("start"),
            Param::optional("length", Null),
            Param::optional("preserve_keys", Bool(false)),
        ]),
        Callable::filter("first").needs_environment().no_params(),
        Callable::filter("last").needs_environment().no_params(),
        Callable::filter("keys").no_params(),
        Callable::filter("merge").with_params([Param::required("arr")]),
        Callable::filter("reverse")
            .needs_environment()
            .with_params([Param::optional("preserve_keys", Bool(false))]),
        Callable::filter("sort").with_params([Param::optional("arrow", Null)]),
        Callable::filter("default").with_params([Param::optional("default", string(""))]),
        Callable::filter("replace").with_params([Param::required("from")]),
        Callable::filter("abs").no_params(),
        Callable::filter("round").with_params([
            Param::optional("precision", number("0")),
            Param::optional("method", string("common")),
        ]),
        Callable::filter("number_format").needs_environment().with_params([
            Param::optional("decimal", Null),
            Param::optional("decimal_point", Null),
            Param::optional("thousand_sep", Null),
        ]),
        Callable::filter("batch").with_params([
            Param::required("size"),
            Param::optional("fill", Null),
            Param::optional("preserve_keys", Bool(true)),
        ]),
        Callable::filter("format").variadic().no_params(),
        Callable::filter("date").needs_environment().with_params([
            Param::optional("format", Null),
            Param::optional("timezone", Null),
        ]),
        // functions
        Callable::function("range").with_params([
            Param::required("low"),
            Param::required("high"),
            Param::optional("step", number("1")),
        ]),
        Callable::function("cycle").with_params([Param::required("values"), Param::required("position")]),
        Callable::function("max").variadic().no_params(),
        Callable::function("min").variadic().no_params(),
        Callable::function("random").needs_environment().with_params([
            Param::optional("values", Null),
            Param::optional("max", Null),
        ]),
        Callable::function("date").needs_environment().with_params([
            Param::optional("date", Null),
            Param::optional("timezone", Null),
        ]),
        Callable::function("block")
            .needs_environment()
            .needs_context()
            .with_callee("env.renderBlock")
            .with_params([Param::required("name"), Param::optional("template", Null)]),
        Callable::function("parent")
            .needs_environment()
            .needs_context()
            .with_callee("env.renderParentBlock")
            .no_params(),
        Callable::function("include")
            .needs_environment()
            .needs_context()
            .with_params([
                Param::required("template"),
                Param::optional("variables", Null),
                Param::optional("with_context", Bool(true)),
                Param::optional("ignore_missing", Bool(false)),
            ]),
        Callable::function("dump")
            .needs_environment()
            .needs_context()
            .variadic()
            .no_params(),
        // tests
        Callable::test("defined").no_params(),
        Callable::test("empty").no_params(),
        Callable::test("null").no_params(),
        Callable::test("none").with_callee("env.tests[\"null\"]").no_params(),
        Callable::test("even").no_params(),
        Callable::test("odd").no_params(),
        Callable::test("iterable").no_params(),
        Callable::test("divisible by").with_params([Param::required("num")]),
        Callable::test("same as").with_params([Param::required("other")]),
        Callable::test("constant").with_params([
            Param::required("constant"),
            Param::optional("object", Null),
        ]),
    ]
}

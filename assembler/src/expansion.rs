//! Typed parameter expansion.
//!
//! An invocation code of one or two letters selects how a parameter value is
//! read (first letter) and how it is produced in shell text (second letter,
//! default `q`):
//!
//! | letter | meaning |
//! |---|---|
//! | `c` | command text |
//! | `e` | expression text, expanded by the shell |
//! | `l`, `q` | literal text |
//! | `v` | variable name |
//!
//! Some combinations stage the value through a freshly named shell variable,
//! returned as a [`NewVariable`] for the caller to declare.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::trace;

use crate::shell::shell_escape;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Command,
    Expression,
    Literal,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Command,
    Expression,
    Literal,
    Variable,
}

impl InputKind {
    fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'C' => Some(InputKind::Command),
            'E' => Some(InputKind::Expression),
            'L' | 'Q' => Some(InputKind::Literal),
            'V' => Some(InputKind::Variable),
            _ => None,
        }
    }
}

impl OutputKind {
    fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'C' => Some(OutputKind::Command),
            'E' => Some(OutputKind::Expression),
            'L' | 'Q' => Some(OutputKind::Literal),
            'V' => Some(OutputKind::Variable),
            _ => None,
        }
    }
}

/// A decoded invocation code such as `ce` or `v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationCode {
    pub input: InputKind,
    pub output: OutputKind,
}

impl InvocationCode {
    /// Decode a one- or two-letter code. Any unrecognized letter, or extra
    /// letters, yields `None`.
    pub fn parse(code: &str) -> Option<Self> {
        let mut letters = code.chars();
        let input = InputKind::from_letter(letters.next()?)?;
        let output = match letters.next() {
            Some(letter) => OutputKind::from_letter(letter)?,
            None => OutputKind::Literal,
        };
        if letters.next().is_some() {
            return None;
        }
        Some(InvocationCode { input, output })
    }
}

/// A shell variable synthesized to stage a parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVariable {
    pub name: String,
    /// The original parameter value.
    pub value: String,
    /// Right-hand side of the assignment, e.g. `$(ls -la)`.
    pub assignment_code: String,
    /// The invocation code that produced this variable, lowercased with the
    /// output letter filled in (`c` becomes `cq`).
    pub invocation: String,
    /// The parameter the variable was created for.
    pub param: String,
}

impl NewVariable {
    /// `name=assignment_code`
    pub fn assignment(&self) -> String {
        format!("{}={}", self.name, self.assignment_code)
    }
}

/// The shell text for one parameter, and the variable it needs, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub text: String,
    pub new_variable: Option<NewVariable>,
}

impl Expansion {
    fn text(text: impl Into<String>) -> Self {
        Expansion {
            text: text.into(),
            new_variable: None,
        }
    }
}

/// Monotonic source of suffixes for generated variable names.
///
/// Owned by the caller; safe to share between threads.
#[derive(Debug, Default)]
pub struct UniqueCounter(AtomicU64);

impl UniqueCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting after `value`.
    pub fn starting_at(value: u64) -> Self {
        UniqueCounter(AtomicU64::new(value))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Where the suffix of a generated variable name comes from.
#[derive(Debug, Clone, Copy)]
pub enum Unique<'a> {
    /// Draw the next value from a counter.
    Counter(&'a UniqueCounter),
    /// Use this exact suffix; the counter is not touched.
    Fixed(&'a str),
}

impl Unique<'_> {
    fn resolve(self) -> String {
        match self {
            Unique::Counter(counter) => counter.next().to_string(),
            Unique::Fixed(value) => value.to_string(),
        }
    }
}

/// True for text already in `${...}` form.
pub fn is_wrapped(text: &str) -> bool {
    text.starts_with("${") && text.ends_with('}')
}

/// Dereference a variable name: `X` becomes `${X}`, `${X}` is kept.
pub fn deref(value: &str) -> String {
    if is_wrapped(value) {
        value.to_string()
    } else {
        format!("${{{}}}", value)
    }
}

fn normalize_code(code: &str) -> String {
    let mut normalized = code.to_ascii_lowercase();
    if normalized.len() == 1 {
        normalized.push('q');
    }
    normalized
}

fn printf_literal(value: &str) -> String {
    format!("printf %s \"{}\"", value)
}

/// Expand one parameter value according to its invocation code.
///
/// A missing or empty code, or one with an unrecognized letter, returns the
/// value unchanged with no new variable.
pub fn expand_parameter(
    param: &str,
    invocation: Option<&str>,
    value: &str,
    unique: Unique<'_>,
) -> Expansion {
    let Some(code) = invocation.filter(|code| !code.is_empty()) else {
        return Expansion::text(value);
    };
    let Some(parsed) = InvocationCode::parse(code) else {
        trace!(param, code, "unrecognized invocation code, value passed through");
        return Expansion::text(value);
    };

    let invocation = normalize_code(code);
    // The suffix is only drawn when a variable is actually created.
    let new_variable = |assignment_code: String| NewVariable {
        name: format!("{}_{}", param, unique.resolve()),
        value: value.to_string(),
        assignment_code,
        invocation: invocation.clone(),
        param: param.to_string(),
    };
    let staged = |variable: NewVariable, text: String| Expansion {
        text,
        new_variable: Some(variable),
    };

    use InputKind as I;
    use OutputKind as O;
    match (parsed.input, parsed.output) {
        (I::Command, O::Command) => Expansion::text(value),
        (I::Command, O::Expression | O::Variable) => {
            let variable = new_variable(format!("$({})", value));
            let text = variable.name.clone();
            staged(variable, text)
        }
        (I::Command, O::Literal) => {
            let variable = new_variable(format!("$({})", value));
            let text = deref(&variable.name);
            staged(variable, text)
        }

        (I::Expression, O::Command) => Expansion::text(printf_literal(value)),
        (I::Expression, O::Expression) => Expansion::text(value),
        (I::Expression, O::Literal) => Expansion::text(format!("$({})", printf_literal(value))),
        (I::Expression, O::Variable) => {
            let variable = new_variable(printf_literal(value));
            let text = variable.name.clone();
            staged(variable, text)
        }

        (I::Literal, O::Command) => Expansion::text(printf_literal(value)),
        (I::Literal, O::Expression | O::Literal) => Expansion::text(value),
        (I::Literal, O::Variable) => {
            let variable = new_variable(shell_escape(value));
            let text = variable.name.clone();
            staged(variable, text)
        }

        (I::Variable, O::Command) => Expansion::text(printf_literal(&deref(value))),
        (I::Variable, O::Expression | O::Literal) => Expansion::text(deref(value)),
        (I::Variable, O::Variable) => Expansion::text(value),
    }
}

/// A parameter's invocation code and raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub invocation: Option<String>,
    pub value: String,
}

impl ParamSpec {
    pub fn new(invocation: Option<&str>, value: impl Into<String>) -> Self {
        ParamSpec {
            invocation: invocation.map(str::to_string),
            value: value.into(),
        }
    }
}

/// Result of expanding a set of parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchExpansion {
    /// Parameter name → expansion text, in input order.
    pub expansions: IndexMap<String, String>,
    /// Variables created along the way, in input order.
    pub new_variables: Vec<NewVariable>,
}

/// Expand each parameter independently, drawing suffixes from `counter`.
pub fn expand_parameters(
    params: &IndexMap<String, ParamSpec>,
    counter: &UniqueCounter,
) -> BatchExpansion {
    let mut batch = BatchExpansion::default();
    for (name, spec) in params {
        let expansion = expand_parameter(
            name,
            spec.invocation.as_deref(),
            &spec.value,
            Unique::Counter(counter),
        );
        batch.expansions.insert(name.clone(), expansion.text);
        batch.new_variables.extend(expansion.new_variable);
    }
    batch
}

use std::collections::{HashMap, HashSet};

use mdx::block::call::{CallBinding, ParamBinding, is_identifier};
use mdx::block::{Block, Stream, strip_name_form};
use tracing::{debug, warn};

use crate::error::{AssembleError, Result};
use crate::expansion::{
    InputKind, InvocationCode, NewVariable, OutputKind, Unique, UniqueCounter, deref,
    expand_parameter,
};
use crate::registry::BlockSet;
use crate::resolver::{Resolved, resolve};
use crate::shell::{function_name, shell_escape, single_quote};

const HEREDOC_END: &str = "EOF";

/// Turns resolved blocks into shell source lines.
pub struct Assembler<'c> {
    counter: &'c UniqueCounter,
}

impl<'c> Assembler<'c> {
    /// Generated variable names draw their suffixes from `counter`.
    pub fn new(counter: &'c UniqueCounter) -> Self {
        Assembler { counter }
    }

    /// Emit each block in order. Blocks invoked through a call are wrapped
    /// in a shell function named after the block; one that some block also
    /// lists in `reqs` is invoked right after its definition as well.
    pub fn assemble(&self, order: &[Resolved<'_>]) -> Result<Vec<String>> {
        let call_targets = call_targets(order)?;
        let required: HashSet<&str> = order
            .iter()
            .flat_map(|r| r.block.reqs.iter().map(String::as_str))
            .chain(order.last().map(Resolved::name))
            .collect();

        let mut script = Vec::new();
        for resolved in order {
            let lines = self.render(resolved);
            debug!(block = %resolved.name(), lines = lines.len(), "assembled block");

            if call_targets.contains(resolved.name()) {
                let function = function_name(resolved.name());
                script.push(format!("{}() {{", function));
                script.extend(lines);
                script.push("}".to_string());
                if required.contains(resolved.name()) {
                    script.push(function);
                }
            } else {
                script.extend(lines);
            }
        }
        Ok(script)
    }

    fn render(&self, resolved: &Resolved<'_>) -> Vec<String> {
        let block = resolved.block;
        if let Some(call) = &resolved.call {
            self.render_call(call)
        } else if block.is_literal() {
            render_heredoc(block)
        } else if block.is_vars() {
            render_vars(block)
        } else {
            render_shell(block)
        }
    }

    fn render_call(&self, call: &CallBinding) -> Vec<String> {
        let mut lines = Vec::new();
        let mut words = Vec::new();

        for param in &call.params {
            let (word, staged) = self.bind_parameter(param);
            if let Some(variable) = staged {
                lines.push(variable.assignment());
            }
            words.push(word);
        }

        words.push(function_name(&call.target_name));
        match &call.input_redirect {
            Some(Stream::File(path)) => words.push(format!("< {}", single_quote(path))),
            Some(Stream::Variable(var)) => words.push(format!("<<<\"${}\"", var)),
            None => {}
        }
        let invocation = words.join(" ");

        lines.push(match &call.output_capture {
            Some(Stream::Variable(var)) => format!("export {}=$({})", var, invocation),
            Some(Stream::File(path)) => format!("{} > {}", invocation, single_quote(path)),
            None => invocation,
        });
        lines
    }

    /// The `NAME=value` prefix passing one parameter to the called block,
    /// and the variable that must be declared before it, if any.
    fn bind_parameter(&self, param: &ParamBinding) -> (String, Option<NewVariable>) {
        let expansion = expand_parameter(
            &param.name,
            param.invocation.as_deref(),
            &param.value,
            Unique::Counter(self.counter),
        );
        let code = param.invocation.as_deref().and_then(InvocationCode::parse);

        let value = match (&expansion.new_variable, code) {
            // A bare staged name: pass the variable's value, not its name.
            (Some(variable), _) if expansion.text == variable.name => {
                format!("\"{}\"", deref(&variable.name))
            }
            (_, Some(InvocationCode { output: OutputKind::Command, .. })) => {
                format!("\"$({})\"", expansion.text)
            }
            (
                _,
                None
                | Some(InvocationCode {
                    input: InputKind::Literal,
                    output: OutputKind::Literal,
                }),
            ) => shell_escape(&expansion.text),
            _ => format!("\"{}\"", expansion.text),
        };
        (format!("{}={}", param.name, value), expansion.new_variable)
    }
}

/// Names of the blocks invoked by some call in `order`. Distinct targets
/// must not share a shell function name.
fn call_targets<'a>(order: &'a [Resolved<'_>]) -> Result<HashSet<&'a str>> {
    let mut functions: HashMap<String, &str> = HashMap::new();
    let mut targets = HashSet::new();
    for call in order.iter().filter_map(|r| r.call.as_ref()) {
        let target = call.target_name.as_str();
        let function = function_name(target);
        match functions.get(&function) {
            Some(&first) if first != target => {
                return Err(AssembleError::FunctionNameClash {
                    function,
                    first: first.to_string(),
                    second: target.to_string(),
                });
            }
            Some(_) => {}
            None => {
                functions.insert(function, target);
            }
        }
        targets.insert(target);
    }
    Ok(targets)
}

/// A here-document writing the block body to a file or variable.
fn render_heredoc(block: &Block) -> Vec<String> {
    let mut lines = Vec::with_capacity(block.body.len() + 3);
    let opener = format!("<<\"{}\"", HEREDOC_END);
    match &block.stdout {
        Some(Stream::Variable(var)) => lines.push(format!("export {}=$(cat {}", var, opener)),
        Some(Stream::File(path)) => lines.push(format!("cat > {} {}", single_quote(path), opener)),
        None => lines.push(format!(
            "cat > {} {}",
            single_quote(strip_name_form(&block.name)),
            opener
        )),
    }
    lines.extend(block.body.iter().cloned());
    lines.push(HEREDOC_END.to_string());
    if matches!(block.stdout, Some(Stream::Variable(_))) {
        lines.push(")".to_string());
    }
    lines
}

/// `key: value` lines become exported shell variables.
fn render_vars(block: &Block) -> Vec<String> {
    let mut lines = Vec::new();
    for line in &block.body {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            warn!(block = %block.name, line, "skipping line without `key: value`");
            continue;
        };
        let key = key.trim();
        if !is_identifier(key) {
            warn!(block = %block.name, key, "skipping invalid variable name");
            continue;
        }
        lines.push(format!("export {}={}", key, shell_escape(unquote(value.trim()))));
    }
    lines
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn render_shell(block: &Block) -> Vec<String> {
    match &block.stdout {
        None => block.body.clone(),
        Some(Stream::Variable(var)) => {
            let mut lines = vec![format!("export {}=$(", var)];
            lines.extend(block.body.iter().cloned());
            lines.push(")".to_string());
            lines
        }
        Some(Stream::File(path)) => {
            let mut lines = vec!["{".to_string()];
            lines.extend(block.body.iter().cloned());
            lines.push(format!("}} > {}", single_quote(path)));
            lines
        }
    }
}

/// Resolve `name` within `blocks` and assemble the full script for it.
pub fn collect_required_code(
    blocks: &BlockSet,
    name: &str,
    counter: &UniqueCounter,
) -> Result<Vec<String>> {
    let order = resolve(blocks, name)?;
    Assembler::new(counter).assemble(&order)
}

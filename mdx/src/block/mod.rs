pub mod call;

use std::fmt;
use std::ops::Range;

/// What a block's body means to the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// Shell source, emitted verbatim.
    Bash,
    /// `key: value` lines exported as shell variables.
    Vars,
    /// Literal data written out through a here-document.
    Yaml,
}

impl BlockType {
    /// Map a fence language tag to a block type. Unknown languages are shell.
    pub fn from_language(language: &str) -> Self {
        match language.to_ascii_lowercase().as_str() {
            "vars" => BlockType::Vars,
            "yaml" | "yml" => BlockType::Yaml,
            _ => BlockType::Bash,
        }
    }
}

/// The three syntactic forms a block name can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameForm {
    /// `name`: an executable block.
    Plain,
    /// `[name]`: a variable-export block.
    Bracketed,
    /// `(name)`: a literal-data block rendered as a here-document.
    Parenthesized,
}

impl NameForm {
    pub fn of(name: &str) -> Self {
        if name.len() >= 2 && name.starts_with('[') && name.ends_with(']') {
            NameForm::Bracketed
        } else if name.len() >= 2 && name.starts_with('(') && name.ends_with(')') {
            NameForm::Parenthesized
        } else {
            NameForm::Plain
        }
    }
}

/// Strip the `[...]` or `(...)` wrapper from a block name.
pub fn strip_name_form(name: &str) -> &str {
    match NameForm::of(name) {
        NameForm::Plain => name,
        NameForm::Bracketed | NameForm::Parenthesized => &name[1..name.len() - 1],
    }
}

/// One end of a redirection: a shell variable (`$name`) or a file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stream {
    Variable(String),
    File(String),
}

impl Stream {
    /// Parse the text following `<` or `>`. A leading `$` selects a variable.
    pub fn parse(text: &str) -> Option<Self> {
        match text.strip_prefix('$') {
            Some("") => None,
            Some(var) => Some(Stream::Variable(var.to_string())),
            None if text.is_empty() => None,
            None => Some(Stream::File(text.to_string())),
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Variable(name) => write!(f, "${}", name),
            Stream::File(path) => write!(f, "{}", path),
        }
    }
}

/// A named fenced code block: the unit of dependency resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Unique within a document; may be in `[name]` or `(name)` form.
    pub name: String,
    /// Display name; the block name unless the fence sets one.
    pub title: String,
    pub block_type: BlockType,
    /// Source lines, without line terminators.
    pub body: Vec<String>,
    /// Explicitly required block names in order of first mention.
    pub reqs: Vec<String>,
    /// Raw call expression including its parentheses, e.g. `(target <in >$out)`.
    pub call: Option<String>,
    /// Where the block's output is captured.
    pub stdout: Option<Stream>,
    /// Enclosing level 1-3 headings, outermost first.
    pub headings: Vec<String>,
    pub hidden: bool,
    pub disabled: bool,
    /// Byte span of the fence in the source.
    pub span: Range<usize>,
}

impl Block {
    /// A bare shell block; the starting point for hand-built documents.
    pub fn new(name: impl Into<String>, body: &[&str]) -> Self {
        let name = name.into();
        let block_type = match NameForm::of(&name) {
            NameForm::Bracketed => BlockType::Vars,
            NameForm::Parenthesized => BlockType::Yaml,
            NameForm::Plain => BlockType::Bash,
        };
        Block {
            title: name.clone(),
            name,
            block_type,
            body: body.iter().map(|line| line.to_string()).collect(),
            reqs: Vec::new(),
            call: None,
            stdout: None,
            headings: Vec::new(),
            hidden: false,
            disabled: false,
            span: 0..0,
        }
    }

    pub fn with_reqs(mut self, reqs: &[&str]) -> Self {
        for req in reqs {
            self.add_req(req);
        }
        self
    }

    pub fn with_call(mut self, call: impl Into<String>) -> Self {
        self.call = Some(call.into());
        self
    }

    pub fn with_stdout(mut self, stdout: Stream) -> Self {
        self.stdout = Some(stdout);
        self
    }

    /// Add a requirement unless it is already listed.
    pub fn add_req(&mut self, name: &str) {
        if !self.reqs.iter().any(|r| r == name) {
            self.reqs.push(name.to_string());
        }
    }

    pub fn name_form(&self) -> NameForm {
        NameForm::of(&self.name)
    }

    /// Literal-data blocks are emitted as here-documents.
    pub fn is_literal(&self) -> bool {
        self.name_form() == NameForm::Parenthesized || self.block_type == BlockType::Yaml
    }

    pub fn is_vars(&self) -> bool {
        self.name_form() == NameForm::Bracketed || self.block_type == BlockType::Vars
    }
}

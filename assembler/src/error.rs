use mdx::block::call::CallError;
use thiserror::Error;

/// Failures that abort resolving or assembling a document's script.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error("undefined block `{name}` required by `{referrer}`")]
    UnresolvedReference { name: String, referrer: String },

    #[error("no block named `{0}`")]
    NoSuchBlock(String),

    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("malformed call in block `{block}`: {source}")]
    MalformedCall {
        block: String,
        #[source]
        source: CallError,
    },

    #[error("duplicate block name `{0}`")]
    DuplicateBlock(String),

    #[error("call targets `{first}` and `{second}` both become shell function `{function}`")]
    FunctionNameClash {
        function: String,
        first: String,
        second: String,
    },
}

pub type Result<T> = std::result::Result<T, AssembleError>;

pub mod assemble;
pub mod error;
pub mod expansion;
pub mod registry;
pub mod resolver;
pub mod shell;

pub use assemble::{Assembler, collect_required_code};
pub use error::AssembleError;
pub use expansion::{
    BatchExpansion, Expansion, NewVariable, ParamSpec, Unique, UniqueCounter, expand_parameter,
    expand_parameters,
};
pub use registry::BlockSet;
pub use resolver::{Resolved, recursively_required_names, resolve};

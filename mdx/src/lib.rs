pub mod block;
pub mod parser;

use crate::block::Block;

/// The named code blocks of one parsed markdown document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Fenced code blocks in encounter order.
    pub blocks: Vec<Block>,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}

impl Document {
    pub fn get(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

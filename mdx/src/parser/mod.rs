pub mod error;
mod fence;

pub use error::ParseError;

use crate::Document;

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
    hide_literal_blocks: bool,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser {
            source,
            file_id,
            hide_literal_blocks: true,
        }
    }

    /// Whether `(name)` blocks are hidden when the fence does not say so.
    pub fn hide_literal_blocks(mut self, hide: bool) -> Self {
        self.hide_literal_blocks = hide;
        self
    }

    /// Scan the markdown source for fenced code blocks.
    pub fn parse(&self) -> Result<Document, Vec<ParseError>> {
        let blocks = fence::parse_blocks(&self.source, self.file_id, self.hide_literal_blocks)?;
        Ok(Document {
            blocks,
            source_id: self.file_id,
        })
    }
}

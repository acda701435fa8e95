use std::collections::HashMap;

use mdx::block::Block;

use crate::error::{AssembleError, Result};

/// All blocks of one document, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct BlockSet {
    blocks: Vec<Block>,
    index: HashMap<String, usize>,
}

impl BlockSet {
    /// Index blocks by name. Names must be unique.
    pub fn new(blocks: Vec<Block>) -> Result<Self> {
        let mut index = HashMap::with_capacity(blocks.len());
        for (pos, block) in blocks.iter().enumerate() {
            if index.insert(block.name.clone(), pos).is_some() {
                return Err(AssembleError::DuplicateBlock(block.name.clone()));
            }
        }
        Ok(BlockSet { blocks, index })
    }

    pub fn from_document(document: &mdx::Document) -> Result<Self> {
        Self::new(document.blocks.clone())
    }

    pub fn get(&self, name: &str) -> Option<&Block> {
        self.index.get(name).map(|&pos| &self.blocks[pos])
    }

    /// Case-insensitive block lookup. Tries exact match first, then case-insensitive.
    pub fn get_entry(&self, name: &str) -> Option<&Block> {
        self.get(name).or_else(|| {
            let lower = name.to_lowercase();
            self.blocks.iter().find(|b| b.name.to_lowercase() == lower)
        })
    }

    /// Blocks in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Blocks a menu would show: not hidden.
    pub fn visible(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| !b.hidden)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let err = BlockSet::new(vec![Block::new("a", &[]), Block::new("a", &[])]).unwrap_err();
        assert_eq!(err, AssembleError::DuplicateBlock("a".into()));
    }

    #[test]
    fn entry_lookup_ignores_case() {
        let set = BlockSet::new(vec![Block::new("Deploy", &[]), Block::new("deploy", &[])]).unwrap();
        assert_eq!(set.get_entry("deploy").unwrap().name, "deploy");
        assert_eq!(set.get_entry("DEPLOY").unwrap().name, "Deploy");
        assert!(set.get_entry("missing").is_none());
    }

    #[test]
    fn hidden_blocks_are_not_visible() {
        let mut hidden = Block::new("(data)", &[]);
        hidden.hidden = true;
        let set = BlockSet::new(vec![hidden, Block::new("run", &[])]).unwrap();
        let names: Vec<&str> = set.visible().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["run"]);
        assert_eq!(set.len(), 2);
    }
}

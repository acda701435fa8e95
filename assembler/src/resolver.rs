use std::collections::HashSet;

use mdx::block::Block;
use mdx::block::call::{CallBinding, parse_call};
use tracing::{debug, trace};

use crate::error::{AssembleError, Result};
use crate::registry::BlockSet;

/// A block in resolution order, with its call expression parsed.
#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    pub block: &'a Block,
    pub call: Option<CallBinding>,
}

impl Resolved<'_> {
    pub fn name(&self) -> &str {
        &self.block.name
    }
}

/// Bookkeeping for one depth-first walk.
#[derive(Default)]
struct Walk<'a> {
    /// Blocks whose dependencies are being resolved, outermost first.
    visiting: Vec<String>,
    visited: HashSet<String>,
    order: Vec<Resolved<'a>>,
}

/// Every block `start` needs, dependencies first, each exactly once, ending
/// with `start` itself.
pub fn resolve<'a>(blocks: &'a BlockSet, start: &str) -> Result<Vec<Resolved<'a>>> {
    let block = blocks
        .get(start)
        .ok_or_else(|| AssembleError::NoSuchBlock(start.to_string()))?;

    let mut walk = Walk::default();
    visit(blocks, block, &mut walk)?;
    debug!(start, blocks = walk.order.len(), "resolved dependencies");
    Ok(walk.order)
}

/// The transitive closure of `reqs`, dependencies first, without a root block.
pub fn recursively_required_names(blocks: &BlockSet, reqs: &[String]) -> Result<Vec<String>> {
    let mut walk = Walk::default();
    for name in reqs {
        let block = blocks
            .get(name)
            .ok_or_else(|| AssembleError::NoSuchBlock(name.clone()))?;
        visit(blocks, block, &mut walk)?;
    }
    Ok(walk
        .order
        .into_iter()
        .map(|resolved| resolved.block.name.clone())
        .collect())
}

fn visit<'a>(blocks: &'a BlockSet, block: &'a Block, walk: &mut Walk<'a>) -> Result<()> {
    if walk.visited.contains(&block.name) {
        return Ok(());
    }
    if let Some(pos) = walk.visiting.iter().position(|name| *name == block.name) {
        let mut path = walk.visiting[pos..].to_vec();
        path.push(block.name.clone());
        return Err(AssembleError::Cycle { path });
    }

    let call = block
        .call
        .as_deref()
        .map(parse_call)
        .transpose()
        .map_err(|source| AssembleError::MalformedCall {
            block: block.name.clone(),
            source,
        })?;

    walk.visiting.push(block.name.clone());

    let call_target = call.as_ref().map(|c| &c.target_name);
    for dep in block.reqs.iter().chain(call_target) {
        trace!(block = %block.name, requires = %dep, "dependency");
        let required = blocks
            .get(dep)
            .ok_or_else(|| AssembleError::UnresolvedReference {
                name: dep.clone(),
                referrer: block.name.clone(),
            })?;
        visit(blocks, required, walk)?;
    }

    walk.visiting.pop();
    walk.visited.insert(block.name.clone());
    walk.order.push(Resolved { block, call });
    Ok(())
}

//! Nested control-region tracking for one function.
//!
//! Wasm control flow is structured; the generated C++ is labelled gotos.
//! Each active `block`/`loop`/`if` gets a frame holding its label id, its
//! return slot (for value-typed blocks) and its own [`StackVars`] scope.
//! Branch depths resolve against this stack; a depth beyond the outermost
//! frame means "function return".

use anyhow::{bail, Result};
use wasmparser::ValType;

use crate::codegen::stack::{StackVars, TempVars};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Block,
    Loop,
    If,
}

/// One active control region.
#[derive(Debug)]
pub struct Block {
    pub kind: BlockKind,
    /// Label id; rendered as `label<id>` in the output.
    pub id: u32,
    /// Return-slot variable, present iff the block has a result type.
    pub ret: Option<(String, ValType)>,
    /// Operand stack scoped to this region.
    pub stack: StackVars,
}

/// The frame a branch resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchTarget {
    /// Jump to `label<id>`, assigning the target's return slot first when
    /// the branch carries a value (never the case for loop heads).
    Label { id: u32, ret: Option<String> },
    /// The depth leaves the outermost frame: return from the function.
    FunctionExit,
}

#[derive(Debug)]
pub struct BlockStack {
    root: StackVars,
    blocks: Vec<Block>,
    next_id: u32,
    next_group: u32,
    pub temps: TempVars,
    tmp_indent: u32,
}

impl BlockStack {
    pub fn new() -> Self {
        BlockStack {
            // Group 0 is reserved for temporaries; the function root is 1.
            root: StackVars::new(1),
            blocks: Vec::new(),
            next_id: 0,
            next_group: 2,
            temps: TempVars::default(),
            tmp_indent: 0,
        }
    }

    /// Open a new region and return its label id.
    pub fn push_block(&mut self, kind: BlockKind, ret: Option<(String, ValType)>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let group = self.next_group;
        self.next_group += 1;
        self.blocks.push(Block {
            kind,
            id,
            ret,
            stack: StackVars::new(group),
        });
        id
    }

    pub fn pop_block(&mut self) -> Result<Block> {
        match self.blocks.pop() {
            Some(b) => Ok(b),
            None => bail!("control stack underflow"),
        }
    }

    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    pub fn innermost(&mut self) -> Option<&mut Block> {
        self.blocks.last_mut()
    }

    /// Resolve a `br`-style relative depth to its target frame.
    pub fn peep_block_level(&self, level: u32) -> BranchTarget {
        let level = level as usize;
        if level >= self.blocks.len() {
            return BranchTarget::FunctionExit;
        }
        let block = &self.blocks[self.blocks.len() - 1 - level];
        // Branches to a loop target its head, which takes no value.
        let ret = if block.kind == BlockKind::Loop {
            None
        } else {
            block.ret.as_ref().map(|(name, _)| name.clone())
        };
        BranchTarget::Label { id: block.id, ret }
    }

    /// The operand stack of the innermost open region.
    pub fn scope(&mut self) -> &mut StackVars {
        match self.blocks.last_mut() {
            Some(b) => &mut b.stack,
            None => &mut self.root,
        }
    }

    /// [`StackVars::peep`] on the innermost scope, with access to the
    /// shared temporary allocator.
    pub fn peep(&mut self, indent: &str) -> Result<(Vec<String>, String)> {
        let BlockStack {
            root,
            blocks,
            temps,
            ..
        } = self;
        let scope = match blocks.last_mut() {
            Some(b) => &mut b.stack,
            None => root,
        };
        scope.peep(temps, indent)
    }

    /// Materialise, across every open scope, raw expressions that a
    /// following statement would invalidate. Only the top of the innermost
    /// scope is exempt (it is consumed by that statement).
    pub fn flush_exprs_if_needed(&mut self, keyword: &str, indent: &str) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        if !self.blocks.is_empty() {
            lines.extend(self.root.flush_enclosing(keyword, indent)?);
            let innermost = self.blocks.len() - 1;
            for block in &mut self.blocks[..innermost] {
                lines.extend(block.stack.flush_enclosing(keyword, indent)?);
            }
        }
        lines.extend(self.scope().flush_if_needed(keyword, indent)?);
        Ok(lines)
    }

    /// Count of enclosing `if` frames plus the temporary indent, i.e. how
    /// many extra indent levels the current line renders with.
    pub fn indent_level(&self) -> u32 {
        self.blocks
            .iter()
            .filter(|b| b.kind == BlockKind::If)
            .count() as u32
            + self.tmp_indent
    }

    /// Extra indent for the body of a short `if`/`else`/`br_if` region.
    pub fn push_temp_indent(&mut self) {
        self.tmp_indent += 1;
    }

    pub fn pop_temp_indent(&mut self) {
        debug_assert!(self.tmp_indent > 0);
        self.tmp_indent = self.tmp_indent.saturating_sub(1);
    }
}

impl Default for BlockStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_fresh_per_block() {
        let mut bs = BlockStack::new();
        let a = bs.push_block(BlockKind::Block, None);
        let b = bs.push_block(BlockKind::Loop, None);
        assert_ne!(a, b);
        assert_eq!(bs.depth(), 2);
    }

    #[test]
    fn branch_depths_resolve_inside_out() {
        let mut bs = BlockStack::new();
        let outer = bs.push_block(BlockKind::Block, None);
        let inner = bs.push_block(BlockKind::Loop, None);
        assert_eq!(
            bs.peep_block_level(0),
            BranchTarget::Label {
                id: inner,
                ret: None
            }
        );
        assert_eq!(
            bs.peep_block_level(1),
            BranchTarget::Label {
                id: outer,
                ret: None
            }
        );
        assert_eq!(bs.peep_block_level(2), BranchTarget::FunctionExit);
    }

    #[test]
    fn branches_to_loops_never_carry_the_result_slot() {
        let mut bs = BlockStack::new();
        bs.push_block(
            BlockKind::Block,
            Some(("stack2_0_".to_string(), ValType::I32)),
        );
        bs.push_block(
            BlockKind::Loop,
            Some(("stack3_0_".to_string(), ValType::I32)),
        );
        assert!(matches!(
            bs.peep_block_level(0),
            BranchTarget::Label { ret: None, .. }
        ));
        assert!(matches!(
            bs.peep_block_level(1),
            BranchTarget::Label { ret: Some(ref r), .. } if r == "stack2_0_"
        ));
    }

    #[test]
    fn indent_counts_if_frames_only() {
        let mut bs = BlockStack::new();
        bs.push_block(BlockKind::Block, None);
        assert_eq!(bs.indent_level(), 0);
        bs.push_block(BlockKind::If, None);
        assert_eq!(bs.indent_level(), 1);
        bs.push_temp_indent();
        assert_eq!(bs.indent_level(), 2);
        bs.pop_temp_indent();
        bs.pop_block().unwrap();
        assert_eq!(bs.indent_level(), 0);
    }

    #[test]
    fn scope_falls_back_to_the_root() {
        let mut bs = BlockStack::new();
        bs.scope().push_expr("local0_", ValType::I32);
        bs.push_block(BlockKind::Block, None);
        assert!(bs.scope().is_empty());
        bs.pop_block().unwrap();
        assert_eq!(bs.scope().len(), 1);
    }

    #[test]
    fn flush_reaches_outer_scopes() {
        let mut bs = BlockStack::new();
        bs.scope().push_expr("mem_->LoadInt32(0)", ValType::I32);
        bs.push_block(BlockKind::Block, None);
        bs.scope().push_expr("local0_", ValType::I32);
        let lines = bs.flush_exprs_if_needed("mem_->", "\t").unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("mem_->LoadInt32(0)"));
    }
}

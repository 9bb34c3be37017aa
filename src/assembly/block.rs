//! Basic block view over an instruction stream.
//!
//! Blocks are built from an already-decoded stream, so splitting is a matter of finding
//! leaders: the first instruction, every branch target, and every instruction that follows a
//! branch, `ret` or `throw`. Blocks are kept in physical order and `id` equals the block's
//! position in the vector that owns it.
//!
//! The stream can be turned back into a flat sequence with [`flatten_blocks`], and any stream
//! that had instructions removed or replaced gets valid offsets back from
//! [`renumber_offsets`].

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{
    assembly::{FlowType, Instruction},
    Result,
};

/// A straight-line run of instructions with a single entry.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Position of this block in its owning vector
    pub id: usize,
    /// Offset of the block's first instruction when the view was built
    pub offset: u64,
    /// The instructions of this block
    pub instructions: Vec<Instruction>,
    /// Ids of blocks control can flow to from the end of this block
    pub successors: Vec<usize>,
}

impl BasicBlock {
    /// Creates an empty block
    #[must_use]
    pub fn new(id: usize, offset: u64) -> Self {
        BasicBlock {
            id,
            offset,
            instructions: Vec::new(),
            successors: Vec::new(),
        }
    }

    /// Total encoded size of the block's instructions
    #[must_use]
    pub fn size(&self) -> u64 {
        self.instructions.iter().map(|instr| instr.size).sum()
    }

    /// The last instruction of the block
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last()
    }
}

/// Splits an instruction stream into basic blocks and wires their successor edges.
///
/// Branch targets that do not land on an instruction boundary inside the stream are ignored
/// for splitting and produce no edge.
#[must_use]
pub fn build_blocks(instructions: &[Instruction]) -> Vec<BasicBlock> {
    if instructions.is_empty() {
        return Vec::new();
    }

    let index_of: HashMap<u64, usize> = instructions
        .iter()
        .enumerate()
        .map(|(idx, instr)| (instr.offset, idx))
        .collect();

    let mut leaders = HashSet::new();
    leaders.insert(0usize);
    for (idx, instr) in instructions.iter().enumerate() {
        for target in instr.branch_targets() {
            if let Some(&target_idx) = index_of.get(&target) {
                leaders.insert(target_idx);
            }
        }
        if instr.is_terminal() && idx + 1 < instructions.len() {
            leaders.insert(idx + 1);
        }
    }

    let mut blocks: Vec<BasicBlock> = Vec::new();
    for (idx, instr) in instructions.iter().enumerate() {
        if leaders.contains(&idx) {
            blocks.push(BasicBlock::new(blocks.len(), instr.offset));
        }
        if let Some(block) = blocks.last_mut() {
            block.instructions.push(instr.clone());
        }
    }

    let block_at: HashMap<u64, usize> = blocks.iter().map(|b| (b.offset, b.id)).collect();
    let count = blocks.len();
    for block in &mut blocks {
        let Some(last) = block.instructions.last() else {
            continue;
        };
        let mut targets: Vec<usize> = Vec::new();
        for target in last.branch_targets() {
            if let Some(&id) = block_at.get(&target) {
                if !targets.contains(&id) {
                    targets.push(id);
                }
            }
        }
        let next = (block.id + 1 < count).then_some(block.id + 1);

        block.successors = match last.flow_type {
            FlowType::UnconditionalBranch | FlowType::Leave => targets,
            FlowType::ConditionalBranch | FlowType::Switch => {
                if let Some(next) = next {
                    if !targets.contains(&next) {
                        targets.push(next);
                    }
                }
                targets
            }
            FlowType::Return | FlowType::Throw | FlowType::EndFinally => Vec::new(),
            FlowType::Sequential | FlowType::Call => next.into_iter().collect(),
        };
    }

    blocks
}

/// Drops every block that cannot be reached from the entry block.
///
/// Surviving blocks keep their physical order; ids and successor lists are renumbered to
/// match their new positions.
#[must_use]
pub fn remove_dead_blocks(blocks: Vec<BasicBlock>) -> Vec<BasicBlock> {
    if blocks.is_empty() {
        return blocks;
    }

    let mut reachable = vec![false; blocks.len()];
    let mut queue = VecDeque::from([0usize]);
    reachable[0] = true;
    while let Some(id) = queue.pop_front() {
        for &succ in &blocks[id].successors {
            if succ < blocks.len() && !reachable[succ] {
                reachable[succ] = true;
                queue.push_back(succ);
            }
        }
    }

    let mut new_id = vec![usize::MAX; blocks.len()];
    let mut next = 0;
    for (old, alive) in reachable.iter().enumerate() {
        if *alive {
            new_id[old] = next;
            next += 1;
        }
    }

    blocks
        .into_iter()
        .zip(reachable)
        .filter_map(|(mut block, alive)| {
            if !alive {
                return None;
            }
            block.id = new_id[block.id];
            block.successors = block.successors.iter().map(|&s| new_id[s]).collect();
            Some(block)
        })
        .collect()
}

/// Concatenates blocks into one stream with fresh, contiguous offsets starting at 0.
///
/// Every branch must target the start of one of the given blocks; its target is moved to
/// that block's new start.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a branch targets something other than a block start.
pub fn flatten_blocks(blocks: &[BasicBlock]) -> Result<Vec<Instruction>> {
    let mut relocated = HashMap::with_capacity(blocks.len());
    let mut cursor = 0u64;
    for block in blocks {
        relocated.insert(block.offset, cursor);
        cursor += block.size();
    }

    let mut flat = Vec::with_capacity(blocks.iter().map(|b| b.instructions.len()).sum());
    let mut cursor = 0u64;
    for block in blocks {
        for instr in &block.instructions {
            let mut instr = instr.clone();
            let offset = cursor;
            instr.offset = offset;
            cursor += instr.size;

            for target in instr.branch_targets_mut() {
                let Some(&new_target) = relocated.get(&*target) else {
                    return Err(malformed_error!(
                        "Branch at IL_{:04x} in block {} targets IL_{:04x}, which starts no block",
                        offset,
                        block.id,
                        *target
                    ));
                };
                *target = new_target;
            }
            flat.push(instr);
        }
    }

    Ok(flat)
}

/// Recomputes offsets after structural edits.
///
/// Offsets are reassigned sequentially from 0 using each instruction's size. Every jump
/// target is remapped, including `leave` and each entry of a `switch` table. A branch whose
/// old target no longer exists is redirected to the first surviving instruction at or after
/// that target, which is where control would have fallen through to. Existing offsets must be
/// non-decreasing, which holds as long as replacements inherit the offset of what they replace.
pub fn renumber_offsets(instructions: &mut [Instruction]) {
    let old_offsets: Vec<u64> = instructions.iter().map(|instr| instr.offset).collect();

    let mut new_offsets = Vec::with_capacity(instructions.len());
    let mut cursor = 0u64;
    for instr in instructions.iter_mut() {
        new_offsets.push(cursor);
        instr.offset = cursor;
        cursor += instr.size;
    }
    let end = cursor;

    for instr in instructions.iter_mut() {
        for target in instr.branch_targets_mut() {
            let idx = old_offsets.partition_point(|&offset| offset < *target);
            *target = new_offsets.get(idx).copied().unwrap_or(end);
        }
    }
}

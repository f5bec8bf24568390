use std::collections::VecDeque;

use jflow_ast::TreeId;
use la_arena::{Arena, ArenaMap, Idx, RawIdx};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::cfg::block::{Block, BlockId, BlockKind, EdgeSlot, RegularBlock};
use crate::cfg::node::{Node, NodeId, SyntheticId, SyntheticLocal};
use crate::error::InvariantViolation;

/// The tree a graph was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnderlyingAst {
    /// A method declaration; only its body is part of the graph.
    Method { method: TreeId, body: TreeId },
    /// Any other statement or expression.
    Arbitrary { code: TreeId },
}

impl UnderlyingAst {
    /// The tree that was lowered.
    pub fn code(self) -> TreeId {
        match self {
            Self::Method { body, .. } => body,
            Self::Arbitrary { code } => code,
        }
    }
}

/// A control-flow graph over computation nodes.
///
/// Blocks are stored in breadth-first order from the entry block, followed by
/// whichever exit blocks are unreachable. Both exits are always present, so a
/// method that can only complete abruptly still has a regular exit.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub(crate) blocks: Arena<Block>,
    pub(crate) nodes: Arena<Node>,
    pub(crate) entry: BlockId,
    pub(crate) regular_exit: BlockId,
    pub(crate) exceptional_exit: BlockId,
    pub(crate) tree_lookup: FxHashMap<TreeId, NodeId>,
    pub(crate) return_nodes: Vec<NodeId>,
    pub(crate) synthetic_locals: Arena<SyntheticLocal>,
    pub(crate) declared_classes: Vec<TreeId>,
    pub(crate) underlying: UnderlyingAst,
}

impl ControlFlowGraph {
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn regular_exit(&self) -> BlockId {
        self.regular_exit
    }

    pub fn exceptional_exit(&self) -> BlockId {
        self.exceptional_exit
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    pub fn blocks(&self) -> impl ExactSizeIterator<Item = (BlockId, &Block)> + '_ {
        self.blocks.iter()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// All nodes the builder created, including those in pruned blocks.
    pub fn nodes(&self) -> impl ExactSizeIterator<Item = (NodeId, &Node)> + '_ {
        self.nodes.iter()
    }

    /// The node that computes the value of `tree`, after any conversion.
    /// For an assignment target this is the target node itself, even when
    /// a compound assignment converts it.
    pub fn node_for_tree(&self, tree: TreeId) -> Option<NodeId> {
        self.tree_lookup.get(&tree).copied()
    }

    /// The `return` nodes of the method, in source order.
    pub fn return_nodes(&self) -> &[NodeId] {
        &self.return_nodes
    }

    pub fn synthetic_local(&self, id: SyntheticId) -> &SyntheticLocal {
        &self.synthetic_locals[id]
    }

    pub fn synthetic_locals(&self) -> impl Iterator<Item = (SyntheticId, &SyntheticLocal)> + '_ {
        self.synthetic_locals.iter()
    }

    /// Local class declarations met while lowering; they are not part of the
    /// graph and need separate analysis.
    pub fn declared_classes(&self) -> &[TreeId] {
        &self.declared_classes
    }

    pub fn underlying_ast(&self) -> UnderlyingAst {
        self.underlying
    }

    pub fn successors(&self, id: BlockId) -> SmallVec<[BlockId; 2]> {
        self.blocks[id].successors()
    }

    pub fn predecessors(&self, id: BlockId) -> &FxHashSet<BlockId> {
        &self.blocks[id].predecessors
    }

    /// The block containing `node`, if the block is still part of the graph.
    pub fn block_of(&self, node: NodeId) -> Option<BlockId> {
        self.blocks
            .iter()
            .find(|(_, block)| block.nodes().contains(&node))
            .map(|(id, _)| id)
    }

    pub(crate) fn set_edge(&mut self, source: BlockId, slot: EdgeSlot, target: BlockId) {
        if let Some(previous) = self.blocks[source].set_edge(slot, target) {
            if previous != target && !self.blocks[source].successors().contains(&previous) {
                self.blocks[previous].predecessors.remove(&source);
            }
        }
        self.blocks[target].predecessors.insert(source);
    }

    pub(crate) fn add_exceptional_edge(&mut self, source: BlockId, index: usize, target: BlockId) {
        self.blocks[source].add_exceptional(index, target);
        self.blocks[target].predecessors.insert(source);
    }

    /// Replaces every edge from `source` to `old` with an edge to `new`.
    pub(crate) fn redirect(&mut self, source: BlockId, old: BlockId, new: BlockId) {
        self.blocks[source].retarget(old, new);
        self.blocks[old].predecessors.remove(&source);
        self.blocks[new].predecessors.insert(source);
    }

    /// Blocks reachable from the entry, in breadth-first order.
    pub(crate) fn reachable(&self) -> Vec<BlockId> {
        let mut seen = FxHashSet::default();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([self.entry]);
        seen.insert(self.entry);
        while let Some(block) = queue.pop_front() {
            order.push(block);
            for successor in self.blocks[block].successors() {
                if seen.insert(successor) {
                    queue.push_back(successor);
                }
            }
        }
        order
    }

    /// Checks that every reachable block other than the exits has somewhere
    /// to go.
    pub(crate) fn check_successors(&self) -> Result<(), InvariantViolation> {
        for block in self.reachable() {
            let complete = match &self.blocks[block].kind {
                BlockKind::Regular(regular) => regular.successor.is_some(),
                BlockKind::Conditional(conditional) => {
                    conditional.then_successor.is_some() && conditional.else_successor.is_some()
                }
                // A terminating node only has exceptional successors.
                BlockKind::Exceptional(_) => true,
                BlockKind::Special(special) => {
                    block == self.regular_exit
                        || block == self.exceptional_exit
                        || special.successor.is_some()
                }
            };
            if !complete {
                return Err(InvariantViolation::MissingSuccessor(raw(block)));
            }
        }
        Ok(())
    }

    /// Drops unreachable blocks and renumbers the rest in breadth-first order
    /// from the entry. The exit blocks are kept even when unreachable.
    pub(crate) fn compact(&mut self) {
        let mut order = self.reachable();
        for exit in [self.regular_exit, self.exceptional_exit] {
            if !order.contains(&exit) {
                order.push(exit);
            }
        }

        let mut renumber: ArenaMap<BlockId, BlockId> = ArenaMap::default();
        for (index, old) in order.iter().enumerate() {
            renumber.insert(*old, block_id(index));
        }

        let mut old_blocks = std::mem::take(&mut self.blocks);
        let mut blocks = Arena::default();
        for old in &order {
            let placeholder = Block::new(BlockKind::Regular(RegularBlock::default()));
            let mut block = std::mem::replace(&mut old_blocks[*old], placeholder);
            for successor in block.successors_mut() {
                if let Some(new) = renumber.get(*successor) {
                    *successor = *new;
                }
            }
            block.predecessors = block
                .predecessors
                .iter()
                .filter_map(|predecessor| renumber.get(*predecessor).copied())
                .collect();
            blocks.alloc(block);
        }

        self.entry = renumber[self.entry];
        self.regular_exit = renumber[self.regular_exit];
        self.exceptional_exit = renumber[self.exceptional_exit];
        self.blocks = blocks;
    }
}

pub(crate) fn raw(id: BlockId) -> u32 {
    u32::from(id.into_raw())
}

pub(crate) fn block_id(index: usize) -> BlockId {
    Idx::from_raw(RawIdx::from(u32::try_from(index).unwrap_or(u32::MAX)))
}

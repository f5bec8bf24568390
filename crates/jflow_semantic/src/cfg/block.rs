//! Basic blocks.
use jflow_ast::Type;
use la_arena::Idx;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::cfg::node::NodeId;

pub type BlockId = Idx<Block>;

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    /// Every block with an edge to this one, kept in sync with the
    /// successors of those blocks.
    pub(crate) predecessors: FxHashSet<BlockId>,
}

impl Block {
    pub(crate) fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            predecessors: FxHashSet::default(),
        }
    }

    pub fn predecessors(&self) -> &FxHashSet<BlockId> {
        &self.predecessors
    }

    /// The computation nodes of the block, in evaluation order.
    pub fn nodes(&self) -> &[NodeId] {
        match &self.kind {
            BlockKind::Regular(block) => &block.nodes,
            BlockKind::Exceptional(block) => std::slice::from_ref(&block.node),
            BlockKind::Conditional(_) | BlockKind::Special(_) => &[],
        }
    }

    /// Every outgoing edge target. Duplicates are kept, e.g. a conditional
    /// block whose branches coincide lists the target twice.
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        let mut successors = SmallVec::new();
        match &self.kind {
            BlockKind::Regular(RegularBlock { successor, .. })
            | BlockKind::Special(SpecialBlock { successor, .. }) => successors.extend(*successor),
            BlockKind::Conditional(block) => {
                successors.extend(block.then_successor);
                successors.extend(block.else_successor);
            }
            BlockKind::Exceptional(block) => {
                successors.extend(block.successor);
                for (_, targets) in &block.exceptional_successors {
                    successors.extend(targets.iter().copied());
                }
            }
        }
        successors
    }

    pub(crate) fn successors_mut(&mut self) -> Vec<&mut BlockId> {
        match &mut self.kind {
            BlockKind::Regular(RegularBlock { successor, .. })
            | BlockKind::Special(SpecialBlock { successor, .. }) => successor.iter_mut().collect(),
            BlockKind::Conditional(block) => block
                .then_successor
                .iter_mut()
                .chain(block.else_successor.iter_mut())
                .collect(),
            BlockKind::Exceptional(block) => block
                .successor
                .iter_mut()
                .chain(
                    block
                        .exceptional_successors
                        .iter_mut()
                        .flat_map(|(_, targets)| targets.iter_mut()),
                )
                .collect(),
        }
    }

    /// Points a single-target edge slot at `target`, returning the previous
    /// target. Exceptional edges are added with [`Block::add_exceptional`].
    pub(crate) fn set_edge(&mut self, slot: EdgeSlot, target: BlockId) -> Option<BlockId> {
        let edge = match (&mut self.kind, slot) {
            (BlockKind::Regular(RegularBlock { successor, .. }), EdgeSlot::Successor)
            | (BlockKind::Special(SpecialBlock { successor, .. }), EdgeSlot::Successor)
            | (BlockKind::Exceptional(ExceptionalBlock { successor, .. }), EdgeSlot::Successor) => {
                successor
            }
            (BlockKind::Conditional(block), EdgeSlot::Then) => &mut block.then_successor,
            (BlockKind::Conditional(block), EdgeSlot::Else) => &mut block.else_successor,
            _ => return None,
        };
        edge.replace(target)
    }

    pub(crate) fn add_exceptional(&mut self, index: usize, target: BlockId) {
        if let BlockKind::Exceptional(block) = &mut self.kind {
            if let Some((_, targets)) = block.exceptional_successors.get_mut(index) {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
    }

    /// Replaces every edge to `old` with an edge to `new`.
    pub(crate) fn retarget(&mut self, old: BlockId, new: BlockId) {
        let replace = |edge: &mut Option<BlockId>| {
            if *edge == Some(old) {
                *edge = Some(new);
            }
        };
        match &mut self.kind {
            BlockKind::Regular(RegularBlock { successor, .. })
            | BlockKind::Special(SpecialBlock { successor, .. }) => replace(successor),
            BlockKind::Conditional(block) => {
                replace(&mut block.then_successor);
                replace(&mut block.else_successor);
            }
            BlockKind::Exceptional(block) => {
                replace(&mut block.successor);
                for (_, targets) in &mut block.exceptional_successors {
                    if targets.contains(&old) {
                        targets.retain(|target| *target != old);
                        if !targets.contains(&new) {
                            targets.push(new);
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, is_macro::Is)]
pub enum BlockKind {
    Regular(RegularBlock),
    Conditional(ConditionalBlock),
    Exceptional(ExceptionalBlock),
    Special(SpecialBlock),
}

/// A straight-line run of computation nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegularBlock {
    pub nodes: Vec<NodeId>,
    pub successor: Option<BlockId>,
}

/// A two-way branch on the boolean computed just before it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionalBlock {
    pub then_successor: Option<BlockId>,
    pub else_successor: Option<BlockId>,
}

/// A single node that may raise exceptions.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionalBlock {
    pub node: NodeId,
    /// Where execution continues if the node completes normally. `None` for
    /// nodes that always terminate execution.
    pub successor: Option<BlockId>,
    /// For each exception type the node may raise, the blocks that may
    /// handle it.
    pub exceptional_successors: Vec<(Type, SmallVec<[BlockId; 2]>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpecialBlock {
    pub kind: SpecialBlockKind,
    pub successor: Option<BlockId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialBlockKind {
    Entry,
    Exit,
    ExceptionalExit,
}

/// A single-target outgoing edge of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum EdgeSlot {
    Successor,
    Then,
    Else,
}

//! Phase two: cutting the extended node sequence into basic blocks.
use la_arena::Arena;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::cfg::block::{
    Block, BlockId, BlockKind, ConditionalBlock, EdgeSlot, ExceptionalBlock, RegularBlock,
    SpecialBlock, SpecialBlockKind,
};
use crate::cfg::builder::{
    ExtendedKind, ExtendedNode, Label, LabelTable, PhaseOneResult, EXCEPTIONAL_EXIT, REGULAR_EXIT,
};
use crate::cfg::graph::ControlFlowGraph;
use crate::error::{CfgResult, InvariantViolation};

#[derive(Debug, Clone, Copy)]
enum EdgeKind {
    Slot(EdgeSlot),
    /// The `n`th exception type of an exceptional block.
    Exceptional(usize),
}

#[derive(Debug, Clone, Copy)]
enum EdgeTarget {
    Position(usize),
    Label(Label),
}

/// An edge whose target block may not exist yet.
#[derive(Debug, Clone, Copy)]
struct MissingEdge {
    source: BlockId,
    kind: EdgeKind,
    target: EdgeTarget,
}

struct Assembler<'a> {
    cfg: ControlFlowGraph,
    leaders: &'a FxHashSet<usize>,
    /// The regular block that falls through to the next node, if any.
    current: Option<BlockId>,
    missing: Vec<MissingEdge>,
}

impl Assembler<'_> {
    fn alloc(&mut self, kind: BlockKind) -> BlockId {
        self.cfg.blocks.alloc(Block::new(kind))
    }

    /// The regular block that receives the node at `position`. A leader
    /// always starts a new one.
    fn regular_block(&mut self, position: usize) -> BlockId {
        match self.current {
            Some(current) if !self.leaders.contains(&position) => current,
            previous => {
                let block = self.alloc(BlockKind::Regular(RegularBlock::default()));
                if let Some(previous) = previous {
                    self.cfg.set_edge(previous, EdgeSlot::Successor, block);
                }
                self.current = Some(block);
                block
            }
        }
    }

    /// Starts a block of another kind after the current one. Nothing falls
    /// through past it.
    fn terminal_block(&mut self, kind: BlockKind) -> BlockId {
        let block = self.alloc(kind);
        if let Some(previous) = self.current.take() {
            self.cfg.set_edge(previous, EdgeSlot::Successor, block);
        }
        block
    }

    fn add_missing(&mut self, source: BlockId, kind: EdgeKind, target: EdgeTarget) {
        self.missing.push(MissingEdge {
            source,
            kind,
            target,
        });
    }

    fn visit(&mut self, position: usize, extended: &mut ExtendedNode) {
        match &extended.kind {
            ExtendedKind::Computation(node) => {
                let block = self.regular_block(position);
                if let BlockKind::Regular(regular) = &mut self.cfg.blocks[block].kind {
                    regular.nodes.push(*node);
                }
                extended.block = Some(block);
                if extended.terminates_execution {
                    let exit = self.cfg.exceptional_exit;
                    self.cfg.set_edge(block, EdgeSlot::Successor, exit);
                    self.current = None;
                }
            }
            ExtendedKind::ComputationWithExceptions { node, exceptions } => {
                let block = self.terminal_block(BlockKind::Exceptional(ExceptionalBlock {
                    node: *node,
                    successor: None,
                    exceptional_successors: exceptions
                        .iter()
                        .map(|(cause, _)| (cause.clone(), SmallVec::new()))
                        .collect(),
                }));
                extended.block = Some(block);
                if !extended.terminates_execution {
                    self.add_missing(
                        block,
                        EdgeKind::Slot(EdgeSlot::Successor),
                        EdgeTarget::Position(position + 1),
                    );
                }
                for (index, (_, labels)) in exceptions.iter().enumerate() {
                    for label in labels {
                        self.add_missing(block, EdgeKind::Exceptional(index), EdgeTarget::Label(*label));
                    }
                }
            }
            ExtendedKind::UnconditionalJump(label) => {
                let block = self.regular_block(position);
                extended.block = Some(block);
                self.add_missing(
                    block,
                    EdgeKind::Slot(EdgeSlot::Successor),
                    EdgeTarget::Label(*label),
                );
                self.current = None;
            }
            ExtendedKind::ConditionalJump {
                then_label,
                else_label,
            } => {
                extended.block = Some(self.regular_block(position));
                let block = self.terminal_block(BlockKind::Conditional(ConditionalBlock::default()));
                self.add_missing(block, EdgeKind::Slot(EdgeSlot::Then), EdgeTarget::Label(*then_label));
                self.add_missing(block, EdgeKind::Slot(EdgeSlot::Else), EdgeTarget::Label(*else_label));
            }
        }
    }

    /// Connects every missing edge to the block holding its target.
    fn resolve(&mut self, sequence: &[ExtendedNode], labels: &LabelTable) -> CfgResult<()> {
        while let Some(edge) = self.missing.pop() {
            let target = match edge.target {
                EdgeTarget::Label(REGULAR_EXIT) => self.cfg.regular_exit,
                EdgeTarget::Label(EXCEPTIONAL_EXIT) => self.cfg.exceptional_exit,
                EdgeTarget::Label(label) => {
                    let position = labels
                        .position(label)
                        .ok_or(InvariantViolation::UnboundLabel(label.0))?;
                    block_at(sequence, position)?
                }
                EdgeTarget::Position(position) => block_at(sequence, position)?,
            };
            match edge.kind {
                EdgeKind::Slot(slot) => self.cfg.set_edge(edge.source, slot, target),
                EdgeKind::Exceptional(index) => {
                    self.cfg.add_exceptional_edge(edge.source, index, target);
                }
            }
        }
        Ok(())
    }
}

fn block_at(sequence: &[ExtendedNode], position: usize) -> Result<BlockId, InvariantViolation> {
    sequence
        .get(position)
        .and_then(|extended| extended.block)
        .ok_or(InvariantViolation::DanglingPosition(position))
}

fn special(kind: SpecialBlockKind) -> Block {
    Block::new(BlockKind::Special(SpecialBlock {
        kind,
        successor: None,
    }))
}

/// Builds the blocks of a linearized tree and connects them. The result
/// still contains empty and unreachable blocks.
pub(super) fn assemble(phase_one: PhaseOneResult) -> CfgResult<ControlFlowGraph> {
    let PhaseOneResult {
        mut sequence,
        labels,
        leaders,
        nodes,
        tree_lookup,
        return_nodes,
        synthetic_locals,
        declared_classes,
        underlying,
    } = phase_one;

    let mut blocks = Arena::default();
    let entry = blocks.alloc(special(SpecialBlockKind::Entry));
    let regular_exit = blocks.alloc(special(SpecialBlockKind::Exit));
    let exceptional_exit = blocks.alloc(special(SpecialBlockKind::ExceptionalExit));

    let mut assembler = Assembler {
        cfg: ControlFlowGraph {
            blocks,
            nodes,
            entry,
            regular_exit,
            exceptional_exit,
            tree_lookup,
            return_nodes,
            synthetic_locals,
            declared_classes,
            underlying,
        },
        leaders: &leaders,
        current: None,
        missing: vec![MissingEdge {
            source: entry,
            kind: EdgeKind::Slot(EdgeSlot::Successor),
            target: EdgeTarget::Position(0),
        }],
    };

    for (position, extended) in sequence.iter_mut().enumerate() {
        assembler.visit(position, extended);
    }
    assembler.resolve(&sequence, &labels)?;

    Ok(assembler.cfg)
}

#[cfg(test)]
mod tests {
    use jflow_ast::{AstBuilder, BinaryOp, ClassTable, Type};

    use crate::cfg::block::BlockKind;
    use crate::{build_cfg, CfgSettings};

    fn unsimplified() -> CfgSettings {
        CfgSettings {
            simplify: false,
            ..CfgSettings::default()
        }
    }

    #[test]
    fn while_loop_branches_back_to_its_condition() {
        let mut builder = AstBuilder::new();
        let i = builder.local("i", Type::INT);
        let i_ref = builder.local_ref(i);
        let ten = builder.int(10);
        let condition = builder.binary(BinaryOp::Lt, i_ref, ten);
        let i_ref = builder.local_ref(i);
        let one = builder.int(1);
        let step = builder.compound_assign(BinaryOp::Add, i_ref, one);
        let step = builder.expr_stmt(step);
        let body = builder.block(vec![step]);
        let code = builder.while_stmt(condition, body);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &unsimplified()).unwrap();

        let condition_node = cfg.node_for_tree(condition).unwrap();
        let condition_block = cfg.block_of(condition_node).unwrap();
        let (branch, _) = cfg
            .blocks()
            .find(|(_, block)| block.kind.is_conditional())
            .unwrap();
        assert_eq!(cfg.successors(condition_block).as_slice(), &[branch]);

        let step_node = cfg.node_for_tree(one).unwrap();
        let mut body_block = cfg.block_of(step_node).unwrap();
        // Follow the body until it jumps back.
        while cfg.successors(body_block).as_slice() != [condition_block] {
            let successors = cfg.successors(body_block);
            assert_eq!(successors.len(), 1);
            body_block = successors[0];
        }
        assert!(cfg.predecessors(condition_block).contains(&body_block));
    }

    #[test]
    fn throw_has_no_normal_successor() {
        let mut builder = AstBuilder::new();
        let npe = Type::class_type("java.lang.NullPointerException");
        let e = builder.local("e", npe);
        let e_ref = builder.local_ref(e);
        let code = builder.throw_stmt(e_ref);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &unsimplified()).unwrap();

        let (_, block) = cfg
            .blocks()
            .find(|(_, block)| block.kind.is_exceptional())
            .unwrap();
        let BlockKind::Exceptional(exceptional) = &block.kind else {
            unreachable!()
        };
        assert_eq!(exceptional.successor, None);
        assert_eq!(
            exceptional.exceptional_successors,
            vec![(
                Type::class_type("java.lang.NullPointerException"),
                [cfg.exceptional_exit()].into_iter().collect()
            )]
        );
        assert!(cfg.predecessors(cfg.regular_exit()).is_empty());
    }
}

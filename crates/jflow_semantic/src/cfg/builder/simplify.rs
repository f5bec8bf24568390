//! Phase three: rewriting the assembled graph into its minimal form.
use tracing::trace;

use crate::cfg::block::{Block, BlockId, BlockKind, RegularBlock};
use crate::cfg::graph::{raw, ControlFlowGraph};

/// Rewrites `cfg` until none of the simplifications applies:
///
/// * unreachable blocks are dropped,
/// * empty regular blocks are bypassed,
/// * conditional blocks whose branches agree are bypassed,
/// * a regular block is merged into its regular predecessor if that is its
///   only predecessor.
///
/// Running it on an already simplified graph changes nothing.
pub fn simplify(cfg: &mut ControlFlowGraph) {
    let mut rounds = 0;
    loop {
        rounds += 1;
        let mut changed = prune(cfg);
        changed |= remove_empty_blocks(cfg);
        changed |= remove_redundant_conditionals(cfg);
        changed |= merge_straight_lines(cfg);
        if !changed {
            break;
        }
    }
    trace!(rounds, "simplification reached a fixed point");
}

fn prune(cfg: &mut ControlFlowGraph) -> bool {
    let before = cfg.num_blocks();
    cfg.compact();
    let pruned = before - cfg.num_blocks();
    if pruned > 0 {
        trace!(pruned, "dropped unreachable blocks");
    }
    pruned > 0
}

fn block_ids(cfg: &ControlFlowGraph) -> Vec<BlockId> {
    cfg.blocks.iter().map(|(id, _)| id).collect()
}

/// Disconnects `block` from its successors and empties it. The block is
/// unreachable afterwards and disappears with the next pruning.
fn detach(cfg: &mut ControlFlowGraph, block: BlockId) {
    for successor in cfg.blocks[block].successors() {
        cfg.blocks[successor].predecessors.remove(&block);
    }
    cfg.blocks[block] = Block::new(BlockKind::Regular(RegularBlock::default()));
}

/// Moves every edge into `block` over to `target` and detaches `block`.
fn bypass(cfg: &mut ControlFlowGraph, block: BlockId, target: BlockId) {
    let predecessors: Vec<BlockId> = cfg.blocks[block].predecessors.iter().copied().collect();
    for predecessor in predecessors {
        cfg.redirect(predecessor, block, target);
    }
    detach(cfg, block);
}

fn remove_empty_blocks(cfg: &mut ControlFlowGraph) -> bool {
    let mut changed = false;
    for block in block_ids(cfg) {
        let BlockKind::Regular(RegularBlock {
            nodes,
            successor: Some(successor),
        }) = &cfg.blocks[block].kind
        else {
            continue;
        };
        // An empty block looping to itself is an empty infinite loop and
        // stays.
        if !nodes.is_empty() || *successor == block {
            continue;
        }
        let successor = *successor;
        trace!(block = raw(block), successor = raw(successor), "bypassing empty block");
        bypass(cfg, block, successor);
        changed = true;
    }
    changed
}

fn remove_redundant_conditionals(cfg: &mut ControlFlowGraph) -> bool {
    let mut changed = false;
    for block in block_ids(cfg) {
        let BlockKind::Conditional(conditional) = &cfg.blocks[block].kind else {
            continue;
        };
        let (Some(then_successor), Some(else_successor)) =
            (conditional.then_successor, conditional.else_successor)
        else {
            continue;
        };
        if then_successor != else_successor || then_successor == block {
            continue;
        }
        trace!(block = raw(block), successor = raw(then_successor), "bypassing redundant branch");
        bypass(cfg, block, then_successor);
        changed = true;
    }
    changed
}

fn merge_straight_lines(cfg: &mut ControlFlowGraph) -> bool {
    let mut changed = false;
    for block in block_ids(cfg) {
        while let Some(successor) = mergeable_successor(cfg, block) {
            trace!(block = raw(block), successor = raw(successor), "merging blocks");
            let BlockKind::Regular(absorbed) = std::mem::replace(
                &mut cfg.blocks[successor].kind,
                BlockKind::Regular(RegularBlock::default()),
            ) else {
                break;
            };
            cfg.blocks[successor].predecessors.clear();
            if let Some(next) = absorbed.successor {
                let predecessors = &mut cfg.blocks[next].predecessors;
                predecessors.remove(&successor);
                predecessors.insert(block);
            }
            if let BlockKind::Regular(regular) = &mut cfg.blocks[block].kind {
                regular.nodes.extend(absorbed.nodes);
                regular.successor = absorbed.successor;
            }
            changed = true;
        }
    }
    changed
}

/// The regular successor of regular `block` that nothing else reaches.
fn mergeable_successor(cfg: &ControlFlowGraph, block: BlockId) -> Option<BlockId> {
    let BlockKind::Regular(RegularBlock {
        successor: Some(successor),
        ..
    }) = &cfg.blocks[block].kind
    else {
        return None;
    };
    let successor = *successor;
    let target = &cfg.blocks[successor];
    let only_predecessor =
        target.predecessors.len() == 1 && target.predecessors.contains(&block);
    (successor != block && target.kind.is_regular() && only_predecessor).then_some(successor)
}

//! # Overview
//! A control-flow graph is built from a typed tree in three passes.
//!
//! The first pass walks the tree and emits a flat sequence of *extended
//! nodes*. Most of them are plain computations: every subexpression,
//! implicit conversion and declaration becomes one [`node::Node`], in
//! evaluation order. The remaining extended nodes are jumps to symbolic
//! labels, conditional jumps that branch on the value computed just before
//! them, and computations that may raise exceptions. Every position a label
//! is bound to is a *leader*: some jump may land there, so it has to start a
//! new block.
//!
//! The second pass cuts the sequence into blocks. A new regular block starts
//! at every leader and after every jump. Each conditional jump becomes a
//! conditional block and each computation that may raise becomes an
//! exceptional block of its own, with one group of edges per exception type.
//! Edges whose targets do not exist yet are kept on a worklist and resolved
//! once all blocks are known.
//!
//! The third pass removes what the first two leave behind: unreachable
//! blocks, empty blocks, conditional blocks whose branches agree, and chains
//! of regular blocks that can be merged. For example,
//!
//! ```java
//! int x = 0;
//! if (x == 0) {
//!     x = 1;
//! }
//! return x;
//! ```
//!
//! produces:
//!
//! ```text
//!        <entry>
//!           |
//!   [int x, 0, x = 0,
//!    x, 0, (x == 0)]
//!           |
//!        <branch>
//!    then /    \ else
//!        v      |
//! [x, 1, x = 1] |
//!          \    v
//!        [x, return x]
//!              |
//!           <exit>
//! ```
//!
//! ## Exceptions
//!
//! Exceptions are routed through a stack of the enclosing `try` statements.
//! A thrown type reaches a `catch` clause that definitely handles it and
//! stops there; a `catch` clause for a subtype may handle it and the search
//! continues outwards. A `finally` block receives every exception. Whatever
//! escapes all handlers reaches the exceptional exit.
//!
//! ## Finally
//!
//! The `finally` block is emitted once for the normal and exceptional paths.
//! Every distinct `return`, `break` or `continue` that leaves the protected
//! statements gets its own copy of the `finally` block, which continues to
//! the original target afterwards.
pub mod block;
pub mod builder;
pub mod graph;
pub mod node;
pub mod visualize;

pub use block::{
    Block, BlockId, BlockKind, ConditionalBlock, ExceptionalBlock, RegularBlock, SpecialBlock,
    SpecialBlockKind,
};
pub use builder::{build_cfg, build_cfg_for_method, simplify};
pub use graph::{ControlFlowGraph, UnderlyingAst};
pub use node::{
    ConversionKind, Node, NodeDisplay, NodeId, NodeKind, SyntheticId, SyntheticLocal, Variable,
};

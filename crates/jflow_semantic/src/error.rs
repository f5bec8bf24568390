use text_size::TextRange;
use thiserror::Error;

pub type CfgResult<T> = Result<T, CfgError>;

/// Why control-flow construction for a tree failed.
///
/// There is no partial result: a failed translation leaves nothing behind
/// and does not affect later, independent translations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfgError {
    /// The input contains a construct the builder cannot lower.
    #[error("cannot build a control-flow graph for {construct} at {range:?}")]
    UnsupportedConstruct { construct: String, range: TextRange },

    /// The builder's own bookkeeping is inconsistent. This is a bug in the
    /// builder, not a property of the input program.
    #[error("control-flow builder invariant violated: {0}")]
    InvariantViolation(#[from] InvariantViolation),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("label {0} is referenced but never bound")]
    UnboundLabel(u32),

    #[error("position {0} of the linearized sequence has no block")]
    DanglingPosition(usize),

    #[error("a conditional jump follows a value of non-boolean type `{0}`")]
    NonBooleanCondition(String),

    #[error("try frame popped out of order")]
    TryFrameOutOfOrder,

    #[error("`{0}` has no target")]
    MissingJumpTarget(String),

    #[error("block {0} is reachable but has no successor")]
    MissingSuccessor(u32),
}

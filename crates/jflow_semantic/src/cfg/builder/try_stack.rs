//! The exception-handling scopes active at a point of the linearization.
use jflow_ast::{Type, TypeQuery};
use smallvec::SmallVec;

use crate::cfg::builder::{Label, EXCEPTIONAL_EXIT};
use crate::error::InvariantViolation;

pub(super) type Labels = SmallVec<[Label; 2]>;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum TryFrame {
    /// The catch clauses of a `try`, in declaration order. Earlier clauses
    /// shadow later ones.
    Catch(Vec<(Type, Label)>),
    /// A `finally` block, which sees every exception regardless of type.
    Finally(Label),
}

impl TryFrame {
    /// Adds the labels that may receive an exception of type `thrown` and
    /// returns `true` if the exception cannot propagate past this frame.
    fn possible_labels(&self, types: &dyn TypeQuery, thrown: &Type, labels: &mut Labels) -> bool {
        let catches = match self {
            TryFrame::Finally(label) => {
                add(labels, *label);
                return true;
            }
            TryFrame::Catch(catches) => catches,
        };

        let thrown = thrown.upper_bound();
        if let Type::Union(alternatives) = thrown {
            let mut claimed = true;
            for alternative in alternatives {
                claimed &= self.possible_labels(types, alternative, labels);
            }
            return claimed;
        }
        if !thrown.is_declared() {
            // Only `null` gets here; any handler may see the resulting
            // exception.
            for (_, label) in catches {
                add(labels, *label);
            }
            return false;
        }

        for (caught, label) in catches {
            let alternatives = match caught {
                Type::Union(alternatives) => alternatives.as_slice(),
                caught => std::slice::from_ref(caught),
            };
            let mut may_apply = false;
            for alternative in alternatives {
                if types.is_subtype(thrown, alternative) {
                    add(labels, *label);
                    return true;
                }
                may_apply |= types.is_subtype(alternative, thrown);
            }
            if may_apply {
                add(labels, *label);
            }
        }
        false
    }
}

fn add(labels: &mut Labels, label: Label) {
    if !labels.contains(&label) {
        labels.push(label);
    }
}

/// Proof of a push, required to pop the same frame again.
#[derive(Debug)]
#[must_use]
pub(super) struct FrameToken(usize);

#[derive(Debug, Default)]
pub(super) struct TryStack {
    frames: Vec<TryFrame>,
}

impl TryStack {
    pub(super) fn push(&mut self, frame: TryFrame) -> FrameToken {
        self.frames.push(frame);
        FrameToken(self.frames.len() - 1)
    }

    pub(super) fn pop(&mut self, token: FrameToken) -> Result<TryFrame, InvariantViolation> {
        if self.frames.len() != token.0 + 1 {
            return Err(InvariantViolation::TryFrameOutOfOrder);
        }
        self.frames.pop().ok_or(InvariantViolation::TryFrameOutOfOrder)
    }

    /// The labels control may reach when an exception of type `thrown` is
    /// raised, working outward from the innermost frame.
    pub(super) fn possible_labels(&self, types: &dyn TypeQuery, thrown: &Type) -> Labels {
        let mut labels = Labels::new();
        for frame in self.frames.iter().rev() {
            if frame.possible_labels(types, thrown, &mut labels) {
                return labels;
            }
        }
        add(&mut labels, EXCEPTIONAL_EXIT);
        labels
    }
}

#[cfg(test)]
mod tests {
    use jflow_ast::ClassTable;

    use super::*;

    fn ty(name: &str) -> Type {
        Type::class_type(name)
    }

    const OUTER: Label = Label(10);
    const INNER: Label = Label(11);
    const FINALLY: Label = Label(12);

    #[test]
    fn empty_stack_goes_to_exceptional_exit() {
        let types = ClassTable::with_java_lang();
        let stack = TryStack::default();
        let labels = stack.possible_labels(&types, &ty("java.lang.NullPointerException"));
        assert_eq!(labels.as_slice(), &[EXCEPTIONAL_EXIT]);
    }

    #[test]
    fn subtype_is_claimed_by_innermost_catch() {
        let types = ClassTable::with_java_lang();
        let mut stack = TryStack::default();
        let _outer = stack.push(TryFrame::Catch(vec![(ty("java.lang.Exception"), OUTER)]));
        let _inner = stack.push(TryFrame::Catch(vec![(
            ty("java.lang.RuntimeException"),
            INNER,
        )]));

        let labels = stack.possible_labels(&types, &ty("java.lang.NullPointerException"));
        assert_eq!(labels.as_slice(), &[INNER]);
    }

    #[test]
    fn supertype_may_reach_every_overlapping_catch() {
        let types = ClassTable::with_java_lang();
        let mut stack = TryStack::default();
        let _outer = stack.push(TryFrame::Catch(vec![(ty("java.lang.Exception"), OUTER)]));
        let _inner = stack.push(TryFrame::Catch(vec![(
            ty("java.lang.RuntimeException"),
            INNER,
        )]));

        let labels = stack.possible_labels(&types, &ty("java.lang.Throwable"));
        assert_eq!(labels.as_slice(), &[INNER, OUTER, EXCEPTIONAL_EXIT]);
    }

    #[test]
    fn unrelated_exception_skips_catches() {
        let types = ClassTable::with_java_lang();
        let mut stack = TryStack::default();
        let _frame = stack.push(TryFrame::Catch(vec![(
            ty("java.lang.RuntimeException"),
            INNER,
        )]));

        let labels = stack.possible_labels(&types, &ty("java.io.IOException"));
        assert_eq!(labels.as_slice(), &[EXCEPTIONAL_EXIT]);
    }

    #[test]
    fn union_catch_matches_any_alternative() {
        let types = ClassTable::with_java_lang();
        let mut stack = TryStack::default();
        let caught = Type::Union(vec![
            ty("java.io.IOException"),
            ty("java.lang.IllegalStateException"),
        ]);
        let _frame = stack.push(TryFrame::Catch(vec![(caught, INNER)]));

        let labels = stack.possible_labels(&types, &ty("java.lang.IllegalStateException"));
        assert_eq!(labels.as_slice(), &[INNER]);
    }

    #[test]
    fn finally_claims_everything() {
        let types = ClassTable::with_java_lang();
        let mut stack = TryStack::default();
        let _finally = stack.push(TryFrame::Finally(FINALLY));
        let _catch = stack.push(TryFrame::Catch(vec![(
            ty("java.lang.RuntimeException"),
            INNER,
        )]));

        let labels = stack.possible_labels(&types, &ty("java.lang.Throwable"));
        assert_eq!(labels.as_slice(), &[INNER, FINALLY]);
    }

    #[test]
    fn type_variable_uses_its_bound() {
        let types = ClassTable::with_java_lang();
        let mut stack = TryStack::default();
        let _frame = stack.push(TryFrame::Catch(vec![(
            ty("java.lang.RuntimeException"),
            INNER,
        )]));

        let thrown = Type::type_variable("X", ty("java.lang.IllegalArgumentException"));
        let labels = stack.possible_labels(&types, &thrown);
        assert_eq!(labels.as_slice(), &[INNER]);
    }

    #[test]
    fn pop_out_of_order_is_an_error() {
        let mut stack = TryStack::default();
        let outer = stack.push(TryFrame::Finally(FINALLY));
        let inner = stack.push(TryFrame::Finally(OUTER));

        assert_eq!(stack.pop(outer), Err(InvariantViolation::TryFrameOutOfOrder));
        assert_eq!(stack.pop(inner), Ok(TryFrame::Finally(OUTER)));
    }
}

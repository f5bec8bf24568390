//! Translation of a typed tree into a [`ControlFlowGraph`].
//!
//! The translation runs in three phases:
//!
//! 1. [`Linearizer`] walks the tree once and produces a flat sequence of
//!    extended nodes, the label bindings and the set of leader positions.
//! 2. [`assemble`] cuts that sequence into basic blocks and resolves every
//!    label into an edge.
//! 3. [`simplify`] removes empty blocks, branches whose targets coincide and
//!    unreachable blocks, and merges straight-line chains.
use jflow_ast::{Ast, TreeId, TreeKind, Type, TypeQuery};
use la_arena::Arena;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::cfg::block::BlockId;
use crate::cfg::graph::{ControlFlowGraph, UnderlyingAst};
use crate::cfg::node::{Node, NodeId, SyntheticLocal};
use crate::error::{CfgError, CfgResult};
use crate::settings::CfgSettings;

use assemble::assemble;
use linearize::Linearizer;
pub use simplify::simplify;
use try_stack::Labels;

mod assemble;
mod conversions;
mod expressions;
mod linearize;
mod simplify;
mod try_stack;

/// Builds the control-flow graph of an arbitrary statement or expression.
pub fn build_cfg(
    ast: &Ast,
    types: &dyn TypeQuery,
    code: TreeId,
    settings: &CfgSettings,
) -> CfgResult<ControlFlowGraph> {
    build(ast, types, UnderlyingAst::Arbitrary { code }, settings)
}

/// Builds the control-flow graph of the body of a method declaration.
///
/// Parameters are not part of the graph; their declarations precede the entry
/// block.
pub fn build_cfg_for_method(
    ast: &Ast,
    types: &dyn TypeQuery,
    method: TreeId,
    settings: &CfgSettings,
) -> CfgResult<ControlFlowGraph> {
    let TreeKind::MethodDecl(decl) = ast.kind(method) else {
        return Err(CfgError::UnsupportedConstruct {
            construct: format!("{} in place of a method declaration", ast.kind(method).name()),
            range: ast.tree(method).range,
        });
    };
    build(
        ast,
        types,
        UnderlyingAst::Method {
            method,
            body: decl.body,
        },
        settings,
    )
}

fn build(
    ast: &Ast,
    types: &dyn TypeQuery,
    underlying: UnderlyingAst,
    settings: &CfgSettings,
) -> CfgResult<ControlFlowGraph> {
    let phase_one = Linearizer::new(ast, types, settings).linearize(underlying)?;
    debug!(
        extended_nodes = phase_one.sequence.len(),
        leaders = phase_one.leaders.len(),
        "linearized tree"
    );

    let mut cfg = assemble(phase_one)?;
    cfg.check_successors()?;
    debug!(blocks = cfg.num_blocks(), "assembled blocks");

    if settings.simplify {
        simplify(&mut cfg);
        debug!(blocks = cfg.num_blocks(), "simplified graph");
    } else {
        cfg.compact();
    }
    Ok(cfg)
}

/// A symbolic jump target, bound to a position of the linearized sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Label(u32);

const REGULAR_EXIT: Label = Label(0);
const EXCEPTIONAL_EXIT: Label = Label(1);

#[derive(Debug)]
struct LabelTable {
    bindings: Vec<Option<usize>>,
}

impl LabelTable {
    fn new() -> Self {
        // The exit labels map to the exit blocks and are never bound.
        Self {
            bindings: vec![None, None],
        }
    }

    fn fresh(&mut self) -> Label {
        let label = Label(u32::try_from(self.bindings.len()).unwrap_or(u32::MAX));
        self.bindings.push(None);
        label
    }

    fn bind(&mut self, label: Label, position: usize) {
        if let Some(binding) = self.bindings.get_mut(label.0 as usize) {
            *binding = Some(position);
        }
    }

    fn position(&self, label: Label) -> Option<usize> {
        self.bindings.get(label.0 as usize).copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ExtendedKind {
    Computation(NodeId),
    ComputationWithExceptions {
        node: NodeId,
        /// Each exception the node may raise, with the labels that may
        /// receive it.
        exceptions: Vec<(Type, Labels)>,
    },
    UnconditionalJump(Label),
    /// Branches on the boolean computed by the preceding node.
    ConditionalJump {
        then_label: Label,
        else_label: Label,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct ExtendedNode {
    kind: ExtendedKind,
    /// The node always completes abruptly, e.g. a `throw`.
    terminates_execution: bool,
    /// The block holding the node, filled in while assembling blocks.
    block: Option<BlockId>,
}

impl ExtendedNode {
    fn new(kind: ExtendedKind, terminates_execution: bool) -> Self {
        Self {
            kind,
            terminates_execution,
            block: None,
        }
    }
}

#[derive(Debug)]
struct PhaseOneResult {
    sequence: Vec<ExtendedNode>,
    labels: LabelTable,
    leaders: FxHashSet<usize>,
    nodes: Arena<Node>,
    tree_lookup: FxHashMap<TreeId, NodeId>,
    return_nodes: Vec<NodeId>,
    synthetic_locals: Arena<SyntheticLocal>,
    declared_classes: Vec<TreeId>,
    underlying: UnderlyingAst,
}

#[cfg(test)]
mod tests {
    use jflow_ast::{AstBuilder, BinaryOp, ClassTable, MethodRef, Type, UnaryOp};
    use test_case::test_case;

    use crate::cfg::block::BlockKind;
    use crate::cfg::node::{ConversionKind, NodeKind, Variable};
    use crate::{build_cfg, build_cfg_for_method, CfgError, CfgSettings, InvariantViolation};

    fn class(name: &str) -> Type {
        Type::class_type(name)
    }

    #[test]
    fn straight_line_code_is_one_block() {
        let mut builder = AstBuilder::new();
        let x = builder.local("x", Type::INT);
        let one = builder.int(1);
        let decl = builder.var_decl(x, Some(one));
        let x_ref = builder.local_ref(x);
        let two = builder.int(2);
        let assign = builder.assign(x_ref, two);
        let assign = builder.expr_stmt(assign);
        let code = builder.block(vec![decl, assign]);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();

        // entry, the code, both exits
        assert_eq!(cfg.num_blocks(), 4);
        let successors = cfg.successors(cfg.entry());
        let [body] = successors.as_slice() else {
            panic!("entry must have a single successor");
        };
        assert_eq!(cfg.block(*body).nodes().len(), 6);
        assert_eq!(cfg.successors(*body).as_slice(), &[cfg.regular_exit()]);
        assert!(cfg.predecessors(cfg.exceptional_exit()).is_empty());
    }

    #[test]
    fn if_without_else() {
        let mut builder = AstBuilder::new();
        let x = builder.local("x", Type::INT);
        let zero = builder.int(0);
        let decl = builder.var_decl(x, Some(zero));
        let x_ref = builder.local_ref(x);
        let zero = builder.int(0);
        let condition = builder.binary(BinaryOp::Eq, x_ref, zero);
        let x_ref = builder.local_ref(x);
        let one = builder.int(1);
        let assign = builder.assign(x_ref, one);
        let assign_stmt = builder.expr_stmt(assign);
        let then_stmt = builder.block(vec![assign_stmt]);
        let if_stmt = builder.if_stmt(condition, then_stmt, None);
        let x_ref = builder.local_ref(x);
        let ret = builder.return_stmt(Some(x_ref));
        let code = builder.block(vec![decl, if_stmt, ret]);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();

        assert_eq!(cfg.num_blocks(), 7);
        let condition_block = cfg.block_of(cfg.node_for_tree(condition).unwrap()).unwrap();
        let successors = cfg.successors(condition_block);
        let [branch] = successors.as_slice() else {
            panic!("condition must flow into the branch");
        };
        let BlockKind::Conditional(conditional) = &cfg.block(*branch).kind else {
            panic!("expected a conditional block");
        };
        let then_block = conditional.then_successor.unwrap();
        let else_block = conditional.else_successor.unwrap();
        assert_eq!(cfg.block_of(cfg.node_for_tree(assign).unwrap()), Some(then_block));
        assert_eq!(cfg.block_of(cfg.return_nodes()[0]), Some(else_block));
        assert_eq!(cfg.successors(then_block).as_slice(), &[else_block]);
        assert_eq!(cfg.successors(else_block).as_slice(), &[cfg.regular_exit()]);
    }

    #[test]
    fn constant_false_skips_right_operand() {
        let mut builder = AstBuilder::new();
        let c = builder.local("c", Type::BOOLEAN);
        let x = builder.local("x", Type::INT);
        let lhs = builder.bool_lit(false);
        let rhs = builder.local_ref(c);
        let condition = builder.binary(BinaryOp::And, lhs, rhs);
        let x_ref = builder.local_ref(x);
        let one = builder.int(1);
        let assign = builder.assign(x_ref, one);
        let then_stmt = builder.expr_stmt(assign);
        let code = builder.if_stmt(condition, then_stmt, None);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();

        let rhs_node = cfg.node_for_tree(rhs).unwrap();
        assert_eq!(cfg.block_of(rhs_node), None);
        assert_eq!(cfg.block_of(cfg.node_for_tree(assign).unwrap()), None);
        assert!(cfg.node_for_tree(lhs).and_then(|node| cfg.block_of(node)).is_some());
        assert!(!cfg.blocks().any(|(_, block)| block.kind.is_conditional()));
    }

    #[test]
    fn nested_try_routes_by_exception_type() {
        let mut builder = AstBuilder::new();
        let foo = class("Foo");
        let o = builder.parameter("o", foo.clone());
        let o_ref = builder.local_ref(o);
        let method = MethodRef::new(foo, "m", vec![], Type::Void)
            .with_thrown([class("java.io.IOException")]);
        let call = builder.call(Some(o_ref), method, vec![]);
        let call_stmt = builder.expr_stmt(call);
        let inner_body = builder.block(vec![call_stmt]);
        let npe = builder.exception_parameter("npe", class("java.lang.NullPointerException"));
        let empty = builder.block(vec![]);
        let inner_catch = builder.catch(npe, empty);
        let inner_parameter = inner_catch.parameter;
        let inner = builder.try_stmt(inner_body, vec![inner_catch], None);
        let outer_body = builder.block(vec![inner]);
        let iae = builder.exception_parameter("iae", class("java.lang.IllegalArgumentException"));
        let empty = builder.block(vec![]);
        let outer_catch = builder.catch(iae, empty);
        let code = builder.try_stmt(outer_body, vec![outer_catch], None);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let settings = CfgSettings {
            unchecked_call_exceptions: false,
            ..CfgSettings::default()
        };
        let cfg = build_cfg(&ast, &table, code, &settings).unwrap();

        let handler = cfg.block_of(cfg.node_for_tree(inner_parameter).unwrap()).unwrap();
        let exceptional_successors = |kind: fn(&NodeKind) -> bool| {
            cfg.blocks()
                .find_map(|(_, block)| match &block.kind {
                    BlockKind::Exceptional(exceptional) if kind(&cfg.node(exceptional.node).kind) => {
                        Some(exceptional.exceptional_successors.clone())
                    }
                    _ => None,
                })
                .unwrap()
        };

        let access = exceptional_successors(|kind| matches!(kind, NodeKind::MethodAccess { .. }));
        assert_eq!(access.len(), 1);
        assert_eq!(access[0].0, class("java.lang.NullPointerException"));
        assert_eq!(access[0].1.as_slice(), &[handler]);

        let invocation =
            exceptional_successors(|kind| matches!(kind, NodeKind::MethodInvocation { .. }));
        assert_eq!(invocation.len(), 1);
        assert_eq!(invocation[0].0, class("java.io.IOException"));
        assert_eq!(invocation[0].1.as_slice(), &[cfg.exceptional_exit()]);
    }

    #[test]
    fn if_else_branches_merge() {
        let mut builder = AstBuilder::new();
        let x = builder.parameter("x", Type::INT);
        let x_ref = builder.local_ref(x);
        let zero = builder.int(0);
        let condition = builder.binary(BinaryOp::Eq, x_ref, zero);
        let x_ref = builder.local_ref(x);
        let one = builder.int(1);
        let then_assign = builder.assign(x_ref, one);
        let then_stmt = builder.expr_stmt(then_assign);
        let x_ref = builder.local_ref(x);
        let two = builder.int(2);
        let else_assign = builder.assign(x_ref, two);
        let else_stmt = builder.expr_stmt(else_assign);
        let if_stmt = builder.if_stmt(condition, then_stmt, Some(else_stmt));
        let x_ref = builder.local_ref(x);
        let ret = builder.return_stmt(Some(x_ref));
        let code = builder.block(vec![if_stmt, ret]);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();

        let conditionals: Vec<_> = cfg
            .blocks()
            .filter_map(|(_, block)| match &block.kind {
                BlockKind::Conditional(conditional) => Some(conditional.clone()),
                _ => None,
            })
            .collect();
        let [conditional] = conditionals.as_slice() else {
            panic!("expected exactly one conditional block");
        };
        let then_block = conditional.then_successor.unwrap();
        let else_block = conditional.else_successor.unwrap();
        assert_ne!(then_block, else_block);
        assert_eq!(cfg.block_of(cfg.node_for_tree(then_assign).unwrap()), Some(then_block));
        assert_eq!(cfg.block_of(cfg.node_for_tree(else_assign).unwrap()), Some(else_block));

        let merge = cfg.block_of(cfg.return_nodes()[0]).unwrap();
        assert_eq!(cfg.successors(then_block).as_slice(), &[merge]);
        assert_eq!(cfg.successors(else_block).as_slice(), &[merge]);
        assert_eq!(cfg.predecessors(merge).len(), 2);
    }

    #[test]
    fn throw_stops_at_first_claiming_catch() {
        let mut builder = AstBuilder::new();
        let foo = class("Foo");
        let o = builder.parameter("o", foo.clone());
        let e = builder.parameter("e", class("java.lang.IllegalArgumentException"));
        let o_ref = builder.local_ref(o);
        let method = MethodRef::new(foo, "m", vec![], Type::Void)
            .with_thrown([class("java.io.IOException")]);
        let call = builder.call(Some(o_ref), method, vec![]);
        let call_stmt = builder.expr_stmt(call);
        let e_ref = builder.local_ref(e);
        let throw = builder.throw_stmt(e_ref);
        let inner_body = builder.block(vec![call_stmt, throw]);
        let iae = builder.exception_parameter("iae", class("java.lang.IllegalArgumentException"));
        let empty = builder.block(vec![]);
        let inner_catch = builder.catch(iae, empty);
        let inner_parameter = inner_catch.parameter;
        let inner = builder.try_stmt(inner_body, vec![inner_catch], None);
        let outer_body = builder.block(vec![inner]);
        let rte = builder.exception_parameter("rte", class("java.lang.RuntimeException"));
        let empty = builder.block(vec![]);
        let outer_catch = builder.catch(rte, empty);
        let outer_parameter = outer_catch.parameter;
        let code = builder.try_stmt(outer_body, vec![outer_catch], None);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let settings = CfgSettings {
            unchecked_call_exceptions: false,
            ..CfgSettings::default()
        };
        let cfg = build_cfg(&ast, &table, code, &settings).unwrap();

        let inner_handler = cfg.block_of(cfg.node_for_tree(inner_parameter).unwrap()).unwrap();
        let outer_handler = cfg.block_of(cfg.node_for_tree(outer_parameter).unwrap()).unwrap();
        assert_ne!(inner_handler, outer_handler);
        let exceptional_successors = |kind: fn(&NodeKind) -> bool| {
            cfg.blocks()
                .find_map(|(_, block)| match &block.kind {
                    BlockKind::Exceptional(exceptional) if kind(&cfg.node(exceptional.node).kind) => {
                        Some(exceptional.exceptional_successors.clone())
                    }
                    _ => None,
                })
                .unwrap()
        };

        let thrown = exceptional_successors(|kind| matches!(kind, NodeKind::Throw { .. }));
        assert_eq!(thrown.len(), 1);
        assert_eq!(thrown[0].0, class("java.lang.IllegalArgumentException"));
        assert_eq!(thrown[0].1.as_slice(), &[inner_handler]);

        let invocation =
            exceptional_successors(|kind| matches!(kind, NodeKind::MethodInvocation { .. }));
        assert_eq!(invocation.len(), 1);
        assert_eq!(invocation[0].0, class("java.io.IOException"));
        assert_eq!(invocation[0].1.as_slice(), &[cfg.exceptional_exit()]);
    }

    #[test]
    fn short_circuit_value_has_one_node() {
        let mut builder = AstBuilder::new();
        let a = builder.parameter("a", Type::BOOLEAN);
        let b = builder.parameter("b", Type::BOOLEAN);
        let r = builder.local("r", Type::BOOLEAN);
        let a_ref = builder.local_ref(a);
        let b_ref = builder.local_ref(b);
        let and = builder.binary(BinaryOp::And, a_ref, b_ref);
        let code = builder.var_decl(r, Some(and));
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();

        let short_circuits: Vec<_> = cfg
            .nodes()
            .filter(|(_, node)| matches!(node.kind, NodeKind::ShortCircuit { .. }))
            .collect();
        let [(id, node)] = short_circuits.as_slice() else {
            panic!("expected exactly one short-circuit node");
        };
        assert_eq!(node.tree, Some(and));
        assert_eq!(cfg.node_for_tree(and), Some(*id));
        assert_eq!(
            node.kind,
            NodeKind::ShortCircuit {
                op: BinaryOp::And,
                lhs: cfg.node_for_tree(a_ref),
                rhs: cfg.node_for_tree(b_ref),
            }
        );
        assert!(cfg.block_of(*id).is_some());
        assert!(cfg.blocks().any(|(_, block)| block.kind.is_conditional()));
    }

    #[test]
    fn enhanced_for_over_array_uses_index() {
        let mut builder = AstBuilder::new();
        let ints = Type::array_of(Type::INT);
        let values = builder.parameter("values", ints.clone());
        let v = builder.local("v", Type::INT);
        let values_ref = builder.local_ref(values);
        let body = builder.block(vec![]);
        let code = builder.for_each(v, values_ref, body);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();

        let synthetics: Vec<_> = cfg.synthetic_locals().map(|(_, local)| local.clone()).collect();
        assert_eq!(synthetics.len(), 2);
        assert_eq!(&*synthetics[0].name, "array#num0");
        assert_eq!(synthetics[0].ty, ints);
        assert_eq!(&*synthetics[1].name, "index#num1");
        assert_eq!(synthetics[1].ty, Type::INT);

        let placed = |is_kind: fn(&NodeKind) -> bool| {
            cfg.nodes()
                .filter(|(id, node)| is_kind(&node.kind) && cfg.block_of(*id).is_some())
                .count()
        };
        assert_eq!(
            placed(|kind| matches!(kind, NodeKind::FieldAccess { field, .. } if &*field.name == "length")),
            1
        );
        assert_eq!(placed(|kind| matches!(kind, NodeKind::ArrayAccess { .. })), 1);
        assert_eq!(
            placed(|kind| matches!(kind, NodeKind::Unary { op: UnaryOp::PostIncrement, .. })),
            1
        );
        assert_eq!(
            placed(|kind| matches!(kind, NodeKind::Binary { op: BinaryOp::Lt, .. })),
            1
        );
        assert!(!cfg.nodes().any(|(_, node)| matches!(node.kind, NodeKind::MethodAccess { .. })));
    }

    #[test]
    fn labeled_jumps_leave_inner_loop() {
        let mut builder = AstBuilder::new();
        let c = builder.parameter("c", Type::BOOLEAN);
        let d = builder.parameter("d", Type::BOOLEAN);
        let e = builder.parameter("e", Type::BOOLEAN);
        let x = builder.local("x", Type::INT);
        let e_ref = builder.local_ref(e);
        let next = builder.continue_stmt(Some("outer"));
        let leave = builder.break_stmt(Some("outer"));
        let choose = builder.if_stmt(e_ref, next, Some(leave));
        let inner_body = builder.block(vec![choose]);
        let d_ref = builder.local_ref(d);
        let inner = builder.while_stmt(d_ref, inner_body);
        let outer_body = builder.block(vec![inner]);
        let c_ref = builder.local_ref(c);
        let outer = builder.while_stmt(c_ref, outer_body);
        let labeled = builder.labeled("outer", outer);
        let x_ref = builder.local_ref(x);
        let one = builder.int(1);
        let after = builder.assign(x_ref, one);
        let after_stmt = builder.expr_stmt(after);
        let code = builder.block(vec![labeled, after_stmt]);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();

        let outer_condition = cfg.block_of(cfg.node_for_tree(c_ref).unwrap()).unwrap();
        let post_loop = cfg.block_of(cfg.node_for_tree(after).unwrap()).unwrap();
        let choice = cfg.block_of(cfg.node_for_tree(e_ref).unwrap()).unwrap();
        let successors = cfg.successors(choice);
        let [branch] = successors.as_slice() else {
            panic!("the choice must flow into its branch");
        };
        let BlockKind::Conditional(conditional) = &cfg.block(*branch).kind else {
            panic!("expected a conditional block");
        };
        assert_eq!(conditional.then_successor, Some(outer_condition));
        assert_eq!(conditional.else_successor, Some(post_loop));
        assert!(cfg.predecessors(outer_condition).contains(branch));
        assert!(cfg.predecessors(post_loop).contains(branch));
    }

    #[test]
    fn ternary_value_is_computed_at_merge() {
        let mut builder = AstBuilder::new();
        let c = builder.parameter("c", Type::BOOLEAN);
        let r = builder.local("r", Type::INT);
        let c_ref = builder.local_ref(c);
        let one = builder.int(1);
        let two = builder.int(2);
        let ternary = builder.conditional(c_ref, one, two, Type::INT);
        let code = builder.var_decl(r, Some(ternary));
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();

        let node = cfg.node_for_tree(ternary).unwrap();
        assert_eq!(
            cfg.node(node).kind,
            NodeKind::Ternary {
                condition: cfg.node_for_tree(c_ref),
                then_value: cfg.node_for_tree(one).unwrap(),
                else_value: cfg.node_for_tree(two).unwrap(),
            }
        );

        let merge = cfg.block_of(node).unwrap();
        let then_block = cfg.block_of(cfg.node_for_tree(one).unwrap()).unwrap();
        let else_block = cfg.block_of(cfg.node_for_tree(two).unwrap()).unwrap();
        assert_ne!(then_block, else_block);
        assert_eq!(cfg.successors(then_block).as_slice(), &[merge]);
        assert_eq!(cfg.successors(else_block).as_slice(), &[merge]);

        let (_, BlockKind::Conditional(conditional)) = cfg
            .blocks()
            .find(|(_, block)| block.kind.is_conditional())
            .map(|(id, block)| (id, &block.kind))
            .unwrap()
        else {
            panic!("expected a conditional block");
        };
        assert_eq!(conditional.then_successor, Some(then_block));
        assert_eq!(conditional.else_successor, Some(else_block));
    }

    #[test]
    fn compound_assignment_target_keeps_its_lookup() {
        let mut builder = AstBuilder::new();
        let b = builder.parameter("b", Type::BYTE);
        let b_ref = builder.local_ref(b);
        let one = builder.int(1);
        let increment = builder.compound_assign(BinaryOp::Add, b_ref, one);
        let code = builder.expr_stmt(increment);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();

        let target = cfg.node_for_tree(b_ref).unwrap();
        assert_eq!(cfg.node(target).kind, NodeKind::LocalVariable(Variable::Declared(b)));
        assert!(cfg.node(target).lvalue);
        assert!(cfg.nodes().any(|(_, node)| node.kind
            == NodeKind::Conversion {
                kind: ConversionKind::Widening,
                operand: target,
            }));

        let result = cfg.node_for_tree(increment).unwrap();
        assert!(matches!(
            cfg.node(result).kind,
            NodeKind::Conversion {
                kind: ConversionKind::Narrowing,
                ..
            }
        ));
        assert_eq!(cfg.node(result).ty, Type::BYTE);
    }

    fn return_in_try_finally(settings: &CfgSettings) -> (usize, bool) {
        let mut builder = AstBuilder::new();
        let x = builder.local("x", Type::INT);
        let one = builder.int(1);
        let ret = builder.return_stmt(Some(one));
        let body = builder.block(vec![ret]);
        let x_ref = builder.local_ref(x);
        let two = builder.int(2);
        let assign = builder.assign(x_ref, two);
        let assign_stmt = builder.expr_stmt(assign);
        let finally = builder.block(vec![assign_stmt]);
        let code = builder.try_stmt(body, vec![], Some(finally));
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, settings).unwrap();

        let block = cfg.block_of(cfg.return_nodes()[0]).unwrap();
        assert_eq!(cfg.successors(block).as_slice(), &[cfg.regular_exit()]);
        let runs_finally = cfg
            .block(block)
            .nodes()
            .iter()
            .any(|node| cfg.node(*node).tree == Some(assign));
        (cfg.block(block).nodes().len(), runs_finally)
    }

    #[test]
    fn return_runs_finally_block() {
        // marker, 1, return 1, x, 2, x = 2
        assert_eq!(return_in_try_finally(&CfgSettings::default()), (6, true));
    }

    #[test]
    fn return_skips_finally_block_when_disabled() {
        let settings = CfgSettings {
            finally_on_abrupt_exit: false,
            ..CfgSettings::default()
        };
        assert_eq!(return_in_try_finally(&settings), (3, false));
    }

    #[test]
    fn switch_falls_through_to_next_case() {
        let mut builder = AstBuilder::new();
        let x = builder.parameter("x", Type::INT);
        let y = builder.local("y", Type::INT);
        let selector = builder.local_ref(x);
        let one = builder.int(1);
        let y_ref = builder.local_ref(y);
        let first_value = builder.int(1);
        let first = builder.assign(y_ref, first_value);
        let first_stmt = builder.expr_stmt(first);
        let y_ref = builder.local_ref(y);
        let second_value = builder.int(2);
        let second = builder.assign(y_ref, second_value);
        let second_stmt = builder.expr_stmt(second);
        let code = builder.switch_stmt(
            selector,
            vec![
                AstBuilder::case(Some(one), vec![first_stmt]),
                AstBuilder::case(None, vec![second_stmt]),
            ],
        );
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();

        let (branch, BlockKind::Conditional(conditional)) = cfg
            .blocks()
            .find(|(_, block)| block.kind.is_conditional())
            .map(|(id, block)| (id, &block.kind))
            .unwrap()
        else {
            panic!("expected a conditional block");
        };
        let case_block = cfg.block_of(cfg.node_for_tree(first).unwrap()).unwrap();
        let default_block = cfg.block_of(cfg.node_for_tree(second).unwrap()).unwrap();
        assert_eq!(conditional.then_successor, Some(case_block));
        assert_eq!(conditional.else_successor, Some(default_block));
        assert_eq!(cfg.successors(case_block).as_slice(), &[default_block]);
        assert_eq!(cfg.successors(default_block).as_slice(), &[cfg.regular_exit()]);

        let predecessors: Vec<_> = cfg.predecessors(branch).iter().copied().collect();
        let [test_block] = predecessors.as_slice() else {
            panic!("the branch must have one predecessor");
        };
        let last = *cfg.block(*test_block).nodes().last().unwrap();
        assert!(matches!(cfg.node(last).kind, NodeKind::Case { .. }));
    }

    #[test]
    fn lambda_is_unsupported() {
        let mut builder = AstBuilder::new();
        let body = builder.block(vec![]);
        let lambda = builder.lambda(body, class("java.lang.Runnable"));
        let code = builder.expr_stmt(lambda);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let error = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap_err();
        assert!(
            matches!(&error, CfgError::UnsupportedConstruct { construct, .. } if construct == "lambda expression"),
            "{error:?}"
        );
    }

    #[test]
    fn break_outside_loop() {
        let mut builder = AstBuilder::new();
        let code = builder.break_stmt(None);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let error = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap_err();
        assert!(
            matches!(
                &error,
                CfgError::InvariantViolation(InvariantViolation::MissingJumpTarget(target)) if target == "break"
            ),
            "{error:?}"
        );
    }

    #[test]
    fn method_entry_point_rejects_other_trees() {
        let mut builder = AstBuilder::new();
        let code = builder.block(vec![]);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let error = build_cfg_for_method(&ast, &table, code, &CfgSettings::default()).unwrap_err();
        assert!(matches!(error, CfgError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn method_body_is_lowered() {
        let mut builder = AstBuilder::new();
        let a = builder.parameter("a", Type::INT);
        let a_ref = builder.local_ref(a);
        let ret = builder.return_stmt(Some(a_ref));
        let body = builder.block(vec![ret]);
        let method = builder.method("identity", vec![a], Type::INT, body);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg_for_method(&ast, &table, method, &CfgSettings::default()).unwrap();
        assert_eq!(cfg.underlying_ast().code(), body);
        assert_eq!(cfg.return_nodes().len(), 1);
        // Parameters are declared before the graph starts.
        assert!(!cfg
            .nodes()
            .any(|(_, node)| matches!(node.kind, NodeKind::VariableDeclaration(_))));
    }

    #[test]
    fn enhanced_for_over_list_uses_iterator() {
        let mut builder = AstBuilder::new();
        let string = class("java.lang.String");
        let list = builder.parameter("list", Type::generic("java.util.List", [string.clone()]));
        let s = builder.local("s", string.clone());
        let list_ref = builder.local_ref(list);
        let body = builder.block(vec![]);
        let code = builder.for_each(s, list_ref, body);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, code, &CfgSettings::default()).unwrap();

        let synthetics: Vec<_> = cfg.synthetic_locals().map(|(_, local)| local.clone()).collect();
        assert_eq!(synthetics.len(), 1);
        assert_eq!(&*synthetics[0].name, "iter#num0");
        assert_eq!(synthetics[0].ty, Type::generic("java.util.Iterator", [string.clone()]));

        let calls: Vec<&str> = cfg
            .nodes()
            .filter_map(|(_, node)| match &node.kind {
                NodeKind::MethodAccess { method, .. } => Some(&*method.name),
                _ => None,
            })
            .collect();
        assert_eq!(calls, ["iterator", "hasNext", "next"]);

        let declaration = cfg
            .nodes()
            .find(|(_, node)| node.kind == NodeKind::VariableDeclaration(Variable::Declared(s)))
            .map(|(id, _)| id)
            .unwrap();
        assert!(cfg.block_of(declaration).is_some());
        assert_eq!(
            cfg.blocks().filter(|(_, block)| block.kind.is_conditional()).count(),
            1
        );
    }

    #[test_case(true; "simplified")]
    #[test_case(false; "unsimplified")]
    fn predecessors_mirror_successors(simplify: bool) {
        let mut builder = AstBuilder::new();
        let i = builder.local("i", Type::INT);
        let zero = builder.int(0);
        let init = builder.var_decl(i, Some(zero));
        let i_ref = builder.local_ref(i);
        let ten = builder.int(10);
        let condition = builder.binary(BinaryOp::Lt, i_ref, ten);
        let i_ref = builder.local_ref(i);
        let step = builder.unary(UnaryOp::PostIncrement, i_ref);
        let step = builder.expr_stmt(step);
        let i_ref = builder.local_ref(i);
        let five = builder.int(5);
        let is_five = builder.binary(BinaryOp::Eq, i_ref, five);
        let skip = builder.continue_stmt(None);
        let check = builder.if_stmt(is_five, skip, None);
        let e = builder.local("e", class("java.lang.IllegalStateException"));
        let e_ref = builder.local_ref(e);
        let throw = builder.throw_stmt(e_ref);
        let caught = builder.exception_parameter("caught", class("java.lang.RuntimeException"));
        let handler = builder.block(vec![]);
        let catch = builder.catch(caught, handler);
        let guarded = builder.try_stmt(throw, vec![catch], None);
        let body = builder.block(vec![check, guarded]);
        let code = builder.for_stmt(vec![init], Some(condition), vec![step], body);
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let settings = CfgSettings {
            simplify,
            ..CfgSettings::default()
        };
        let cfg = build_cfg(&ast, &table, code, &settings).unwrap();

        for (id, block) in cfg.blocks() {
            for successor in block.successors() {
                assert!(cfg.predecessors(successor).contains(&id));
            }
            for predecessor in block.predecessors() {
                assert!(cfg.successors(*predecessor).contains(&id));
            }
        }
    }
}

//! Phase one: lowering a tree to a flat sequence of extended nodes.
use jflow_ast::{
    Ast, BinaryOp, FieldRef, ForEach, Literal, LocalId, MethodRef, Switch, TreeId, TreeKind, Try,
    Type, TypeQuery, UnaryOp, WellKnownType,
};
use la_arena::Arena;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::cfg::builder::try_stack::{TryFrame, TryStack};
use crate::cfg::builder::{
    ExtendedKind, ExtendedNode, Label, LabelTable, PhaseOneResult, REGULAR_EXIT,
};
use crate::cfg::graph::UnderlyingAst;
use crate::cfg::node::{Node, NodeId, NodeKind, SyntheticLocal, Variable};
use crate::error::{CfgError, CfgResult, InvariantViolation};
use crate::settings::CfgSettings;

/// A jump target together with the number of `finally` scopes that enclose
/// it. Jumping to it from deeper inside runs the `finally` blocks in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct JumpTarget {
    label: Label,
    finally_depth: usize,
}

/// Abrupt exits from the protected part of a `try` with a `finally` block.
/// Each distinct target gets its own copy of the `finally` block.
#[derive(Debug, Default)]
pub(super) struct FinallyScope {
    exits: Vec<(JumpTarget, Label)>,
}

#[derive(Debug)]
struct LabelScope<'c> {
    name: &'c str,
    break_target: JumpTarget,
    continue_target: JumpTarget,
    parent: Option<&'c LabelScope<'c>>,
}

impl<'c> LabelScope<'c> {
    fn find(&self, name: &str) -> Option<&LabelScope<'c>> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if current.name == name {
                return Some(current);
            }
            scope = current.parent;
        }
        None
    }
}

/// What a statement's translation depends on besides the statement itself.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct Context<'c> {
    break_target: Option<JumpTarget>,
    continue_target: Option<JumpTarget>,
    labels: Option<&'c LabelScope<'c>>,
    /// The continue label registered by a labeled statement for the loop
    /// directly inside it.
    pending_continue: Option<Label>,
}

impl Context<'_> {
    fn with_break(self, break_target: JumpTarget) -> Self {
        Self {
            break_target: Some(break_target),
            ..self
        }
    }

    fn in_loop(self, break_target: JumpTarget, continue_target: JumpTarget) -> Self {
        Self {
            break_target: Some(break_target),
            continue_target: Some(continue_target),
            ..self
        }
    }
}

pub(super) struct Linearizer<'a> {
    pub(super) ast: &'a Ast,
    pub(super) types: &'a dyn TypeQuery,
    pub(super) settings: &'a CfgSettings,
    pub(super) nodes: Arena<Node>,
    sequence: Vec<ExtendedNode>,
    labels: LabelTable,
    leaders: FxHashSet<usize>,
    try_stack: TryStack,
    pub(super) tree_lookup: FxHashMap<TreeId, NodeId>,
    return_nodes: Vec<NodeId>,
    synthetic_locals: Arena<SyntheticLocal>,
    declared_classes: Vec<TreeId>,
    finally_scopes: Vec<FinallyScope>,
    uid: u32,
}

impl<'a> Linearizer<'a> {
    pub(super) fn new(ast: &'a Ast, types: &'a dyn TypeQuery, settings: &'a CfgSettings) -> Self {
        Self {
            ast,
            types,
            settings,
            nodes: Arena::default(),
            sequence: Vec::new(),
            labels: LabelTable::new(),
            leaders: FxHashSet::default(),
            try_stack: TryStack::default(),
            tree_lookup: FxHashMap::default(),
            return_nodes: Vec::new(),
            synthetic_locals: Arena::default(),
            declared_classes: Vec::new(),
            finally_scopes: Vec::new(),
            uid: 0,
        }
    }

    pub(super) fn linearize(mut self, underlying: UnderlyingAst) -> CfgResult<PhaseOneResult> {
        self.lower_statement(underlying.code(), Context::default())?;
        // Falling off the end is a normal exit.
        self.extend_jump(REGULAR_EXIT);

        Ok(PhaseOneResult {
            sequence: self.sequence,
            labels: self.labels,
            leaders: self.leaders,
            nodes: self.nodes,
            tree_lookup: self.tree_lookup,
            return_nodes: self.return_nodes,
            synthetic_locals: self.synthetic_locals,
            declared_classes: self.declared_classes,
            underlying,
        })
    }

    // Emission

    pub(super) fn new_node(&mut self, kind: NodeKind, tree: Option<TreeId>, ty: Type) -> NodeId {
        self.nodes.alloc(Node {
            kind,
            tree,
            ty,
            lvalue: false,
        })
    }

    fn record(&mut self, node: NodeId) {
        if let Some(tree) = self.nodes[node].tree {
            self.tree_lookup.entry(tree).or_insert(node);
        }
    }

    fn push(&mut self, kind: ExtendedKind, terminates_execution: bool) {
        self.sequence
            .push(ExtendedNode::new(kind, terminates_execution));
    }

    /// Appends an already allocated node as a plain computation.
    pub(super) fn extend(&mut self, node: NodeId) -> NodeId {
        self.record(node);
        self.push(ExtendedKind::Computation(node), false);
        node
    }

    pub(super) fn extend_node(&mut self, kind: NodeKind, tree: Option<TreeId>, ty: Type) -> NodeId {
        let node = self.new_node(kind, tree, ty);
        self.extend(node)
    }

    /// Appends a conversion of `operand`. The conversion takes over the
    /// operand's tree, so lookups yield the converted value. Assignment
    /// targets keep the lookup on the variable itself.
    pub(super) fn extend_conversion(&mut self, kind: NodeKind, operand: NodeId, ty: Type) -> NodeId {
        let tree = self.nodes[operand].tree;
        let node = self.new_node(kind, tree, ty);
        if let Some(tree) = tree.filter(|_| !self.nodes[operand].lvalue) {
            self.tree_lookup.insert(tree, node);
        }
        self.push(ExtendedKind::Computation(node), false);
        node
    }

    /// Appends a node that may raise any of `causes`, routing each cause to
    /// the handlers active at this point.
    pub(super) fn extend_with_exceptions(
        &mut self,
        node: NodeId,
        causes: impl IntoIterator<Item = Type>,
        terminates_execution: bool,
    ) -> NodeId {
        self.record(node);
        let mut exceptions: Vec<(Type, _)> = Vec::new();
        for cause in causes {
            if exceptions.iter().any(|(existing, _)| *existing == cause) {
                continue;
            }
            let labels = self.try_stack.possible_labels(self.types, &cause);
            exceptions.push((cause, labels));
        }
        let kind = if exceptions.is_empty() {
            ExtendedKind::Computation(node)
        } else {
            ExtendedKind::ComputationWithExceptions { node, exceptions }
        };
        self.push(kind, terminates_execution);
        node
    }

    pub(super) fn extend_jump(&mut self, label: Label) {
        self.push(ExtendedKind::UnconditionalJump(label), false);
    }

    pub(super) fn extend_conditional_jump(&mut self, then_label: Label, else_label: Label) {
        self.push(
            ExtendedKind::ConditionalJump {
                then_label,
                else_label,
            },
            false,
        );
    }

    pub(super) fn fresh_label(&mut self) -> Label {
        self.labels.fresh()
    }

    /// Binds `label` to the next position, which starts a new block.
    pub(super) fn bind(&mut self, label: Label) {
        let position = self.sequence.len();
        self.labels.bind(label, position);
        self.leaders.insert(position);
    }

    fn extend_marker(&mut self, tree: TreeId, message: &str) -> NodeId {
        self.extend_node(NodeKind::Marker(message.into()), Some(tree), Type::Void)
    }

    pub(super) fn well_known(&self, which: WellKnownType) -> Type {
        self.types.well_known(which)
    }

    pub(super) fn unsupported(&self, tree: TreeId, construct: impl Into<String>) -> CfgError {
        CfgError::UnsupportedConstruct {
            construct: construct.into(),
            range: self.ast.tree(tree).range,
        }
    }

    fn synthetic(&mut self, prefix: &str, ty: Type) -> Variable {
        let name = format!("{prefix}#num{}", self.uid);
        self.uid += 1;
        Variable::Synthetic(self.synthetic_locals.alloc(SyntheticLocal {
            name: name.into(),
            ty,
        }))
    }

    fn variable_type(&self, variable: Variable) -> Type {
        match variable {
            Variable::Declared(local) => self.ast.local(local).ty.clone(),
            Variable::Synthetic(synthetic) => self.synthetic_locals[synthetic].ty.clone(),
        }
    }

    /// Assigns an already lowered value to a variable. The target is not part
    /// of the sequence; it only names the variable being written.
    fn assign_variable(&mut self, variable: Variable, value: NodeId, tree: Option<TreeId>) -> NodeId {
        let ty = self.variable_type(variable);
        let value = self.assign_convert(value, &ty);
        let target = self.new_node(NodeKind::LocalVariable(variable), None, ty.clone());
        self.nodes[target].lvalue = true;
        self.extend_node(NodeKind::Assignment { target, value }, tree, ty)
    }

    /// Where a jump to `target` must go from here: the target itself, or the
    /// copy of the innermost `finally` block that runs on the way there.
    fn exit_route(&mut self, target: JumpTarget) -> Label {
        if !self.settings.finally_on_abrupt_exit || self.finally_scopes.len() <= target.finally_depth {
            return target.label;
        }
        let Some(scope) = self.finally_scopes.last_mut() else {
            return target.label;
        };
        if let Some((_, label)) = scope.exits.iter().find(|(exit, _)| *exit == target) {
            return *label;
        }
        let label = self.labels.fresh();
        scope.exits.push((target, label));
        label
    }

    fn jump_target(&self, label: Label) -> JumpTarget {
        JumpTarget {
            label,
            finally_depth: self.finally_scopes.len(),
        }
    }

    // Statements

    pub(super) fn lower_statement(&mut self, id: TreeId, ctx: Context<'_>) -> CfgResult<()> {
        let pending_continue = ctx.pending_continue;
        let ctx = Context {
            pending_continue: None,
            ..ctx
        };

        let ast = self.ast;
        match ast.kind(id) {
            TreeKind::Block(statements) => {
                for statement in statements {
                    self.lower_statement(*statement, ctx)?;
                }
            }
            TreeKind::Empty => {}
            TreeKind::ExprStmt(expr) => {
                self.lower_expression(*expr)?;
            }
            TreeKind::VariableDecl(decl) => {
                self.lower_variable_decl(id, decl.local, decl.init)?;
            }
            TreeKind::If(stmt) => {
                let then_entry = self.fresh_label();
                let else_entry = self.fresh_label();
                let end = self.fresh_label();

                self.lower_condition(stmt.condition, then_entry, else_entry)?;

                self.bind(then_entry);
                self.lower_statement(stmt.then_stmt, ctx)?;
                self.extend_jump(end);

                self.bind(else_entry);
                if let Some(else_stmt) = stmt.else_stmt {
                    self.lower_statement(else_stmt, ctx)?;
                }
                self.bind(end);
            }
            TreeKind::While(stmt) => {
                let condition_start = pending_continue.unwrap_or_else(|| self.fresh_label());
                let entry = self.fresh_label();
                let exit = self.fresh_label();
                let body_ctx = ctx.in_loop(self.jump_target(exit), self.jump_target(condition_start));

                self.bind(condition_start);
                self.lower_condition(stmt.condition, entry, exit)?;

                self.bind(entry);
                self.lower_statement(stmt.body, body_ctx)?;
                self.extend_jump(condition_start);

                self.bind(exit);
            }
            TreeKind::DoWhile(stmt) => {
                let condition_start = pending_continue.unwrap_or_else(|| self.fresh_label());
                let entry = self.fresh_label();
                let exit = self.fresh_label();
                let body_ctx = ctx.in_loop(self.jump_target(exit), self.jump_target(condition_start));

                self.bind(entry);
                self.lower_statement(stmt.body, body_ctx)?;

                self.bind(condition_start);
                self.lower_condition(stmt.condition, entry, exit)?;

                self.bind(exit);
            }
            TreeKind::For(stmt) => {
                let condition_start = self.fresh_label();
                let entry = self.fresh_label();
                let exit = self.fresh_label();
                let update_start = pending_continue.unwrap_or_else(|| self.fresh_label());
                let body_ctx = ctx.in_loop(self.jump_target(exit), self.jump_target(update_start));

                for init in &stmt.init {
                    self.lower_statement(*init, ctx)?;
                }

                self.bind(condition_start);
                if let Some(condition) = stmt.condition {
                    self.lower_condition(condition, entry, exit)?;
                }

                self.bind(entry);
                self.lower_statement(stmt.body, body_ctx)?;

                self.bind(update_start);
                for update in &stmt.update {
                    self.lower_statement(*update, ctx)?;
                }
                self.extend_jump(condition_start);

                self.bind(exit);
            }
            TreeKind::ForEach(stmt) => self.lower_for_each(id, stmt, ctx, pending_continue)?,
            TreeKind::Labeled(stmt) => {
                let break_label = self.fresh_label();
                let continue_label = self.fresh_label();
                let scope = LabelScope {
                    name: &stmt.label,
                    break_target: self.jump_target(break_label),
                    continue_target: self.jump_target(continue_label),
                    parent: ctx.labels,
                };
                let body_ctx = Context {
                    labels: Some(&scope),
                    pending_continue: Some(continue_label),
                    ..ctx
                };
                self.lower_statement(stmt.body, body_ctx)?;
                self.bind(break_label);
            }
            TreeKind::Break(label) => {
                let target = match label {
                    Some(name) => ctx
                        .labels
                        .and_then(|labels| labels.find(name))
                        .map(|scope| scope.break_target),
                    None => ctx.break_target,
                };
                let target = target.ok_or_else(|| {
                    InvariantViolation::MissingJumpTarget(jump_description("break", label.as_deref()))
                })?;
                let label = self.exit_route(target);
                self.extend_jump(label);
            }
            TreeKind::Continue(label) => {
                let target = match label {
                    Some(name) => ctx
                        .labels
                        .and_then(|labels| labels.find(name))
                        .map(|scope| scope.continue_target),
                    None => ctx.continue_target,
                };
                let target = target.ok_or_else(|| {
                    InvariantViolation::MissingJumpTarget(jump_description(
                        "continue",
                        label.as_deref(),
                    ))
                })?;
                let label = self.exit_route(target);
                self.extend_jump(label);
            }
            TreeKind::Return(value) => {
                if let Some(value) = value {
                    let value = self.lower_expression(*value)?;
                    let node = self.extend_node(NodeKind::Return { value }, Some(id), Type::Void);
                    self.return_nodes.push(node);
                }
                let label = self.exit_route(JumpTarget {
                    label: REGULAR_EXIT,
                    finally_depth: 0,
                });
                self.extend_jump(label);
            }
            TreeKind::Throw(exception) => {
                let exception = self.lower_expression(*exception)?;
                let cause = self.nodes[exception].ty.clone();
                let node = self.new_node(NodeKind::Throw { exception }, Some(id), Type::Void);
                self.extend_with_exceptions(node, [cause], true);
            }
            TreeKind::Try(stmt) => self.lower_try(id, stmt, ctx)?,
            TreeKind::Switch(stmt) => self.lower_switch(id, stmt, ctx)?,
            TreeKind::Synchronized(stmt) => {
                self.lower_expression(stmt.lock)?;
                self.extend_marker(id, "start of synchronized block");
                self.lower_statement(stmt.body, ctx)?;
                self.extend_marker(id, "end of synchronized block");
            }
            TreeKind::Assert(stmt) => {
                let condition = self.lower_expression(stmt.condition)?;
                let condition = self.unbox(condition);
                let detail = match stmt.detail {
                    Some(detail) => Some(self.lower_expression(detail)?),
                    None => None,
                };
                self.extend_node(NodeKind::Assert { condition, detail }, Some(id), Type::Void);
            }
            TreeKind::ClassDecl(_) => self.declared_classes.push(id),
            TreeKind::MethodDecl(_) => {
                return Err(self.unsupported(id, "nested method declaration"));
            }
            _ => {
                self.lower_expression(id)?;
            }
        }
        Ok(())
    }

    fn lower_variable_decl(
        &mut self,
        id: TreeId,
        local: LocalId,
        init: Option<TreeId>,
    ) -> CfgResult<()> {
        let variable = Variable::Declared(local);
        self.extend_node(NodeKind::VariableDeclaration(variable), Some(id), Type::Void);
        if let Some(init) = init {
            let value = self.lower_expression(init)?;
            self.assign_variable(variable, value, Some(id));
        }
        Ok(())
    }

    fn lower_for_each(
        &mut self,
        id: TreeId,
        stmt: &ForEach,
        ctx: Context<'_>,
        pending_continue: Option<Label>,
    ) -> CfgResult<()> {
        let TreeKind::VariableDecl(decl) = self.ast.kind(stmt.variable) else {
            return Err(self.unsupported(stmt.variable, "enhanced for loop without a loop variable"));
        };
        let variable = Variable::Declared(decl.local);

        let condition_start = self.fresh_label();
        let entry = self.fresh_label();
        let exit = self.fresh_label();
        let update_start = pending_continue.unwrap_or_else(|| self.fresh_label());
        let body_ctx = ctx.in_loop(self.jump_target(exit), self.jump_target(update_start));

        let iterable_ty = self.ast.type_of(stmt.iterable).clone();
        let iterable = self.types.erasure(&self.well_known(WellKnownType::Iterable));

        if self.types.is_subtype(&iterable_ty, &iterable) {
            let receiver_ty = iterable_ty.upper_bound().clone();
            let iterator = self.require_method(id, &receiver_ty, "iterator")?;
            let iterator_ty = iterator.return_type.clone();
            let has_next = self.require_method(id, &iterator_ty, "hasNext")?;
            let next = self.require_method(id, &iterator_ty, "next")?;

            let iterator_var = self.synthetic("iter", iterator_ty.clone());
            self.extend_node(NodeKind::VariableDeclaration(iterator_var), None, Type::Void);
            let receiver = self.lower_expression(stmt.iterable)?;
            let call = self.extend_call(receiver, iterator);
            self.assign_variable(iterator_var, call, None);

            self.bind(condition_start);
            let receiver =
                self.extend_node(NodeKind::LocalVariable(iterator_var), None, iterator_ty.clone());
            let has_next = self.extend_call(receiver, has_next);
            let has_next = self.unbox(has_next);
            self.expect_boolean(has_next)?;
            self.extend_conditional_jump(entry, exit);

            self.bind(entry);
            self.extend_node(NodeKind::VariableDeclaration(variable), Some(stmt.variable), Type::Void);
            let receiver = self.extend_node(NodeKind::LocalVariable(iterator_var), None, iterator_ty);
            let element = self.extend_call(receiver, next);
            self.assign_variable(variable, element, Some(stmt.variable));

            self.lower_statement(stmt.body, body_ctx)?;

            self.bind(update_start);
            self.extend_jump(condition_start);
        } else if let Some(element_ty) = iterable_ty.element_type().cloned() {
            let array_var = self.synthetic("array", iterable_ty.clone());
            self.extend_node(NodeKind::VariableDeclaration(array_var), None, Type::Void);
            let array = self.lower_expression(stmt.iterable)?;
            self.assign_variable(array_var, array, None);

            let index_var = self.synthetic("index", Type::INT);
            self.extend_node(NodeKind::VariableDeclaration(index_var), None, Type::Void);
            let zero = self.extend_node(NodeKind::Literal(Literal::Int(0)), None, Type::INT);
            self.assign_variable(index_var, zero, None);

            self.bind(condition_start);
            let index = self.extend_node(NodeKind::LocalVariable(index_var), None, Type::INT);
            let array = self.extend_node(NodeKind::LocalVariable(array_var), None, iterable_ty.clone());
            let length = self.extend_node(
                NodeKind::FieldAccess {
                    receiver: array,
                    field: FieldRef::new(iterable_ty.clone(), "length", Type::INT),
                },
                None,
                Type::INT,
            );
            self.extend_node(
                NodeKind::Binary {
                    op: BinaryOp::Lt,
                    lhs: index,
                    rhs: length,
                },
                None,
                Type::BOOLEAN,
            );
            self.extend_conditional_jump(entry, exit);

            self.bind(entry);
            self.extend_node(NodeKind::VariableDeclaration(variable), Some(stmt.variable), Type::Void);
            let array = self.extend_node(NodeKind::LocalVariable(array_var), None, iterable_ty);
            let index = self.extend_node(NodeKind::LocalVariable(index_var), None, Type::INT);
            let element = self.extend_node(NodeKind::ArrayAccess { array, index }, None, element_ty);
            self.assign_variable(variable, element, Some(stmt.variable));

            self.lower_statement(stmt.body, body_ctx)?;

            self.bind(update_start);
            let index = self.extend_node(NodeKind::LocalVariable(index_var), None, Type::INT);
            self.extend_node(
                NodeKind::Unary {
                    op: UnaryOp::PostIncrement,
                    operand: index,
                },
                None,
                Type::INT,
            );
            self.extend_jump(condition_start);
        } else {
            return Err(self.unsupported(
                id,
                format!("enhanced for loop over `{iterable_ty}`"),
            ));
        }

        self.bind(exit);
        Ok(())
    }

    fn require_method(&self, tree: TreeId, receiver: &Type, name: &str) -> CfgResult<MethodRef> {
        self.types
            .lookup_method(receiver, name, 0)
            .ok_or_else(|| self.unsupported(tree, format!("enhanced for loop: `{receiver}` has no `{name}()`")))
    }

    /// Appends a call without arguments that the builder synthesized, e.g.
    /// `hasNext()` of an enhanced `for`.
    fn extend_call(&mut self, receiver: NodeId, method: MethodRef) -> NodeId {
        let ty = method.return_type.clone();
        let target = self.extend_node(NodeKind::MethodAccess { receiver, method }, None, ty.clone());
        self.extend_node(
            NodeKind::MethodInvocation {
                target,
                args: Vec::new(),
            },
            None,
            ty,
        )
    }

    fn lower_switch(&mut self, id: TreeId, stmt: &Switch, ctx: Context<'_>) -> CfgResult<()> {
        let selector = self.lower_expression(stmt.selector)?;
        let selector = self.unbox(selector);
        self.extend_marker(id, "start of switch statement");

        let break_label = self.fresh_label();
        let body_labels: Vec<Label> = stmt.cases.iter().map(|_| self.fresh_label()).collect();
        let mut default = None;

        for (case, body_label) in stmt.cases.iter().zip(&body_labels) {
            let Some(expr) = case.expr else {
                default = Some(*body_label);
                continue;
            };
            let test = self.lower_expression(expr)?;
            self.extend_node(NodeKind::Case { selector, test }, None, Type::BOOLEAN);
            let next_case = self.fresh_label();
            self.extend_conditional_jump(*body_label, next_case);
            self.bind(next_case);
        }
        self.extend_jump(default.unwrap_or(break_label));

        let body_ctx = ctx.with_break(self.jump_target(break_label));
        for (case, body_label) in stmt.cases.iter().zip(body_labels) {
            self.bind(body_label);
            for statement in &case.body {
                self.lower_statement(*statement, body_ctx)?;
            }
        }

        self.bind(break_label);
        Ok(())
    }

    fn lower_try(&mut self, id: TreeId, stmt: &Try, ctx: Context<'_>) -> CfgResult<()> {
        self.extend_marker(id, "start of try statement");

        let mut catch_labels = Vec::with_capacity(stmt.catches.len());
        for catch in &stmt.catches {
            let TreeKind::VariableDecl(parameter) = self.ast.kind(catch.parameter) else {
                return Err(self.unsupported(catch.parameter, "catch clause without a parameter"));
            };
            let caught = self.ast.local(parameter.local).ty.clone();
            catch_labels.push((caught, self.fresh_label()));
        }
        let finally = stmt.finally.map(|block| (block, self.fresh_label()));
        let done = self.fresh_label();

        let finally_frame = finally.map(|(_, label)| {
            self.finally_scopes.push(FinallyScope::default());
            self.try_stack.push(TryFrame::Finally(label))
        });
        let catch_frame = self.try_stack.push(TryFrame::Catch(catch_labels.clone()));

        let after_protected = finally.map_or(done, |(_, label)| label);
        self.lower_statement(stmt.block, ctx)?;
        self.extend_jump(after_protected);

        self.try_stack.pop(catch_frame)?;

        for (catch, (_, label)) in stmt.catches.iter().zip(catch_labels) {
            self.bind(label);
            self.lower_statement(catch.parameter, ctx)?;
            self.lower_statement(catch.body, ctx)?;
            self.extend_jump(after_protected);
        }

        if let (Some((block, label)), Some(frame)) = (finally, finally_frame) {
            self.try_stack.pop(frame)?;
            let scope = self.finally_scopes.pop().unwrap_or_default();

            self.bind(label);
            self.lower_statement(block, ctx)?;
            // Rethrows whatever exception entered the finally block.
            let marker = self.new_node(
                NodeKind::Marker("end of finally block".into()),
                Some(id),
                Type::Void,
            );
            let throwable = self.well_known(WellKnownType::Throwable);
            self.extend_with_exceptions(marker, [throwable], false);
            self.extend_jump(done);

            for (target, entry) in scope.exits {
                self.bind(entry);
                self.lower_statement(block, ctx)?;
                let label = self.exit_route(target);
                self.extend_jump(label);
            }
        }

        self.bind(done);
        Ok(())
    }

    // Conditions

    /// Lowers a boolean expression that decides between two labels. Returns
    /// the node holding the condition's value, or `None` if the condition
    /// was lowered purely as branches.
    pub(super) fn lower_condition(
        &mut self,
        id: TreeId,
        then_label: Label,
        else_label: Label,
    ) -> CfgResult<Option<NodeId>> {
        let id = self.ast.skip_parens(id);
        match self.ast.kind(id) {
            TreeKind::Literal(Literal::Boolean(value)) => {
                let node = self.lower_expression(id)?;
                self.extend_jump(if *value { then_label } else { else_label });
                Ok(Some(node))
            }
            TreeKind::Binary(binary) if binary.op.is_short_circuit() => {
                self.lower_short_circuit(binary.op, binary.lhs, binary.rhs, then_label, else_label)?;
                Ok(None)
            }
            _ => {
                let node = self.lower_expression(id)?;
                let node = self.unbox(node);
                self.expect_boolean(node)?;
                self.extend_conditional_jump(then_label, else_label);
                Ok(Some(node))
            }
        }
    }

    /// Lowers `lhs && rhs` or `lhs || rhs` as branches to `then_label` and
    /// `else_label`. The right operand is only reached when it decides the
    /// result.
    pub(super) fn lower_short_circuit(
        &mut self,
        op: BinaryOp,
        lhs: TreeId,
        rhs: TreeId,
        then_label: Label,
        else_label: Label,
    ) -> CfgResult<(Option<NodeId>, Option<NodeId>)> {
        let right_start = self.fresh_label();
        let lhs = if op == BinaryOp::And {
            self.lower_condition(lhs, right_start, else_label)?
        } else {
            self.lower_condition(lhs, then_label, right_start)?
        };
        self.bind(right_start);
        let rhs = self.lower_condition(rhs, then_label, else_label)?;
        Ok((lhs, rhs))
    }

    fn expect_boolean(&self, node: NodeId) -> Result<(), InvariantViolation> {
        let ty = &self.nodes[node].ty;
        if self.types.is_boolean(ty) {
            Ok(())
        } else {
            Err(InvariantViolation::NonBooleanCondition(ty.to_string()))
        }
    }
}

fn jump_description(keyword: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{keyword} {label}"),
        None => keyword.to_string(),
    }
}

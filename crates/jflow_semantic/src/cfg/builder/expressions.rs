use jflow_ast::{
    BinaryOp, CompoundAssign, Member, MemberSelect, MethodRef, NewClass, Symbol, TreeId, TreeKind,
    Type, UnaryOp, WellKnownType,
};

use crate::cfg::builder::linearize::Linearizer;
use crate::cfg::node::{NodeId, NodeKind, Variable};
use crate::error::CfgResult;

impl Linearizer<'_> {
    /// Lowers an expression and returns the node holding its value.
    pub(super) fn lower_expression(&mut self, id: TreeId) -> CfgResult<NodeId> {
        let ast = self.ast;
        let ty = ast.type_of(id).clone();
        let node = match ast.kind(id) {
            TreeKind::Parenthesized(inner) => return self.lower_expression(*inner),
            TreeKind::Literal(literal) => {
                self.extend_node(NodeKind::Literal(literal.clone()), Some(id), ty)
            }
            TreeKind::Ident(symbol) => self.lower_identifier(id, symbol, ty),
            TreeKind::MemberSelect(select) => self.lower_member_select(id, select, ty)?,
            TreeKind::MethodCall(call) => {
                let receiver = match call.receiver {
                    Some(receiver) => self.lower_expression(receiver)?,
                    None => self.implicit_receiver(&call.method.owner, call.method.is_static()),
                };
                let args = self.lower_call_arguments(&call.method, &call.args)?;

                let method = call.method.clone();
                let access_ty = method.return_type.clone();
                let plain = method.is_static() || self.is_this(receiver);
                let target = self.new_node(NodeKind::MethodAccess { receiver, method }, None, access_ty);
                self.extend_dereference(target, plain);

                let mut causes = call.method.thrown.clone();
                if self.settings.unchecked_call_exceptions {
                    causes.push(self.well_known(WellKnownType::Throwable));
                }
                let invocation =
                    self.new_node(NodeKind::MethodInvocation { target, args }, Some(id), ty);
                self.extend_with_exceptions(invocation, causes, call.method.terminates_execution())
            }
            TreeKind::NewClass(new) => self.lower_new_class(id, new, ty)?,
            TreeKind::NewArray(array) => {
                let element = ty.element_type().cloned().unwrap_or(Type::Void);
                let mut dimensions = Vec::with_capacity(array.dimensions.len());
                for dimension in &array.dimensions {
                    let dimension = self.lower_expression(*dimension)?;
                    dimensions.push(self.unary_numeric_promotion(dimension));
                }
                let mut initializers = Vec::with_capacity(array.initializers.len());
                for initializer in &array.initializers {
                    let initializer = self.lower_expression(*initializer)?;
                    initializers.push(self.assign_convert(initializer, &element));
                }
                self.extend_node(
                    NodeKind::ArrayCreation {
                        dimensions,
                        initializers,
                    },
                    Some(id),
                    ty,
                )
            }
            TreeKind::ArrayAccess(access) => {
                let array = self.lower_expression(access.array)?;
                let index = self.lower_expression(access.index)?;
                let index = self.unary_numeric_promotion(index);
                self.extend_node(NodeKind::ArrayAccess { array, index }, Some(id), ty)
            }
            TreeKind::Assign(assign) => {
                let target_tree = ast.skip_parens(assign.target);
                let (target, value) = if let TreeKind::MemberSelect(MemberSelect {
                    receiver,
                    member: Member::Field(field),
                }) = ast.kind(target_tree)
                {
                    // The receiver is evaluated before the value, the field
                    // access itself only afterwards.
                    let receiver = self.lower_expression(*receiver)?;
                    let value = self.lower_expression(assign.value)?;
                    let value = self.assign_convert(value, &field.ty);
                    let plain = field.is_static() || self.is_this(receiver);
                    let target = self.new_node(
                        NodeKind::FieldAccess {
                            receiver,
                            field: field.clone(),
                        },
                        Some(target_tree),
                        field.ty.clone(),
                    );
                    self.nodes[target].lvalue = true;
                    self.extend_dereference(target, plain);
                    (target, value)
                } else {
                    let target = self.lower_expression(target_tree)?;
                    self.nodes[target].lvalue = true;
                    let value = self.lower_expression(assign.value)?;
                    let target_ty = self.nodes[target].ty.clone();
                    (target, self.assign_convert(value, &target_ty))
                };
                self.extend_node(NodeKind::Assignment { target, value }, Some(id), ty)
            }
            TreeKind::CompoundAssign(assign) => self.lower_compound_assign(id, assign, &ty)?,
            TreeKind::Binary(binary) if binary.op.is_short_circuit() => {
                let true_label = self.fresh_label();
                let false_label = self.fresh_label();
                let (lhs, rhs) = self.lower_short_circuit(
                    binary.op,
                    binary.lhs,
                    binary.rhs,
                    true_label,
                    false_label,
                )?;
                self.bind(true_label);
                self.bind(false_label);
                self.extend_node(
                    NodeKind::ShortCircuit {
                        op: binary.op,
                        lhs,
                        rhs,
                    },
                    Some(id),
                    ty,
                )
            }
            TreeKind::Binary(binary) => {
                let lhs = self.lower_expression(binary.lhs)?;
                let rhs = self.lower_expression(binary.rhs)?;
                let (lhs, rhs) = self.promote_binary_operands(binary.op, lhs, rhs, &ty);
                self.extend_node(
                    NodeKind::Binary {
                        op: binary.op,
                        lhs,
                        rhs,
                    },
                    Some(id),
                    ty,
                )
            }
            TreeKind::Unary(unary) => {
                let operand = self.lower_expression(unary.operand)?;
                if unary.op == UnaryOp::Not {
                    let operand = self.unbox(operand);
                    self.extend_node(NodeKind::Unary { op: unary.op, operand }, Some(id), ty)
                } else {
                    let operand = self.unary_numeric_promotion(operand);
                    if unary.op.is_increment_or_decrement() {
                        let promoted = self.nodes[operand].ty.clone();
                        let node = self.extend_node(
                            NodeKind::Unary { op: unary.op, operand },
                            Some(id),
                            promoted,
                        );
                        self.narrow_and_box(node, &ty)
                    } else {
                        self.extend_node(NodeKind::Unary { op: unary.op, operand }, Some(id), ty)
                    }
                }
            }
            TreeKind::Conditional(conditional) => {
                let then_start = self.fresh_label();
                let else_start = self.fresh_label();
                let merge = self.fresh_label();

                let condition = self.lower_condition(conditional.condition, then_start, else_start)?;

                self.bind(then_start);
                let then_value = self.lower_expression(conditional.then_expr)?;
                let then_value = self.conditional_expr_promotion(then_value, &ty);
                self.extend_jump(merge);

                self.bind(else_start);
                let else_value = self.lower_expression(conditional.else_expr)?;
                let else_value = self.conditional_expr_promotion(else_value, &ty);

                self.bind(merge);
                self.extend_node(
                    NodeKind::Ternary {
                        condition,
                        then_value,
                        else_value,
                    },
                    Some(id),
                    ty,
                )
            }
            TreeKind::InstanceOf(instance_of) => {
                let operand = self.lower_expression(instance_of.expr)?;
                let tested = ast.type_of(instance_of.class).clone();
                self.extend_node(NodeKind::InstanceOf { operand, tested }, Some(id), ty)
            }
            TreeKind::TypeCast(cast) => {
                let operand = self.lower_expression(cast.expr)?;
                self.extend_node(NodeKind::TypeCast { operand }, Some(id), ty)
            }
            TreeKind::PrimitiveType(_) | TreeKind::ArrayType(_) | TreeKind::ParameterizedType(_) => {
                self.extend_node(NodeKind::TypeExpr, Some(id), ty)
            }
            TreeKind::Lambda(_) => return Err(self.unsupported(id, "lambda expression")),
            TreeKind::MemberReference(_) => return Err(self.unsupported(id, "member reference")),
            TreeKind::Erroneous => return Err(self.unsupported(id, "erroneous tree")),
            kind => {
                return Err(self.unsupported(id, format!("{} in expression position", kind.name())));
            }
        };
        Ok(node)
    }

    fn lower_identifier(&mut self, id: TreeId, symbol: &Symbol, ty: Type) -> NodeId {
        match symbol {
            Symbol::Local(local) => {
                self.extend_node(NodeKind::LocalVariable(Variable::Declared(*local)), Some(id), ty)
            }
            Symbol::Field(field) => {
                let receiver = self.implicit_receiver(&field.owner, field.is_static());
                self.extend_node(
                    NodeKind::FieldAccess {
                        receiver,
                        field: field.clone(),
                    },
                    Some(id),
                    ty,
                )
            }
            Symbol::Class => self.extend_node(NodeKind::ClassName { qualifier: None }, Some(id), ty),
            Symbol::Package(name) => self.extend_node(
                NodeKind::PackageName {
                    name: name.clone(),
                    qualifier: None,
                },
                Some(id),
                ty,
            ),
            Symbol::This => self.extend_node(NodeKind::This { implicit: false }, Some(id), ty),
        }
    }

    fn lower_member_select(&mut self, id: TreeId, select: &MemberSelect, ty: Type) -> CfgResult<NodeId> {
        let receiver = self.lower_expression(select.receiver)?;
        let node = match &select.member {
            Member::Field(field) => {
                let plain = field.is_static() || self.is_this(receiver);
                let node = self.new_node(
                    NodeKind::FieldAccess {
                        receiver,
                        field: field.clone(),
                    },
                    Some(id),
                    ty,
                );
                self.extend_dereference(node, plain)
            }
            Member::Class => self.extend_node(
                NodeKind::ClassName {
                    qualifier: Some(receiver),
                },
                Some(id),
                ty,
            ),
            Member::Package(name) => self.extend_node(
                NodeKind::PackageName {
                    name: name.clone(),
                    qualifier: Some(receiver),
                },
                Some(id),
                ty,
            ),
        };
        Ok(node)
    }

    fn lower_new_class(&mut self, id: TreeId, new: &NewClass, ty: Type) -> CfgResult<NodeId> {
        let enclosing = match new.enclosing {
            Some(enclosing) => Some(self.lower_expression(enclosing)?),
            None => None,
        };
        let args = self.lower_call_arguments(&new.constructor, &new.args)?;
        let class = self.lower_expression(new.class)?;

        let mut causes = new.constructor.thrown.clone();
        if self.settings.unchecked_call_exceptions {
            causes.push(self.well_known(WellKnownType::Throwable));
        }
        let node = self.new_node(
            NodeKind::ObjectCreation {
                enclosing,
                class,
                constructor: new.constructor.clone(),
                args,
            },
            Some(id),
            ty,
        );
        Ok(self.extend_with_exceptions(node, causes, false))
    }

    fn lower_compound_assign(&mut self, id: TreeId, assign: &CompoundAssign, ty: &Type) -> CfgResult<NodeId> {
        let target = self.lower_expression(assign.target)?;
        self.nodes[target].lvalue = true;
        let value = self.lower_expression(assign.value)?;

        let (target, value, result_ty) = if self.types.is_string(ty) {
            let target = self.string_conversion(target, ty);
            let value = self.string_conversion(value, ty);
            (target, value, ty.clone())
        } else if assign.op.is_shift() {
            let target = self.unary_numeric_promotion(target);
            let value = self.unary_numeric_promotion(value);
            let result_ty = self.nodes[target].ty.clone();
            (target, value, result_ty)
        } else if self.types.is_boolean(ty) {
            (self.unbox(target), self.unbox(value), Type::BOOLEAN)
        } else {
            let left = self.primitive_of(&self.nodes[target].ty);
            let right = self.primitive_of(&self.nodes[value].ty);
            let result_ty = match (left, right) {
                (Some(left), Some(right)) => Type::Primitive(left.promote(right)),
                _ => ty.clone(),
            };
            let target = self.binary_numeric_promotion(target, &result_ty);
            let value = self.binary_numeric_promotion(value, &result_ty);
            (target, value, result_ty)
        };

        let node = self.extend_node(
            NodeKind::CompoundAssignment {
                op: assign.op,
                target,
                value,
            },
            Some(id),
            result_ty,
        );
        Ok(self.narrow_and_box(node, ty))
    }

    /// Applies the operand conversions of a binary operator other than `&&`
    /// and `||`.
    fn promote_binary_operands(
        &mut self,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
        ty: &Type,
    ) -> (NodeId, NodeId) {
        if op == BinaryOp::Add && self.types.is_string(ty) {
            return (self.string_conversion(lhs, ty), self.string_conversion(rhs, ty));
        }
        if op.is_shift() {
            return (self.unary_numeric_promotion(lhs), self.unary_numeric_promotion(rhs));
        }

        let left = self.primitive_of(&self.nodes[lhs].ty);
        let right = self.primitive_of(&self.nodes[rhs].ty);

        if op.is_relational() || op.is_equality() {
            if let (Some(left_kind), Some(right_kind)) = (left, right) {
                let either_primitive =
                    self.nodes[lhs].ty.is_primitive() || self.nodes[rhs].ty.is_primitive();
                let numeric = left_kind.is_numeric() && right_kind.is_numeric();
                if numeric && (op.is_relational() || either_primitive) {
                    let common = Type::Primitive(left_kind.promote(right_kind));
                    return (
                        self.binary_numeric_promotion(lhs, &common),
                        self.binary_numeric_promotion(rhs, &common),
                    );
                }
            }
            if op.is_equality() {
                let left_boxed_boolean = self.is_boxed_boolean(lhs);
                let right_boxed_boolean = self.is_boxed_boolean(rhs);
                if left_boxed_boolean && !right_boxed_boolean {
                    return (self.unbox(lhs), rhs);
                }
                if right_boxed_boolean && !left_boxed_boolean {
                    return (lhs, self.unbox(rhs));
                }
            }
            return (lhs, rhs);
        }

        if op.is_bitwise() && self.types.is_boolean(ty) {
            return (self.unbox(lhs), self.unbox(rhs));
        }

        if ty.is_numeric() {
            (
                self.binary_numeric_promotion(lhs, ty),
                self.binary_numeric_promotion(rhs, ty),
            )
        } else {
            (lhs, rhs)
        }
    }

    /// Lowers call arguments, packing trailing variable arguments into an
    /// array, and converts each to its formal parameter type.
    fn lower_call_arguments(&mut self, method: &MethodRef, actuals: &[TreeId]) -> CfgResult<Vec<NodeId>> {
        let mut args = Vec::with_capacity(actuals.len());
        for actual in actuals {
            args.push(self.lower_expression(*actual)?);
        }

        if method.is_varargs() {
            if let Some(last_param) = method.params.last() {
                let last_index = method.params.len() - 1;
                let packed = if actuals.len() == last_index {
                    Some(Vec::new())
                } else {
                    let passes_array = actuals.len() == method.params.len()
                        && actuals.get(last_index).is_some_and(|actual| {
                            self.types
                                .is_assignable(self.ast.type_of(*actual), last_param)
                        });
                    (!passes_array && args.len() >= last_index).then(|| args.split_off(last_index))
                };
                if let Some(initializers) = packed {
                    let array = self.extend_node(
                        NodeKind::ArrayCreation {
                            dimensions: Vec::new(),
                            initializers,
                        },
                        None,
                        last_param.clone(),
                    );
                    args.push(array);
                }
            }
        }

        Ok(args
            .into_iter()
            .zip(&method.params)
            .map(|(arg, param)| self.invocation_convert(arg, param))
            .collect())
    }

    /// The receiver of a member used without one: the class for static
    /// members, otherwise `this`.
    fn implicit_receiver(&mut self, owner: &Type, is_static: bool) -> NodeId {
        let kind = if is_static {
            NodeKind::ClassName { qualifier: None }
        } else {
            NodeKind::This { implicit: true }
        };
        self.extend_node(kind, None, owner.clone())
    }

    /// Appends a member access, which raises a null pointer exception
    /// unless the receiver is known to be non-null.
    fn extend_dereference(&mut self, node: NodeId, plain: bool) -> NodeId {
        if plain {
            self.extend(node)
        } else {
            let npe = self.well_known(WellKnownType::NullPointerException);
            self.extend_with_exceptions(node, [npe], false)
        }
    }

    fn is_this(&self, node: NodeId) -> bool {
        matches!(self.nodes[node].kind, NodeKind::This { .. })
    }

    fn is_boxed_boolean(&self, node: NodeId) -> bool {
        let ty = &self.nodes[node].ty;
        !ty.is_primitive() && self.types.is_boolean(ty)
    }
}

//! Programmatic construction of typed trees.
//!
//! ```
//! use jflow_ast::{AstBuilder, BinaryOp, Type};
//!
//! let mut builder = AstBuilder::new();
//! let x = builder.local("x", Type::INT);
//! let zero = builder.int(0);
//! let decl = builder.var_decl(x, Some(zero));
//! let x_ref = builder.local_ref(x);
//! let one = builder.int(1);
//! let sum = builder.binary(BinaryOp::Add, x_ref, one);
//! let ret = builder.return_stmt(Some(sum));
//! let body = builder.block(vec![decl, ret]);
//! let ast = builder.finish();
//!
//! assert_eq!(ast.type_of(sum), &Type::INT);
//! assert!(ast.kind(body).is_block());
//! ```
use text_size::TextRange;

use crate::member::{FieldRef, MethodRef};
use crate::tree::{
    ArrayAccess, Assert, Assign, Ast, Binary, BinaryOp, Case, Catch, ClassDecl, CompoundAssign,
    Conditional, DoWhile, For, ForEach, If, InstanceOf, Labeled, Literal, LocalId, LocalKind,
    LocalVar, Member, MemberSelect, MethodCall, MethodDecl, NewArray, NewClass, ParameterizedType,
    Switch, Symbol, Synchronized, Tree, TreeId, TreeKind, Try, TypeCast, Unary, UnaryOp,
    VariableDecl, While,
};
use crate::types::{PrimitiveKind, Type, WellKnownType};

#[derive(Debug, Default)]
pub struct AstBuilder {
    ast: Ast,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Ast {
        self.ast
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn set_range(&mut self, id: TreeId, range: TextRange) {
        self.ast.trees[id].range = range;
    }

    fn push(&mut self, kind: TreeKind, ty: Type) -> TreeId {
        self.ast.trees.alloc(Tree {
            kind,
            ty,
            range: TextRange::default(),
        })
    }

    fn stmt(&mut self, kind: TreeKind) -> TreeId {
        self.push(kind, Type::Void)
    }

    fn type_of(&self, id: TreeId) -> &Type {
        self.ast.type_of(id)
    }

    // Variables

    pub fn local(&mut self, name: &str, ty: Type) -> LocalId {
        self.new_local(name, ty, LocalKind::Local)
    }

    pub fn parameter(&mut self, name: &str, ty: Type) -> LocalId {
        self.new_local(name, ty, LocalKind::Parameter)
    }

    pub fn exception_parameter(&mut self, name: &str, ty: Type) -> LocalId {
        self.new_local(name, ty, LocalKind::ExceptionParameter)
    }

    fn new_local(&mut self, name: &str, ty: Type, kind: LocalKind) -> LocalId {
        self.ast.locals.alloc(LocalVar {
            name: name.into(),
            ty,
            kind,
        })
    }

    // Expressions

    pub fn literal(&mut self, literal: Literal) -> TreeId {
        let ty = match &literal {
            Literal::Boolean(_) => Type::BOOLEAN,
            Literal::Char(_) => Type::CHAR,
            Literal::Int(_) => Type::INT,
            Literal::Long(_) => Type::LONG,
            Literal::Float(_) => Type::FLOAT,
            Literal::Double(_) => Type::DOUBLE,
            Literal::String(_) => Type::class_type(WellKnownType::String.qualified_name()),
            Literal::Null => Type::Null,
        };
        self.push(TreeKind::Literal(literal), ty)
    }

    pub fn bool_lit(&mut self, value: bool) -> TreeId {
        self.literal(Literal::Boolean(value))
    }

    pub fn int(&mut self, value: i32) -> TreeId {
        self.literal(Literal::Int(value))
    }

    pub fn long(&mut self, value: i64) -> TreeId {
        self.literal(Literal::Long(value))
    }

    pub fn char_lit(&mut self, value: char) -> TreeId {
        self.literal(Literal::Char(value))
    }

    pub fn double(&mut self, value: f64) -> TreeId {
        self.literal(Literal::Double(value))
    }

    pub fn string(&mut self, value: &str) -> TreeId {
        self.literal(Literal::String(value.into()))
    }

    pub fn null(&mut self) -> TreeId {
        self.literal(Literal::Null)
    }

    pub fn local_ref(&mut self, local: LocalId) -> TreeId {
        let ty = self.ast.local(local).ty.clone();
        self.push(TreeKind::Ident(Symbol::Local(local)), ty)
    }

    pub fn this(&mut self, ty: Type) -> TreeId {
        self.push(TreeKind::Ident(Symbol::This), ty)
    }

    /// A field named without a receiver.
    pub fn field(&mut self, field: FieldRef) -> TreeId {
        let ty = field.ty.clone();
        self.push(TreeKind::Ident(Symbol::Field(field)), ty)
    }

    pub fn select(&mut self, receiver: TreeId, field: FieldRef) -> TreeId {
        let ty = field.ty.clone();
        self.push(
            TreeKind::MemberSelect(MemberSelect {
                receiver,
                member: Member::Field(field),
            }),
            ty,
        )
    }

    pub fn class_name(&mut self, ty: Type) -> TreeId {
        self.push(TreeKind::Ident(Symbol::Class), ty)
    }

    pub fn package(&mut self, name: &str) -> TreeId {
        self.push(TreeKind::Ident(Symbol::Package(name.into())), Type::Void)
    }

    /// `package.Class`, where `receiver` names the package.
    pub fn select_class(&mut self, receiver: TreeId, ty: Type) -> TreeId {
        self.push(
            TreeKind::MemberSelect(MemberSelect {
                receiver,
                member: Member::Class,
            }),
            ty,
        )
    }

    pub fn call(
        &mut self,
        receiver: Option<TreeId>,
        method: MethodRef,
        args: Vec<TreeId>,
    ) -> TreeId {
        let ty = method.return_type.clone();
        self.push(
            TreeKind::MethodCall(MethodCall {
                receiver,
                method,
                args,
            }),
            ty,
        )
    }

    pub fn new_class(&mut self, constructor: MethodRef, args: Vec<TreeId>) -> TreeId {
        let ty = constructor.owner.clone();
        let class = self.class_name(ty.clone());
        self.push(
            TreeKind::NewClass(NewClass {
                enclosing: None,
                class,
                constructor,
                args,
            }),
            ty,
        )
    }

    /// `new T[d0][d1]...` or `new T[] { i0, i1, ... }`; `ty` is the array type.
    pub fn new_array(&mut self, ty: Type, dimensions: Vec<TreeId>, initializers: Vec<TreeId>) -> TreeId {
        self.push(
            TreeKind::NewArray(NewArray {
                dimensions,
                initializers,
            }),
            ty,
        )
    }

    pub fn array_access(&mut self, array: TreeId, index: TreeId) -> TreeId {
        let ty = self
            .type_of(array)
            .element_type()
            .cloned()
            .unwrap_or(Type::Void);
        self.push(TreeKind::ArrayAccess(ArrayAccess { array, index }), ty)
    }

    pub fn assign(&mut self, target: TreeId, value: TreeId) -> TreeId {
        let ty = self.type_of(target).clone();
        self.push(TreeKind::Assign(Assign { target, value }), ty)
    }

    pub fn compound_assign(&mut self, op: BinaryOp, target: TreeId, value: TreeId) -> TreeId {
        let ty = self.type_of(target).clone();
        self.push(
            TreeKind::CompoundAssign(CompoundAssign { op, target, value }),
            ty,
        )
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: TreeId, rhs: TreeId) -> TreeId {
        let ty = binary_result_type(op, self.type_of(lhs), self.type_of(rhs));
        self.push(TreeKind::Binary(Binary { op, lhs, rhs }), ty)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: TreeId) -> TreeId {
        let operand_ty = self.type_of(operand);
        let ty = match op {
            UnaryOp::Not => Type::BOOLEAN,
            _ if op.is_increment_or_decrement() => operand_ty.clone(),
            _ => match primitive_or_unboxed(operand_ty) {
                Some(kind) => Type::Primitive(kind.promote_unary()),
                None => operand_ty.clone(),
            },
        };
        self.push(TreeKind::Unary(Unary { op, operand }), ty)
    }

    /// A conditional expression; its type must be supplied by the caller.
    pub fn conditional(
        &mut self,
        condition: TreeId,
        then_expr: TreeId,
        else_expr: TreeId,
        ty: Type,
    ) -> TreeId {
        self.push(
            TreeKind::Conditional(Conditional {
                condition,
                then_expr,
                else_expr,
            }),
            ty,
        )
    }

    pub fn instance_of(&mut self, expr: TreeId, ty: Type) -> TreeId {
        let class = self.type_tree(ty);
        self.push(
            TreeKind::InstanceOf(InstanceOf { expr, class }),
            Type::BOOLEAN,
        )
    }

    pub fn cast(&mut self, ty: Type, expr: TreeId) -> TreeId {
        let class = self.type_tree(ty.clone());
        self.push(TreeKind::TypeCast(TypeCast { class, expr }), ty)
    }

    pub fn parens(&mut self, inner: TreeId) -> TreeId {
        let ty = self.type_of(inner).clone();
        self.push(TreeKind::Parenthesized(inner), ty)
    }

    /// A tree denoting `ty` in type position.
    pub fn type_tree(&mut self, ty: Type) -> TreeId {
        let kind = match &ty {
            Type::Primitive(kind) => TreeKind::PrimitiveType(*kind),
            Type::Array(element) => TreeKind::ArrayType(self.type_tree(element.as_ref().clone())),
            Type::Declared(declared) if !declared.args.is_empty() => {
                let base = self.class_name(Type::class_type(&declared.name));
                let args = declared
                    .args
                    .iter()
                    .map(|arg| self.type_tree(arg.clone()))
                    .collect();
                TreeKind::ParameterizedType(ParameterizedType { base, args })
            }
            _ => TreeKind::Ident(Symbol::Class),
        };
        self.push(kind, ty)
    }

    pub fn lambda(&mut self, body: TreeId, ty: Type) -> TreeId {
        self.push(TreeKind::Lambda(body), ty)
    }

    pub fn member_reference(&mut self, qualifier: TreeId, ty: Type) -> TreeId {
        self.push(TreeKind::MemberReference(qualifier), ty)
    }

    pub fn erroneous(&mut self) -> TreeId {
        self.push(TreeKind::Erroneous, Type::Void)
    }

    // Statements

    pub fn var_decl(&mut self, local: LocalId, init: Option<TreeId>) -> TreeId {
        self.stmt(TreeKind::VariableDecl(VariableDecl { local, init }))
    }

    pub fn block(&mut self, stmts: Vec<TreeId>) -> TreeId {
        self.stmt(TreeKind::Block(stmts))
    }

    pub fn empty(&mut self) -> TreeId {
        self.stmt(TreeKind::Empty)
    }

    pub fn expr_stmt(&mut self, expr: TreeId) -> TreeId {
        self.stmt(TreeKind::ExprStmt(expr))
    }

    pub fn if_stmt(&mut self, condition: TreeId, then_stmt: TreeId, else_stmt: Option<TreeId>) -> TreeId {
        self.stmt(TreeKind::If(If {
            condition,
            then_stmt,
            else_stmt,
        }))
    }

    pub fn while_stmt(&mut self, condition: TreeId, body: TreeId) -> TreeId {
        self.stmt(TreeKind::While(While { condition, body }))
    }

    pub fn do_while(&mut self, body: TreeId, condition: TreeId) -> TreeId {
        self.stmt(TreeKind::DoWhile(DoWhile { body, condition }))
    }

    pub fn for_stmt(
        &mut self,
        init: Vec<TreeId>,
        condition: Option<TreeId>,
        update: Vec<TreeId>,
        body: TreeId,
    ) -> TreeId {
        self.stmt(TreeKind::For(For {
            init,
            condition,
            update,
            body,
        }))
    }

    pub fn for_each(&mut self, variable: LocalId, iterable: TreeId, body: TreeId) -> TreeId {
        let variable = self.var_decl(variable, None);
        self.stmt(TreeKind::ForEach(ForEach {
            variable,
            iterable,
            body,
        }))
    }

    pub fn labeled(&mut self, label: &str, body: TreeId) -> TreeId {
        self.stmt(TreeKind::Labeled(Labeled {
            label: label.into(),
            body,
        }))
    }

    pub fn break_stmt(&mut self, label: Option<&str>) -> TreeId {
        self.stmt(TreeKind::Break(label.map(Into::into)))
    }

    pub fn continue_stmt(&mut self, label: Option<&str>) -> TreeId {
        self.stmt(TreeKind::Continue(label.map(Into::into)))
    }

    pub fn return_stmt(&mut self, value: Option<TreeId>) -> TreeId {
        self.stmt(TreeKind::Return(value))
    }

    pub fn throw_stmt(&mut self, exception: TreeId) -> TreeId {
        self.stmt(TreeKind::Throw(exception))
    }

    pub fn catch(&mut self, parameter: LocalId, body: TreeId) -> Catch {
        let parameter = self.var_decl(parameter, None);
        Catch { parameter, body }
    }

    pub fn try_stmt(&mut self, block: TreeId, catches: Vec<Catch>, finally: Option<TreeId>) -> TreeId {
        self.stmt(TreeKind::Try(Try {
            block,
            catches,
            finally,
        }))
    }

    pub fn case(expr: Option<TreeId>, body: Vec<TreeId>) -> Case {
        Case { expr, body }
    }

    pub fn switch_stmt(&mut self, selector: TreeId, cases: Vec<Case>) -> TreeId {
        self.stmt(TreeKind::Switch(Switch { selector, cases }))
    }

    pub fn synchronized(&mut self, lock: TreeId, body: TreeId) -> TreeId {
        self.stmt(TreeKind::Synchronized(Synchronized { lock, body }))
    }

    pub fn assert_stmt(&mut self, condition: TreeId, detail: Option<TreeId>) -> TreeId {
        self.stmt(TreeKind::Assert(Assert { condition, detail }))
    }

    // Declarations

    pub fn method(
        &mut self,
        name: &str,
        params: Vec<LocalId>,
        return_type: Type,
        body: TreeId,
    ) -> TreeId {
        let params = params
            .into_iter()
            .map(|param| self.var_decl(param, None))
            .collect();
        self.stmt(TreeKind::MethodDecl(MethodDecl {
            name: name.into(),
            params,
            return_type,
            body,
        }))
    }

    pub fn class_decl(&mut self, name: &str, members: Vec<TreeId>) -> TreeId {
        self.stmt(TreeKind::ClassDecl(ClassDecl {
            name: name.into(),
            members,
        }))
    }
}

fn primitive_or_unboxed(ty: &Type) -> Option<PrimitiveKind> {
    ty.primitive_kind()
        .or_else(|| ty.class_name().and_then(PrimitiveKind::from_boxed_class))
}

/// The static type of `lhs op rhs`.
fn binary_result_type(op: BinaryOp, lhs: &Type, rhs: &Type) -> Type {
    let string = WellKnownType::String.qualified_name();
    if op.is_short_circuit() || op.is_relational() || op.is_equality() {
        return Type::BOOLEAN;
    }
    if op == BinaryOp::Add && (lhs.class_name() == Some(string) || rhs.class_name() == Some(string))
    {
        return Type::class_type(string);
    }
    let (Some(left), Some(right)) = (primitive_or_unboxed(lhs), primitive_or_unboxed(rhs)) else {
        return lhs.clone();
    };
    if op.is_shift() {
        Type::Primitive(left.promote_unary())
    } else if op.is_bitwise() && left == PrimitiveKind::Boolean {
        Type::BOOLEAN
    } else {
        Type::Primitive(left.promote(right))
    }
}
